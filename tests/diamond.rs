//! Dependency graph in diamond shape. The shared term is reached twice, so its gradient adds up.

use scalargrad::Tape;

#[test]
fn diamond() {
    let _ = env_logger::builder().is_test(true).try_init();
    let tape = Tape::new();
    let a = tape.term("a", 1.);
    let b = tape.term("b", 3.);
    let c = tape.term("c", 5.);
    let ab = a + b;
    let ac = a + c;
    let abac = ab + ac;

    abac.backward();
    assert_eq!(a.grad(), 2.);
    assert_eq!(b.grad(), 1.);
    assert_eq!(c.grad(), 1.);
    assert_eq!(ab.grad(), 1.);
    assert_eq!(ac.grad(), 1.);
}

#[test]
fn diamond_negated() {
    let tape = Tape::new();
    let a = tape.term("a", 1.);
    let a2 = -a;
    let b = tape.term("b", 3.);
    let c = tape.term("c", 5.);
    let abac = (a2 + b) * (a2 + c);

    abac.backward();
    // d/da (b - a)(c - a) = -(c - a) - (b - a)
    assert_eq!(a.grad(), -6.);
    assert_eq!(a2.grad(), 6.);
    assert_eq!(b.grad(), 4.);
    assert_eq!(c.grad(), 2.);
}

#[test]
fn fan_out_square() {
    let tape = Tape::new();
    let x = tape.term("x", 4.5);
    let z = tape.mul(x, x).unwrap();
    z.backward();
    assert_eq!(x.grad(), 2. * x.value());
}

#[test]
fn graph_of_diamond() {
    let tape = Tape::new();
    let a = tape.term("a", 1.);
    let b = tape.term("b", 3.);
    let ab = a * b;
    let root = ab + ab.sin();

    let graph = root.graph();
    assert_eq!(graph.nodes.len(), 5);
    assert_eq!(graph.nodes.last().map(|node| node.id), Some(root.id()));
    let expected = [
        (a.id(), ab.id()),
        (b.id(), ab.id()),
        (ab.id(), root.parents()[1].id()),
        (ab.id(), root.id()),
        (root.parents()[1].id(), root.id()),
    ];
    assert_eq!(graph.edges.len(), expected.len());
    for edge in expected {
        assert!(graph.edges.contains(&edge), "missing edge {edge:?}");
    }
    // Enumeration does not run the backward pass.
    assert!(graph.nodes.iter().all(|node| node.grad == 0.));
    assert_eq!(root.info().op_tag, "+");
}
