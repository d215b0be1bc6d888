//! Reverse mode, forward mode and finite differences must agree.

use approx::assert_relative_eq;
use scalargrad::{finite_diff::finite_diff_grad, Dual, Tape, TapeTerm};

fn reverse_model<'a>(x: TapeTerm<'a>, y: TapeTerm<'a>) -> TapeTerm<'a> {
    (x * y + x.sin()).pow(2.)
}

fn forward_model(x: &Dual, y: &Dual) -> Dual {
    (x * y + x.sin()).powf(2.)
}

#[test]
fn forward_reverse_scenario() {
    let _ = env_logger::builder().is_test(true).try_init();
    let tape = Tape::new();
    let x = tape.term("x", 2.);
    let y = tape.term("y", 5.);
    let l = reverse_model(x, y);
    l.backward();

    let forward = forward_model(&Dual::var("x", 2.), &Dual::new("y", 5., 0.));
    let expected = 2. * (10. + 2f64.sin()) * (5. + 2f64.cos());

    assert_relative_eq!(x.grad(), forward.derivative(), epsilon = 1e-9);
    assert_relative_eq!(x.grad(), expected, epsilon = 1e-9);
    assert_relative_eq!(l.value(), forward.value(), epsilon = 1e-9);

    let forward_y = forward_model(&Dual::new("x", 2., 0.), &Dual::var("y", 5.));
    assert_relative_eq!(y.grad(), forward_y.derivative(), epsilon = 1e-9);
}

#[test]
fn matches_finite_differences() {
    let f = |v: &[f64]| {
        let (x, y, z) = (v[0], v[1], v[2]);
        (x * y + z.sin()).powf(3.) * (x + z) + (y * z).sin()
    };
    for point in [[0.3, -1.2, 0.8], [1.1, 0.4, -0.6], [-0.9, 2.0, 1.5]] {
        let tape = Tape::new();
        let x = tape.term("x", point[0]);
        let y = tape.term("y", point[1]);
        let z = tape.term("z", point[2]);
        let root = (x * y + z.sin()).pow(3.) * (x + z) + (y * z).sin();
        root.backward();

        let numeric = finite_diff_grad(&f, &point, 1e-6);
        for (term, expected) in [x, y, z].iter().zip(&numeric) {
            assert_relative_eq!(term.grad(), *expected, epsilon = 1e-6, max_relative = 1e-6);
            assert_relative_eq!(
                root.derive(term).unwrap(),
                term.grad(),
                epsilon = 1e-12,
                max_relative = 1e-9
            );
        }
    }
}

#[test]
fn every_reachable_node_gets_a_gradient() {
    let tape = Tape::new();
    let x = tape.term("x", 0.5);
    let y = tape.term("y", -1.5);
    let root = (x * y).sin() * x + (y + 2.).pow(2.) * x.sin();
    root.backward();

    let graph = root.graph();
    assert_eq!(graph.nodes.len(), tape.len());
    for node in &graph.nodes {
        assert!(node.grad.is_finite(), "{} has grad {}", node.label, node.grad);
    }
}

#[test]
fn builder_and_operators_agree() {
    let tape = Tape::new();
    let x = tape.term("x", 1.25);
    let y = tape.term("y", 0.5);
    let sugar = (x * y + x.sin()).pow(2.);
    let built = tape
        .pow(tape.add(tape.mul(x, y).unwrap(), tape.sin(x).unwrap()).unwrap(), 2.)
        .unwrap();
    assert_eq!(sugar.value(), built.value());
    assert_ne!(sugar.id(), built.id());
}

#[test]
fn construction_is_not_interned() {
    let build = |tape: &Tape| {
        let x = tape.term("x", 2.);
        let y = tape.term("y", 5.);
        let l = (x * y + x.sin()).pow(2.);
        l.backward();
        (x.grad(), y.grad(), l.value(), l.id())
    };
    let tape = Tape::new();
    let first = build(&tape);
    let second = build(&tape);
    assert_eq!(tape.len(), 12);
    assert_eq!((first.0, first.1, first.2), (second.0, second.1, second.2));
    assert_ne!(first.3, second.3);

    let other = Tape::new();
    let third = build(&other);
    assert_eq!((first.0, first.1, first.2), (third.0, third.1, third.2));
}
