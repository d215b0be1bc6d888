//! Dependency graph in diamond shape. It evaluates the same term twice, so the derivative should add up.

use scalargrad::Tape;

fn main() {
    env_logger::init();
    let tape = Tape::new();
    let a = tape.term("a", 1.);
    let a2 = -a;
    let b = tape.term("b", 3.);
    let c = tape.term("c", 5.);
    let ab = a2 + b;
    let ac = a2 + c;
    let abac = ab + ac;

    abac.backward();
    println!("abac: {}", abac.grad());
    println!("a: {}", a.grad());
    println!("b: {}", b.grad());
    println!("c: {}", c.grad());
    for (parent, child) in abac.graph().edges {
        println!("{parent} -> {child}");
    }
}
