//! Prints `sin(a) + c * sin(5a)` and its derivative over a range of `a` as CSV.

use scalargrad::{Dual, Tape};

fn main() {
    println!("x, value, reverse, forward");
    for i in -40..=40 {
        let x = i as f64 / 20. * std::f64::consts::PI;

        let tape = Tape::new();
        let a = tape.term("a", x);
        let all = a.sin() + tape.term("c", 0.2) * (a * 5.).sin();
        all.backward();

        let d = Dual::var("a", x);
        let forward = d.sin() + 0.2 * (&d * 5.).sin();

        println!("{x}, {}, {}, {}", all.value(), a.grad(), forward.derivative());
    }
}
