use scalargrad::{error::Result, Dual, Tape};

fn main() -> Result<()> {
    env_logger::init();

    let tape = Tape::new();
    let x = tape.term("x", 2.);
    let y = tape.term("y", 5.);
    let xy = tape.mul(x, y)?;
    let sin_x = tape.sin(x)?;
    let l = tape.pow(tape.add(xy, sin_x)?, 2.)?;
    l.set_label("L");
    l.backward();

    println!("L = (x * y + sin(x))**2 = {}", l.value());
    println!("dL/dx = {}", x.grad());
    println!("dL/dy = {}", y.grad());

    let graph = l.graph();
    for node in &graph.nodes {
        println!(
            "{} {:>6} {:>3} data: {:.4}, grad: {:.4}",
            node.id, node.label, node.op_tag, node.value, node.grad
        );
    }
    for (parent, child) in &graph.edges {
        println!("{parent} -> {child}");
    }

    let x = Dual::var("x", 2.);
    let y = Dual::new("y", 5., 0.);
    let l = (&x * &y + x.sin()).powf(2.);
    println!("forward: {l}");
    Ok(())
}
