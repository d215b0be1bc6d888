//! Random expressions over add, mul, sin and pow: reverse mode must match forward mode
//! and central finite differences.

use approx::assert_relative_eq;
use proptest::{prelude::*, test_runner::Config};
use scalargrad::{finite_diff::finite_diff_grad, Dual, Tape, TapeTerm};

const NUM_CASES: u32 = 1000;
const VARS: usize = 3;
const EPSILON: f64 = 1e-6; // finite difference step size

// reverse and forward mode only differ by summation order
const AUTO_ERROR: f64 = 1e-9;

// finite difference tolerances
const REL_ERROR: f64 = 1e-5;
const ABS_ERROR: f64 = 1e-6;

#[derive(Clone, Debug)]
enum Expr {
    Var(usize),
    Const(f64),
    Add(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Sin(Box<Expr>),
    Pow(Box<Expr>, f64),
}

impl Expr {
    fn eval(&self, vars: &[f64]) -> f64 {
        match self {
            Expr::Var(i) => vars[*i],
            Expr::Const(c) => *c,
            Expr::Add(lhs, rhs) => lhs.eval(vars) + rhs.eval(vars),
            Expr::Mul(lhs, rhs) => lhs.eval(vars) * rhs.eval(vars),
            Expr::Sin(term) => term.eval(vars).sin(),
            Expr::Pow(term, exponent) => term.eval(vars).powf(*exponent),
        }
    }

    fn record<'a>(&self, tape: &'a Tape, vars: &[TapeTerm<'a>]) -> TapeTerm<'a> {
        match self {
            Expr::Var(i) => vars[*i],
            Expr::Const(c) => tape.constant(*c),
            Expr::Add(lhs, rhs) => lhs.record(tape, vars) + rhs.record(tape, vars),
            Expr::Mul(lhs, rhs) => lhs.record(tape, vars) * rhs.record(tape, vars),
            Expr::Sin(term) => term.record(tape, vars).sin(),
            Expr::Pow(term, exponent) => term.record(tape, vars).pow(*exponent),
        }
    }

    fn dual(&self, vars: &[Dual]) -> Dual {
        match self {
            Expr::Var(i) => vars[*i].clone(),
            Expr::Const(c) => Dual::constant(*c),
            Expr::Add(lhs, rhs) => lhs.dual(vars) + rhs.dual(vars),
            Expr::Mul(lhs, rhs) => lhs.dual(vars) * rhs.dual(vars),
            Expr::Sin(term) => term.dual(vars).sin(),
            Expr::Pow(term, exponent) => term.dual(vars).powf(*exponent),
        }
    }
}

/// Expressions at most three operations deep over inputs in [-1, 1], which keeps
/// every intermediate value small enough for finite differences to be accurate.
fn expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        3 => (0..VARS).prop_map(Expr::Var),
        1 => (-1.0..1.0f64).prop_map(Expr::Const),
    ];
    leaf.prop_recursive(3, 16, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone())
                .prop_map(|(lhs, rhs)| Expr::Add(Box::new(lhs), Box::new(rhs))),
            (inner.clone(), inner.clone())
                .prop_map(|(lhs, rhs)| Expr::Mul(Box::new(lhs), Box::new(rhs))),
            inner.clone().prop_map(|term| Expr::Sin(Box::new(term))),
            (inner, prop_oneof![Just(2.), Just(3.)])
                .prop_map(|(term, exponent)| Expr::Pow(Box::new(term), exponent)),
        ]
    })
}

fn check_gradients(expr: &Expr, point: &[f64]) {
    let tape = Tape::new();
    let vars: Vec<_> = point
        .iter()
        .enumerate()
        .map(|(i, &x)| tape.term(format!("x{i}"), x))
        .collect();
    let root = expr.record(&tape, &vars);
    root.backward();
    assert_relative_eq!(root.value(), expr.eval(point), epsilon = AUTO_ERROR);

    let numeric = finite_diff_grad(|v| expr.eval(v), point, EPSILON);
    for (i, var) in vars.iter().enumerate() {
        let seeded: Vec<_> = point
            .iter()
            .enumerate()
            .map(|(j, &x)| Dual::new(format!("x{j}"), x, if i == j { 1. } else { 0. }))
            .collect();
        let forward = expr.dual(&seeded).derivative();
        assert_relative_eq!(
            var.grad(),
            forward,
            epsilon = AUTO_ERROR,
            max_relative = AUTO_ERROR
        );

        let tolerance = ABS_ERROR + REL_ERROR * var.grad().abs();
        assert_relative_eq!(numeric[i], var.grad(), epsilon = tolerance);
    }
}

proptest! {
    #![proptest_config(Config {
        cases: NUM_CASES,
        ..Config::default()
    })]

    #[test]
    fn reverse_matches_forward_and_finite_differences(
        expr in expr(),
        point in prop::array::uniform3(-1.0..1.0f64),
    ) {
        check_gradients(&expr, &point);
    }
}

#[test]
fn fan_out_through_every_operation() {
    // x appears in all four kinds of operation
    let x = Box::new(Expr::Var(0));
    let expr = Expr::Add(
        Box::new(Expr::Mul(x.clone(), Box::new(Expr::Sin(x.clone())))),
        Box::new(Expr::Pow(x, 3.)),
    );
    check_gradients(&expr, &[0.4, -0.2, 0.9]);
}
