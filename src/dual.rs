use std::ops::{Add, Div, Mul, Neg, Sub};

#[derive(Clone, PartialEq, Debug)]
/// A first order dual number carrying a value and its derivative along one direction.
///
/// Every operation returns a new instance, so there is no graph to keep and no backward pass.
/// Seed the variable you differentiate with respect to by a derivative of 1 and everything
/// else with 0.
///
/// ```
/// use scalargrad::Dual;
///
/// let x = Dual::var("x", 2.);
/// let y = Dual::constant(5.);
/// let z = &x * &y + x.sin();
/// assert_eq!(z.derivative(), 5. + 2f64.cos());
/// ```
pub struct Dual {
    value: f64,
    derivative: f64,
    label: String,
}

impl Dual {
    pub fn new(label: impl Into<String>, value: f64, derivative: f64) -> Self {
        Self {
            value,
            derivative,
            label: label.into(),
        }
    }

    /// An independent variable, seeded with derivative 1.
    pub fn var(label: impl Into<String>, value: f64) -> Self {
        Self::new(label, value, 1.)
    }

    pub fn constant(value: f64) -> Self {
        Self::new(format!("{value}"), value, 0.)
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn derivative(&self) -> f64 {
        self.derivative
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the same number under a different label.
    pub fn with_label(self, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..self
        }
    }

    pub fn sin(&self) -> Self {
        Self::new(
            format!("sin({})", self.label),
            self.value.sin(),
            self.value.cos() * self.derivative,
        )
    }

    pub fn cos(&self) -> Self {
        Self::new(
            format!("cos({})", self.label),
            self.value.cos(),
            -self.value.sin() * self.derivative,
        )
    }

    pub fn exp(&self) -> Self {
        let ex = self.value.exp();
        Self::new(format!("exp({})", self.label), ex, ex * self.derivative)
    }

    /// Power with a constant exponent.
    pub fn powf(&self, exponent: f64) -> Self {
        Self::new(
            format!("{}**{exponent}", self.label),
            self.value.powf(exponent),
            exponent * self.value.powf(exponent - 1.) * self.derivative,
        )
    }
}

impl From<f64> for Dual {
    fn from(value: f64) -> Self {
        Self::constant(value)
    }
}

impl std::fmt::Display for Dual {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: value {}, derivative {}",
            self.label, self.value, self.derivative
        )
    }
}

impl<'a> Add<&'a Dual> for &'a Dual {
    type Output = Dual;
    fn add(self, rhs: &'a Dual) -> Self::Output {
        Dual::new(
            format!("({}+{})", self.label, rhs.label),
            self.value + rhs.value,
            self.derivative + rhs.derivative,
        )
    }
}

impl<'a> Sub<&'a Dual> for &'a Dual {
    type Output = Dual;
    fn sub(self, rhs: &'a Dual) -> Self::Output {
        Dual::new(
            format!("({}-{})", self.label, rhs.label),
            self.value - rhs.value,
            self.derivative - rhs.derivative,
        )
    }
}

impl<'a> Mul<&'a Dual> for &'a Dual {
    type Output = Dual;
    fn mul(self, rhs: &'a Dual) -> Self::Output {
        Dual::new(
            format!("({}*{})", self.label, rhs.label),
            self.value * rhs.value,
            self.value * rhs.derivative + rhs.value * self.derivative,
        )
    }
}

impl<'a> Div<&'a Dual> for &'a Dual {
    type Output = Dual;
    fn div(self, rhs: &'a Dual) -> Self::Output {
        Dual::new(
            format!("({}/{})", self.label, rhs.label),
            self.value / rhs.value,
            (self.derivative * rhs.value - self.value * rhs.derivative) / (rhs.value * rhs.value),
        )
    }
}

impl Neg for &Dual {
    type Output = Dual;
    fn neg(self) -> Self::Output {
        Dual::new(format!("-{}", self.label), -self.value, -self.derivative)
    }
}

impl Neg for Dual {
    type Output = Dual;
    fn neg(self) -> Self::Output {
        -&self
    }
}

/// Forwards owned and literal operand combinations to the `&Dual op &Dual` implementation.
macro_rules! forward_binop {
    ($imp:ident, $method:ident) => {
        impl $imp for Dual {
            type Output = Dual;
            fn $method(self, rhs: Dual) -> Self::Output {
                <&Dual as $imp<&Dual>>::$method(&self, &rhs)
            }
        }

        impl $imp<&Dual> for Dual {
            type Output = Dual;
            fn $method(self, rhs: &Dual) -> Self::Output {
                <&Dual as $imp<&Dual>>::$method(&self, rhs)
            }
        }

        impl $imp<Dual> for &Dual {
            type Output = Dual;
            fn $method(self, rhs: Dual) -> Self::Output {
                <&Dual as $imp<&Dual>>::$method(self, &rhs)
            }
        }

        impl $imp<f64> for Dual {
            type Output = Dual;
            fn $method(self, rhs: f64) -> Self::Output {
                <&Dual as $imp<&Dual>>::$method(&self, &Dual::constant(rhs))
            }
        }

        impl $imp<f64> for &Dual {
            type Output = Dual;
            fn $method(self, rhs: f64) -> Self::Output {
                <&Dual as $imp<&Dual>>::$method(self, &Dual::constant(rhs))
            }
        }

        impl $imp<Dual> for f64 {
            type Output = Dual;
            fn $method(self, rhs: Dual) -> Self::Output {
                <&Dual as $imp<&Dual>>::$method(&Dual::constant(self), &rhs)
            }
        }

        impl $imp<&Dual> for f64 {
            type Output = Dual;
            fn $method(self, rhs: &Dual) -> Self::Output {
                <&Dual as $imp<&Dual>>::$method(&Dual::constant(self), rhs)
            }
        }
    };
}

forward_binop!(Add, add);
forward_binop!(Sub, sub);
forward_binop!(Mul, mul);
forward_binop!(Div, div);

#[test]
fn test_dual() {
    let d1 = Dual::new("a", 1., 2.);
    let d2 = Dual::new("b", 3., 4.);
    let sum = &d1 + &d2;
    assert_eq!((sum.value(), sum.derivative()), (4., 6.));
    assert_eq!(sum.label(), "(a+b)");

    let d3 = Dual::new("c", 20., -10.);
    let prod = &d1 * &d3;
    assert_eq!((prod.value(), prod.derivative()), (20., 30.));
    assert_eq!((&d3 * &d1).derivative(), prod.derivative());

    let quot = &d3 / &d1;
    assert_eq!((quot.value(), quot.derivative()), (20., -50.));

    let diff = &d1 - &d2;
    assert_eq!((diff.value(), diff.derivative()), (-2., -2.));
    let neg = -d1;
    assert_eq!((neg.value(), neg.derivative()), (-1., -2.));
}

#[test]
fn test_literal_is_constant() {
    let x = Dual::var("x", 3.);
    let y = 2. * &x + 1.;
    assert_eq!(y.value(), 7.);
    assert_eq!(y.derivative(), 2.);
    assert_eq!(y.label(), "((2*x)+1)");
    assert_eq!(Dual::from(4.), Dual::constant(4.));
}

#[test]
fn test_sin() {
    let x = Dual::var("x", 0.5);
    let s = x.sin();
    assert_eq!(s.value(), 0.5f64.sin());
    assert_eq!(s.derivative(), 0.5f64.cos());
    assert_eq!(s.label(), "sin(x)");

    let seeded = Dual::new("x", 0.5, 3.);
    assert_eq!(seeded.sin().derivative(), 0.5f64.cos() * 3.);
}

#[test]
fn test_elementary() {
    let x = Dual::var("x", 1.5);
    assert_eq!(x.cos().derivative(), -1.5f64.sin());
    assert_eq!(x.exp().derivative(), 1.5f64.exp());
    let p = x.powf(3.);
    assert_eq!(p.value(), 1.5f64.powf(3.));
    assert_eq!(p.derivative(), 3. * 1.5f64.powf(2.));
    assert_eq!(p.label(), "x**3");
}

#[test]
fn test_mixed_expression() {
    // L = (x * y + sin(x)) ** 2, seeded for dL/dx
    let x = Dual::var("x", 2.);
    let y = Dual::new("y", 5., 0.);
    let l = (&x * &y + x.sin()).powf(2.).with_label("L");
    let inner = 2. * 5. + 2f64.sin();
    approx::assert_relative_eq!(l.value(), inner * inner, max_relative = 1e-12);
    approx::assert_relative_eq!(
        l.derivative(),
        2. * inner * (5. + 2f64.cos()),
        max_relative = 1e-12
    );
    assert_eq!(l.label(), "L");
}

#[test]
fn test_nan_propagates() {
    let x = Dual::var("x", -1.);
    let p = x.powf(0.5);
    assert!(p.value().is_nan());
    assert!(p.derivative().is_nan());
}
