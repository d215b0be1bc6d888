//! Implementation of shared memory arena for the terms, aka a tape.
//! See https://rufflewind.com/2016-12-30/reverse-mode-automatic-differentiation
//!
//! Every node lives in the [`Tape`] and refers to its operands by index. An operand is
//! always pushed before the node using it, so the graph can never contain a cycle, and
//! dropping the tape frees the whole graph at once.

use std::{cell::RefCell, collections::BTreeSet, fmt::Display};

use crate::error::{AutodiffError, Result};

#[derive(Default, Debug)]
pub struct Tape {
    nodes: RefCell<Vec<TapeNode>>,
}

#[derive(Clone, Debug)]
struct TapeNode {
    name: String,
    value: TapeValue,
    data: f64,
    grad: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum TapeValue {
    Value(f64),
    Add(u32, u32),
    Sub(u32, u32),
    Mul(u32, u32),
    Div(u32, u32),
    Neg(u32),
    Sin(u32),
    Cos(u32),
    Exp(u32),
    Pow(u32, f64),
}

impl TapeValue {
    /// Operand indices with duplicates removed, so `x * x` has the single parent `x`.
    fn parents(&self) -> [Option<u32>; 2] {
        use TapeValue::*;
        match *self {
            Value(_) => [None, None],
            Add(lhs, rhs) | Sub(lhs, rhs) | Mul(lhs, rhs) | Div(lhs, rhs) => {
                [Some(lhs), (lhs != rhs).then_some(rhs)]
            }
            Neg(term) | Sin(term) | Cos(term) | Exp(term) | Pow(term, _) => [Some(term), None],
        }
    }

    fn tag(&self) -> String {
        use TapeValue::*;
        match *self {
            Value(_) => String::new(),
            Add(..) => "+".to_string(),
            Sub(..) => "-".to_string(),
            Mul(..) => "*".to_string(),
            Div(..) => "/".to_string(),
            Neg(_) => "neg".to_string(),
            Sin(_) => "sin".to_string(),
            Cos(_) => "cos".to_string(),
            Exp(_) => "exp".to_string(),
            Pow(_, exponent) => format!("**{exponent}"),
        }
    }

    fn eval(&self, nodes: &[TapeNode]) -> f64 {
        use TapeValue::*;
        let data = |idx: u32| nodes[idx as usize].data;
        match *self {
            Value(val) => val,
            Add(lhs, rhs) => data(lhs) + data(rhs),
            Sub(lhs, rhs) => data(lhs) - data(rhs),
            Mul(lhs, rhs) => data(lhs) * data(rhs),
            Div(lhs, rhs) => data(lhs) / data(rhs),
            Neg(term) => -data(term),
            Sin(term) => data(term).sin(),
            Cos(term) => data(term).cos(),
            Exp(term) => data(term).exp(),
            Pow(term, exponent) => data(term).powf(exponent),
        }
    }
}

/// Handle to a node in a [`Tape`]. Cheap to copy; arithmetic on handles records new nodes.
#[derive(Copy, Clone)]
pub struct TapeTerm<'a> {
    tape: &'a Tape,
    idx: u32,
}

impl std::fmt::Debug for TapeTerm<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TapeTerm")
            .field("idx", &self.idx)
            .field("data", &self.value())
            .finish()
    }
}

/// Index of a node in its tape, as reported by the introspection methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "a{}", self.0)
    }
}

/// Operand of a tape operation: either an existing term or a literal that is promoted
/// to a constant leaf.
#[derive(Clone, Copy, Debug)]
pub enum Operand<'a> {
    Term(TapeTerm<'a>),
    Const(f64),
}

impl<'a> From<TapeTerm<'a>> for Operand<'a> {
    fn from(term: TapeTerm<'a>) -> Self {
        Self::Term(term)
    }
}

impl<'a> From<&TapeTerm<'a>> for Operand<'a> {
    fn from(term: &TapeTerm<'a>) -> Self {
        Self::Term(*term)
    }
}

impl From<f64> for Operand<'_> {
    fn from(value: f64) -> Self {
        Self::Const(value)
    }
}

/// Snapshot of a node for renderers and reports.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeInfo {
    pub id: NodeId,
    pub label: String,
    /// Empty for leaves.
    pub op_tag: String,
    pub value: f64,
    pub grad: f64,
    pub parents: Vec<NodeId>,
}

/// Nodes reachable from a root, in topological order, with `(parent, child)` edges.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Graph {
    pub nodes: Vec<NodeInfo>,
    pub edges: BTreeSet<(NodeId, NodeId)>,
}

impl Tape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: RefCell::new(Vec::with_capacity(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    /// Adds an input leaf.
    pub fn term<'a>(&'a self, name: impl Into<String>, init: f64) -> TapeTerm<'a> {
        self.push(Some(name.into()), TapeValue::Value(init))
    }

    /// Adds a constant leaf labelled by its value.
    pub fn constant(&self, value: f64) -> TapeTerm<'_> {
        self.push(Some(format!("{value}")), TapeValue::Value(value))
    }

    fn push(&self, name: Option<String>, value: TapeValue) -> TapeTerm<'_> {
        let mut nodes = self.nodes.borrow_mut();
        let idx = node_index(nodes.len());
        let data = value.eval(&nodes);
        let name = name.unwrap_or_else(|| op_name(&nodes, idx, &value));
        log::trace!("a{idx} = {} {name}: {data}", value.tag());
        nodes.push(TapeNode {
            name,
            value,
            data,
            grad: 0.,
        });
        TapeTerm { tape: self, idx }
    }

    fn check(&self, operand: &Operand<'_>) -> Result<()> {
        match operand {
            Operand::Term(term) if !std::ptr::eq(term.tape, self) => {
                Err(AutodiffError::foreign_term(term.idx))
            }
            _ => Ok(()),
        }
    }

    /// Call only after `check`, since promoting a literal pushes a node.
    fn resolve(&self, operand: Operand<'_>) -> u32 {
        match operand {
            Operand::Term(term) => term.idx,
            Operand::Const(value) => self.constant(value).idx,
        }
    }

    fn binary<'a>(
        &'a self,
        lhs: Operand<'a>,
        rhs: Operand<'a>,
        op: fn(u32, u32) -> TapeValue,
    ) -> Result<TapeTerm<'a>> {
        self.check(&lhs)?;
        self.check(&rhs)?;
        let lhs = self.resolve(lhs);
        let rhs = self.resolve(rhs);
        Ok(self.push(None, op(lhs, rhs)))
    }

    fn unary<'a>(
        &'a self,
        term: Operand<'a>,
        op: impl FnOnce(u32) -> TapeValue,
    ) -> Result<TapeTerm<'a>> {
        self.check(&term)?;
        let term = self.resolve(term);
        Ok(self.push(None, op(term)))
    }

    pub fn add<'a>(
        &'a self,
        lhs: impl Into<Operand<'a>>,
        rhs: impl Into<Operand<'a>>,
    ) -> Result<TapeTerm<'a>> {
        self.binary(lhs.into(), rhs.into(), TapeValue::Add)
    }

    pub fn sub<'a>(
        &'a self,
        lhs: impl Into<Operand<'a>>,
        rhs: impl Into<Operand<'a>>,
    ) -> Result<TapeTerm<'a>> {
        self.binary(lhs.into(), rhs.into(), TapeValue::Sub)
    }

    pub fn mul<'a>(
        &'a self,
        lhs: impl Into<Operand<'a>>,
        rhs: impl Into<Operand<'a>>,
    ) -> Result<TapeTerm<'a>> {
        self.binary(lhs.into(), rhs.into(), TapeValue::Mul)
    }

    pub fn div<'a>(
        &'a self,
        lhs: impl Into<Operand<'a>>,
        rhs: impl Into<Operand<'a>>,
    ) -> Result<TapeTerm<'a>> {
        self.binary(lhs.into(), rhs.into(), TapeValue::Div)
    }

    pub fn neg<'a>(&'a self, term: impl Into<Operand<'a>>) -> Result<TapeTerm<'a>> {
        self.unary(term.into(), TapeValue::Neg)
    }

    pub fn sin<'a>(&'a self, term: impl Into<Operand<'a>>) -> Result<TapeTerm<'a>> {
        self.unary(term.into(), TapeValue::Sin)
    }

    pub fn cos<'a>(&'a self, term: impl Into<Operand<'a>>) -> Result<TapeTerm<'a>> {
        self.unary(term.into(), TapeValue::Cos)
    }

    pub fn exp<'a>(&'a self, term: impl Into<Operand<'a>>) -> Result<TapeTerm<'a>> {
        self.unary(term.into(), TapeValue::Exp)
    }

    /// Power with a constant exponent.
    pub fn pow<'a>(&'a self, term: impl Into<Operand<'a>>, exponent: f64) -> Result<TapeTerm<'a>> {
        self.unary(term.into(), |term| TapeValue::Pow(term, exponent))
    }

    /// Resets the gradient of every node on this tape to zero.
    pub fn zero_grad(&self) {
        for node in self.nodes.borrow_mut().iter_mut() {
            node.grad = 0.;
        }
    }

    /// Looks up a term by the id reported in a [`Graph`] or [`NodeInfo`].
    pub fn get(&self, id: NodeId) -> Result<TapeTerm<'_>> {
        let len = self.len();
        if id.index() < len {
            Ok(TapeTerm {
                tape: self,
                idx: id.0,
            })
        } else {
            Err(AutodiffError::out_of_range(id.0, len))
        }
    }

    pub fn node(&self, id: NodeId) -> Result<NodeInfo> {
        let nodes = self.nodes.borrow();
        if id.index() < nodes.len() {
            Ok(node_info(&nodes, id.0))
        } else {
            Err(AutodiffError::out_of_range(id.0, nodes.len()))
        }
    }
}

/// Handles are `u32`, so a tape holds at most `u32::MAX + 1` nodes.
fn node_index(len: usize) -> u32 {
    match u32::try_from(len) {
        Ok(idx) => idx,
        Err(_) => panic!("tape cannot hold more than {} nodes", u32::MAX as u64 + 1),
    }
}

#[cfg(feature = "expr_name")]
fn op_name(nodes: &[TapeNode], _idx: u32, value: &TapeValue) -> String {
    use TapeValue::*;
    let name = |idx: u32| nodes[idx as usize].name.as_str();
    match *value {
        Value(val) => format!("{val}"),
        Add(lhs, rhs) => format!("({} + {})", name(lhs), name(rhs)),
        Sub(lhs, rhs) => format!("({} - {})", name(lhs), name(rhs)),
        Mul(lhs, rhs) => format!("({} * {})", name(lhs), name(rhs)),
        Div(lhs, rhs) => format!("({} / {})", name(lhs), name(rhs)),
        Neg(term) => format!("-{}", name(term)),
        Sin(term) => format!("sin({})", name(term)),
        Cos(term) => format!("cos({})", name(term)),
        Exp(term) => format!("exp({})", name(term)),
        Pow(term, exponent) => format!("{}**{exponent}", name(term)),
    }
}

#[cfg(not(feature = "expr_name"))]
fn op_name(_nodes: &[TapeNode], idx: u32, _value: &TapeValue) -> String {
    format!("a{idx}")
}

fn node_info(nodes: &[TapeNode], idx: u32) -> NodeInfo {
    let node = &nodes[idx as usize];
    NodeInfo {
        id: NodeId(idx),
        label: node.name.clone(),
        op_tag: node.value.tag(),
        value: node.data,
        grad: node.grad,
        parents: node.value.parents().into_iter().flatten().map(NodeId).collect(),
    }
}

/// Orders the nodes reachable from `root` so that every node comes after its parents.
/// Uses an explicit work list instead of recursion, so deep expressions do not overflow the stack.
fn topological_order(nodes: &[TapeNode], root: u32) -> Vec<u32> {
    let mut visited = vec![false; root as usize + 1];
    let mut order = vec![];
    let mut stack = vec![(root, false)];
    while let Some((idx, expanded)) = stack.pop() {
        if expanded {
            order.push(idx);
            continue;
        }
        if std::mem::replace(&mut visited[idx as usize], true) {
            continue;
        }
        stack.push((idx, true));
        for parent in nodes[idx as usize].value.parents().into_iter().rev().flatten() {
            if !visited[parent as usize] {
                stack.push((parent, false));
            }
        }
    }
    order
}

/// Adds the contribution of node `idx`'s gradient to its operands.
fn backprop_node(nodes: &mut [TapeNode], idx: u32) {
    use TapeValue::*;
    let TapeNode { value, data, grad, .. } = nodes[idx as usize];
    let data_of = |idx: u32| nodes[idx as usize].data;
    let contributions = match value {
        Value(_) => [None, None],
        Add(lhs, rhs) => [Some((lhs, grad)), Some((rhs, grad))],
        Sub(lhs, rhs) => [Some((lhs, grad)), Some((rhs, -grad))],
        Mul(lhs, rhs) => [
            Some((lhs, data_of(rhs) * grad)),
            Some((rhs, data_of(lhs) * grad)),
        ],
        Div(lhs, rhs) => {
            let (lhs_data, rhs_data) = (data_of(lhs), data_of(rhs));
            [
                Some((lhs, grad / rhs_data)),
                Some((rhs, -lhs_data / (rhs_data * rhs_data) * grad)),
            ]
        }
        Neg(term) => [Some((term, -grad)), None],
        Sin(term) => [Some((term, data_of(term).cos() * grad)), None],
        Cos(term) => [Some((term, -data_of(term).sin() * grad)), None],
        Exp(term) => [Some((term, data * grad)), None],
        Pow(term, exponent) => [
            Some((term, exponent * data_of(term).powf(exponent - 1.) * grad)),
            None,
        ],
    };
    // Both entries may name the same parent (`x * x`), each adds its own share.
    for (parent, contribution) in contributions.into_iter().flatten() {
        nodes[parent as usize].grad += contribution;
    }
}

/// Derivative of node `idx` given the derivatives of its operands.
fn tangent(nodes: &[TapeNode], tangents: &[f64], idx: u32) -> f64 {
    use TapeValue::*;
    let data = |idx: u32| nodes[idx as usize].data;
    let d = |idx: u32| tangents[idx as usize];
    match nodes[idx as usize].value {
        Value(_) => 0.,
        Add(lhs, rhs) => d(lhs) + d(rhs),
        Sub(lhs, rhs) => d(lhs) - d(rhs),
        Mul(lhs, rhs) => d(lhs) * data(rhs) + data(lhs) * d(rhs),
        Div(lhs, rhs) => (d(lhs) * data(rhs) - data(lhs) * d(rhs)) / (data(rhs) * data(rhs)),
        Neg(term) => -d(term),
        Sin(term) => data(term).cos() * d(term),
        Cos(term) => -data(term).sin() * d(term),
        Exp(term) => data(idx) * d(term),
        Pow(term, exponent) => exponent * data(term).powf(exponent - 1.) * d(term),
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        /// # Panics
        ///
        /// Panics if the operands belong to different tapes. Use the builder methods on
        /// [`Tape`] to get an error instead.
        impl<'a> std::ops::$trait for TapeTerm<'a> {
            type Output = Self;
            fn $method(self, rhs: Self) -> Self::Output {
                assert!(
                    std::ptr::eq(self.tape, rhs.tape),
                    "cannot combine terms of different tapes"
                );
                self.tape.push(None, TapeValue::$variant(self.idx, rhs.idx))
            }
        }

        impl<'a> std::ops::$trait<f64> for TapeTerm<'a> {
            type Output = Self;
            fn $method(self, rhs: f64) -> Self::Output {
                let rhs = self.tape.constant(rhs);
                self.tape.push(None, TapeValue::$variant(self.idx, rhs.idx))
            }
        }

        impl<'a> std::ops::$trait<TapeTerm<'a>> for f64 {
            type Output = TapeTerm<'a>;
            fn $method(self, rhs: TapeTerm<'a>) -> Self::Output {
                let lhs = rhs.tape.constant(self);
                rhs.tape.push(None, TapeValue::$variant(lhs.idx, rhs.idx))
            }
        }
    };
}

impl_binary_op!(Add, add, Add);
impl_binary_op!(Sub, sub, Sub);
impl_binary_op!(Mul, mul, Mul);
impl_binary_op!(Div, div, Div);

impl<'a> std::ops::Neg for TapeTerm<'a> {
    type Output = Self;
    fn neg(self) -> Self::Output {
        self.tape.push(None, TapeValue::Neg(self.idx))
    }
}

impl<'a> TapeTerm<'a> {
    pub fn id(&self) -> NodeId {
        NodeId(self.idx)
    }

    /// The value computed when this node was recorded.
    pub fn value(&self) -> f64 {
        self.tape.nodes.borrow()[self.idx as usize].data
    }

    pub fn grad(&self) -> f64 {
        self.tape.nodes.borrow()[self.idx as usize].grad
    }

    pub fn label(&self) -> String {
        self.tape.nodes.borrow()[self.idx as usize].name.clone()
    }

    /// Renames the node. Labels are only used for display.
    pub fn set_label(&self, name: impl Into<String>) {
        self.tape.nodes.borrow_mut()[self.idx as usize].name = name.into();
    }

    pub fn op_tag(&self) -> String {
        self.tape.nodes.borrow()[self.idx as usize].value.tag()
    }

    pub fn parents(&self) -> Vec<TapeTerm<'a>> {
        let value = self.tape.nodes.borrow()[self.idx as usize].value;
        value
            .parents()
            .into_iter()
            .flatten()
            .map(|idx| TapeTerm {
                tape: self.tape,
                idx,
            })
            .collect()
    }

    pub fn info(&self) -> NodeInfo {
        node_info(&self.tape.nodes.borrow(), self.idx)
    }

    pub fn sin(self) -> Self {
        self.tape.push(None, TapeValue::Sin(self.idx))
    }

    pub fn cos(self) -> Self {
        self.tape.push(None, TapeValue::Cos(self.idx))
    }

    pub fn exp(self) -> Self {
        self.tape.push(None, TapeValue::Exp(self.idx))
    }

    pub fn pow(self, exponent: f64) -> Self {
        self.tape.push(None, TapeValue::Pow(self.idx, exponent))
    }

    /// The entry point to backpropagation. Seeds this node with gradient 1 and adds the
    /// gradient of this node with respect to every node it depends on.
    ///
    /// Gradients are not cleared beforehand, so running it twice accumulates.
    /// Call [`Tape::zero_grad`] in between to start over.
    pub fn backward(&self) {
        let mut nodes = self.tape.nodes.borrow_mut();
        let order = topological_order(&nodes, self.idx);
        log::debug!("backward from a{}: {} nodes", self.idx, order.len());
        nodes[self.idx as usize].grad = 1.;
        for &idx in order.iter().rev() {
            backprop_node(&mut nodes, idx);
        }
    }

    /// One-time derivation. Does not update internal gradient values.
    pub fn derive(&self, var: &Self) -> Result<f64> {
        if !std::ptr::eq(self.tape, var.tape) {
            return Err(AutodiffError::foreign_term(var.idx));
        }
        let nodes = self.tape.nodes.borrow();
        let order = topological_order(&nodes, self.idx);
        let mut tangents = vec![0.; self.idx as usize + 1];
        for idx in order {
            tangents[idx as usize] = if idx == var.idx {
                1.
            } else {
                tangent(&nodes, &tangents, idx)
            };
        }
        Ok(tangents[self.idx as usize])
    }

    /// Collects the subgraph this term depends on without touching gradients.
    pub fn graph(&self) -> Graph {
        let nodes = self.tape.nodes.borrow();
        let order = topological_order(&nodes, self.idx);
        let nodes: Vec<_> = order.into_iter().map(|idx| node_info(&nodes, idx)).collect();
        let edges = nodes
            .iter()
            .flat_map(|node| node.parents.iter().map(|&parent| (parent, node.id)))
            .collect();
        Graph { nodes, edges }
    }
}

#[test]
fn test_add_mul() {
    let tape = Tape::new();
    let a = tape.term("a", 123.);
    let b = tape.term("b", 321.);
    let c = tape.term("c", 42.);
    let abc = (a + b) * c;
    assert_eq!(abc.value(), (123. + 321.) * 42.);
    abc.backward();
    assert_eq!(a.grad(), 42.);
    assert_eq!(b.grad(), 42.);
    assert_eq!(c.grad(), 123. + 321.);
    assert_eq!(abc.grad(), 1.);
}

#[test]
fn test_fan_out() {
    let tape = Tape::new();
    let x = tape.term("x", 3.);
    let z = x * x;
    z.backward();
    assert_eq!(x.grad(), 6.);
    assert_eq!(z.parents().len(), 1);
}

#[test]
fn test_leaf_isolation() {
    let tape = Tape::new();
    let x = tape.term("x", 3.);
    let y = tape.term("y", 4.);
    let z = x * y;
    x.backward();
    assert_eq!(x.grad(), 1.);
    assert_eq!(y.grad(), 0.);
    assert_eq!(z.grad(), 0.);
    assert_eq!(tape.len(), 3);
}

#[test]
fn test_sub_div_neg() {
    let tape = Tape::new();
    let a = tape.term("a", 6.);
    let b = tape.term("b", 2.);
    let c = -(a - b) / b;
    assert_eq!(c.value(), -2.);
    c.backward();
    assert_eq!(a.grad(), -0.5);
    // d/db of -(a - b) / b = 1 / b + (a - b) / b^2 = 0.5 + 1
    assert_eq!(b.grad(), 1.5);
}

#[test]
fn test_elementary_grads() {
    let tape = Tape::new();
    let x = tape.term("x", 0.7);
    let y = x.sin() + x.cos() + x.exp() + x.pow(3.);
    y.backward();
    let expected = 0.7f64.cos() - 0.7f64.sin() + 0.7f64.exp() + 3. * 0.7f64.powf(2.);
    approx::assert_relative_eq!(x.grad(), expected, max_relative = 1e-12);
}

#[test]
fn test_literal_promotion() {
    let tape = Tape::new();
    let x = tape.term("x", 2.);
    let y = tape.add(x, 3.).unwrap();
    assert_eq!(y.value(), 5.);
    assert_eq!(tape.len(), 3);
    let three = y.parents()[1];
    assert_eq!(three.label(), "3");
    assert_eq!(three.op_tag(), "");

    let z = 2. * y - 1.;
    assert_eq!(z.value(), 9.);
    z.backward();
    assert_eq!(x.grad(), 2.);
}

#[test]
fn test_foreign_operand() {
    let tape = Tape::new();
    let other = Tape::new();
    let x = tape.term("x", 1.);
    let y = other.term("y", 2.);
    assert!(matches!(
        tape.add(x, y),
        Err(AutodiffError::InvalidOperand(_))
    ));
    assert!(tape.mul(y, 3.).is_err());
    assert!(tape.sin(y).is_err());
    // A failed operation must not leave a promoted literal behind.
    assert_eq!(tape.len(), 1);
    assert_eq!(other.len(), 1);
}

#[test]
fn test_foreign_derive() {
    let tape = Tape::new();
    let other = Tape::new();
    let x = tape.term("x", 3.);
    let l = x * x;
    let y = other.term("y", 2.);
    assert_eq!(l.derive(&y), Err(AutodiffError::foreign_term(y.idx)));
    assert_eq!(l.derive(&x), Ok(6.));
}

#[test]
fn test_builder_ops() {
    let tape = Tape::new();
    let a = tape.term("a", 6.);
    let b = tape.term("b", 2.);

    let diff = tape.sub(a, b).unwrap();
    assert_eq!((diff.value(), diff.op_tag()), (4., "-".to_string()));
    let quot = tape.div(a, b).unwrap();
    assert_eq!((quot.value(), quot.op_tag()), (3., "/".to_string()));
    let neg = tape.neg(a).unwrap();
    assert_eq!((neg.value(), neg.op_tag()), (-6., "neg".to_string()));
    let cos = tape.cos(b).unwrap();
    assert_eq!((cos.value(), cos.op_tag()), (2f64.cos(), "cos".to_string()));
    let exp = tape.exp(b).unwrap();
    assert_eq!((exp.value(), exp.op_tag()), (2f64.exp(), "exp".to_string()));

    let lhs = tape.add(tape.add(diff, quot).unwrap(), neg).unwrap();
    let root = tape.add(lhs, tape.add(cos, exp).unwrap()).unwrap();
    root.backward();
    // d/da (a - b) + a / b - a = 1 + 1 / b - 1
    assert_eq!(a.grad(), 0.5);
    // d/db -1 - a / b^2 - sin(b) + exp(b)
    approx::assert_relative_eq!(
        b.grad(),
        -1. - 6. / 4. - 2f64.sin() + 2f64.exp(),
        max_relative = 1e-12
    );

    let literal = tape.sub(1., a).unwrap();
    assert_eq!(literal.value(), -5.);
}

#[test]
fn test_builder_foreign_operand() {
    let tape = Tape::new();
    let other = Tape::new();
    let x = tape.term("x", 1.);
    let y = other.term("y", 2.);
    assert!(tape.sub(x, y).is_err());
    assert!(tape.sub(y, 1.).is_err());
    assert!(tape.div(2., y).is_err());
    assert!(tape.neg(y).is_err());
    assert!(tape.cos(y).is_err());
    assert!(tape.exp(y).is_err());
    assert!(tape.pow(y, 2.).is_err());
    assert_eq!(tape.len(), 1);
}

#[test]
#[should_panic(expected = "cannot hold more than 4294967296 nodes")]
fn test_node_index_limit() {
    assert_eq!(node_index(u32::MAX as usize), u32::MAX);
    node_index(u32::MAX as usize + 1);
}

#[test]
#[should_panic(expected = "different tapes")]
fn test_foreign_operator_panics() {
    let tape = Tape::new();
    let other = Tape::new();
    let _ = tape.term("x", 1.) + other.term("y", 2.);
}

#[test]
fn test_accumulate_and_zero_grad() {
    let tape = Tape::new();
    let x = tape.term("x", 2.);
    let y = x * 5.;
    y.backward();
    y.backward();
    assert_eq!(x.grad(), 10.);
    assert_eq!(y.grad(), 1.);
    tape.zero_grad();
    assert_eq!(x.grad(), 0.);
    y.backward();
    assert_eq!(x.grad(), 5.);
}

#[test]
fn test_op_tags() {
    let tape = Tape::new();
    let x = tape.term("x", 2.);
    assert_eq!(x.op_tag(), "");
    assert_eq!((x + x).op_tag(), "+");
    assert_eq!((x * x).op_tag(), "*");
    assert_eq!(x.sin().op_tag(), "sin");
    assert_eq!(x.pow(2.).op_tag(), "**2");
    assert_eq!(x.pow(0.5).op_tag(), "**0.5");
}

#[cfg(not(feature = "expr_name"))]
#[test]
fn test_default_labels() {
    let tape = Tape::new();
    let x = tape.term("x", 2.);
    let y = tape.term("y", 1.);
    let z = x * y;
    assert_eq!(z.label(), "a2");
    z.set_label("z");
    assert_eq!(z.label(), "z");
}

#[cfg(feature = "expr_name")]
#[test]
fn test_expr_labels() {
    let tape = Tape::new();
    let x = tape.term("x", 2.);
    let y = tape.term("y", 1.);
    let z = (x * y + x.sin()).pow(2.);
    assert_eq!(z.label(), "((x * y) + sin(x))**2");

    let c = tape.term("c", 4.);
    assert_eq!((x / (y * c)).label(), "(x / (y * c))");
    assert_eq!((x / y * c).label(), "((x / y) * c)");
}

#[test]
fn test_topological_order() {
    let tape = Tape::new();
    let a = tape.term("a", 1.);
    let b = tape.term("b", 3.);
    let c = tape.term("c", 5.);
    let abac = (a + b) + (a + c);
    let nodes = tape.nodes.borrow();
    let order = topological_order(&nodes, abac.idx);
    assert_eq!(order.len(), 6);
    let position = |idx: u32| order.iter().position(|&i| i == idx).unwrap();
    for &idx in &order {
        for parent in nodes[idx as usize].value.parents().into_iter().flatten() {
            assert!(position(parent) < position(idx));
        }
    }
    assert_eq!(*order.last().unwrap(), abac.idx);
}

#[test]
fn test_graph() {
    let tape = Tape::new();
    let x = tape.term("x", 2.);
    let y = tape.term("y", 5.);
    let unused = tape.term("unused", 0.);
    let z = x * x + y;
    let graph = z.graph();
    assert_eq!(graph.nodes.len(), 4);
    assert!(graph.nodes.iter().all(|node| node.id != unused.id()));
    assert_eq!(graph.edges.len(), 3);
    assert!(graph.edges.contains(&(x.id(), z.parents()[0].id())));
    assert!(graph.nodes.iter().all(|node| node.grad == 0.));
}

#[test]
fn test_node_lookup() {
    let tape = Tape::new();
    let x = tape.term("x", 2.);
    let y = x.sin();
    let info = tape.node(y.id()).unwrap();
    assert_eq!(info.parents, vec![x.id()]);
    assert_eq!(info.op_tag, "sin");
    assert_eq!(tape.get(x.id()).unwrap().value(), 2.);
    assert_eq!(
        tape.node(NodeId(5)),
        Err(AutodiffError::out_of_range(5, 2))
    );
    assert!(tape.get(NodeId(2)).is_err());
}

#[test]
fn test_derive() {
    let tape = Tape::new();
    let x = tape.term("x", 2.);
    let y = tape.term("y", 5.);
    let l = (x * y + x.sin()).pow(2.);
    let inner = 10. + 2f64.sin();
    approx::assert_relative_eq!(
        l.derive(&x).unwrap(),
        2. * inner * (5. + 2f64.cos()),
        max_relative = 1e-12
    );
    approx::assert_relative_eq!(
        l.derive(&y).unwrap(),
        2. * inner * 2.,
        max_relative = 1e-12
    );
    assert_eq!(l.derive(&l), Ok(1.));
    assert_eq!(x.derive(&l), Ok(0.));
    assert_eq!(x.grad(), 0.);
}

#[test]
fn test_deep_chain() {
    let tape = Tape::with_capacity(400_001);
    let x = tape.term("x", 1.);
    let mut y = x;
    for _ in 0..100_000 {
        y = y * 1. + 0.;
    }
    y.backward();
    assert_eq!(x.grad(), 1.);
}
