//! Arithmetic expressions over scoped value keys.
//!
//! An expression is evaluated forward with [`Expression::solve`]. When one
//! leaf is marked *weak* (`[this.width]` in source) the expression can also be
//! driven backwards: [`Expression::solve_for_and_propagate_weak`] inverts one
//! operator per level until it reaches the weak leaf and writes the value that
//! makes the whole expression equal the requested result.

use std::fmt;

use tracing::warn;

use crate::display_item::ItemId;
use crate::error::ExpressionError;
use crate::value_key::ScopedValueKey;

/// Read access to the values an expression can reference.
pub trait ValueSource {
    fn get_number(&self, context: ItemId, key: &ScopedValueKey) -> f64;
    fn get_string(&self, context: ItemId, key: &ScopedValueKey) -> String;
}

/// Write access used when back-solving a weak term.
pub trait ValueSink: ValueSource {
    fn set_number(&mut self, context: ItemId, key: &ScopedValueKey, value: f64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operator {
    pub fn symbol(self) -> char {
        match self {
            Operator::Add => '+',
            Operator::Subtract => '-',
            Operator::Multiply => '*',
            Operator::Divide => '/',
        }
    }
}

/// Unit tag of a constant. Tags are carried through but evaluate as plain scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Scalar,
    Percent,
    Standard,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionNode {
    Constant {
        value: f64,
        unit: Unit,
    },
    Key {
        key: ScopedValueKey,
        weak: bool,
    },
    Binary {
        op: Operator,
        left: Box<ExpressionNode>,
        right: Box<ExpressionNode>,
        /// Set when either subtree holds the weak term.
        weak_branch: bool,
    },
}

impl ExpressionNode {
    pub fn constant(value: f64) -> Self {
        ExpressionNode::Constant { value, unit: Unit::Scalar }
    }

    pub fn key(key: ScopedValueKey) -> Self {
        ExpressionNode::Key { key, weak: false }
    }

    pub fn weak_key(key: ScopedValueKey) -> Self {
        ExpressionNode::Key { key, weak: true }
    }

    pub fn binary(op: Operator, left: ExpressionNode, right: ExpressionNode) -> Self {
        let weak_branch = left.contains_weak() || right.contains_weak();
        ExpressionNode::Binary { op, left: Box::new(left), right: Box::new(right), weak_branch }
    }

    pub fn contains_weak(&self) -> bool {
        match self {
            ExpressionNode::Constant { .. } => false,
            ExpressionNode::Key { weak, .. } => *weak,
            ExpressionNode::Binary { weak_branch, .. } => *weak_branch,
        }
    }

    fn weak_count(&self) -> usize {
        match self {
            ExpressionNode::Constant { .. } => 0,
            ExpressionNode::Key { weak, .. } => usize::from(*weak),
            ExpressionNode::Binary { left, right, .. } => left.weak_count() + right.weak_count(),
        }
    }

    fn collect_keys<'a>(&'a self, out: &mut Vec<&'a ScopedValueKey>) {
        match self {
            ExpressionNode::Constant { .. } => {}
            ExpressionNode::Key { key, .. } => out.push(key),
            ExpressionNode::Binary { left, right, .. } => {
                left.collect_keys(out);
                right.collect_keys(out);
            }
        }
    }

    fn solve<S: ValueSource + ?Sized>(&self, source: &S, context: ItemId) -> f64 {
        match self {
            ExpressionNode::Constant { value, .. } => *value,
            ExpressionNode::Key { key, .. } => source.get_number(context, key),
            ExpressionNode::Binary { op, left, right, .. } => {
                let l = left.solve(source, context);
                let r = right.solve(source, context);
                match op {
                    Operator::Add => l + r,
                    Operator::Subtract => l - r,
                    Operator::Multiply => l * r,
                    Operator::Divide if r == 0.0 => {
                        warn!("division by zero in expression, evaluating to 0");
                        0.0
                    }
                    Operator::Divide => l / r,
                }
            }
        }
    }

    fn propagate<S: ValueSink + ?Sized>(
        &self,
        sink: &mut S,
        context: ItemId,
        required: f64,
    ) -> Result<f64, ExpressionError> {
        match self {
            ExpressionNode::Key { key, weak: true } => {
                sink.set_number(context, key, required);
                Ok(required)
            }
            ExpressionNode::Binary { op, left, right, weak_branch: true } => {
                debug_assert!(!(left.contains_weak() && right.contains_weak()), "two weak branches");
                let left_unknown = left.contains_weak();
                let (weak, known) = if left_unknown { (left, right) } else { (right, left) };
                let k = known.solve(&*sink, context);
                let next = match (op, left_unknown) {
                    (Operator::Add, _) => required - k,
                    (Operator::Multiply, _) => checked_div(required, k)?,
                    (Operator::Subtract, true) => k + required,
                    (Operator::Subtract, false) => k - required,
                    (Operator::Divide, true) => k * required,
                    (Operator::Divide, false) => checked_div(k, required)?,
                };
                weak.propagate(sink, context, next)
            }
            _ => Err(ExpressionError::NotWeak),
        }
    }
}

fn checked_div(numerator: f64, denominator: f64) -> Result<f64, ExpressionError> {
    if denominator == 0.0 {
        Err(ExpressionError::DivisionByZero)
    } else {
        Ok(numerator / denominator)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    root: ExpressionNode,
}

impl Expression {
    pub fn new(root: ExpressionNode) -> Self {
        Self { root }
    }

    pub fn constant(value: f64) -> Self {
        Self::new(ExpressionNode::constant(value))
    }

    pub fn root(&self) -> &ExpressionNode {
        &self.root
    }

    pub fn contains_weak(&self) -> bool {
        self.root.contains_weak()
    }

    /// Number of weak leaves; anything above one cannot be back-solved.
    pub fn weak_count(&self) -> usize {
        self.root.weak_count()
    }

    pub fn keys(&self) -> Vec<&ScopedValueKey> {
        let mut out = Vec::new();
        self.root.collect_keys(&mut out);
        out
    }

    pub fn solve<S: ValueSource + ?Sized>(&self, source: &S, context: ItemId) -> f64 {
        self.root.solve(source, context)
    }

    /// Writes whatever value the weak leaf needs for the expression to equal
    /// `required`. Nothing is written on error.
    pub fn solve_for_and_propagate_weak<S: ValueSink + ?Sized>(
        &self,
        sink: &mut S,
        context: ItemId,
        required: f64,
    ) -> Result<f64, ExpressionError> {
        if !self.contains_weak() {
            warn!(expression = %self, "attempted to solve for unknown on a constant expression");
            return Err(ExpressionError::NotWeak);
        }
        self.root.propagate(sink, context, required)
    }
}

impl fmt::Display for ExpressionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionNode::Constant { value, unit } => {
                write!(f, "{value}")?;
                match unit {
                    Unit::Scalar => Ok(()),
                    Unit::Percent => f.write_str("%"),
                    Unit::Standard => f.write_str("u"),
                }
            }
            ExpressionNode::Key { key, weak: true } => write!(f, "[{key}]"),
            ExpressionNode::Key { key, weak: false } => write!(f, "{key}"),
            ExpressionNode::Binary { op, left, right, .. } => write!(f, "({left} {} {right})", op.symbol()),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root.fmt(f)
    }
}
