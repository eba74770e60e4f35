use std::fmt;

use super::{StateKey, StateManager};
use crate::value_key::ScopedValueKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOp {
    And,
    Or,
    Xor,
}

impl StateOp {
    fn symbol(self) -> &'static str {
        match self {
            StateOp::And => "&",
            StateOp::Or => "|",
            StateOp::Xor => "xor",
        }
    }
}

/// Boolean expression over state keys. Any node may be negated.
#[derive(Debug, Clone, PartialEq)]
pub enum StateExpr<K> {
    Leaf {
        key: K,
        negated: bool,
    },
    Branch {
        op: StateOp,
        left: Box<StateExpr<K>>,
        right: Box<StateExpr<K>>,
        negated: bool,
    },
}

impl<K> StateExpr<K> {
    pub fn leaf(key: K) -> Self {
        StateExpr::Leaf { key, negated: false }
    }

    pub fn branch(op: StateOp, left: StateExpr<K>, right: StateExpr<K>) -> Self {
        StateExpr::Branch { op, left: Box::new(left), right: Box::new(right), negated: false }
    }

    pub fn negate(mut self) -> Self {
        match &mut self {
            StateExpr::Leaf { negated, .. } | StateExpr::Branch { negated, .. } => *negated = !*negated,
        }
        self
    }

    /// A lone, non-negated key needs no proxy.
    pub fn as_plain_key(&self) -> Option<&K> {
        match self {
            StateExpr::Leaf { key, negated: false } => Some(key),
            _ => None,
        }
    }

    pub fn keys(&self) -> Vec<&K> {
        let mut out = Vec::new();
        self.collect_keys(&mut out);
        out
    }

    fn collect_keys<'a>(&'a self, out: &mut Vec<&'a K>) {
        match self {
            StateExpr::Leaf { key, .. } => out.push(key),
            StateExpr::Branch { left, right, .. } => {
                left.collect_keys(out);
                right.collect_keys(out);
            }
        }
    }

    pub fn evaluate(&self, check: &impl Fn(&K) -> bool) -> bool {
        match self {
            StateExpr::Leaf { key, negated } => check(key) != *negated,
            StateExpr::Branch { op, left, right, negated } => {
                let l = left.evaluate(check);
                let r = right.evaluate(check);
                let value = match op {
                    StateOp::And => l && r,
                    StateOp::Or => l || r,
                    StateOp::Xor => l != r,
                };
                value != *negated
            }
        }
    }

    pub fn map<T>(&self, f: &mut impl FnMut(&K) -> T) -> StateExpr<T> {
        match self {
            StateExpr::Leaf { key, negated } => StateExpr::Leaf { key: f(key), negated: *negated },
            StateExpr::Branch { op, left, right, negated } => StateExpr::Branch {
                op: *op,
                left: Box::new(left.map(f)),
                right: Box::new(right.map(f)),
                negated: *negated,
            },
        }
    }
}

impl<K: fmt::Display> fmt::Display for StateExpr<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateExpr::Leaf { key, negated } => {
                if *negated {
                    f.write_str("!")?;
                }
                write!(f, "{key}")
            }
            StateExpr::Branch { op, left, right, negated } => {
                if *negated {
                    f.write_str("!")?;
                }
                write!(f, "({left} {} {right})", op.symbol())
            }
        }
    }
}

/// A derived state. The proxy state mirrors the expression's value and is
/// re-synced whenever one of the leaf states commits a change.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualStateKey {
    pub proxy: StateKey,
    pub expr: StateExpr<StateKey>,
}

impl VirtualStateKey {
    pub fn affected_keys(&self) -> Vec<&StateKey> {
        self.expr.keys()
    }

    pub fn evaluate(&self, states: &StateManager) -> bool {
        self.expr.evaluate(&|key| states.check_state(key))
    }
}

/// Template form of a virtual key, resolved per display item.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualStateKeyPrecursor {
    /// Element scoped and path-less.
    pub proxy: ScopedValueKey,
    pub expr: StateExpr<ScopedValueKey>,
}

impl VirtualStateKeyPrecursor {
    pub fn resolve(&self, mut resolve_key: impl FnMut(&ScopedValueKey) -> StateKey) -> VirtualStateKey {
        VirtualStateKey { proxy: resolve_key(&self.proxy), expr: self.expr.map(&mut resolve_key) }
    }
}

impl fmt::Display for VirtualStateKeyPrecursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} := {}", self.proxy, self.expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr() -> StateExpr<&'static str> {
        StateExpr::branch(StateOp::And, StateExpr::leaf("a"), StateExpr::leaf("b").negate())
    }

    #[test]
    fn test_evaluate_with_negation() {
        let e = expr();
        assert!(e.evaluate(&|k| *k == "a"));
        assert!(!e.evaluate(&|_| true));
        assert!(e.clone().negate().evaluate(&|_| true));
    }

    #[test]
    fn test_xor_and_keys() {
        let e = StateExpr::branch(StateOp::Xor, StateExpr::leaf("a"), StateExpr::leaf("b"));
        assert!(e.evaluate(&|k| *k == "b"));
        assert!(!e.evaluate(&|_| false));
        assert_eq!(e.keys(), vec![&"a", &"b"]);
        assert_eq!(e.to_string(), "(a xor b)");
    }

    #[test]
    fn test_plain_key() {
        assert_eq!(StateExpr::leaf("a").as_plain_key(), Some(&"a"));
        assert_eq!(StateExpr::leaf("a").negate().as_plain_key(), None);
        assert_eq!(expr().as_plain_key(), None);
    }
}
