use std::rc::Rc;

use crate::color::Color;
use crate::display_item::ItemId;
use crate::expression::{Expression, ValueSource};
use crate::keywords::Property;
use crate::reference::ReferenceAttribute;
use crate::value_key::ScopedValueKey;

fn fill<T: Clone>(mine: &mut Option<T>, other: &Option<T>) {
    if mine.is_none() {
        mine.clone_from(other);
    }
}

/// One merged snapshot of an attribute. Expressions are shared with the
/// element layers they came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeAttribute {
    pub(crate) clear: bool,
    pub(crate) property: Option<Property>,
    pub(crate) starting: Option<Rc<Expression>>,
    pub(crate) min: Option<Rc<Expression>>,
    pub(crate) max: Option<Rc<Expression>>,
    pub(crate) expr: Option<Rc<Expression>>,
    pub(crate) color: Option<Color>,
    pub(crate) literal: Option<String>,
    pub(crate) literal_list: Vec<String>,
    pub(crate) single_key: Option<ScopedValueKey>,
    pub(crate) keys: Vec<ScopedValueKey>,
}

impl RuntimeAttribute {
    pub fn reset(&mut self) {
        *self = RuntimeAttribute::default();
    }

    /// Takes every field still unset. Lists accumulate.
    pub fn merge(&mut self, other: &ReferenceAttribute) {
        self.clear |= other.clear;
        fill(&mut self.property, &other.property);
        fill(&mut self.starting, &other.starting);
        fill(&mut self.min, &other.min);
        fill(&mut self.max, &other.max);
        fill(&mut self.expr, &other.expr);
        fill(&mut self.color, &other.color);
        fill(&mut self.literal, &other.literal);
        fill(&mut self.single_key, &other.single_key);
        self.keys.extend(other.keys.iter().cloned());
        self.literal_list.extend(other.literal_list.iter().cloned());
    }

    pub fn is_clear(&self) -> bool {
        self.clear
    }

    /// Solved value clamped into `[min, max]`. Falls back to the `start`
    /// expression until an expression is merged in.
    pub fn value<S: ValueSource + ?Sized>(&self, source: &S, context: ItemId) -> Option<f64> {
        let expr = self.expr.as_ref().or(self.starting.as_ref())?;
        let mut value = expr.solve(source, context);
        if let Some(min) = &self.min {
            value = value.max(min.solve(source, context));
        }
        if let Some(max) = &self.max {
            value = value.min(max.solve(source, context));
        }
        Some(value)
    }

    /// Forgets the `start` fallback and hands out the expression whose weak
    /// term a write has to drive. The caller solves it against the
    /// environment, which owns this attribute.
    pub fn prepare_set(&mut self) -> Option<Rc<Expression>> {
        self.starting = None;
        self.expr.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::tests::MapSource;
    use crate::expression::{ExpressionNode, Operator};

    fn ctx() -> ItemId {
        ItemId::from_raw(1)
    }

    fn reference(expr: Expression) -> ReferenceAttribute {
        ReferenceAttribute { active: true, expr: Some(Rc::new(expr)), ..Default::default() }
    }

    #[test]
    fn test_clamped_value() {
        let mut attr = RuntimeAttribute::default();
        attr.merge(&ReferenceAttribute {
            active: true,
            expr: Some(Rc::new(Expression::constant(50.0))),
            max: Some(Rc::new(Expression::constant(20.0))),
            ..Default::default()
        });
        assert_eq!(attr.value(&MapSource::default(), ctx()), Some(20.0));
        attr.min = Some(Rc::new(Expression::constant(80.0)));
        attr.max = None;
        assert_eq!(attr.value(&MapSource::default(), ctx()), Some(80.0));
    }

    #[test]
    fn test_first_merge_wins() {
        let mut attr = RuntimeAttribute::default();
        attr.merge(&reference(Expression::constant(1.0)));
        attr.merge(&reference(Expression::constant(2.0)));
        assert_eq!(attr.value(&MapSource::default(), ctx()), Some(1.0));
    }

    #[test]
    fn test_set_value_writes_weak_term() {
        let mut attr = RuntimeAttribute::default();
        attr.merge(&reference(Expression::new(ExpressionNode::binary(
            Operator::Add,
            ExpressionNode::weak_key(ScopedValueKey::element("w")),
            ExpressionNode::constant(10.0),
        ))));
        let mut source = MapSource::default();
        let expr = attr.prepare_set().unwrap();
        expr.solve_for_and_propagate_weak(&mut source, ctx(), 45.0).unwrap();
        assert_eq!(source.values["this.w"], 35.0);
        assert_eq!(attr.value(&source, ctx()), Some(45.0));
    }
}
