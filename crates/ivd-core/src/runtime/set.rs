use std::collections::HashSet;
use std::rc::Rc;

use super::{AnimatableAttribute, AttributeSignals};
use crate::display_item::ItemId;
use crate::expression::{Expression, ValueSource};
use crate::keywords::AttributeKey;
use crate::reference::ReferenceAttributeSet;
use crate::value_key::ScopedValueKey;

/// Every attribute of one display item, recomputed from the item's active
/// layers whenever the set of layers changes.
#[derive(Debug, Clone)]
pub struct RuntimeAttributeSet {
    attrs: Vec<AnimatableAttribute>,
    /// Variables come from the first merged layer only.
    declare_layer: Option<Rc<ReferenceAttributeSet>>,
    set_layers: Vec<Rc<ReferenceAttributeSet>>,
}

impl Default for RuntimeAttributeSet {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeAttributeSet {
    pub fn new() -> Self {
        Self {
            attrs: AttributeKey::ALL.iter().map(|k| AnimatableAttribute::new(*k)).collect(),
            declare_layer: None,
            set_layers: Vec::new(),
        }
    }

    pub fn attr(&self, key: AttributeKey) -> &AnimatableAttribute {
        &self.attrs[key.index()]
    }

    pub fn attr_mut(&mut self, key: AttributeKey) -> &mut AnimatableAttribute {
        &mut self.attrs[key.index()]
    }

    pub fn begin_recompute(&mut self) {
        self.declare_layer = None;
        self.set_layers.clear();
        for attr in &mut self.attrs {
            attr.begin_recompute();
        }
    }

    pub fn merge_in(&mut self, layer: &Rc<ReferenceAttributeSet>) {
        if self.declare_layer.is_none() {
            self.declare_layer = Some(Rc::clone(layer));
        }
        self.set_layers.push(Rc::clone(layer));
        for (attr, (_, reference)) in self.attrs.iter_mut().zip(layer.iter()) {
            attr.merge(reference);
        }
    }

    pub fn commit_recompute(&mut self, item: ItemId, signals: &mut dyn AttributeSignals) {
        for attr in &mut self.attrs {
            attr.commit_recompute(item, signals);
        }
    }

    /// State changing attributes whose acceptors run right after a recompute.
    /// Delayed ones wait for their animation to finish instead.
    pub fn pending_state_changers(&self) -> Vec<AttributeKey> {
        AttributeKey::ALL
            .iter()
            .copied()
            .filter(|k| k.is_state_changer())
            .filter(|k| {
                let attr = self.attr(*k);
                attr.is_active() && !attr.has_delay()
            })
            .collect()
    }

    /// Assignments of every active layer, each expression once.
    pub fn set_modifiers(&self) -> Vec<(ScopedValueKey, Rc<Expression>)> {
        let mut fired: HashSet<*const Expression> = HashSet::new();
        let mut out = Vec::new();
        for layer in &self.set_layers {
            for (target, expr) in &layer.set_modifiers {
                if fired.insert(Rc::as_ptr(expr)) {
                    out.push((target.clone(), Rc::clone(expr)));
                }
            }
        }
        out
    }

    pub fn declare_modifier(&self, name: &str) -> Option<&Rc<Expression>> {
        self.declare_layer.as_ref()?.declare_modifiers.get(name)
    }

    /// Reads an attribute by literal (`width`) or, failing that, a declared
    /// variable of the item.
    pub fn value_by_name<S: ValueSource + ?Sized>(&self, name: &str, source: &S, context: ItemId) -> Option<f64> {
        match AttributeKey::from_literal(name) {
            Some(key) => self.attr(key).value(source, context),
            None => self.declare_modifier(name).map(|e| e.solve(source, context)),
        }
    }

    /// Expression a write to `name` has to back-solve.
    pub fn prepare_set_by_name(&mut self, name: &str) -> Option<Rc<Expression>> {
        match AttributeKey::from_literal(name) {
            Some(key) => self.attr_mut(key).prepare_set(),
            None => self.declare_modifier(name).cloned(),
        }
    }

    pub fn value<S: ValueSource + ?Sized>(&self, key: AttributeKey, source: &S, context: ItemId) -> Option<f64> {
        self.attr(key).value(source, context)
    }

    pub fn is_animating(&self) -> bool {
        self.attrs.iter().any(AnimatableAttribute::is_animating)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::tests::MapSource;
    use crate::reference::ReferenceAttribute;

    struct Quiet;

    impl AttributeSignals for Quiet {
        fn signal_change(&mut self, _: ItemId, _: AttributeKey) {}
        fn request_tick(&mut self, _: ItemId, _: AttributeKey) {}
        fn cancel_tick(&mut self, _: ItemId, _: AttributeKey) {}
    }

    fn layer_with(key: AttributeKey, value: f64) -> Rc<ReferenceAttributeSet> {
        let mut set = ReferenceAttributeSet::default();
        set.insert(
            key,
            ReferenceAttribute { active: true, expr: Some(Rc::new(Expression::constant(value))), ..Default::default() },
        );
        Rc::new(set)
    }

    #[test]
    fn test_default_layer_wins_over_later_layers() {
        let item = ItemId::from_raw(1);
        let mut set = RuntimeAttributeSet::new();
        set.begin_recompute();
        set.merge_in(&layer_with(AttributeKey::SizeA, 10.0));
        set.merge_in(&layer_with(AttributeKey::SizeA, 99.0));
        set.merge_in(&layer_with(AttributeKey::SizeO, 7.0));
        set.commit_recompute(item, &mut Quiet);
        let source = MapSource::default();
        assert_eq!(set.value(AttributeKey::SizeA, &source, item), Some(10.0));
        assert_eq!(set.value_by_name("height", &source, item), Some(7.0));
    }

    #[test]
    fn test_set_modifiers_dedupe_shared_expressions() {
        let mut shared = ReferenceAttributeSet::default();
        shared.insert_set_modifier(ScopedValueKey::element("count"), Expression::constant(1.0));
        let shared = Rc::new(shared);
        let mut set = RuntimeAttributeSet::new();
        set.begin_recompute();
        set.merge_in(&shared);
        set.merge_in(&shared);
        assert_eq!(set.set_modifiers().len(), 1);
    }

    #[test]
    fn test_declared_variables_come_from_first_layer() {
        let item = ItemId::from_raw(1);
        let mut first = ReferenceAttributeSet::default();
        first.insert_declare_modifier("total", Expression::constant(3.0));
        let mut second = ReferenceAttributeSet::default();
        second.insert_declare_modifier("other", Expression::constant(4.0));
        let mut set = RuntimeAttributeSet::new();
        set.begin_recompute();
        set.merge_in(&Rc::new(first));
        set.merge_in(&Rc::new(second));
        let source = MapSource::default();
        assert_eq!(set.value_by_name("total", &source, item), Some(3.0));
        assert_eq!(set.value_by_name("other", &source, item), None);
    }
}
