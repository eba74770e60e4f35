//! Compile-time attribute values.
//!
//! A [`ReferenceAttributeSet`] is one layer of an element: its defaults or
//! the values attached to one state. Layers are immutable once an element is
//! loaded and are shared into display items through `Rc`.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::color::Color;
use crate::expression::Expression;
use crate::graph::Transition;
use crate::keywords::{AttributeKey, Property};
use crate::value_key::{ScopedValueKey, ValueKey};

/// Partial value of one attribute. Only the fields matching the attribute's
/// body kind are ever populated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceAttribute {
    /// Contributes during merge.
    pub active: bool,
    /// Suppresses anything merged in after this layer.
    pub clear: bool,
    pub property: Option<Property>,
    pub starting: Option<Rc<Expression>>,
    pub min: Option<Rc<Expression>>,
    pub max: Option<Rc<Expression>>,
    pub expr: Option<Rc<Expression>>,
    pub color: Option<Color>,
    pub literal: Option<String>,
    pub literal_list: Vec<String>,
    pub single_key: Option<ScopedValueKey>,
    pub keys: Vec<ScopedValueKey>,
    /// Milliseconds to hold the previous value before switching.
    pub delay: Option<u64>,
    pub ease: Option<Rc<Transition>>,
}

fn fill<T: Clone>(mine: &mut Option<T>, other: &Option<T>) {
    if mine.is_none() {
        mine.clone_from(other);
    }
}

impl ReferenceAttribute {
    /// Inherits every field this attribute leaves unset.
    pub fn derive(&mut self, other: &ReferenceAttribute) {
        if self.clear || !other.active {
            return;
        }
        self.active = true;
        fill(&mut self.property, &other.property);
        fill(&mut self.starting, &other.starting);
        fill(&mut self.min, &other.min);
        fill(&mut self.max, &other.max);
        fill(&mut self.expr, &other.expr);
        fill(&mut self.color, &other.color);
        fill(&mut self.literal, &other.literal);
        fill(&mut self.single_key, &other.single_key);
        fill(&mut self.delay, &other.delay);
        fill(&mut self.ease, &other.ease);
        self.keys.extend(other.keys.iter().cloned());
        self.literal_list.extend(other.literal_list.iter().cloned());
    }

    pub fn expressions(&self) -> impl Iterator<Item = &Rc<Expression>> {
        [&self.starting, &self.min, &self.max, &self.expr].into_iter().flatten()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceAttributeSet {
    attrs: Vec<ReferenceAttribute>,
    /// Per-instance variables introduced by this layer.
    pub declare_modifiers: BTreeMap<ValueKey, Rc<Expression>>,
    /// Assignments fired every frame while this layer is active.
    pub set_modifiers: BTreeMap<ScopedValueKey, Rc<Expression>>,
}

impl Default for ReferenceAttributeSet {
    fn default() -> Self {
        Self {
            attrs: vec![ReferenceAttribute::default(); AttributeKey::COUNT],
            declare_modifiers: BTreeMap::new(),
            set_modifiers: BTreeMap::new(),
        }
    }
}

impl ReferenceAttributeSet {
    pub fn get(&self, key: AttributeKey) -> &ReferenceAttribute {
        &self.attrs[key.index()]
    }

    pub fn get_mut(&mut self, key: AttributeKey) -> &mut ReferenceAttribute {
        &mut self.attrs[key.index()]
    }

    pub fn insert(&mut self, key: AttributeKey, attribute: ReferenceAttribute) {
        self.attrs[key.index()] = attribute;
    }

    pub fn insert_declare_modifier(&mut self, target: impl Into<ValueKey>, expr: Expression) {
        self.declare_modifiers.insert(target.into(), Rc::new(expr));
    }

    pub fn insert_set_modifier(&mut self, target: ScopedValueKey, expr: Expression) {
        self.set_modifiers.insert(target, Rc::new(expr));
    }

    pub fn iter(&self) -> impl Iterator<Item = (AttributeKey, &ReferenceAttribute)> {
        AttributeKey::ALL.iter().copied().zip(self.attrs.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.declare_modifiers.is_empty()
            && self.set_modifiers.is_empty()
            && self.attrs.iter().all(|a| !a.active)
    }

    /// Takes the parent's modifiers this layer does not define itself.
    pub fn merge_modifiers(&mut self, other: &ReferenceAttributeSet) {
        for (k, v) in &other.declare_modifiers {
            self.declare_modifiers.entry(k.clone()).or_insert_with(|| Rc::clone(v));
        }
        for (k, v) in &other.set_modifiers {
            self.set_modifiers.entry(k.clone()).or_insert_with(|| Rc::clone(v));
        }
    }

    pub fn derive_from(&mut self, other: &ReferenceAttributeSet) {
        self.merge_modifiers(other);
        for (mine, theirs) in self.attrs.iter_mut().zip(&other.attrs) {
            mine.derive(theirs);
        }
    }
}

/// A keyed layer together with its declaration position inside the element.
/// Display items merge contributing layers in position order.
#[derive(Debug, Clone)]
pub struct AttributeLayer {
    pub position: usize,
    pub set: Rc<ReferenceAttributeSet>,
}

impl AttributeLayer {
    pub fn new(position: usize, set: Rc<ReferenceAttributeSet>) -> Self {
        Self { position, set }
    }
}

impl PartialEq for AttributeLayer {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position && Rc::ptr_eq(&self.set, &other.set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color_attr(c: Color) -> ReferenceAttribute {
        ReferenceAttribute { active: true, color: Some(c), ..Default::default() }
    }

    #[test]
    fn test_derive_keeps_child_values() {
        let mut child = ReferenceAttributeSet::default();
        child.insert(AttributeKey::ElementColor, color_attr(Color::BLACK));
        let mut parent = ReferenceAttributeSet::default();
        parent.insert(AttributeKey::ElementColor, color_attr(Color::WHITE));
        parent.insert(AttributeKey::FontColor, color_attr(Color::WHITE));

        child.derive_from(&parent);
        assert_eq!(child.get(AttributeKey::ElementColor).color, Some(Color::BLACK));
        assert_eq!(child.get(AttributeKey::FontColor).color, Some(Color::WHITE));
        assert!(child.get(AttributeKey::FontColor).active);
    }

    #[test]
    fn test_clear_blocks_inheritance() {
        let mut child = ReferenceAttribute { clear: true, ..Default::default() };
        child.derive(&color_attr(Color::WHITE));
        assert_eq!(child.color, None);
        assert!(!child.active);
    }

    #[test]
    fn test_lists_append() {
        let mut child = ReferenceAttribute {
            active: true,
            keys: vec![ScopedValueKey::element("a")],
            ..Default::default()
        };
        let parent = ReferenceAttribute {
            active: true,
            keys: vec![ScopedValueKey::element("b")],
            ..Default::default()
        };
        child.derive(&parent);
        assert_eq!(child.keys.len(), 2);
    }
}
