//! Element templates.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::expression::Expression;
use crate::reference::{AttributeLayer, ReferenceAttributeSet};
use crate::state::VirtualStateKeyPrecursor;
use crate::value_key::{ScopedValueKey, ValueKey, ValueKeyPath, format_path};

/// Compiled template for display items.
///
/// An element holds a default attribute layer plus one layer per state
/// precursor, in declaration order. Layers are reference counted so that
/// every display item instantiated from the element shares them.
#[derive(Debug, Clone)]
pub struct Element {
    stamp: usize,
    path: ValueKeyPath,
    model_path: ValueKeyPath,
    default_set: Rc<ReferenceAttributeSet>,
    keyed: Vec<(ScopedValueKey, Rc<ReferenceAttributeSet>)>,
    virtual_keys: Vec<VirtualStateKeyPrecursor>,
    variables: BTreeMap<ValueKey, Expression>,
}

impl Element {
    pub fn new(stamp: usize, path: ValueKeyPath) -> Self {
        Self {
            stamp,
            path,
            model_path: Vec::new(),
            default_set: Rc::default(),
            keyed: Vec::new(),
            virtual_keys: Vec::new(),
            variables: BTreeMap::new(),
        }
    }

    /// Declaration order, used to order siblings.
    pub fn stamp(&self) -> usize {
        self.stamp
    }

    pub fn path(&self) -> &ValueKeyPath {
        &self.path
    }

    pub fn name(&self) -> String {
        format_path(&self.path)
    }

    pub fn model_path(&self) -> &ValueKeyPath {
        &self.model_path
    }

    pub fn set_model_path(&mut self, model_path: ValueKeyPath) {
        self.model_path = model_path;
    }

    /// Static elements are instantiated once at load time.
    pub fn is_static(&self) -> bool {
        self.model_path.is_empty()
    }

    pub fn default_set(&self) -> &Rc<ReferenceAttributeSet> {
        &self.default_set
    }

    pub fn default_set_mut(&mut self) -> &mut ReferenceAttributeSet {
        Rc::make_mut(&mut self.default_set)
    }

    fn position_for(&mut self, key: &ScopedValueKey) -> usize {
        match self.keyed.iter().position(|(k, _)| k == key) {
            Some(pos) => pos,
            None => {
                self.keyed.push((key.clone(), Rc::default()));
                self.keyed.len() - 1
            }
        }
    }

    /// Layer attached to `state`, created on first use.
    pub fn set_for_state_mut(&mut self, state: &ScopedValueKey) -> &mut ReferenceAttributeSet {
        let pos = self.position_for(state);
        Rc::make_mut(&mut self.keyed[pos].1)
    }

    pub fn keyed_layers(&self) -> impl Iterator<Item = (&ScopedValueKey, AttributeLayer)> + '_ {
        self.keyed
            .iter()
            .enumerate()
            .map(|(pos, (key, set))| (key, AttributeLayer::new(pos, Rc::clone(set))))
    }

    pub fn keyed_len(&self) -> usize {
        self.keyed.len()
    }

    pub fn add_virtual_key(&mut self, precursor: VirtualStateKeyPrecursor) {
        self.virtual_keys.push(precursor);
    }

    pub fn virtual_keys(&self) -> &[VirtualStateKeyPrecursor] {
        &self.virtual_keys
    }

    pub fn set_initial_expression(&mut self, variable: impl Into<ValueKey>, initial: Expression) {
        self.variables.insert(variable.into(), initial);
    }

    pub fn variable_initial_expressions(&self) -> &BTreeMap<ValueKey, Expression> {
        &self.variables
    }

    /// Inherits everything `parent` defines that this element does not.
    pub fn derive_from(&mut self, parent: &Element) {
        Rc::make_mut(&mut self.default_set).derive_from(&parent.default_set);
        for (key, set) in &parent.keyed {
            let pos = self.position_for(key);
            Rc::make_mut(&mut self.keyed[pos].1).derive_from(set);
        }
        for precursor in &parent.virtual_keys {
            if !self.virtual_keys.iter().any(|own| own.proxy == precursor.proxy) {
                self.virtual_keys.push(precursor.clone());
            }
        }
        for (name, initial) in &parent.variables {
            self.variables.entry(name.clone()).or_insert_with(|| initial.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::keywords::AttributeKey;
    use crate::reference::ReferenceAttribute;
    use crate::state::StateExpr;

    fn colored(c: Color) -> ReferenceAttribute {
        ReferenceAttribute { active: true, color: Some(c), ..Default::default() }
    }

    #[test]
    fn test_keyed_positions_follow_declaration() {
        let mut e = Element::new(0, vec!["Button".into()]);
        e.set_for_state_mut(&ScopedValueKey::element("hover"));
        e.set_for_state_mut(&ScopedValueKey::element("pressed"));
        e.set_for_state_mut(&ScopedValueKey::element("hover"));
        let positions: Vec<(String, usize)> =
            e.keyed_layers().map(|(k, l)| (k.to_string(), l.position)).collect();
        assert_eq!(positions, vec![("this.hover".to_string(), 0), ("this.pressed".to_string(), 1)]);
    }

    #[test]
    fn test_derive_merges_layers_and_virtual_keys() {
        let hover = ScopedValueKey::element("hover");
        let mut parent = Element::new(0, vec!["Base".into()]);
        parent.set_for_state_mut(&hover).insert(AttributeKey::ElementColor, colored(Color::WHITE));
        parent.default_set_mut().insert(AttributeKey::FontColor, colored(Color::BLACK));
        parent.add_virtual_key(VirtualStateKeyPrecursor {
            proxy: ScopedValueKey::element("generated-virtual-state-0"),
            expr: StateExpr::leaf(hover.clone()).negate(),
        });

        let mut child = Element::new(1, vec!["Button".into()]);
        child.derive_from(&parent);
        child.derive_from(&parent);

        assert_eq!(child.virtual_keys().len(), 1);
        assert_eq!(child.default_set().get(AttributeKey::FontColor).color, Some(Color::BLACK));
        let (_, layer) = child.keyed_layers().next().unwrap();
        assert_eq!(layer.set.get(AttributeKey::ElementColor).color, Some(Color::WHITE));
    }
}
