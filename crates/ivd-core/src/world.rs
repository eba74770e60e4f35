//! The live item tree and the value accessors expressions read through.
//!
//! [`World`] owns every display item, the model store and the indexes that
//! tie elements and model items to the display items instantiated from them.
//! It is the [`ValueSource`] every expression is solved against and the
//! [`AttributeLayerSink`] the state manager reports layer changes to.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::warn;

use crate::display_item::{DisplayItem, ItemId};
use crate::element::Element;
use crate::expression::{ValueSink, ValueSource};
use crate::geometry::Coords;
use crate::keywords::AttributeKey;
use crate::material::LayoutTree;
use crate::model::{ModelItemId, ModelStore};
use crate::reference::AttributeLayer;
use crate::state::AttributeLayerSink;
use crate::states;
use crate::value_key::{Scope, ScopedValueKey, ValueKeyPath, format_path};

/// An element instantiated for one model item, or statically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ItemKey {
    element: usize,
    model: Option<ModelItemId>,
}

#[derive(Default)]
pub struct World {
    items: BTreeMap<ItemId, DisplayItem>,
    pub models: ModelStore,
    elements_by_path: HashMap<ValueKeyPath, usize>,
    key_to_item: HashMap<ItemKey, ItemId>,
    item_to_key: HashMap<ItemId, ItemKey>,
    next_id: u64,
    mouse: Coords,
    /// Items whose attribute sets have to be recomputed next frame.
    dirty: BTreeSet<ItemId>,
    /// Items whose geometry a value write may have changed.
    touched_geometry: BTreeSet<ItemId>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item(&self, id: ItemId) -> Option<&DisplayItem> {
        self.items.get(&id)
    }

    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut DisplayItem> {
        self.items.get_mut(&id)
    }

    pub fn items(&self) -> impl Iterator<Item = &DisplayItem> + '_ {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Indexes `element` under its path so paths in value keys resolve to it.
    pub fn index_element(&mut self, element: &Element) {
        self.elements_by_path.insert(element.path().clone(), element.stamp());
    }

    pub fn element_for_path(&self, path: &[String]) -> Option<usize> {
        self.elements_by_path.get(path).copied()
    }

    /// The display item of `element` instantiated for `model`.
    pub fn instance_of(&self, element: usize, model: Option<ModelItemId>) -> Option<ItemId> {
        self.key_to_item.get(&ItemKey { element, model }).copied()
    }

    /// Creates the display item of `element` for `model` and queues its
    /// first attribute recompute.
    pub fn insert_item(&mut self, element: &Element, model: Option<ModelItemId>) -> ItemId {
        self.next_id += 1;
        let id = ItemId::from_raw(self.next_id);
        let key = ItemKey { element: element.stamp(), model };
        if let Some(old) = self.key_to_item.insert(key, id) {
            warn!(element = %format_path(element.path()), "replacing instance {old} of the same element and model");
        }
        self.item_to_key.insert(id, key);
        if let Some(model) = model {
            if let Err(e) = self.models.bind_display_item(model, id) {
                warn!("cannot bind {id} to model item {model}: {e}");
            }
        }
        self.items.insert(id, DisplayItem::new(id, element, model));
        self.dirty.insert(id);
        id
    }

    /// Detaches `id` from the draw tree and every index, then drops it.
    pub fn remove_item(&mut self, id: ItemId) -> Option<DisplayItem> {
        self.set_parent(id, None);
        let orphans = self.items.get_mut(&id).map(DisplayItem::take_children).unwrap_or_default();
        for child in orphans {
            if let Some(child) = self.items.get_mut(&child) {
                child.set_parent_link(None);
            }
        }
        if let Some(key) = self.item_to_key.remove(&id) {
            self.key_to_item.remove(&key);
        }
        self.dirty.remove(&id);
        self.touched_geometry.remove(&id);
        self.items.remove(&id)
    }

    /// Moves `child` under `parent` in the draw tree, or out of it.
    pub fn set_parent(&mut self, child: ItemId, parent: Option<ItemId>) {
        let Some(old) = self.items.get(&child).map(DisplayItem::parent) else { return };
        if old == parent {
            return;
        }
        if let Some(old) = old.and_then(|p| self.items.get_mut(&p)) {
            old.remove_child_link(child);
        }
        if let Some(new) = parent.and_then(|p| self.items.get_mut(&p)) {
            new.insert_child_link(child);
        }
        if let Some(item) = self.items.get_mut(&child) {
            item.set_parent_link(parent);
        }
    }

    /// Finds the instance of the element at `path` closest to `context`:
    /// bound to the same model item, else to one of its ancestors, else
    /// static.
    pub fn deduce_target(&self, context: ItemId, path: &[String]) -> Option<ItemId> {
        let element = self.element_for_path(path)?;
        let mut model = self.items.get(&context)?.model();
        loop {
            if let Some(found) = self.key_to_item.get(&ItemKey { element, model }) {
                return Some(*found);
            }
            let current = model?;
            model = self.models.parent_container(current).and_then(|c| self.models.parent_item(c));
        }
    }

    fn target(&self, context: ItemId, key: &ScopedValueKey) -> Option<ItemId> {
        match &key.path {
            None => Some(context),
            Some(path) => {
                let found = self.deduce_target(context, path);
                if found.is_none() {
                    warn!("could not find [{}] from {context} for {key}", format_path(path));
                }
                found
            }
        }
    }

    pub fn mark_dirty(&mut self, id: ItemId) {
        self.dirty.insert(id);
    }

    pub fn take_dirty(&mut self) -> BTreeSet<ItemId> {
        std::mem::take(&mut self.dirty)
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn take_touched_geometry(&mut self) -> BTreeSet<ItemId> {
        std::mem::take(&mut self.touched_geometry)
    }

    pub fn mouse(&self) -> Coords {
        self.mouse
    }

    pub fn set_mouse(&mut self, at: Coords) {
        self.mouse = at;
    }

    fn mouse_value(&self, key: &ScopedValueKey) -> Option<f64> {
        let is_mouse = key.scope == Scope::Global
            && key.path.as_deref().is_some_and(|p| p.len() == 1 && p[0] == states::MOUSE_PATH);
        if !is_mouse {
            return None;
        }
        match AttributeKey::from_literal(key.key_str()) {
            Some(AttributeKey::TranslationA) => Some(f64::from(self.mouse.x)),
            Some(AttributeKey::TranslationO) => Some(f64::from(self.mouse.y)),
            _ => {
                warn!("the mouse has no value {key}");
                Some(0.0)
            }
        }
    }

    fn model_of(&self, context: ItemId, key: &ScopedValueKey) -> Option<ModelItemId> {
        let model = self.items.get(&context).and_then(DisplayItem::model);
        if model.is_none() {
            warn!("{key} read from {context}, which has no model");
        }
        model
    }

    /// Attribute of the target by literal name, else a variable, else a
    /// declared modifier.
    fn element_value(&self, target: ItemId, name: &str) -> Option<f64> {
        let item = self.items.get(&target)?;
        if AttributeKey::from_literal(name).is_some() {
            return item.attrs().value_by_name(name, self, target);
        }
        item.variable(name).or_else(|| item.attrs().value_by_name(name, self, target))
    }
}

impl ValueSource for World {
    fn get_number(&self, context: ItemId, key: &ScopedValueKey) -> f64 {
        if let Some(value) = self.mouse_value(key) {
            return value;
        }
        match key.scope {
            Scope::Model => match self.model_of(context, key) {
                Some(model) => self.models.get_number(model, key.key_str()),
                None => 0.0,
            },
            Scope::Element => {
                let Some(target) = self.target(context, key) else { return 0.0 };
                self.element_value(target, key.key_str()).unwrap_or_else(|| {
                    warn!("{key} has no value on {target}");
                    0.0
                })
            }
            Scope::Global | Scope::Material => {
                warn!("{key} cannot be read as a number");
                0.0
            }
        }
    }

    fn get_string(&self, context: ItemId, key: &ScopedValueKey) -> String {
        match key.scope {
            Scope::Model => match self.model_of(context, key) {
                Some(model) => self.models.get_string(model, key.key_str()),
                None => String::new(),
            },
            _ => {
                warn!("{key} cannot be read as a string, only model strings are supported");
                String::new()
            }
        }
    }
}

impl ValueSink for World {
    fn set_number(&mut self, context: ItemId, key: &ScopedValueKey, value: f64) {
        match key.scope {
            Scope::Model => {
                let Some(model) = self.model_of(context, key) else { return };
                let name = key.key_str();
                if self.models.is_number_const(model, name) {
                    warn!("model value {name} is constant");
                    return;
                }
                if let Err(e) = self.models.set_number(model, name, value) {
                    warn!("cannot write {key}: {e}");
                }
            }
            Scope::Element => {
                let Some(target) = self.target(context, key) else { return };
                let name = key.key_str();
                let is_attribute = AttributeKey::from_literal(name).is_some();
                let expr = match self.items.get_mut(&target) {
                    Some(item) if is_attribute => item.attrs_mut().prepare_set_by_name(name),
                    Some(item) => {
                        item.set_variable(name, value);
                        None
                    }
                    None => return,
                };
                if let Some(expr) = expr {
                    if let Err(e) = expr.solve_for_and_propagate_weak(self, target, value) {
                        warn!("cannot set {key} on {target} to {value}: {e}");
                    }
                } else if is_attribute {
                    warn!("{key} is not set on {target}, nothing to write");
                }
                self.touched_geometry.insert(context);
                self.touched_geometry.insert(target);
            }
            Scope::Global | Scope::Material => warn!("{key} cannot be written"),
        }
    }
}

impl AttributeLayerSink for World {
    fn add_attribute_set(&mut self, item: ItemId, layer: &AttributeLayer) {
        if let Some(display) = self.items.get_mut(&item) {
            display.add_attribute_set(layer);
            self.dirty.insert(item);
        }
    }

    fn remove_attribute_set(&mut self, item: ItemId, layer: &AttributeLayer) {
        if let Some(display) = self.items.get_mut(&item) {
            display.remove_attribute_set(layer);
            self.dirty.insert(item);
        }
    }
}

impl LayoutTree for World {
    fn item(&self, id: ItemId) -> Option<&DisplayItem> {
        self.items.get(&id)
    }

    /// Named cells first, then declaration order, then model order.
    fn ordered_children(&self, id: ItemId) -> Vec<ItemId> {
        let Some(parent) = self.items.get(&id) else { return Vec::new() };
        let mut sorted: Vec<ItemId> = parent.children().iter().copied().collect();
        let child = |c: &ItemId| self.items.get(c);

        if parent.model_order() {
            sorted.sort_by_key(|c| {
                let model = child(c).and_then(DisplayItem::model);
                let container = model.and_then(|m| self.models.parent_container(m));
                (container, model.and_then(|m| self.models.position(m)))
            });
        }
        sorted.sort_by_key(|c| child(c).map_or(usize::MAX, DisplayItem::element_stamp));

        if let Some(cells) = parent.cell_names() {
            let slot = |c: &ItemId| {
                let name = child(c).and_then(DisplayItem::cell_name).unwrap_or("");
                if name == "front" {
                    return 0;
                }
                if let Some(i) = cells.iter().position(|cell| cell == name) {
                    return i + 1;
                }
                if name == "back" {
                    return cells.len() + 1;
                }
                warn!("unrecognized cell name {name:?} in {}", parent.describe());
                cells.len() + 3
            };
            sorted.sort_by_key(slot);
        }
        sorted
    }

    fn values(&self) -> &dyn ValueSource {
        self
    }
}
