//! Creating and tearing down display items.

use tracing::{debug, warn};

use super::Environment;
use crate::defaults;
use crate::display_item::ItemId;
use crate::driver::Driver;
use crate::material::{Material, MaterialKind};
use crate::model::ModelItemId;
use crate::state::StateKey;
use crate::value_key::{Scope, ScopedValueKey, format_path};
use crate::world::World;

/// The state a key written in a document refers to, seen from `item`.
///
/// Element keys belong to the item itself, model keys to its model item and
/// global keys to nobody. A path overrides all of that with the instance it
/// deduces to.
pub(crate) fn resolve_state_key(world: &World, item: ItemId, key: &ScopedValueKey) -> Option<StateKey> {
    let identity = key.key_str();
    if let Some(path) = &key.path {
        return match world.deduce_target(item, path) {
            Some(target) => Some(StateKey::item(identity, target)),
            None => {
                warn!("state {key} of {item}: nothing at [{}]", format_path(path));
                None
            }
        };
    }
    match key.scope {
        Scope::Element | Scope::Material => Some(StateKey::item(identity, item)),
        Scope::Global => Some(StateKey::global(identity)),
        Scope::Model => {
            let model = world.item(item).and_then(|i| i.model());
            if model.is_none() {
                warn!("model state {key} used by {item}, which has no model");
            }
            model.map(|m| StateKey::model(identity, m))
        }
    }
}

impl<D: Driver> Environment<D> {
    /// Instantiates the element with `stamp`, statically or for `model`.
    pub(super) fn setup_display_item(&mut self, stamp: usize, model: Option<ModelItemId>) -> Option<ItemId> {
        let Some(element) = self.document.as_ref().and_then(|d| d.element(stamp)) else {
            warn!("no element with stamp {stamp}");
            return None;
        };
        let id = self.world.insert_item(element, model);
        self.materials.insert(id, Material::new(MaterialKind::Simple));

        for (key, layer) in element.keyed_layers() {
            match resolve_state_key(&self.world, id, key) {
                Some(state) => self.states.register_state_observer(state, id, layer, &mut self.world),
                None => warn!("{} keeps layer {key} unobserved", element.name()),
            }
        }
        // Virtual keys may reference states registered later in the batch.
        self.deferred.extend(element.virtual_keys().iter().map(|p| (id, p.clone())));

        let initial: Vec<(String, f64)> = element
            .variable_initial_expressions()
            .iter()
            .map(|(name, expr)| (name.clone(), expr.solve(&self.world, id)))
            .collect();
        if let Some(item) = self.world.item_mut(id) {
            for (name, value) in initial {
                item.set_variable(name, value);
            }
        }
        debug!(item = %id, element = %element.name(), ?model, "display item created");
        Some(id)
    }

    pub(super) fn process_deferred_virtual_states(&mut self) {
        for (id, precursor) in std::mem::take(&mut self.deferred) {
            if self.world.item(id).is_none() {
                continue;
            }
            let world = &self.world;
            let vkey = precursor.resolve(|key| {
                resolve_state_key(world, id, key).unwrap_or_else(|| StateKey::item(key.key_str(), id))
            });
            self.states.insert_virtual_state(vkey, &mut self.world);
        }
    }

    /// Places `id` in the draw tree according to its `position-within`.
    pub(super) fn position_in_draw_tree(&mut self, id: ItemId) {
        let Some(item) = self.world.item(id) else { return };
        let Some(path) = item.position_within() else {
            debug!(item = %id, "item has no position, leaving the draw tree");
            self.detach(id);
            return;
        };
        if path.len() == 1 && path[0] == defaults::ENVIRONMENT_PATH {
            if let Some(old) = item.parent() {
                self.driver.invalidate_geometry(old);
            }
            self.world.set_parent(id, None);
            if self.windows.insert(id) {
                self.driver.add_display_item(id);
            }
            self.driver.invalidate_geometry(id);
            return;
        }
        let Some(parent) = self.world.deduce_target(id, &path) else {
            warn!("{} cannot be placed within [{}]", item.describe(), format_path(&path));
            return;
        };
        if parent == id {
            warn!("{} cannot be placed within itself", item.describe());
            return;
        }
        if let Some(old) = item.parent().filter(|old| *old != parent) {
            self.driver.invalidate_geometry(old);
        }
        if self.windows.remove(&id) {
            self.driver.remove_display_item(id);
        }
        self.world.set_parent(id, Some(parent));
        self.driver.invalidate_geometry(parent);
    }

    fn detach(&mut self, id: ItemId) {
        if let Some(old) = self.world.item(id).and_then(|i| i.parent()) {
            self.driver.invalidate_geometry(old);
        }
        if self.windows.remove(&id) {
            self.driver.remove_display_item(id);
        }
        self.world.set_parent(id, None);
    }

    pub(super) fn destroy_display_item(&mut self, id: ItemId) {
        self.detach(id);
        self.states.remove_references_to_item(id, &mut self.world);
        self.world.remove_item(id);
        self.materials.remove(&id);
        self.trigger_map.remove(&id);
        self.deferred.retain(|(item, _)| *item != id);
        self.queues.forget(id);
        debug!(item = %id, "display item destroyed");
    }

    /// Destroys everything instantiated for `model` and its children, then
    /// frees the model item.
    pub(super) fn destroy_model_item(&mut self, model: ModelItemId) {
        if let Some(child) = self.world.models.child_container(model) {
            let children: Vec<ModelItemId> = self.world.models.iter(child).collect();
            for item in children {
                self.destroy_model_item(item);
            }
        }
        for id in self.world.models.take_display_items(model) {
            self.destroy_display_item(id);
        }
        self.states.remove_references_to_model(model, &mut self.world);
        if let Err(e) = self.world.models.safe_to_delete(model) {
            warn!("cannot free model item {model}: {e}");
        }
    }
}
