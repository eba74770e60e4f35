//! What happens when an attribute of a display item changes.

use tracing::{debug, trace, warn};

use super::{Environment, resolve_state_key};
use crate::display_item::ItemId;
use crate::driver::Driver;
use crate::expression::ValueSink;
use crate::keywords::AttributeKey;
use crate::material::{Material, MaterialKind};
use crate::state::StateKey;
use crate::value_key::Scope;

impl<D: Driver> Environment<D> {
    pub(super) fn run_draw_tree_acceptors(&mut self) {
        for (id, _) in std::mem::take(&mut self.queues.draw_tree) {
            self.position_in_draw_tree(id);
        }
    }

    /// State changers without a delay already ran right after their
    /// recompute; here they only run once a delay has elapsed.
    pub(super) fn run_change_acceptors(&mut self) {
        for (id, key) in std::mem::take(&mut self.queues.changed) {
            if key.is_state_changer() {
                let delayed = self.world.item(id).is_some_and(|i| i.attrs().attr(key).has_delay());
                if delayed {
                    self.apply_state_changer(id, key);
                }
                continue;
            }
            self.accept_change(id, key);
        }
    }

    fn accept_change(&mut self, id: ItemId, key: AttributeKey) {
        use AttributeKey as A;
        trace!(item = %id, key = key.literal(), "change accepted");
        match key {
            A::PositionWithin => self.position_in_draw_tree(id),
            A::TitleText => self.driver.invalidate_title_text(id),
            A::Text | A::ImagePath | A::Layout => {
                self.select_material(id);
                self.driver.invalidate_geometry(id);
            }
            A::Visibility => self.driver.invalidate_visibility(id),
            A::ElementColor | A::FontColor | A::BorderColor => self.driver.invalidate_canvas(id),
            A::WindowState | A::Borderless | A::Resizable | A::BindState => {}
            A::InduceState | A::ToggleState | A::UnsetState | A::TriggerState | A::RadioState => {
                self.apply_state_changer(id, key)
            }
            A::Triggers => {
                let keys = self.world.item(id).map(|i| i.attrs().attr(key).keys().to_vec()).unwrap_or_default();
                if !keys.is_empty() {
                    self.trigger_map.insert(id, keys);
                }
            }
            _ => self.driver.invalidate_geometry(id),
        }
    }

    pub(super) fn select_material(&mut self, id: ItemId) {
        let Some(item) = self.world.item(id) else { return };
        let kind = MaterialKind::select(item, &self.world);
        match self.materials.get_mut(&id) {
            Some(material) if material.kind() == kind => {}
            Some(material) => material.set_kind(kind),
            None => {
                self.materials.insert(id, Material::new(kind));
            }
        }
    }

    pub(super) fn execute_state_changers(&mut self, id: ItemId) {
        let pending = self.world.item(id).map(|i| i.attrs().pending_state_changers()).unwrap_or_default();
        for key in pending {
            self.apply_state_changer(id, key);
        }
    }

    fn apply_state_changer(&mut self, id: ItemId, key: AttributeKey) {
        let Some(item) = self.world.item(id) else { return };
        let targets: Vec<StateKey> = item
            .attrs()
            .attr(key)
            .keys()
            .iter()
            .filter_map(|k| resolve_state_key(&self.world, id, k))
            .collect();
        if targets.is_empty() {
            return;
        }
        debug!(item = %id, key = key.literal(), states = targets.len(), "state changer");

        match key {
            AttributeKey::InduceState | AttributeKey::UnsetState => {
                let value = key == AttributeKey::InduceState;
                for k in &targets {
                    self.states.mutate_if_observed(k, value, &mut self.world);
                }
            }
            AttributeKey::ToggleState => {
                for k in &targets {
                    let flipped = !self.states.check_state(k);
                    self.states.mutate_if_observed(k, flipped, &mut self.world);
                }
            }
            AttributeKey::TriggerState => {
                for k in &targets {
                    self.states.set_trigger_if_observed(k, &mut self.world);
                }
            }
            AttributeKey::RadioState => {
                // Only the most recently raised state stays on.
                let active: Vec<&StateKey> = targets.iter().filter(|k| self.states.check_state(k)).collect();
                if active.len() < 2 {
                    return;
                }
                let Some(top) = active.into_iter().max_by_key(|k| self.states.stamp(k)).cloned() else { return };
                for k in targets.iter().filter(|k| **k != top) {
                    self.states.mutate_if_observed(k, false, &mut self.world);
                }
            }
            _ => {}
        }
    }

    /// Writes every assignment of the item's active layers.
    pub(super) fn fire_sets(&mut self, id: ItemId) {
        let Some(item) = self.world.item(id) else { return };
        for (target, expr) in item.attrs().set_modifiers() {
            let value = expr.solve(&self.world, id);
            trace!(item = %id, %target, value, "set");
            self.world.set_number(id, &target, value);
        }
        for touched in self.world.take_touched_geometry() {
            self.driver.invalidate_geometry(touched);
        }
    }

    /// Sends this frame's triggers to their model items. Returns true when
    /// one of them was the quit trigger.
    pub(super) fn dispatch_triggers(&mut self) -> bool {
        let mut quit = false;
        for (id, keys) in std::mem::take(&mut self.trigger_map) {
            for key in keys {
                if key.scope == Scope::Model {
                    let model = self.world.item(id).and_then(|i| i.model());
                    match model {
                        Some(model) => self.world.models.on_trigger(model, key.key_str()),
                        None => warn!("model trigger {key} fired by {id}, which has no model"),
                    }
                } else if key.key_str() == self.config.runtime.quit_trigger {
                    quit = true;
                } else {
                    debug!(item = %id, %key, "trigger has no handler");
                }
            }
        }
        quit
    }
}
