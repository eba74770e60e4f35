use std::collections::{BTreeMap, BTreeSet};

use tracing::{trace, warn};

use super::{StateKey, StateScope, VirtualStateKey};
use crate::display_item::ItemId;
use crate::reference::AttributeLayer;

/// Receives the layer changes caused by a committed state mutation.
pub trait AttributeLayerSink {
    fn add_attribute_set(&mut self, item: ItemId, layer: &AttributeLayer);
    fn remove_attribute_set(&mut self, item: ItemId, layer: &AttributeLayer);
}

#[derive(Debug, Default)]
struct State {
    active: bool,
    /// Stamp of the last committed mutation, 0 when never mutated.
    stamp: u64,
    observers: BTreeMap<ItemId, AttributeLayer>,
    /// Proxy keys of the virtual states reading this one.
    affected_virtual_keys: BTreeSet<StateKey>,
    /// Set when this state is the proxy of a virtual state.
    virtual_key: Option<VirtualStateKey>,
}

impl State {
    fn is_observed(&self) -> bool {
        !self.observers.is_empty() || !self.affected_virtual_keys.is_empty()
    }
}

/// Sparse registry of every observed state.
///
/// A state only exists while something observes it: a display item with a
/// layer keyed on it, or a virtual state reading it. Mutating a state that
/// does not exist is a no-op.
#[derive(Debug, Default)]
pub struct StateManager {
    last_stamp: u64,
    states: BTreeMap<StateKey, State>,
    triggers: Vec<StateKey>,
    /// Identities of the states living in each non-global scope.
    volatile: BTreeMap<StateScope, BTreeSet<String>>,
    item_observations: BTreeMap<ItemId, Vec<StateKey>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn init_state(&mut self, key: &StateKey) -> &mut State {
        if key.scope != StateScope::Global {
            self.volatile.entry(key.scope).or_default().insert(key.identity.clone());
        }
        self.states.entry(key.clone()).or_default()
    }

    /// Registers `layer` of `item` on `key`. The layer is applied at once when
    /// the state is already active.
    pub fn register_state_observer(
        &mut self,
        key: StateKey,
        item: ItemId,
        layer: AttributeLayer,
        sink: &mut dyn AttributeLayerSink,
    ) {
        self.item_observations.entry(item).or_default().push(key.clone());
        let state = self.init_state(&key);
        if state.active {
            sink.add_attribute_set(item, &layer);
        }
        state.observers.insert(item, layer);
    }

    pub fn check_state(&self, key: &StateKey) -> bool {
        self.states.get(key).is_some_and(|s| s.active)
    }

    pub fn stamp(&self, key: &StateKey) -> u64 {
        self.states.get(key).map_or(0, |s| s.stamp)
    }

    pub fn last_stamp(&self) -> u64 {
        self.last_stamp
    }

    pub fn contains(&self, key: &StateKey) -> bool {
        self.states.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn has_trigger_states(&self) -> bool {
        !self.triggers.is_empty()
    }

    fn attempt_mutate(&mut self, key: &StateKey, value: bool, sink: &mut dyn AttributeLayerSink) -> bool {
        let stamp = self.last_stamp + 1;
        let Some(state) = self.states.get_mut(key) else {
            return false;
        };
        if state.active == value {
            return false;
        }
        state.active = value;
        state.stamp = stamp;
        self.last_stamp = stamp;
        trace!(state = %key, value, stamp, "state committed");

        let observers: Vec<(ItemId, AttributeLayer)> =
            state.observers.iter().map(|(item, layer)| (*item, layer.clone())).collect();
        let affected: Vec<StateKey> = state.affected_virtual_keys.iter().cloned().collect();

        for (item, layer) in &observers {
            if value {
                sink.add_attribute_set(*item, layer);
            } else {
                sink.remove_attribute_set(*item, layer);
            }
        }
        for proxy in &affected {
            self.sync_virtual_key(proxy, sink);
        }
        true
    }

    fn sync_virtual_key(&mut self, proxy: &StateKey, sink: &mut dyn AttributeLayerSink) {
        let Some(value) = self
            .states
            .get(proxy)
            .and_then(|s| s.virtual_key.as_ref())
            .map(|vkey| vkey.evaluate(self))
        else {
            return;
        };
        self.attempt_mutate(proxy, value, sink);
    }

    /// Returns false only when the state does not exist; an unchanged value
    /// still counts as observed.
    pub fn mutate_if_observed(&mut self, key: &StateKey, value: bool, sink: &mut dyn AttributeLayerSink) -> bool {
        if !self.states.contains_key(key) {
            return false;
        }
        self.attempt_mutate(key, value, sink);
        true
    }

    /// Mutates every scoped state named `identity`. The global state of that
    /// name is independent and left alone.
    pub fn mutate_all(&mut self, identity: &str, value: bool, sink: &mut dyn AttributeLayerSink) {
        let start = StateKey::global(identity);
        let keys: Vec<StateKey> = self
            .states
            .range(start..)
            .take_while(|(k, _)| k.identity == identity)
            .filter(|(k, _)| k.scope != StateScope::Global)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &keys {
            self.attempt_mutate(key, value, sink);
        }
    }

    /// Raises `key` for the remainder of the frame.
    pub fn set_trigger_if_observed(&mut self, key: &StateKey, sink: &mut dyn AttributeLayerSink) {
        if self.mutate_if_observed(key, true, sink) {
            self.triggers.push(key.clone());
        }
    }

    pub fn reset_trigger_states(&mut self, sink: &mut dyn AttributeLayerSink) {
        for key in std::mem::take(&mut self.triggers) {
            self.attempt_mutate(&key, false, sink);
        }
    }

    /// Installs a virtual state on its proxy. The proxy must already be
    /// observed; leaf states are created as needed.
    pub fn insert_virtual_state(&mut self, vkey: VirtualStateKey, sink: &mut dyn AttributeLayerSink) {
        if !self.states.contains_key(&vkey.proxy) {
            warn!(proxy = %vkey.proxy, "virtual state has no observed proxy, ignoring");
            return;
        }
        for leaf in vkey.affected_keys() {
            self.init_state(leaf).affected_virtual_keys.insert(vkey.proxy.clone());
        }
        let proxy = vkey.proxy.clone();
        if let Some(state) = self.states.get_mut(&proxy) {
            state.virtual_key = Some(vkey);
        }
        self.sync_virtual_key(&proxy, sink);
    }

    fn unregister_virtual_key(&mut self, vkey: &VirtualStateKey) {
        for leaf in vkey.affected_keys() {
            if let Some(state) = self.states.get_mut(leaf) {
                state.affected_virtual_keys.remove(&vkey.proxy);
            }
            self.erase_state_if_orphaned(leaf);
        }
    }

    fn erase_state_if_orphaned(&mut self, key: &StateKey) {
        if self.states.get(key).is_some_and(|s| !s.is_observed()) {
            self.erase_state(key);
        }
    }

    fn erase_state(&mut self, key: &StateKey) {
        let Some(state) = self.states.remove(key) else {
            return;
        };
        if let Some(scoped) = self.volatile.get_mut(&key.scope) {
            scoped.remove(&key.identity);
        }
        if let Some(vkey) = state.virtual_key {
            self.unregister_virtual_key(&vkey);
        }
    }

    /// Erases every state scoped to `scope`. Observers from other scopes
    /// lose the layers those states contributed.
    fn deallocate_scope(&mut self, scope: StateScope, sink: &mut dyn AttributeLayerSink) {
        let Some(identities) = self.volatile.remove(&scope) else {
            return;
        };
        for identity in identities {
            let key = StateKey::new(identity, scope);
            self.attempt_mutate(&key, false, sink);
            let observers: Vec<ItemId> =
                self.states.get(&key).map(|s| s.observers.keys().copied().collect()).unwrap_or_default();
            for observer in observers {
                if let Some(keys) = self.item_observations.get_mut(&observer) {
                    keys.retain(|k| *k != key);
                }
            }
            self.erase_state(&key);
        }
    }

    /// Forgets every layer `item` registered and every state scoped to it.
    pub fn remove_references_to_item(&mut self, item: ItemId, sink: &mut dyn AttributeLayerSink) {
        for key in self.item_observations.remove(&item).unwrap_or_default() {
            if let Some(state) = self.states.get_mut(&key) {
                state.observers.remove(&item);
            }
            self.erase_state_if_orphaned(&key);
        }
        self.deallocate_scope(StateScope::Item(item), sink);
    }

    pub fn remove_references_to_model(
        &mut self,
        model: crate::model::ModelItemId,
        sink: &mut dyn AttributeLayerSink,
    ) {
        self.deallocate_scope(StateScope::Model(model), sink);
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::reference::ReferenceAttributeSet;
    use crate::state::{StateExpr, StateOp};

    #[derive(Default)]
    struct RecordingSink {
        events: Vec<(ItemId, usize, bool)>,
    }

    impl AttributeLayerSink for RecordingSink {
        fn add_attribute_set(&mut self, item: ItemId, layer: &AttributeLayer) {
            self.events.push((item, layer.position, true));
        }
        fn remove_attribute_set(&mut self, item: ItemId, layer: &AttributeLayer) {
            self.events.push((item, layer.position, false));
        }
    }

    fn layer(position: usize) -> AttributeLayer {
        AttributeLayer::new(position, Rc::new(ReferenceAttributeSet::default()))
    }

    fn item(raw: u64) -> ItemId {
        ItemId::from_raw(raw)
    }

    #[test]
    fn test_mutation_is_idempotent() {
        let mut sm = StateManager::new();
        let mut sink = RecordingSink::default();
        let key = StateKey::item("pressed", item(1));
        sm.register_state_observer(key.clone(), item(1), layer(0), &mut sink);

        assert!(sm.mutate_if_observed(&key, true, &mut sink));
        let stamp = sm.stamp(&key);
        assert!(sm.mutate_if_observed(&key, true, &mut sink));
        assert_eq!(sm.stamp(&key), stamp);
        assert_eq!(sm.last_stamp(), stamp);
        assert_eq!(sink.events, vec![(item(1), 0, true)]);
    }

    #[test]
    fn test_unobserved_state_is_ignored() {
        let mut sm = StateManager::new();
        let mut sink = RecordingSink::default();
        assert!(!sm.mutate_if_observed(&StateKey::global("nobody"), true, &mut sink));
        sm.set_trigger_if_observed(&StateKey::global("nobody"), &mut sink);
        assert!(!sm.has_trigger_states());
        assert!(sm.is_empty());
    }

    #[test]
    fn test_trigger_pulse_lasts_one_frame() {
        let mut sm = StateManager::new();
        let mut sink = RecordingSink::default();
        let key = StateKey::global("Clicked");
        sm.register_state_observer(key.clone(), item(1), layer(2), &mut sink);

        sm.set_trigger_if_observed(&key, &mut sink);
        assert!(sm.check_state(&key));
        sm.reset_trigger_states(&mut sink);
        assert!(!sm.check_state(&key));
        assert!(!sm.has_trigger_states());
        assert_eq!(sink.events, vec![(item(1), 2, true), (item(1), 2, false)]);
    }

    #[test]
    fn test_late_observer_sees_active_state() {
        let mut sm = StateManager::new();
        let mut sink = RecordingSink::default();
        let key = StateKey::global("Dark");
        sm.register_state_observer(key.clone(), item(1), layer(0), &mut sink);
        sm.mutate_if_observed(&key, true, &mut sink);
        sm.register_state_observer(key, item(2), layer(4), &mut sink);
        assert_eq!(sink.events.last(), Some(&(item(2), 4, true)));
    }

    #[test]
    fn test_mutate_all_skips_global() {
        let mut sm = StateManager::new();
        let mut sink = RecordingSink::default();
        for raw in 1..=3 {
            sm.register_state_observer(StateKey::item("hover", item(raw)), item(raw), layer(0), &mut sink);
        }
        sm.register_state_observer(StateKey::global("hover"), item(9), layer(0), &mut sink);
        sm.mutate_all("hover", true, &mut sink);
        assert_eq!(sink.events.len(), 3);
        assert!(!sm.check_state(&StateKey::global("hover")));
    }

    #[test]
    fn test_virtual_state_propagates_synchronously() {
        let mut sm = StateManager::new();
        let mut sink = RecordingSink::default();
        let a = StateKey::item("a", item(1));
        let b = StateKey::item("b", item(1));
        let proxy = StateKey::item("a-and-not-b", item(1));
        sm.register_state_observer(proxy.clone(), item(1), layer(0), &mut sink);
        sm.insert_virtual_state(
            VirtualStateKey {
                proxy: proxy.clone(),
                expr: StateExpr::branch(StateOp::And, StateExpr::leaf(a.clone()), StateExpr::leaf(b.clone()).negate()),
            },
            &mut sink,
        );
        assert!(!sm.check_state(&proxy));

        sm.mutate_if_observed(&a, true, &mut sink);
        assert!(sm.check_state(&proxy));
        sm.mutate_if_observed(&b, true, &mut sink);
        assert!(!sm.check_state(&proxy));
        assert_eq!(sink.events, vec![(item(1), 0, true), (item(1), 0, false)]);
    }

    #[test]
    fn test_virtual_state_without_proxy_is_ignored() {
        let mut sm = StateManager::new();
        let mut sink = RecordingSink::default();
        sm.insert_virtual_state(
            VirtualStateKey { proxy: StateKey::global("p"), expr: StateExpr::leaf(StateKey::global("a")) },
            &mut sink,
        );
        assert!(sm.is_empty());
    }

    #[test]
    fn test_orphans_are_collected() {
        let mut sm = StateManager::new();
        let mut sink = RecordingSink::default();
        let leaf = StateKey::global("leaf");
        let proxy = StateKey::item("proxy", item(1));
        sm.register_state_observer(proxy.clone(), item(1), layer(0), &mut sink);
        sm.register_state_observer(StateKey::item("own", item(1)), item(1), layer(1), &mut sink);
        sm.insert_virtual_state(VirtualStateKey { proxy, expr: StateExpr::leaf(leaf.clone()) }, &mut sink);
        assert!(sm.contains(&leaf));
        sm.mutate_if_observed(&leaf, true, &mut sink);
        assert!(sm.stamp(&leaf) > 0);

        sm.remove_references_to_item(item(1), &mut sink);
        assert!(sm.is_empty());
        assert!(!sm.contains(&leaf));
        assert_eq!(sm.stamp(&leaf), 0);
    }

    #[test]
    fn test_removed_scope_releases_foreign_observers() {
        let mut sm = StateManager::new();
        let mut sink = RecordingSink::default();
        let hover = StateKey::item("hover", item(1));
        sm.register_state_observer(hover.clone(), item(1), layer(0), &mut sink);
        sm.register_state_observer(hover.clone(), item(2), layer(3), &mut sink);
        sm.mutate_if_observed(&hover, true, &mut sink);

        sm.remove_references_to_item(item(1), &mut sink);
        assert!(!sm.contains(&hover));
        assert_eq!(sink.events.last(), Some(&(item(2), 3, false)));
        let added = sink.events.iter().filter(|(i, _, on)| *i == item(2) && *on).count();
        let removed = sink.events.iter().filter(|(i, _, on)| *i == item(2) && !*on).count();
        assert_eq!(added, removed);

        // Item 2 no longer references the erased state.
        sm.remove_references_to_item(item(2), &mut sink);
        assert!(sm.is_empty());
    }
}
