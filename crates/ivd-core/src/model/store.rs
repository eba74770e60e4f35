use std::any::Any;
use std::collections::VecDeque;

use tracing::warn;

use super::{ContainerId, ModelCallbacks, ModelEvent, ModelItemId};
use crate::display_item::ItemId;
use crate::error::ModelError;
use crate::state::StateKey;
use crate::value_key::{ValueKey, ValueKeyPath};

struct ModelItem {
    container: ContainerId,
    prev: Option<ModelItemId>,
    next: Option<ModelItemId>,
    child: Option<ContainerId>,
    display_items: Vec<ItemId>,
    callbacks: Option<Box<dyn ModelCallbacks>>,
    user_data: Option<Box<dyn Any>>,
}

struct Container {
    name: ValueKey,
    parent: Option<ModelItemId>,
    first: Option<ModelItemId>,
    last: Option<ModelItemId>,
    len: usize,
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot arena with a free list. Freed slots bump their generation so stale
/// handles are detected instead of aliasing a newer entry.
struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self { slots: Vec::new(), free: Vec::new() }
    }
}

impl<T> Arena<T> {
    fn insert(&mut self, value: T) -> (u32, u32) {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.value = Some(value);
                (index, slot.generation)
            }
            None => {
                self.slots.push(Slot { generation: 0, value: Some(value) });
                ((self.slots.len() - 1) as u32, 0)
            }
        }
    }

    fn get(&self, index: u32, generation: u32) -> Option<&T> {
        let slot = self.slots.get(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        slot.value.as_ref()
    }

    fn get_mut(&mut self, index: u32, generation: u32) -> Option<&mut T> {
        let slot = self.slots.get_mut(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        slot.value.as_mut()
    }

    fn remove(&mut self, index: u32, generation: u32) -> Option<T> {
        let slot = self.slots.get_mut(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        Some(value)
    }
}

/// Every model container and item of one environment, plus the queue of
/// structural events they raise.
#[derive(Default)]
pub struct ModelStore {
    items: Arena<ModelItem>,
    containers: Arena<Container>,
    events: VecDeque<ModelEvent>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn item(&self, id: ModelItemId) -> Result<&ModelItem, ModelError> {
        self.items.get(id.index, id.generation).ok_or(ModelError::StaleHandle)
    }

    fn item_mut(&mut self, id: ModelItemId) -> Result<&mut ModelItem, ModelError> {
        self.items.get_mut(id.index, id.generation).ok_or(ModelError::StaleHandle)
    }

    fn container(&self, id: ContainerId) -> Result<&Container, ModelError> {
        self.containers.get(id.index, id.generation).ok_or(ModelError::StaleHandle)
    }

    fn container_mut(&mut self, id: ContainerId) -> Result<&mut Container, ModelError> {
        self.containers.get_mut(id.index, id.generation).ok_or(ModelError::StaleHandle)
    }

    pub fn contains(&self, id: ModelItemId) -> bool {
        self.item(id).is_ok()
    }

    fn push_event(&mut self, event: ModelEvent) {
        self.events.push_back(event);
    }

    pub fn pop_event(&mut self) -> Option<ModelEvent> {
        self.events.pop_front()
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    fn new_container(&mut self, name: ValueKey, parent: Option<ModelItemId>) -> ContainerId {
        let (index, generation) =
            self.containers.insert(Container { name, parent, first: None, last: None, len: 0 });
        ContainerId::new(index, generation)
    }

    /// Top level container bound to elements whose model path is `[name]`.
    pub fn add_root_container(&mut self, name: impl Into<ValueKey>) -> ContainerId {
        self.new_container(name.into(), None)
    }

    /// Creates `item`'s child container, or returns the existing one.
    pub fn instantiate_child_model(
        &mut self,
        item: ModelItemId,
        name: impl Into<ValueKey>,
    ) -> Result<ContainerId, ModelError> {
        if let Some(child) = self.item(item)?.child {
            return Ok(child);
        }
        let child = self.new_container(name.into(), Some(item));
        self.item_mut(item)?.child = Some(child);
        Ok(child)
    }

    pub fn child_container(&self, item: ModelItemId) -> Option<ContainerId> {
        self.item(item).ok()?.child
    }

    pub fn parent_container(&self, item: ModelItemId) -> Option<ContainerId> {
        self.item(item).ok().map(|i| i.container)
    }

    /// Item owning `container`, `None` for root containers.
    pub fn parent_item(&self, container: ContainerId) -> Option<ModelItemId> {
        self.container(container).ok()?.parent
    }

    /// Names of the container chain from the root down to `container`.
    pub fn model_path(&self, container: ContainerId) -> Result<ValueKeyPath, ModelError> {
        let mut path = Vec::new();
        let mut current = Some(container);
        while let Some(id) = current {
            let c = self.container(id)?;
            path.push(c.name.clone());
            current = match c.parent {
                Some(parent) => Some(self.item(parent).map_err(|_| {
                    ModelError::Misconfigured(format!("{id} outlived its parent item"))
                })?.container),
                None => None,
            };
        }
        path.reverse();
        Ok(path)
    }

    pub fn len(&self, container: ContainerId) -> usize {
        self.container(container).map_or(0, |c| c.len)
    }

    pub fn is_empty(&self, container: ContainerId) -> bool {
        self.len(container) == 0
    }

    pub fn first(&self, container: ContainerId) -> Option<ModelItemId> {
        self.container(container).ok()?.first
    }

    pub fn next(&self, item: ModelItemId) -> Option<ModelItemId> {
        self.item(item).ok()?.next
    }

    pub fn iter(&self, container: ContainerId) -> ModelItemIter<'_> {
        ModelItemIter { store: self, current: self.first(container) }
    }

    /// Appends a fresh item. Its display items are created when the add
    /// event is processed.
    pub fn push_back_new(&mut self, container: ContainerId) -> Result<ModelItemId, ModelError> {
        let last = self.container(container)?.last;
        let (index, generation) = self.items.insert(ModelItem {
            container,
            prev: last,
            next: None,
            child: None,
            display_items: Vec::new(),
            callbacks: None,
            user_data: None,
        });
        let id = ModelItemId::new(index, generation);
        match last {
            Some(last) => self.item_mut(last)?.next = Some(id),
            None => self.container_mut(container)?.first = Some(id),
        }
        let c = self.container_mut(container)?;
        c.last = Some(id);
        c.len += 1;
        self.push_event(ModelEvent::ItemAdded { container, item: id });
        Ok(id)
    }

    /// Queues `item` for removal at the next event drain.
    pub fn erase_later(&mut self, item: ModelItemId) -> Result<(), ModelError> {
        let container = self.item(item)?.container;
        self.push_event(ModelEvent::ItemRemoved { container, item });
        Ok(())
    }

    /// Queues a re-layout of everything bound to `container`.
    pub fn invalidate_order(&mut self, container: ContainerId) -> Result<(), ModelError> {
        self.container(container)?;
        self.push_event(ModelEvent::OrderInvalidated { container });
        Ok(())
    }

    fn set_prev(&mut self, container: ContainerId, of: Option<ModelItemId>, prev: Option<ModelItemId>) -> Result<(), ModelError> {
        match of {
            Some(item) => self.item_mut(item)?.prev = prev,
            None => self.container_mut(container)?.last = prev,
        }
        Ok(())
    }

    fn set_next(&mut self, container: ContainerId, of: Option<ModelItemId>, next: Option<ModelItemId>) -> Result<(), ModelError> {
        match of {
            Some(item) => self.item_mut(item)?.next = next,
            None => self.container_mut(container)?.first = next,
        }
        Ok(())
    }

    /// Exchanges the positions of two items of the same container.
    pub fn swap(&mut self, a: ModelItemId, b: ModelItemId) -> Result<(), ModelError> {
        let (container, prev_a, next_a) = {
            let item = self.item(a)?;
            (item.container, item.prev, item.next)
        };
        let (container_b, prev_b, next_b) = {
            let item = self.item(b)?;
            (item.container, item.prev, item.next)
        };
        if container != container_b {
            return Err(ModelError::Misconfigured(format!("cannot swap {a} and {b} across containers")));
        }
        if a == b {
            return Ok(());
        }

        if next_a == Some(b) {
            self.swap_adjacent(container, a, b, prev_a, next_b)?;
        } else if next_b == Some(a) {
            self.swap_adjacent(container, b, a, prev_b, next_a)?;
        } else {
            {
                let item = self.item_mut(a)?;
                item.prev = prev_b;
                item.next = next_b;
            }
            {
                let item = self.item_mut(b)?;
                item.prev = prev_a;
                item.next = next_a;
            }
            self.set_next(container, prev_a, Some(b))?;
            self.set_prev(container, next_a, Some(b))?;
            self.set_next(container, prev_b, Some(a))?;
            self.set_prev(container, next_b, Some(a))?;
        }
        self.push_event(ModelEvent::ItemsSwapped { container, first: a, second: b });
        Ok(())
    }

    /// `left` directly precedes `right`.
    fn swap_adjacent(
        &mut self,
        container: ContainerId,
        left: ModelItemId,
        right: ModelItemId,
        before: Option<ModelItemId>,
        after: Option<ModelItemId>,
    ) -> Result<(), ModelError> {
        self.set_next(container, before, Some(right))?;
        self.set_prev(container, after, Some(left))?;
        {
            let item = self.item_mut(right)?;
            item.prev = before;
            item.next = Some(left);
        }
        let item = self.item_mut(left)?;
        item.prev = Some(right);
        item.next = after;
        Ok(())
    }

    /// Unlinks and frees `item` together with its child container. The
    /// item's user data and callbacks are dropped here.
    pub fn safe_to_delete(&mut self, item: ModelItemId) -> Result<(), ModelError> {
        let (container, prev, next, child) = {
            let i = self.item(item)?;
            (i.container, i.prev, i.next, i.child)
        };
        self.set_next(container, prev, next)?;
        self.set_prev(container, next, prev)?;
        if let Ok(c) = self.container_mut(container) {
            c.len = c.len.saturating_sub(1);
        }
        if let Some(child) = child {
            if self.container(child).is_ok_and(|c| c.len > 0) {
                warn!("{child} freed while it still holds items");
            }
            self.containers.remove(child.index, child.generation);
        }
        self.items.remove(item.index, item.generation);
        Ok(())
    }

    pub fn bind_display_item(&mut self, item: ModelItemId, display: ItemId) -> Result<(), ModelError> {
        self.item_mut(item)?.display_items.push(display);
        Ok(())
    }

    pub fn display_items(&self, item: ModelItemId) -> &[ItemId] {
        self.item(item).map_or(&[], |i| i.display_items.as_slice())
    }

    pub fn take_display_items(&mut self, item: ModelItemId) -> Vec<ItemId> {
        self.item_mut(item).map(|i| std::mem::take(&mut i.display_items)).unwrap_or_default()
    }

    /// Position of `item` inside its container, counted from the front.
    pub fn position(&self, item: ModelItemId) -> Option<usize> {
        let container = self.parent_container(item)?;
        self.iter(container).position(|i| i == item)
    }

    pub fn set_callbacks(&mut self, item: ModelItemId, callbacks: Box<dyn ModelCallbacks>) -> Result<(), ModelError> {
        self.item_mut(item)?.callbacks = Some(callbacks);
        Ok(())
    }

    pub fn callbacks_mut(&mut self, item: ModelItemId) -> Result<Option<&mut (dyn ModelCallbacks + 'static)>, ModelError> {
        Ok(self.item_mut(item)?.callbacks.as_deref_mut())
    }

    pub fn set_user_data(&mut self, item: ModelItemId, data: Box<dyn Any>) -> Result<(), ModelError> {
        self.item_mut(item)?.user_data = Some(data);
        Ok(())
    }

    pub fn user_data(&self, item: ModelItemId) -> Option<&dyn Any> {
        self.item(item).ok()?.user_data.as_deref()
    }

    pub fn user_data_mut(&mut self, item: ModelItemId) -> Option<&mut dyn Any> {
        self.item_mut(item).ok()?.user_data.as_deref_mut()
    }

    fn callbacks(&self, item: ModelItemId) -> Option<&dyn ModelCallbacks> {
        let callbacks = self.item(item).ok()?.callbacks.as_deref();
        if callbacks.is_none() {
            warn!("{item} has no callbacks installed");
        }
        callbacks
    }

    pub fn get_number(&self, item: ModelItemId, key: &str) -> f64 {
        self.callbacks(item).map_or(0.0, |c| c.get_number(key))
    }

    pub fn get_string(&self, item: ModelItemId, key: &str) -> String {
        self.callbacks(item).map(|c| c.get_string(key)).unwrap_or_default()
    }

    pub fn is_number_const(&self, item: ModelItemId, key: &str) -> bool {
        self.callbacks(item).is_some_and(|c| c.is_number_const(key))
    }

    pub fn is_string_const(&self, item: ModelItemId, key: &str) -> bool {
        self.callbacks(item).is_some_and(|c| c.is_string_const(key))
    }

    /// Writes through the callbacks and queues an item-set event.
    pub fn set_number(&mut self, item: ModelItemId, key: &str, value: f64) -> Result<(), ModelError> {
        if let Some(callbacks) = self.item_mut(item)?.callbacks.as_deref_mut() {
            callbacks.set_number(key, value);
        }
        self.push_event(ModelEvent::ItemSet { item });
        Ok(())
    }

    pub fn set_string(&mut self, item: ModelItemId, key: &str, value: &str) -> Result<(), ModelError> {
        if let Some(callbacks) = self.item_mut(item)?.callbacks.as_deref_mut() {
            callbacks.set_string(key, value);
        }
        self.push_event(ModelEvent::ItemSet { item });
        Ok(())
    }

    pub fn on_trigger(&mut self, item: ModelItemId, key: &str) {
        match self.item_mut(item).ok().and_then(|i| i.callbacks.as_deref_mut()) {
            Some(callbacks) => callbacks.on_trigger(key),
            None => warn!("trigger {key} dropped, {item} has no callbacks"),
        }
    }

    pub fn set_state(&mut self, item: ModelItemId, identity: &str) -> Result<(), ModelError> {
        self.item(item)?;
        self.push_event(ModelEvent::StateSet { key: StateKey::model(identity, item) });
        Ok(())
    }

    pub fn unset_state(&mut self, item: ModelItemId, identity: &str) -> Result<(), ModelError> {
        self.item(item)?;
        self.push_event(ModelEvent::StateUnset { key: StateKey::model(identity, item) });
        Ok(())
    }
}

pub struct ModelItemIter<'a> {
    store: &'a ModelStore,
    current: Option<ModelItemId>,
}

impl Iterator for ModelItemIter<'_> {
    type Item = ModelItemId;

    fn next(&mut self) -> Option<ModelItemId> {
        let current = self.current?;
        self.current = self.store.next(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(store: &ModelStore, c: ContainerId) -> Vec<ModelItemId> {
        store.iter(c).collect()
    }

    fn drain(store: &mut ModelStore) -> Vec<ModelEvent> {
        std::iter::from_fn(|| store.pop_event()).collect()
    }

    fn five(store: &mut ModelStore) -> (ContainerId, [ModelItemId; 5]) {
        let c = store.add_root_container("Todos");
        let items = [(); 5].map(|_| store.push_back_new(c).unwrap());
        (c, items)
    }

    #[test]
    fn test_linked_list_swap_and_delete() {
        let mut store = ModelStore::new();
        let (c, [a, b, cc, d, e]) = five(&mut store);
        store.swap(a, b).unwrap();
        assert_eq!(order(&store, c), vec![b, a, cc, d, e]);

        let mut store = ModelStore::new();
        let (c, [a, b, cc, d, e]) = five(&mut store);
        store.swap(b, a).unwrap();
        assert_eq!(order(&store, c), vec![b, a, cc, d, e]);

        let mut store = ModelStore::new();
        let (c, [a, b, cc, d, e]) = five(&mut store);
        store.safe_to_delete(cc).unwrap();
        assert_eq!(order(&store, c), vec![a, b, d, e]);
        assert_eq!(store.len(c), 4);
    }

    #[test]
    fn test_distant_swap_and_slot_reuse() {
        let mut store = ModelStore::new();
        let (c, [a, b, cc, d, e]) = five(&mut store);
        store.swap(e, a).unwrap();
        assert_eq!(order(&store, c), vec![e, b, cc, d, a]);

        store.safe_to_delete(e).unwrap();
        assert_eq!(store.first(c), Some(b));
        let f = store.push_back_new(c).unwrap();
        assert_eq!(order(&store, c), vec![b, cc, d, a, f]);
        assert_eq!(f.index(), e.index());
        assert_ne!(f, e);
        assert_eq!(store.swap(e, a), Err(ModelError::StaleHandle));
    }

    #[test]
    fn test_events_are_fifo() {
        let mut store = ModelStore::new();
        let c = store.add_root_container("Todos");
        let a = store.push_back_new(c).unwrap();
        store.set_state(a, "done").unwrap();
        store.erase_later(a).unwrap();
        let events = drain(&mut store);
        assert_eq!(
            events,
            vec![
                ModelEvent::ItemAdded { container: c, item: a },
                ModelEvent::StateSet { key: StateKey::model("done", a) },
                ModelEvent::ItemRemoved { container: c, item: a },
            ]
        );
    }

    #[test]
    fn test_child_model_path_and_reuse() {
        let mut store = ModelStore::new();
        let root = store.add_root_container("Lists");
        let list = store.push_back_new(root).unwrap();
        let entries = store.instantiate_child_model(list, "Entries").unwrap();
        assert_eq!(store.instantiate_child_model(list, "Other").unwrap(), entries);
        assert_eq!(store.model_path(entries).unwrap(), vec!["Lists".to_string(), "Entries".to_string()]);
        assert_eq!(store.parent_item(entries), Some(list));
    }

    #[test]
    fn test_swap_across_containers_is_misconfigured() {
        let mut store = ModelStore::new();
        let one = store.add_root_container("One");
        let two = store.add_root_container("Two");
        let a = store.push_back_new(one).unwrap();
        let b = store.push_back_new(two).unwrap();
        assert!(matches!(store.swap(a, b), Err(ModelError::Misconfigured(_))));
    }

    struct Record {
        value: f64,
        triggered: Vec<String>,
    }

    impl ModelCallbacks for Record {
        fn get_number(&self, _: &str) -> f64 {
            self.value
        }
        fn get_string(&self, key: &str) -> String {
            format!("{key}={}", self.value)
        }
        fn set_number(&mut self, _: &str, value: f64) {
            self.value = value;
        }
        fn set_string(&mut self, _: &str, _: &str) {}
        fn on_trigger(&mut self, key: &str) {
            self.triggered.push(key.to_string());
        }
    }

    #[test]
    fn test_callbacks_and_set_event() {
        let mut store = ModelStore::new();
        let c = store.add_root_container("Todos");
        let a = store.push_back_new(c).unwrap();
        assert_eq!(store.get_number(a, "count"), 0.0);
        store.set_callbacks(a, Box::new(Record { value: 1.0, triggered: Vec::new() })).unwrap();
        drain(&mut store);
        store.set_number(a, "count", 4.0).unwrap();
        assert_eq!(store.get_number(a, "count"), 4.0);
        assert_eq!(store.get_string(a, "count"), "count=4");
        assert_eq!(drain(&mut store), vec![ModelEvent::ItemSet { item: a }]);
    }
}
