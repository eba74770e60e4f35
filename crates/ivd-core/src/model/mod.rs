//! Host data bound to display items.
//!
//! The host owns its records; the runtime only sees them through
//! [`ModelCallbacks`]. Containers are ordered lists of model items, and every
//! item may own one child container, which is how nested models (a list of
//! lists) are expressed. Structural changes are queued as [`ModelEvent`]s and
//! applied by the environment at a fixed point in the frame.

mod store;

pub use store::{ModelItemIter, ModelStore};

use std::any::Any;
use std::fmt;

use crate::state::StateKey;

/// Generation-checked handle of a model item slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelItemId {
    index: u32,
    generation: u32,
}

impl ModelItemId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ModelItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model#{}v{}", self.index, self.generation)
    }
}

/// Generation-checked handle of a model container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId {
    index: u32,
    generation: u32,
}

impl ContainerId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container#{}v{}", self.index, self.generation)
    }
}

/// Accessors for one host record.
pub trait ModelCallbacks {
    fn get_number(&self, key: &str) -> f64;
    fn get_string(&self, key: &str) -> String;
    fn set_number(&mut self, key: &str, value: f64);
    fn set_string(&mut self, key: &str, value: &str);

    fn is_number_const(&self, _key: &str) -> bool {
        false
    }

    fn is_string_const(&self, _key: &str) -> bool {
        false
    }

    /// A model-scoped trigger fired by one of the item's display items.
    fn on_trigger(&mut self, key: &str);

    /// Lets bindings that install their own callbacks find them again.
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    ItemSet { item: ModelItemId },
    StateSet { key: StateKey },
    StateUnset { key: StateKey },
    ItemAdded { container: ContainerId, item: ModelItemId },
    ItemRemoved { container: ContainerId, item: ModelItemId },
    OrderInvalidated { container: ContainerId },
    ItemsSwapped { container: ContainerId, first: ModelItemId, second: ModelItemId },
}
