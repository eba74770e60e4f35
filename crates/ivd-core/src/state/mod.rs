//! Runtime boolean states.
//!
//! A state is identified by a name plus the thing it belongs to: the whole
//! application, one display item or one model item. States drive which keyed
//! attribute layers are merged into a display item.

mod manager;
mod virtual_key;

use std::fmt;

pub use manager::{AttributeLayerSink, StateManager};
pub use virtual_key::{StateExpr, StateOp, VirtualStateKey, VirtualStateKeyPrecursor};

use crate::display_item::ItemId;
use crate::model::ModelItemId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateScope {
    /// Declared first so that it sorts before every scoped variant.
    Global,
    Item(ItemId),
    Model(ModelItemId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey {
    pub identity: String,
    pub scope: StateScope,
}

impl StateKey {
    pub fn new(identity: impl Into<String>, scope: StateScope) -> Self {
        Self { identity: identity.into(), scope }
    }

    pub fn global(identity: impl Into<String>) -> Self {
        Self::new(identity, StateScope::Global)
    }

    pub fn item(identity: impl Into<String>, item: ItemId) -> Self {
        Self::new(identity, StateScope::Item(item))
    }

    pub fn model(identity: impl Into<String>, model: ModelItemId) -> Self {
        Self::new(identity, StateScope::Model(model))
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            StateScope::Global => write!(f, "::{}", self.identity),
            StateScope::Item(item) => write!(f, "{}@{item}", self.identity),
            StateScope::Model(model) => write!(f, "{}@{model}", self.identity),
        }
    }
}
