//! ivd-core: a declarative, state-driven UI runtime.
//!
//! - Element documents compile into immutable attribute layers.
//! - Boolean states decide which layers each display item merges.
//! - Materials lay out, draw and hit-test the resulting item tree.
//! - The environment runs the frame loop against a [`driver::Driver`].

pub mod canvas;
pub mod color;
pub mod defaults;
pub mod display_item;
pub mod document;
pub mod driver;
pub mod element;
pub mod environment;
pub mod error;
pub mod expression;
pub mod geometry;
pub mod graph;
pub mod image_cache;
pub mod keywords;
pub mod material;
pub mod model;
pub mod reference;
pub mod runtime;
pub mod state;
pub mod states;
pub mod text;
pub mod value_key;
pub mod world;

pub use display_item::ItemId;
pub use document::Document;
pub use driver::{Driver, DriverRequest, HeadlessDriver, HeadlessInput};
pub use environment::Environment;
pub use error::{DocumentError, ExpressionError, LoadStatus, ModelError, ParseError};
pub use model::{ContainerId, ModelCallbacks, ModelEvent, ModelItemId, ModelStore};
pub use state::{StateKey, StateManager};

pub use ivd_config::IvdConfig;
