//! Scoped references to values and states.
//!
//! A [`ScopedValueKey`] is the unresolved, template-level name of something:
//! `this.width`, `model.title`, `Window::Header.size-a` or `::IVD-Core-Quit`.
//! It is resolved against a concrete display item at runtime.

use std::fmt;

pub type ValueKey = String;
pub type ValueKeyPath = Vec<ValueKey>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Global,
    Element,
    Model,
    Material,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopedValueKey {
    pub scope: Scope,
    pub path: Option<ValueKeyPath>,
    pub key: Option<ValueKey>,
}

impl ScopedValueKey {
    pub fn new(scope: Scope, key: impl Into<ValueKey>) -> Self {
        Self { scope, path: None, key: Some(key.into()) }
    }

    pub fn element(key: impl Into<ValueKey>) -> Self {
        Self::new(Scope::Element, key)
    }

    pub fn model(key: impl Into<ValueKey>) -> Self {
        Self::new(Scope::Model, key)
    }

    pub fn global(key: impl Into<ValueKey>) -> Self {
        Self::new(Scope::Global, key)
    }

    pub fn with_path(mut self, path: ValueKeyPath) -> Self {
        self.path = Some(path);
        self
    }

    pub fn key_str(&self) -> &str {
        self.key.as_deref().unwrap_or("")
    }
}

pub fn format_path(path: &[ValueKey]) -> String {
    path.join("::")
}

impl fmt::Display for ScopedValueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = self.key_str();
        match (self.scope, &self.path) {
            (Scope::Element, None) => write!(f, "this.{key}"),
            (Scope::Element, Some(path)) => write!(f, "{}.{key}", format_path(path)),
            (Scope::Model, _) => write!(f, "model.{key}"),
            (Scope::Material, _) => write!(f, "material.{key}"),
            (Scope::Global, None) => write!(f, "::{key}"),
            (Scope::Global, Some(path)) => write!(f, "::{}.{key}", format_path(path)),
        }
    }
}
