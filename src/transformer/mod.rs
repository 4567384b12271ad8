//! Payload transformation: path resolution, transforms and the mapping engine.

pub mod catalog;
pub mod condition;
pub mod mapping;
pub mod path;
pub mod url;

pub use catalog::{BuiltinTransform, TransformCatalog, TransformFn};
pub use condition::Condition;
pub use mapping::MappingEngine;

use thiserror::Error;

/// Errors from mapping a single field or a custom transform.
///
/// These never abort a mapping; they are collected into [`Diagnostics`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("Missing required field: {0}")]
    RequiredFieldMissing(String),

    #[error("Array mapping has no root path")]
    MissingRoot,

    #[error("Root path {0} did not resolve to an array")]
    RootNotArray(String),

    #[error("Custom transform error: {0}")]
    CustomLogic(String),

    #[error("Custom transform error: no function registered as '{0}'")]
    UnknownLogic(String),

    #[error("Custom transform error: mapping has no logic")]
    MissingLogic,
}

/// A field that could not be mapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFailure {
    /// Source path of the rule (or `$` for whole-value failures)
    pub source: String,
    /// Target path of the rule
    pub target: String,
    pub error: TransformError,
}

/// Failures collected while mapping one value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    failures: Vec<FieldFailure>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, source: &str, target: &str, error: TransformError) {
        self.failures.push(FieldFailure {
            source: source.to_string(),
            target: target.to_string(),
            error,
        });
    }

    pub fn failures(&self) -> &[FieldFailure] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of required fields that resolved to nothing.
    pub fn missing_required(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| matches!(f.error, TransformError::RequiredFieldMissing(_)))
            .count()
    }
}
