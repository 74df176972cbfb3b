//! Error types for state and area bookkeeping.

use crate::binding::EventKind;
use crate::runtime::RuntimeError;
use thiserror::Error;

/// Errors surfaced by states, area groups and the state manager.
///
/// Structural mistakes (duplicate ids, unknown names, bad indices) are
/// returned to the caller as-is. Collaborator rejections are wrapped in
/// [`StateError::RegistrationFailed`].
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Invalid geometry: {width}x{height} (width and height must be positive)")]
    InvalidGeometry { width: u32, height: u32 },
    #[error("Area index {index} out of range for group with {len} areas")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Event kind {kind:?} unsupported for area group '{group}' with {area_count} areas")]
    UnsupportedEventKind {
        group: String,
        kind: EventKind,
        area_count: usize,
    },
    #[error("Area group already exists: {0}")]
    DuplicateAreaGroupId(String),
    #[error("Area group not found: {0}")]
    UnknownAreaGroupId(String),
    #[error("State already exists: {0}")]
    DuplicateStateName(String),
    #[error("State not found: {0}")]
    UnknownStateName(String),
    #[error("Button not found: {0}")]
    UnknownButton(u64),
    #[error("Registration failed for '{target}': {source}")]
    RegistrationFailed {
        target: String,
        source: RuntimeError,
    },
}

/// Result type for state operations.
pub type StateResult<T> = Result<T, StateError>;

impl StateError {
    pub(crate) fn registration(target: impl Into<String>, source: RuntimeError) -> Self {
        Self::RegistrationFailed {
            target: target.into(),
            source,
        }
    }
}
