//! Boundary to the platform runtime.
//!
//! The runtime does the area tracking, classification and projection. This
//! crate only registers rectangles with it and receives typed events back
//! through a single-consumer queue drained by the state manager.

mod simulated;

pub use simulated::{Registration, RuntimeCall, SimulatedRuntime};

use crate::area::Rectangle;
use crate::binding::EventKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::mpsc::{Receiver, Sender, channel};
use thiserror::Error;
use uuid::Uuid;

/// Errors reported by the platform runtime.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("Runtime rejected the request: {0}")]
    Rejected(String),
    #[error("Registration quota exceeded (limit {limit})")]
    QuotaExceeded { limit: usize },
    #[error("Areas #{first} and #{second} overlap")]
    OverlappingAreas { first: usize, second: usize },
    #[error("Unsupported classifier: {0}")]
    UnsupportedClassifier(String),
    #[error("Unknown registration handle: {0}")]
    UnknownHandle(RegistrationHandle),
    #[error("Event queue disconnected")]
    Disconnected,
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
}

/// Result type for runtime calls.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Opaque handle returned by the runtime for one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationHandle(Uuid);

impl RegistrationHandle {
    /// Allocate a fresh handle.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RegistrationHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RegistrationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the runtime observed inside one registered rectangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Movement detected.
    Movement { rect_index: usize },
    /// The classifier assigned a class tag.
    SimpleClassification {
        rect_index: usize,
        class_tag: serde_json::Value,
    },
    /// Objects were classified and located.
    PositionClassification {
        rect_index: usize,
        classified: serde_json::Value,
    },
    /// Objects were detected but not yet classified. Carries outlines.
    Preclassification {
        rect_index: usize,
        outlines: serde_json::Value,
    },
}

impl EventPayload {
    /// Index of the rectangle within its registration.
    pub fn rect_index(&self) -> usize {
        match self {
            Self::Movement { rect_index }
            | Self::SimpleClassification { rect_index, .. }
            | Self::PositionClassification { rect_index, .. }
            | Self::Preclassification { rect_index, .. } => *rect_index,
        }
    }

    /// The event kind this payload belongs to.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Movement { .. } => EventKind::Movement,
            Self::SimpleClassification { .. } => EventKind::SimpleClassification,
            Self::PositionClassification { .. } | Self::Preclassification { .. } => {
                EventKind::PositionClassification
            }
        }
    }
}

/// An event addressed to a previously returned registration handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeEvent {
    pub handle: RegistrationHandle,
    pub event: EventPayload,
}

/// Producer side of the event queue, handed to the runtime on connect.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<RuntimeEvent>,
}

impl EventSender {
    /// Queue an event for the next dispatch pass.
    pub fn post(&self, handle: RegistrationHandle, event: EventPayload) -> RuntimeResult<()> {
        self.tx
            .send(RuntimeEvent { handle, event })
            .map_err(|_| RuntimeError::Disconnected)
    }

    /// Queue an event received as JSON, e.g. from a runtime bridge.
    pub fn post_json(&self, json: &str) -> RuntimeResult<()> {
        let event: RuntimeEvent =
            serde_json::from_str(json).map_err(|e| RuntimeError::InvalidEvent(e.to_string()))?;
        self.tx.send(event).map_err(|_| RuntimeError::Disconnected)
    }
}

/// Create the event queue. The receiver belongs to the state manager.
pub(crate) fn event_channel() -> (EventSender, Receiver<RuntimeEvent>) {
    let (tx, rx) = channel();
    (EventSender { tx }, rx)
}

/// The platform runtime as seen from this crate.
///
/// Registration calls are synchronous: they succeed or fail immediately.
/// Events flow back asynchronously through the [`EventSender`] passed to
/// [`PlatformRuntime::connect`].
pub trait PlatformRuntime {
    /// Receive the sender used to post events back.
    fn connect(&mut self, events: EventSender);

    /// Whether the runtime accepts a binding of `kind` over `area_count` areas.
    fn supports(&self, kind: EventKind, area_count: usize) -> bool;

    /// Start watching `areas` for `kind`.
    fn register_areas(
        &mut self,
        areas: &[Rectangle],
        kind: EventKind,
        classifier: Option<&str>,
    ) -> RuntimeResult<RegistrationHandle>;

    /// Stop watching a registration.
    fn deregister(&mut self, handle: RegistrationHandle) -> RuntimeResult<()>;

    /// Register a single simple-classification area outside any state.
    fn register_button(
        &mut self,
        area: &Rectangle,
        classifier: &str,
    ) -> RuntimeResult<RegistrationHandle>;
}
