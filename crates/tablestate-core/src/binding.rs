//! Event bindings couple an area group to the callbacks for one event kind.

use crate::dispatch::DispatchContext;
use crate::runtime::{EventPayload, RegistrationHandle};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of events an area group can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Something moved inside an area.
    Movement,
    /// A classifier tagged the contents of an area.
    SimpleClassification,
    /// A classifier located and classified objects inside an area.
    PositionClassification,
}

/// Callback for movement: receives the rectangle index.
pub type MovementCallback = Box<dyn FnMut(&mut DispatchContext<'_>, usize)>;

/// Callback for classification events: receives the rectangle index and the
/// runtime's payload, passed through untouched.
pub type ClassificationCallback =
    Box<dyn FnMut(&mut DispatchContext<'_>, usize, &serde_json::Value)>;

pub(crate) enum Handlers {
    Movement(MovementCallback),
    SimpleClassification {
        classifier: String,
        on_classified: ClassificationCallback,
    },
    PositionClassification {
        classifier: String,
        on_classified: ClassificationCallback,
        on_preclassified: ClassificationCallback,
    },
}

/// The callbacks bound to an area group plus its registration status.
///
/// A binding is enabled while it holds a runtime registration handle.
pub struct EventBinding {
    handlers: Handlers,
    registration: Option<RegistrationHandle>,
}

impl EventBinding {
    pub(crate) fn new(handlers: Handlers) -> Self {
        Self {
            handlers,
            registration: None,
        }
    }

    /// The event kind this binding listens for.
    pub fn kind(&self) -> EventKind {
        match self.handlers {
            Handlers::Movement(_) => EventKind::Movement,
            Handlers::SimpleClassification { .. } => EventKind::SimpleClassification,
            Handlers::PositionClassification { .. } => EventKind::PositionClassification,
        }
    }

    /// Classifier name, for classification kinds.
    pub fn classifier(&self) -> Option<&str> {
        match &self.handlers {
            Handlers::Movement(_) => None,
            Handlers::SimpleClassification { classifier, .. }
            | Handlers::PositionClassification { classifier, .. } => Some(classifier),
        }
    }

    /// Check if the binding is registered with the runtime.
    pub fn is_enabled(&self) -> bool {
        self.registration.is_some()
    }

    /// The runtime handle, while enabled.
    pub fn registration(&self) -> Option<RegistrationHandle> {
        self.registration
    }

    pub(crate) fn set_registration(&mut self, handle: Option<RegistrationHandle>) {
        self.registration = handle;
    }

    /// Run the callback matching `payload`. Returns false when the payload
    /// does not belong to this binding's kind.
    pub(crate) fn invoke(&mut self, ctx: &mut DispatchContext<'_>, payload: &EventPayload) -> bool {
        match (&mut self.handlers, payload) {
            (Handlers::Movement(callback), EventPayload::Movement { rect_index }) => {
                callback(ctx, *rect_index);
            }
            (
                Handlers::SimpleClassification { on_classified, .. },
                EventPayload::SimpleClassification {
                    rect_index,
                    class_tag,
                },
            ) => on_classified(ctx, *rect_index, class_tag),
            (
                Handlers::PositionClassification { on_classified, .. },
                EventPayload::PositionClassification {
                    rect_index,
                    classified,
                },
            ) => on_classified(ctx, *rect_index, classified),
            (
                Handlers::PositionClassification {
                    on_preclassified, ..
                },
                EventPayload::Preclassification {
                    rect_index,
                    outlines,
                },
            ) => on_preclassified(ctx, *rect_index, outlines),
            _ => return false,
        }
        true
    }
}

impl fmt::Debug for EventBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBinding")
            .field("kind", &self.kind())
            .field("classifier", &self.classifier())
            .field("registration", &self.registration)
            .finish()
    }
}
