//! In-memory runtime that behaves like the projector simulator.

use super::{
    EventPayload, EventSender, PlatformRuntime, RegistrationHandle, RuntimeError, RuntimeResult,
};
use crate::area::Rectangle;
use crate::binding::EventKind;
use std::collections::HashSet;

/// A live registration held by the simulated runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub handle: RegistrationHandle,
    pub areas: Vec<Rectangle>,
    pub kind: EventKind,
    pub classifier: Option<String>,
}

/// A call made into the runtime, recorded for inspection.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeCall {
    Register {
        handle: RegistrationHandle,
        kind: EventKind,
        area_count: usize,
    },
    RegisterButton {
        handle: RegistrationHandle,
        classifier: String,
    },
    Deregister {
        handle: RegistrationHandle,
    },
}

/// Simulated runtime for testing and the demo.
///
/// Touches on the surface are turned into events for every live registration
/// of the matching kind whose rectangle contains the point, in registration
/// order.
#[derive(Debug, Default)]
pub struct SimulatedRuntime {
    events: Option<EventSender>,
    registrations: Vec<Registration>,
    calls: Vec<RuntimeCall>,
    max_registrations: Option<usize>,
    allow_overlap: bool,
    rejected_classifiers: HashSet<String>,
    failing_registrations: usize,
    failing_deregistrations: usize,
}

impl SimulatedRuntime {
    /// Create a new simulated runtime with no quota.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the number of simultaneous registrations.
    pub fn with_max_registrations(mut self, limit: usize) -> Self {
        self.max_registrations = Some(limit);
        self
    }

    /// Accept overlapping rectangles within one registration.
    pub fn with_overlap_allowed(mut self) -> Self {
        self.allow_overlap = true;
        self
    }

    /// Reject every registration that names `classifier`.
    pub fn reject_classifier(&mut self, classifier: impl Into<String>) {
        self.rejected_classifiers.insert(classifier.into());
    }

    /// Make the next `count` area registrations fail.
    pub fn fail_next_registrations(&mut self, count: usize) {
        self.failing_registrations = count;
    }

    /// Make the next `count` deregistrations fail.
    pub fn fail_next_deregistrations(&mut self, count: usize) {
        self.failing_deregistrations = count;
    }

    /// Live registrations, in registration order.
    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    /// Look up a live registration.
    pub fn registration(&self, handle: RegistrationHandle) -> Option<&Registration> {
        self.registrations.iter().find(|r| r.handle == handle)
    }

    /// Check if a handle is currently registered.
    pub fn is_registered(&self, handle: RegistrationHandle) -> bool {
        self.registration(handle).is_some()
    }

    /// Every call made so far.
    pub fn calls(&self) -> &[RuntimeCall] {
        &self.calls
    }

    /// Number of successful register calls (areas and buttons).
    pub fn register_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| !matches!(c, RuntimeCall::Deregister { .. }))
            .count()
    }

    /// Forget the call log.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Simulate movement at a surface point.
    pub fn move_at(&self, x: f64, y: f64) -> RuntimeResult<usize> {
        self.touch(x, y, EventKind::Movement, |rect_index| EventPayload::Movement {
            rect_index,
        })
    }

    /// Simulate a simple classification at a surface point.
    pub fn classify_at(&self, x: f64, y: f64, class_tag: serde_json::Value) -> RuntimeResult<usize> {
        self.touch(x, y, EventKind::SimpleClassification, |rect_index| {
            EventPayload::SimpleClassification {
                rect_index,
                class_tag: class_tag.clone(),
            }
        })
    }

    /// Simulate a finished position classification at a surface point.
    pub fn position_classify_at(
        &self,
        x: f64,
        y: f64,
        classified: serde_json::Value,
    ) -> RuntimeResult<usize> {
        self.touch(x, y, EventKind::PositionClassification, |rect_index| {
            EventPayload::PositionClassification {
                rect_index,
                classified: classified.clone(),
            }
        })
    }

    /// Simulate detected-but-unclassified objects at a surface point.
    pub fn preclassify_at(
        &self,
        x: f64,
        y: f64,
        outlines: serde_json::Value,
    ) -> RuntimeResult<usize> {
        self.touch(x, y, EventKind::PositionClassification, |rect_index| {
            EventPayload::Preclassification {
                rect_index,
                outlines: outlines.clone(),
            }
        })
    }

    /// Post a raw event to a handle, bypassing hit testing.
    pub fn post(&self, handle: RegistrationHandle, event: EventPayload) -> RuntimeResult<()> {
        self.sender()?.post(handle, event)
    }

    fn sender(&self) -> RuntimeResult<&EventSender> {
        self.events.as_ref().ok_or(RuntimeError::Disconnected)
    }

    fn touch(
        &self,
        x: f64,
        y: f64,
        kind: EventKind,
        make: impl Fn(usize) -> EventPayload,
    ) -> RuntimeResult<usize> {
        let sender = self.sender()?;
        let mut posted = 0;
        for registration in self.registrations.iter().filter(|r| r.kind == kind) {
            for (index, area) in registration.areas.iter().enumerate() {
                if area.contains(x, y) {
                    sender.post(registration.handle, make(index))?;
                    posted += 1;
                }
            }
        }
        Ok(posted)
    }

    fn admit(&mut self, classifier: Option<&str>) -> RuntimeResult<()> {
        if self.failing_registrations > 0 {
            self.failing_registrations -= 1;
            return Err(RuntimeError::Rejected("simulated failure".to_string()));
        }
        if let Some(name) = classifier {
            if self.rejected_classifiers.contains(name) {
                return Err(RuntimeError::UnsupportedClassifier(name.to_string()));
            }
        }
        if let Some(limit) = self.max_registrations {
            if self.registrations.len() >= limit {
                return Err(RuntimeError::QuotaExceeded { limit });
            }
        }
        Ok(())
    }
}

impl PlatformRuntime for SimulatedRuntime {
    fn connect(&mut self, events: EventSender) {
        self.events = Some(events);
    }

    fn supports(&self, _kind: EventKind, area_count: usize) -> bool {
        area_count > 0
    }

    fn register_areas(
        &mut self,
        areas: &[Rectangle],
        kind: EventKind,
        classifier: Option<&str>,
    ) -> RuntimeResult<RegistrationHandle> {
        if areas.is_empty() {
            return Err(RuntimeError::Rejected("no areas to watch".to_string()));
        }
        if !self.allow_overlap {
            for (first, a) in areas.iter().enumerate() {
                if let Some(offset) = areas[first + 1..].iter().position(|b| a.overlaps(b)) {
                    return Err(RuntimeError::OverlappingAreas {
                        first,
                        second: first + 1 + offset,
                    });
                }
            }
        }
        self.admit(classifier)?;

        let handle = RegistrationHandle::new();
        self.registrations.push(Registration {
            handle,
            areas: areas.to_vec(),
            kind,
            classifier: classifier.map(str::to_string),
        });
        self.calls.push(RuntimeCall::Register {
            handle,
            kind,
            area_count: areas.len(),
        });
        log::debug!("Simulator registered {} areas for {:?} as {}", areas.len(), kind, handle);
        Ok(handle)
    }

    fn deregister(&mut self, handle: RegistrationHandle) -> RuntimeResult<()> {
        if self.failing_deregistrations > 0 {
            self.failing_deregistrations -= 1;
            return Err(RuntimeError::Rejected("simulated failure".to_string()));
        }
        let index = self
            .registrations
            .iter()
            .position(|r| r.handle == handle)
            .ok_or(RuntimeError::UnknownHandle(handle))?;
        self.registrations.remove(index);
        self.calls.push(RuntimeCall::Deregister { handle });
        log::debug!("Simulator deregistered {}", handle);
        Ok(())
    }

    fn register_button(
        &mut self,
        area: &Rectangle,
        classifier: &str,
    ) -> RuntimeResult<RegistrationHandle> {
        self.admit(Some(classifier))?;

        let handle = RegistrationHandle::new();
        self.registrations.push(Registration {
            handle,
            areas: vec![area.clone()],
            kind: EventKind::SimpleClassification,
            classifier: Some(classifier.to_string()),
        });
        self.calls.push(RuntimeCall::RegisterButton {
            handle,
            classifier: classifier.to_string(),
        });
        Ok(handle)
    }
}
