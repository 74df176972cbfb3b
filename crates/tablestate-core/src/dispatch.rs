//! Types seen by callbacks while the state manager drains runtime events.

use crate::config::ClassifierTable;
use crate::error::StateError;
use crate::manager::TransitionReport;

/// Context passed to every callback.
///
/// Callbacks cannot touch the state graph directly because it is being
/// iterated. State changes are queued here and applied once the callback
/// returns, before the next event is delivered.
#[derive(Debug)]
pub struct DispatchContext<'a> {
    current_state: Option<&'a str>,
    classifiers: &'a ClassifierTable,
    requested: Vec<String>,
}

impl<'a> DispatchContext<'a> {
    pub(crate) fn new(current_state: Option<&'a str>, classifiers: &'a ClassifierTable) -> Self {
        Self {
            current_state,
            classifiers,
            requested: Vec::new(),
        }
    }

    /// Name of the active state when the event was delivered.
    pub fn current_state_name(&self) -> Option<&str> {
        self.current_state
    }

    /// The classifier table resolved at startup.
    pub fn classifiers(&self) -> &ClassifierTable {
        self.classifiers
    }

    /// Check whether a class tag means "finger" in this environment.
    pub fn is_finger(&self, class_tag: &serde_json::Value) -> bool {
        self.classifiers.is_finger(class_tag)
    }

    /// Request a transition to `name` once this callback returns.
    pub fn change_to_state(&mut self, name: impl Into<String>) {
        self.requested.push(name.into());
    }

    pub(crate) fn into_requests(self) -> Vec<String> {
        self.requested
    }
}

/// Outcome of one [`StateManager::dispatch_pending`](crate::StateManager::dispatch_pending) pass.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Events that reached a callback.
    pub delivered: usize,
    /// Events dropped: unknown handle, stale index, or wrong kind.
    pub dropped: usize,
    /// Transitions requested by callbacks, in the order they ran.
    pub transitions: Vec<TransitionReport>,
    /// Transitions that could not run (e.g. unknown state name).
    pub errors: Vec<StateError>,
}
