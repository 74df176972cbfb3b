//! State manager: the registry of states and the single active one.

use crate::area::Rectangle;
use crate::config::{ClassifierTable, PlatformConfig};
use crate::dispatch::{DispatchContext, DispatchReport};
use crate::error::{StateError, StateResult};
use crate::runtime::{
    EventPayload, EventSender, PlatformRuntime, RegistrationHandle, RuntimeError, RuntimeEvent,
    event_channel,
};
use crate::state::{BindingFailure, State, StateMut};
use std::fmt;
use std::sync::mpsc::Receiver;

/// Identifier of a button registered outside any state.
pub type ButtonId = u64;

/// Callback for a button: receives the class tag reported by the runtime.
pub type ButtonCallback = Box<dyn FnMut(&mut DispatchContext<'_>, &serde_json::Value)>;

struct Button {
    id: ButtonId,
    area: Rectangle,
    handle: RegistrationHandle,
    callback: ButtonCallback,
}

impl fmt::Debug for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Button")
            .field("id", &self.id)
            .field("area", &self.area)
            .field("handle", &self.handle)
            .finish()
    }
}

/// What happened during one state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionReport {
    /// State that was active before the transition.
    pub from: Option<String>,
    /// State that is active now.
    pub to: String,
    /// Bindings that could not be disabled.
    pub deactivation_failures: Vec<BindingFailure>,
    /// Bindings of `to` that could not be enabled.
    pub activation_failures: Vec<BindingFailure>,
    /// Buttons cleared by the transition.
    pub released_buttons: Vec<ButtonId>,
}

impl TransitionReport {
    /// Check if every binding changed as requested.
    pub fn is_clean(&self) -> bool {
        self.deactivation_failures.is_empty() && self.activation_failures.is_empty()
    }
}

/// Registry of states with at most one active state.
///
/// The manager owns the runtime and the event queue. Changing state disables
/// every binding of the old state before any binding of the new one is
/// enabled, so two states are never active together.
pub struct StateManager<R: PlatformRuntime> {
    runtime: R,
    config: PlatformConfig,
    /// Resolved once from `config`.
    classifiers: ClassifierTable,
    /// States in registration order.
    states: Vec<State>,
    /// Name of the active state.
    current: Option<String>,
    buttons: Vec<Button>,
    next_button_id: ButtonId,
    events: Receiver<RuntimeEvent>,
    sender: EventSender,
}

impl<R: PlatformRuntime> StateManager<R> {
    /// Create a new state manager and connect the runtime to its event queue.
    pub fn new(mut runtime: R, config: PlatformConfig) -> Self {
        let (sender, events) = event_channel();
        runtime.connect(sender.clone());
        let classifiers = config.classifiers();
        log::info!(
            "State manager ready ({} environment, finger classifier '{}')",
            config.environment,
            classifiers.finger
        );
        Self {
            runtime,
            config,
            classifiers,
            states: Vec::new(),
            current: None,
            buttons: Vec::new(),
            next_button_id: 1,
            events,
            sender,
        }
    }

    /// The configuration supplied at startup.
    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    /// The resolved classifier table.
    pub fn classifiers(&self) -> &ClassifierTable {
        &self.classifiers
    }

    /// The runtime.
    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Mutable access to the runtime.
    pub fn runtime_mut(&mut self) -> &mut R {
        &mut self.runtime
    }

    /// A sender for posting events into this manager's queue.
    pub fn event_sender(&self) -> EventSender {
        self.sender.clone()
    }

    // --- States ---

    /// Register a new, empty state.
    pub fn add_state(&mut self, name: impl Into<String>) -> StateResult<StateMut<'_>> {
        let name = name.into();
        if self.state(&name).is_some() {
            return Err(StateError::DuplicateStateName(name));
        }
        log::debug!("Added state '{}'", name);
        self.states.push(State::new(name));
        let index = self.states.len() - 1;
        Ok(StateMut::new(
            &mut self.states[index],
            &mut self.runtime,
            &self.classifiers,
        ))
    }

    /// Look up a state.
    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name() == name)
    }

    /// Mutable access to a state.
    pub fn state_mut(&mut self, name: &str) -> StateResult<StateMut<'_>> {
        let state = self
            .states
            .iter_mut()
            .find(|s| s.name() == name)
            .ok_or_else(|| StateError::UnknownStateName(name.to_string()))?;
        Ok(StateMut::new(state, &mut self.runtime, &self.classifiers))
    }

    /// Names of all states, in registration order.
    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(State::name)
    }

    /// Deactivate and remove a state. Removing the active state leaves no
    /// state active.
    pub fn remove_state(&mut self, name: &str) -> StateResult<State> {
        let index = self
            .states
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| StateError::UnknownStateName(name.to_string()))?;
        let failures = self.states[index].deactivate_all(&mut self.runtime);
        if !failures.is_empty() {
            log::warn!("Removed state '{}' with {} stuck bindings", name, failures.len());
        }
        if self.current.as_deref() == Some(name) {
            self.current = None;
        }
        Ok(self.states.remove(index))
    }

    /// The active state, if any.
    pub fn current_state(&self) -> Option<&State> {
        self.current.as_deref().and_then(|name| self.state(name))
    }

    /// Name of the active state, if any.
    pub fn current_state_name(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// `(state, group)` pairs for every binding registered with the runtime.
    pub fn enabled_bindings(&self) -> Vec<(&str, &str)> {
        self.states
            .iter()
            .flat_map(|s| s.enabled_groups().map(move |g| (s.name(), g)))
            .collect()
    }

    /// Make `name` the active state.
    ///
    /// Deactivates the current state (and any other state left with enabled
    /// bindings), clears buttons, then activates the target. The target
    /// becomes current even if some bindings failed to change; those failures
    /// are in the report.
    pub fn change_to_state(&mut self, name: &str) -> StateResult<TransitionReport> {
        let target = self
            .states
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| StateError::UnknownStateName(name.to_string()))?;

        let from = self.current.clone();
        let current_index = from
            .as_deref()
            .and_then(|current| self.states.iter().position(|s| s.name() == current));
        let mut deactivation_failures = match current_index {
            Some(index) => self.states[index].deactivate_all(&mut self.runtime),
            None => Vec::new(),
        };
        // Bindings enabled directly on other states are cleared too.
        for index in 0..self.states.len() {
            if index == target || Some(index) == current_index {
                continue;
            }
            let state = &mut self.states[index];
            if state.enabled_groups().next().is_some() {
                log::debug!("Deactivating stray bindings of '{}'", state.name());
                deactivation_failures.extend(state.deactivate_all(&mut self.runtime));
            }
        }
        let released_buttons = self.release_buttons();
        let activation_failures = self.states[target].activate_all(&mut self.runtime);
        self.current = Some(name.to_string());

        let report = TransitionReport {
            from,
            to: name.to_string(),
            deactivation_failures,
            activation_failures,
            released_buttons,
        };
        if report.is_clean() {
            log::info!("Changed state {:?} -> '{}'", report.from, report.to);
        } else {
            log::warn!(
                "Changed state {:?} -> '{}' with {} deactivation and {} activation failures",
                report.from,
                report.to,
                report.deactivation_failures.len(),
                report.activation_failures.len()
            );
        }
        Ok(report)
    }

    // --- Buttons ---

    /// Register a one-off button outside any state. The default classifier is
    /// the environment's finger classifier.
    ///
    /// Buttons are cleared by the next state change, like every other
    /// registration the runtime holds.
    pub fn add_button<F>(
        &mut self,
        area: Rectangle,
        classifier: Option<&str>,
        callback: F,
    ) -> StateResult<ButtonId>
    where
        F: FnMut(&mut DispatchContext<'_>, &serde_json::Value) + 'static,
    {
        area.validate()?;
        let classifier = classifier.unwrap_or(&self.classifiers.finger);
        let handle = self
            .runtime
            .register_button(&area, classifier)
            .map_err(|source| StateError::registration("button", source))?;

        let id = self.next_button_id;
        self.next_button_id += 1;
        log::debug!("Registered button {} with classifier '{}'", id, classifier);
        self.buttons.push(Button {
            id,
            area,
            handle,
            callback: Box::new(callback),
        });
        Ok(id)
    }

    /// Deregister a button.
    pub fn remove_button(&mut self, id: ButtonId) -> StateResult<()> {
        let index = self
            .buttons
            .iter()
            .position(|b| b.id == id)
            .ok_or(StateError::UnknownButton(id))?;
        match self.runtime.deregister(self.buttons[index].handle) {
            Ok(()) | Err(RuntimeError::UnknownHandle(_)) => {}
            Err(source) => return Err(StateError::registration("button", source)),
        }
        self.buttons.remove(index);
        Ok(())
    }

    /// Ids of live buttons.
    pub fn button_ids(&self) -> impl Iterator<Item = ButtonId> + '_ {
        self.buttons.iter().map(|b| b.id)
    }

    fn release_buttons(&mut self) -> Vec<ButtonId> {
        let mut released = Vec::with_capacity(self.buttons.len());
        for button in self.buttons.drain(..) {
            match self.runtime.deregister(button.handle) {
                Ok(()) | Err(RuntimeError::UnknownHandle(_)) => {}
                Err(e) => log::warn!("Button {} not deregistered cleanly: {}", button.id, e),
            }
            released.push(button.id);
        }
        released
    }

    // --- Dispatch ---

    /// Drain the event queue, running callbacks one at a time.
    ///
    /// Transitions requested by a callback run before the next event is
    /// delivered. Events whose handle is no longer registered are dropped, as
    /// are events for bindings outside the current state once one is set.
    pub fn dispatch_pending(&mut self) -> DispatchReport {
        let mut report = DispatchReport::default();
        while let Ok(event) = self.events.try_recv() {
            let Some(requests) = self.deliver(event) else {
                report.dropped += 1;
                continue;
            };
            report.delivered += 1;
            for name in requests {
                match self.change_to_state(&name) {
                    Ok(transition) => report.transitions.push(transition),
                    Err(e) => {
                        log::warn!("Callback requested a transition that failed: {}", e);
                        report.errors.push(e);
                    }
                }
            }
        }
        report
    }

    /// Run the callback for one event. Returns the transitions it requested,
    /// or `None` if the event was dropped.
    fn deliver(&mut self, event: RuntimeEvent) -> Option<Vec<String>> {
        let Self {
            states,
            buttons,
            current,
            classifiers,
            ..
        } = self;
        let mut ctx = DispatchContext::new(current.as_deref(), classifiers);

        if let Some(button) = buttons.iter_mut().find(|b| b.handle == event.handle) {
            let EventPayload::SimpleClassification {
                rect_index: 0,
                class_tag,
            } = &event.event
            else {
                log::warn!("Dropping {:?} for button {}", event.event, button.id);
                return None;
            };
            log::debug!("Button {} classified as {}", button.id, class_tag);
            (button.callback)(&mut ctx, class_tag);
            return Some(ctx.into_requests());
        }

        let Some((owner, group)) = states
            .iter_mut()
            .find_map(|s| s.group_for_handle_mut(event.handle))
        else {
            log::debug!("Dropping event for unregistered handle {}", event.handle);
            return None;
        };
        // A binding left registered by a failed deactivation stays silent.
        if current.as_deref().is_some_and(|active| active != owner) {
            log::warn!(
                "Dropping event for '{}' of inactive state '{}'",
                group.id(),
                owner
            );
            return None;
        }

        let index = event.event.rect_index();
        if index >= group.len() {
            log::warn!(
                "Dropping stale event for '{}': index {} of {}",
                group.id(),
                index,
                group.len()
            );
            return None;
        }
        let binding = group.binding_mut()?;
        if !binding.invoke(&mut ctx, &event.event) {
            log::warn!("Dropping {:?}: binding listens for {:?}", event.event, binding.kind());
            return None;
        }
        Some(ctx.into_requests())
    }
}

impl<R: PlatformRuntime + fmt::Debug> fmt::Debug for StateManager<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateManager")
            .field("runtime", &self.runtime)
            .field("config", &self.config)
            .field("states", &self.states)
            .field("current", &self.current)
            .field("buttons", &self.buttons)
            .finish()
    }
}
