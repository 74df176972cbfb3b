//! States: named sets of area groups that are active together.

use crate::area::Rectangle;
use crate::config::ClassifierTable;
use crate::error::{StateError, StateResult};
use crate::group::{AreaGroup, AreaGroupMut};
use crate::runtime::{PlatformRuntime, RegistrationHandle, RuntimeError};
use std::ops::Deref;

/// A binding that could not be enabled or disabled during a bulk pass.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingFailure {
    /// Name of the state owning the group.
    pub state: String,
    /// Id of the area group owning the binding.
    pub group: String,
    /// What the runtime reported.
    pub error: RuntimeError,
}

/// A named set of area groups, kept in insertion order.
#[derive(Debug)]
pub struct State {
    name: String,
    groups: Vec<AreaGroup>,
}

impl State {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            groups: Vec::new(),
        }
    }

    /// The state name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up an area group.
    pub fn area_group(&self, id: &str) -> Option<&AreaGroup> {
        self.groups.iter().find(|g| g.id() == id)
    }

    /// Area groups in insertion order.
    pub fn area_groups(&self) -> &[AreaGroup] {
        &self.groups
    }

    /// Ids of groups whose binding is currently registered.
    pub fn enabled_groups(&self) -> impl Iterator<Item = &str> {
        self.groups
            .iter()
            .filter(|g| g.is_enabled())
            .map(AreaGroup::id)
    }

    /// The group registered as `handle`, with this state's name.
    pub(crate) fn group_for_handle_mut(
        &mut self,
        handle: RegistrationHandle,
    ) -> Option<(&str, &mut AreaGroup)> {
        let group = self.groups.iter_mut().find(|g| g.is_registered_as(handle))?;
        Some((self.name.as_str(), group))
    }

    /// Disable every binding, in group insertion order. Failures are collected,
    /// never fatal.
    pub(crate) fn deactivate_all(&mut self, runtime: &mut dyn PlatformRuntime) -> Vec<BindingFailure> {
        let mut failures = Vec::new();
        for group in &mut self.groups {
            if let Err(error) = group.disable(runtime) {
                log::warn!("State '{}': failed to disable '{}': {}", self.name, group.id(), error);
                failures.push(BindingFailure {
                    state: self.name.clone(),
                    group: group.id().to_string(),
                    error,
                });
            }
        }
        failures
    }

    /// Enable every attached binding, in group insertion order. Failures are
    /// collected, never fatal.
    pub(crate) fn activate_all(&mut self, runtime: &mut dyn PlatformRuntime) -> Vec<BindingFailure> {
        let mut failures = Vec::new();
        for group in &mut self.groups {
            if let Err(error) = group.enable(runtime) {
                log::warn!("State '{}': failed to enable '{}': {}", self.name, group.id(), error);
                failures.push(BindingFailure {
                    state: self.name.clone(),
                    group: group.id().to_string(),
                    error,
                });
            }
        }
        failures
    }
}

/// Mutable access to a state together with the runtime.
///
/// Obtained from [`StateManager`](crate::StateManager). Dereferences to
/// [`State`] for read access.
pub struct StateMut<'a> {
    state: &'a mut State,
    runtime: &'a mut dyn PlatformRuntime,
    classifiers: &'a ClassifierTable,
}

impl<'a> StateMut<'a> {
    pub(crate) fn new(
        state: &'a mut State,
        runtime: &'a mut dyn PlatformRuntime,
        classifiers: &'a ClassifierTable,
    ) -> Self {
        Self {
            state,
            runtime,
            classifiers,
        }
    }

    /// Add an area group with initial rectangles (possibly none).
    pub fn add_area_group(
        &mut self,
        id: impl Into<String>,
        areas: Vec<Rectangle>,
    ) -> StateResult<AreaGroupMut<'_>> {
        let id = id.into();
        if self.state.area_group(&id).is_some() {
            return Err(StateError::DuplicateAreaGroupId(id));
        }
        let group = AreaGroup::new(id, areas)?;
        self.state.groups.push(group);
        let index = self.state.groups.len() - 1;
        Ok(AreaGroupMut::new(
            &mut self.state.groups[index],
            &mut *self.runtime,
            self.classifiers,
        ))
    }

    /// Mutable access to an existing area group.
    pub fn area_group(&mut self, id: &str) -> StateResult<AreaGroupMut<'_>> {
        let group = self
            .state
            .groups
            .iter_mut()
            .find(|g| g.id() == id)
            .ok_or_else(|| StateError::UnknownAreaGroupId(id.to_string()))?;
        Ok(AreaGroupMut::new(group, &mut *self.runtime, self.classifiers))
    }

    /// Disable the group's binding, then remove the group.
    ///
    /// If the runtime refuses to deregister, the group is kept and the error
    /// returned so the caller can retry.
    pub fn remove_area_group(&mut self, id: &str) -> StateResult<AreaGroup> {
        let index = self
            .state
            .groups
            .iter()
            .position(|g| g.id() == id)
            .ok_or_else(|| StateError::UnknownAreaGroupId(id.to_string()))?;
        self.state.groups[index]
            .disable(&mut *self.runtime)
            .map_err(|source| StateError::registration(id, source))?;
        Ok(self.state.groups.remove(index))
    }

    /// Disable every binding in this state.
    pub fn deactivate_all(&mut self) -> Vec<BindingFailure> {
        self.state.deactivate_all(&mut *self.runtime)
    }

    /// Enable every binding in this state. Bindings must already exist.
    pub fn activate_all(&mut self) -> Vec<BindingFailure> {
        self.state.activate_all(&mut *self.runtime)
    }
}

impl Deref for StateMut<'_> {
    type Target = State;

    fn deref(&self) -> &State {
        &*self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::runtime::SimulatedRuntime;

    fn rect(x: u32, y: u32) -> Rectangle {
        Rectangle::new(x, y, 100, 100).unwrap()
    }

    fn fixture() -> (State, SimulatedRuntime, ClassifierTable) {
        (
            State::new("example-state1".to_string()),
            SimulatedRuntime::new(),
            ClassifierTable::for_environment(Environment::Development),
        )
    }

    #[test]
    fn test_duplicate_area_group() {
        let (mut state, mut runtime, table) = fixture();
        let mut state = StateMut::new(&mut state, &mut runtime, &table);
        state.add_area_group("movement", Vec::new()).unwrap();
        assert!(matches!(
            state.add_area_group("movement", Vec::new()),
            Err(StateError::DuplicateAreaGroupId(id)) if id == "movement"
        ));
    }

    #[test]
    fn test_remove_unknown_area_group() {
        let (mut state, mut runtime, table) = fixture();
        let mut state = StateMut::new(&mut state, &mut runtime, &table);
        assert!(matches!(
            state.remove_area_group("missing"),
            Err(StateError::UnknownAreaGroupId(_))
        ));
    }

    #[test]
    fn test_remove_area_group_disables_binding() {
        let (mut state, mut runtime, table) = fixture();
        let handle;
        {
            let mut state = StateMut::new(&mut state, &mut runtime, &table);
            let mut group = state.add_area_group("movement", vec![rect(0, 0)]).unwrap();
            let mut binding = group.on_movement(|_, _| {}).unwrap();
            binding.enable().unwrap();
            handle = binding.registration().unwrap();

            let removed = state.remove_area_group("movement").unwrap();
            assert!(!removed.is_enabled());
            assert!(state.area_groups().is_empty());
        }
        assert!(!runtime.is_registered(handle));
    }

    #[test]
    fn test_activate_and_deactivate_all() {
        let (mut state, mut runtime, table) = fixture();
        {
            let mut state = StateMut::new(&mut state, &mut runtime, &table);
            state
                .add_area_group("movement", vec![rect(0, 0), rect(150, 150)])
                .unwrap()
                .on_movement(|_, _| {})
                .unwrap();
            state
                .add_area_group("buttons", vec![rect(500, 50)])
                .unwrap()
                .on_simple_classification(|_, _, _| {})
                .unwrap();
            // A group without a binding is skipped.
            state.add_area_group("later", Vec::new()).unwrap();

            assert!(state.activate_all().is_empty());
            assert_eq!(state.enabled_groups().collect::<Vec<_>>(), vec!["movement", "buttons"]);

            assert!(state.deactivate_all().is_empty());
            assert_eq!(state.enabled_groups().count(), 0);
        }
        assert!(runtime.registrations().is_empty());
    }

    #[test]
    fn test_activate_all_collects_failures() {
        let (mut state, mut runtime, table) = fixture();
        runtime.reject_classifier("finger");
        let mut state = StateMut::new(&mut state, &mut runtime, &table);
        state
            .add_area_group("movement", vec![rect(0, 0)])
            .unwrap()
            .on_movement(|_, _| {})
            .unwrap();
        state
            .add_area_group("buttons", vec![rect(500, 50)])
            .unwrap()
            .on_simple_classification(|_, _, _| {})
            .unwrap();

        let failures = state.activate_all();
        assert_eq!(
            failures,
            vec![BindingFailure {
                state: "example-state1".to_string(),
                group: "buttons".to_string(),
                error: RuntimeError::UnsupportedClassifier("finger".to_string()),
            }]
        );
        // The pass continued past the failure.
        assert_eq!(state.enabled_groups().collect::<Vec<_>>(), vec!["movement"]);
    }

    #[test]
    fn test_deactivate_all_continues_after_failure() {
        let (mut state, mut runtime, table) = fixture();
        {
            let mut state = StateMut::new(&mut state, &mut runtime, &table);
            for (id, x) in [("a", 0), ("b", 200)] {
                state
                    .add_area_group(id, vec![rect(x, 0)])
                    .unwrap()
                    .on_movement(|_, _| {})
                    .unwrap();
            }
            assert!(state.activate_all().is_empty());
        }

        runtime.fail_next_deregistrations(1);
        let mut state = StateMut::new(&mut state, &mut runtime, &table);
        let failures = state.deactivate_all();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].group, "a");
        assert_eq!(state.enabled_groups().collect::<Vec<_>>(), vec!["a"]);
    }
}
