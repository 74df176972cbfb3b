//! Area groups: ordered rectangles sharing one event binding.

use crate::area::Rectangle;
use crate::binding::{EventBinding, EventKind, Handlers};
use crate::config::ClassifierTable;
use crate::dispatch::DispatchContext;
use crate::error::{StateError, StateResult};
use crate::runtime::{PlatformRuntime, RegistrationHandle, RuntimeError};
use std::ops::Deref;

/// An ordered set of rectangles with at most one event binding.
///
/// Callbacks report rectangles by position, so insertion order matters and
/// removing a rectangle shifts the indices of everything after it.
#[derive(Debug)]
pub struct AreaGroup {
    id: String,
    areas: Vec<Rectangle>,
    binding: Option<EventBinding>,
}

impl AreaGroup {
    pub(crate) fn new(id: String, areas: Vec<Rectangle>) -> StateResult<Self> {
        for area in &areas {
            area.validate()?;
        }
        Ok(Self {
            id,
            areas,
            binding: None,
        })
    }

    /// The group id, unique within its state.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Rectangles in index order.
    pub fn areas(&self) -> &[Rectangle] {
        &self.areas
    }

    /// Get a rectangle by index.
    pub fn area(&self, index: usize) -> Option<&Rectangle> {
        self.areas.get(index)
    }

    /// Number of rectangles.
    pub fn len(&self) -> usize {
        self.areas.len()
    }

    /// Check if the group has no rectangles.
    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// The current binding, if any.
    pub fn binding(&self) -> Option<&EventBinding> {
        self.binding.as_ref()
    }

    /// Check if the group's binding is registered with the runtime.
    pub fn is_enabled(&self) -> bool {
        self.binding.as_ref().is_some_and(EventBinding::is_enabled)
    }

    pub(crate) fn binding_mut(&mut self) -> Option<&mut EventBinding> {
        self.binding.as_mut()
    }

    pub(crate) fn is_registered_as(&self, handle: RegistrationHandle) -> bool {
        self.binding
            .as_ref()
            .is_some_and(|b| b.registration() == Some(handle))
    }

    /// Register the binding with the runtime. No-op when already enabled or
    /// when there is no binding.
    pub(crate) fn enable(&mut self, runtime: &mut dyn PlatformRuntime) -> Result<(), RuntimeError> {
        let Some(binding) = self.binding.as_mut() else {
            return Ok(());
        };
        if binding.is_enabled() {
            return Ok(());
        }

        let handle = runtime.register_areas(&self.areas, binding.kind(), binding.classifier())?;
        binding.set_registration(Some(handle));
        log::debug!("Enabled {:?} binding on '{}' as {}", binding.kind(), self.id, handle);
        Ok(())
    }

    /// Deregister the binding. No-op when not enabled. A failed deregistration
    /// leaves the binding enabled so the caller can retry.
    pub(crate) fn disable(&mut self, runtime: &mut dyn PlatformRuntime) -> Result<(), RuntimeError> {
        let Some(binding) = self.binding.as_mut() else {
            return Ok(());
        };
        let Some(handle) = binding.registration() else {
            return Ok(());
        };

        match runtime.deregister(handle) {
            Ok(()) => {}
            Err(RuntimeError::UnknownHandle(_)) => {
                log::debug!("Runtime already forgot {} for '{}'", handle, self.id);
            }
            Err(e) => return Err(e),
        }
        binding.set_registration(None);
        log::debug!("Disabled {:?} binding on '{}'", binding.kind(), self.id);
        Ok(())
    }

    /// Apply `edit` to the areas. An enabled binding is registered with the
    /// edited areas before its old registration is released. If the runtime
    /// rejects the edited areas the edit is undone and the old registration
    /// stays live.
    fn edit_areas<T>(
        &mut self,
        runtime: &mut dyn PlatformRuntime,
        edit: impl FnOnce(&mut Vec<Rectangle>) -> T,
    ) -> StateResult<T> {
        let Some(binding) = self.binding.as_mut().filter(|b| b.is_enabled()) else {
            return Ok(edit(&mut self.areas));
        };

        let previous = self.areas.clone();
        let output = edit(&mut self.areas);
        let handle = match runtime.register_areas(&self.areas, binding.kind(), binding.classifier()) {
            Ok(handle) => handle,
            Err(source) => {
                self.areas = previous;
                return Err(StateError::registration(self.id.as_str(), source));
            }
        };

        let old = binding.registration();
        binding.set_registration(Some(handle));
        log::debug!("Re-registered '{}' as {}", self.id, handle);
        if let Some(old) = old {
            match runtime.deregister(old) {
                Ok(()) | Err(RuntimeError::UnknownHandle(_)) => {}
                // Events for the old handle no longer match this group.
                Err(e) => log::warn!("Old registration {} of '{}' not released: {}", old, self.id, e),
            }
        }
        Ok(output)
    }

    fn bind(
        &mut self,
        runtime: &mut dyn PlatformRuntime,
        handlers: Handlers,
    ) -> StateResult<EventKind> {
        let binding = EventBinding::new(handlers);
        let kind = binding.kind();
        if !runtime.supports(kind, self.areas.len()) {
            return Err(StateError::UnsupportedEventKind {
                group: self.id.clone(),
                kind,
                area_count: self.areas.len(),
            });
        }

        // The previous binding must be off the runtime before it is replaced.
        self.disable(runtime)
            .map_err(|source| StateError::registration(self.id.as_str(), source))?;
        self.binding = Some(binding);
        Ok(kind)
    }
}

/// Mutable access to an area group together with the runtime.
///
/// Obtained from [`StateMut`](crate::StateMut). Dereferences to [`AreaGroup`]
/// for read access.
pub struct AreaGroupMut<'a> {
    group: &'a mut AreaGroup,
    runtime: &'a mut dyn PlatformRuntime,
    classifiers: &'a ClassifierTable,
}

impl<'a> AreaGroupMut<'a> {
    pub(crate) fn new(
        group: &'a mut AreaGroup,
        runtime: &'a mut dyn PlatformRuntime,
        classifiers: &'a ClassifierTable,
    ) -> Self {
        Self {
            group,
            runtime,
            classifiers,
        }
    }

    /// Append a rectangle and return its index.
    ///
    /// An enabled binding is re-registered so the runtime watches the new area.
    /// If the runtime rejects the enlarged set, the group and its registration
    /// are left as they were and the failure is returned.
    pub fn add_area(&mut self, area: Rectangle) -> StateResult<usize> {
        area.validate()?;
        self.group.edit_areas(self.runtime, |areas| {
            areas.push(area);
            areas.len() - 1
        })
    }

    /// Remove the rectangle at `index`; later rectangles shift down by one.
    ///
    /// An enabled binding is re-registered so later events carry current
    /// indices. If the runtime rejects the reduced set (an empty one, say) the
    /// area stays and the old registration remains live.
    pub fn remove_area(&mut self, index: usize) -> StateResult<Rectangle> {
        let len = self.group.areas.len();
        if index >= len {
            return Err(StateError::IndexOutOfRange { index, len });
        }
        self.group.edit_areas(self.runtime, |areas| areas.remove(index))
    }

    /// Replace the rectangle at `index`, returning the old one.
    pub fn replace_area(&mut self, index: usize, area: Rectangle) -> StateResult<Rectangle> {
        area.validate()?;
        let len = self.group.areas.len();
        if index >= len {
            return Err(StateError::IndexOutOfRange { index, len });
        }
        self.group
            .edit_areas(self.runtime, |areas| std::mem::replace(&mut areas[index], area))
    }

    /// Bind a movement callback, replacing any previous binding.
    pub fn on_movement<F>(&mut self, callback: F) -> StateResult<EventBindingMut<'_>>
    where
        F: FnMut(&mut DispatchContext<'_>, usize) + 'static,
    {
        let kind = self
            .group
            .bind(self.runtime, Handlers::Movement(Box::new(callback)))?;
        Ok(self.binding_handle(kind))
    }

    /// Bind a simple-classification callback using the environment's finger
    /// classifier.
    pub fn on_simple_classification<F>(&mut self, callback: F) -> StateResult<EventBindingMut<'_>>
    where
        F: FnMut(&mut DispatchContext<'_>, usize, &serde_json::Value) + 'static,
    {
        let classifier = self.classifiers.finger.clone();
        self.on_simple_classification_with(classifier, callback)
    }

    /// Bind a simple-classification callback with an explicit classifier.
    pub fn on_simple_classification_with<F>(
        &mut self,
        classifier: impl Into<String>,
        callback: F,
    ) -> StateResult<EventBindingMut<'_>>
    where
        F: FnMut(&mut DispatchContext<'_>, usize, &serde_json::Value) + 'static,
    {
        let handlers = Handlers::SimpleClassification {
            classifier: classifier.into(),
            on_classified: Box::new(callback),
        };
        let kind = self.group.bind(self.runtime, handlers)?;
        Ok(self.binding_handle(kind))
    }

    /// Bind position-classification callbacks. `on_preclassified` receives
    /// outlines of detected objects before the classifier has decided.
    pub fn on_position_classification<C, P>(
        &mut self,
        classifier: impl Into<String>,
        on_classified: C,
        on_preclassified: P,
    ) -> StateResult<EventBindingMut<'_>>
    where
        C: FnMut(&mut DispatchContext<'_>, usize, &serde_json::Value) + 'static,
        P: FnMut(&mut DispatchContext<'_>, usize, &serde_json::Value) + 'static,
    {
        let handlers = Handlers::PositionClassification {
            classifier: classifier.into(),
            on_classified: Box::new(on_classified),
            on_preclassified: Box::new(on_preclassified),
        };
        let kind = self.group.bind(self.runtime, handlers)?;
        Ok(self.binding_handle(kind))
    }

    /// Handle to the current binding, if any.
    pub fn binding(&mut self) -> Option<EventBindingMut<'_>> {
        let kind = self.group.binding.as_ref()?.kind();
        Some(self.binding_handle(kind))
    }

    fn binding_handle(&mut self, kind: EventKind) -> EventBindingMut<'_> {
        EventBindingMut {
            group: &mut *self.group,
            runtime: &mut *self.runtime,
            kind,
        }
    }
}

impl Deref for AreaGroupMut<'_> {
    type Target = AreaGroup;

    fn deref(&self) -> &AreaGroup {
        &*self.group
    }
}

/// Lifecycle handle for the binding of one area group.
pub struct EventBindingMut<'a> {
    group: &'a mut AreaGroup,
    runtime: &'a mut dyn PlatformRuntime,
    kind: EventKind,
}

impl EventBindingMut<'_> {
    /// The bound event kind.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Check if the binding is registered with the runtime.
    pub fn is_enabled(&self) -> bool {
        self.group.is_enabled()
    }

    /// The runtime handle, while enabled.
    pub fn registration(&self) -> Option<RegistrationHandle> {
        self.group.binding().and_then(EventBinding::registration)
    }

    /// Register the group's areas and callbacks with the runtime.
    /// Calling this on an enabled binding does nothing.
    pub fn enable(&mut self) -> StateResult<()> {
        self.group
            .enable(self.runtime)
            .map_err(|source| StateError::registration(self.group.id(), source))
    }

    /// Deregister from the runtime. Calling this on a disabled binding does
    /// nothing.
    pub fn disable(&mut self) -> StateResult<()> {
        self.group
            .disable(self.runtime)
            .map_err(|source| StateError::registration(self.group.id(), source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::runtime::{RuntimeCall, SimulatedRuntime};

    fn rect(x: u32, y: u32) -> Rectangle {
        Rectangle::new(x, y, 100, 100).unwrap()
    }

    fn fixture() -> (AreaGroup, SimulatedRuntime, ClassifierTable) {
        (
            AreaGroup::new("movement-areagroup1".to_string(), Vec::new()).unwrap(),
            SimulatedRuntime::new(),
            ClassifierTable::for_environment(Environment::Development),
        )
    }

    #[test]
    fn test_add_area_returns_index() {
        let (mut group, mut runtime, table) = fixture();
        let mut group = AreaGroupMut::new(&mut group, &mut runtime, &table);
        assert_eq!(group.add_area(rect(0, 0)).unwrap(), 0);
        assert_eq!(group.add_area(rect(150, 150)).unwrap(), 1);
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn test_remove_area_out_of_range() {
        let (mut group, mut runtime, table) = fixture();
        let mut group = AreaGroupMut::new(&mut group, &mut runtime, &table);
        group.add_area(rect(0, 0)).unwrap();
        group.add_area(rect(150, 150)).unwrap();

        assert!(matches!(
            group.remove_area(5),
            Err(StateError::IndexOutOfRange { index: 5, len: 2 })
        ));
    }

    #[test]
    fn test_binding_on_empty_group_is_unsupported() {
        let (mut group, mut runtime, table) = fixture();
        let mut group = AreaGroupMut::new(&mut group, &mut runtime, &table);
        assert!(matches!(
            group.on_movement(|_, _| {}),
            Err(StateError::UnsupportedEventKind { area_count: 0, .. })
        ));
    }

    #[test]
    fn test_enable_is_idempotent() {
        let (mut group, mut runtime, table) = fixture();
        {
            let mut group = AreaGroupMut::new(&mut group, &mut runtime, &table);
            group.add_area(rect(0, 0)).unwrap();
            let mut binding = group.on_movement(|_, _| {}).unwrap();
            binding.enable().unwrap();
            binding.enable().unwrap();
            assert!(binding.is_enabled());
        }
        assert_eq!(runtime.register_count(), 1);
    }

    #[test]
    fn test_disable_unenabled_is_noop() {
        let (mut group, mut runtime, table) = fixture();
        {
            let mut group = AreaGroupMut::new(&mut group, &mut runtime, &table);
            group.add_area(rect(0, 0)).unwrap();
            let mut binding = group.on_movement(|_, _| {}).unwrap();
            binding.disable().unwrap();
        }
        assert!(runtime.calls().is_empty());
    }

    #[test]
    fn test_rebinding_disables_previous() {
        let (mut group, mut runtime, table) = fixture();
        let first;
        {
            let mut group = AreaGroupMut::new(&mut group, &mut runtime, &table);
            group.add_area(rect(0, 0)).unwrap();
            let mut binding = group.on_movement(|_, _| {}).unwrap();
            binding.enable().unwrap();
            first = binding.registration().unwrap();

            let binding = group.on_simple_classification(|_, _, _| {}).unwrap();
            assert_eq!(binding.kind(), EventKind::SimpleClassification);
            assert!(!binding.is_enabled());
        }
        assert!(!runtime.is_registered(first));
        assert_eq!(group.binding().unwrap().classifier(), Some("finger"));
    }

    #[test]
    fn test_remove_area_reregisters_enabled_binding() {
        let (mut group, mut runtime, table) = fixture();
        let (before, after);
        {
            let mut group = AreaGroupMut::new(&mut group, &mut runtime, &table);
            group.add_area(rect(0, 0)).unwrap();
            group.add_area(rect(150, 150)).unwrap();
            group.add_area(rect(300, 300)).unwrap();
            let mut binding = group.on_movement(|_, _| {}).unwrap();
            binding.enable().unwrap();
            before = binding.registration().unwrap();

            group.remove_area(0).unwrap();
            after = group.binding().unwrap().registration().unwrap();
        }
        assert_ne!(before, after);
        assert!(!runtime.is_registered(before));
        let registration = runtime.registration(after).unwrap();
        assert_eq!(registration.areas, vec![rect(150, 150), rect(300, 300)]);
    }

    #[test]
    fn test_add_area_reregisters_enabled_binding() {
        let (mut group, mut runtime, table) = fixture();
        let (before, after);
        {
            let mut group = AreaGroupMut::new(&mut group, &mut runtime, &table);
            group.add_area(rect(0, 0)).unwrap();
            let mut binding = group.on_movement(|_, _| {}).unwrap();
            binding.enable().unwrap();
            before = binding.registration().unwrap();

            assert_eq!(group.add_area(rect(150, 150)).unwrap(), 1);
            after = group.binding().unwrap().registration().unwrap();
        }
        assert_ne!(before, after);
        assert!(!runtime.is_registered(before));
        let registration = runtime.registration(after).unwrap();
        assert_eq!(registration.areas, vec![rect(0, 0), rect(150, 150)]);
    }

    #[test]
    fn test_rejected_add_area_is_undone() {
        let (mut group, mut runtime, table) = fixture();
        let before;
        {
            let mut group = AreaGroupMut::new(&mut group, &mut runtime, &table);
            group.add_area(rect(0, 0)).unwrap();
            let mut binding = group.on_movement(|_, _| {}).unwrap();
            binding.enable().unwrap();
            before = binding.registration().unwrap();

            // Overlaps the first area; the runtime refuses the new set.
            let result = group.add_area(rect(50, 50));
            assert!(matches!(
                result,
                Err(StateError::RegistrationFailed {
                    source: RuntimeError::OverlappingAreas { first: 0, second: 1 },
                    ..
                })
            ));
            assert_eq!(group.areas(), &[rect(0, 0)]);
            assert!(group.is_enabled());
            assert_eq!(group.binding().unwrap().registration(), Some(before));
        }
        assert!(runtime.is_registered(before));
        assert_eq!(runtime.registrations().len(), 1);
    }

    #[test]
    fn test_rejected_removal_keeps_area_and_registration() {
        let (mut group, mut runtime, table) = fixture();
        let before;
        {
            let mut group = AreaGroupMut::new(&mut group, &mut runtime, &table);
            group.add_area(rect(0, 0)).unwrap();
            let mut binding = group.on_movement(|_, _| {}).unwrap();
            binding.enable().unwrap();
            before = binding.registration().unwrap();

            // Group would become empty; the runtime refuses an empty registration.
            let result = group.remove_area(0);
            assert!(matches!(result, Err(StateError::RegistrationFailed { .. })));
            assert_eq!(group.len(), 1);
            assert!(group.is_enabled());
        }
        assert!(runtime.is_registered(before));
    }

    #[test]
    fn test_unreleased_old_registration_is_detached() {
        let (mut group, mut runtime, table) = fixture();
        let before;
        {
            let mut group = AreaGroupMut::new(&mut group, &mut runtime, &table);
            group.add_area(rect(0, 0)).unwrap();
            let mut binding = group.on_movement(|_, _| {}).unwrap();
            binding.enable().unwrap();
            before = binding.registration().unwrap();
        }
        runtime.fail_next_deregistrations(1);
        {
            let mut group = AreaGroupMut::new(&mut group, &mut runtime, &table);
            assert_eq!(group.add_area(rect(150, 150)).unwrap(), 1);
            assert!(group.is_enabled());
        }
        assert!(!group.is_registered_as(before));
        // The runtime still holds the old handle; nothing routes to it.
        assert!(runtime.is_registered(before));
        assert_eq!(runtime.registrations().len(), 2);
    }

    #[test]
    fn test_failed_deregistration_keeps_binding_enabled() {
        let (mut group, mut runtime, table) = fixture();
        {
            let mut group = AreaGroupMut::new(&mut group, &mut runtime, &table);
            group.add_area(rect(0, 0)).unwrap();
            group.on_movement(|_, _| {}).unwrap().enable().unwrap();
        }
        runtime.fail_next_deregistrations(1);
        {
            let mut group = AreaGroupMut::new(&mut group, &mut runtime, &table);
            let mut binding = group.binding().unwrap();
            assert!(binding.disable().is_err());
            assert!(binding.is_enabled());
            binding.disable().unwrap();
            assert!(!binding.is_enabled());
        }
        assert!(matches!(
            runtime.calls().last(),
            Some(RuntimeCall::Deregister { .. })
        ));
    }

    #[test]
    fn test_replace_area_validates_geometry() {
        let (mut group, mut runtime, table) = fixture();
        let mut group = AreaGroupMut::new(&mut group, &mut runtime, &table);
        group.add_area(rect(0, 0)).unwrap();
        let bad = Rectangle {
            pos_x: 0,
            pos_y: 0,
            width: 0,
            height: 1,
            metadata: None,
        };
        assert!(matches!(
            group.replace_area(0, bad),
            Err(StateError::InvalidGeometry { .. })
        ));
        let old = group.replace_area(0, rect(10, 10)).unwrap();
        assert_eq!(old, rect(0, 0));
    }
}
