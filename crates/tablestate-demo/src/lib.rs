//! TableState Walkthrough
//!
//! Two states on the simulated runtime: the first watches two areas for
//! movement, the second runs position classification over two others. A
//! toggle button outside both states switches from the first to the second.
//! The button is cleared by that state change, so it fires once; giving each
//! state its own toggle group is the way to flip back and forth.

use serde_json::json;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use tablestate_core::{
    ConfigError, DispatchReport, PlatformConfig, Rectangle, RuntimeError, SimulatedRuntime,
    StateError, StateManager, StateResult,
};
use thiserror::Error;

pub const STATE_ONE: &str = "example-state1";
pub const STATE_TWO: &str = "example-state2";

/// Errors from the walkthrough.
#[derive(Debug, Error)]
pub enum DemoError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

pub type DemoResult<T> = Result<T, DemoError>;

/// Overlay panels, shown or hidden by class name.
#[derive(Debug, Default)]
pub struct Panels {
    visible: BTreeSet<&'static str>,
}

impl Panels {
    /// The panels visible while the first state is active.
    pub fn initial() -> Self {
        let mut panels = Self::default();
        panels.show(&["white-one", "gray-one"]);
        panels
    }

    pub fn show(&mut self, classes: &[&'static str]) {
        self.visible.extend(classes.iter().copied());
    }

    pub fn hide(&mut self, classes: &[&'static str]) {
        for class in classes {
            self.visible.remove(class);
        }
    }

    pub fn is_visible(&self, class: &str) -> bool {
        self.visible.contains(class)
    }
}

/// Everything the walkthrough leaves behind, for inspection.
#[derive(Debug)]
pub struct Walkthrough {
    pub manager: StateManager<SimulatedRuntime>,
    pub panels: Rc<RefCell<Panels>>,
    pub reports: Vec<DispatchReport>,
}

/// Run with configuration from the environment.
pub fn run() -> DemoResult<Walkthrough> {
    run_with(PlatformConfig::from_env()?)
}

/// Build the states, then replay a scripted sequence of touches.
pub fn run_with(config: PlatformConfig) -> DemoResult<Walkthrough> {
    let mut manager = StateManager::new(SimulatedRuntime::new(), config);
    let panels = Rc::new(RefCell::new(Panels::initial()));
    build(&mut manager, panels.clone())?;
    let reports = replay(&mut manager)?;
    Ok(Walkthrough {
        manager,
        panels,
        reports,
    })
}

/// Keep buttons around 50x50: the finger classifier was trained on that size.
fn toggle_button() -> StateResult<Rectangle> {
    Rectangle::new(300, 300, 50, 50)
}

/// Register both states and the toggle button.
pub fn build(
    manager: &mut StateManager<SimulatedRuntime>,
    panels: Rc<RefCell<Panels>>,
) -> DemoResult<()> {
    let mut state_one = manager.add_state(STATE_ONE)?;
    let mut movement = state_one.add_area_group("movement-areagroup1", Vec::new())?;
    movement.add_area(Rectangle::new(0, 0, 100, 100)?)?;
    movement.add_area(Rectangle::new(150, 150, 100, 100)?)?;
    let mut binding = movement.on_movement(|_, index| {
        log::info!("Movement at rectangle #{}", index);
    })?;
    // Watched from here on, although no state is active yet.
    binding.enable()?;
    manager.change_to_state(STATE_ONE)?;

    let mut state_two = manager.add_state(STATE_TWO)?;
    state_two
        .add_area_group(
            "position-areagroup2",
            vec![
                Rectangle::new(500, 50, 100, 100)?,
                Rectangle::new(500, 200, 100, 100)?,
            ],
        )?
        .on_position_classification(
            "custom_classifier",
            |_, index, classified| {
                log::info!("Classified objects in rectangle {}: {}", index, classified);
            },
            |_, index, outlines| {
                log::info!("Rectangle {} preclassification outlines: {}", index, outlines);
            },
        )?;

    manager.add_button(toggle_button()?, None, move |ctx, class_tag| {
        if !ctx.is_finger(class_tag) {
            return;
        }
        log::info!("Toggle pressed, changing states");
        let mut panels = panels.borrow_mut();
        if ctx.current_state_name() == Some(STATE_ONE) {
            panels.hide(&["white-one", "gray-one"]);
            panels.show(&["green-one", "fuchsia-one"]);
            ctx.change_to_state(STATE_TWO);
        } else {
            panels.hide(&["green-one", "fuchsia-one"]);
            panels.show(&["white-one", "gray-one"]);
            ctx.change_to_state(STATE_ONE);
        }
    })?;
    Ok(())
}

/// Simulated touches, one dispatch pass per step.
fn replay(manager: &mut StateManager<SimulatedRuntime>) -> DemoResult<Vec<DispatchReport>> {
    let finger = manager.classifiers().finger_tag.clone();
    let mut reports = Vec::new();

    manager.runtime().move_at(50.0, 50.0)?;
    manager.runtime().move_at(200.0, 200.0)?;
    reports.push(manager.dispatch_pending());

    manager.runtime().classify_at(325.0, 325.0, finger.clone())?;
    reports.push(manager.dispatch_pending());

    manager
        .runtime()
        .preclassify_at(550.0, 100.0, json!([{ "outline": [[520, 70], [580, 130]] }]))?;
    manager
        .runtime()
        .position_classify_at(550.0, 100.0, json!([{ "classTag": "cup", "posX": 550, "posY": 100 }]))?;
    reports.push(manager.dispatch_pending());

    // The button went away with the state change.
    let posted = manager.runtime().classify_at(325.0, 325.0, finger)?;
    log::info!("Second toggle press reached {} registrations", posted);
    reports.push(manager.dispatch_pending());

    Ok(reports)
}
