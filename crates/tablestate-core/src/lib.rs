//! TableState Core Library
//!
//! Bookkeeping for a projected tabletop interface: named states made of area
//! groups, event bindings with an enable/disable lifecycle, and transitions
//! between states. Area tracking and classification happen in the platform
//! runtime; this crate only registers areas with it and routes its events.

pub mod area;
pub mod binding;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod group;
pub mod manager;
pub mod runtime;
pub mod state;

pub use area::Rectangle;
pub use binding::{EventBinding, EventKind};
pub use config::{ClassifierTable, ConfigError, Environment, PlatformConfig};
pub use dispatch::{DispatchContext, DispatchReport};
pub use error::{StateError, StateResult};
pub use group::{AreaGroup, AreaGroupMut, EventBindingMut};
pub use manager::{ButtonId, StateManager, TransitionReport};
pub use runtime::{
    EventPayload, EventSender, PlatformRuntime, RegistrationHandle, RuntimeError, RuntimeEvent,
    SimulatedRuntime,
};
pub use state::{BindingFailure, State, StateMut};
