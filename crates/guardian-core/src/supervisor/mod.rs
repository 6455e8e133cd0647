//! Lifecycle supervisor.
//!
//! Keeps exactly one alert subscription open while the service is meant to
//! run, routes each record through the eligibility filter, and hands
//! eligible alerts to the notifier and the haptic controller.
//!
//! Records are read on a dedicated delivery task. Stop signals that task and
//! waits for it, so a record that was already classified still finishes
//! dispatch, and nothing is read after the stream is closed.

mod service;
mod state;

pub use service::{Dependencies, Supervisor, SupervisorSettings, DEFAULT_EVENT_CAPACITY};
pub use state::{Action, Input, ServiceState};
