//! Case lifecycle
//!
//! The case state machine and the orchestrator that is the entry point for
//! every mutating operation of the engine.

pub mod orchestrator;
pub mod state;
pub mod types;

pub use orchestrator::{CaseOrchestrator, NewCase};
pub use state::{CaseAction, CaseStatus};
pub use types::{Case, Transition};
