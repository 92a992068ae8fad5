//! Interview session orchestration
//!
//! The session orchestrator is the top-level state machine binding the
//! capture pipelines, integrity monitor, timer, and playback controller
//! to the server-confirmed interview lifecycle. It is the only component
//! that calls the lifecycle endpoints; pipelines reach the backend only
//! through the chunk-upload and alert paths.

mod config;
mod session;
mod state;

pub use config::SessionConfig;
pub use session::{InterviewSession, StartOptions};
pub use state::{EndReason, Phase, SessionSnapshot, SessionState, TransitionError};
