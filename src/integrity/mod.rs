//! Integrity monitoring
//!
//! Observes page visibility, window focus, and screen-track liveness while
//! a session is active; keeps an append-only log of alerts; enforces the
//! tab-switch policy that can terminate the session. Alerts are also
//! forwarded to the backend for audit as detached best-effort tasks whose
//! failures never touch local session state.

mod log;
mod monitor;

pub use log::{AlertEntry, AlertType, IntegrityLog};
pub use monitor::{IntegrityMonitor, MonitorHandle, TAB_SWITCH_LIMIT};

/// An observed suspicious-activity event, normalized at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityEvent {
    /// The page became hidden (candidate switched tabs).
    PageHidden,
    PageVisible,
    WindowBlur,
    WindowFocus,
    /// The screen share's video track ended unexpectedly.
    ScreenShareEnded,
    /// No screen-track activity for the given continuous duration.
    ScreenInactive { idle_ms: u64 },
    /// The liveness check saw the track report an "ended" state.
    ScreenTrackDead,
}
