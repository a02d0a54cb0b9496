//! Transition control - turns T-bar positions into host mixer operations
//!
//! [`TransitionController`] is the state machine (Idle / ManualActive) and
//! only runs inside the host execution context. [`HostActor`] is that
//! context: a single tokio task draining a bounded queue of [`HostTask`]s
//! one at a time. The HTTP listener only ever holds a [`HostActorHandle`].

mod actor;
mod controller;


use std::time::Duration;

pub use actor::{HostActor, HostActorHandle, HostTask, QueueError};
pub use controller::TransitionController;

/// Full T-bar travel in raw hardware units
pub const TBAR_MAX: u32 = 1023;

/// Dead band at each end of the T-bar, in raw units
pub const TBAR_CLAMP: u32 = 10;

/// Release at or above this position commits the transition (≈0.99022)
pub const T_FINISH: f64 = (TBAR_MAX - TBAR_CLAMP) as f64 / TBAR_MAX as f64;

/// Release at or below this position cancels the transition (≈0.00978)
pub const T_CANCEL: f64 = TBAR_CLAMP as f64 / TBAR_MAX as f64;

/// Minimum spacing between session start attempts, and between releases
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(250);

/// Host durations below this are considered unusable
pub const MIN_TRANSITION_DURATION: Duration = Duration::from_millis(50);

/// Manual transition duration used when the host reports an unusable one
pub const FALLBACK_TRANSITION_DURATION: Duration = Duration::from_millis(300);

/// One decoded `/tbar` POST
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionUpdate {
    /// Normalized position in `[0, 1]`
    pub position: f64,
    pub release: bool,
}

impl PositionUpdate {
    pub fn new(position: f64, release: bool) -> Self {
        Self {
            position: clamp_unit(position),
            release,
        }
    }
}

/// Clamp to `[0, 1]`; NaN collapses to 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
