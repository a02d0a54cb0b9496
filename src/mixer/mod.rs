//! Host mixer contract
//!
//! The transition controller only talks to the mixer through [`HostMixer`].
//! Every call may fail; callers treat a failure as "not applied" and log it.
//!
//! Backends:
//! - [`ObsMixer`]: OBS Studio over obs-websocket
//! - [`ConsoleMixer`]: in-process simulation that logs every call

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod console;
pub mod obs;

pub use console::ConsoleMixer;
pub use obs::ObsMixer;

/// Reference to a host-owned scene (program or preview input)
///
/// Holding a clone keeps the reference alive; dropping it releases it.
pub type SceneRef = Arc<str>;

/// The host's currently active scene transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRef {
    pub name: String,
    /// Fixed transitions (cuts, stingers without progress) cannot be driven
    pub fixed: bool,
}

impl TransitionRef {
    pub fn new(name: impl Into<String>, fixed: bool) -> Self {
        Self {
            name: name.into(),
            fixed,
        }
    }
}

/// Failure of a single host mixer call
#[derive(Debug, Error)]
pub enum MixerError {
    #[error("host mixer is not connected")]
    NotConnected,

    #[error("host mixer refused {operation}: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },

    #[error("host mixer request failed: {0}")]
    Request(String),
}

/// Operations the transition controller invokes on the host mixer
///
/// Implementations are only ever called from the host execution context
/// (one call at a time), never from the HTTP listener thread.
#[async_trait]
pub trait HostMixer: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Whether separate program/preview outputs are active (studio mode)
    async fn is_editing_mode_active(&self) -> Result<bool, MixerError>;

    async fn active_transition(&self) -> Result<Option<TransitionRef>, MixerError>;

    fn is_fixed_transition(&self, transition: &TransitionRef) -> bool {
        transition.fixed
    }

    /// Duration the host reports for the active transition
    async fn transition_duration(&self) -> Result<Duration, MixerError>;

    async fn start_manual_transition(
        &self,
        transition: &TransitionRef,
        duration: Duration,
        target: &SceneRef,
    ) -> Result<(), MixerError>;

    /// Set manual progress, `t` in `[0, 1]`
    async fn set_manual_progress(&self, transition: &TransitionRef, t: f64)
        -> Result<(), MixerError>;

    /// Finish a manual transition that was driven to the end
    ///
    /// Called once progress reached 1, before the scenes are swapped.
    async fn complete_manual_transition(
        &self,
        _transition: &TransitionRef,
    ) -> Result<(), MixerError> {
        Ok(())
    }

    async fn force_stop(&self, transition: &TransitionRef) -> Result<(), MixerError>;

    /// Run the host's own program/preview transition
    async fn trigger_instant_transition(&self) -> Result<(), MixerError>;

    async fn current_program(&self) -> Result<Option<SceneRef>, MixerError>;

    async fn current_preview(&self) -> Result<Option<SceneRef>, MixerError>;

    async fn set_program(&self, scene: &SceneRef) -> Result<(), MixerError>;

    async fn set_preview(&self, scene: &SceneRef) -> Result<(), MixerError>;

    /// Release backend resources (connections) on shutdown
    async fn shutdown(&self) -> Result<(), MixerError> {
        Ok(())
    }
}
