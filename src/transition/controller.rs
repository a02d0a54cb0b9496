//! Transition state machine
//!
//! For every position update, in order:
//! 1. store the clamped position as the last position
//! 2. bail out unless the host is in studio mode with an active transition
//! 3. start a manual session (debounced) when idle and the position leaves 0
//! 4. drive the session's manual progress
//! 5. on release (debounced): instant trigger, commit or cancel

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{
    clamp_unit, PositionUpdate, DEBOUNCE_WINDOW, FALLBACK_TRANSITION_DURATION,
    MIN_TRANSITION_DURATION, T_CANCEL, T_FINISH,
};
use crate::context::TbarState;
use crate::mixer::{HostMixer, MixerError, SceneRef, TransitionRef};

/// Scenes captured when a manual transition starts
///
/// Holds references to host-owned scenes for the session's lifetime;
/// dropping the session releases them.
#[derive(Debug)]
struct ManualSession {
    program: SceneRef,
    preview: SceneRef,
}

impl ManualSession {
    /// A session needs two distinct scenes
    fn new(program: SceneRef, preview: SceneRef) -> Option<Self> {
        if program == preview {
            None
        } else {
            Some(Self { program, preview })
        }
    }
}

/// Last session start attempt and last executed release
#[derive(Debug, Default)]
struct DebounceClock {
    last_start: Option<Instant>,
    last_release: Option<Instant>,
}

impl DebounceClock {
    fn try_start(&mut self, now: Instant) -> bool {
        Self::try_tick(&mut self.last_start, now)
    }

    fn try_release(&mut self, now: Instant) -> bool {
        Self::try_tick(&mut self.last_release, now)
    }

    fn try_tick(last: &mut Option<Instant>, now: Instant) -> bool {
        let clear = last.map_or(true, |at| now.saturating_duration_since(at) > DEBOUNCE_WINDOW);
        if clear {
            *last = Some(now);
        }
        clear
    }
}

/// Manual transition controller
///
/// Owned by the host actor; never shared with the listener thread. The only
/// state it publishes is the last position and whether a session is active.
pub struct TransitionController {
    mixer: Arc<dyn HostMixer>,
    state: Arc<TbarState>,
    session: Option<ManualSession>,
    clock: DebounceClock,
}

impl TransitionController {
    pub fn new(mixer: Arc<dyn HostMixer>, state: Arc<TbarState>) -> Self {
        Self {
            mixer,
            state,
            session: None,
            clock: DebounceClock::default(),
        }
    }

    pub fn is_manual_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn mixer(&self) -> &Arc<dyn HostMixer> {
        &self.mixer
    }

    /// Apply one position update at time `now`
    pub async fn apply(&mut self, update: PositionUpdate, now: Instant) {
        self.step(update, now).await;
        self.state.set_manual_active(self.session.is_some());
    }

    async fn step(&mut self, update: PositionUpdate, now: Instant) {
        let t = clamp_unit(update.position);
        self.state.set_last_position(t);

        match self.mixer.is_editing_mode_active().await {
            Ok(true) => {}
            Ok(false) => {
                info!("T-bar update ignored (not in studio mode)");
                return;
            }
            Err(e) => {
                warn!("T-bar update ignored, studio mode unknown: {}", e);
                return;
            }
        }

        let transition = match self.mixer.active_transition().await {
            Ok(Some(transition)) => transition,
            Ok(None) => {
                warn!("T-bar update ignored (no active transition)");
                return;
            }
            Err(e) => {
                warn!("T-bar update ignored, cannot read transition: {}", e);
                return;
            }
        };

        let fixed = self.mixer.is_fixed_transition(&transition);

        if self.session.is_none() && t > 0.0 {
            if self.clock.try_start(now) {
                self.start_session(&transition, fixed).await;
            } else {
                debug!("Session start ignored (debounce)");
            }
        }

        if self.session.is_some() {
            if let Err(e) = self.mixer.set_manual_progress(&transition, t).await {
                warn!("Failed to drive manual transition to {:.4}: {}", t, e);
            }
        }

        if update.release {
            if self.clock.try_release(now) {
                self.release(&transition, fixed, t).await;
            } else {
                info!("Release ignored (debounce)");
            }
        }
    }

    async fn start_session(&mut self, transition: &TransitionRef, fixed: bool) {
        let program = scene_or_none("program", self.mixer.current_program().await);
        let preview = scene_or_none("preview", self.mixer.current_preview().await);

        let (Some(program), Some(preview)) = (program, preview) else {
            warn!("Missing program/preview scene, manual transition not started");
            return;
        };

        let Some(session) = ManualSession::new(program, preview) else {
            info!("Program == preview (nothing to transition)");
            return;
        };

        if fixed {
            info!(
                "Transition '{}' is fixed; manual T-bar disabled (will trigger on release)",
                transition.name
            );
            return;
        }

        let duration = match self.mixer.transition_duration().await {
            Ok(duration) if duration >= MIN_TRANSITION_DURATION => duration,
            Ok(_) => FALLBACK_TRANSITION_DURATION,
            Err(e) => {
                debug!("Transition duration unavailable ({}), using fallback", e);
                FALLBACK_TRANSITION_DURATION
            }
        };

        match self
            .mixer
            .start_manual_transition(transition, duration, &session.preview)
            .await
        {
            Ok(()) => {
                info!(
                    "Manual transition started: '{}' -> '{}' ({} ms)",
                    session.program,
                    session.preview,
                    duration.as_millis()
                );
                self.session = Some(session);
            }
            Err(e) => warn!("Failed to start manual transition: {}", e),
        }
    }

    async fn release(&mut self, transition: &TransitionRef, fixed: bool, t: f64) {
        if fixed && t >= T_FINISH {
            match self.mixer.trigger_instant_transition().await {
                Ok(()) => info!("Fixed transition triggered"),
                Err(e) => warn!("Failed to trigger fixed transition: {}", e),
            }
            self.finish();
            return;
        }

        if self.session.is_none() {
            debug!("Release at {:.4} with no manual session", t);
            return;
        }

        if t >= T_FINISH {
            let Some(session) = self.session.take() else {
                return;
            };
            if let Err(e) = self.mixer.set_manual_progress(transition, 1.0).await {
                warn!("Failed to drive manual transition to the end: {}", e);
            }
            if let Err(e) = self.mixer.complete_manual_transition(transition).await {
                warn!("Failed to complete manual transition: {}", e);
            }
            // Commit: the staged scene goes live and the old program is staged
            if let Err(e) = self.mixer.set_program(&session.preview).await {
                warn!("Failed to set program to '{}': {}", session.preview, e);
            }
            if let Err(e) = self.mixer.set_preview(&session.program).await {
                warn!("Failed to set preview to '{}': {}", session.program, e);
            }
            info!("Manual transition finished, '{}' is live", session.preview);
            self.finish();
        } else if t <= T_CANCEL {
            if let Err(e) = self.mixer.set_manual_progress(transition, 0.0).await {
                warn!("Failed to rewind manual transition: {}", e);
            }
            if let Err(e) = self.mixer.force_stop(transition).await {
                warn!("Failed to stop manual transition: {}", e);
            }
            info!("Manual transition cancelled");
            self.finish();
        } else {
            debug!("Release at {:.4} inside the travel band, session kept", t);
        }
    }

    /// Reset the T-bar and release the session's scene references
    fn finish(&mut self) {
        self.state.set_last_position(0.0);
        self.session = None;
    }
}

fn scene_or_none(role: &str, result: Result<Option<SceneRef>, MixerError>) -> Option<SceneRef> {
    result.unwrap_or_else(|e| {
        warn!("Cannot read {} scene: {}", role, e);
        None
    })
}
