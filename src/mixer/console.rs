//! Console mixer - simulated host that logs every operation
//!
//! This is useful for:
//! - Exercising the control page and T-bar protocol without OBS
//! - Debugging the start/drive/commit/cancel sequence
//! - Tests that need a mixer with real program/preview bookkeeping

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use super::{HostMixer, MixerError, SceneRef, TransitionRef};

/// Observable state of the simulated mixer
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleSnapshot {
    pub studio_mode: bool,
    pub program: Option<SceneRef>,
    pub preview: Option<SceneRef>,
    /// Target of the running manual transition
    pub manual_target: Option<SceneRef>,
    pub progress: f64,
    pub instant_transitions: u64,
    /// Manual transitions that ran to the end
    pub completed_transitions: u64,
}

struct ConsoleState {
    snapshot: ConsoleSnapshot,
    transition: Option<TransitionRef>,
    duration: Duration,
}

/// Simulated two-input mixer
pub struct ConsoleMixer {
    name: String,
    state: Mutex<ConsoleState>,
}

impl ConsoleMixer {
    /// Studio mode on, "Scene 1" live, "Scene 2" staged, 300ms fade
    pub fn new() -> Self {
        Self {
            name: "console".to_string(),
            state: Mutex::new(ConsoleState {
                snapshot: ConsoleSnapshot {
                    studio_mode: true,
                    program: Some(SceneRef::from("Scene 1")),
                    preview: Some(SceneRef::from("Scene 2")),
                    manual_target: None,
                    progress: 0.0,
                    instant_transitions: 0,
                    completed_transitions: 0,
                },
                transition: Some(TransitionRef::new("Fade", false)),
                duration: Duration::from_millis(300),
            }),
        }
    }

    pub fn with_studio_mode(self, enabled: bool) -> Self {
        self.state.lock().snapshot.studio_mode = enabled;
        self
    }

    pub fn with_scenes(self, program: Option<&str>, preview: Option<&str>) -> Self {
        {
            let mut state = self.state.lock();
            state.snapshot.program = program.map(SceneRef::from);
            state.snapshot.preview = preview.map(SceneRef::from);
        }
        self
    }

    pub fn with_transition(self, transition: Option<TransitionRef>) -> Self {
        self.state.lock().transition = transition;
        self
    }

    pub fn with_duration(self, duration: Duration) -> Self {
        self.state.lock().duration = duration;
        self
    }

    pub fn snapshot(&self) -> ConsoleSnapshot {
        self.state.lock().snapshot.clone()
    }
}

impl Default for ConsoleMixer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostMixer for ConsoleMixer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_editing_mode_active(&self) -> Result<bool, MixerError> {
        Ok(self.state.lock().snapshot.studio_mode)
    }

    async fn active_transition(&self) -> Result<Option<TransitionRef>, MixerError> {
        Ok(self.state.lock().transition.clone())
    }

    async fn transition_duration(&self) -> Result<Duration, MixerError> {
        Ok(self.state.lock().duration)
    }

    async fn start_manual_transition(
        &self,
        transition: &TransitionRef,
        duration: Duration,
        target: &SceneRef,
    ) -> Result<(), MixerError> {
        let mut state = self.state.lock();
        if state.snapshot.manual_target.is_some() {
            return Err(MixerError::Rejected {
                operation: "start_manual_transition",
                reason: "a manual transition is already running".to_string(),
            });
        }
        info!(
            "🖥️  [{}] start manual '{}' -> '{}' ({} ms)",
            self.name,
            transition.name,
            target,
            duration.as_millis()
        );
        state.snapshot.manual_target = Some(target.clone());
        state.snapshot.progress = 0.0;
        Ok(())
    }

    async fn set_manual_progress(
        &self,
        _transition: &TransitionRef,
        t: f64,
    ) -> Result<(), MixerError> {
        debug!("🖥️  [{}] manual progress {:.4}", self.name, t);
        self.state.lock().snapshot.progress = t;
        Ok(())
    }

    async fn complete_manual_transition(
        &self,
        transition: &TransitionRef,
    ) -> Result<(), MixerError> {
        let mut state = self.state.lock();
        let Some(target) = state.snapshot.manual_target.take() else {
            return Err(MixerError::Rejected {
                operation: "complete_manual_transition",
                reason: "no manual transition is running".to_string(),
            });
        };
        info!(
            "🖥️  [{}] manual '{}' completed on '{}'",
            self.name, transition.name, target
        );
        state.snapshot.progress = 1.0;
        state.snapshot.completed_transitions += 1;
        Ok(())
    }

    async fn force_stop(&self, transition: &TransitionRef) -> Result<(), MixerError> {
        info!("🖥️  [{}] force stop '{}'", self.name, transition.name);
        let mut state = self.state.lock();
        state.snapshot.manual_target = None;
        state.snapshot.progress = 0.0;
        Ok(())
    }

    async fn trigger_instant_transition(&self) -> Result<(), MixerError> {
        let mut state = self.state.lock();
        if !state.snapshot.studio_mode {
            return Err(MixerError::Rejected {
                operation: "trigger_instant_transition",
                reason: "studio mode is off".to_string(),
            });
        }
        let snapshot = &mut state.snapshot;
        std::mem::swap(&mut snapshot.program, &mut snapshot.preview);
        snapshot.instant_transitions += 1;
        info!(
            "🖥️  [{}] instant transition, program is now {:?}",
            self.name,
            snapshot.program.as_deref()
        );
        Ok(())
    }

    async fn current_program(&self) -> Result<Option<SceneRef>, MixerError> {
        Ok(self.state.lock().snapshot.program.clone())
    }

    async fn current_preview(&self) -> Result<Option<SceneRef>, MixerError> {
        Ok(self.state.lock().snapshot.preview.clone())
    }

    async fn set_program(&self, scene: &SceneRef) -> Result<(), MixerError> {
        info!("🖥️  [{}] program <- '{}'", self.name, scene);
        let mut state = self.state.lock();
        state.snapshot.program = Some(scene.clone());
        // Switching program ends whatever manual transition was running
        state.snapshot.manual_target = None;
        state.snapshot.progress = 0.0;
        Ok(())
    }

    async fn set_preview(&self, scene: &SceneRef) -> Result<(), MixerError> {
        info!("🖥️  [{}] preview <- '{}'", self.name, scene);
        self.state.lock().snapshot.preview = Some(scene.clone());
        Ok(())
    }
}
