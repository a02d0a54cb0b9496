//! OBS Studio backend over obs-websocket
//!
//! Maps the manual-transition contract onto the obs-websocket T-bar:
//! studio mode is the editing mode, the T-bar position is the manual
//! progress, and releasing the T-bar at 0 aborts the transition.

use anyhow::{Context, Result};
use async_trait::async_trait;
use obws::Client as ObsClient;
use std::time::Duration;
use tracing::{debug, info};

use super::{HostMixer, MixerError, SceneRef, TransitionRef};
use crate::config::ObsConfig;

impl From<obws::Error> for MixerError {
    fn from(e: obws::Error) -> Self {
        MixerError::Request(e.to_string())
    }
}

/// OBS Studio WebSocket mixer
pub struct ObsMixer {
    name: String,
    client: ObsClient,
    /// Used when OBS reports no duration for the current transition
    fallback_duration: Duration,
}

impl ObsMixer {
    /// Connect to OBS WebSocket
    pub async fn connect(config: &ObsConfig) -> Result<Self> {
        info!("🎬 Connecting to OBS at {}:{}", config.host, config.port);

        let client = ObsClient::connect(config.host.clone(), config.port, config.password.clone())
            .await
            .context("Failed to connect to OBS WebSocket")?;

        info!("✅ OBS WebSocket connected");
        Ok(Self {
            name: "obs".to_string(),
            client,
            fallback_duration: Duration::from_millis(config.transition_duration_ms),
        })
    }
}

/// OBS reports "no scene" as an empty name
fn scene_ref(name: String) -> Option<SceneRef> {
    if name.is_empty() {
        None
    } else {
        Some(SceneRef::from(name))
    }
}

/// Duration reported by OBS, or `fallback` when it has none
fn reported_duration(millis: Option<i128>, fallback: Duration) -> Duration {
    millis
        .and_then(|ms| u64::try_from(ms).ok())
        .map(Duration::from_millis)
        .unwrap_or(fallback)
}

#[async_trait]
impl HostMixer for ObsMixer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_editing_mode_active(&self) -> Result<bool, MixerError> {
        Ok(self.client.ui().studio_mode_enabled().await?)
    }

    async fn active_transition(&self) -> Result<Option<TransitionRef>, MixerError> {
        let current = self.client.transitions().current().await?;
        Ok(Some(TransitionRef::new(current.name, current.fixed)))
    }

    async fn transition_duration(&self) -> Result<Duration, MixerError> {
        let current = self.client.transitions().current().await?;
        Ok(reported_duration(
            current.duration.map(|d| d.whole_milliseconds()),
            self.fallback_duration,
        ))
    }

    async fn start_manual_transition(
        &self,
        _transition: &TransitionRef,
        duration: Duration,
        target: &SceneRef,
    ) -> Result<(), MixerError> {
        // obs-websocket starts the T-bar transition on the first position
        // update; the target is whatever sits in preview.
        debug!(
            "OBS: manual transition towards '{}' ({} ms)",
            target,
            duration.as_millis()
        );
        Ok(())
    }

    async fn set_manual_progress(
        &self,
        _transition: &TransitionRef,
        t: f64,
    ) -> Result<(), MixerError> {
        self.client
            .transitions()
            .set_tbar_position(t as f32, Some(false))
            .await?;
        Ok(())
    }

    async fn complete_manual_transition(
        &self,
        transition: &TransitionRef,
    ) -> Result<(), MixerError> {
        // Releasing at the end lets OBS finish the transition and frees the
        // frontend T-bar
        self.client
            .transitions()
            .set_tbar_position(1.0, Some(true))
            .await?;
        debug!("OBS: released T-bar after '{}'", transition.name);
        Ok(())
    }

    async fn force_stop(&self, _transition: &TransitionRef) -> Result<(), MixerError> {
        self.client
            .transitions()
            .set_tbar_position(0.0, Some(true))
            .await?;
        Ok(())
    }

    async fn trigger_instant_transition(&self) -> Result<(), MixerError> {
        self.client.transitions().trigger().await?;
        Ok(())
    }

    async fn current_program(&self) -> Result<Option<SceneRef>, MixerError> {
        let name = self.client.scenes().current_program_scene().await?;
        Ok(scene_ref(name))
    }

    async fn current_preview(&self) -> Result<Option<SceneRef>, MixerError> {
        let name = self.client.scenes().current_preview_scene().await?;
        Ok(scene_ref(name))
    }

    async fn set_program(&self, scene: &SceneRef) -> Result<(), MixerError> {
        self.client
            .scenes()
            .set_current_program_scene(&**scene)
            .await?;
        Ok(())
    }

    async fn set_preview(&self, scene: &SceneRef) -> Result<(), MixerError> {
        self.client
            .scenes()
            .set_current_preview_scene(&**scene)
            .await?;
        Ok(())
    }
}
