//! Shared service context
//!
//! One [`ServiceContext`] is created by whoever starts the service and is
//! passed by reference to every request handler. Cross-thread values live
//! in [`TbarState`] as atomics; everything mixer-related goes through the
//! host queue.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::{ConfigStore, ServiceConfig};
use crate::http::decoder::ConfigUpdate;
use crate::transition::{clamp_unit, HostActorHandle, HostTask, PositionUpdate, QueueError};

/// Values read by the listener thread and written by both contexts
#[derive(Debug, Default)]
pub struct TbarState {
    /// f64 bit pattern of the last accepted position
    last_position: AtomicU64,
    manual_active: AtomicBool,
}

impl TbarState {
    pub fn last_position(&self) -> f64 {
        f64::from_bits(self.last_position.load(Ordering::Acquire))
    }

    pub fn set_last_position(&self, position: f64) {
        self.last_position
            .store(clamp_unit(position).to_bits(), Ordering::Release);
    }

    pub fn manual_active(&self) -> bool {
        self.manual_active.load(Ordering::Acquire)
    }

    pub fn set_manual_active(&self, active: bool) {
        self.manual_active.store(active, Ordering::Release);
    }
}

/// Everything a request handler may touch
pub struct ServiceContext {
    config: RwLock<ServiceConfig>,
    store: Option<ConfigStore>,
    state: Arc<TbarState>,
    host: HostActorHandle,
    /// Config changes to re-apply on the supervisor loop
    apply_tx: mpsc::UnboundedSender<ServiceConfig>,
}

impl ServiceContext {
    /// `store` is `None` when settings should not be persisted (tests)
    pub fn new(
        config: ServiceConfig,
        store: Option<ConfigStore>,
        state: Arc<TbarState>,
        host: HostActorHandle,
        apply_tx: mpsc::UnboundedSender<ServiceConfig>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            store,
            state,
            host,
            apply_tx,
        }
    }

    pub fn config(&self) -> ServiceConfig {
        self.config.read().clone()
    }

    pub fn state(&self) -> &TbarState {
        &self.state
    }

    /// Record a position and queue it for the transition controller
    ///
    /// Nothing is recorded when the queue cannot take the task.
    pub fn submit_position(&self, update: PositionUpdate) -> Result<(), QueueError> {
        let permit = self.host.try_reserve()?;
        self.state.set_last_position(update.position);
        permit.send(HostTask::Position(update));
        Ok(())
    }

    /// Merge a `/config` POST, persist it and schedule a re-apply
    pub fn update_config(&self, update: ConfigUpdate) -> ServiceConfig {
        let snapshot = {
            let mut config = self.config.write();
            if let Some(enabled) = update.enabled {
                config.enabled = enabled;
            }
            if let Some(port) = update.port {
                config.port = port;
            }
            config.clone()
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&snapshot) {
                warn!("Failed to persist config: {:#}", e);
            }
        }

        if self.apply_tx.send(snapshot.clone()).is_err() {
            warn!("Config apply loop is gone, change will apply on next start");
        }

        snapshot
    }
}
