//! Application state management
//!
//! Central state container shared by the HTTP handlers and the mock
//! production feed.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::repository::MachineRepository;

/// State handle as registered with actix and passed to background tasks
pub type SharedState = Arc<RwLock<AppState>>;

/// Central application state
#[derive(Debug)]
pub struct AppState {
    /// Machine document store
    machines: MachineRepository,
    /// Application start time
    start_time: DateTime<Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(max_production_samples: usize) -> Self {
        info!(max_production_samples, "Initializing application state");
        Self {
            machines: MachineRepository::new(max_production_samples),
            start_time: Utc::now(),
        }
    }

    /// Wrap into the shared handle
    pub fn shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    pub fn machines(&self) -> &MachineRepository {
        &self.machines
    }

    pub fn machines_mut(&mut self) -> &mut MachineRepository {
        &mut self.machines
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.start_time).num_seconds().max(0) as u64
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            machines: MachineRepository::default(),
            start_time: Utc::now(),
        }
    }
}
