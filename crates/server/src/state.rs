//! Application state shared across handlers.

use depot_core::config::AppConfig;
use depot_storage::ObjectStore;
use depot_uploads::Uploads;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Object storage backend holding chunks and artifacts.
    pub storage: Arc<dyn ObjectStore>,
    /// Upload coordinator.
    pub uploads: Uploads,
}

impl AppState {
    /// Create a new application state over `storage`.
    pub fn new(config: AppConfig, storage: Arc<dyn ObjectStore>) -> Self {
        let uploads = Uploads::new(storage.clone(), &config.uploads);
        Self {
            config: Arc::new(config),
            storage,
            uploads,
        }
    }
}
