//! Application state shared by the pipeline and the handlers.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::ApiError;
use crate::pipeline::RateLimiters;
use crate::storage::{DriveAuth, DriveStorage, MemoryStorage, StorageBackend, StorageError};

/// Application state shared across all handlers.
///
/// The cache store is wrapped in Arc<RwLock<>> for thread-safe access.
#[derive(Clone)]
pub struct AppState {
    /// Response cache
    pub cache: Arc<RwLock<CacheStore>>,
    /// Object store holding the files
    pub storage: Arc<dyn StorageBackend>,
    /// Per-class request counters
    pub limiters: Arc<RateLimiters>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates a new AppState around the given storage backend.
    pub fn new(config: Config, storage: Arc<dyn StorageBackend>) -> Self {
        let cache = CacheStore::new(config.max_cache_entries, config.default_cache_ttl);
        Self {
            cache: Arc::new(RwLock::new(cache)),
            storage,
            limiters: Arc::new(RateLimiters::from_config(&config)),
            config: Arc::new(config),
        }
    }

    /// Creates a new AppState from configuration, choosing the Drive backend
    /// when credentials are present and the in-memory one otherwise.
    ///
    /// Fails when the configured service-account key cannot be loaded.
    pub fn from_config(config: Config) -> Result<Self, StorageError> {
        let storage: Arc<dyn StorageBackend> = match &config.drive {
            Some(drive) => {
                let auth = DriveAuth::from_credentials(&drive.credentials)?;
                info!(
                    "Using Google Drive storage, folder {} ({:?})",
                    drive.folder_id, auth
                );
                Arc::new(DriveStorage::new(auth, &drive.folder_id))
            }
            None => {
                warn!("No Drive credentials set, files are kept in memory only");
                Arc::new(MemoryStorage::new())
            }
        };
        Ok(Self::new(config, storage))
    }

    /// Removes cached responses whose key contains `pattern`, or all of them.
    pub async fn clear_cache(&self, pattern: Option<&str>) -> usize {
        let removed = self.cache.write().await.invalidate(pattern);
        info!(
            "Cache cleared: pattern={} removed={}",
            pattern.unwrap_or("*"),
            removed
        );
        removed
    }

    /// Translates a storage failure into an API error, logging anything
    /// other than a missing file.
    pub fn upstream(&self, context: &str, err: StorageError) -> ApiError {
        match err {
            StorageError::NotFound(_) => ApiError::NotFound("File not found".to_string()),
            other => {
                error!("{}: {}", context, other);
                ApiError::Upstream {
                    error: context.to_string(),
                    detail: self.config.expose_error_details.then(|| other.to_string()),
                }
            }
        }
    }
}
