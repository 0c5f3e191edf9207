//! Application state management

use crate::config::ServerConfig;
use crate::db::sqlite::{SqliteDb, TrackerConfig, TrackerConfigUpdate};
use crate::db::HistoryStore;
use crate::error::Result;
use crate::notifier::TelegramNotifier;
use crate::scraping::{FetchConfig, PageFetcher};
use crate::tracker::{EngineConfig, EngineDeps, TrackingManager};
use std::sync::Arc;

/// Application state shared across all request handlers
pub struct AppState {
    /// SQLite database connection (settings)
    pub sqlite: Arc<SqliteDb>,

    /// Price observations, read by the history endpoint
    pub history: Arc<dyn HistoryStore>,

    /// The single tracking session and its polling task
    pub tracker: Arc<TrackingManager>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: &ServerConfig) -> Result<Self> {
        // Create data directory if it doesn't exist
        std::fs::create_dir_all(&config.data_dir)?;

        tracing::info!("Data directory: {:?}", config.data_dir);

        // Initialize SQLite database
        let sqlite = Arc::new(SqliteDb::new(&config.database_path())?);
        let tracker_config = sqlite.get_tracker_config()?;

        let deps = EngineDeps {
            fetcher: Arc::new(PageFetcher::new(FetchConfig::from(&tracker_config))?),
            history: sqlite.clone(),
            notifier: Arc::new(TelegramNotifier::new()?),
        };
        let tracker = Arc::new(TrackingManager::new(
            deps,
            EngineConfig::from(&tracker_config),
        ));

        Ok(Self::from_parts(sqlite, tracker))
    }

    /// Assemble state from already-built components
    pub fn from_parts(sqlite: Arc<SqliteDb>, tracker: Arc<TrackingManager>) -> Self {
        Self {
            history: sqlite.clone(),
            sqlite,
            tracker,
        }
    }

    /// Persist new tracker settings and hand them to the tracker
    pub fn update_tracker_config(&self, update: &TrackerConfigUpdate) -> Result<TrackerConfig> {
        let config = self.sqlite.update_tracker_config(update)?;
        let fetcher = PageFetcher::new(FetchConfig::from(&config))?;
        self.tracker
            .reconfigure(Arc::new(fetcher), EngineConfig::from(&config));
        Ok(config)
    }
}
