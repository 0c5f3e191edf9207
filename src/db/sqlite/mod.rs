//! SQLite database module

pub mod models;
mod migrations;
mod price_history;
mod settings;

use crate::db::HistoryStore;
use crate::error::Result;
pub use models::{NewPriceRecord, PriceHistoryRecord, TrackerConfig, TrackerConfigUpdate};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;

/// SQLite database wrapper
pub struct SqliteDb {
    conn: Mutex<Connection>,
}

impl SqliteDb {
    /// Create new SQLite database connection
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::with_connection(conn)
    }

    /// Create a private in-memory database
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };

        db.run_migrations()?;

        Ok(db)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();
        migrations::run_migrations(&conn)
    }

    // ========== Price History Methods ==========

    /// Append a price observation
    pub fn append_price(&self, record: &NewPriceRecord) -> Result<PriceHistoryRecord> {
        let conn = self.conn.lock();
        price_history::append(&conn, record)
    }

    /// Get the most recent price records
    pub fn get_price_history(&self, limit: usize) -> Result<Vec<PriceHistoryRecord>> {
        let conn = self.conn.lock();
        price_history::get_recent(&conn, limit)
    }

    /// Get the most recent price records for one product URL
    pub fn get_price_history_for_url(
        &self,
        url: &str,
        limit: usize,
    ) -> Result<Vec<PriceHistoryRecord>> {
        let conn = self.conn.lock();
        price_history::get_for_url(&conn, url, limit)
    }

    /// Count stored price records
    pub fn count_price_records(&self) -> Result<i64> {
        let conn = self.conn.lock();
        price_history::count(&conn)
    }

    // ========== Settings Methods ==========

    /// Get tracker configuration
    pub fn get_tracker_config(&self) -> Result<TrackerConfig> {
        let conn = self.conn.lock();
        settings::get_tracker_config(&conn)
    }

    /// Update tracker configuration
    pub fn update_tracker_config(&self, update: &TrackerConfigUpdate) -> Result<TrackerConfig> {
        let conn = self.conn.lock();
        settings::update_tracker_config(&conn, update)
    }
}

impl HistoryStore for SqliteDb {
    fn append(&self, record: &NewPriceRecord) -> Result<PriceHistoryRecord> {
        self.append_price(record)
    }

    fn query(&self, limit: usize) -> Result<Vec<PriceHistoryRecord>> {
        self.get_price_history(limit)
    }

    fn query_for_url(&self, url: &str, limit: usize) -> Result<Vec<PriceHistoryRecord>> {
        self.get_price_history_for_url(url, limit)
    }
}
