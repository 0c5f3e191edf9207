//! SQLite database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Run all database migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    // Create migrations table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    run_migration(conn, "001_price_history", CREATE_PRICE_HISTORY_TABLE)?;
    run_migration(conn, "002_settings", CREATE_SETTINGS_TABLE)?;

    tracing::info!("Database migrations completed");
    Ok(())
}

fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM migrations WHERE name = ?)",
        [name],
        |row| row.get(0),
    )?;

    if !exists {
        tracing::info!("Running migration: {}", name);
        conn.execute_batch(sql)?;
        conn.execute("INSERT INTO migrations (name) VALUES (?)", [name])?;
    }

    Ok(())
}

const CREATE_PRICE_HISTORY_TABLE: &str = r#"
CREATE TABLE price_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    title TEXT NOT NULL,
    price REAL NOT NULL,
    timestamp TEXT NOT NULL,
    threshold_price REAL NOT NULL,
    price_change REAL NOT NULL DEFAULT 0
);
CREATE INDEX idx_price_history_url ON price_history(url, id);
"#;

/// Polling/transport tuning, one row
const CREATE_SETTINGS_TABLE: &str = r#"
CREATE TABLE settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    poll_interval_secs INTEGER NOT NULL DEFAULT 60,
    backoff_cap_secs INTEGER NOT NULL DEFAULT 300,
    max_consecutive_failures INTEGER NOT NULL DEFAULT 5,
    connect_timeout_secs INTEGER NOT NULL DEFAULT 10,
    read_timeout_secs INTEGER NOT NULL DEFAULT 30,
    max_transport_retries INTEGER NOT NULL DEFAULT 3,
    retry_backoff_ms INTEGER NOT NULL DEFAULT 500,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
INSERT OR IGNORE INTO settings (id) VALUES (1);
"#;
