//! Tracker settings management

use crate::db::sqlite::models::{TrackerConfig, TrackerConfigUpdate};
use crate::error::{AppError, Result};
use rusqlite::Connection;

const ONE_DAY_SECS: u64 = 24 * 60 * 60;

/// Get tracker configuration
pub fn get_tracker_config(conn: &Connection) -> Result<TrackerConfig> {
    let config = conn.query_row(
        "SELECT poll_interval_secs, backoff_cap_secs, max_consecutive_failures,
                connect_timeout_secs, read_timeout_secs, max_transport_retries, retry_backoff_ms
         FROM settings WHERE id = 1",
        [],
        |row| {
            Ok(TrackerConfig {
                poll_interval_secs: row.get::<_, i64>(0)? as u64,
                backoff_cap_secs: row.get::<_, i64>(1)? as u64,
                max_consecutive_failures: row.get::<_, i64>(2)? as u32,
                connect_timeout_secs: row.get::<_, i64>(3)? as u64,
                read_timeout_secs: row.get::<_, i64>(4)? as u64,
                max_transport_retries: row.get::<_, i64>(5)? as u32,
                retry_backoff_ms: row.get::<_, i64>(6)? as u64,
            })
        },
    )?;

    Ok(config)
}

/// Update tracker configuration; absent fields keep their value
pub fn update_tracker_config(conn: &Connection, update: &TrackerConfigUpdate) -> Result<TrackerConfig> {
    let mut updates = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    // (column, value, minimum, maximum)
    let fields: [(&str, Option<u64>, u64, u64); 7] = [
        ("poll_interval_secs", update.poll_interval_secs, 1, ONE_DAY_SECS),
        ("backoff_cap_secs", update.backoff_cap_secs, 1, ONE_DAY_SECS),
        ("max_consecutive_failures", update.max_consecutive_failures.map(u64::from), 1, 100),
        ("connect_timeout_secs", update.connect_timeout_secs, 1, 300),
        ("read_timeout_secs", update.read_timeout_secs, 1, 300),
        ("max_transport_retries", update.max_transport_retries.map(u64::from), 0, 10),
        ("retry_backoff_ms", update.retry_backoff_ms, 0, 60_000),
    ];

    for (column, value, minimum, maximum) in fields {
        if let Some(v) = value {
            if !(minimum..=maximum).contains(&v) {
                return Err(AppError::Validation(format!(
                    "{} must be between {} and {}",
                    column, minimum, maximum
                )));
            }
            updates.push(format!("{} = ?", column));
            params.push(Box::new(v as i64));
        }
    }

    if !updates.is_empty() {
        updates.push("updated_at = datetime('now')".to_string());

        let sql = format!("UPDATE settings SET {} WHERE id = 1", updates.join(", "));

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        conn.execute(&sql, params_refs.as_slice())?;
    }

    let config = get_tracker_config(conn)?;
    if config.backoff_cap_secs < config.poll_interval_secs {
        tracing::warn!(
            "Backoff cap {}s is below the poll interval {}s; failures will retry faster than polls",
            config.backoff_cap_secs,
            config.poll_interval_secs
        );
    }

    Ok(config)
}
