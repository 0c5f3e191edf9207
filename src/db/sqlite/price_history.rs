//! Price history log
//!
//! Append-only series of observations. Each row stores the change from the
//! previous row for the same URL, computed at insert time.

use crate::db::sqlite::models::{NewPriceRecord, PriceHistoryRecord};
use crate::error::Result;
use chrono::SecondsFormat;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Append an observation and return the stored record
///
/// Caller must hold the connection lock for the whole call so the delta read
/// and the insert see the same data.
pub fn append(conn: &Connection, record: &NewPriceRecord) -> Result<PriceHistoryRecord> {
    let previous: Option<f64> = conn
        .query_row(
            "SELECT price FROM price_history WHERE url = ?1 ORDER BY id DESC LIMIT 1",
            params![record.url],
            |row| row.get(0),
        )
        .optional()?;

    let price_change = previous.map(|p| record.price - p).unwrap_or(0.0);
    let timestamp = record.observed_at.to_rfc3339_opts(SecondsFormat::Secs, true);

    conn.execute(
        r#"
        INSERT INTO price_history (url, title, price, timestamp, threshold_price, price_change)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            record.url,
            record.title,
            record.price,
            timestamp,
            record.threshold_price,
            price_change
        ],
    )?;

    let id = conn.last_insert_rowid();
    tracing::debug!(
        "Stored price record: id={}, price={}, change={}",
        id,
        record.price,
        price_change
    );

    Ok(PriceHistoryRecord {
        id,
        url: record.url.clone(),
        title: record.title.clone(),
        price: record.price,
        timestamp,
        threshold_price: record.threshold_price,
        price_change,
    })
}

/// Most recent records across all URLs
pub fn get_recent(conn: &Connection, limit: usize) -> Result<Vec<PriceHistoryRecord>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, url, title, price, timestamp, threshold_price, price_change
        FROM price_history
        ORDER BY id DESC
        LIMIT ?1
        "#,
    )?;

    let records = stmt
        .query_map(params![limit as i64], map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(records)
}

/// Most recent records for one URL
pub fn get_for_url(conn: &Connection, url: &str, limit: usize) -> Result<Vec<PriceHistoryRecord>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, url, title, price, timestamp, threshold_price, price_change
        FROM price_history
        WHERE url = ?1
        ORDER BY id DESC
        LIMIT ?2
        "#,
    )?;

    let records = stmt
        .query_map(params![url, limit as i64], map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(records)
}

/// Total number of stored records
pub fn count(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM price_history", [], |row| row.get(0))?;
    Ok(count)
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<PriceHistoryRecord> {
    Ok(PriceHistoryRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        price: row.get(3)?,
        timestamp: row.get(4)?,
        threshold_price: row.get(5)?,
        price_change: row.get(6)?,
    })
}
