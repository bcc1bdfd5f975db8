//! Sample Store: denormalized per-cell observation rows.
//!
//! One row per sample key, holding the newest observation time and the
//! deduplicated union of every relay path ever reported for that cell. The
//! merge happens inside the upsert's `ON CONFLICT` clause so concurrent
//! writers compose without a read-modify-write on the caller's side; the
//! SQLite rendering of the set union walks both JSON arrays with
//! `json_each` and rebuilds a sorted, distinct array.

use sqlx::SqlitePool;

use crate::error::{Result, StoreError};
use crate::geo;
use crate::models::Sample;

/// Decode a stored JSON path array, tolerating legacy null/empty values.
pub(crate) fn decode_path(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn encode_path(path: &[String]) -> Result<String> {
    serde_json::to_string(path)
        .map_err(|e| StoreError::validation(format!("unencodable path: {}", e)))
}

/// Insert a new cell row, or merge into the existing one: `time` advances
/// monotonically, `path` becomes the sorted distinct union. Atomic per key.
pub async fn upsert(pool: &SqlitePool, geohash: &str, time: i64, path: &[String]) -> Result<()> {
    if geohash.is_empty() {
        return Err(StoreError::validation("geohash must not be empty"));
    }
    if time <= 0 {
        return Err(StoreError::validation("time must be positive epoch millis"));
    }
    // Stored as a sorted distinct set so fresh inserts match what the
    // conflict-clause union would produce
    let path: std::collections::BTreeSet<String> =
        geo::normalize_path(path)?.into_iter().collect();
    let path: Vec<String> = path.into_iter().collect();
    let path_json = encode_path(&path)?;

    sqlx::query(
        r#"
        INSERT INTO samples (geohash, time, path, updated_at)
        VALUES (?1, ?2, json(?3), ?4)
        ON CONFLICT(geohash) DO UPDATE SET
            time = MAX(samples.time, excluded.time),
            path = (
                SELECT json_group_array(value) FROM (
                    SELECT value FROM json_each(samples.path)
                    UNION
                    SELECT value FROM json_each(?3)
                    ORDER BY value
                )
            ),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(geohash)
    .bind(time)
    .bind(&path_json)
    .bind(geo::now_ms())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get(pool: &SqlitePool, geohash: &str) -> Result<Sample> {
    let row: Option<(String, i64, String)> =
        sqlx::query_as("SELECT geohash, time, path FROM samples WHERE geohash = ?1")
            .bind(geohash)
            .fetch_optional(pool)
            .await?;

    match row {
        Some((geohash, time, path)) => Ok(Sample {
            geohash,
            time,
            path: decode_path(&path),
        }),
        None => Err(StoreError::not_found(format!("sample {}", geohash))),
    }
}

/// All rows whose key starts with `prefix`, or every row when `prefix` is
/// absent. Ordered by key.
pub async fn list_by_prefix(pool: &SqlitePool, prefix: Option<&str>) -> Result<Vec<Sample>> {
    let rows: Vec<(String, i64, String)> = match prefix {
        Some(p) => {
            sqlx::query_as(
                "SELECT geohash, time, path FROM samples WHERE geohash LIKE ?1 ORDER BY geohash",
            )
            .bind(format!("{}%", p))
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as("SELECT geohash, time, path FROM samples ORDER BY geohash")
                .fetch_all(pool)
                .await?
        }
    };

    Ok(rows
        .into_iter()
        .map(|(geohash, time, path)| Sample {
            geohash,
            time,
            path: decode_path(&path),
        })
        .collect())
}

/// Read-only selection of rows older than the cutoff; eviction acts on the
/// result separately.
pub async fn older_than(pool: &SqlitePool, max_age_days: i64) -> Result<Vec<Sample>> {
    if max_age_days < 1 {
        return Err(StoreError::validation("max_age_days must be >= 1"));
    }
    let cutoff = geo::cutoff_ms(max_age_days);

    let rows: Vec<(String, i64, String)> =
        sqlx::query_as("SELECT geohash, time, path FROM samples WHERE time < ?1 ORDER BY geohash")
            .bind(cutoff)
            .fetch_all(pool)
            .await?;

    Ok(rows
        .into_iter()
        .map(|(geohash, time, path)| Sample {
            geohash,
            time,
            path: decode_path(&path),
        })
        .collect())
}

/// Delete rows whose `time` falls in `[start, end]` inclusive; returns the
/// number removed.
pub async fn delete_by_time_range(pool: &SqlitePool, start: i64, end: i64) -> Result<u64> {
    if start > end {
        return Err(StoreError::validation("start must not exceed end"));
    }
    let result = sqlx::query("DELETE FROM samples WHERE time >= ?1 AND time <= ?2")
        .bind(start)
        .bind(end)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

pub async fn delete_by_key(pool: &SqlitePool, geohash: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM samples WHERE geohash = ?1")
        .bind(geohash)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::not_found(format!("sample {}", geohash)));
    }
    Ok(())
}
