//! Repeater Registry: known relay identities and locations.
//!
//! One row per `(id, lat, lon)`. Updates are freshest-wins for `name` and
//! `time`; `elev` coalesces on missing so a sighting that omits elevation
//! never erases a previously known value.

use sqlx::SqlitePool;

use crate::error::{Result, StoreError};
use crate::geo;
use crate::models::Repeater;

type RepeaterRow = (String, f64, f64, String, Option<f64>, i64);

fn from_row((id, lat, lon, name, elev, time): RepeaterRow) -> Repeater {
    Repeater {
        id,
        lat,
        lon,
        name,
        elev,
        time,
    }
}

/// All known rows, newest sighting first within each id.
pub async fn list(pool: &SqlitePool) -> Result<Vec<Repeater>> {
    let rows: Vec<RepeaterRow> = sqlx::query_as(
        "SELECT id, lat, lon, name, elev, time FROM repeaters ORDER BY id, time DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(from_row).collect())
}

/// Every location row for one id, newest first.
pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Vec<Repeater>> {
    let rows: Vec<RepeaterRow> = sqlx::query_as(
        "SELECT id, lat, lon, name, elev, time FROM repeaters WHERE id = ?1 ORDER BY time DESC",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(from_row).collect())
}

pub async fn get_by_location(pool: &SqlitePool, id: &str, lat: f64, lon: f64) -> Result<Repeater> {
    let row: Option<RepeaterRow> = sqlx::query_as(
        "SELECT id, lat, lon, name, elev, time FROM repeaters WHERE id = ?1 AND lat = ?2 AND lon = ?3",
    )
    .bind(id)
    .bind(lat)
    .bind(lon)
    .fetch_optional(pool)
    .await?;

    row.map(from_row)
        .ok_or_else(|| StoreError::not_found(format!("repeater {} at ({}, {})", id, lat, lon)))
}

/// Create or refresh a sighting. `name` and `time` always take the new
/// value; `elev` keeps the stored value when the update omits it.
pub async fn upsert(
    pool: &SqlitePool,
    id: &str,
    lat: f64,
    lon: f64,
    name: &str,
    elev: Option<f64>,
    time: i64,
) -> Result<()> {
    if id.trim().is_empty() {
        return Err(StoreError::validation("repeater id must not be empty"));
    }
    if name.trim().is_empty() {
        return Err(StoreError::validation("repeater name must not be empty"));
    }
    if time <= 0 {
        return Err(StoreError::validation("time must be positive epoch millis"));
    }
    if let Some(e) = elev {
        if !e.is_finite() {
            return Err(StoreError::validation("elevation must be a finite number"));
        }
    }
    geo::validate_location(lat, lon)?;

    sqlx::query(
        r#"
        INSERT INTO repeaters (id, lat, lon, name, elev, time, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id, lat, lon) DO UPDATE SET
            name = excluded.name,
            elev = COALESCE(excluded.elev, repeaters.elev),
            time = excluded.time,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(id)
    .bind(lat)
    .bind(lon)
    .bind(name)
    .bind(elev)
    .bind(time)
    .bind(geo::now_ms())
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete rows older than the cutoff; returns the count removed.
pub async fn delete_stale(pool: &SqlitePool, max_age_days: i64) -> Result<u64> {
    if max_age_days < 1 {
        return Err(StoreError::validation("max_age_days must be >= 1"));
    }
    let cutoff = geo::cutoff_ms(max_age_days);

    let result = sqlx::query("DELETE FROM repeaters WHERE time < ?1")
        .bind(cutoff)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

pub async fn delete_by_location(pool: &SqlitePool, id: &str, lat: f64, lon: f64) -> Result<()> {
    let result = sqlx::query("DELETE FROM repeaters WHERE id = ?1 AND lat = ?2 AND lon = ?3")
        .bind(id)
        .bind(lat)
        .bind(lon)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::not_found(format!(
            "repeater {} at ({}, {})",
            id, lat, lon
        )));
    }
    Ok(())
}
