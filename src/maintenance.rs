//! Retention and repair jobs.
//!
//! Independent, idempotent maintenance procedures. Each operates per key
//! under the same transactional discipline as the ingest path, so they are
//! safe to run while submissions continue. A failure on one key aborts that
//! key only; the batch moves on.

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::warn;

use crate::coverage;
use crate::error::{Result, StoreError};
use crate::geo;
use crate::models::Sample;
use crate::repeaters;
use crate::samples;
use crate::samples::decode_path;

/// Counts from an eviction run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EvictionReport {
    pub samples_archived: u64,
    pub samples_deleted: u64,
    pub repeaters_deleted: u64,
}

/// Counts from a repair-all run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RepairReport {
    pub repaired: u64,
    pub failed: u64,
}

/// Evict samples and repeaters older than their retention windows.
///
/// Stale samples are copied into the archive (insert-or-ignore, so a rerun
/// is a no-op) and deleted in the same transaction. The delete re-checks the
/// cutoff so a row refreshed by a concurrent submit survives.
pub async fn evict(
    pool: &SqlitePool,
    sample_max_age_days: i64,
    repeater_max_age_days: i64,
) -> Result<EvictionReport> {
    if sample_max_age_days < 1 || repeater_max_age_days < 1 {
        return Err(StoreError::validation("retention windows must be >= 1 day"));
    }

    let cutoff = geo::cutoff_ms(sample_max_age_days);
    let stale = samples::older_than(pool, sample_max_age_days).await?;

    let mut report = EvictionReport::default();

    for sample in &stale {
        match archive_and_delete(pool, sample, cutoff).await {
            Ok((archived, deleted)) => {
                report.samples_archived += archived;
                report.samples_deleted += deleted;
            }
            Err(err) => {
                warn!(cell = %sample.geohash, error = %err, "eviction failed for key, continuing");
            }
        }
    }

    report.repeaters_deleted = repeaters::delete_stale(pool, repeater_max_age_days).await?;

    Ok(report)
}

async fn archive_and_delete(pool: &SqlitePool, sample: &Sample, cutoff: i64) -> Result<(u64, u64)> {
    let path_json = serde_json::to_string(&sample.path)
        .map_err(|e| StoreError::validation(format!("unencodable path: {}", e)))?;

    let mut tx = pool.begin().await?;

    let archived = sqlx::query(
        r#"
        INSERT INTO archive (geohash, time, path)
        VALUES (?1, ?2, json(?3))
        ON CONFLICT(geohash) DO NOTHING
        "#,
    )
    .bind(&sample.geohash)
    .bind(sample.time)
    .bind(&path_json)
    .execute(&mut *tx)
    .await?;

    let deleted = sqlx::query("DELETE FROM samples WHERE geohash = ?1 AND time < ?2")
        .bind(&sample.geohash)
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok((archived.rows_affected(), deleted.rows_affected()))
}

/// Delete samples inside a time window; returns the count removed.
pub async fn purge_window(pool: &SqlitePool, start: i64, end: i64) -> Result<u64> {
    samples::delete_by_time_range(pool, start, end).await
}

/// Repair every coverage aggregate. Per-key failures are logged and the
/// pass continues with remaining keys.
pub async fn repair_all(pool: &SqlitePool) -> Result<RepairReport> {
    let keys: Vec<(String,)> = sqlx::query_as("SELECT geohash FROM coverage ORDER BY geohash")
        .fetch_all(pool)
        .await?;

    let mut report = RepairReport::default();
    for (key,) in keys {
        match coverage::repair(pool, &key).await {
            Ok(_) => report.repaired += 1,
            Err(err) => {
                warn!(cell = %key, error = %err, "repair failed for key, continuing");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// Rows currently parked in the archive, ordered by key.
pub async fn archived_samples(pool: &SqlitePool) -> Result<Vec<Sample>> {
    let rows: Vec<(String, i64, String)> =
        sqlx::query_as("SELECT geohash, time, path FROM archive ORDER BY geohash")
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::models::Observation;

    #[tokio::test]
    async fn test_evict_archives_then_deletes_stale_samples() {
        let pool = memory_pool().await;

        let stale = geo::now_ms() - 200 * 24 * 60 * 60 * 1000;
        samples::upsert(&pool, "oldcell", stale, &["r1".to_string()])
            .await
            .unwrap();
        samples::upsert(&pool, "newcell", geo::now_ms(), &[])
            .await
            .unwrap();

        let report = evict(&pool, 180, 30).await.unwrap();
        assert_eq!(report.samples_archived, 1);
        assert_eq!(report.samples_deleted, 1);

        let remaining = samples::list_by_prefix(&pool, None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].geohash, "newcell");

        let parked = archived_samples(&pool).await.unwrap();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].geohash, "oldcell");
        assert_eq!(parked[0].path, vec!["r1"]);
    }

    #[tokio::test]
    async fn test_evict_is_idempotent() {
        let pool = memory_pool().await;

        let stale = geo::now_ms() - 200 * 24 * 60 * 60 * 1000;
        samples::upsert(&pool, "oldcell", stale, &[]).await.unwrap();

        evict(&pool, 180, 30).await.unwrap();
        let second = evict(&pool, 180, 30).await.unwrap();
        assert_eq!(second.samples_archived, 0);
        assert_eq!(second.samples_deleted, 0);
        assert_eq!(archived_samples(&pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_evict_prunes_stale_repeaters() {
        let pool = memory_pool().await;

        let stale = geo::cutoff_ms(30) - 1000;
        repeaters::upsert(&pool, "old", 1.0, 1.0, "Old", None, stale)
            .await
            .unwrap();
        repeaters::upsert(&pool, "new", 2.0, 2.0, "New", None, geo::now_ms())
            .await
            .unwrap();

        let report = evict(&pool, 180, 30).await.unwrap();
        assert_eq!(report.repeaters_deleted, 1);
    }

    #[tokio::test]
    async fn test_purge_window_delegates_inclusive_range() {
        let pool = memory_pool().await;

        for (key, time) in [("a", 999), ("b", 1000), ("c", 2000), ("d", 2001)] {
            samples::upsert(&pool, key, time, &[]).await.unwrap();
        }

        assert_eq!(purge_window(&pool, 1000, 2000).await.unwrap(), 2);
        assert!(matches!(
            purge_window(&pool, 5, 1).await,
            Err(StoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_repair_all_touches_every_cell() {
        let pool = memory_pool().await;

        for cell in ["aaa", "bbb", "ccc"] {
            coverage::merge(
                &pool,
                cell,
                &[Observation {
                    time: 100,
                    path: vec!["r1".to_string()],
                }],
            )
            .await
            .unwrap();
        }

        let report = repair_all(&pool).await.unwrap();
        assert_eq!(report.repaired, 3);
        assert_eq!(report.failed, 0);
    }
}
