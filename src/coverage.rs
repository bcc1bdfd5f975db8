//! Coverage Aggregator: folds per-cell observation streams into compact
//! statistics.
//!
//! The merge path is incremental: it classifies only the samples whose
//! history insert was genuinely accepted, then applies that delta to the
//! stored counters inside the same transaction. Replaying a sample is a
//! no-op because the backing history admits one entry per instant
//! (first-write wins), and concurrent merges compose because the upsert
//! adds deltas rather than rewriting totals. `repair` is the ground truth:
//! a from-scratch fold over the deduplicated history that the incremental
//! path must agree with.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use sqlx::SqlitePool;
use tracing::warn;

use crate::error::{Result, StoreError};
use crate::geo;
use crate::models::{CoverageAggregate, MergeOutcome, Observation};
use crate::samples::decode_path;

fn encode_set(set: &BTreeSet<String>) -> Result<String> {
    serde_json::to_string(&set.iter().collect::<Vec<_>>())
        .map_err(|e| StoreError::validation(format!("unencodable repeater set: {}", e)))
}

fn encode_path(path: &[String]) -> Result<String> {
    serde_json::to_string(path)
        .map_err(|e| StoreError::validation(format!("unencodable path: {}", e)))
}

/// Merge new observations into a cell's aggregate.
///
/// Runs in one transaction scoped to the cell: each observation is offered
/// to the backing history (`INSERT .. ON CONFLICT DO NOTHING`), and only
/// the accepted ones contribute to the counter delta. The final upsert adds
/// that delta on conflict, so the persisted totals never re-absorb
/// pre-existing observations.
pub async fn merge(
    pool: &SqlitePool,
    geohash: &str,
    samples: &[Observation],
) -> Result<MergeOutcome> {
    if geohash.is_empty() {
        return Err(StoreError::validation("geohash must not be empty"));
    }
    for s in samples {
        if s.time <= 0 {
            return Err(StoreError::validation("time must be positive epoch millis"));
        }
    }

    let mut tx = pool.begin().await?;

    let mut heard = 0i64;
    let mut lost = 0i64;
    let mut last_heard = 0i64;
    let mut repeaters: BTreeSet<String> = BTreeSet::new();
    let mut outcome = MergeOutcome::default();
    let mut batch_times: HashSet<i64> = HashSet::new();

    for sample in samples {
        // First entry wins per instant, also within this batch
        if !batch_times.insert(sample.time) {
            outcome.duplicates += 1;
            continue;
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO coverage_samples (coverage_geohash, sample_time, sample_path)
            VALUES (?1, ?2, json(?3))
            ON CONFLICT(coverage_geohash, sample_time) DO NOTHING
            "#,
        )
        .bind(geohash)
        .bind(sample.time)
        .bind(encode_path(&sample.path)?)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            outcome.duplicates += 1;
            continue;
        }

        if sample.path.is_empty() {
            lost += 1;
        } else {
            heard += 1;
            for p in &sample.path {
                repeaters.insert(p.to_lowercase());
            }
        }
        last_heard = last_heard.max(sample.time);
        outcome.accepted += 1;
    }

    if outcome.accepted > 0 {
        sqlx::query(
            r#"
            INSERT INTO coverage (geohash, heard, lost, last_heard, hit_repeaters, updated_at)
            VALUES (?1, ?2, ?3, ?4, json(?5), ?6)
            ON CONFLICT(geohash) DO UPDATE SET
                heard = coverage.heard + excluded.heard,
                lost = coverage.lost + excluded.lost,
                last_heard = MAX(coverage.last_heard, excluded.last_heard),
                hit_repeaters = (
                    SELECT json_group_array(value) FROM (
                        SELECT value FROM json_each(coverage.hit_repeaters)
                        UNION
                        SELECT value FROM json_each(?5)
                        ORDER BY value
                    )
                ),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(geohash)
        .bind(heard)
        .bind(lost)
        .bind(last_heard)
        .bind(encode_set(&repeaters)?)
        .bind(geo::now_ms())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(outcome)
}

async fn fetch_history<'e, E>(executor: E, geohash: &str) -> Result<Vec<Observation>>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let rows: Vec<(i64, String)> = sqlx::query_as(
        r#"
        SELECT sample_time, sample_path FROM coverage_samples
        WHERE coverage_geohash = ?1
        ORDER BY sample_time
        "#,
    )
    .bind(geohash)
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(time, path)| Observation {
            time,
            path: decode_path(&path),
        })
        .collect())
}

pub async fn get(pool: &SqlitePool, geohash: &str) -> Result<CoverageAggregate> {
    let row: Option<(String, i64, i64, i64, String)> = sqlx::query_as(
        "SELECT geohash, heard, lost, last_heard, hit_repeaters FROM coverage WHERE geohash = ?1",
    )
    .bind(geohash)
    .fetch_optional(pool)
    .await?;

    let (geohash, heard, lost, last_heard, hit_repeaters) = match row {
        Some(row) => row,
        None => return Err(StoreError::not_found(format!("coverage {}", geohash))),
    };

    let values = fetch_history(pool, &geohash).await?;

    Ok(CoverageAggregate {
        geohash,
        heard,
        lost,
        last_heard,
        hit_repeaters: decode_path(&hit_repeaters),
        values,
    })
}

pub async fn get_all(pool: &SqlitePool) -> Result<Vec<CoverageAggregate>> {
    let rows: Vec<(String, i64, i64, i64, String)> = sqlx::query_as(
        "SELECT geohash, heard, lost, last_heard, hit_repeaters FROM coverage ORDER BY geohash",
    )
    .fetch_all(pool)
    .await?;

    let history: Vec<(String, i64, String)> = sqlx::query_as(
        r#"
        SELECT coverage_geohash, sample_time, sample_path FROM coverage_samples
        ORDER BY coverage_geohash, sample_time
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut by_cell: BTreeMap<String, Vec<Observation>> = BTreeMap::new();
    for (cell, time, path) in history {
        by_cell.entry(cell).or_default().push(Observation {
            time,
            path: decode_path(&path),
        });
    }

    Ok(rows
        .into_iter()
        .map(|(geohash, heard, lost, last_heard, hit_repeaters)| {
            let values = by_cell.remove(&geohash).unwrap_or_default();
            CoverageAggregate {
                geohash,
                heard,
                lost,
                last_heard,
                hit_repeaters: decode_path(&hit_repeaters),
                values,
            }
        })
        .collect())
}

/// Cell keys considered recent: aggregates whose `last_heard` falls inside
/// the lookback window, plus every distinct cell prefix present in the raw
/// Sample Store. Raw samples carry no separate freshness field, so all of
/// them count as recent regardless of age.
pub async fn recent_cell_keys(
    pool: &SqlitePool,
    look_back_days: i64,
    cell_precision: usize,
) -> Result<Vec<String>> {
    if look_back_days < 1 {
        return Err(StoreError::validation("look_back_days must be >= 1"));
    }
    let cutoff = geo::cutoff_ms(look_back_days);

    let mut keys: BTreeSet<String> = BTreeSet::new();

    let fresh: Vec<(String,)> =
        sqlx::query_as("SELECT geohash FROM coverage WHERE last_heard >= ?1")
            .bind(cutoff)
            .fetch_all(pool)
            .await?;
    keys.extend(fresh.into_iter().map(|(g,)| g));

    let sampled: Vec<(String,)> =
        sqlx::query_as("SELECT DISTINCT substr(geohash, 1, ?1) FROM samples")
            .bind(cell_precision as i64)
            .fetch_all(pool)
            .await?;
    keys.extend(sampled.into_iter().map(|(g,)| g));

    Ok(keys.into_iter().collect())
}

/// Rebuild a cell's aggregate from its backing history.
///
/// Collapses the history to one entry per distinct time (first-seen path
/// wins), rewrites the stored history with the collapsed set, and recomputes
/// every counter from scratch. Produces exactly what a clean fold over the
/// deduplicated history would, which makes it the authority the incremental
/// merge is checked against. Drift between the stored and recomputed
/// aggregate is logged, not fatal.
pub async fn repair(pool: &SqlitePool, geohash: &str) -> Result<CoverageAggregate> {
    let mut tx = pool.begin().await?;

    let existing: Option<(i64, i64, i64, String)> = sqlx::query_as(
        "SELECT heard, lost, last_heard, hit_repeaters FROM coverage WHERE geohash = ?1",
    )
    .bind(geohash)
    .fetch_optional(&mut *tx)
    .await?;

    let history = fetch_history(&mut *tx, geohash).await?;
    if existing.is_none() && history.is_empty() {
        return Err(StoreError::not_found(format!("coverage {}", geohash)));
    }

    // First-seen path wins per instant
    let mut grouped: BTreeMap<i64, Vec<String>> = BTreeMap::new();
    for obs in history {
        grouped.entry(obs.time).or_insert(obs.path);
    }

    sqlx::query("DELETE FROM coverage_samples WHERE coverage_geohash = ?1")
        .bind(geohash)
        .execute(&mut *tx)
        .await?;

    let mut heard = 0i64;
    let mut lost = 0i64;
    let mut last_heard = 0i64;
    let mut repeaters: BTreeSet<String> = BTreeSet::new();
    let mut values = Vec::with_capacity(grouped.len());

    for (time, path) in &grouped {
        sqlx::query(
            r#"
            INSERT INTO coverage_samples (coverage_geohash, sample_time, sample_path)
            VALUES (?1, ?2, json(?3))
            "#,
        )
        .bind(geohash)
        .bind(*time)
        .bind(encode_path(path)?)
        .execute(&mut *tx)
        .await?;

        if path.is_empty() {
            lost += 1;
        } else {
            heard += 1;
            for p in path {
                repeaters.insert(p.to_lowercase());
            }
        }
        last_heard = last_heard.max(*time);
        values.push(Observation {
            time: *time,
            path: path.clone(),
        });
    }

    let hit_repeaters: Vec<String> = repeaters.iter().cloned().collect();

    if let Some((old_heard, old_lost, old_last, ref old_set)) = existing {
        if old_heard != heard
            || old_lost != lost
            || old_last != last_heard
            || decode_path(old_set) != hit_repeaters
        {
            warn!(
                cell = geohash,
                old_heard,
                new_heard = heard,
                old_lost,
                new_lost = lost,
                "coverage drift detected, aggregate rebuilt from history"
            );
        }
    }

    sqlx::query(
        r#"
        INSERT INTO coverage (geohash, heard, lost, last_heard, hit_repeaters, updated_at)
        VALUES (?1, ?2, ?3, ?4, json(?5), ?6)
        ON CONFLICT(geohash) DO UPDATE SET
            heard = excluded.heard,
            lost = excluded.lost,
            last_heard = excluded.last_heard,
            hit_repeaters = excluded.hit_repeaters,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(geohash)
    .bind(heard)
    .bind(lost)
    .bind(last_heard)
    .bind(encode_set(&repeaters)?)
    .bind(geo::now_ms())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(CoverageAggregate {
        geohash: geohash.to_string(),
        heard,
        lost,
        last_heard,
        hit_repeaters,
        values,
    })
}

/// Remove an aggregate and its backing history.
pub async fn delete(pool: &SqlitePool, geohash: &str) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM coverage_samples WHERE coverage_geohash = ?1")
        .bind(geohash)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM coverage WHERE geohash = ?1")
        .bind(geohash)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::not_found(format!("coverage {}", geohash)));
    }
    Ok(())
}
