//! Sample submission pipeline.
//!
//! Coordinates the full ingest flow for one observation: validation →
//! path normalization → key derivation → Sample Store upsert → Coverage
//! Aggregator merge. Validation failures reject the submission before any
//! store mutation.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::GeoConfig;
use crate::coverage;
use crate::error::{Result, StoreError};
use crate::geo;
use crate::models::{MergeOutcome, Observation};
use crate::samples;

/// Ack returned to the submitter: which keys the observation landed under.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitReceipt {
    pub sample_key: String,
    pub cell_key: String,
    pub time: i64,
    pub merge: MergeOutcome,
}

pub async fn submit(
    pool: &SqlitePool,
    geo_cfg: &GeoConfig,
    lat: f64,
    lon: f64,
    path: &[String],
    time: Option<i64>,
) -> Result<SubmitReceipt> {
    geo::validate_location(lat, lon)?;

    if let Some(max_miles) = geo_cfg.max_distance_miles {
        let dist = geo::distance_miles(geo_cfg.center_lat, geo_cfg.center_lon, lat, lon);
        if dist > max_miles {
            return Err(StoreError::validation(format!(
                "location exceeds max distance: {:.1} miles from center (limit {})",
                dist, max_miles
            )));
        }
    }

    let path = geo::normalize_path(path)?;

    let time = time.unwrap_or_else(geo::now_ms);
    if time <= 0 {
        return Err(StoreError::validation("time must be positive epoch millis"));
    }

    let sample_key = geo::encode(lat, lon, geo_cfg.sample_precision);
    let cell_key = geo::encode(lat, lon, geo_cfg.cell_precision);

    samples::upsert(pool, &sample_key, time, &path).await?;
    let merge = coverage::merge(
        pool,
        &cell_key,
        &[Observation {
            time,
            path: path.clone(),
        }],
    )
    .await?;

    Ok(SubmitReceipt {
        sample_key,
        cell_key,
        time,
        merge,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    fn geo_cfg() -> GeoConfig {
        GeoConfig {
            center_lat: 37.7749,
            center_lon: -122.4194,
            max_distance_miles: Some(100.0),
            ..GeoConfig::default()
        }
    }

    #[tokio::test]
    async fn test_submit_writes_sample_and_coverage() {
        let pool = memory_pool().await;

        let receipt = submit(
            &pool,
            &geo_cfg(),
            37.7749,
            -122.4194,
            &["Rpt1".to_string()],
            Some(5000),
        )
        .await
        .unwrap();

        assert_eq!(receipt.sample_key, "9q8yyk8y");
        assert_eq!(receipt.cell_key, "9q8yyk");
        assert!(receipt.sample_key.starts_with(&receipt.cell_key));
        assert_eq!(receipt.merge.accepted, 1);

        let sample = samples::get(&pool, "9q8yyk8y").await.unwrap();
        assert_eq!(sample.path, vec!["rpt1"]);

        let agg = coverage::get(&pool, "9q8yyk").await.unwrap();
        assert_eq!(agg.heard, 1);
        assert_eq!(agg.last_heard, 5000);
    }

    #[tokio::test]
    async fn test_submit_rejects_far_location_before_write() {
        let pool = memory_pool().await;

        // Los Angeles is well outside the 100 mile limit
        let err = submit(&pool, &geo_cfg(), 34.0522, -118.2437, &[], Some(1000)).await;
        assert!(matches!(err, Err(StoreError::Validation(_))));

        assert!(samples::list_by_prefix(&pool, None).await.unwrap().is_empty());
        assert!(coverage::get_all(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_defaults_time_to_now() {
        let pool = memory_pool().await;

        let before = geo::now_ms();
        let receipt = submit(&pool, &geo_cfg(), 37.7749, -122.4194, &[], None)
            .await
            .unwrap();
        assert!(receipt.time >= before);
    }
}
