use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Denormalized per-cell sample rows: newest time + union of paths
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS samples (
            geohash TEXT PRIMARY KEY,
            time INTEGER NOT NULL,
            path TEXT NOT NULL DEFAULT '[]',
            updated_at INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Per-cell aggregate counters
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS coverage (
            geohash TEXT PRIMARY KEY,
            heard INTEGER NOT NULL DEFAULT 0,
            lost INTEGER NOT NULL DEFAULT 0,
            last_heard INTEGER NOT NULL DEFAULT 0,
            hit_repeaters TEXT NOT NULL DEFAULT '[]',
            updated_at INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Backing history: at most one entry per (cell, instant)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS coverage_samples (
            coverage_geohash TEXT NOT NULL,
            sample_time INTEGER NOT NULL,
            sample_path TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY (coverage_geohash, sample_time)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Repeater sightings, one row per (id, location)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repeaters (
            id TEXT NOT NULL,
            lat REAL NOT NULL,
            lon REAL NOT NULL,
            name TEXT NOT NULL,
            elev REAL,
            time INTEGER NOT NULL,
            updated_at INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (id, lat, lon)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Stale samples are parked here before eviction deletes them
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS archive (
            geohash TEXT PRIMARY KEY,
            time INTEGER NOT NULL,
            path TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_samples_time ON samples(time)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_coverage_last_heard ON coverage(last_heard DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_repeaters_time ON repeaters(time)")
        .execute(pool)
        .await?;

    Ok(())
}
