//! # Mesh Coverage CLI (`mcov`)
//!
//! The `mcov` binary is the primary interface to the coverage engine. It
//! provides commands for database initialization, sample submission,
//! coverage and repeater inspection, maintenance jobs, and starting the
//! JSON HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! mcov --config ./config/mcov.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mcov init` | Create the SQLite database and run schema migrations |
//! | `mcov submit` | Submit one observation (lat/lon/path) |
//! | `mcov samples` | List raw sample rows, optionally by key prefix |
//! | `mcov coverage list\|get\|delete` | Inspect or drop per-cell aggregates |
//! | `mcov recent` | List recently active cell keys |
//! | `mcov repair` | Rebuild one or all aggregates from history |
//! | `mcov evict` | Age-based eviction of samples and repeaters |
//! | `mcov purge` | Delete samples inside a time window |
//! | `mcov repeater ...` | Manage the repeater registry |
//! | `mcov serve` | Start the JSON HTTP server |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use mesh_coverage::{
    config, coverage, db, geo, ingest, maintenance, migrate, repeaters, samples, server,
};

/// Mesh Coverage CLI — folds radio coverage observations into per-cell
/// aggregate statistics.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "mcov",
    about = "Mesh coverage engine — per-cell aggregation of heard/lost radio observations",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mcov.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Idempotent.
    Init,

    /// Submit one observation.
    ///
    /// Validates the location, derives the sample and cell keys, merges the
    /// observation into the sample store, and folds it into the cell's
    /// coverage aggregate.
    Submit {
        #[arg(long)]
        lat: f64,

        #[arg(long)]
        lon: f64,

        /// Relay identifiers the signal was heard through. Omit for a loss.
        #[arg(long, value_delimiter = ',')]
        path: Vec<String>,

        /// Observation time in epoch milliseconds. Defaults to now.
        #[arg(long)]
        time: Option<i64>,
    },

    /// List raw sample rows, ordered by key.
    Samples {
        /// Only rows whose key starts with this prefix.
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Inspect or drop per-cell coverage aggregates.
    Coverage {
        #[command(subcommand)]
        action: CoverageAction,
    },

    /// List cell keys active inside the lookback window.
    Recent {
        /// Lookback window in days. Defaults to `retention.look_back_days`.
        #[arg(long)]
        days: Option<i64>,
    },

    /// Rebuild coverage aggregates from their backing history.
    Repair {
        /// Cell key to repair.
        cell: Option<String>,

        /// Repair every aggregate.
        #[arg(long, conflicts_with = "cell")]
        all: bool,
    },

    /// Evict samples and repeaters older than their retention windows.
    Evict {
        /// Override `retention.sample_max_age_days`.
        #[arg(long)]
        samples_max_age_days: Option<i64>,

        /// Override `retention.repeater_max_age_days`.
        #[arg(long)]
        repeaters_max_age_days: Option<i64>,
    },

    /// Delete samples whose time falls in `[start, end]` inclusive.
    Purge {
        #[arg(long)]
        start: i64,

        #[arg(long)]
        end: i64,
    },

    /// Manage the repeater registry.
    Repeater {
        #[command(subcommand)]
        action: RepeaterAction,
    },

    /// Start the JSON HTTP server.
    Serve,
}

/// Coverage subcommands.
#[derive(Subcommand)]
enum CoverageAction {
    /// List all aggregates.
    List,
    /// Show one aggregate with its backing history.
    Get { cell: String },
    /// Remove an aggregate and its history.
    Delete { cell: String },
}

/// Repeater subcommands.
#[derive(Subcommand)]
enum RepeaterAction {
    /// List all known repeater rows.
    List,
    /// Show every location row for one id, newest first.
    Get { id: String },
    /// Create or refresh a sighting.
    Set {
        #[arg(long)]
        id: String,
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lon: f64,
        #[arg(long)]
        name: String,
        #[arg(long)]
        elev: Option<f64>,
        /// Sighting time in epoch milliseconds. Defaults to now.
        #[arg(long)]
        time: Option<i64>,
    },
    /// Remove one location row.
    Delete {
        #[arg(long)]
        id: String,
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lon: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mesh_coverage=info,mcov=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Submit {
            lat,
            lon,
            path,
            time,
        } => {
            let pool = db::connect(&cfg).await?;
            let receipt = ingest::submit(&pool, &cfg.geo, lat, lon, &path, time).await?;
            println!("submit");
            println!("  sample key: {}", receipt.sample_key);
            println!("  cell key: {}", receipt.cell_key);
            println!("  time: {}", receipt.time);
            println!(
                "  merged: {} new, {} duplicate",
                receipt.merge.accepted, receipt.merge.duplicates
            );
            println!("ok");
            pool.close().await;
        }
        Commands::Samples { prefix } => {
            let pool = db::connect(&cfg).await?;
            let rows = samples::list_by_prefix(&pool, prefix.as_deref()).await?;
            println!("samples: {}", rows.len());
            for row in rows {
                println!("  {}  time={}  path={}", row.geohash, row.time, row.path.join(","));
            }
            pool.close().await;
        }
        Commands::Coverage { action } => {
            let pool = db::connect(&cfg).await?;
            match action {
                CoverageAction::List => {
                    let all = coverage::get_all(&pool).await?;
                    println!("coverage cells: {}", all.len());
                    for agg in all {
                        println!(
                            "  {}  heard={} lost={} lastHeard={} repeaters={}",
                            agg.geohash,
                            agg.heard,
                            agg.lost,
                            agg.last_heard,
                            agg.hit_repeaters.join(",")
                        );
                    }
                }
                CoverageAction::Get { cell } => {
                    let agg = coverage::get(&pool, &cell).await?;
                    print_aggregate(&agg);
                }
                CoverageAction::Delete { cell } => {
                    coverage::delete(&pool, &cell).await?;
                    println!("deleted coverage {}", cell);
                }
            }
            pool.close().await;
        }
        Commands::Recent { days } => {
            let pool = db::connect(&cfg).await?;
            let days = days.unwrap_or(cfg.retention.look_back_days);
            let keys = coverage::recent_cell_keys(&pool, days, cfg.geo.cell_precision).await?;
            println!("recent cells ({} day lookback): {}", days, keys.len());
            for key in keys {
                println!("  {}", key);
            }
            pool.close().await;
        }
        Commands::Repair { cell, all } => {
            let pool = db::connect(&cfg).await?;
            match (cell, all) {
                (Some(cell), _) => {
                    let agg = coverage::repair(&pool, &cell).await?;
                    println!("repaired {}", agg.geohash);
                    print_aggregate(&agg);
                }
                (None, true) => {
                    let report = maintenance::repair_all(&pool).await?;
                    println!("repair all");
                    println!("  repaired: {}", report.repaired);
                    println!("  failed: {}", report.failed);
                    println!("ok");
                }
                (None, false) => {
                    anyhow::bail!("specify a cell key or --all");
                }
            }
            pool.close().await;
        }
        Commands::Evict {
            samples_max_age_days,
            repeaters_max_age_days,
        } => {
            let pool = db::connect(&cfg).await?;
            let report = maintenance::evict(
                &pool,
                samples_max_age_days.unwrap_or(cfg.retention.sample_max_age_days),
                repeaters_max_age_days.unwrap_or(cfg.retention.repeater_max_age_days),
            )
            .await?;
            println!("evict");
            println!("  samples archived: {}", report.samples_archived);
            println!("  samples deleted: {}", report.samples_deleted);
            println!("  repeaters deleted: {}", report.repeaters_deleted);
            println!("ok");
            pool.close().await;
        }
        Commands::Purge { start, end } => {
            let pool = db::connect(&cfg).await?;
            let deleted = maintenance::purge_window(&pool, start, end).await?;
            println!("purged {} samples in [{}, {}]", deleted, start, end);
            pool.close().await;
        }
        Commands::Repeater { action } => {
            let pool = db::connect(&cfg).await?;
            match action {
                RepeaterAction::List => {
                    let rows = repeaters::list(&pool).await?;
                    println!("repeaters: {}", rows.len());
                    for r in rows {
                        print_repeater(&r);
                    }
                }
                RepeaterAction::Get { id } => {
                    let rows = repeaters::get_by_id(&pool, &id).await?;
                    if rows.is_empty() {
                        anyhow::bail!("not found: repeater {}", id);
                    }
                    for r in rows {
                        print_repeater(&r);
                    }
                }
                RepeaterAction::Set {
                    id,
                    lat,
                    lon,
                    name,
                    elev,
                    time,
                } => {
                    let time = time.unwrap_or_else(geo::now_ms);
                    repeaters::upsert(&pool, &id, lat, lon, &name, elev, time).await?;
                    let row = repeaters::get_by_location(&pool, &id, lat, lon).await?;
                    print_repeater(&row);
                    println!("ok");
                }
                RepeaterAction::Delete { id, lat, lon } => {
                    repeaters::delete_by_location(&pool, &id, lat, lon).await?;
                    println!("deleted repeater {} at ({}, {})", id, lat, lon);
                }
            }
            pool.close().await;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

fn print_aggregate(agg: &mesh_coverage::models::CoverageAggregate) {
    println!("cell: {}", agg.geohash);
    println!("  heard: {}", agg.heard);
    println!("  lost: {}", agg.lost);
    println!("  lastHeard: {}", agg.last_heard);
    println!("  hitRepeaters: {}", agg.hit_repeaters.join(","));
    println!("  history: {} entries", agg.values.len());
    for v in &agg.values {
        println!("    time={}  path={}", v.time, v.path.join(","));
    }
}

fn print_repeater(r: &mesh_coverage::models::Repeater) {
    let elev = r
        .elev
        .map(|e| e.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "  {}  ({}, {})  name={}  elev={}  time={}",
        r.id, r.lat, r.lon, r.name, elev, r.time
    );
}
