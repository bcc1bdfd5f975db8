//! # Mesh Coverage
//!
//! A SQLite-backed engine that folds sparse, duplicate-prone, out-of-order
//! radio coverage observations into persistent per-cell statistics.
//!
//! Devices report whether a signal was heard at a location and along which
//! relay path. Each report is keyed by geohash, merged into a denormalized
//! sample row, and folded into a per-cell coverage aggregate whose counters
//! stay correct under replay and concurrent submission. A repeater registry
//! tracks known relay identities per `(id, location)`, and maintenance jobs
//! bound growth and heal drift.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────────┐   ┌───────────────┐
//! │  Submit   │──▶│ Sample Store    │   │   SQLite      │
//! │ lat/lon/  │   │ (denormalized)  │──▶│ samples       │
//! │ path      │   ├─────────────────┤   │ coverage      │
//! └──────────┘   │ Coverage merge  │──▶│ + history     │
//!                 │ (delta-only)    │   │ repeaters     │
//!                 └─────────────────┘   └──────┬────────┘
//!                                             │
//!                          ┌──────────────────┤
//!                          ▼                  ▼
//!                    ┌──────────┐       ┌──────────┐
//!                    │   CLI    │       │   HTTP   │
//!                    │  (mcov)  │       │  (JSON)  │
//!                    └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! mcov init                                   # create database
//! mcov submit --lat 37.77 --lon -122.42 --path rpt1
//! mcov coverage get 9q8yyk                    # per-cell aggregate
//! mcov repair --all                           # rebuild aggregates from history
//! mcov serve                                  # start JSON HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`geo`] | Geohash encoding and coordinate validation |
//! | [`samples`] | Denormalized per-cell sample store |
//! | [`coverage`] | Aggregate merge, read, and repair operations |
//! | [`repeaters`] | Relay identity registry |
//! | [`ingest`] | Sample submission pipeline |
//! | [`maintenance`] | Retention eviction and repair jobs |
//! | [`server`] | JSON HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`error`] | Store error kinds |

pub mod config;
pub mod coverage;
pub mod db;
pub mod error;
pub mod geo;
pub mod ingest;
pub mod maintenance;
pub mod migrate;
pub mod models;
pub mod repeaters;
pub mod samples;
pub mod server;
