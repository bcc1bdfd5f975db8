//! Core data models used throughout the coverage engine.
//!
//! These types represent the samples, per-cell aggregates, and repeater
//! records that flow between the ingestion path, the stores, and the API.

use serde::{Deserialize, Serialize};

/// Denormalized per-cell sample row: the union of all relay paths ever seen
/// for that cell and the newest observation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub geohash: String,
    pub time: i64,
    pub path: Vec<String>,
}

/// One `(time, path)` entry in a cell's backing history. An empty path means
/// the signal was not heard at that instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub time: i64,
    pub path: Vec<String>,
}

/// Per-cell summary statistics plus the ordered history they were folded
/// from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageAggregate {
    pub geohash: String,
    pub heard: i64,
    pub lost: i64,
    #[serde(rename = "lastHeard")]
    pub last_heard: i64,
    #[serde(rename = "hitRepeaters")]
    pub hit_repeaters: Vec<String>,
    pub values: Vec<Observation>,
}

/// A known repeater sighting. Identity is `(id, lat, lon)`; the same id may
/// legitimately have rows at several coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repeater {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub name: String,
    pub elev: Option<f64>,
    pub time: i64,
}

/// Counts returned by a coverage merge: how many samples were genuinely new
/// versus already present at their instant.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MergeOutcome {
    pub accepted: u64,
    pub duplicates: u64,
}
