use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub geo: GeoConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeoConfig {
    /// Map center used for the ingest distance check and the frontend config
    /// endpoint.
    #[serde(default)]
    pub center_lat: f64,
    #[serde(default)]
    pub center_lon: f64,
    /// Samples farther than this from the center are rejected. Absent means
    /// no distance check.
    #[serde(default)]
    pub max_distance_miles: Option<f64>,
    /// Geohash precision of raw sample keys.
    #[serde(default = "default_sample_precision")]
    pub sample_precision: usize,
    /// Geohash precision of coverage cell keys. Must not exceed
    /// `sample_precision` so cells remain prefixes of sample keys.
    #[serde(default = "default_cell_precision")]
    pub cell_precision: usize,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            center_lat: 0.0,
            center_lon: 0.0,
            max_distance_miles: None,
            sample_precision: default_sample_precision(),
            cell_precision: default_cell_precision(),
        }
    }
}

fn default_sample_precision() -> usize {
    8
}
fn default_cell_precision() -> usize {
    6
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetentionConfig {
    #[serde(default = "default_sample_max_age_days")]
    pub sample_max_age_days: i64,
    #[serde(default = "default_repeater_max_age_days")]
    pub repeater_max_age_days: i64,
    #[serde(default = "default_look_back_days")]
    pub look_back_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            sample_max_age_days: default_sample_max_age_days(),
            repeater_max_age_days: default_repeater_max_age_days(),
            look_back_days: default_look_back_days(),
        }
    }
}

fn default_sample_max_age_days() -> i64 {
    180
}
fn default_repeater_max_age_days() -> i64 {
    30
}
fn default_look_back_days() -> i64 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.geo.cell_precision == 0 || config.geo.sample_precision == 0 {
        anyhow::bail!("geo precisions must be > 0");
    }
    if config.geo.cell_precision > config.geo.sample_precision {
        anyhow::bail!("geo.cell_precision must not exceed geo.sample_precision");
    }
    if config.geo.sample_precision > 12 {
        anyhow::bail!("geo.sample_precision must be <= 12");
    }
    if let Some(max) = config.geo.max_distance_miles {
        if !max.is_finite() || max <= 0.0 {
            anyhow::bail!("geo.max_distance_miles must be a positive number");
        }
    }

    if config.retention.sample_max_age_days < 1
        || config.retention.repeater_max_age_days < 1
        || config.retention.look_back_days < 1
    {
        anyhow::bail!("retention windows must be >= 1 day");
    }

    Ok(config)
}
