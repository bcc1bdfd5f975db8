//! Geohash encoding, coordinate validation, and time helpers.
//!
//! Cell keys are standard base-32 geohashes at a fixed precision. The cell
//! key used for coverage aggregation is a prefix of the finer-grained
//! sample key, so the two stay joinable by prefix.

use crate::error::{Result, StoreError};

const BASE32: &[u8] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Earth radius in miles, for the ingest distance check.
const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Encode a coordinate pair into a geohash of the given precision.
pub fn encode(lat: f64, lon: f64, precision: usize) -> String {
    let mut lat_lo = -90.0f64;
    let mut lat_hi = 90.0f64;
    let mut lon_lo = -180.0f64;
    let mut lon_hi = 180.0f64;

    let mut out = String::with_capacity(precision);
    let mut bits = 0u8;
    let mut ch = 0usize;
    let mut even = true;

    while out.len() < precision {
        if even {
            let mid = (lon_lo + lon_hi) / 2.0;
            if lon >= mid {
                ch = (ch << 1) | 1;
                lon_lo = mid;
            } else {
                ch <<= 1;
                lon_hi = mid;
            }
        } else {
            let mid = (lat_lo + lat_hi) / 2.0;
            if lat >= mid {
                ch = (ch << 1) | 1;
                lat_lo = mid;
            } else {
                ch <<= 1;
                lat_hi = mid;
            }
        }
        even = !even;
        bits += 1;
        if bits == 5 {
            out.push(BASE32[ch] as char);
            bits = 0;
            ch = 0;
        }
    }

    out
}

/// Reject non-finite or out-of-range coordinates before any store mutation.
pub fn validate_location(lat: f64, lon: f64) -> Result<()> {
    if !lat.is_finite() || !lon.is_finite() {
        return Err(StoreError::validation("invalid location: non-finite coordinate"));
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(StoreError::validation(format!(
            "invalid location: latitude {} out of range",
            lat
        )));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(StoreError::validation(format!(
            "invalid location: longitude {} out of range",
            lon
        )));
    }
    Ok(())
}

/// Great-circle distance in miles.
pub fn distance_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * a.sqrt().asin()
}

/// Normalize a relay path: trim, reject empty entries, lower-case.
pub fn normalize_path(path: &[String]) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(path.len());
    for entry in path {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            return Err(StoreError::validation("path entries must be non-empty strings"));
        }
        out.push(trimmed.to_lowercase());
    }
    Ok(out)
}

/// Current time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Retention cutoff: everything with `time` strictly older than this is
/// considered stale.
pub fn cutoff_ms(max_age_days: i64) -> i64 {
    now_ms() - max_age_days * 24 * 60 * 60 * 1000
}
