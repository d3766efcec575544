//! Pipeline configuration
//!
//! Loads tunables from environment variables with sensible defaults.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::capture::{CaptureConfig, DEFAULT_CAPTURE_INTERVAL, DEFAULT_TARGET_SAMPLES};
use crate::liveness::{GateConfig, DEFAULT_LIVENESS_THRESHOLD};
use crate::verification::{MatchConfig, DEFAULT_MATCH_K, DEFAULT_MAX_DISTANCE};

/// Default location of the persisted gallery.
pub const DEFAULT_GALLERY_PATH: &str = "liveid-gallery.json";

/// Configuration for the whole pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct LiveIdConfig {
    /// Liveness acceptance threshold and classifier timeout
    pub gate: GateConfig,
    /// Enrollment cadence and sample target
    pub capture: CaptureConfig,
    /// KNN parameters
    pub matching: MatchConfig,
    /// Gallery snapshot file (default: liveid-gallery.json)
    pub gallery_path: PathBuf,
}

impl Default for LiveIdConfig {
    fn default() -> Self {
        Self {
            gate: GateConfig::default(),
            capture: CaptureConfig::default(),
            matching: MatchConfig::default(),
            gallery_path: PathBuf::from(DEFAULT_GALLERY_PATH),
        }
    }
}

impl LiveIdConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable values keep their defaults:
    /// `LIVENESS_THRESHOLD`, `LIVENESS_TIMEOUT_SECS`, `CAPTURE_INTERVAL_MS`,
    /// `CAPTURE_TARGET_SAMPLES`, `MATCH_K`, `MATCH_MAX_DISTANCE`, `LIVEID_GALLERY`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = GateConfig::default();
        let threshold = match parse_or(&lookup, "LIVENESS_THRESHOLD", DEFAULT_LIVENESS_THRESHOLD) {
            t if t.is_finite() => t.clamp(0.0, 1.0),
            _ => DEFAULT_LIVENESS_THRESHOLD,
        };
        let timeout = lookup("LIVENESS_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .filter(|secs: &u64| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        let interval = lookup("CAPTURE_INTERVAL_MS")
            .and_then(|v| v.parse().ok())
            .filter(|ms: &u64| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_CAPTURE_INTERVAL);
        let target = positive_or(&lookup, "CAPTURE_TARGET_SAMPLES", DEFAULT_TARGET_SAMPLES);

        let k = positive_or(&lookup, "MATCH_K", DEFAULT_MATCH_K);
        let max_distance = parse_or(&lookup, "MATCH_MAX_DISTANCE", DEFAULT_MAX_DISTANCE);
        let max_distance = if max_distance.is_finite() && max_distance >= 0.0 {
            max_distance
        } else {
            DEFAULT_MAX_DISTANCE
        };

        let gallery_path = lookup("LIVEID_GALLERY")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_GALLERY_PATH));

        Self {
            gate: GateConfig { threshold, timeout },
            capture: CaptureConfig { interval, target },
            matching: MatchConfig { k, max_distance },
            gallery_path,
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn positive_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    match parse_or(lookup, key, default) {
        0 => default,
        n => n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = LiveIdConfig::from_lookup(lookup(&[]));
        assert_eq!(config, LiveIdConfig::default());
        assert_eq!(config.gate.threshold, 0.6);
        assert_eq!(config.capture.target, 20);
        assert_eq!(config.capture.interval, Duration::from_millis(200));
        assert_eq!(config.matching.k, 5);
    }

    #[test]
    fn test_overrides() {
        let config = LiveIdConfig::from_lookup(lookup(&[
            ("LIVENESS_THRESHOLD", "0.8"),
            ("LIVENESS_TIMEOUT_SECS", "3"),
            ("CAPTURE_INTERVAL_MS", "50"),
            ("CAPTURE_TARGET_SAMPLES", "8"),
            ("MATCH_K", "3"),
            ("MATCH_MAX_DISTANCE", "0.25"),
            ("LIVEID_GALLERY", "/tmp/gallery.json"),
        ]));
        assert_eq!(config.gate.threshold, 0.8);
        assert_eq!(config.gate.timeout, Duration::from_secs(3));
        assert_eq!(config.capture.interval, Duration::from_millis(50));
        assert_eq!(config.capture.target, 8);
        assert_eq!(config.matching.k, 3);
        assert_eq!(config.matching.max_distance, 0.25);
        assert_eq!(config.gallery_path, PathBuf::from("/tmp/gallery.json"));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = LiveIdConfig::from_lookup(lookup(&[
            ("LIVENESS_THRESHOLD", "NaN"),
            ("CAPTURE_INTERVAL_MS", "0"),
            ("CAPTURE_TARGET_SAMPLES", "0"),
            ("MATCH_K", "-1"),
            ("MATCH_MAX_DISTANCE", "-2"),
            ("LIVEID_GALLERY", ""),
        ]));
        assert_eq!(config, LiveIdConfig::default());
    }

    #[test]
    fn test_threshold_clamped() {
        let config = LiveIdConfig::from_lookup(lookup(&[("LIVENESS_THRESHOLD", "1.5")]));
        assert_eq!(config.gate.threshold, 1.0);
    }
}
