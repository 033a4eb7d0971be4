use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;

use crate::error::SnapshotError;
use crate::heatmap::HeatmapConfig;

/// Run-level settings. Each field falls back to its default when the
/// environment variable is unset or unparseable.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub gauge_path: PathBuf,
    pub retention_days: i64,
    pub timezone: Tz,
    pub heatmap: HeatmapConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            gauge_path: PathBuf::from("frontend/fear_and_greed_gauge.svg"),
            retention_days: 7,
            timezone: chrono_tz::Asia::Tokyo,
            heatmap: HeatmapConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, SnapshotError> {
        let defaults = Self::default();

        let timezone = match std::env::var("SNAPSHOT_TIMEZONE") {
            Ok(name) => Tz::from_str(name.trim())
                .map_err(|e| SnapshotError::Config(format!("SNAPSHOT_TIMEZONE={}: {}", name, e)))?,
            Err(_) => defaults.timezone,
        };

        let heatmap = HeatmapConfig {
            batch_size: env_or("HEATMAP_BATCH_SIZE", defaults.heatmap.batch_size).max(1),
            batch_pause: env_millis("HEATMAP_BATCH_PAUSE_MS").unwrap_or(defaults.heatmap.batch_pause),
            failure_pause: env_millis("HEATMAP_FAILURE_PAUSE_MS").unwrap_or(defaults.heatmap.failure_pause),
            lookback_days: env_or("HEATMAP_LOOKBACK_DAYS", defaults.heatmap.lookback_days),
        };

        Ok(Self {
            data_dir: std::env::var("SNAPSHOT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            gauge_path: std::env::var("SNAPSHOT_GAUGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.gauge_path),
            retention_days: env_or("SNAPSHOT_RETENTION_DAYS", defaults.retention_days),
            timezone,
            heatmap,
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.timezone, chrono_tz::Asia::Tokyo);
        assert_eq!(config.heatmap.batch_size, 30);
        assert_eq!(config.heatmap.batch_pause, Duration::from_secs(3));
        assert_eq!(config.heatmap.failure_pause, Duration::from_millis(500));
    }

    #[test]
    fn test_env_or_falls_back() {
        assert_eq!(env_or("SNAPSHOT_TEST_UNSET_KEY", 42_i64), 42);
    }
}
