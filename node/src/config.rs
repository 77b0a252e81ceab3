// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rowjournal_kernel::config::{
    DEFAULT_FAILURE_BACKOFF_MS, DEFAULT_MAX_FAILURE_BACKOFF_MS, DEFAULT_MAX_GAP_WAIT_CYCLES,
    DEFAULT_PAGE_SIZE, DEFAULT_POLL_INTERVAL_MS, DEFAULT_POOL_SIZE,
};
use rowjournal_kernel::{router_for, PartitionStrategy};
use serde::Deserialize;

use crate::errors::{JournalError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub page_size: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Knobs of the gapless ordering tracker.
///
/// `max_gap_wait_cycles` trades completeness for liveness: a low value lets
/// consumers move past a rolled-back offset quickly but may skip a write whose
/// transaction commits slower than `poll_interval * max_gap_wait_cycles`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub poll_interval_ms: u64,
    pub max_gap_wait_cycles: u32,
    pub failure_backoff_ms: u64,
    pub max_failure_backoff_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_gap_wait_cycles: DEFAULT_MAX_GAP_WAIT_CYCLES,
            failure_backoff_ms: DEFAULT_FAILURE_BACKOFF_MS,
            max_failure_backoff_ms: DEFAULT_MAX_FAILURE_BACKOFF_MS,
        }
    }
}

impl TrackerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }

    pub fn max_failure_backoff(&self) -> Duration {
        Duration::from_millis(self.max_failure_backoff_ms.max(self.failure_backoff_ms))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Storage registry key, `sqlite` or `memory` out of the box.
    pub backend: String,
    pub database_path: PathBuf,
    pub pool_size: usize,
    pub partitioning: PartitionStrategy,
    pub replay: ReplayConfig,
    pub tracker: TrackerConfig,
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            database_path: PathBuf::from("rowjournal.db"),
            pool_size: DEFAULT_POOL_SIZE,
            partitioning: PartitionStrategy::Plain,
            replay: ReplayConfig::default(),
            tracker: TrackerConfig::default(),
            metrics_addr: None,
        }
    }
}

impl JournalConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| JournalError::Config(format!("reading {}: {}", path.display(), e)))?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).map_err(|e| JournalError::Config(e.to_string()))
    }

    /// Applies `ROWJOURNAL_*` overrides from the process environment.
    pub fn from_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ROWJOURNAL_BACKEND") {
            self.backend = v;
        }
        if let Some(v) = lookup("ROWJOURNAL_DATABASE_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROWJOURNAL_POOL_SIZE") {
            self.pool_size = parse_var("ROWJOURNAL_POOL_SIZE", &v)?;
        }
        if let Some(v) = lookup("ROWJOURNAL_PAGE_SIZE") {
            self.replay.page_size = parse_var("ROWJOURNAL_PAGE_SIZE", &v)?;
        }
        if let Some(v) = lookup("ROWJOURNAL_POLL_INTERVAL_MS") {
            self.tracker.poll_interval_ms = parse_var("ROWJOURNAL_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("ROWJOURNAL_MAX_GAP_WAIT_CYCLES") {
            self.tracker.max_gap_wait_cycles = parse_var("ROWJOURNAL_MAX_GAP_WAIT_CYCLES", &v)?;
        }
        if let Some(v) = lookup("ROWJOURNAL_PARTITIONING") {
            self.partitioning = serde_json::from_str(&v)
                .map_err(|e| JournalError::Config(format!("ROWJOURNAL_PARTITIONING: {}", e)))?;
        }
        if let Some(v) = lookup("ROWJOURNAL_METRICS_ADDR") {
            self.metrics_addr = Some(parse_var("ROWJOURNAL_METRICS_ADDR", &v)?);
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(JournalError::Config("pool_size must be > 0".into()));
        }
        if self.replay.page_size == 0 {
            return Err(JournalError::Config("replay.page_size must be > 0".into()));
        }
        if self.tracker.poll_interval_ms == 0 {
            return Err(JournalError::Config("tracker.poll_interval_ms must be > 0".into()));
        }
        router_for(&self.partitioning).map_err(|e| JournalError::Config(e.to_string()))?;
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| JournalError::Config(format!("{}={:?}: {}", key, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = JournalConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.backend, "sqlite");
        assert_eq!(cfg.replay.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg = JournalConfig::from_json_str(
            r#"{
                "backend": "memory",
                "partitioning": {"kind": "partitioned", "partitions": 16},
                "tracker": {"max_gap_wait_cycles": 3}
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.backend, "memory");
        assert_eq!(cfg.partitioning, PartitionStrategy::Partitioned { partitions: 16 });
        assert_eq!(cfg.tracker.max_gap_wait_cycles, 3);
        assert_eq!(cfg.tracker.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(cfg.pool_size, DEFAULT_POOL_SIZE);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("ROWJOURNAL_PAGE_SIZE", "64"),
            ("ROWJOURNAL_MAX_GAP_WAIT_CYCLES", "7"),
            ("ROWJOURNAL_PARTITIONING", r#"{"kind":"plain"}"#),
        ]
        .into_iter()
        .collect();
        let cfg = JournalConfig::default()
            .with_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.replay.page_size, 64);
        assert_eq!(cfg.tracker.max_gap_wait_cycles, 7);
    }

    #[test]
    fn test_bad_override_is_config_error() {
        let res = JournalConfig::default().with_overrides(|k| {
            (k == "ROWJOURNAL_POOL_SIZE").then(|| "many".to_string())
        });
        assert!(matches!(res, Err(JournalError::Config(_))));
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let mut cfg = JournalConfig::default();
        cfg.replay.page_size = 0;
        assert!(cfg.validate().is_err());
    }
}
