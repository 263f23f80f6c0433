//! Publisher configuration.

use crate::replay::CorruptEntryPolicy;
use crate::wal_store::DEFAULT_WAL_PATH;
use crate::{OutboxError, OutboxResult, RetryStrategy};
use bloodbank_cli_ops::DEFAULT_TIMEOUT_SECS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Default number of delivery attempts per publish.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default fixed delay between attempts, in seconds.
pub const DEFAULT_RETRY_DELAY_SECONDS: f64 = 1.0;

/// Publisher configuration, read from camelCase JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublisherConfig {
    /// Delivery attempts per publish (not extra retries).
    pub max_retries: u32,
    /// Delay between attempts for the fixed strategy.
    pub retry_delay_seconds: f64,
    pub retry_strategy: RetryStrategyConfig,
    /// Append to the WAL before delivery.
    pub enable_wal: bool,
    pub wal_path: PathBuf,
    /// Re-probe an unavailable bus once this much time has passed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reprobe_after_seconds: Option<f64>,
    pub corrupt_entries: CorruptEntryPolicy,
    /// Timeout for a single `bb` invocation.
    pub command_timeout_seconds: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_seconds: DEFAULT_RETRY_DELAY_SECONDS,
            retry_strategy: RetryStrategyConfig::Fixed,
            enable_wal: true,
            wal_path: PathBuf::from(DEFAULT_WAL_PATH),
            reprobe_after_seconds: None,
            corrupt_entries: CorruptEntryPolicy::Retain,
            command_timeout_seconds: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Serialized form of [`RetryStrategy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RetryStrategyConfig {
    /// Uses `retryDelaySeconds` between attempts.
    Fixed,
    #[serde(rename_all = "camelCase")]
    Exponential {
        #[serde(default = "default_initial_seconds")]
        initial_seconds: f64,
        #[serde(default = "default_max_seconds")]
        max_seconds: f64,
        #[serde(default = "default_factor")]
        factor: f64,
        #[serde(default)]
        jitter: bool,
    },
}

fn default_initial_seconds() -> f64 {
    1.0
}

fn default_max_seconds() -> f64 {
    30.0
}

fn default_factor() -> f64 {
    2.0
}

impl PublisherConfig {
    /// Load from `path` (or defaults), apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> OutboxResult<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> OutboxResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            OutboxError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|err| {
            OutboxError::Config(format!("invalid config {}: {err}", path.display()))
        })
    }

    /// Override fields from `BLOODBANK_*` environment variables.
    pub fn load_from_env(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = parsed(&lookup, "BLOODBANK_MAX_RETRIES", |s| s.parse().ok()) {
            self.max_retries = value;
        }
        if let Some(value) = parsed(&lookup, "BLOODBANK_RETRY_DELAY_SECONDS", |s| s.parse().ok()) {
            self.retry_delay_seconds = value;
        }
        if let Some(value) = parsed(&lookup, "BLOODBANK_ENABLE_WAL", parse_bool) {
            self.enable_wal = value;
        }
        if let Some(value) = lookup("BLOODBANK_WAL_PATH") {
            let value = value.trim();
            if !value.is_empty() {
                self.wal_path = PathBuf::from(value);
            }
        }
        if let Some(value) =
            parsed(&lookup, "BLOODBANK_REPROBE_AFTER_SECONDS", |s| s.parse().ok())
        {
            self.reprobe_after_seconds = Some(value);
        }
    }

    /// Reject values that cannot drive a publisher.
    pub fn validate(&self) -> OutboxResult<()> {
        if self.max_retries == 0 {
            return Err(OutboxError::Config("maxRetries must be >= 1".into()));
        }
        check_seconds("retryDelaySeconds", self.retry_delay_seconds)?;
        if let Some(secs) = self.reprobe_after_seconds {
            check_seconds("reprobeAfterSeconds", secs)?;
        }
        if let RetryStrategyConfig::Exponential {
            initial_seconds,
            max_seconds,
            factor,
            ..
        } = self.retry_strategy
        {
            check_seconds("retryStrategy.initialSeconds", initial_seconds)?;
            check_seconds("retryStrategy.maxSeconds", max_seconds)?;
            if !factor.is_finite() || factor < 1.0 {
                return Err(OutboxError::Config(
                    "retryStrategy.factor must be a finite number >= 1".into(),
                ));
            }
            if max_seconds < initial_seconds {
                return Err(OutboxError::Config(
                    "retryStrategy.maxSeconds must be >= initialSeconds".into(),
                ));
            }
        }
        if self.wal_path.as_os_str().is_empty() {
            return Err(OutboxError::Config("walPath must not be empty".into()));
        }
        if let CorruptEntryPolicy::Quarantine { path } = &self.corrupt_entries {
            if path.as_os_str().is_empty() {
                return Err(OutboxError::Config(
                    "corruptEntries.path must not be empty".into(),
                ));
            }
            if path == &self.wal_path {
                return Err(OutboxError::Config(
                    "corruptEntries.path must differ from walPath".into(),
                ));
            }
        }
        if self.command_timeout_seconds == 0 {
            return Err(OutboxError::Config(
                "commandTimeoutSeconds must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// The delay strategy the retrier should use.
    pub fn retry_strategy(&self) -> RetryStrategy {
        match self.retry_strategy {
            RetryStrategyConfig::Fixed => RetryStrategy::fixed(seconds(self.retry_delay_seconds)),
            RetryStrategyConfig::Exponential {
                initial_seconds,
                max_seconds,
                factor,
                jitter,
            } => RetryStrategy::Exponential {
                initial: seconds(initial_seconds),
                max: seconds(max_seconds),
                factor,
                jitter,
            },
        }
    }

    pub fn reprobe_after(&self) -> Option<Duration> {
        self.reprobe_after_seconds.map(seconds)
    }
}

fn parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = lookup(key)?;
    let value = parse(raw.trim());
    if value.is_none() {
        warn!(key, value = %raw, "Ignoring unparseable environment override");
    }
    value
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn check_seconds(name: &str, value: f64) -> OutboxResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(OutboxError::Config(format!(
            "{name} must be a finite, non-negative number of seconds"
        )))
    }
}

fn seconds(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = PublisherConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_seconds, 1.0);
        assert!(config.enable_wal);
        assert_eq!(config.wal_path, PathBuf::from("raw_voice_ingest.jsonl"));
        assert_eq!(config.corrupt_entries, CorruptEntryPolicy::Retain);
        assert_eq!(config.retry_strategy(), RetryStrategy::default());
        assert!(config.reprobe_after().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file_camel_case() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("publisher.json");
        std::fs::write(
            &path,
            r#"{
                "maxRetries": 5,
                "walPath": "/var/spool/voice.jsonl",
                "retryStrategy": {"kind": "exponential", "initialSeconds": 0.5, "maxSeconds": 8, "jitter": true},
                "corruptEntries": {"policy": "quarantine", "path": "/var/spool/voice.dead.jsonl"},
                "reprobeAfterSeconds": 60
            }"#,
        )
        .unwrap();

        let config = PublisherConfig::load_from_file(&path).unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay_seconds, 1.0);
        assert_eq!(config.wal_path, PathBuf::from("/var/spool/voice.jsonl"));
        assert_eq!(
            config.retry_strategy(),
            RetryStrategy::Exponential {
                initial: Duration::from_millis(500),
                max: Duration::from_secs(8),
                factor: 2.0,
                jitter: true,
            }
        );
        assert_eq!(
            config.corrupt_entries,
            CorruptEntryPolicy::Quarantine {
                path: PathBuf::from("/var/spool/voice.dead.jsonl")
            }
        );
        assert_eq!(config.reprobe_after(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_load_from_file_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = PublisherConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(err, OutboxError::Config(ref msg) if msg.contains("broken.json")));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = PublisherConfig::default();
        config.apply_env(env(&[
            ("BLOODBANK_MAX_RETRIES", "7"),
            ("BLOODBANK_RETRY_DELAY_SECONDS", "0.25"),
            ("BLOODBANK_ENABLE_WAL", "false"),
            ("BLOODBANK_WAL_PATH", "/tmp/other.jsonl"),
            ("BLOODBANK_REPROBE_AFTER_SECONDS", "15"),
        ]));

        assert_eq!(config.max_retries, 7);
        assert_eq!(config.retry_strategy(), RetryStrategy::fixed(Duration::from_millis(250)));
        assert!(!config.enable_wal);
        assert_eq!(config.wal_path, PathBuf::from("/tmp/other.jsonl"));
        assert_eq!(config.reprobe_after(), Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_env_garbage_is_ignored() {
        let mut config = PublisherConfig::default();
        config.apply_env(env(&[
            ("BLOODBANK_MAX_RETRIES", "many"),
            ("BLOODBANK_ENABLE_WAL", "maybe"),
            ("BLOODBANK_WAL_PATH", "   "),
        ]));
        assert_eq!(config, PublisherConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PublisherConfig::default();
        config.retry_delay_seconds = -1.0;
        assert!(config.validate().is_err());

        let mut config = PublisherConfig::default();
        config.retry_delay_seconds = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = PublisherConfig::default();
        config.max_retries = 0;
        assert!(config.validate().is_err());

        let mut config = PublisherConfig::default();
        config.retry_strategy = RetryStrategyConfig::Exponential {
            initial_seconds: 4.0,
            max_seconds: 1.0,
            factor: 2.0,
            jitter: false,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_quarantine_cannot_target_the_wal() {
        let mut config = PublisherConfig::default();
        config.corrupt_entries = CorruptEntryPolicy::Quarantine {
            path: config.wal_path.clone(),
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must differ from walPath"));

        config.corrupt_entries = CorruptEntryPolicy::Quarantine {
            path: PathBuf::from("raw_voice_ingest.corrupt.jsonl"),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = PublisherConfig::load(None).unwrap();
        assert_eq!(config.command_timeout_seconds, DEFAULT_TIMEOUT_SECS);
    }
}
