use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path};
use tokio::sync::Semaphore;

use crate::{
    error::{Error, InternalResult},
    parameters::ParameterSet,
};

/// How the delivery phase of a dispatch is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConcurrencyPolicy {
    /// Run deliveries on the Tokio runtime current at construction.
    #[default]
    Shared,
    /// Run deliveries on a runtime owned by the engine.
    Dedicated {
        #[serde(default = "default_worker_threads")]
        worker_threads: usize,
    },
}

/// Startup options of a [`DispatchEngine`](crate::dispatcher::DispatchEngine),
/// read once at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub concurrency: ConcurrencyPolicy,

    /// Initial default parameters attached to every event.
    #[serde(default)]
    pub default_parameters: Option<ParameterSet>,

    /// Events waiting for fan-out. Dispatches beyond this are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Deliveries one tracker may run at the same time.
    #[serde(default = "default_max_concurrent_deliveries")]
    pub max_concurrent_deliveries: usize,

    /// Deliveries one tracker may have waiting or running. Beyond this the
    /// tracker misses events while the others keep receiving them.
    #[serde(default = "default_max_pending_per_tracker")]
    pub max_pending_per_tracker: usize,

    #[serde(default = "default_report_capacity")]
    pub report_capacity: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            concurrency: ConcurrencyPolicy::default(),
            default_parameters: None,
            queue_capacity: default_queue_capacity(),
            max_concurrent_deliveries: default_max_concurrent_deliveries(),
            max_pending_per_tracker: default_max_pending_per_tracker(),
            report_capacity: default_report_capacity(),
        }
    }
}

impl Configuration {
    pub fn with_concurrency(mut self, concurrency: ConcurrencyPolicy) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_default_parameters(mut self, parameters: ParameterSet) -> Self {
        self.default_parameters = Some(parameters);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_max_concurrent_deliveries(mut self, max: usize) -> Self {
        self.max_concurrent_deliveries = max;
        self
    }

    pub fn with_max_pending_per_tracker(mut self, max: usize) -> Self {
        self.max_pending_per_tracker = max;
        self
    }

    pub fn with_report_capacity(mut self, capacity: usize) -> Self {
        self.report_capacity = capacity;
        self
    }

    /// Rejects sizes Tokio cannot allocate channels or semaphores for.
    pub fn validate(&self) -> InternalResult<()> {
        check_range("queue_capacity", self.queue_capacity, Semaphore::MAX_PERMITS)?;
        check_range(
            "max_concurrent_deliveries",
            self.max_concurrent_deliveries,
            Semaphore::MAX_PERMITS,
        )?;
        check_range(
            "max_pending_per_tracker",
            self.max_pending_per_tracker,
            Semaphore::MAX_PERMITS,
        )?;
        check_range("report_capacity", self.report_capacity, MAX_REPORT_CAPACITY)?;
        if let ConcurrencyPolicy::Dedicated { worker_threads: 0 } = self.concurrency {
            return Err(Error::invalid_configuration(
                "worker_threads must be greater than 0",
            ));
        }
        Ok(())
    }

    // JSONファイルから設定を読み込む
    pub fn from_file<P: AsRef<Path>>(path: P) -> InternalResult<Self> {
        from_file(path)
    }

    pub fn from_json(s: &str) -> InternalResult<Self> {
        from_str(s)
    }
}

/// Upper bound of `tokio::sync::broadcast::channel`.
const MAX_REPORT_CAPACITY: usize = usize::MAX >> 1;

fn check_range(field: &str, value: usize, max: usize) -> InternalResult<()> {
    if value == 0 {
        return Err(Error::invalid_configuration(format!(
            "{} must be greater than 0",
            field
        )));
    }
    if value > max {
        return Err(Error::invalid_configuration(format!(
            "{} must be at most {}, got {}",
            field, max, value
        )));
    }
    Ok(())
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> InternalResult<T> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> InternalResult<T> {
    let config = serde_json::from_str(s)?;
    Ok(config)
}

fn default_worker_threads() -> usize {
    2
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_max_concurrent_deliveries() -> usize {
    64
}
fn default_max_pending_per_tracker() -> usize {
    1024
}
fn default_report_capacity() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_configuration_serde() {
        let config = Configuration::default();
        let json = serde_json::to_string(&config).unwrap();
        tracing::debug!("{}", json);
        let deserialized: Configuration = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = Configuration::from_json("{}").unwrap();
        assert_eq!(config, Configuration::default());
        assert_eq!(config.concurrency, ConcurrencyPolicy::Shared);
        assert!(config.default_parameters.is_none());
    }

    #[test]
    fn test_dedicated_policy_from_json() {
        let config = Configuration::from_json(
            r#"{
                "concurrency": {"type": "dedicated", "worker_threads": 4},
                "default_parameters": {"os": "1.0", "build": 42}
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.concurrency,
            ConcurrencyPolicy::Dedicated { worker_threads: 4 }
        );
        let params = config.default_parameters.unwrap();
        assert_eq!(params["build"], json!(42));
    }

    #[test]
    fn test_dedicated_default_workers() {
        let config =
            Configuration::from_json(r#"{"concurrency": {"type": "dedicated"}}"#).unwrap();
        assert_eq!(
            config.concurrency,
            ConcurrencyPolicy::Dedicated { worker_threads: 2 }
        );
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        assert!(Configuration::default().validate().is_ok());
        assert!(Configuration::default()
            .with_queue_capacity(0)
            .validate()
            .is_err());
        assert!(Configuration::default()
            .with_max_concurrent_deliveries(0)
            .validate()
            .is_err());
        assert!(Configuration::default()
            .with_max_pending_per_tracker(0)
            .validate()
            .is_err());
        assert!(Configuration::default()
            .with_report_capacity(0)
            .validate()
            .is_err());
        assert!(matches!(
            Configuration::default()
                .with_concurrency(ConcurrencyPolicy::Dedicated { worker_threads: 0 })
                .validate(),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_oversized_sizes() {
        let too_many = Semaphore::MAX_PERMITS + 1;
        for config in [
            Configuration::default().with_queue_capacity(too_many),
            Configuration::default().with_max_concurrent_deliveries(too_many),
            Configuration::default().with_max_pending_per_tracker(too_many),
            Configuration::default().with_report_capacity(usize::MAX),
        ] {
            assert!(matches!(
                config.validate(),
                Err(Error::InvalidConfiguration(_))
            ));
        }
        assert!(Configuration::default()
            .with_queue_capacity(Semaphore::MAX_PERMITS)
            .with_report_capacity(usize::MAX >> 1)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_oversized_json_value_fails_validation() {
        let config =
            Configuration::from_json(r#"{"max_concurrent_deliveries": 18446744073709551615}"#)
                .unwrap();
        match config.validate() {
            Err(Error::InvalidConfiguration(message)) => {
                assert!(message.contains("max_concurrent_deliveries"));
            }
            other => panic!("expected invalid configuration, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        assert!(matches!(
            Configuration::from_json("{\"queue_capacity\": \"many\"}"),
            Err(Error::Parse(_))
        ));
    }
}
