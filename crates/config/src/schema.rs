/// Config schema types (scheduler, broker, status reporting, metrics).
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub scheduler: SchedulerConfig,
    pub broker: BrokerConfig,
    pub status: StatusConfig,
    pub metrics: MetricsConfig,
}

/// In-process scheduler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Completed runs kept per job. Defaults to 100.
    pub history_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { history_limit: 100 }
    }
}

/// Remote broker the SQL tasks are submitted to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Base URL. Defaults to "http://127.0.0.1:8082".
    pub url: String,
    /// Path of the SQL task endpoint, relative to `url`.
    pub task_path: String,
    /// Per-request timeout. Defaults to 60.
    pub timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8082".into(),
            task_path: "/druid/v2/sql/task/".into(),
            timeout_secs: 60,
        }
    }
}

/// Periodic status reporting from the runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Seconds between status reports. Zero disables reporting.
    pub interval_secs: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled.
    pub enabled: bool,
    /// Additional labels to add to all metrics.
    pub labels: HashMap<String, String>,
}
