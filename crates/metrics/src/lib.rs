//! Metrics collection and export for cadence.
//!
//! This crate provides a unified metrics interface using the `metrics` crate facade.
//! When the `prometheus` feature is enabled, metrics are rendered in Prometheus
//! text format.
//!
//! # Usage
//!
//! ```rust,ignore
//! use cadence_metrics::{batch, counter, labels};
//!
//! counter!(batch::FIRES_TOTAL, labels::JOB_ID => "wiki_hourly").increment(1);
//! ```
//!
//! # Features
//!
//! - `prometheus`: install a Prometheus recorder and render its output

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
