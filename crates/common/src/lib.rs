//! Shared helpers used across cadence crates.

pub mod error;

pub use error::FromMessage;
