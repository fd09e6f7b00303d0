//! Configuration

pub mod config;

pub use config::{ConfigError, LocatorConfig, RefreshConfig, RetryConfig, SolverConfig};
