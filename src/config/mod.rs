//! Configuration module for graphprobe
//!
//! This module provides configuration management and loading utilities.

mod config;

// Re-export the main configuration types
pub use config::{
    parse_header, Config, ConfigOverrides, LoggingConfig, NetworkConfig, OutputConfig,
    SchemaConfig, SubscriptionConfig, TargetConfig,
};
