//! Shared configuration for the slashbot transports.
//!
//! Configuration is layered: defaults, then an optional `slashbot.toml`, then
//! environment variables, then programmatic overrides. Validation depends on the
//! [`config::TransportMode`] being started.

pub mod config;

pub use config::{AppConfig, ConfigError, LoadOptions, TransportMode};
