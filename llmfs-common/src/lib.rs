//! llmfs Common - Shared types, utilities, and configuration for llmfs.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Error types and handling utilities
//! - Logging setup
//! - String helpers for file values and log output

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;

pub use config::{BackendConfig, Config, ObservabilityConfig, ServerConfig, SessionConfig};
pub use error::{Error, Result};

