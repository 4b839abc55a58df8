//! Rag Common - Shared types, utilities, and configuration for the rag-chat client.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup
//! - Small string helpers used when logging user input

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{Config, ObservabilityConfig, ServerConfig, StreamConfig};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};
