//! # tapedeck common library
//!
//! Shared code for the tapedeck workspace:
//! - Error type used across crates
//! - TOML bootstrap configuration and root folder resolution
//! - Tracing subscriber initialization (console + append-only log file)

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
