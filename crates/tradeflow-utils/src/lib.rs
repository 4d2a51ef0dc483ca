//! Shared utilities for tradeflow
//!
//! This crate provides common functionality used across the tradeflow workspace:
//! logging setup and helpers for reading configuration from the environment.

pub mod env;
pub mod logging;

pub use env::{env_flag, env_parse};
pub use logging::{LogFormat, init_tracing, init_tracing_with};
