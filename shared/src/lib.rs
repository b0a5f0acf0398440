//! Shared library for Linguawaves site functions.
//!
//! This crate provides common utilities, types, and clients used across all Lambda functions.

pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod validate;

pub use config::Config;
pub use db::create_pool;
pub use error::{is_unique_violation, Error, Result};
pub use http::{error_response, header, json_response, preflight_response};
pub use validate::is_valid_email;
