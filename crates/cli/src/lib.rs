//! s3kv CLI library
//!
//! Exposes the command definitions for the integration tests.

pub mod commands;
pub mod exit_code;
pub mod output;
