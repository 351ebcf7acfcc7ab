//! Core types and utilities for pixpair.
//!
//! This crate provides the error type, the shared data types and the run
//! configuration used across the dataset, training and tool crates.

pub mod cli;
pub mod config;
pub mod error;
pub mod types;

pub use cli::*;
pub use config::*;
pub use error::{Error, Result};
pub use types::*;
