//! # Tender Shared
//!
//! Shared configuration, telemetry and common types for the tender tracker.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;

pub use error::AppError;
pub use types::*;
