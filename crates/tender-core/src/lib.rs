//! # Tender Core
//!
//! Domain entities, services, and repository traits for the tender tracker.

pub mod domain;
pub mod error;
pub mod repositories;
pub mod services;

// Re-export domain entities
pub use domain::*;
pub use error::DomainError;
