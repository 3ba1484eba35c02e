//! # Tender Infrastructure
//!
//! PostgreSQL adapters for the tender tracker.

pub mod database;

pub use database::{create_pool, create_pool_from, run_migrations, PgTenderRepository};
