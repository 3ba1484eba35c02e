//! Database adapters

pub mod connection;
pub mod postgres;

pub use connection::{create_pool, create_pool_from, run_migrations};
pub use postgres::PgTenderRepository;
