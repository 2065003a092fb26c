//! # gittensor-db
//!
//! Storage layer for the GitTensor validator: the miners it scores, the
//! GitHub repositories they contribute to, their merged pull requests (with
//! file changes and closed issues) and the per-round evaluation summaries.
//!
//! This library provides:
//! - Domain types for every stored entity
//! - A SQLite-backed [`Database`] with one repository per entity
//! - An ordered migration runner over embedded SQL scripts
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Writes
//!
//! Every write comes in two forms. `set_*` / `store_*_bulk` are best effort:
//! a failure is logged, the unit of work is rolled back and the call reports
//! `false` or `0`. The `try_*` forms return the [`Error`] instead.
//!
//! ## Example
//!
//! ```rust,no_run
//! use gittensor_db::{Config, Database, Repository};
//!
//! let config = Config::load().expect("failed to load config");
//! let db = Database::from_config(&config.database).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! db.repositories().set_repository(&Repository::new("opentensor", "bittensor"));
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::{Connection, Database, MigrationReport, MigrationState, Migrator};
pub use error::{Error, Result};
pub use types::*;

// Public modules
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod types;
