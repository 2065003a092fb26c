//! Database layer for gittensor-db
//!
//! This module provides the storage layer using SQLite with:
//! - A [`Connection`] seam shared by every repository
//! - Schema migrations from embedded SQL scripts
//! - One repository per entity for queries and writes

pub mod base;
pub mod connection;
pub mod queries;
pub mod repositories;
pub mod schema;

pub use base::{BaseRepository, UnitOfWork, BULK_PAGE_SIZE};
pub use connection::{check_connection, Connection, Row, SqliteConnection};
pub use repositories::{
    FileChangesRepository, IssuesRepository, MinerEvaluationsRepository, MinersRepository,
    PullRequestsRepository, RepositoriesRepository,
};
pub use schema::{MigrationReport, MigrationState, Migrator};

use crate::config::DatabaseConfig;
use crate::error::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Entry point to storage: one shared connection and the repositories over it.
#[derive(Clone)]
pub struct Database {
    conn: Arc<dyn Connection>,
    scripts_dir: Option<PathBuf>,
}

impl Database {
    /// Open or create a database file
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_connection(Arc::new(SqliteConnection::open(path)?)))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(Arc::new(
            SqliteConnection::open_in_memory()?,
        )))
    }

    /// Open the configured database, honouring its scripts directory.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let conn = SqliteConnection::from_config(config)?;
        Ok(Self {
            conn: Arc::new(conn),
            scripts_dir: config.migrations_dir.clone(),
        })
    }

    /// Wrap a caller-provided handle.
    pub fn from_connection(conn: Arc<dyn Connection>) -> Self {
        Self {
            conn,
            scripts_dir: None,
        }
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<MigrationReport> {
        self.migrator().migrate()
    }

    pub fn migrator(&self) -> Migrator {
        Migrator::new(Arc::clone(&self.conn)).with_scripts_dir(self.scripts_dir.clone())
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    pub fn miners(&self) -> MinersRepository {
        MinersRepository::new(Arc::clone(&self.conn))
    }

    pub fn repositories(&self) -> RepositoriesRepository {
        RepositoriesRepository::new(Arc::clone(&self.conn))
    }

    pub fn pull_requests(&self) -> PullRequestsRepository {
        PullRequestsRepository::new(Arc::clone(&self.conn))
    }

    pub fn issues(&self) -> IssuesRepository {
        IssuesRepository::new(Arc::clone(&self.conn))
    }

    pub fn file_changes(&self) -> FileChangesRepository {
        FileChangesRepository::new(Arc::clone(&self.conn))
    }

    pub fn miner_evaluations(&self) -> MinerEvaluationsRepository {
        MinerEvaluationsRepository::new(Arc::clone(&self.conn))
    }
}
