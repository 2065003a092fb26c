//! GitHub repositories, keyed by `owner/name`

use crate::db::base::{text, BaseRepository};
use crate::db::connection::{Connection, Row};
use crate::db::queries::{
    BULK_UPSERT_REPOSITORIES, GET_ALL_REPOSITORIES, GET_REPOSITORY, SET_REPOSITORY,
};
use crate::error::{Error, Result};
use crate::types::Repository;
use rusqlite::types::Value;
use std::collections::HashSet;
use std::sync::Arc;

pub struct RepositoriesRepository {
    base: BaseRepository,
}

impl RepositoriesRepository {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self {
            base: BaseRepository::new(conn, "repositories"),
        }
    }

    fn row_to_repository(row: &Row) -> Result<Repository> {
        let repository = Repository {
            name: row.get("name")?,
            owner: row.get("owner")?,
        };
        let stored: String = row.get("full_name")?;
        if stored != repository.full_name() {
            return Err(Error::decode(
                "full_name",
                format!("{:?} does not match owner/name {:?}", stored, repository.full_name()),
            ));
        }
        Ok(repository)
    }

    fn params(repository: &Repository) -> Vec<Value> {
        vec![
            text(repository.full_name()),
            text(repository.name.as_str()),
            text(repository.owner.as_str()),
        ]
    }

    /// Get a repository by `owner/name`
    pub fn get_repository(&self, full_name: &str) -> Result<Option<Repository>> {
        self.base
            .query_one(GET_REPOSITORY, &[text(full_name)], Self::row_to_repository)
    }

    /// All repositories ordered by full name
    pub fn get_all_repositories(&self) -> Result<Vec<Repository>> {
        self.base
            .query_many(GET_ALL_REPOSITORIES, &[], Self::row_to_repository)
    }

    /// Insert a repository; an existing one is left as is.
    pub fn try_set_repository(&self, repository: &Repository) -> Result<()> {
        self.base
            .try_execute(SET_REPOSITORY, &Self::params(repository))?;
        Ok(())
    }

    pub fn set_repository(&self, repository: &Repository) -> bool {
        self.base
            .report("set_repository", self.try_set_repository(repository))
            .is_some()
    }

    pub fn try_store_repositories_bulk(&self, repositories: &[Repository]) -> Result<usize> {
        let rows = repositories.iter().map(Self::params).collect();
        self.base.execute_bulk(&BULK_UPSERT_REPOSITORIES, rows)
    }

    /// Insert many repositories. Returns the number submitted.
    pub fn store_repositories_bulk(&self, repositories: &[Repository]) -> usize {
        self.base
            .report(
                "store_repositories_bulk",
                self.try_store_repositories_bulk(repositories),
            )
            .unwrap_or(0)
    }

    /// Insert repositories given as `owner/name` strings.
    ///
    /// Duplicates are submitted once; names that are not exactly
    /// `owner/name` are skipped and not counted.
    pub fn store_repository_names_bulk<'a, I>(&self, full_names: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = HashSet::new();
        let mut repositories = Vec::new();
        for full_name in full_names {
            if !seen.insert(full_name) {
                continue;
            }
            match Repository::from_full_name(full_name) {
                Some(repository) => repositories.push(repository),
                None => tracing::warn!(full_name, "Skipping malformed repository name"),
            }
        }
        self.store_repositories_bulk(&repositories)
    }
}
