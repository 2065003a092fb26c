//! Merged pull requests and their file changes

use super::file_changes::{row_to_file_change, JOINED_COLUMNS};
use crate::db::base::{
    bind_timestamp, bind_uid, decode_timestamp, decode_uid, opt_text, text, BaseRepository,
};
use crate::db::connection::{Connection, Row};
use crate::db::queries::{
    BULK_UPSERT_PULL_REQUESTS, GET_PULL_REQUEST, GET_PULL_REQUESTS_BY_MINER,
    GET_PULL_REQUESTS_BY_REPOSITORY, GET_PULL_REQUESTS_BY_REPOSITORY_WITH_FILE_CHANGES,
    GET_PULL_REQUEST_WITH_FILE_CHANGES, SET_PULL_REQUEST,
};
use crate::error::Result;
use crate::types::PullRequest;
use rusqlite::types::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub struct PullRequestsRepository {
    base: BaseRepository,
}

impl PullRequestsRepository {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self {
            base: BaseRepository::new(conn, "pull_requests"),
        }
    }

    /// Map the PR columns of a row. Children are left unloaded.
    fn row_to_pull_request(row: &Row) -> Result<PullRequest> {
        Ok(PullRequest {
            number: row.get("number")?,
            repository_full_name: row.get("repository_full_name")?,
            uid: decode_uid(row, "uid")?,
            hotkey: row.get("hotkey")?,
            github_id: row.get("github_id")?,
            title: row.get("title")?,
            author_login: row.get("author_login")?,
            merged_at: decode_timestamp(row, "merged_at")?,
            created_at: decode_timestamp(row, "pr_created_at")?,
            earned_score: row.get("earned_score")?,
            additions: row.get("additions")?,
            deletions: row.get("deletions")?,
            commits: row.get("commits")?,
            merged_by_login: row.get("merged_by_login")?,
            file_changes: None,
            issues: None,
        })
    }

    /// Normalizes `uid` once; a uid outside the storage range fails the write.
    fn params(pr: &PullRequest) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Integer(pr.number),
            text(pr.repository_full_name.as_str()),
            bind_uid(pr.uid)?,
            text(pr.hotkey.as_str()),
            text(pr.github_id.as_str()),
            Value::Real(pr.earned_score),
            text(pr.title.as_str()),
            bind_timestamp(&pr.merged_at),
            bind_timestamp(&pr.created_at),
            Value::Integer(pr.additions),
            Value::Integer(pr.deletions),
            Value::Integer(pr.commits),
            text(pr.author_login.as_str()),
            opt_text(pr.merged_by_login.as_deref()),
        ])
    }

    /// Fold joined `pull_request x file_change` rows into pull requests.
    ///
    /// Rows are grouped by `(number, repository_full_name)` in first-seen
    /// order. A PR row whose `fc_filename` is NULL came from the outer join
    /// and contributes no file change, so a PR with none ends up with an
    /// empty list rather than an unloaded one.
    fn fold_with_file_changes(rows: &[Row]) -> Result<Vec<PullRequest>> {
        let mut prs: Vec<PullRequest> = Vec::new();
        let mut index: HashMap<(i64, String), usize> = HashMap::new();

        for row in rows {
            let number: i64 = row.get("number")?;
            let full_name: String = row.get("repository_full_name")?;

            let slot = match index.get(&(number, full_name.clone())) {
                Some(&slot) => slot,
                None => {
                    let mut pr = Self::row_to_pull_request(row)?;
                    pr.file_changes = Some(Vec::new());
                    prs.push(pr);
                    index.insert((number, full_name.clone()), prs.len() - 1);
                    prs.len() - 1
                }
            };

            if row.is_null(JOINED_COLUMNS.filename)? {
                continue;
            }
            let change = row_to_file_change(row, &JOINED_COLUMNS, number, &full_name)?;
            if let Some(changes) = prs[slot].file_changes.as_mut() {
                changes.push(change);
            }
        }

        Ok(prs)
    }

    pub fn get_pull_request(
        &self,
        number: i64,
        repository_full_name: &str,
    ) -> Result<Option<PullRequest>> {
        self.base.query_one(
            GET_PULL_REQUEST,
            &[Value::Integer(number), text(repository_full_name)],
            Self::row_to_pull_request,
        )
    }

    /// Pull requests of a repository, most recently merged first
    pub fn get_pull_requests_by_repository(
        &self,
        repository_full_name: &str,
    ) -> Result<Vec<PullRequest>> {
        self.base.query_many(
            GET_PULL_REQUESTS_BY_REPOSITORY,
            &[text(repository_full_name)],
            Self::row_to_pull_request,
        )
    }

    /// Pull requests credited to one miner, highest score first
    pub fn get_pull_requests_by_miner(
        &self,
        uid: u64,
        hotkey: &str,
        github_id: &str,
    ) -> Result<Vec<PullRequest>> {
        self.base.query_many(
            GET_PULL_REQUESTS_BY_MINER,
            &[bind_uid(uid)?, text(hotkey), text(github_id)],
            Self::row_to_pull_request,
        )
    }

    /// One pull request with `file_changes` loaded (possibly empty).
    pub fn get_pull_request_with_file_changes(
        &self,
        number: i64,
        repository_full_name: &str,
    ) -> Result<Option<PullRequest>> {
        let rows = self.base.query_rows(
            GET_PULL_REQUEST_WITH_FILE_CHANGES,
            &[Value::Integer(number), text(repository_full_name)],
        )?;
        Ok(Self::fold_with_file_changes(&rows)?.into_iter().next())
    }

    /// Every pull request of a repository with `file_changes` loaded.
    pub fn get_pull_requests_by_repository_with_file_changes(
        &self,
        repository_full_name: &str,
    ) -> Result<Vec<PullRequest>> {
        let rows = self.base.query_rows(
            GET_PULL_REQUESTS_BY_REPOSITORY_WITH_FILE_CHANGES,
            &[text(repository_full_name)],
        )?;
        Self::fold_with_file_changes(&rows)
    }

    /// Insert the PR row only; file changes and issues are stored through
    /// their own repositories.
    pub fn try_set_pull_request(&self, pr: &PullRequest) -> Result<()> {
        self.base.try_execute(SET_PULL_REQUEST, &Self::params(pr)?)?;
        Ok(())
    }

    pub fn set_pull_request(&self, pr: &PullRequest) -> bool {
        self.base
            .report("set_pull_request", self.try_set_pull_request(pr))
            .is_some()
    }

    pub fn try_store_pull_requests_bulk(&self, prs: &[PullRequest]) -> Result<usize> {
        let rows = prs
            .iter()
            .map(Self::params)
            .collect::<Result<Vec<_>>>()?;
        self.base.execute_bulk(&BULK_UPSERT_PULL_REQUESTS, rows)
    }

    pub fn store_pull_requests_bulk(&self, prs: &[PullRequest]) -> usize {
        self.base
            .report(
                "store_pull_requests_bulk",
                self.try_store_pull_requests_bulk(prs),
            )
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{pull_request, setup};
    use crate::types::{FileChange, FileStatus};

    #[test]
    fn test_set_and_get_pull_request() {
        let db = setup();
        let repo = db.pull_requests();
        let pr = pull_request(7, "octo/widgets");

        assert!(repo.set_pull_request(&pr));
        let found = repo.get_pull_request(7, "octo/widgets").unwrap().unwrap();
        assert_eq!(found, pr);
        assert!(found.file_changes.is_none());
        assert!(repo.get_pull_request(8, "octo/widgets").unwrap().is_none());
    }

    #[test]
    fn test_pull_request_requires_known_repository() {
        let db = setup();
        assert!(!db
            .pull_requests()
            .set_pull_request(&pull_request(1, "ghost/repo")));
    }

    #[test]
    fn test_by_miner_orders_by_score() {
        let db = setup();
        let repo = db.pull_requests();
        let mut low = pull_request(1, "octo/widgets");
        low.set_earned_score(0.5);
        let mut high = pull_request(2, "octo/widgets");
        high.set_earned_score(3.0);

        assert_eq!(repo.store_pull_requests_bulk(&[low, high.clone()]), 2);
        let prs = repo
            .get_pull_requests_by_miner(high.uid, &high.hotkey, &high.github_id)
            .unwrap();
        let numbers: Vec<i64> = prs.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![2, 1]);
    }

    #[test]
    fn test_with_file_changes_groups_rows() {
        let db = setup();
        let prs = db.pull_requests();
        assert_eq!(
            prs.store_pull_requests_bulk(&[
                pull_request(1, "octo/widgets"),
                pull_request(2, "octo/widgets"),
            ]),
            2
        );
        let changes = vec![
            FileChange::new(1, "octo/widgets", "lib.rs", 1, 0, FileStatus::Added),
            FileChange::new(1, "octo/widgets", "main.rs", 2, 2, FileStatus::Modified),
        ];
        assert_eq!(db.file_changes().store_file_changes_bulk(&changes), 2);

        let loaded = prs
            .get_pull_requests_by_repository_with_file_changes("octo/widgets")
            .unwrap();
        assert_eq!(loaded.len(), 2);
        // merged_at descending: #2 merged a second after #1
        assert_eq!(loaded[0].number, 2);
        assert_eq!(loaded[0].file_changes, Some(Vec::new()));
        let names: Vec<&str> = loaded[1]
            .file_changes
            .as_ref()
            .unwrap()
            .iter()
            .map(|c| c.filename.as_str())
            .collect();
        assert_eq!(names, vec!["lib.rs", "main.rs"]);
    }
}
