//! Issues closed by merged pull requests

use crate::db::base::{bind_opt_timestamp, decode_opt_timestamp, text, BaseRepository};
use crate::db::connection::{Connection, Row};
use crate::db::queries::{BULK_UPSERT_ISSUES, GET_ISSUE, GET_ISSUES_BY_REPOSITORY, SET_ISSUE};
use crate::error::Result;
use crate::types::Issue;
use rusqlite::types::Value;
use std::sync::Arc;

pub struct IssuesRepository {
    base: BaseRepository,
}

impl IssuesRepository {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self {
            base: BaseRepository::new(conn, "issues"),
        }
    }

    fn row_to_issue(row: &Row) -> Result<Issue> {
        Ok(Issue {
            number: row.get("number")?,
            pr_number: row.get("pr_number")?,
            repository_full_name: row.get("repository_full_name")?,
            title: row.get("title")?,
            created_at: decode_opt_timestamp(row, "created_at")?,
            closed_at: decode_opt_timestamp(row, "closed_at")?,
        })
    }

    fn params(issue: &Issue) -> Vec<Value> {
        vec![
            Value::Integer(issue.number),
            Value::Integer(issue.pr_number),
            text(issue.repository_full_name.as_str()),
            text(issue.title.as_str()),
            bind_opt_timestamp(issue.created_at.as_ref()),
            bind_opt_timestamp(issue.closed_at.as_ref()),
        ]
    }

    pub fn get_issue(&self, number: i64, repository_full_name: &str) -> Result<Option<Issue>> {
        self.base.query_one(
            GET_ISSUE,
            &[Value::Integer(number), text(repository_full_name)],
            Self::row_to_issue,
        )
    }

    /// Issues of a repository, newest first
    pub fn get_issues_by_repository(&self, repository_full_name: &str) -> Result<Vec<Issue>> {
        self.base.query_many(
            GET_ISSUES_BY_REPOSITORY,
            &[text(repository_full_name)],
            Self::row_to_issue,
        )
    }

    pub fn try_set_issue(&self, issue: &Issue) -> Result<()> {
        self.base.try_execute(SET_ISSUE, &Self::params(issue))?;
        Ok(())
    }

    pub fn set_issue(&self, issue: &Issue) -> bool {
        self.base
            .report("set_issue", self.try_set_issue(issue))
            .is_some()
    }

    pub fn try_store_issues_bulk(&self, issues: &[Issue]) -> Result<usize> {
        let rows = issues.iter().map(Self::params).collect();
        self.base.execute_bulk(&BULK_UPSERT_ISSUES, rows)
    }

    pub fn store_issues_bulk(&self, issues: &[Issue]) -> usize {
        self.base
            .report("store_issues_bulk", self.try_store_issues_bulk(issues))
            .unwrap_or(0)
    }
}
