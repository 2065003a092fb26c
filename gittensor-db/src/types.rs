//! Core domain types for gittensor-db
//!
//! These records mirror what the validator's scoring layer works with: the
//! miners it evaluates, the repositories they contribute to, the merged pull
//! requests (with their file changes and linked issues) that earn score, and
//! the per-round evaluation summary.
//!
//! ## Identity
//!
//! | Entity | Natural key |
//! |--------|-------------|
//! | [`Miner`] | `(uid, hotkey, github_id)` |
//! | [`Repository`] | `owner/name` (derived, see [`Repository::full_name`]) |
//! | [`PullRequest`] | `(number, repository_full_name)` |
//! | [`Issue`] | `(number, repository_full_name)` |
//! | [`FileChange`] | `(pr_number, repository_full_name, filename)` |
//! | [`MinerEvaluation`] | storage-assigned `id` |
//!
//! Child lists on [`PullRequest`] are projections: `None` means "not loaded",
//! never "none exist".

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Base URL for links built from entity identity.
pub const GITHUB_DOMAIN: &str = "https://github.com/";

/// GitHub id recorded for an evaluation whose miner could not be identified.
pub const UNKNOWN_GITHUB_ID: &str = "0";

/// Parse a GitHub API timestamp (`2024-01-15T10:30:00Z`).
pub fn parse_github_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Payload(format!("bad timestamp {:?}: {}", value, e)))
}

// ============================================
// Miner
// ============================================

/// A registered miner and the GitHub account it proved ownership of.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Miner {
    pub uid: u64,
    pub hotkey: String,
    pub github_id: String,
}

impl Miner {
    pub fn new(uid: u64, hotkey: impl Into<String>, github_id: impl Into<String>) -> Self {
        Self {
            uid,
            hotkey: hotkey.into(),
            github_id: github_id.into(),
        }
    }
}

impl std::fmt::Display for Miner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let short: String = self.hotkey.chars().take(8).collect();
        write!(
            f,
            "Miner(uid={}, hotkey={}..., github_id={})",
            self.uid, short, self.github_id
        )
    }
}

// ============================================
// Repository
// ============================================

/// A GitHub repository.
///
/// `full_name` is never held as its own field so it cannot drift from
/// `owner` and `name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub owner: String,
}

impl Repository {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
        }
    }

    /// Split an `owner/name` string. Anything other than exactly two
    /// non-empty segments is rejected.
    pub fn from_full_name(full_name: &str) -> Option<Self> {
        let mut parts = full_name.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
                Some(Self::new(owner, name))
            }
            _ => None,
        }
    }

    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn github_url(&self) -> String {
        format!("{}{}", GITHUB_DOMAIN, self.full_name())
    }
}

// ============================================
// File changes
// ============================================

/// GitHub's per-file diff status.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FileStatus {
    Added,
    Removed,
    Modified,
    Renamed,
    Copied,
    Changed,
    Unchanged,
    /// Anything GitHub adds later is kept verbatim
    Other(String),
}

impl FileStatus {
    pub fn as_str(&self) -> &str {
        match self {
            FileStatus::Added => "added",
            FileStatus::Removed => "removed",
            FileStatus::Modified => "modified",
            FileStatus::Renamed => "renamed",
            FileStatus::Copied => "copied",
            FileStatus::Changed => "changed",
            FileStatus::Unchanged => "unchanged",
            FileStatus::Other(s) => s,
        }
    }
}

impl From<&str> for FileStatus {
    fn from(s: &str) -> Self {
        match s {
            "added" => FileStatus::Added,
            "removed" => FileStatus::Removed,
            "modified" => FileStatus::Modified,
            "renamed" => FileStatus::Renamed,
            "copied" => FileStatus::Copied,
            "changed" => FileStatus::Changed,
            "unchanged" => FileStatus::Unchanged,
            other => FileStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for FileStatus {
    fn from(s: String) -> Self {
        FileStatus::from(s.as_str())
    }
}

impl From<FileStatus> for String {
    fn from(status: FileStatus) -> Self {
        status.as_str().to_string()
    }
}

/// One file touched by a pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    /// Storage primary key, `None` until read back
    pub id: Option<i64>,
    pub pr_number: i64,
    pub repository_full_name: String,
    pub filename: String,
    pub changes: i64,
    pub additions: i64,
    pub deletions: i64,
    pub status: FileStatus,
    /// Unified diff, absent for binary or very large files
    pub patch: Option<String>,
    /// Lowercased suffix after the last `.`, fixed at construction
    pub file_extension: String,
}

impl FileChange {
    pub fn new(
        pr_number: i64,
        repository_full_name: impl Into<String>,
        filename: impl Into<String>,
        additions: i64,
        deletions: i64,
        status: FileStatus,
    ) -> Self {
        let filename = filename.into();
        let file_extension = file_extension_of(&filename);
        Self {
            id: None,
            pr_number,
            repository_full_name: repository_full_name.into(),
            filename,
            changes: additions + deletions,
            additions,
            deletions,
            status,
            patch: None,
            file_extension,
        }
    }

    pub fn with_patch(mut self, patch: impl Into<String>) -> Self {
        self.patch = Some(patch.into());
        self
    }

    pub fn with_changes(mut self, changes: i64) -> Self {
        self.changes = changes;
        self
    }

    /// Use a caller-supplied extension instead of the derived one.
    pub fn with_file_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = extension.into();
        self
    }

    /// Build from one entry of the REST `GET /pulls/{n}/files` response.
    pub fn from_github_response(
        pr_number: i64,
        repository_full_name: &str,
        diff: GithubFileDiff,
    ) -> Self {
        let mut change = Self::new(
            pr_number,
            repository_full_name,
            diff.filename,
            diff.additions,
            diff.deletions,
            FileStatus::from(diff.status),
        )
        .with_changes(diff.changes);
        change.patch = diff.patch;
        change
    }
}

/// Lowercased suffix after the last `.` of `filename`, or empty.
pub fn file_extension_of(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

/// REST file diff object.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubFileDiff {
    pub filename: String,
    #[serde(default)]
    pub changes: i64,
    #[serde(default)]
    pub additions: i64,
    #[serde(default)]
    pub deletions: i64,
    pub status: String,
    #[serde(default)]
    pub patch: Option<String>,
}

// ============================================
// Issues
// ============================================

/// An issue closed by a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub number: i64,
    /// Closing pull request; it need not be stored yet
    pub pr_number: i64,
    pub repository_full_name: String,
    pub title: String,
    /// Stored to the microsecond, like every timestamp in this module
    pub created_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Issue {
    pub fn github_url(&self) -> String {
        format!(
            "{}{}/issues/{}",
            GITHUB_DOMAIN, self.repository_full_name, self.number
        )
    }
}

// ============================================
// Pull requests
// ============================================

/// A merged pull request attributed to a miner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: i64,
    pub repository_full_name: String,
    /// As handed over by the scoring layer; narrowed to the storage integer
    /// when the record is written
    pub uid: u64,
    pub hotkey: String,
    pub github_id: String,
    pub title: String,
    pub author_login: String,
    /// Read back truncated to microseconds
    pub merged_at: DateTime<Utc>,
    /// Read back truncated to microseconds
    pub created_at: DateTime<Utc>,
    pub earned_score: f64,
    pub additions: i64,
    pub deletions: i64,
    pub commits: i64,
    pub merged_by_login: Option<String>,
    /// `None` when not loaded
    pub file_changes: Option<Vec<FileChange>>,
    /// `None` when not loaded
    pub issues: Option<Vec<Issue>>,
}

impl PullRequest {
    /// Lines added plus lines removed
    pub fn total_changes(&self) -> i64 {
        self.additions + self.deletions
    }

    pub fn github_url(&self) -> String {
        format!(
            "{}{}/pull/{}",
            GITHUB_DOMAIN, self.repository_full_name, self.number
        )
    }

    pub fn set_earned_score(&mut self, score: f64) {
        self.earned_score = score;
    }

    pub fn set_file_changes(&mut self, file_changes: Vec<FileChange>) {
        self.file_changes = Some(file_changes);
    }

    pub fn set_issues(&mut self, issues: Vec<Issue>) {
        self.issues = Some(issues);
    }

    /// Build from a GraphQL `PullRequest` node fetched for a miner.
    ///
    /// Only closing issues that are actually closed are kept.
    pub fn from_graphql(
        node: GraphqlPullRequest,
        uid: u64,
        hotkey: &str,
        github_id: &str,
    ) -> Result<Self> {
        let repository_full_name = format!(
            "{}/{}",
            node.repository.owner.login, node.repository.name
        );

        let merged_at = node
            .merged_at
            .as_deref()
            .ok_or_else(|| Error::Payload(format!("pull request #{} is not merged", node.number)))
            .and_then(parse_github_timestamp)?;
        let created_at = parse_github_timestamp(&node.created_at)?;
        let author_login = node
            .author
            .map(|a| a.login)
            .ok_or_else(|| Error::Payload(format!("pull request #{} has no author", node.number)))?;

        let mut issues = Vec::new();
        for issue in node
            .closing_issues_references
            .map(|c| c.nodes)
            .unwrap_or_default()
        {
            let Some(closed_at) = issue.closed_at.as_deref() else {
                continue;
            };
            issues.push(Issue {
                number: issue.number,
                pr_number: node.number,
                repository_full_name: repository_full_name.clone(),
                title: issue.title,
                created_at: issue
                    .created_at
                    .as_deref()
                    .map(parse_github_timestamp)
                    .transpose()?,
                closed_at: Some(parse_github_timestamp(closed_at)?),
            });
        }

        Ok(Self {
            number: node.number,
            repository_full_name,
            uid,
            hotkey: hotkey.to_string(),
            github_id: github_id.to_string(),
            title: node.title,
            author_login,
            merged_at,
            created_at,
            earned_score: 0.0,
            additions: node.additions,
            deletions: node.deletions,
            commits: node.commits.map(|c| c.total_count).unwrap_or(0),
            merged_by_login: node.merged_by.map(|a| a.login),
            file_changes: None,
            issues: Some(issues),
        })
    }

    /// Same as [`PullRequest::from_graphql`] for an untyped JSON node.
    pub fn from_graphql_value(
        node: serde_json::Value,
        uid: u64,
        hotkey: &str,
        github_id: &str,
    ) -> Result<Self> {
        let node: GraphqlPullRequest = serde_json::from_value(node)?;
        Self::from_graphql(node, uid, hotkey, github_id)
    }
}

/// GraphQL `PullRequest` node, limited to the fields we store.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlPullRequest {
    pub number: i64,
    pub title: String,
    pub author: Option<GraphqlActor>,
    pub repository: GraphqlRepository,
    pub merged_at: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub additions: i64,
    #[serde(default)]
    pub deletions: i64,
    #[serde(default)]
    pub commits: Option<GraphqlTotalCount>,
    #[serde(default)]
    pub merged_by: Option<GraphqlActor>,
    #[serde(default)]
    pub closing_issues_references: Option<GraphqlNodes<GraphqlIssue>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlActor {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlRepository {
    pub name: String,
    pub owner: GraphqlActor,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlTotalCount {
    pub total_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlNodes<T> {
    #[serde(default = "Vec::new")]
    pub nodes: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlIssue {
    pub number: i64,
    pub title: String,
    pub created_at: Option<String>,
    pub closed_at: Option<String>,
}

// ============================================
// Miner evaluations
// ============================================

/// Result of scoring one miner in one validation round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinerEvaluation {
    /// Storage primary key, `None` until read back
    pub id: Option<i64>,
    pub uid: u64,
    pub hotkey: String,
    /// [`UNKNOWN_GITHUB_ID`] when the miner could not be identified
    pub github_id: String,
    pub total_score: f64,
    pub total_lines_changed: i64,
    pub total_open_prs: i64,
    pub unique_repos_count: i64,
    pub failed_reason: Option<String>,
    /// Set to the write time when `None`. Stored to the microsecond, so a
    /// nanosecond value reads back as `ts.trunc_subsecs(6)`
    pub evaluation_timestamp: Option<DateTime<Utc>>,
    /// Scored pull requests; not persisted with the evaluation
    #[serde(default)]
    pub pull_requests: Vec<PullRequest>,
    /// Not persisted; only its size is
    #[serde(default)]
    pub unique_repos_contributed_to: BTreeSet<String>,
    /// `total_prs` as read from storage
    pub stored_total_prs: Option<i64>,
}

impl MinerEvaluation {
    pub fn new(uid: u64, hotkey: impl Into<String>) -> Self {
        Self {
            id: None,
            uid,
            hotkey: hotkey.into(),
            github_id: UNKNOWN_GITHUB_ID.to_string(),
            total_score: 0.0,
            total_lines_changed: 0,
            total_open_prs: 0,
            unique_repos_count: 0,
            failed_reason: None,
            evaluation_timestamp: None,
            pull_requests: Vec::new(),
            unique_repos_contributed_to: BTreeSet::new(),
            stored_total_prs: None,
        }
    }

    pub fn with_github_id(mut self, github_id: impl Into<String>) -> Self {
        self.github_id = github_id.into();
        self
    }

    /// Count read back from storage, if this evaluation came from there.
    pub fn stored_total_prs(&self) -> Option<i64> {
        self.stored_total_prs
    }

    /// Count of pull requests held in memory.
    pub fn computed_total_prs(&self) -> i64 {
        self.pull_requests.len() as i64
    }

    /// Number of valid pull requests.
    ///
    /// Uses the stored count when there is one and the computed count
    /// otherwise. An evaluation that carries both must have them agree.
    pub fn total_prs(&self) -> Result<i64> {
        let computed = self.computed_total_prs();
        match self.stored_total_prs {
            None => Ok(computed),
            Some(stored) if self.pull_requests.is_empty() || stored == computed => Ok(stored),
            Some(stored) => Err(Error::PrCountMismatch { stored, computed }),
        }
    }

    /// Recompute line totals and the set of repositories from the loaded
    /// pull requests. No-op when none are loaded.
    pub fn calculate_metric_totals(&mut self) {
        if self.pull_requests.is_empty() {
            return;
        }

        self.total_lines_changed = self.pull_requests.iter().map(|pr| pr.total_changes()).sum();
        self.unique_repos_contributed_to = self
            .pull_requests
            .iter()
            .map(|pr| pr.repository_full_name.clone())
            .collect();
        self.unique_repos_count = self.unique_repos_contributed_to.len() as i64;
    }

    /// Sum earned scores of the loaded pull requests.
    pub fn calculate_score_total(&mut self) {
        self.total_score = self.pull_requests.iter().map(|pr| pr.earned_score).sum();
    }

    /// Scale `total_score` down for miners with too many open pull requests.
    ///
    /// Returns the weight that was applied (1.0 at or under `threshold`).
    pub fn apply_open_pr_spam_penalty(
        &mut self,
        threshold: i64,
        min_weight: f64,
        penalty_slope: f64,
    ) -> f64 {
        if self.total_open_prs <= threshold {
            return 1.0;
        }
        let weight = min_weight.max(1.0 - self.total_open_prs as f64 * penalty_slope);
        self.total_score *= weight;
        weight
    }

    pub fn set_evaluation_failed_reason(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(uid = self.uid, hotkey = %self.hotkey, %reason, "Miner evaluation failed");
        self.failed_reason = Some(reason);
    }
}
