//! Statement catalog
//!
//! One parameterized statement per (entity, operation). Conflict targets are
//! the natural keys declared as primary keys or unique constraints by the
//! schema scripts. Append-only facts (repositories, pull requests, issues,
//! file changes) use `DO NOTHING`; miners refresh `updated_at` only.
//!
//! Time columns are ordered and filtered through `julianday(..)`, so rows
//! stamped in SQLite's `YYYY-MM-DD HH:MM:SS` form compare by time against
//! the RFC 3339 text this crate writes.

/// Multi-row `INSERT` template.
///
/// `head` ends at `VALUES`; `tail` holds the conflict clause. Rendering for N
/// rows inserts N groups of `columns` anonymous `?` placeholders, bound in
/// row-major order.
#[derive(Debug, Clone, Copy)]
pub struct BulkStatement {
    pub head: &'static str,
    pub columns: usize,
    pub tail: &'static str,
}

impl BulkStatement {
    pub fn render(&self, rows: usize) -> String {
        let group = format!("({})", vec!["?"; self.columns].join(", "));
        let values = vec![group.as_str(); rows].join(",\n    ");
        format!("{}\n    {}\n{}", self.head.trim_end(), values, self.tail.trim())
    }
}

// ============================================
// Miners
// ============================================

pub const GET_MINER: &str = r#"
SELECT uid, hotkey, github_id, created_at, updated_at
FROM miners
WHERE uid = ?1 AND hotkey = ?2 AND github_id = ?3
"#;

pub const GET_MINER_BY_UID: &str = r#"
SELECT uid, hotkey, github_id, created_at, updated_at
FROM miners
WHERE uid = ?1
ORDER BY julianday(updated_at) DESC
LIMIT 1
"#;

pub const GET_MINER_BY_HOTKEY: &str = r#"
SELECT uid, hotkey, github_id, created_at, updated_at
FROM miners
WHERE hotkey = ?1
ORDER BY julianday(updated_at) DESC
LIMIT 1
"#;

pub const GET_MINER_BY_GITHUB_ID: &str = r#"
SELECT uid, hotkey, github_id, created_at, updated_at
FROM miners
WHERE github_id = ?1
ORDER BY julianday(updated_at) DESC
LIMIT 1
"#;

pub const GET_MINER_BY_HOTKEY_AND_GITHUB_ID: &str = r#"
SELECT uid, hotkey, github_id, created_at, updated_at
FROM miners
WHERE hotkey = ?1 AND github_id = ?2
ORDER BY julianday(updated_at) DESC
LIMIT 1
"#;

pub const GET_ALL_MINERS: &str = r#"
SELECT uid, hotkey, github_id, created_at, updated_at
FROM miners
ORDER BY uid, hotkey, github_id
"#;

pub const SET_MINER: &str = r#"
INSERT INTO miners (uid, hotkey, github_id)
VALUES (?1, ?2, ?3)
ON CONFLICT (uid, hotkey, github_id) DO NOTHING
"#;

pub const UPSERT_MINER: &str = r#"
INSERT INTO miners (uid, hotkey, github_id)
VALUES (?1, ?2, ?3)
ON CONFLICT (uid, hotkey, github_id) DO UPDATE SET
    updated_at = (strftime('%Y-%m-%dT%H:%M:%f', 'now') || '000Z')
"#;

pub const BULK_UPSERT_MINERS: BulkStatement = BulkStatement {
    head: "INSERT INTO miners (uid, hotkey, github_id) VALUES",
    columns: 3,
    tail: "ON CONFLICT (uid, hotkey, github_id) DO UPDATE SET updated_at = (strftime('%Y-%m-%dT%H:%M:%f', 'now') || '000Z')",
};

// ============================================
// Repositories
// ============================================

pub const GET_REPOSITORY: &str = r#"
SELECT full_name, name, owner
FROM repositories
WHERE full_name = ?1
"#;

pub const GET_ALL_REPOSITORIES: &str = r#"
SELECT full_name, name, owner
FROM repositories
ORDER BY full_name
"#;

pub const SET_REPOSITORY: &str = r#"
INSERT INTO repositories (full_name, name, owner)
VALUES (?1, ?2, ?3)
ON CONFLICT (full_name) DO NOTHING
"#;

pub const BULK_UPSERT_REPOSITORIES: BulkStatement = BulkStatement {
    head: "INSERT INTO repositories (full_name, name, owner) VALUES",
    columns: 3,
    tail: "ON CONFLICT (full_name) DO NOTHING",
};

// ============================================
// Pull requests
// ============================================

pub const GET_PULL_REQUEST: &str = r#"
SELECT pr.number, pr.repository_full_name, pr.uid, pr.hotkey, pr.github_id,
       pr.earned_score, pr.title, pr.merged_at, pr.pr_created_at,
       pr.additions, pr.deletions, pr.commits, pr.author_login,
       pr.merged_by_login, r.name, r.owner
FROM pull_requests pr
JOIN repositories r ON pr.repository_full_name = r.full_name
WHERE pr.number = ?1 AND pr.repository_full_name = ?2
"#;

pub const GET_PULL_REQUESTS_BY_REPOSITORY: &str = r#"
SELECT pr.number, pr.repository_full_name, pr.uid, pr.hotkey, pr.github_id,
       pr.earned_score, pr.title, pr.merged_at, pr.pr_created_at,
       pr.additions, pr.deletions, pr.commits, pr.author_login,
       pr.merged_by_login, r.name, r.owner
FROM pull_requests pr
JOIN repositories r ON pr.repository_full_name = r.full_name
WHERE pr.repository_full_name = ?1
ORDER BY pr.merged_at DESC, pr.number DESC
"#;

pub const GET_PULL_REQUESTS_BY_MINER: &str = r#"
SELECT pr.number, pr.repository_full_name, pr.uid, pr.hotkey, pr.github_id,
       pr.earned_score, pr.title, pr.merged_at, pr.pr_created_at,
       pr.additions, pr.deletions, pr.commits, pr.author_login,
       pr.merged_by_login, r.name, r.owner
FROM pull_requests pr
JOIN repositories r ON pr.repository_full_name = r.full_name
WHERE pr.uid = ?1 AND pr.hotkey = ?2 AND pr.github_id = ?3
ORDER BY pr.earned_score DESC, pr.merged_at DESC
"#;

pub const GET_PULL_REQUEST_WITH_FILE_CHANGES: &str = r#"
SELECT pr.number, pr.repository_full_name, pr.uid, pr.hotkey, pr.github_id,
       pr.earned_score, pr.title, pr.merged_at, pr.pr_created_at,
       pr.additions, pr.deletions, pr.commits, pr.author_login,
       pr.merged_by_login, r.name, r.owner,
       fc.id AS fc_id, fc.filename AS fc_filename, fc.changes AS fc_changes,
       fc.additions AS fc_additions, fc.deletions AS fc_deletions,
       fc.status AS fc_status, fc.patch AS fc_patch,
       fc.file_extension AS fc_file_extension
FROM pull_requests pr
JOIN repositories r ON pr.repository_full_name = r.full_name
LEFT JOIN file_changes fc
       ON pr.number = fc.pr_number AND pr.repository_full_name = fc.repository_full_name
WHERE pr.number = ?1 AND pr.repository_full_name = ?2
ORDER BY fc.filename
"#;

pub const GET_PULL_REQUESTS_BY_REPOSITORY_WITH_FILE_CHANGES: &str = r#"
SELECT pr.number, pr.repository_full_name, pr.uid, pr.hotkey, pr.github_id,
       pr.earned_score, pr.title, pr.merged_at, pr.pr_created_at,
       pr.additions, pr.deletions, pr.commits, pr.author_login,
       pr.merged_by_login, r.name, r.owner,
       fc.id AS fc_id, fc.filename AS fc_filename, fc.changes AS fc_changes,
       fc.additions AS fc_additions, fc.deletions AS fc_deletions,
       fc.status AS fc_status, fc.patch AS fc_patch,
       fc.file_extension AS fc_file_extension
FROM pull_requests pr
JOIN repositories r ON pr.repository_full_name = r.full_name
LEFT JOIN file_changes fc
       ON pr.number = fc.pr_number AND pr.repository_full_name = fc.repository_full_name
WHERE pr.repository_full_name = ?1
ORDER BY pr.merged_at DESC, pr.number DESC, fc.filename
"#;

pub const SET_PULL_REQUEST: &str = r#"
INSERT INTO pull_requests (
    number, repository_full_name, uid, hotkey, github_id, earned_score,
    title, merged_at, pr_created_at, additions, deletions, commits,
    author_login, merged_by_login
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
ON CONFLICT (number, repository_full_name) DO NOTHING
"#;

pub const BULK_UPSERT_PULL_REQUESTS: BulkStatement = BulkStatement {
    head: "INSERT INTO pull_requests (
    number, repository_full_name, uid, hotkey, github_id, earned_score,
    title, merged_at, pr_created_at, additions, deletions, commits,
    author_login, merged_by_login
) VALUES",
    columns: 14,
    tail: "ON CONFLICT (number, repository_full_name) DO NOTHING",
};

// ============================================
// Issues
// ============================================

pub const GET_ISSUE: &str = r#"
SELECT number, pr_number, repository_full_name, title, created_at, closed_at
FROM issues
WHERE number = ?1 AND repository_full_name = ?2
"#;

pub const GET_ISSUES_BY_REPOSITORY: &str = r#"
SELECT number, pr_number, repository_full_name, title, created_at, closed_at
FROM issues
WHERE repository_full_name = ?1
ORDER BY created_at DESC, number DESC
"#;

pub const SET_ISSUE: &str = r#"
INSERT INTO issues (
    number, pr_number, repository_full_name, title, created_at, closed_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT (number, repository_full_name) DO NOTHING
"#;

pub const BULK_UPSERT_ISSUES: BulkStatement = BulkStatement {
    head: "INSERT INTO issues (
    number, pr_number, repository_full_name, title, created_at, closed_at
) VALUES",
    columns: 6,
    tail: "ON CONFLICT (number, repository_full_name) DO NOTHING",
};

// ============================================
// File changes
// ============================================

pub const GET_FILE_CHANGE: &str = r#"
SELECT id, pr_number, repository_full_name, filename, changes, additions,
       deletions, status, patch, file_extension, created_at
FROM file_changes
WHERE id = ?1
"#;

pub const GET_FILE_CHANGES_BY_PR: &str = r#"
SELECT id, pr_number, repository_full_name, filename, changes, additions,
       deletions, status, patch, file_extension, created_at
FROM file_changes
WHERE pr_number = ?1 AND repository_full_name = ?2
ORDER BY filename
"#;

pub const SET_FILE_CHANGE: &str = r#"
INSERT INTO file_changes (
    pr_number, repository_full_name, filename, changes, additions,
    deletions, status, patch, file_extension
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
ON CONFLICT (pr_number, repository_full_name, filename) DO NOTHING
"#;

pub const BULK_UPSERT_FILE_CHANGES: BulkStatement = BulkStatement {
    head: "INSERT INTO file_changes (
    pr_number, repository_full_name, filename, changes, additions,
    deletions, status, patch, file_extension
) VALUES",
    columns: 9,
    tail: "ON CONFLICT (pr_number, repository_full_name, filename) DO NOTHING",
};

// ============================================
// Miner evaluations
// ============================================

pub const GET_MINER_EVALUATION: &str = r#"
SELECT id, uid, hotkey, github_id, failed_reason, total_score,
       total_lines_changed, total_open_prs, total_prs,
       unique_repos_count, evaluation_timestamp
FROM miner_evaluations
WHERE id = ?1
"#;

pub const GET_LATEST_MINER_EVALUATION: &str = r#"
SELECT id, uid, hotkey, github_id, failed_reason, total_score,
       total_lines_changed, total_open_prs, total_prs,
       unique_repos_count, evaluation_timestamp
FROM miner_evaluations
WHERE uid = ?1 AND hotkey = ?2
ORDER BY julianday(evaluation_timestamp) DESC, id DESC
LIMIT 1
"#;

pub const GET_EVALUATIONS_BY_TIMEFRAME: &str = r#"
SELECT id, uid, hotkey, github_id, failed_reason, total_score,
       total_lines_changed, total_open_prs, total_prs,
       unique_repos_count, evaluation_timestamp
FROM miner_evaluations
WHERE julianday(evaluation_timestamp) BETWEEN julianday(?1) AND julianday(?2)
ORDER BY julianday(evaluation_timestamp) DESC, total_score DESC
"#;

pub const SET_MINER_EVALUATION: &str = r#"
INSERT INTO miner_evaluations (
    uid, hotkey, github_id, failed_reason, total_score,
    total_lines_changed, total_open_prs, total_prs, unique_repos_count,
    evaluation_timestamp
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
"#;
