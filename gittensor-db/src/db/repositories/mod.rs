//! One repository per entity, each built on [`BaseRepository`]
//!
//! [`BaseRepository`]: super::base::BaseRepository

mod file_changes;
mod issues;
mod miner_evaluations;
mod miners;
mod pull_requests;
mod repositories;

pub use file_changes::FileChangesRepository;
pub use issues::IssuesRepository;
pub use miner_evaluations::MinerEvaluationsRepository;
pub use miners::MinersRepository;
pub use pull_requests::PullRequestsRepository;
pub use repositories::RepositoriesRepository;
