//! Per-round evaluation summaries (append-only)

use crate::db::base::{
    bind_timestamp, bind_uid, decode_opt_timestamp, decode_uid, opt_text, text, BaseRepository,
};
use crate::db::connection::{Connection, Row};
use crate::db::queries::{
    GET_EVALUATIONS_BY_TIMEFRAME, GET_LATEST_MINER_EVALUATION, GET_MINER_EVALUATION,
    SET_MINER_EVALUATION,
};
use crate::error::Result;
use crate::types::MinerEvaluation;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct MinerEvaluationsRepository {
    base: BaseRepository,
}

impl MinerEvaluationsRepository {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self {
            base: BaseRepository::new(conn, "miner_evaluations"),
        }
    }

    /// Pull requests and the repository set are not stored with an
    /// evaluation; only their counts come back.
    fn row_to_evaluation(row: &Row) -> Result<MinerEvaluation> {
        Ok(MinerEvaluation {
            id: row.get("id")?,
            uid: decode_uid(row, "uid")?,
            hotkey: row.get("hotkey")?,
            github_id: row.get("github_id")?,
            total_score: row.get("total_score")?,
            total_lines_changed: row.get("total_lines_changed")?,
            total_open_prs: row.get("total_open_prs")?,
            unique_repos_count: row.get("unique_repos_count")?,
            failed_reason: row.get("failed_reason")?,
            evaluation_timestamp: decode_opt_timestamp(row, "evaluation_timestamp")?,
            pull_requests: Vec::new(),
            unique_repos_contributed_to: BTreeSet::new(),
            stored_total_prs: row.get("total_prs")?,
        })
    }

    pub fn get_miner_evaluation(&self, id: i64) -> Result<Option<MinerEvaluation>> {
        self.base.query_one(
            GET_MINER_EVALUATION,
            &[Value::Integer(id)],
            Self::row_to_evaluation,
        )
    }

    /// Newest evaluation of a miner; ties on timestamp go to the later insert.
    pub fn get_latest_miner_evaluation(
        &self,
        uid: u64,
        hotkey: &str,
    ) -> Result<Option<MinerEvaluation>> {
        self.base.query_one(
            GET_LATEST_MINER_EVALUATION,
            &[bind_uid(uid)?, text(hotkey)],
            Self::row_to_evaluation,
        )
    }

    /// Evaluations with `start <= evaluation_timestamp <= end`.
    pub fn get_evaluations_by_timeframe(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MinerEvaluation>> {
        self.base.query_many(
            GET_EVALUATIONS_BY_TIMEFRAME,
            &[bind_timestamp(&start), bind_timestamp(&end)],
            Self::row_to_evaluation,
        )
    }

    /// Append an evaluation. `evaluation_timestamp` defaults to now.
    pub fn try_set_miner_evaluation(&self, evaluation: &MinerEvaluation) -> Result<()> {
        let timestamp = evaluation.evaluation_timestamp.unwrap_or_else(Utc::now);
        let params = vec![
            bind_uid(evaluation.uid)?,
            text(evaluation.hotkey.as_str()),
            text(evaluation.github_id.as_str()),
            opt_text(evaluation.failed_reason.as_deref()),
            Value::Real(evaluation.total_score),
            Value::Integer(evaluation.total_lines_changed),
            Value::Integer(evaluation.total_open_prs),
            Value::Integer(evaluation.total_prs()?),
            Value::Integer(evaluation.unique_repos_count),
            bind_timestamp(&timestamp),
        ];
        self.base.try_execute(SET_MINER_EVALUATION, &params)?;
        Ok(())
    }

    pub fn set_miner_evaluation(&self, evaluation: &MinerEvaluation) -> bool {
        self.base
            .report(
                "set_miner_evaluation",
                self.try_set_miner_evaluation(evaluation),
            )
            .is_some()
    }
}
