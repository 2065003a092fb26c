//! Miner identity records

use crate::db::base::{bind_uid, decode_uid, text, BaseRepository};
use crate::db::connection::{Connection, Row};
use crate::db::queries::{
    BULK_UPSERT_MINERS, GET_ALL_MINERS, GET_MINER, GET_MINER_BY_GITHUB_ID, GET_MINER_BY_HOTKEY,
    GET_MINER_BY_HOTKEY_AND_GITHUB_ID, GET_MINER_BY_UID, SET_MINER, UPSERT_MINER,
};
use crate::error::Result;
use crate::types::Miner;
use rusqlite::types::Value;
use std::sync::Arc;

pub struct MinersRepository {
    base: BaseRepository,
}

impl MinersRepository {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self {
            base: BaseRepository::new(conn, "miners"),
        }
    }

    fn row_to_miner(row: &Row) -> Result<Miner> {
        Ok(Miner {
            uid: decode_uid(row, "uid")?,
            hotkey: row.get("hotkey")?,
            github_id: row.get("github_id")?,
        })
    }

    fn params(miner: &Miner) -> Result<Vec<Value>> {
        Ok(vec![
            bind_uid(miner.uid)?,
            text(miner.hotkey.as_str()),
            text(miner.github_id.as_str()),
        ])
    }

    /// Get a miner by its full identity
    pub fn get_miner(&self, uid: u64, hotkey: &str, github_id: &str) -> Result<Option<Miner>> {
        self.base.query_one(
            GET_MINER,
            &[bind_uid(uid)?, text(hotkey), text(github_id)],
            Self::row_to_miner,
        )
    }

    /// Most recently seen miner holding `uid`
    pub fn get_miner_by_uid(&self, uid: u64) -> Result<Option<Miner>> {
        self.base
            .query_one(GET_MINER_BY_UID, &[bind_uid(uid)?], Self::row_to_miner)
    }

    pub fn get_miner_by_hotkey(&self, hotkey: &str) -> Result<Option<Miner>> {
        self.base
            .query_one(GET_MINER_BY_HOTKEY, &[text(hotkey)], Self::row_to_miner)
    }

    pub fn get_miner_by_github_id(&self, github_id: &str) -> Result<Option<Miner>> {
        self.base
            .query_one(GET_MINER_BY_GITHUB_ID, &[text(github_id)], Self::row_to_miner)
    }

    pub fn get_miner_by_hotkey_and_github_id(
        &self,
        hotkey: &str,
        github_id: &str,
    ) -> Result<Option<Miner>> {
        self.base.query_one(
            GET_MINER_BY_HOTKEY_AND_GITHUB_ID,
            &[text(hotkey), text(github_id)],
            Self::row_to_miner,
        )
    }

    /// All miners ordered by uid
    pub fn get_all_miners(&self) -> Result<Vec<Miner>> {
        self.base.query_many(GET_ALL_MINERS, &[], Self::row_to_miner)
    }

    /// Insert a miner, leaving an existing record untouched.
    pub fn try_set_miner(&self, miner: &Miner) -> Result<()> {
        self.base.try_execute(SET_MINER, &Self::params(miner)?)?;
        Ok(())
    }

    pub fn set_miner(&self, miner: &Miner) -> bool {
        self.base
            .report("set_miner", self.try_set_miner(miner))
            .is_some()
    }

    /// Insert a miner, or refresh `updated_at` if it is already known.
    pub fn try_upsert_miner(&self, miner: &Miner) -> Result<()> {
        self.base.try_execute(UPSERT_MINER, &Self::params(miner)?)?;
        Ok(())
    }

    pub fn upsert_miner(&self, miner: &Miner) -> bool {
        self.base
            .report("upsert_miner", self.try_upsert_miner(miner))
            .is_some()
    }

    /// Upsert many miners in one unit of work. Returns the number submitted.
    pub fn try_store_miners_bulk(&self, miners: &[Miner]) -> Result<usize> {
        if miners.is_empty() {
            return Ok(0);
        }
        let rows = miners
            .iter()
            .map(Self::params)
            .collect::<Result<Vec<_>>>()?;
        self.base.execute_bulk(&BULK_UPSERT_MINERS, rows)
    }

    pub fn store_miners_bulk(&self, miners: &[Miner]) -> usize {
        self.base
            .report("store_miners_bulk", self.try_store_miners_bulk(miners))
            .unwrap_or(0)
    }
}
