// Copyright (c) James Kassemi, SC, US. All rights reserved.
use chrono::NaiveDate;
use core_types::types::HistorySnapshot;
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum HistoryStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("snapshot for {0} already exists")]
    AlreadyExists(NaiveDate),
}

/// Directory of `{YYYY-MM-DD}.json` snapshots, one per trading date.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
}

#[derive(Deserialize)]
struct RankingDoc {
    #[serde(default)]
    data: Vec<RankingEntry>,
}

#[derive(Deserialize)]
struct RankingEntry {
    ticker: String,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    pub async fn exists(&self, date: NaiveDate) -> bool {
        fs::try_exists(self.path_for(date)).await.unwrap_or(false)
    }

    pub async fn load(&self, date: NaiveDate) -> Result<HistorySnapshot, HistoryStoreError> {
        let raw = fs::read(self.path_for(date)).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Tickers of the first `top_k` entries of a snapshot, in stored order.
    /// Only the ticker field is read, so documents written by older
    /// versions still rank.
    pub async fn load_rankings(
        &self,
        date: NaiveDate,
        top_k: usize,
    ) -> Result<Vec<String>, HistoryStoreError> {
        let raw = fs::read(self.path_for(date)).await?;
        let doc: RankingDoc = serde_json::from_slice(&raw)?;
        Ok(doc.data.into_iter().take(top_k).map(|entry| entry.ticker).collect())
    }

    /// Writes the snapshot for its date. An existing document is never
    /// replaced.
    pub async fn save(&self, snapshot: &HistorySnapshot) -> Result<PathBuf, HistoryStoreError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(snapshot.date);
        match fs::metadata(&path).await {
            Ok(_) => return Err(HistoryStoreError::AlreadyExists(snapshot.date)),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        let body = serde_json::to_vec_pretty(snapshot)?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, &body).await?;
        if let Err(err) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        Ok(path)
    }
}
