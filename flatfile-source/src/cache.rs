// Copyright (c) James Kassemi, SC, US. All rights reserved.
use crate::errors::BulkFetchError;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use market_calendar::{SessionCalendar, exchange_date};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;

/// Local copy of compressed bulk files, keyed by trading date.
#[async_trait]
pub trait BulkFileCache: Send + Sync {
    async fn get(&self, date: NaiveDate) -> Result<Option<Bytes>, BulkFetchError>;
    async fn put(&self, date: NaiveDate, data: &Bytes) -> Result<(), BulkFetchError>;
    async fn invalidate(&self, date: NaiveDate) -> Result<(), BulkFetchError>;
}

/// A cached file for `date` cannot be trusted while that date's regular
/// session is still trading.
pub fn cache_entry_is_stale(calendar: &dyn SessionCalendar, date: NaiveDate, now: DateTime<Utc>) -> bool {
    date == exchange_date(now) && calendar.is_session_live(now)
}

/// One `{date}.csv.gz` per entry. Writes land in a temp file first and are
/// renamed into place.
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.csv.gz", date.format("%Y-%m-%d")))
    }
}

#[async_trait]
impl BulkFileCache for DiskCache {
    async fn get(&self, date: NaiveDate) -> Result<Option<Bytes>, BulkFetchError> {
        match fs::read(self.path_for(date)).await {
            Ok(data) if data.is_empty() => Ok(None),
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn put(&self, date: NaiveDate, data: &Bytes) -> Result<(), BulkFetchError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(date);
        let tmp_path = path.with_extension("gz.tmp");
        fs::write(&tmp_path, data).await?;
        if let Err(err) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn invalidate(&self, date: NaiveDate) -> Result<(), BulkFetchError> {
        match fs::remove_file(self.path_for(date)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
