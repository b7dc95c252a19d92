// Copyright (c) James Kassemi, SC, US. All rights reserved.
use crate::cache::{BulkFileCache, cache_entry_is_stale};
use crate::decode::parse_day_aggregates;
use crate::errors::BulkFetchError;
use crate::store::{BulkFileStore, HttpsStore, S3Store, day_key};
use aggregations::ContractRow;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use core_types::config::AppConfig;
use log::{debug, info, warn};
use market_calendar::SessionCalendar;
use std::sync::Arc;
use std::time::Duration;

/// Day-aggregate rows for one trading date.
#[async_trait]
pub trait DayAggregateSource: Send + Sync {
    async fn fetch_rows(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<ContractRow>, BulkFetchError>;

    /// Whether the account can read bulk files at all, judged by a
    /// metadata-only request for `date`.
    async fn probe_access(&self, date: NaiveDate) -> bool;
}

/// Bulk files from an ordered list of stores with an optional local cache.
/// A store that reports the file absent ends the lookup; any other failure
/// moves on to the next store.
pub struct FlatfileSource {
    dataset: String,
    stores: Vec<Arc<dyn BulkFileStore>>,
    cache: Option<Arc<dyn BulkFileCache>>,
    calendar: Arc<dyn SessionCalendar>,
}

impl FlatfileSource {
    pub fn new(
        dataset: impl Into<String>,
        stores: Vec<Arc<dyn BulkFileStore>>,
        cache: Option<Arc<dyn BulkFileCache>>,
        calendar: Arc<dyn SessionCalendar>,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            stores,
            cache,
            calendar,
        }
    }

    /// S3 first when credentials are configured, then HTTPS with the API key.
    pub fn from_config(
        config: &AppConfig,
        cache: Option<Arc<dyn BulkFileCache>>,
        calendar: Arc<dyn SessionCalendar>,
    ) -> Result<Self, BulkFetchError> {
        let flatfile = &config.flatfile;
        let mut stores: Vec<Arc<dyn BulkFileStore>> = Vec::new();
        if config.has_s3_credentials() {
            stores.push(Arc::new(S3Store::new(
                &flatfile.s3_endpoint,
                &flatfile.region,
                &flatfile.bucket,
                &config.polygon_s3_access_key,
                &config.polygon_s3_secret_key,
            )));
        }
        stores.push(Arc::new(HttpsStore::new(
            &flatfile.https_base,
            &config.polygon_api_key,
            Duration::from_secs(config.enrichment.request_timeout_secs.max(30)),
        )?));
        Ok(Self::new(flatfile.dataset.clone(), stores, cache, calendar))
    }

    pub fn key_for(&self, date: NaiveDate) -> String {
        day_key(&self.dataset, date)
    }

    async fn download(&self, key: &str) -> Result<Bytes, BulkFetchError> {
        let mut last_err = BulkFetchError::Transport("no bulk file stores configured".to_string());
        for store in &self.stores {
            match store.fetch(key).await {
                Ok(data) => {
                    info!("[flatfile] {} downloaded {key} ({} bytes)", store.name(), data.len());
                    return Ok(data);
                }
                Err(err @ BulkFetchError::NotFound { .. }) => return Err(err),
                Err(err) => {
                    warn!("[flatfile] {} failed for {key}: {err}", store.name());
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    async fn cached(&self, date: NaiveDate, now: DateTime<Utc>) -> Option<Vec<ContractRow>> {
        let cache = self.cache.as_ref()?;
        if cache_entry_is_stale(self.calendar.as_ref(), date, now) {
            debug!("[flatfile] cache entry for {date} is stale during the live session");
            if let Err(err) = cache.invalidate(date).await {
                warn!("[flatfile] cache invalidate {date} failed: {err}");
            }
            return None;
        }
        let data = match cache.get(date).await {
            Ok(hit) => hit?,
            Err(err) => {
                warn!("[flatfile] cache read {date} failed: {err}");
                return None;
            }
        };
        match parse_day_aggregates(&data).await {
            Ok(rows) => {
                info!("[flatfile] cache hit for {date}: {} rows", rows.len());
                Some(rows)
            }
            Err(err) => {
                warn!("[flatfile] cached file for {date} unreadable ({err}); discarding");
                if let Err(err) = cache.invalidate(date).await {
                    warn!("[flatfile] cache invalidate {date} failed: {err}");
                }
                None
            }
        }
    }
}

#[async_trait]
impl DayAggregateSource for FlatfileSource {
    async fn fetch_rows(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<ContractRow>, BulkFetchError> {
        if let Some(rows) = self.cached(date, now).await {
            return Ok(rows);
        }
        let key = self.key_for(date);
        let data = self.download(&key).await?;
        let rows = parse_day_aggregates(&data).await?;
        info!("[flatfile] parsed {} contract rows for {date}", rows.len());
        if let Some(cache) = self.cache.as_ref() {
            if let Err(err) = cache.put(date, &data).await {
                warn!("[flatfile] cache write {date} failed: {err}");
            }
        }
        Ok(rows)
    }

    async fn probe_access(&self, date: NaiveDate) -> bool {
        let key = self.key_for(date);
        for store in &self.stores {
            match store.exists(&key).await {
                Ok(found) => {
                    debug!("[flatfile] {} probe {key}: found={found}", store.name());
                    if found {
                        return true;
                    }
                }
                Err(err) => debug!("[flatfile] {} probe {key} failed: {err}", store.name()),
            }
        }
        false
    }
}
