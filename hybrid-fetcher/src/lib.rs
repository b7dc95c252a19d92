// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Chooses between the bulk day-aggregate file and the live chain snapshot,
//! steps back across trading days when the bulk file is unavailable, and
//! enriches the most active underlyings with open interest.

mod watchlist;

pub use watchlist::{WATCHLIST, default_watchlist};

use aggregations::{aggregate_by_underlying, aggregate_chain, open_interest_profile};
use chrono::{DateTime, NaiveDate, Utc};
use core_types::config::{AppConfig, FetchStrategy};
use core_types::retry::RetryPolicy;
use core_types::types::{BulkAttempt, DataSource, FetchMetadata, UnderlyingAggregate};
use flatfile_source::{BulkFetchError, DayAggregateSource};
use log::{error, info, warn};
use market_calendar::{CalendarError, SessionCalendar, exchange_date};
use options_chain_service::ChainSnapshotSource;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub top_n: usize,
    pub max_bulk_attempts: usize,
    pub attempt_delay: Duration,
    pub attempt_jitter: f64,
    pub call_delay: Duration,
    pub enrich: bool,
    pub watchlist: Vec<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            top_n: 30,
            max_bulk_attempts: 3,
            attempt_delay: Duration::from_millis(500),
            attempt_jitter: 0.2,
            call_delay: Duration::from_millis(100),
            enrich: true,
            watchlist: default_watchlist(),
        }
    }
}

impl FetchSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            top_n: config.enrichment.top_n,
            max_bulk_attempts: config.flatfile.max_bulk_attempts.max(1),
            attempt_delay: Duration::from_millis(config.flatfile.attempt_delay_ms),
            attempt_jitter: config.flatfile.attempt_jitter_pct,
            call_delay: Duration::from_millis(config.enrichment.call_delay_ms),
            enrich: config.enrichment.enabled,
            watchlist: match &config.enrichment.watchlist {
                Some(symbols) if !symbols.is_empty() => symbols.clone(),
                _ => default_watchlist(),
            },
        }
    }
}

/// Aggregates in volume-descending order plus a record of how they were
/// produced.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub data: Vec<UnderlyingAggregate>,
    pub metadata: FetchMetadata,
}

pub struct HybridFetcher {
    bulk: Arc<dyn DayAggregateSource>,
    chain: Arc<dyn ChainSnapshotSource>,
    calendar: Arc<dyn SessionCalendar>,
    settings: FetchSettings,
}

impl HybridFetcher {
    pub fn new(
        bulk: Arc<dyn DayAggregateSource>,
        chain: Arc<dyn ChainSnapshotSource>,
        calendar: Arc<dyn SessionCalendar>,
        settings: FetchSettings,
    ) -> Self {
        Self {
            bulk,
            chain,
            calendar,
            settings,
        }
    }

    pub async fn fetch(
        &self,
        strategy: FetchStrategy,
        target: Option<NaiveDate>,
    ) -> Result<FetchOutcome, FetchError> {
        self.fetch_at(strategy, target, Utc::now()).await
    }

    /// Runs one fetch as of `now`. Without an explicit `target` the most
    /// recently completed session is used.
    pub async fn fetch_at(
        &self,
        strategy: FetchStrategy,
        target: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Result<FetchOutcome, FetchError> {
        let target = match target {
            Some(date) => date,
            None => self.calendar.last_completed_session(now)?,
        };
        info!("[fetch] strategy={strategy} target={target}");

        if strategy == FetchStrategy::ApiOnly {
            let metadata = FetchMetadata::new(DataSource::Api, Some(target));
            return Ok(self.fetch_via_api(target, metadata).await);
        }

        let bulk = self.fetch_bulk(self.bulk_dates(target), now).await;
        Ok(self.complete(strategy, target, bulk, now).await)
    }

    /// Bulk file for exactly `date`: no stepping back and no snapshot
    /// fallback.
    pub async fn fetch_day(&self, date: NaiveDate, now: DateTime<Utc>) -> FetchOutcome {
        info!("[fetch] single-day bulk fetch for {date}");
        let bulk = self.fetch_bulk(vec![date], now).await;
        self.complete(FetchStrategy::CsvOnly, date, bulk, now).await
    }

    async fn complete(
        &self,
        strategy: FetchStrategy,
        target: NaiveDate,
        bulk: BulkResult,
        now: DateTime<Utc>,
    ) -> FetchOutcome {
        let mut metadata = FetchMetadata::new(DataSource::Csv, Some(target));
        metadata.attempts = bulk.attempts;

        let Some((csv_date, mut data)) = bulk.result else {
            if strategy == FetchStrategy::Auto {
                warn!("[fetch] bulk file unavailable for {target}; falling back to watchlist snapshots");
                metadata.data_source = DataSource::Api;
                return self.fetch_via_api(target, metadata).await;
            }
            error!("[fetch] bulk file unavailable for {target}; no fallback in {strategy} mode");
            metadata.data_source = DataSource::Failed;
            return FetchOutcome {
                data: Vec::new(),
                metadata,
            };
        };

        metadata.csv_date = Some(csv_date);
        let today = exchange_date(now);
        if !self.settings.enrich {
            metadata.oi_skipped = true;
            metadata.oi_skip_reason = Some("open interest enrichment disabled".to_string());
        } else if self.calendar.has_trading_days_strictly_between(csv_date, today) {
            let reason = format!(
                "trading sessions between {csv_date} and {today}; current open interest would not describe {csv_date}"
            );
            info!("[fetch] skipping open interest: {reason}");
            metadata.oi_skipped = true;
            metadata.oi_skip_reason = Some(reason);
        } else {
            self.enrich_top(&mut data, &mut metadata).await;
            if metadata.enriched > 0 {
                metadata.data_source = DataSource::CsvApi;
            }
        }

        FetchOutcome { data, metadata }
    }

    /// Target first, then each previous trading day, up to the attempt bound.
    fn bulk_dates(&self, target: NaiveDate) -> Vec<NaiveDate> {
        let mut dates = vec![target];
        while dates.len() < self.settings.max_bulk_attempts {
            let Some(last) = dates.last().copied() else {
                break;
            };
            match self.calendar.previous_trading_day(last) {
                Ok(prev) => dates.push(prev),
                Err(err) => {
                    warn!("[fetch] cannot step back from {last}: {err}");
                    break;
                }
            }
        }
        dates
    }

    async fn bulk_attempt(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<UnderlyingAggregate>, BulkFetchError> {
        let rows = self.bulk.fetch_rows(date, now).await?;
        let data = aggregate_by_underlying(&rows, date);
        if data.is_empty() {
            return Err(BulkFetchError::Parse(format!(
                "{} rows produced no underlying with volume",
                rows.len()
            )));
        }
        Ok(data)
    }

    async fn fetch_bulk(&self, dates: Vec<NaiveDate>, now: DateTime<Utc>) -> BulkResult {
        let total = dates.len();
        let log = Mutex::new(Vec::with_capacity(total));
        let policy = RetryPolicy::fixed(total, self.settings.attempt_delay.as_millis() as u64)
            .with_jitter(self.settings.attempt_jitter);

        let result = policy
            .retry_async(|attempt| {
                let date = dates[attempt];
                let log = &log;
                async move {
                    match self.bulk_attempt(date, now).await {
                        Ok(data) => {
                            info!("[fetch] bulk file {date}: {} underlyings", data.len());
                            log.lock().push(BulkAttempt {
                                date,
                                outcome: format!("ok: {} underlyings", data.len()),
                            });
                            Ok((date, data))
                        }
                        Err(err) => {
                            warn!("[fetch] bulk attempt {}/{total} for {date} failed: {err}", attempt + 1);
                            log.lock().push(BulkAttempt {
                                date,
                                outcome: format!("{}: {err}", err.kind()),
                            });
                            Err(err)
                        }
                    }
                }
            })
            .await;

        BulkResult {
            result: result.ok(),
            attempts: log.into_inner(),
        }
    }

    /// Fills open interest for the first `top_n` aggregates in place. A
    /// failed lookup leaves that aggregate unenriched.
    async fn enrich_top(&self, data: &mut [UnderlyingAggregate], metadata: &mut FetchMetadata) {
        let top_n = self.settings.top_n.min(data.len());
        info!("[fetch] enriching top {top_n} underlyings with open interest");
        for (idx, agg) in data.iter_mut().take(top_n).enumerate() {
            if idx > 0 && !self.settings.call_delay.is_zero() {
                sleep(self.settings.call_delay).await;
            }
            match self.chain.fetch_chain(&agg.ticker).await {
                Ok(contracts) => {
                    open_interest_profile(&contracts).apply_to(agg);
                    metadata.enriched += 1;
                    info!("[fetch] [{}/{top_n}] {} OI={}", idx + 1, agg.ticker, agg.total_oi);
                }
                Err(err) => {
                    warn!("[fetch] [{}/{top_n}] {} enrichment failed: {err}", idx + 1, agg.ticker);
                    metadata.enrichment_failures.push(agg.ticker.clone());
                }
            }
        }
        info!("[fetch] enrichment complete: {}/{top_n}", metadata.enriched);
    }

    /// Lower-fidelity path: every watchlist underlying aggregated from its
    /// chain snapshot.
    async fn fetch_via_api(&self, target: NaiveDate, mut metadata: FetchMetadata) -> FetchOutcome {
        let total = self.settings.watchlist.len();
        let mut data = Vec::with_capacity(total);
        for (idx, ticker) in self.settings.watchlist.iter().enumerate() {
            if idx > 0 && !self.settings.call_delay.is_zero() {
                sleep(self.settings.call_delay).await;
            }
            match self.chain.fetch_chain(ticker).await {
                Ok(contracts) => match aggregate_chain(ticker, &contracts, target) {
                    Some(agg) => {
                        info!("[fetch] [{}/{total}] {ticker} vol={}", idx + 1, agg.total_volume);
                        data.push(agg);
                    }
                    None => info!("[fetch] [{}/{total}] {ticker} no volume", idx + 1),
                },
                Err(err) => {
                    warn!("[fetch] [{}/{total}] {ticker} snapshot failed: {err}", idx + 1);
                    metadata.enrichment_failures.push(ticker.clone());
                }
            }
        }
        data.sort_by(|a, b| b.total_volume.cmp(&a.total_volume));
        metadata.enriched = data.len();
        if data.is_empty() {
            error!("[fetch] watchlist snapshots produced no data");
            metadata.data_source = DataSource::Failed;
        }
        FetchOutcome { data, metadata }
    }
}

struct BulkResult {
    result: Option<(NaiveDate, Vec<UnderlyingAggregate>)>,
    attempts: Vec<BulkAttempt>,
}
