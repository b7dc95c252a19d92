// Copyright (c) James Kassemi, SC, US. All rights reserved.
use anomaly_detector::{AnomalyDetector, summarize, top};
use chrono::{DateTime, NaiveDate, Utc};
use core_types::config::FetchStrategy;
use core_types::types::{DataSource, HistorySnapshot};
use history_analyzer::{HistoryAnalyzer, HistoryStoreError};
use hybrid_fetcher::{FetchError, FetchOutcome, HybridFetcher};
use log::{info, warn};
use market_calendar::SessionCalendar;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

const SUMMARY_TICKERS: usize = 10;
const SUMMARY_ANOMALIES: usize = 5;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    History(#[from] HistoryStoreError),
    #[error("fetch produced no data (source {0})")]
    NoData(DataSource),
}

/// One processed date. `persisted` is `None` when a snapshot for the date
/// already existed.
#[derive(Debug)]
pub struct DayReport {
    pub snapshot: HistorySnapshot,
    pub persisted: Option<PathBuf>,
}

#[derive(Debug, Default, PartialEq)]
pub struct BackfillReport {
    pub saved: Vec<NaiveDate>,
    pub skipped: Vec<NaiveDate>,
    pub missing: Vec<NaiveDate>,
}

/// Fetch, history, anomalies, persist.
pub struct Pipeline {
    fetcher: HybridFetcher,
    history: HistoryAnalyzer,
    detector: AnomalyDetector,
    calendar: Arc<dyn SessionCalendar>,
}

impl Pipeline {
    pub fn new(
        fetcher: HybridFetcher,
        history: HistoryAnalyzer,
        detector: AnomalyDetector,
        calendar: Arc<dyn SessionCalendar>,
    ) -> Self {
        Self {
            fetcher,
            history,
            detector,
            calendar,
        }
    }

    pub async fn run_day(
        &self,
        strategy: FetchStrategy,
        target: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Result<DayReport, PipelineError> {
        let outcome = self.fetcher.fetch_at(strategy, target, now).await?;
        self.process(outcome).await
    }

    /// Runs every trading day in `start..=end` from its own bulk file.
    /// Dates that already have a snapshot or have no bulk file are skipped.
    pub async fn backfill(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<BackfillReport, PipelineError> {
        let days = self.calendar.trading_days_in_range(start, end);
        info!("[pulse] backfill {start} to {end}: {} trading days", days.len());
        let mut report = BackfillReport::default();
        for (idx, day) in days.iter().copied().enumerate() {
            if self.history.store().exists(day).await {
                info!("[pulse] [{}/{}] {day} already stored", idx + 1, days.len());
                report.skipped.push(day);
                continue;
            }
            let outcome = self.fetcher.fetch_day(day, now).await;
            if outcome.metadata.data_source == DataSource::Failed {
                warn!("[pulse] [{}/{}] {day} has no bulk file", idx + 1, days.len());
                report.missing.push(day);
                continue;
            }
            let day_report = self.process(outcome).await?;
            if day_report.persisted.is_some() {
                report.saved.push(day);
            } else {
                report.skipped.push(day);
            }
        }
        info!(
            "[pulse] backfill done: {} saved, {} skipped, {} missing",
            report.saved.len(),
            report.skipped.len(),
            report.missing.len()
        );
        Ok(report)
    }

    async fn process(&self, outcome: FetchOutcome) -> Result<DayReport, PipelineError> {
        let FetchOutcome { mut data, metadata } = outcome;
        let date = match metadata.csv_date.or(metadata.target_date) {
            Some(date) if !data.is_empty() => date,
            _ => return Err(PipelineError::NoData(metadata.data_source)),
        };

        self.history.annotate(date, &mut data).await;
        let anomalies = self.detector.detect(&data);
        let summary = summarize(&anomalies);
        let snapshot = HistorySnapshot::new(date, metadata, data, anomalies, summary);

        let persisted = match self.history.store().save(&snapshot).await {
            Ok(path) => {
                info!("[pulse] saved {}", path.display());
                Some(path)
            }
            Err(HistoryStoreError::AlreadyExists(existing)) => {
                warn!("[pulse] snapshot for {existing} already exists; leaving it untouched");
                None
            }
            Err(err) => return Err(err.into()),
        };
        Ok(DayReport { snapshot, persisted })
    }
}

/// Top rankings and anomalies of a processed day, through the logger.
pub fn log_summary(snapshot: &HistorySnapshot) {
    info!(
        "[pulse] {}: {} underlyings, {} anomalies, source {}",
        snapshot.date, snapshot.tickers_count, snapshot.anomalies_count, snapshot.data_source
    );
    if let Some(meta) = &snapshot.metadata {
        if let Some(reason) = &meta.oi_skip_reason {
            info!("[pulse] open interest skipped: {reason}");
        }
        if !meta.enrichment_failures.is_empty() {
            warn!("[pulse] lookups failed for {}", meta.enrichment_failures.join(", "));
        }
    }
    for (idx, agg) in snapshot.data.iter().take(SUMMARY_TICKERS).enumerate() {
        let icon = agg.history.as_ref().map(|h| h.icon.as_str()).unwrap_or("");
        info!(
            "[pulse] #{:<2} {icon} {:<6} vol={:<10} c/p={:<6.2} oi={:<10} leap c/p={:.2}",
            idx + 1,
            agg.ticker,
            agg.total_volume,
            agg.cp_volume_ratio,
            agg.total_oi,
            agg.leap_cp_ratio
        );
    }
    for anomaly in top(&snapshot.anomalies, SUMMARY_ANOMALIES) {
        info!(
            "[pulse] [{}] {} {}: {}",
            anomaly.severity, anomaly.ticker, anomaly.kind, anomaly.description
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aggregations::{ChainContract, ContractRow};
    use anomaly_detector::AnomalyThresholds;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use core_types::opra::{ContractType, Strike};
    use core_types::types::{AnomalySummary, FetchMetadata, UnderlyingAggregate};
    use flatfile_source::{BulkFetchError, DayAggregateSource};
    use history_analyzer::HistoryStore;
    use hybrid_fetcher::FetchSettings;
    use market_calendar::HolidayCalendar;
    use options_chain_service::{ChainSnapshotSource, SnapshotError};
    use std::collections::HashSet;
    use std::time::Duration;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn monday_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 8, 13, 0, 0).unwrap()
    }

    struct FakeBulk {
        dates: HashSet<NaiveDate>,
    }

    #[async_trait]
    impl DayAggregateSource for FakeBulk {
        async fn fetch_rows(
            &self,
            date: NaiveDate,
            _now: DateTime<Utc>,
        ) -> Result<Vec<ContractRow>, BulkFetchError> {
            if !self.dates.contains(&date) {
                return Err(BulkFetchError::NotFound {
                    key: date.to_string(),
                });
            }
            let mut rows = vec![
                ContractRow::new("O:AAA250117C00050000", 40_000, 400),
                ContractRow::new("O:AAA250117P00050000", 10_000, 100),
            ];
            rows.extend((0..8u8).map(|i| {
                let root = format!("T{}X", (b'A' + i) as char);
                ContractRow::new(format!("O:{root}240719C00010000"), 1_000 + u64::from(i), 10)
            }));
            Ok(rows)
        }

        async fn probe_access(&self, _date: NaiveDate) -> bool {
            true
        }
    }

    struct FakeChain;

    #[async_trait]
    impl ChainSnapshotSource for FakeChain {
        async fn fetch_chain(&self, underlying: &str) -> Result<Vec<ChainContract>, SnapshotError> {
            if underlying != "AAA" {
                return Err(SnapshotError::Status(404));
            }
            Ok(vec![ChainContract {
                contract: "O:AAA250117C00050000".to_string(),
                contract_type: Some(ContractType::Call),
                strike: Some(Strike::from_thousandths(50_000)),
                expiration: Some(d(2025, 1, 17)),
                day_volume: 40_000,
                open_interest: 10_000,
            }])
        }
    }

    fn pipeline(dir: &std::path::Path, dates: &[NaiveDate]) -> Pipeline {
        let calendar = Arc::new(HolidayCalendar::new([d(2024, 7, 4)]));
        let settings = FetchSettings {
            attempt_delay: Duration::from_millis(1),
            call_delay: Duration::ZERO,
            watchlist: vec!["AAA".to_string()],
            ..FetchSettings::default()
        };
        let fetcher = HybridFetcher::new(
            Arc::new(FakeBulk {
                dates: dates.iter().copied().collect(),
            }),
            Arc::new(FakeChain),
            calendar.clone(),
            settings,
        );
        Pipeline::new(
            fetcher,
            HistoryAnalyzer::new(HistoryStore::new(dir), 10, 30, 30),
            AnomalyDetector::new(AnomalyThresholds::default()),
            calendar,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn run_day_persists_annotated_snapshot_once() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), &[d(2024, 7, 5)]);

        let report = pipeline
            .run_day(FetchStrategy::Auto, Some(d(2024, 7, 6)), monday_morning())
            .await
            .unwrap();
        let path = report.persisted.unwrap();
        assert!(path.ends_with("2024-07-05.json"));

        let snapshot = &report.snapshot;
        assert_eq!(snapshot.date, d(2024, 7, 5));
        assert_eq!(snapshot.data_source, DataSource::CsvApi);
        assert_eq!(snapshot.tickers_count, 9);
        assert_eq!(snapshot.data[0].ticker, "AAA");
        assert_eq!(snapshot.data[0].total_oi, 10_000);
        assert!(snapshot.data.iter().all(|agg| agg.history.is_some()));
        assert_eq!(snapshot.anomalies_count, snapshot.anomalies.len());
        assert!(snapshot.summary.by_type.contains_key(&core_types::types::AnomalyKind::VolumeSpike));
        log_summary(snapshot);

        let stored = HistoryStore::new(dir.path()).load(d(2024, 7, 5)).await.unwrap();
        assert_eq!(stored.tickers_count, 9);

        let again = pipeline
            .run_day(FetchStrategy::Auto, Some(d(2024, 7, 5)), monday_morning())
            .await
            .unwrap();
        assert!(again.persisted.is_none());
        let unchanged = HistoryStore::new(dir.path()).load(d(2024, 7, 5)).await.unwrap();
        assert_eq!(unchanged.timestamp, stored.timestamp);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), &[]);
        let err = pipeline
            .run_day(FetchStrategy::CsvOnly, Some(d(2024, 7, 5)), monday_morning())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoData(DataSource::Failed)));
        assert!(!HistoryStore::new(dir.path()).exists(d(2024, 7, 5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn backfill_skips_stored_and_missing_dates() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        let seeded = d(2024, 7, 2);
        store
            .save(&HistorySnapshot::new(
                seeded,
                FetchMetadata::new(DataSource::Csv, Some(seeded)),
                vec![UnderlyingAggregate::new("AAA")],
                Vec::new(),
                AnomalySummary::default(),
            ))
            .await
            .unwrap();

        let pipeline = pipeline(dir.path(), &[d(2024, 7, 1), d(2024, 7, 2), d(2024, 7, 3)]);
        let report = pipeline
            .backfill(d(2024, 7, 1), d(2024, 7, 5), monday_morning())
            .await
            .unwrap();
        assert_eq!(
            report,
            BackfillReport {
                saved: vec![d(2024, 7, 1), d(2024, 7, 3)],
                skipped: vec![d(2024, 7, 2)],
                missing: vec![d(2024, 7, 5)],
            }
        );

        let latest = store.load(d(2024, 7, 3)).await.unwrap();
        let aaa = latest.data[0].history.as_ref().unwrap();
        assert_eq!(aaa.appearances, 3);
        assert_eq!(aaa.streak, 3);
        assert!(latest.metadata.unwrap().oi_skipped);
    }
}
