// Copyright (c) James Kassemi, SC, US. All rights reserved.
mod pipeline;

use std::{env, process, sync::Arc};

use anomaly_detector::AnomalyDetector;
use chrono::{NaiveDate, Utc};
use core_types::config::{AppConfig, ConfigError, FetchStrategy};
use flatfile_source::{BulkFetchError, BulkFileCache, DayAggregateSource, DiskCache, FlatfileSource};
use history_analyzer::HistoryAnalyzer;
use hybrid_fetcher::{FetchSettings, HybridFetcher};
use log::{info, warn};
use market_calendar::{CalendarError, NyseCalendar, SessionCalendar};
use options_chain_service::{SnapshotClient, SnapshotError};
use pipeline::{Pipeline, PipelineError, log_summary};
use thiserror::Error;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        eprintln!("options-pulse failed: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    let command = Command::parse(env::args().skip(1))?;
    let config = AppConfig::load()?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(AppError::Runtime)?;
    runtime.block_on(execute(command, config))
}

async fn execute(command: Command, config: AppConfig) -> Result<(), AppError> {
    let calendar: Arc<dyn SessionCalendar> = Arc::new(NyseCalendar::new()?);
    let cache = config.flatfile.cache_enabled.then(|| {
        Arc::new(DiskCache::new(config.flatfile.cache_dir.clone())) as Arc<dyn BulkFileCache>
    });
    let bulk = Arc::new(FlatfileSource::from_config(&config, cache, calendar.clone())?);
    let chain = Arc::new(SnapshotClient::from_config(&config)?);
    info!(
        "options-pulse booted; strategy={}, dataset={}, history at {:?}, s3 credentials {}",
        config.strategy,
        config.flatfile.dataset,
        config.history.dir,
        if config.has_s3_credentials() { "set" } else { "absent" }
    );

    let probe_date = calendar.last_completed_session(Utc::now())?;
    if !bulk.probe_access(probe_date).await {
        warn!("bulk file for {probe_date} is not reachable with the configured credentials");
    }

    let fetcher = HybridFetcher::new(bulk, chain, calendar.clone(), FetchSettings::from_config(&config));
    let pipeline = Pipeline::new(
        fetcher,
        HistoryAnalyzer::from_config(&config.history),
        AnomalyDetector::new(config.anomaly.clone()),
        calendar,
    );

    match command {
        Command::Run { strategy, date } => {
            let strategy = strategy.unwrap_or(config.strategy);
            let report = pipeline.run_day(strategy, date, Utc::now()).await?;
            log_summary(&report.snapshot);
            match report.persisted {
                Some(path) => info!("snapshot written to {}", path.display()),
                None => info!("snapshot for {} was already stored", report.snapshot.date),
            }
        }
        Command::Backfill { start, end } => {
            let report = pipeline.backfill(start, end, Utc::now()).await?;
            if !report.missing.is_empty() {
                warn!("no bulk file for {} trading days", report.missing.len());
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Run {
        strategy: Option<FetchStrategy>,
        date: Option<NaiveDate>,
    },
    Backfill {
        start: NaiveDate,
        end: NaiveDate,
    },
}

impl Command {
    /// `[auto|csv|api] [YYYY-MM-DD]` or `backfill <start> <end>`.
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, AppError> {
        let args: Vec<String> = args.into_iter().collect();
        match args.first().map(String::as_str) {
            Some("backfill") => {
                let [_, start, end] = args.as_slice() else {
                    return Err(AppError::Usage);
                };
                let (start, end) = (parse_date(start)?, parse_date(end)?);
                if start > end {
                    return Err(AppError::Usage);
                }
                Ok(Command::Backfill { start, end })
            }
            _ => {
                let mut strategy = None;
                let mut date = None;
                for arg in &args {
                    if let Ok(parsed) = parse_date(arg) {
                        if date.replace(parsed).is_some() {
                            return Err(AppError::Usage);
                        }
                    } else if strategy.replace(arg.parse::<FetchStrategy>()?).is_some() {
                        return Err(AppError::Usage);
                    }
                }
                Ok(Command::Run { strategy, date })
            }
        }
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| AppError::BadDate(raw.to_string()))
}

#[derive(Debug, Error)]
enum AppError {
    #[error("usage: options-pulse [auto|csv|api] [YYYY-MM-DD] | options-pulse backfill <start> <end>")]
    Usage,
    #[error("invalid date {0:?}; expected YYYY-MM-DD")]
    BadDate(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Calendar(#[from] CalendarError),
    #[error(transparent)]
    Bulk(#[from] BulkFetchError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("failed to start async runtime: {0}")]
    Runtime(std::io::Error),
}
