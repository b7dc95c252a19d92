// Copyright (c) James Kassemi, SC, US. All rights reserved.
use crate::store::HistoryStore;
use chrono::NaiveDate;
use core_types::config::HistoryConfig;
use core_types::types::{Classification, TickerHistoryStats, Trend, UnderlyingAggregate, round_dp};
use log::{info, warn};

/// Rank movement smaller than this, in either direction, reads as stable.
const TREND_BAND: f64 = 2.0;
const RECENT_RANKS: usize = 3;

/// Top-K tickers of one located date, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct DayRanking {
    pub date: NaiveDate,
    pub tickers: Vec<String>,
}

impl DayRanking {
    fn rank_of(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker).map(|idx| idx + 1)
    }
}

pub struct HistoryAnalyzer {
    store: HistoryStore,
    lookback: usize,
    max_lookback_days: u32,
    top_k: usize,
}

impl HistoryAnalyzer {
    pub fn new(store: HistoryStore, lookback: usize, max_lookback_days: u32, top_k: usize) -> Self {
        Self {
            store,
            lookback: lookback.max(1),
            max_lookback_days: max_lookback_days.max(1),
            top_k: top_k.max(1),
        }
    }

    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::new(
            HistoryStore::new(config.dir.clone()),
            config.lookback_days,
            config.max_lookback_days,
            config.top_k,
        )
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// Located rankings, oldest first. Walks back from `reference` one
    /// calendar day at a time until `lookback` dates are found or the
    /// lookback budget is spent. When `reference` has no readable document,
    /// `today` stands in for it.
    pub async fn rankings(&self, reference: NaiveDate, today: &[UnderlyingAggregate]) -> Vec<DayRanking> {
        let mut found = Vec::with_capacity(self.lookback);
        let mut date = reference;
        for _ in 0..self.max_lookback_days {
            if found.len() == self.lookback {
                break;
            }
            let stored = if self.store.exists(date).await {
                match self.store.load_rankings(date, self.top_k).await {
                    Ok(tickers) => Some(tickers),
                    Err(err) => {
                        warn!("[history] skipping unreadable snapshot {date}: {err}");
                        None
                    }
                }
            } else {
                None
            };
            match stored {
                Some(tickers) => found.push(DayRanking { date, tickers }),
                None if date == reference && !today.is_empty() => {
                    let tickers = today.iter().take(self.top_k).map(|agg| agg.ticker.clone()).collect();
                    found.push(DayRanking { date, tickers });
                }
                None => {}
            }
            let Some(prev) = date.pred_opt() else {
                break;
            };
            date = prev;
        }
        found.reverse();
        found
    }

    /// Attaches history stats to every aggregate in `data`.
    pub async fn annotate(&self, reference: NaiveDate, data: &mut [UnderlyingAggregate]) {
        let rankings = self.rankings(reference, data).await;
        match (rankings.first(), rankings.last()) {
            (Some(first), Some(last)) => info!(
                "[history] {} located dates, {} to {}",
                rankings.len(),
                first.date,
                last.date
            ),
            _ => info!("[history] no snapshots located before {reference}"),
        }
        for agg in data.iter_mut() {
            agg.history = Some(ticker_stats(&agg.ticker, &rankings));
        }
    }
}

/// Stats for one ticker over chronologically ordered rankings.
pub fn ticker_stats(ticker: &str, rankings: &[DayRanking]) -> TickerHistoryStats {
    let ranks: Vec<usize> = rankings.iter().filter_map(|day| day.rank_of(ticker)).collect();
    let (Some(&best), Some(&worst), Some(&latest)) =
        (ranks.iter().min(), ranks.iter().max(), ranks.last())
    else {
        return TickerHistoryStats::new_listing();
    };

    let appearances = ranks.len();
    let appearance_rate = appearances as f64 / rankings.len() as f64;
    let rank_change = match ranks.len() {
        0 | 1 => 0,
        n => ranks[n - 2] as i64 - latest as i64,
    };
    let streak = rankings
        .iter()
        .rev()
        .take_while(|day| day.rank_of(ticker).is_some())
        .count();
    let classification = Classification::from_rate(appearance_rate);

    TickerHistoryStats {
        appearances,
        appearance_rate,
        avg_rank: Some(round_dp(mean(&ranks), 1)),
        best_rank: Some(best),
        worst_rank: Some(worst),
        today_rank: Some(latest),
        rank_change: Some(rank_change),
        trend: trend(&ranks),
        streak,
        classification,
        icon: classification.icon().to_string(),
    }
}

fn mean(ranks: &[usize]) -> f64 {
    ranks.iter().sum::<usize>() as f64 / ranks.len() as f64
}

/// Mean of the latest three ranks against the mean of all earlier ones.
/// Lower rank numbers are better.
pub fn trend(ranks: &[usize]) -> Trend {
    if ranks.len() <= RECENT_RANKS {
        return Trend::Stable;
    }
    let (earlier, recent) = ranks.split_at(ranks.len() - RECENT_RANKS);
    let recent_avg = mean(recent);
    let earlier_avg = mean(earlier);
    if recent_avg < earlier_avg - TREND_BAND {
        Trend::Rising
    } else if recent_avg > earlier_avg + TREND_BAND {
        Trend::Falling
    } else {
        Trend::Stable
    }
}
