// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Persisted daily snapshots and the rank-history stats derived from them.

mod analyzer;
mod store;

pub use analyzer::{DayRanking, HistoryAnalyzer, ticker_stats, trend};
pub use store::{HistoryStore, HistoryStoreError};
