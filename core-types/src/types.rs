// Copyright (c) James Kassemi, SC, US. All rights reserved.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One contract's share of its underlying's volume or open interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractShare {
    pub contract: String,
    pub size: u64,
    pub percentage: f64,
}

/// Price bucket holding the largest share of an underlying's open interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrikeConcentration {
    pub range: String,
    pub dominant_strike: Option<f64>,
    pub oi: u64,
    pub percentage: f64,
}

impl Default for StrikeConcentration {
    fn default() -> Self {
        Self {
            range: "N/A".to_string(),
            dominant_strike: None,
            oi: 0,
            percentage: 0.0,
        }
    }
}

/// Per-underlying daily aggregate. Volume fields come from the bulk file (or
/// the chain snapshot on the API path); open-interest fields stay zero until
/// enrichment fills them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnderlyingAggregate {
    pub ticker: String,
    pub total_volume: u64,
    pub put_volume: u64,
    pub call_volume: u64,
    pub cp_volume_ratio: f64,
    pub total_transactions: u64,
    pub avg_trade_size: f64,
    pub contracts_count: usize,
    pub put_contracts: usize,
    pub call_contracts: usize,
    pub total_oi: u64,
    pub put_oi: u64,
    pub call_oi: u64,
    pub cp_oi_ratio: f64,
    pub leap_cp_ratio: f64,
    pub top_3_contracts_by_volume: Vec<ContractShare>,
    pub top_3_leap_contracts_by_volume: Vec<ContractShare>,
    #[serde(alias = "top_3_contracts")]
    pub top_3_contracts_by_oi: Vec<ContractShare>,
    pub strike_concentration: StrikeConcentration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<TickerHistoryStats>,
}

impl UnderlyingAggregate {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            ..Self::default()
        }
    }

    pub fn is_enriched(&self) -> bool {
        self.total_oi > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
    New,
}

/// Bucketed label derived from how often a ticker made the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Core,
    Active,
    Occasional,
    New,
}

impl Classification {
    pub fn from_rate(rate: f64) -> Self {
        if rate >= 0.9 {
            Classification::Core
        } else if rate >= 0.6 {
            Classification::Active
        } else if rate >= 0.3 {
            Classification::Occasional
        } else {
            Classification::New
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Classification::Core => "🔥",
            Classification::Active => "🌟",
            Classification::Occasional => "⚡",
            Classification::New => "🆕",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerHistoryStats {
    pub appearances: usize,
    pub appearance_rate: f64,
    pub avg_rank: Option<f64>,
    pub best_rank: Option<usize>,
    pub worst_rank: Option<usize>,
    pub today_rank: Option<usize>,
    pub rank_change: Option<i64>,
    pub trend: Trend,
    pub streak: usize,
    pub classification: Classification,
    pub icon: String,
}

impl TickerHistoryStats {
    /// Stats for a ticker absent from every located snapshot.
    pub fn new_listing() -> Self {
        Self {
            appearances: 0,
            appearance_rate: 0.0,
            avg_rank: None,
            best_rank: None,
            worst_rank: None,
            today_rank: None,
            rank_change: None,
            trend: Trend::New,
            streak: 0,
            classification: Classification::New,
            icon: Classification::New.icon().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    #[serde(rename = "CSV")]
    Csv,
    #[serde(rename = "API")]
    Api,
    #[serde(rename = "CSV+API")]
    CsvApi,
    #[serde(rename = "FAILED")]
    Failed,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DataSource::Csv => "CSV",
            DataSource::Api => "API",
            DataSource::CsvApi => "CSV+API",
            DataSource::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// Outcome of one bulk-file attempt for a single date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkAttempt {
    pub date: NaiveDate,
    pub outcome: String,
}

/// What a fetch run actually did. Callers branch on this rather than assuming
/// a non-empty result was fully enriched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchMetadata {
    pub data_source: DataSource,
    pub target_date: Option<NaiveDate>,
    pub csv_date: Option<NaiveDate>,
    pub oi_skipped: bool,
    pub oi_skip_reason: Option<String>,
    #[serde(default)]
    pub attempts: Vec<BulkAttempt>,
    #[serde(default)]
    pub enriched: usize,
    #[serde(default)]
    pub enrichment_failures: Vec<String>,
}

impl FetchMetadata {
    pub fn new(data_source: DataSource, target_date: Option<NaiveDate>) -> Self {
        Self {
            data_source,
            target_date,
            csv_date: None,
            oi_skipped: false,
            oi_skip_reason: None,
            attempts: Vec::new(),
            enriched: 0,
            enrichment_failures: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    HighVolume,
    VolumeSpike,
    ExtremeGreed,
    ExtremeFear,
    AggressivePositioning,
    DefensivePositioning,
    HighTurnover,
    LowTurnover,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AnomalyKind::HighVolume => "HIGH_VOLUME",
            AnomalyKind::VolumeSpike => "VOLUME_SPIKE",
            AnomalyKind::ExtremeGreed => "EXTREME_GREED",
            AnomalyKind::ExtremeFear => "EXTREME_FEAR",
            AnomalyKind::AggressivePositioning => "AGGRESSIVE_POSITIONING",
            AnomalyKind::DefensivePositioning => "DEFENSIVE_POSITIONING",
            AnomalyKind::HighTurnover => "HIGH_TURNOVER",
            AnomalyKind::LowTurnover => "LOW_TURNOVER",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub ticker: String,
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub description: String,
    pub value: f64,
    pub metric: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_score: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub total: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_type: BTreeMap<AnomalyKind, usize>,
}

/// One persisted document per trading date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub date: NaiveDate,
    pub timestamp: DateTime<Utc>,
    pub tickers_count: usize,
    pub anomalies_count: usize,
    pub data_source: DataSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<FetchMetadata>,
    pub data: Vec<UnderlyingAggregate>,
    #[serde(default)]
    pub anomalies: Vec<Anomaly>,
    #[serde(default)]
    pub summary: AnomalySummary,
}

impl HistorySnapshot {
    pub fn new(
        date: NaiveDate,
        metadata: FetchMetadata,
        data: Vec<UnderlyingAggregate>,
        anomalies: Vec<Anomaly>,
        summary: AnomalySummary,
    ) -> Self {
        Self {
            date,
            timestamp: Utc::now(),
            tickers_count: data.len(),
            anomalies_count: summary.total,
            data_source: metadata.data_source,
            metadata: Some(metadata),
            data,
            anomalies,
            summary,
        }
    }
}

/// Rounds half away from zero to `dp` decimal places.
pub fn round_dp(value: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    (value * factor).round() / factor
}

/// `numerator / denominator` rounded to 2 dp; 0 when the denominator is 0.
pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    round_dp(numerator as f64 / denominator as f64, 2)
}

/// Percentage share rounded to 1 dp; 0 when the total is 0.
pub fn share_pct(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_dp(part as f64 / total as f64 * 100.0, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_is_zero_without_denominator() {
        assert_eq!(ratio(100, 0), 0.0);
        assert_eq!(ratio(0, 0), 0.0);
        assert_eq!(ratio(100, 50), 2.0);
        assert_eq!(ratio(1, 3), 0.33);
    }

    #[test]
    fn share_pct_rounds_to_one_decimal() {
        assert_eq!(share_pct(1, 3), 33.3);
        assert_eq!(share_pct(5, 0), 0.0);
    }

    #[test]
    fn classification_buckets_follow_rate() {
        assert_eq!(Classification::from_rate(1.0), Classification::Core);
        assert_eq!(Classification::from_rate(0.9), Classification::Core);
        assert_eq!(Classification::from_rate(0.6), Classification::Active);
        assert_eq!(Classification::from_rate(0.3), Classification::Occasional);
        assert_eq!(Classification::from_rate(0.29), Classification::New);
    }

    #[test]
    fn severity_orders_high_above_low() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn aggregate_reads_legacy_documents_with_missing_fields() {
        let json = r#"{"ticker":"SPY","total_volume":10,"top_3_contracts":[{"contract":"O:SPY241220P00720000","size":4,"percentage":40.0}]}"#;
        let agg: UnderlyingAggregate = serde_json::from_str(json).unwrap();
        assert_eq!(agg.ticker, "SPY");
        assert_eq!(agg.total_volume, 10);
        assert_eq!(agg.top_3_contracts_by_oi.len(), 1);
        assert_eq!(agg.strike_concentration.range, "N/A");
        assert!(agg.history.is_none());
    }

    #[test]
    fn data_source_serializes_with_wire_labels() {
        assert_eq!(serde_json::to_string(&DataSource::CsvApi).unwrap(), "\"CSV+API\"");
        assert_eq!(DataSource::Failed.to_string(), "FAILED");
    }
}
