// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Flags unusual volume, sentiment and turnover across one day's aggregates.
//! Pure: no I/O, no clock.

pub use core_types::config::AnomalyThresholds;

use core_types::types::{Anomaly, AnomalyKind, AnomalySummary, Severity, UnderlyingAggregate};
use log::debug;

/// Mean, population standard deviation and median of the non-zero volumes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeStats {
    pub mean: f64,
    pub std_dev: f64,
    pub median: f64,
}

impl VolumeStats {
    pub fn from_aggregates(data: &[UnderlyingAggregate]) -> Option<Self> {
        Self::from_volumes(data.iter().map(|agg| agg.total_volume))
    }

    pub fn from_volumes(volumes: impl IntoIterator<Item = u64>) -> Option<Self> {
        let mut volumes: Vec<f64> = volumes
            .into_iter()
            .filter(|v| *v > 0)
            .map(|v| v as f64)
            .collect();
        if volumes.is_empty() {
            return None;
        }
        let n = volumes.len() as f64;
        let mean = volumes.iter().sum::<f64>() / n;
        let variance = volumes.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        volumes.sort_by(f64::total_cmp);
        let mid = volumes.len() / 2;
        let median = if volumes.len() % 2 == 0 {
            (volumes[mid - 1] + volumes[mid]) / 2.0
        } else {
            volumes[mid]
        };
        Some(Self {
            mean,
            std_dev: variance.sqrt(),
            median,
        })
    }

    pub fn z_score(&self, volume: f64) -> f64 {
        if self.std_dev > 0.0 {
            (volume - self.mean) / self.std_dev
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    thresholds: AnomalyThresholds,
}

impl AnomalyDetector {
    pub fn new(thresholds: AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    /// Runs the volume, sentiment and turnover checks over the whole day.
    /// Each family scans the aggregates in volume-descending order; a ticker
    /// can be flagged by any number of checks.
    pub fn detect(&self, data: &[UnderlyingAggregate]) -> Vec<Anomaly> {
        let mut ranked: Vec<&UnderlyingAggregate> = data.iter().collect();
        ranked.sort_by(|a, b| b.total_volume.cmp(&a.total_volume));

        let mut out = Vec::new();
        self.volume_checks(&ranked, &mut out);
        self.sentiment_checks(&ranked, &mut out);
        self.turnover_checks(&ranked, &mut out);
        debug!("[anomaly] {} anomalies over {} aggregates", out.len(), data.len());
        out
    }

    fn volume_checks(&self, ranked: &[&UnderlyingAggregate], out: &mut Vec<Anomaly>) {
        let Some(stats) = VolumeStats::from_volumes(ranked.iter().map(|agg| agg.total_volume)) else {
            return;
        };
        let t = &self.thresholds;
        for agg in ranked.iter().filter(|agg| agg.total_volume > 0) {
            let volume = agg.total_volume as f64;
            let z = stats.z_score(volume);
            if z > t.high_volume_z {
                let severity = if z > t.extreme_volume_z {
                    Severity::High
                } else {
                    Severity::Medium
                };
                out.push(Anomaly {
                    ticker: agg.ticker.clone(),
                    kind: AnomalyKind::HighVolume,
                    severity,
                    description: format!("Extremely high trading volume (z-score {z:.2})"),
                    value: volume,
                    metric: "volume".to_string(),
                    z_score: Some(z),
                });
            }
            if volume > stats.median * t.spike_multiplier {
                out.push(Anomaly {
                    ticker: agg.ticker.clone(),
                    kind: AnomalyKind::VolumeSpike,
                    severity: Severity::High,
                    description: format!("Volume {:.1}x the day's median", volume / stats.median),
                    value: volume,
                    metric: "volume".to_string(),
                    z_score: None,
                });
            }
        }
    }

    /// Zero means one side had no activity, which says nothing about
    /// sentiment.
    fn usable_ratio(&self, value: f64) -> Option<f64> {
        (value > 0.0 && value < self.thresholds.ratio_ceiling).then_some(value)
    }

    fn sentiment_checks(&self, ranked: &[&UnderlyingAggregate], out: &mut Vec<Anomaly>) {
        let t = &self.thresholds;
        for agg in ranked {
            if let Some(cp) = self.usable_ratio(agg.cp_volume_ratio) {
                let flagged = if cp > t.greed_ratio {
                    Some((AnomalyKind::ExtremeGreed, "Extreme bullish sentiment"))
                } else if cp < t.fear_ratio {
                    Some((AnomalyKind::ExtremeFear, "Extreme bearish sentiment"))
                } else {
                    None
                };
                if let Some((kind, label)) = flagged {
                    out.push(Anomaly {
                        ticker: agg.ticker.clone(),
                        kind,
                        severity: Severity::High,
                        description: format!("{label} (call/put volume {cp:.2})"),
                        value: cp,
                        metric: "cp_volume_ratio".to_string(),
                        z_score: None,
                    });
                }
            }
            if let Some(cp) = self.usable_ratio(agg.cp_oi_ratio) {
                let flagged = if cp > t.aggressive_oi_ratio {
                    Some((AnomalyKind::AggressivePositioning, "Heavily call-weighted positioning"))
                } else if cp < t.defensive_oi_ratio {
                    Some((AnomalyKind::DefensivePositioning, "Heavily put-weighted positioning"))
                } else {
                    None
                };
                if let Some((kind, label)) = flagged {
                    out.push(Anomaly {
                        ticker: agg.ticker.clone(),
                        kind,
                        severity: Severity::Medium,
                        description: format!("{label} (call/put open interest {cp:.2})"),
                        value: cp,
                        metric: "cp_oi_ratio".to_string(),
                        z_score: None,
                    });
                }
            }
        }
    }

    fn turnover_checks(&self, ranked: &[&UnderlyingAggregate], out: &mut Vec<Anomaly>) {
        let t = &self.thresholds;
        for agg in ranked {
            if agg.total_volume == 0 || agg.total_oi == 0 {
                continue;
            }
            let turnover = agg.total_volume as f64 / agg.total_oi as f64;
            if turnover > t.high_turnover {
                out.push(Anomaly {
                    ticker: agg.ticker.clone(),
                    kind: AnomalyKind::HighTurnover,
                    severity: Severity::Medium,
                    description: format!("High turnover (volume/OI {turnover:.2}), likely intraday churn"),
                    value: turnover,
                    metric: "vol_oi_ratio".to_string(),
                    z_score: None,
                });
            }
            if turnover < t.low_turnover && agg.total_volume > t.low_turnover_min_volume {
                out.push(Anomaly {
                    ticker: agg.ticker.clone(),
                    kind: AnomalyKind::LowTurnover,
                    severity: Severity::Low,
                    description: format!("Low turnover (volume/OI {turnover:.2}), positions being held"),
                    value: turnover,
                    metric: "vol_oi_ratio".to_string(),
                    z_score: None,
                });
            }
        }
    }
}

pub fn summarize(anomalies: &[Anomaly]) -> AnomalySummary {
    let mut summary = AnomalySummary {
        total: anomalies.len(),
        ..AnomalySummary::default()
    };
    for anomaly in anomalies {
        *summary.by_severity.entry(anomaly.severity).or_default() += 1;
        *summary.by_type.entry(anomaly.kind).or_default() += 1;
    }
    summary
}

/// The `n` most severe anomalies. Equal severities keep their detection
/// order.
pub fn top(anomalies: &[Anomaly], n: usize) -> Vec<Anomaly> {
    let mut sorted: Vec<&Anomaly> = anomalies.iter().collect();
    sorted.sort_by(|a, b| b.severity.cmp(&a.severity));
    sorted.into_iter().take(n).cloned().collect()
}
