// Copyright (c) James Kassemi, SC, US. All rights reserved.
use core_types::opra::Strike;
use core_types::types::{StrikeConcentration, share_pct};

/// Bucket width, in thousandths, for a dominant strike.
fn bucket_width(dominant: Strike) -> u64 {
    match dominant.thousandths() {
        s if s < 50_000 => 5_000,
        s if s < 200_000 => 10_000,
        s if s < 500_000 => 20_000,
        _ => 50_000,
    }
}

/// Finds the strike with the most open interest (first one on ties) and sums
/// the open interest of every strike in its bucket
/// `[floor(dominant / width) * width, + width)`.
///
/// `strike_oi` holds one entry per distinct strike in first-seen order.
pub fn strike_concentration(strike_oi: &[(Strike, u64)], total_oi: u64) -> StrikeConcentration {
    if total_oi == 0 {
        return StrikeConcentration::default();
    }
    let mut dominant: Option<(Strike, u64)> = None;
    for &(strike, oi) in strike_oi {
        if dominant.is_none_or(|(_, best)| oi > best) {
            dominant = Some((strike, oi));
        }
    }
    let Some((dominant, _)) = dominant else {
        return StrikeConcentration::default();
    };

    let width = bucket_width(dominant);
    let start = dominant.thousandths() / width * width;
    let end = start + width;
    let oi: u64 = strike_oi
        .iter()
        .filter(|(strike, _)| (start..end).contains(&strike.thousandths()))
        .map(|(_, oi)| *oi)
        .sum();

    StrikeConcentration {
        range: format!("{}-{}", start / 1000, end / 1000),
        dominant_strike: Some(dominant.as_f64()),
        oi,
        percentage: share_pct(oi, total_oi),
    }
}
