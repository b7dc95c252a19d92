// Copyright (c) James Kassemi, SC, US. All rights reserved.
use chrono::{Days, NaiveDate};
use core_types::opra::ContractType;
use core_types::types::{ContractShare, UnderlyingAggregate, ratio, round_dp, share_pct};

/// Contracts expiring at least this many days after the trading date count
/// as LEAPs.
pub const LEAP_MIN_DAYS: u64 = 90;

/// Length of every top-contracts list.
pub const TOP_CONTRACTS: usize = 3;

/// Running volume totals for one underlying.
#[derive(Debug)]
pub(crate) struct VolumeAccumulator {
    ticker: String,
    leap_cutoff: NaiveDate,
    put_volume: u64,
    call_volume: u64,
    transactions: u64,
    put_contracts: usize,
    call_contracts: usize,
    leap_put_volume: u64,
    leap_call_volume: u64,
    by_volume: Vec<(String, u64)>,
    leaps_by_volume: Vec<(String, u64)>,
}

impl VolumeAccumulator {
    pub(crate) fn new(ticker: impl Into<String>, trading_date: NaiveDate) -> Self {
        let leap_cutoff = trading_date
            .checked_add_days(Days::new(LEAP_MIN_DAYS))
            .unwrap_or(NaiveDate::MAX);
        Self {
            ticker: ticker.into(),
            leap_cutoff,
            put_volume: 0,
            call_volume: 0,
            transactions: 0,
            put_contracts: 0,
            call_contracts: 0,
            leap_put_volume: 0,
            leap_call_volume: 0,
            by_volume: Vec::new(),
            leaps_by_volume: Vec::new(),
        }
    }

    pub(crate) fn record(
        &mut self,
        contract: &str,
        contract_type: ContractType,
        expiry: Option<NaiveDate>,
        volume: u64,
        transactions: u64,
    ) {
        let is_leap = expiry.is_some_and(|expiry| expiry >= self.leap_cutoff);
        match contract_type {
            ContractType::Put => {
                self.put_volume += volume;
                self.put_contracts += 1;
                if is_leap {
                    self.leap_put_volume += volume;
                }
            }
            ContractType::Call => {
                self.call_volume += volume;
                self.call_contracts += 1;
                if is_leap {
                    self.leap_call_volume += volume;
                }
            }
        }
        self.transactions += transactions;
        self.by_volume.push((contract.to_string(), volume));
        if is_leap {
            self.leaps_by_volume.push((contract.to_string(), volume));
        }
    }

    /// `None` when the underlying traded no volume.
    pub(crate) fn finish(self) -> Option<UnderlyingAggregate> {
        let total_volume = self.put_volume + self.call_volume;
        if total_volume == 0 {
            return None;
        }
        let avg_trade_size = if self.transactions > 0 {
            round_dp(total_volume as f64 / self.transactions as f64, 2)
        } else {
            0.0
        };
        let mut agg = UnderlyingAggregate::new(self.ticker);
        agg.total_volume = total_volume;
        agg.put_volume = self.put_volume;
        agg.call_volume = self.call_volume;
        agg.cp_volume_ratio = ratio(self.call_volume, self.put_volume);
        agg.total_transactions = self.transactions;
        agg.avg_trade_size = avg_trade_size;
        agg.contracts_count = self.put_contracts + self.call_contracts;
        agg.put_contracts = self.put_contracts;
        agg.call_contracts = self.call_contracts;
        agg.leap_cp_ratio = ratio(self.leap_call_volume, self.leap_put_volume);
        agg.top_3_contracts_by_volume = top_shares(self.by_volume, total_volume);
        agg.top_3_leap_contracts_by_volume = top_shares(self.leaps_by_volume, total_volume);
        Some(agg)
    }
}

/// Largest non-zero entries, as a share of `total`. Ties keep input order.
pub(crate) fn top_shares(mut entries: Vec<(String, u64)>, total: u64) -> Vec<ContractShare> {
    entries.retain(|(_, size)| *size > 0);
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries
        .into_iter()
        .take(TOP_CONTRACTS)
        .map(|(contract, size)| ContractShare {
            percentage: share_pct(size, total),
            contract,
            size,
        })
        .collect()
}
