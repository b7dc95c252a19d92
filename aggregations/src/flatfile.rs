// Copyright (c) James Kassemi, SC, US. All rights reserved.
use crate::volume::VolumeAccumulator;
use chrono::NaiveDate;
use core_types::opra::parse_opra_contract;
use core_types::types::UnderlyingAggregate;
use log::debug;
use std::collections::HashMap;

/// One row of the bulk day-aggregate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractRow {
    pub ticker: String,
    pub volume: u64,
    pub transactions: u64,
}

impl ContractRow {
    pub fn new(ticker: impl Into<String>, volume: u64, transactions: u64) -> Self {
        Self {
            ticker: ticker.into(),
            volume,
            transactions,
        }
    }
}

/// Groups contract rows by underlying and returns one aggregate per
/// underlying with non-zero volume, sorted by total volume descending. Rows
/// whose identifier does not parse are dropped. Equal volumes keep the order
/// in which their underlyings first appeared.
pub fn aggregate_by_underlying(rows: &[ContractRow], trading_date: NaiveDate) -> Vec<UnderlyingAggregate> {
    let mut accumulators: Vec<VolumeAccumulator> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unrecognized = 0usize;

    for row in rows {
        let Some(contract) = parse_opra_contract(&row.ticker).parsed() else {
            unrecognized += 1;
            continue;
        };
        let slot = match index.get(&contract.underlying) {
            Some(slot) => *slot,
            None => {
                let slot = accumulators.len();
                accumulators.push(VolumeAccumulator::new(contract.underlying.clone(), trading_date));
                index.insert(contract.underlying, slot);
                slot
            }
        };
        accumulators[slot].record(
            &row.ticker,
            contract.contract_type,
            Some(contract.expiry),
            row.volume,
            row.transactions,
        );
    }

    if unrecognized > 0 {
        debug!("[aggregations] {trading_date}: skipped {unrecognized} unrecognized rows");
    }

    let mut aggregates: Vec<UnderlyingAggregate> = accumulators
        .into_iter()
        .filter_map(VolumeAccumulator::finish)
        .collect();
    aggregates.sort_by(|a, b| b.total_volume.cmp(&a.total_volume));
    aggregates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 20).unwrap()
    }

    fn row(ticker: &str, volume: u64, transactions: u64) -> ContractRow {
        ContractRow::new(ticker, volume, transactions)
    }

    #[test]
    fn call_put_split_and_ratio() {
        let rows = vec![
            row("O:AAA250117C00050000", 100, 10),
            row("O:AAA250117P00045000", 50, 5),
            row("O:BBB250117C00020000", 10, 2),
        ];
        let out = aggregate_by_underlying(&rows, date());
        assert_eq!(out.len(), 2);

        let aaa = &out[0];
        assert_eq!(aaa.ticker, "AAA");
        assert_eq!(aaa.total_volume, 150);
        assert_eq!(aaa.call_volume, 100);
        assert_eq!(aaa.put_volume, 50);
        assert_eq!(aaa.cp_volume_ratio, 2.0);
        assert_eq!(aaa.total_transactions, 15);
        assert_eq!(aaa.avg_trade_size, 10.0);
        assert_eq!(aaa.contracts_count, 2);
        assert_eq!((aaa.call_contracts, aaa.put_contracts), (1, 1));

        let bbb = &out[1];
        assert_eq!(bbb.total_volume, 10);
        assert_eq!(bbb.cp_volume_ratio, 0.0);
        assert_eq!(bbb.avg_trade_size, 5.0);
        assert_eq!(bbb.total_oi, 0);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let rows = vec![
            row("O:AAA250117C00050000", 100, 10),
            row("O:CCC250117P00045000", 300, 0),
            row("O:AAA250117P00045000", 50, 5),
        ];
        assert_eq!(aggregate_by_underlying(&rows, date()), aggregate_by_underlying(&rows, date()));
    }

    #[test]
    fn unrecognized_and_zero_volume_rows_are_dropped() {
        let rows = vec![
            row("SPY", 1_000, 10),
            row("O:spy250117C00050000", 1_000, 10),
            row("O:DDD250117C00050000", 0, 0),
            row("O:EEE250117C00050000", 7, 0),
        ];
        let out = aggregate_by_underlying(&rows, date());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].ticker, "EEE");
        assert_eq!(out[0].avg_trade_size, 0.0);
    }

    #[test]
    fn equal_volumes_keep_first_encounter_order() {
        let rows = vec![
            row("O:XXX250117C00050000", 10, 1),
            row("O:YYY250117C00050000", 20, 1),
            row("O:ZZZ250117C00050000", 10, 1),
        ];
        let tickers: Vec<_> = aggregate_by_underlying(&rows, date())
            .into_iter()
            .map(|agg| agg.ticker)
            .collect();
        assert_eq!(tickers, vec!["YYY", "XXX", "ZZZ"]);
    }

    #[test]
    fn leap_ratio_uses_ninety_day_cutoff() {
        // 2024-12-20 + 90 days = 2025-03-20.
        let rows = vec![
            row("O:AAA250320C00050000", 60, 1),
            row("O:AAA250320P00050000", 20, 1),
            row("O:AAA250319C00050000", 500, 1),
            row("O:AAA261218C00050000", 40, 1),
        ];
        let out = aggregate_by_underlying(&rows, date());
        let aaa = &out[0];
        assert_eq!(aaa.leap_cp_ratio, 5.0);
        let leaps: Vec<_> = aaa
            .top_3_leap_contracts_by_volume
            .iter()
            .map(|c| c.contract.as_str())
            .collect();
        assert_eq!(leaps, vec!["O:AAA250320C00050000", "O:AAA261218C00050000", "O:AAA250320P00050000"]);
        assert_eq!(aaa.top_3_leap_contracts_by_volume[0].percentage, 9.7);
    }

    #[test]
    fn leap_ratio_is_zero_without_leap_puts() {
        let rows = vec![row("O:AAA261218C00050000", 40, 1), row("O:AAA250117P00050000", 40, 1)];
        assert_eq!(aggregate_by_underlying(&rows, date())[0].leap_cp_ratio, 0.0);
    }

    #[test]
    fn top_three_by_volume_shares_total() {
        let rows = vec![
            row("O:AAA250117C00050000", 10, 1),
            row("O:AAA250117C00055000", 40, 1),
            row("O:AAA250117P00045000", 30, 1),
            row("O:AAA250117P00040000", 20, 1),
        ];
        let top = &aggregate_by_underlying(&rows, date())[0].top_3_contracts_by_volume;
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].contract, "O:AAA250117C00055000");
        assert_eq!(top[0].size, 40);
        assert_eq!(top[0].percentage, 40.0);
        assert_eq!(top[2].size, 20);
    }
}
