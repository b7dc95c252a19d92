// Copyright (c) James Kassemi, SC, US. All rights reserved.
use crate::strike::strike_concentration;
use crate::volume::{VolumeAccumulator, top_shares};
use chrono::NaiveDate;
use core_types::opra::{ContractType, Strike};
use core_types::types::{ContractShare, StrikeConcentration, UnderlyingAggregate, ratio};
use std::collections::HashMap;

/// One contract from a live chain snapshot. Fields the snapshot omitted are
/// `None` or zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainContract {
    pub contract: String,
    pub contract_type: Option<ContractType>,
    pub strike: Option<Strike>,
    pub expiration: Option<NaiveDate>,
    pub day_volume: u64,
    pub open_interest: u64,
}

/// Open-interest fields derived from one chain snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenInterestProfile {
    pub total_oi: u64,
    pub put_oi: u64,
    pub call_oi: u64,
    pub cp_oi_ratio: f64,
    pub top_3_contracts_by_oi: Vec<ContractShare>,
    pub strike_concentration: StrikeConcentration,
}

impl OpenInterestProfile {
    /// Overwrites the open-interest fields of `agg`. Volume fields are left
    /// as they are.
    pub fn apply_to(self, agg: &mut UnderlyingAggregate) {
        agg.total_oi = self.total_oi;
        agg.put_oi = self.put_oi;
        agg.call_oi = self.call_oi;
        agg.cp_oi_ratio = self.cp_oi_ratio;
        agg.top_3_contracts_by_oi = self.top_3_contracts_by_oi;
        agg.strike_concentration = self.strike_concentration;
    }
}

pub fn open_interest_profile(contracts: &[ChainContract]) -> OpenInterestProfile {
    let mut put_oi = 0u64;
    let mut call_oi = 0u64;
    let mut with_oi: Vec<(String, u64)> = Vec::new();
    let mut strikes: Vec<(Strike, u64)> = Vec::new();
    let mut strike_index: HashMap<Strike, usize> = HashMap::new();

    for contract in contracts {
        let oi = contract.open_interest;
        match contract.contract_type {
            Some(ContractType::Put) => put_oi += oi,
            Some(ContractType::Call) => call_oi += oi,
            None => {}
        }
        if oi == 0 {
            continue;
        }
        with_oi.push((contract.contract.clone(), oi));
        if let Some(strike) = contract.strike.filter(|s| s.thousandths() > 0) {
            match strike_index.get(&strike) {
                Some(slot) => strikes[*slot].1 += oi,
                None => {
                    strike_index.insert(strike, strikes.len());
                    strikes.push((strike, oi));
                }
            }
        }
    }

    let total_oi = put_oi + call_oi;
    OpenInterestProfile {
        total_oi,
        put_oi,
        call_oi,
        cp_oi_ratio: ratio(call_oi, put_oi),
        top_3_contracts_by_oi: top_shares(with_oi, total_oi),
        strike_concentration: strike_concentration(&strikes, total_oi),
    }
}

/// Builds a full aggregate from a chain snapshot alone: volume from each
/// contract's session volume, open interest as in [`open_interest_profile`].
/// `None` when the chain shows no volume.
pub fn aggregate_chain(
    ticker: &str,
    contracts: &[ChainContract],
    trading_date: NaiveDate,
) -> Option<UnderlyingAggregate> {
    let mut acc = VolumeAccumulator::new(ticker, trading_date);
    for contract in contracts {
        if let Some(contract_type) = contract.contract_type {
            acc.record(
                &contract.contract,
                contract_type,
                contract.expiration,
                contract.day_volume,
                0,
            );
        }
    }
    let mut agg = acc.finish()?;
    open_interest_profile(contracts).apply_to(&mut agg);
    Some(agg)
}
