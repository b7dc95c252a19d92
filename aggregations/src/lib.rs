// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Per-underlying aggregation of daily options activity, from either the bulk
//! day-aggregate file or a live chain snapshot.

pub mod chain;
pub mod flatfile;
pub mod strike;
mod volume;

pub use chain::{ChainContract, OpenInterestProfile, aggregate_chain, open_interest_profile};
pub use flatfile::{ContractRow, aggregate_by_underlying};
pub use strike::strike_concentration;
pub use volume::{LEAP_MIN_DAYS, TOP_CONTRACTS};
