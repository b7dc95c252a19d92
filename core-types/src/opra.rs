// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Helpers for working with OPRA option contract identifiers.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

const OPRA_PREFIX: &str = "O:";
// 6 date + 1 dir + 8 strike
const SUFFIX_LEN: usize = 15;

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractType {
    Call,
    Put,
}

impl ContractType {
    pub fn from_direction(dir: char) -> Option<Self> {
        match dir {
            'C' => Some(ContractType::Call),
            'P' => Some(ContractType::Put),
            _ => None,
        }
    }

    pub fn direction(self) -> char {
        match self {
            ContractType::Call => 'C',
            ContractType::Put => 'P',
        }
    }
}

/// Strike price held in thousandths of a dollar, the unit OPRA encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Strike(u64);

impl Strike {
    pub fn from_thousandths(value: u64) -> Self {
        Self(value)
    }

    /// Rounds a dollar value to the nearest thousandth. Negative and
    /// non-finite inputs yield `None`.
    pub fn from_dollars(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        Some(Self((value * 1000.0).round() as u64))
    }

    pub fn thousandths(self) -> u64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

impl fmt::Display for Strike {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_f64())
    }
}

/// Decoded OPRA contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedContract {
    pub underlying: String,
    pub expiry: NaiveDate,
    pub contract_type: ContractType,
    pub strike: Strike,
}

impl ParsedContract {
    /// Rebuilds the canonical `O:` identifier.
    pub fn to_symbol(&self) -> String {
        format!(
            "{}{}{:02}{:02}{:02}{}{:08}",
            OPRA_PREFIX,
            self.underlying,
            self.expiry.year() - 2000,
            self.expiry.month(),
            self.expiry.day(),
            self.contract_type.direction(),
            self.strike.thousandths()
        )
    }
}

/// Outcome of parsing a contract identifier. Unrecognized rows are skipped by
/// callers, never treated as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolParse {
    Parsed(ParsedContract),
    Unrecognized,
}

impl SymbolParse {
    pub fn parsed(self) -> Option<ParsedContract> {
        match self {
            SymbolParse::Parsed(contract) => Some(contract),
            SymbolParse::Unrecognized => None,
        }
    }
}

/// Parse an OPRA contract string (e.g., `O:SPY241220P00720000`).
///
/// Format: `O:<UNDERLYING A-Z+><YYMMDD><C|P><STRIKE x1000, 8 digits>`. Anything
/// else, including impossible calendar dates, is `Unrecognized`.
pub fn parse_opra_contract(contract: &str) -> SymbolParse {
    let Some(sym) = contract.strip_prefix(OPRA_PREFIX) else {
        return SymbolParse::Unrecognized;
    };
    if !sym.is_ascii() || sym.len() <= SUFFIX_LEN {
        return SymbolParse::Unrecognized;
    }
    let date_start = sym.len() - SUFFIX_LEN;
    let underlying = &sym[..date_start];
    if !underlying.bytes().all(|b| b.is_ascii_uppercase()) {
        return SymbolParse::Unrecognized;
    }
    let date = &sym[date_start..date_start + 6];
    let dir = sym.as_bytes()[date_start + 6] as char;
    let strike = &sym[date_start + 7..];
    if !all_digits(date) || !all_digits(strike) {
        return SymbolParse::Unrecognized;
    }
    let Some(contract_type) = ContractType::from_direction(dir) else {
        return SymbolParse::Unrecognized;
    };
    let (Ok(yy), Ok(mm), Ok(dd)) = (
        date[0..2].parse::<i32>(),
        date[2..4].parse::<u32>(),
        date[4..6].parse::<u32>(),
    ) else {
        return SymbolParse::Unrecognized;
    };
    let Some(expiry) = NaiveDate::from_ymd_opt(2000 + yy, mm, dd) else {
        return SymbolParse::Unrecognized;
    };
    let Ok(strike) = strike.parse::<u64>() else {
        return SymbolParse::Unrecognized;
    };
    SymbolParse::Parsed(ParsedContract {
        underlying: underlying.to_string(),
        expiry,
        contract_type,
        strike: Strike::from_thousandths(strike),
    })
}

fn all_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}
