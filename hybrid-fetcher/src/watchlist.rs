// Copyright (c) James Kassemi, SC, US. All rights reserved.

/// Liquid underlyings queried when no bulk file is available.
pub const WATCHLIST: [&str; 48] = [
    // indices
    "SPY", "QQQ", "IWM", "DIA",
    // mega-cap tech
    "NVDA", "TSLA", "AAPL", "MSFT", "GOOGL", "META", "AMZN",
    "AMD", "INTC", "NFLX", "BABA", "NIO", "PLTR", "SOFI",
    // financials
    "BAC", "JPM", "GS", "WFC", "C",
    // energy
    "XLE", "USO", "XOM", "CVX",
    // volatility
    "VIX", "UVXY", "VIXY",
    // rates, metals, credit, EM
    "GLD", "SLV", "TLT", "HYG", "EEM",
    // healthcare
    "PFE", "JNJ", "UNH", "ABBV",
    // consumer
    "WMT", "HD", "MCD", "DIS",
    // industrials
    "BA", "CAT", "GE",
    // telecom
    "T", "VZ",
];

pub fn default_watchlist() -> Vec<String> {
    WATCHLIST.iter().map(|ticker| ticker.to_string()).collect()
}
