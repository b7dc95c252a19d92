// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Options chain snapshot client: pulls every contract of one underlying,
//! with open interest and session volume, via the REST snapshot endpoint.

use aggregations::ChainContract;
use async_trait::async_trait;
use chrono::NaiveDate;
use core_types::config::AppConfig;
use core_types::opra::{ContractType, Strike};
use log::{debug, warn};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("api reported status {0}")]
    Api(String),
}

/// Live chain lookup for one underlying.
#[async_trait]
pub trait ChainSnapshotSource: Send + Sync {
    async fn fetch_chain(&self, underlying: &str) -> Result<Vec<ChainContract>, SnapshotError>;
}

#[derive(Clone)]
pub struct SnapshotClient {
    client: Client,
    rest_base_url: String,
    api_key: String,
    page_limit: usize,
    max_pages: usize,
}

impl SnapshotClient {
    pub fn new(
        client: Client,
        rest_base_url: impl Into<String>,
        api_key: impl Into<String>,
        page_limit: usize,
        max_pages: usize,
    ) -> Self {
        Self {
            client,
            rest_base_url: rest_base_url.into(),
            api_key: api_key.into(),
            page_limit: page_limit.clamp(1, 250),
            max_pages: max_pages.max(1),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, SnapshotError> {
        let enrichment = &config.enrichment;
        let client = Client::builder()
            .timeout(Duration::from_secs(enrichment.request_timeout_secs))
            .build()?;
        Ok(Self::new(
            client,
            enrichment.rest_base.clone(),
            config.polygon_api_key.clone(),
            enrichment.page_limit,
            enrichment.max_pages,
        ))
    }

    fn build_initial_url(&self, underlying: &str) -> Result<Url, SnapshotError> {
        let mut url = Url::parse(&self.rest_base_url)?;
        url.set_path(&format!("/v3/snapshot/options/{underlying}"));
        url.query_pairs_mut()
            .append_pair("limit", &self.page_limit.to_string())
            .append_pair("apiKey", &self.api_key);
        Ok(url)
    }

    fn normalize_url(&self, next_url: &str) -> Result<Url, SnapshotError> {
        let mut url = match Url::parse(next_url) {
            Ok(abs) => abs,
            Err(_) => {
                let base = Url::parse(&self.rest_base_url)?;
                base.join(next_url)?
            }
        };
        if !url.query_pairs().any(|(k, _)| k == "apiKey") {
            url.query_pairs_mut().append_pair("apiKey", &self.api_key);
        }
        Ok(url)
    }
}

#[async_trait]
impl ChainSnapshotSource for SnapshotClient {
    async fn fetch_chain(&self, underlying: &str) -> Result<Vec<ChainContract>, SnapshotError> {
        let mut contracts = Vec::new();
        let mut next = Some(self.build_initial_url(underlying)?);
        let mut pages = 0usize;
        while let Some(current) = next.take() {
            if pages == self.max_pages {
                warn!(
                    "[chain] {underlying}: stopped after {pages} pages, {} contracts collected",
                    contracts.len()
                );
                break;
            }
            pages += 1;
            let resp = self.client.get(current).send().await?;
            if !resp.status().is_success() {
                return Err(SnapshotError::Status(resp.status().as_u16()));
            }
            let parsed: ChainResponse = resp.json().await?;
            parsed.check_status()?;
            if let Some(results) = parsed.results {
                contracts.extend(results.into_iter().map(ChainItem::into_contract));
            }
            next = match parsed.next_url {
                Some(raw) => Some(self.normalize_url(&raw)?),
                None => None,
            };
        }
        debug!("[chain] {underlying}: {} contracts over {pages} pages", contracts.len());
        Ok(contracts)
    }
}

#[derive(Debug, Deserialize)]
struct ChainResponse {
    status: Option<String>,
    next_url: Option<String>,
    results: Option<Vec<ChainItem>>,
}

impl ChainResponse {
    fn check_status(&self) -> Result<(), SnapshotError> {
        match self.status.as_deref() {
            None | Some("OK") | Some("DELAYED") => Ok(()),
            Some(other) => Err(SnapshotError::Api(other.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChainItem {
    open_interest: Option<f64>,
    day: Option<DayItem>,
    details: Option<DetailsItem>,
}

#[derive(Debug, Deserialize)]
struct DayItem {
    volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DetailsItem {
    ticker: Option<String>,
    contract_type: Option<String>,
    strike_price: Option<f64>,
    expiration_date: Option<String>,
}

fn count(value: Option<f64>) -> u64 {
    value
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v.round() as u64)
        .unwrap_or(0)
}

impl ChainItem {
    fn into_contract(self) -> ChainContract {
        let details = self.details;
        let (contract, contract_type, strike, expiration) = match details {
            Some(d) => (
                d.ticker.unwrap_or_default(),
                d.contract_type.as_deref().and_then(|kind| match kind {
                    "call" => Some(ContractType::Call),
                    "put" => Some(ContractType::Put),
                    _ => None,
                }),
                d.strike_price.and_then(Strike::from_dollars),
                d.expiration_date
                    .as_deref()
                    .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()),
            ),
            None => (String::new(), None, None, None),
        };
        ChainContract {
            contract,
            contract_type,
            strike,
            expiration,
            day_volume: count(self.day.and_then(|day| day.volume)),
            open_interest: count(self.open_interest),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SnapshotClient {
        SnapshotClient::new(Client::new(), "https://api.example.com", "secret", 250, 10)
    }

    #[test]
    fn initial_url_carries_limit_and_key() {
        let url = client().build_initial_url("SPY").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v3/snapshot/options/SPY?limit=250&apiKey=secret"
        );
    }

    #[test]
    fn next_url_gets_key_appended_once() {
        let c = client();
        let relative = c.normalize_url("/v3/snapshot/options/SPY?cursor=abc").unwrap();
        assert_eq!(
            relative.as_str(),
            "https://api.example.com/v3/snapshot/options/SPY?cursor=abc&apiKey=secret"
        );
        let absolute = c
            .normalize_url("https://api.example.com/v3/snapshot/options/SPY?cursor=abc&apiKey=other")
            .unwrap();
        assert_eq!(absolute.query_pairs().filter(|(k, _)| k == "apiKey").count(), 1);
    }

    #[test]
    fn page_limit_and_max_pages_are_clamped() {
        let c = SnapshotClient::new(Client::new(), "https://api.example.com", "k", 5_000, 0);
        assert_eq!(c.page_limit, 250);
        assert_eq!(c.max_pages, 1);
    }

    #[test]
    fn results_map_to_chain_contracts() {
        let body = r#"{
            "status": "OK",
            "next_url": "https://api.example.com/v3/snapshot/options/SPY?cursor=p2",
            "results": [
                {
                    "open_interest": 12345,
                    "day": {"volume": 678},
                    "details": {
                        "ticker": "O:SPY250117C00600000",
                        "contract_type": "call",
                        "strike_price": 600,
                        "expiration_date": "2025-01-17"
                    }
                },
                {
                    "details": {"ticker": "O:SPY250117P00597500", "contract_type": "put", "strike_price": 597.5}
                },
                {}
            ]
        }"#;
        let parsed: ChainResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.check_status().is_ok());
        assert!(parsed.next_url.is_some());
        let contracts: Vec<_> = parsed
            .results
            .unwrap()
            .into_iter()
            .map(ChainItem::into_contract)
            .collect();

        assert_eq!(contracts[0].contract, "O:SPY250117C00600000");
        assert_eq!(contracts[0].contract_type, Some(ContractType::Call));
        assert_eq!(contracts[0].strike, Some(Strike::from_thousandths(600_000)));
        assert_eq!(contracts[0].expiration, NaiveDate::from_ymd_opt(2025, 1, 17));
        assert_eq!(contracts[0].day_volume, 678);
        assert_eq!(contracts[0].open_interest, 12_345);

        assert_eq!(contracts[1].contract_type, Some(ContractType::Put));
        assert_eq!(contracts[1].strike, Some(Strike::from_thousandths(597_500)));
        assert_eq!(contracts[1].open_interest, 0);
        assert_eq!(contracts[1].expiration, None);

        assert_eq!(contracts[2], ChainContract::default());
    }

    #[test]
    fn error_status_is_reported() {
        let parsed: ChainResponse =
            serde_json::from_str(r#"{"status":"ERROR","results":[]}"#).unwrap();
        assert!(matches!(parsed.check_status(), Err(SnapshotError::Api(s)) if s == "ERROR"));
    }
}
