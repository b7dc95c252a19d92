// Copyright (c) James Kassemi, SC, US. All rights reserved.
use crate::errors::BulkFetchError;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use bytes::Bytes;
use chrono::{Datelike, NaiveDate};
use log::debug;
use reqwest::StatusCode;
use std::time::Duration;
use url::Url;

/// Object key of the day-aggregate file for `date`:
/// `{dataset}/{YYYY}/{MM}/{YYYY-MM-DD}.csv.gz`.
pub fn day_key(dataset: &str, date: NaiveDate) -> String {
    format!(
        "{}/{:04}/{:02}/{}.csv.gz",
        dataset.trim_end_matches('/'),
        date.year(),
        date.month(),
        date.format("%Y-%m-%d")
    )
}

/// Remote holder of compressed bulk files.
#[async_trait]
pub trait BulkFileStore: Send + Sync {
    fn name(&self) -> &str;

    /// Whole compressed object.
    async fn fetch(&self, key: &str) -> Result<Bytes, BulkFetchError>;

    /// Metadata-only existence check. `Ok(false)` means the object is absent;
    /// missing entitlement is an error.
    async fn exists(&self, key: &str) -> Result<bool, BulkFetchError>;
}

pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub fn new(endpoint: &str, region: &str, bucket: &str, access_key: &str, secret_key: &str) -> Self {
        Self {
            client: make_s3_client(endpoint, region, access_key, secret_key),
            bucket: bucket.to_string(),
        }
    }
}

fn make_s3_client(endpoint: &str, region: &str, access_key: &str, secret_key: &str) -> Client {
    let credentials = Credentials::new(access_key, secret_key, None, None, "flatfile");
    let s3_cfg = aws_sdk_s3::Config::builder()
        .endpoint_url(endpoint)
        .region(Region::new(region.to_string()))
        .credentials_provider(credentials)
        .behavior_version(BehaviorVersion::latest())
        .force_path_style(true)
        .build();
    Client::from_conf(s3_cfg)
}

fn classify_sdk_error<E>(key: &str, err: SdkError<E, HttpResponse>) -> BulkFetchError
where
    E: std::error::Error + Send + Sync + 'static,
{
    match err.raw_response().map(|resp| resp.status().as_u16()) {
        Some(404) => BulkFetchError::NotFound { key: key.to_string() },
        Some(401) | Some(403) => BulkFetchError::AccessDenied { key: key.to_string() },
        _ => BulkFetchError::Transport(DisplayErrorContext(&err).to_string()),
    }
}

#[async_trait]
impl BulkFileStore for S3Store {
    fn name(&self) -> &str {
        "s3"
    }

    async fn fetch(&self, key: &str) -> Result<Bytes, BulkFetchError> {
        let resp = self
            .client
            .get_object()
            .bucket(self.bucket.clone())
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|svc| svc.is_no_such_key()) {
                    BulkFetchError::NotFound { key: key.to_string() }
                } else {
                    classify_sdk_error(key, err)
                }
            })?;
        let data = resp
            .body
            .collect()
            .await
            .map_err(|err| BulkFetchError::Transport(err.to_string()))?;
        Ok(data.into_bytes())
    }

    async fn exists(&self, key: &str) -> Result<bool, BulkFetchError> {
        match self
            .client
            .head_object()
            .bucket(self.bucket.clone())
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => match classify_sdk_error(key, err) {
                BulkFetchError::NotFound { .. } => Ok(false),
                other => Err(other),
            },
        }
    }
}

/// Plain HTTPS download authenticated with the REST API key.
pub struct HttpsStore {
    client: reqwest::Client,
    base: Url,
    api_key: String,
}

impl HttpsStore {
    pub fn new(base: &str, api_key: &str, timeout: Duration) -> Result<Self, BulkFetchError> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            api_key: api_key.to_string(),
        })
    }

    pub fn url_for(&self, key: &str) -> Result<Url, BulkFetchError> {
        Ok(self.base.join(&format!("flatfiles/{key}"))?)
    }
}

fn check_status(key: &str, status: StatusCode) -> Result<(), BulkFetchError> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::NOT_FOUND => Err(BulkFetchError::NotFound { key: key.to_string() }),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(BulkFetchError::AccessDenied { key: key.to_string() })
        }
        other => Err(BulkFetchError::Transport(format!("unexpected status {other} for {key}"))),
    }
}

#[async_trait]
impl BulkFileStore for HttpsStore {
    fn name(&self) -> &str {
        "https"
    }

    async fn fetch(&self, key: &str) -> Result<Bytes, BulkFetchError> {
        let url = self.url_for(key)?;
        debug!("[flatfile] GET {url}");
        let resp = self
            .client
            .get(url)
            .basic_auth(&self.api_key, Some(""))
            .send()
            .await?;
        check_status(key, resp.status())?;
        Ok(resp.bytes().await?)
    }

    async fn exists(&self, key: &str) -> Result<bool, BulkFetchError> {
        let url = self.url_for(key)?;
        let resp = self
            .client
            .head(url)
            .basic_auth(&self.api_key, Some(""))
            .send()
            .await?;
        match check_status(key, resp.status()) {
            Ok(()) => Ok(true),
            Err(BulkFetchError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }
}
