// Copyright (c) James Kassemi, SC, US. All rights reserved.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BulkFetchError {
    #[error("bulk file not found: {key}")]
    NotFound { key: String },
    #[error("access denied for {key}; account may lack flat-file entitlement")]
    AccessDenied { key: String },
    #[error("malformed bulk file: {0}")]
    Parse(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BulkFetchError {
    /// Short label recorded in fetch metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            BulkFetchError::NotFound { .. } => "not_found",
            BulkFetchError::AccessDenied { .. } => "access_denied",
            BulkFetchError::Parse(_) => "parse",
            BulkFetchError::Transport(_) => "transport",
            BulkFetchError::Io(_) => "io",
        }
    }
}

impl From<csv_async::Error> for BulkFetchError {
    fn from(err: csv_async::Error) -> Self {
        BulkFetchError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for BulkFetchError {
    fn from(err: reqwest::Error) -> Self {
        BulkFetchError::Transport(err.to_string())
    }
}

impl From<url::ParseError> for BulkFetchError {
    fn from(err: url::ParseError) -> Self {
        BulkFetchError::Transport(format!("bad url: {err}"))
    }
}
