// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Bulk day-aggregate files: remote stores (S3 and HTTPS), gzip CSV decoding
//! and a local disk cache.

mod cache;
mod decode;
mod errors;
mod source;
mod store;

pub use cache::{BulkFileCache, DiskCache, cache_entry_is_stale};
pub use decode::parse_day_aggregates;
pub use errors::BulkFetchError;
pub use source::{DayAggregateSource, FlatfileSource};
pub use store::{BulkFileStore, HttpsStore, S3Store, day_key};
