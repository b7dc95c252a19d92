// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Shared data model, contract parsing, retry policy and configuration for the options pulse pipeline.

pub mod config;
pub mod opra;
pub mod retry;
pub mod types;
