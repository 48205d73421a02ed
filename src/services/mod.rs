// src/services/mod.rs

//! Network-facing services: rate limiting, fetching, download orchestration.

pub mod client;
pub mod download;
pub mod rate_limit;

pub use client::{FetchClient, RawResponse};
pub use download::{
    ApiFullTextSource, DownloadFailure, DownloadOptions, DownloadOrchestrator, DownloadReport,
    FullTextSource,
};
pub use rate_limit::{RateLimitSnapshot, RateLimiter, ResponseSignal};
