// src/edgar/mod.rs
pub mod client;
pub mod models;

use async_trait::async_trait;
use models::{DownloadOutcome, DownloadRequest};

/// Populates the filings directory for one request. Failures are reported
/// through an unsuccessful outcome rather than an error.
#[async_trait]
pub trait FilingDownloader: Send + Sync {
    async fn download(&self, request: &DownloadRequest) -> DownloadOutcome;
}
