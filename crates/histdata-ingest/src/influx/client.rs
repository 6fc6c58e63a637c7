//! Store write client
//!
//! [`LineSink`] is the seam between the batch writer and the store. The
//! production implementation is [`InfluxClient`], which talks to the InfluxDB v2
//! HTTP write API; tests substitute an in-memory sink.

use crate::config::InfluxConfig;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Per-request timeout for store writes
pub const WRITE_TIMEOUT_SECS: u64 = 60;

/// Timestamp precision of submitted lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    Seconds,
    #[default]
    Milliseconds,
    Microseconds,
    Nanoseconds,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Seconds => "s",
            Precision::Milliseconds => "ms",
            Precision::Microseconds => "us",
            Precision::Nanoseconds => "ns",
        }
    }
}

/// Destination for line protocol batches
///
/// Owned by exactly one batch writer; implementations need not be `Sync`.
#[async_trait]
pub trait LineSink: Send {
    /// Submit lines in order as one write
    async fn write_lines(&mut self, lines: &[String], precision: Precision) -> Result<()>;

    /// Release the connection; no writes follow
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// InfluxDB v2 HTTP write client
pub struct InfluxClient {
    http: reqwest::Client,
    write_url: String,
    token: String,
    org: String,
    bucket: String,
}

impl InfluxClient {
    pub fn new(config: &InfluxConfig) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(WRITE_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            write_url: format!("{}/api/v2/write", config.url.trim_end_matches('/')),
            token: config.token.clone(),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
        })
    }

    pub fn write_url(&self) -> &str {
        &self.write_url
    }
}

#[async_trait]
impl LineSink for InfluxClient {
    async fn write_lines(&mut self, lines: &[String], precision: Precision) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }

        let response = self
            .http
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", precision.as_str()),
            ])
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", self.token))
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(lines.join("\n"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::WriteRejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(lines = lines.len(), bucket = %self.bucket, "Lines written to InfluxDB");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        debug!(bucket = %self.bucket, "InfluxDB client released");
        Ok(())
    }
}
