//! Configuration for the import pipeline
//!
//! Two sources feed a run: `influxdb.yaml` for the destination store, which is
//! mandatory, and [`PipelineConfig`] for everything the pipeline itself tunes.

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Pipeline Constants
// ============================================================================

/// Default location of the store settings file
pub const DEFAULT_INFLUX_CONFIG_PATH: &str = "influxdb.yaml";

/// Default directory holding downloaded data and the checkpoint
pub const DEFAULT_DATA_DIRECTORY: &str = "data";

/// Default checkpoint file name inside the data directory
pub const DEFAULT_QUEUE_FILENAME: &str = ".queue";

/// Rows per batch on the chunk channel, and lines per store write
pub const DEFAULT_BATCH_SIZE: usize = 25_000;

/// Time-based flush of the store write buffer
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 12_000;

/// Batches the chunk channel holds before parser workers block
pub const DEFAULT_CHANNEL_CAPACITY: usize = 8;

/// CPUs kept back from the parser pool for the orchestrator and the writer
pub const RESERVED_CPUS: usize = 2;

// ============================================================================
// InfluxDB settings
// ============================================================================

#[derive(Debug, Deserialize)]
struct InfluxFile {
    influxdb: InfluxConfig,
}

/// Connection settings for the destination store
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
}

impl std::fmt::Debug for InfluxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl InfluxConfig {
    /// Load settings from a YAML file, then apply `INFLUX_*` overrides
    ///
    /// A missing file is a fatal configuration error; nothing is defaulted.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(IngestError::MissingInfluxConfig(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse the `influxdb:` document without touching the environment
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: InfluxFile = serde_yaml::from_str(content)?;
        Ok(file.influxdb)
    }

    /// Environment variables take precedence over the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("INFLUX_URL") {
            self.url = url;
        }
        if let Ok(token) = std::env::var("INFLUX_TOKEN") {
            self.token = token;
        }
        if let Ok(org) = std::env::var("INFLUX_ORG") {
            self.org = org;
        }
        if let Ok(bucket) = std::env::var("INFLUX_BUCKET") {
            self.bucket = bucket;
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("url", &self.url),
            ("token", &self.token),
            ("org", &self.org),
            ("bucket", &self.bucket),
        ] {
            if value.trim().is_empty() {
                return Err(IngestError::config(format!("influxdb.{} cannot be empty", name)));
            }
        }

        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(IngestError::config(format!(
                "influxdb.url must start with http:// or https://, got '{}'",
                self.url
            )));
        }

        Ok(())
    }
}

// ============================================================================
// CPU budget
// ============================================================================

/// How much of the machine an import may use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuUtilization {
    Low,
    Medium,
    High,
    /// Percentage of visible CPUs, 1-200
    Percent(u8),
}

impl CpuUtilization {
    /// Scale a CPU count by this level
    pub fn scale(self, cpus: usize) -> usize {
        let cpus = cpus as f64;
        let scaled = match self {
            CpuUtilization::Low => (cpus / 2.5).ceil(),
            CpuUtilization::Medium => (cpus / 1.5).ceil(),
            CpuUtilization::High => cpus,
            CpuUtilization::Percent(p) => (cpus * f64::from(p) / 100.0).ceil(),
        };
        (scaled as usize).max(1)
    }
}

impl std::str::FromStr for CpuUtilization {
    type Err = IngestError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(CpuUtilization::Low),
            "medium" => Ok(CpuUtilization::Medium),
            "high" => Ok(CpuUtilization::High),
            other => match other.parse::<u8>() {
                Ok(p) if (1..=200).contains(&p) => Ok(CpuUtilization::Percent(p)),
                _ => Err(IngestError::config(format!(
                    "cpu utilization must be low, medium, high or an integer percent 1-200, got '{}'",
                    s
                ))),
            },
        }
    }
}

/// CPUs visible to this process
pub fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Parser pool size for a CPU budget: `max(1, cpus - 2)`
pub fn parser_pool_size(cpus: usize) -> usize {
    cpus.saturating_sub(RESERVED_CPUS).max(1)
}

// ============================================================================
// Pipeline settings
// ============================================================================

/// Tunables for one import run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding record data and the checkpoint
    pub data_directory: PathBuf,

    /// Checkpoint file name inside `data_directory`
    pub queue_filename: String,

    /// Lines per chunk and per store write
    pub batch_size: usize,

    /// Store buffer flush interval
    pub flush_interval: Duration,

    /// Chunk channel bound, in batches
    pub channel_capacity: usize,

    /// Parser workers running at once
    pub pool_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from(DEFAULT_DATA_DIRECTORY),
            queue_filename: DEFAULT_QUEUE_FILENAME.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            pool_size: parser_pool_size(available_cpus()),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_directory = dir.into();
        self
    }

    pub fn with_queue_filename(mut self, name: impl Into<String>) -> Self {
        self.queue_filename = name.into();
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Derive the pool size from a CPU utilization level
    pub fn with_cpu_utilization(self, level: CpuUtilization) -> Self {
        let cpus = level.scale(available_cpus());
        self.with_pool_size(parser_pool_size(cpus))
    }

    /// `<data_directory>/<queue_filename>`
    pub fn checkpoint_path(&self) -> PathBuf {
        self.data_directory.join(&self.queue_filename)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_filename.trim().is_empty() {
            return Err(IngestError::config("queue filename cannot be empty"));
        }
        if self.batch_size == 0 {
            return Err(IngestError::config("batch size must be greater than 0"));
        }
        if self.channel_capacity == 0 {
            return Err(IngestError::config("channel capacity must be greater than 0"));
        }
        if self.pool_size == 0 {
            return Err(IngestError::config("pool size must be greater than 0"));
        }
        if self.flush_interval.is_zero() {
            return Err(IngestError::config("flush interval must be greater than 0"));
        }
        Ok(())
    }
}
