//! histdata-ingest - bulk CSV import into InfluxDB

use clap::{Parser, Subcommand};
use histdata_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use histdata_ingest::config::{
    CpuUtilization, InfluxConfig, PipelineConfig, DEFAULT_CHANNEL_CAPACITY,
    DEFAULT_DATA_DIRECTORY, DEFAULT_INFLUX_CONFIG_PATH, DEFAULT_QUEUE_FILENAME,
};
use histdata_ingest::influx::InfluxClient;
use histdata_ingest::pipeline::Pipeline;
use histdata_ingest::progress::{ImportProgress, NoProgress, ProgressReporter};
use histdata_ingest::queue::RecordQueue;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "histdata-ingest")]
#[command(author, version, about = "Import histdata.com quote CSVs into InfluxDB")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding record data and the queue checkpoint
    #[arg(long, global = true, env = "HISTDATA_DATA_DIRECTORY", default_value = DEFAULT_DATA_DIRECTORY)]
    data_directory: PathBuf,

    /// Checkpoint file name inside the data directory
    #[arg(long, global = true, default_value = DEFAULT_QUEUE_FILENAME)]
    queue_filename: String,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import every CSV_CLEAN record on the queue
    Import {
        /// InfluxDB connection settings
        #[arg(short = 'I', long, default_value = DEFAULT_INFLUX_CONFIG_PATH)]
        influx_config: PathBuf,

        /// low, medium, high or a percent of CPUs (1-200); all CPUs when omitted
        #[arg(short, long)]
        cpu_utilization: Option<CpuUtilization>,

        /// Batches buffered between parsers and the writer
        #[arg(long, default_value_t = DEFAULT_CHANNEL_CAPACITY)]
        channel_capacity: usize,

        /// Also pick up CSV_CLEAN records from status files in the data directory
        #[arg(long)]
        rescan: bool,

        /// Do not draw a progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Show the queue checkpoint by status
    Queue {
        /// Print the counts as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        })
        .output(LogOutput::Console)
        .log_file_prefix("histdata-ingest")
        .build();

    // Environment variables take precedence
    let log_config = LogConfig::from_env_with_base(log_config.clone()).unwrap_or(log_config);
    let _ = init_logging(&log_config);

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Pipeline settings for `import`; without a utilization level every CPU counts
fn import_config(
    base: PipelineConfig,
    cpu_utilization: Option<CpuUtilization>,
    channel_capacity: usize,
) -> PipelineConfig {
    let config = match cpu_utilization {
        Some(level) => base.with_cpu_utilization(level),
        None => base,
    };
    config.with_channel_capacity(channel_capacity)
}

async fn execute_command(cli: &Cli) -> anyhow::Result<()> {
    let config = PipelineConfig::new()
        .with_data_directory(&cli.data_directory)
        .with_queue_filename(&cli.queue_filename);

    match &cli.command {
        Commands::Import {
            influx_config,
            cpu_utilization,
            channel_capacity,
            rescan,
            no_progress,
        } => {
            // Fail on bad settings before touching any record.
            let influx = InfluxConfig::load(influx_config)?;
            let client = InfluxClient::new(&influx)?;

            let config = import_config(config, *cpu_utilization, *channel_capacity);
            config.validate()?;

            let progress: Arc<dyn ProgressReporter> = if *no_progress {
                Arc::new(NoProgress)
            } else {
                Arc::new(ImportProgress::new())
            };
            let pipeline = Pipeline::new(config).with_progress(progress);

            let current = pipeline.load_queue(*rescan)?;
            let next = Arc::new(RecordQueue::new("next"));
            let summary = pipeline.run(current, next, client).await?;

            for failure in &summary.drain.failures {
                eprintln!("  failed: {} ({})", failure.url, failure.error);
            }
            println!(
                "Imported {} record(s), {} row(s); {} failed, {} forwarded. {} record(s) queued.",
                summary.drain.imported,
                summary.drain.rows,
                summary.drain.failed(),
                summary.drain.forwarded,
                summary.checkpointed
            );
            info!(duration_seconds = summary.duration_seconds, "Import complete");
        },

        Commands::Queue { json } => {
            let path = config.checkpoint_path();
            let queue = RecordQueue::load_checkpoint("current", &path)?;
            if *json {
                let counts: BTreeMap<String, usize> = queue
                    .status_counts()
                    .into_iter()
                    .map(|(status, count)| (status.to_string(), count))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&counts)?);
                return Ok(());
            }
            println!("{} ({} record(s))", path.display(), queue.len());
            for (status, count) in queue.status_counts() {
                println!("  {:<18} {}", status, count);
            }
        },
    }

    Ok(())
}
