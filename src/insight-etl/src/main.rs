//! Insight ETL: extracts analytics reports, cohort retention tables and
//! spreadsheet data.
//!
//! Logs go to stderr as JSON; command results go to stdout.

use clap::{Parser, Subcommand};
use insight_core::config::AppConfig;
use insight_core::JobFile;
use insight_integrations::SheetsClient;
use insight_jobs::{summarize, JobManager, JobOutcome};
use insight_reporting::{Ga4Client, RetentionAnalyzer, RetentionGranularity, RetentionQuery};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "insight-etl")]
#[command(about = "Analytics report extraction and cohort retention")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Analytics property id (overrides config)
    #[arg(long, global = true, env = "INSIGHT__GA4__PROPERTY_ID")]
    property_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every extraction job in the job file
    Run {
        /// Job file (overrides pipeline.jobs_path)
        #[arg(long)]
        jobs: Option<PathBuf>,

        /// Worker pool size (overrides pipeline.max_workers)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Compute a cohort retention table
    Retention {
        #[arg(long, default_value = "day")]
        granularity: RetentionGranularity,

        /// Split the table per platform
        #[arg(long, default_value_t = false)]
        platform: bool,

        #[arg(long, default_value_t = 1)]
        end_offset: u32,

        /// Lookback window in months, for every granularity
        #[arg(long, default_value_t = 12)]
        before_month: u32,
    },

    /// Read a spreadsheet
    Sheet {
        #[arg(long)]
        id: String,

        /// Worksheet title; every worksheet is read when omitted
        #[arg(long, requires = "range")]
        name: Option<String>,

        /// A1 range within the worksheet
        #[arg(long, requires = "name")]
        range: Option<String>,

        /// 1-based row holding the column names
        #[arg(long, default_value_t = 1)]
        header_row: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "insight_etl=info,insight_reporting=info,insight_jobs=info,insight_integrations=info"
                    .into()
            }),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(property_id) = cli.property_id {
        config.ga4.property_id = property_id;
    }

    match cli.command {
        Command::Run { jobs, workers } => {
            if let Some(path) = jobs {
                config.pipeline.jobs_path = path;
            }
            if let Some(workers) = workers {
                config.pipeline.max_workers = workers;
            }
            config.validate()?;
            run_jobs(&config).await
        }
        Command::Retention {
            granularity,
            platform,
            end_offset,
            before_month,
        } => {
            config.validate()?;
            let query = RetentionQuery {
                platform,
                granularity,
                end_offset,
                before_month,
            };
            let api = Arc::new(Ga4Client::new(&config.ga4)?);
            let result = RetentionAnalyzer::new(api, config.ga4.property_id.clone())
                .retention(&query)
                .await?;
            println!("{}", serde_json::to_string_pretty(&result.to_records())?);
            Ok(())
        }
        Command::Sheet {
            id,
            name,
            range,
            header_row,
        } => {
            let client = SheetsClient::new(&config.sheets, &config.ga4)?;
            let output = match (name, range) {
                (Some(name), Some(range)) => {
                    let table = client
                        .fetch_range(&id, &name, &range, header_row.saturating_sub(1))
                        .await?;
                    serde_json::to_value(table)?
                }
                _ => serde_json::to_value(client.fetch_all(&id, header_row).await?)?,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    }
}

async fn run_jobs(config: &AppConfig) -> anyhow::Result<()> {
    let jobs = JobFile::load(&config.pipeline.jobs_path)?;
    info!(
        property_id = %config.ga4.property_id,
        jobs = jobs.len(),
        path = %config.pipeline.jobs_path.display(),
        "Job file loaded"
    );

    let api = Arc::new(Ga4Client::new(&config.ga4)?);
    let reports = JobManager::from_config(config).run(jobs, api).await;

    for report in &reports {
        match &report.outcome {
            JobOutcome::Succeeded { table } => info!(
                job = %report.name,
                rows = table.len(),
                columns = ?table.columns,
                "Extracted"
            ),
            JobOutcome::Failed { error } => warn!(job = %report.name, error = %error, "Not extracted"),
        }
    }

    let summary = summarize(&reports);
    if !summary.all_ok() {
        error!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Extraction finished with failures"
        );
        anyhow::bail!("{} of {} jobs failed", summary.failed, reports.len());
    }

    info!(succeeded = summary.succeeded, "Extraction finished");
    Ok(())
}
