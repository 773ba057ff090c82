//! Export command implementation

use super::{connect, exit_code, job_error_code, summary_code, table_list};
use crate::config::{TabportConfig, WorkerCount};
use crate::core::codec::Format;
use crate::core::export::{ExportJob, ExportJobConfig};
use crate::domain::Result;
use clap::Args;
use tokio::sync::watch;

/// Arguments for the export command
#[derive(Args, Debug, Default)]
pub struct ExportArgs {
    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Rows per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Concurrent batch workers: a number, "auto" or a CPU share like "50%"
    #[arg(long)]
    pub parallel_workers: Option<WorkerCount>,

    /// Gzip batch files
    #[arg(long)]
    pub compress: bool,

    /// Only export these tables (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub tables: Vec<String>,

    /// Skip these tables (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub exclude_tables: Vec<String>,

    /// WHERE predicate applied to every exported table
    #[arg(long = "where", value_name = "PREDICATE")]
    pub where_clause: Option<String>,

    /// Batch file format (csv, json or sql)
    #[arg(long)]
    pub format: Option<String>,

    /// Output directory
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Export the result of this query as one batch, named by --tables
    #[arg(long)]
    pub query: Option<String>,
}

impl ExportArgs {
    /// Apply command-line flags on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut TabportConfig) -> Result<()> {
        let export = &mut config.export;
        if let Some(batch_size) = self.batch_size {
            export.batch_size = batch_size;
        }
        if let Some(workers) = self.parallel_workers {
            export.parallel_workers = workers;
        }
        if self.compress {
            export.compress = true;
        }
        let tables = table_list(&self.tables);
        if !tables.is_empty() {
            export.tables = tables;
        }
        let exclude = table_list(&self.exclude_tables);
        if !exclude.is_empty() {
            export.exclude_tables = exclude;
        }
        if let Some(predicate) = &self.where_clause {
            export.where_clause = Some(predicate.clone());
        }
        if let Some(format) = &self.format {
            export.format = format.parse::<Format>()?;
        }
        if let Some(dir) = &self.output_dir {
            export.output_dir = dir.clone();
        }
        if let Some(query) = &self.query {
            export.query = Some(query.clone());
        }
        Ok(())
    }

    /// Execute the export command
    pub async fn execute(
        &self,
        config: TabportConfig,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let job_config = ExportJobConfig::from_config(&config);
        tracing::info!(
            output_dir = %job_config.output_dir.display(),
            format = %job_config.format,
            workers = job_config.workers,
            "Starting export command"
        );

        let db = match connect(&config, job_config.workers).await {
            Ok(db) => db,
            Err(code) => return Ok(code),
        };

        let summary = match ExportJob::new(db, job_config, shutdown_signal).run().await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!(error = %e, "Export failed");
                eprintln!("Export failed: {e}");
                return Ok(job_error_code(&e));
            }
        };

        println!("{}", summary.format_report());

        let code = summary_code(summary.interrupted, summary.is_successful());
        match code {
            exit_code::INTERRUPTED => {
                tracing::info!("Export interrupted by user signal");
                println!("Export interrupted. Tables without a manifest must be exported again.");
            }
            exit_code::TABLE_FAILED => println!("Export completed with failures"),
            _ => println!("Export completed successfully"),
        }
        Ok(code)
    }
}
