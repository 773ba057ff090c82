//! Import command implementation

use super::{connect, exit_code, job_error_code, summary_code, table_list};
use crate::config::{TabportConfig, WorkerCount};
use crate::core::import::{ImportJob, ImportJobConfig, ImportMode};
use crate::domain::Result;
use clap::Args;
use tokio::sync::watch;

/// Arguments for the import command
#[derive(Args, Debug, Default)]
pub struct ImportArgs {
    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Rows per INSERT statement inside a batch transaction
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Concurrent batch workers: a number, "auto" or a CPU share like "50%"
    #[arg(long)]
    pub parallel_workers: Option<WorkerCount>,

    /// How existing rows are treated (skip, replace, truncate or cancel)
    #[arg(long)]
    pub mode: Option<String>,

    /// Suspend foreign-key checks inside each batch transaction
    #[arg(long)]
    pub disable_fk: bool,

    /// Keep going after a batch or table failure
    #[arg(long)]
    pub continue_on_error: bool,

    /// Directory written by a previous export
    #[arg(long)]
    pub input_dir: Option<String>,

    /// Only import these tables (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub tables: Vec<String>,

    /// Skip these tables (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub exclude_tables: Vec<String>,
}

impl ImportArgs {
    /// Apply command-line flags on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut TabportConfig) -> Result<()> {
        let import = &mut config.import;
        if let Some(batch_size) = self.batch_size {
            import.batch_size = batch_size;
        }
        if let Some(workers) = self.parallel_workers {
            import.parallel_workers = workers;
        }
        if let Some(mode) = &self.mode {
            import.mode = mode.parse::<ImportMode>()?;
        }
        if self.disable_fk {
            import.disable_fk = true;
        }
        if self.continue_on_error {
            import.continue_on_error = true;
        }
        if let Some(dir) = &self.input_dir {
            import.input_dir = dir.clone();
        }
        let tables = table_list(&self.tables);
        if !tables.is_empty() {
            import.tables = tables;
        }
        let exclude = table_list(&self.exclude_tables);
        if !exclude.is_empty() {
            import.exclude_tables = exclude;
        }
        Ok(())
    }

    /// Execute the import command
    pub async fn execute(
        &self,
        config: TabportConfig,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let job_config = ImportJobConfig::from_config(&config);
        tracing::info!(
            input_dir = %job_config.input_dir.display(),
            mode = %job_config.mode,
            workers = job_config.workers,
            "Starting import command"
        );

        let db = match connect(&config, job_config.workers).await {
            Ok(db) => db,
            Err(code) => return Ok(code),
        };

        let summary = match ImportJob::new(db, job_config, shutdown_signal).run().await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!(error = %e, "Import failed");
                eprintln!("Import failed: {e}");
                return Ok(job_error_code(&e));
            }
        };

        println!("{}", summary.format_report());

        let code = summary_code(summary.interrupted, summary.is_successful());
        match code {
            exit_code::INTERRUPTED => {
                tracing::info!("Import interrupted by user signal");
                println!("Import interrupted. Committed batches stay in place.");
            }
            exit_code::TABLE_FAILED => println!("Import completed with failures"),
            _ => println!("Import completed successfully"),
        }
        Ok(code)
    }
}
