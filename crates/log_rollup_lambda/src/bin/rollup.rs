use std::process::ExitCode;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use log_rollup_core::contract::ProducerRequest;
use log_rollup_core::error::RollupError;
use log_rollup_lambda::config::{QueueLocation, RollupConfig};
use log_rollup_lambda::handlers::producer::run_producer;
use log_rollup_lambda::handlers::worker::run_polling_worker;
use log_rollup_lambda::logging::init_tracing;
use log_rollup_lambda::runtime::AwsServices;
use tracing::error;

#[derive(Debug, Parser)]
#[command(name = "rollup", about = "Compact access logs into daily archives")]
struct Cli {
    /// Name of the task queue.
    #[arg(long, env = "ROLLUP_QUEUE_NAME", global = true)]
    queue_name: Option<String>,

    /// URL of the task queue; takes precedence over --queue-name.
    #[arg(long, env = "ROLLUP_QUEUE_URL", global = true)]
    queue_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List prefixes and enqueue one task per past day.
    Producer {
        /// Role to assume for listing the log buckets.
        #[arg(long = "s3-role")]
        role_identifier: String,

        /// Prefixes such as s3://bucket1/example.com/
        #[arg(long, num_args = 1.., required = true)]
        prefixes: Vec<String>,

        /// Replay as of this UTC day instead of today.
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Receive tasks from the queue and archive them.
    Worker {
        /// Number of tasks to receive.
        #[arg(long, default_value_t = 1)]
        count: usize,

        /// Delete original log objects after a verified upload.
        #[arg(long)]
        delete: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut config = match RollupConfig::from_env() {
        Ok(config) => config,
        Err(failure) => {
            eprintln!("{failure}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.log_level);

    if let Some(url) = cli.queue_url {
        config.queue = Some(QueueLocation::Url(url));
    } else if let Some(name) = cli.queue_name {
        config.queue = Some(QueueLocation::Name(name));
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(failure) => {
            eprintln!("failed to start runtime: {failure}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli.command, config)) {
        Ok(code) => code,
        Err(failure) => {
            error!(
                component = "cli",
                event = "command_failed",
                error_code = failure.code(),
                error = %failure,
                "command failed"
            );
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, mut config: RollupConfig) -> Result<ExitCode, RollupError> {
    if let Command::Worker { delete, .. } = &command {
        config.archiver.delete_originals = *delete;
    }
    let services = AwsServices::load(config).await?;

    tokio::task::spawn_blocking(move || execute(command, &services))
        .await
        .map_err(|failure| RollupError::Config(format!("command task failed: {failure}")))?
}

fn execute(command: Command, services: &AwsServices) -> Result<ExitCode, RollupError> {
    match command {
        Command::Producer {
            role_identifier,
            prefixes,
            as_of,
        } => {
            let summary = run_producer(
                ProducerRequest {
                    role_identifier,
                    prefixes,
                    as_of,
                },
                Utc::now().date_naive(),
                services.config.batch_limits,
                &services.producer_deps()?,
            )?;
            print_json(&summary)?;
            Ok(if summary.status == "ok" {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Worker { count, .. } => {
            let summary = run_polling_worker(
                services.queue()?,
                count,
                &services.config.archiver,
                &services.config.redrive,
                &services.archiver_deps(),
            )?;
            print_json(&summary)?;
            Ok(if summary.failed == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<(), RollupError> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(|error| RollupError::Payload(error.to_string()))?;
    println!("{rendered}");
    Ok(())
}
