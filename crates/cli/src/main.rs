//! Offload CLI - run a Task Unit in an isolated thread or child process
//! Also the composition root: wires contexts, registry and configuration

mod logging;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use offload_core::application::{CoordinatorConfig, ExecutionCoordinator, TaskRegistry};
use offload_core::domain::Payload;
use offload_core::port::ExecutionContext;
use offload_infra_system::{run_worker_main, SubprocessConfig, SubprocessContext, ThreadContext};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const WORKER_SUBCOMMAND: &str = "worker";

#[derive(Parser)]
#[command(name = "offload")]
#[command(about = "Offload Task Engine CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log format: pretty or json
    #[arg(long, global = true, env = "OFFLOAD_LOG_FORMAT", default_value = "pretty")]
    log_format: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Dedicated OS thread in this process
    Thread,
    /// Child process running `offload worker`
    Process,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one task and print its outcome
    Run {
        /// Registered task name (see `offload tasks`)
        task: String,

        /// Payload as JSON (plain text is taken as a string)
        #[arg(short, long)]
        payload: Option<String>,

        /// Isolation mode
        #[arg(short, long, value_enum, default_value_t = Mode::Thread)]
        mode: Mode,

        /// Fail the task if it runs longer than this (overrides OFFLOAD_TIMEOUT_MS)
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Wait this long after an exit for a late result (overrides OFFLOAD_EXIT_GRACE_MS)
        #[arg(long)]
        grace_ms: Option<u64>,

        /// Working directory for process mode
        #[arg(long, default_value = ".")]
        working_dir: String,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List registered tasks
    Tasks,

    /// Serve one request on stdin/stdout (spawned by process mode)
    #[command(hide = true)]
    Worker,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let registry = TaskRegistry::with_builtins();

    match cli.command {
        Commands::Worker => {
            // Quiet by default: the parent already logs the lifecycle
            logging::init_logging(&cli.log_format, "offload=warn")?;
            let code = run_worker_main(&registry);
            std::process::exit(code);
        }
        Commands::Tasks => {
            for name in registry.names() {
                println!("{}", name);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            task,
            payload,
            mode,
            timeout_ms,
            grace_ms,
            working_dir,
            json,
        } => {
            logging::init_logging(&cli.log_format, "offload=info")?;
            info!("Offload v{} starting...", VERSION);

            let mut config = CoordinatorConfig::from_env().context("Invalid configuration")?;
            if let Some(ms) = timeout_ms {
                config = config.with_timeout(Duration::from_millis(ms));
            }
            if let Some(ms) = grace_ms {
                config = config.with_exit_grace(Duration::from_millis(ms));
            }

            let context: Arc<dyn ExecutionContext> = match mode {
                Mode::Thread => Arc::new(ThreadContext::new(registry)),
                Mode::Process => {
                    let working_dir = shellexpand::tilde(&working_dir).into_owned();
                    let subprocess = SubprocessConfig::current_exe(vec![WORKER_SUBCOMMAND.to_string()])
                        .context("Failed to configure worker process")?
                        .with_working_dir(working_dir);
                    Arc::new(SubprocessContext::new(subprocess))
                }
            };

            let payload = payload
                .map(|text| Payload::from_json_or_string(&text))
                .unwrap_or_default();

            let coordinator = ExecutionCoordinator::new(context, config);
            let handle = coordinator.spawn(task, payload).await;

            let terminator = handle.terminator();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, terminating task");
                    terminator.terminate();
                }
            });

            let report = handle.join().await;
            if json {
                output::print_json(&report)?;
            } else {
                output::print_text(&report);
            }

            if report.outcome.is_success() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
