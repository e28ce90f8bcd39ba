use anyhow::Result;
use clap::Parser;
use nbrun::RunnerConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nbrun")]
#[command(about = "Execute notebook documents against a kernel and persist the results")]
struct Cli {
    /// Directory whose immediate subdirectories are scanned for notebooks
    #[arg(default_value = ".")]
    root: PathBuf,

    /// Kernel name used to execute code cells
    #[arg(long, env = "NBRUN_KERNEL", default_value = nbrun::DEFAULT_KERNEL_NAME)]
    kernel: String,

    /// Total execution budget per notebook, in seconds
    #[arg(long, env = "NBRUN_TIMEOUT_SECS", default_value_t = 600)]
    timeout_secs: u64,

    /// Path to a kernels.json registry (skips the default lookup chain)
    #[arg(long, env = "NBRUN_KERNELS")]
    kernels_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("nbrun=info".parse()?))
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    let config = RunnerConfig {
        kernel_name: cli.kernel,
        timeout: Duration::from_secs(cli.timeout_secs),
        kernels_file: cli.kernels_file,
    };

    info!(
        root = %cli.root.display(),
        kernel = %config.kernel_name,
        timeout_secs = config.timeout.as_secs(),
        "Starting notebook batch"
    );

    // Any error below (missing file, malformed document, kernel death,
    // timeout) aborts the whole batch through `?`; only cell failures are
    // absorbed into the summary.
    let summary = nbrun::run_batch(&cli.root, &config).await?;

    if summary.all_succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
