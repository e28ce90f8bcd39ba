use std::path::PathBuf;
use std::time::Duration;

/// Kernel used when none is named on the command line.
pub const DEFAULT_KERNEL_NAME: &str = "python3";

/// Total execution budget per notebook.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Settings for one batch run.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Kernel name to resolve through the registry.
    pub kernel_name: String,
    /// Total budget for executing one notebook, all cells included.
    pub timeout: Duration,
    /// Explicit kernels.json path; `None` falls back to the lookup chain.
    pub kernels_file: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            kernel_name: DEFAULT_KERNEL_NAME.to_string(),
            timeout: DEFAULT_TIMEOUT,
            kernels_file: None,
        }
    }
}
