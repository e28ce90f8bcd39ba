// Batch driver: discover candidates, run each one, aggregate success.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::RunnerConfig;
use crate::discovery;
use crate::engine::{Engine, ExecutionContext, KernelEngine};
use crate::executor;
use crate::kernel;

/// Aggregate result of one batch run.
#[derive(Debug)]
pub struct BatchSummary {
    pub total: usize,
    /// Inputs whose execution hit a cell failure, in batch order.
    pub failed: Vec<PathBuf>,
}

impl BatchSummary {
    /// True iff every discovered document executed without a cell error.
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Resolve the configured kernel and run every candidate below `root`.
pub async fn run_batch(root: &Path, config: &RunnerConfig) -> Result<BatchSummary> {
    let spec = kernel::resolve_kernel(&config.kernel_name, config.kernels_file.as_deref())?;
    let engine = KernelEngine::new(spec, config.timeout);
    run_batch_with_engine(root, &engine).await
}

/// Run every candidate below `root` against `engine`, strictly one at a
/// time: a document completes (or fails) before the next one starts. No
/// retry, no parallelism.
pub async fn run_batch_with_engine(root: &Path, engine: &dyn Engine) -> Result<BatchSummary> {
    let notebooks = discovery::find_notebooks(root)?;
    println!("Running the following notebooks: {notebooks:?}");

    let mut failed = Vec::new();
    for path in &notebooks {
        // The kernel runs in the document's own directory so relative
        // resource references resolve.
        let run_path = path
            .parent()
            .unwrap_or(Path::new("."))
            .canonicalize()
            .with_context(|| format!("failed to resolve run directory for `{}`", path.display()))?;
        let ctx = ExecutionContext::new(run_path);

        info!(notebook = %path.display(), "Executing notebook");
        if !executor::execute_notebook(engine, path, &ctx).await? {
            failed.push(path.clone());
        }
    }

    let summary = BatchSummary {
        total: notebooks.len(),
        failed,
    };
    if summary.all_succeeded() {
        info!(total = summary.total, "All notebooks executed");
    } else {
        warn!(
            total = summary.total,
            failed = summary.failed.len(),
            "Batch finished with failures"
        );
    }

    Ok(summary)
}
