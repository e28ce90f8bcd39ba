use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::engine::{Engine, ExecuteError, ExecutionContext};
use crate::notebook::{self, Notebook};

/// Execute a single notebook document by:
/// 1. Loading it from `path`.
/// 2. Running all cells through `engine`.
/// 3. Writing the resulting document to the derived `.nbconvert.ipynb` path.
///
/// The write in step 3 happens on every exit path after the document is
/// loaded: success, cell failure, timeout, kernel death. The on-disk output
/// always reflects the latest attempted execution, complete or partial.
///
/// Returns `Ok(true)` if no cell failed. A cell failure prints the document
/// path and the traceback to stdout and returns `Ok(false)`; the batch moves
/// on. Anything else is `Err` and aborts the batch.
pub async fn execute_notebook(
    engine: &dyn Engine,
    path: &Path,
    ctx: &ExecutionContext,
) -> Result<bool> {
    let out_path = notebook::output_path(path);
    let mut nb = Notebook::read(path)?;

    let result = engine.execute(&mut nb, ctx).await;

    // Persist before inspecting the outcome, so the output file exists
    // whether or not the execution step failed.
    nb.write(&out_path)?;

    match result {
        Ok(()) => {
            info!(notebook = %path.display(), output = %out_path.display(), "Notebook executed");
            Ok(true)
        }
        Err(ExecuteError::CellFailed { traceback, .. }) => {
            println!(
                "Error executing the notebook \"{}\". Traceback:",
                path.display()
            );
            println!("{}", traceback.concat().trim_end_matches('\n'));
            Ok(false)
        }
        Err(other) => Err(other.into()),
    }
}
