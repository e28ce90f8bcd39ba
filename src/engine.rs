//! Notebook-level execution on top of the kernel client.
//!
//! [`KernelEngine`] is the real engine: one kernel process per notebook,
//! cells run in document order, the whole run bounded by a single timeout.
//! The [`Engine`] trait is the seam the executor (and its tests) depend on.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::kernel::{KernelClient, KernelError, KernelMessage, KernelSpec, ReplyStatus};
use crate::notebook::{Cell, Notebook, Output, Source};

/// Per-document execution settings that are not part of the engine itself.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Working directory for the kernel process; relative resource
    /// references in the document resolve against it.
    pub run_path: PathBuf,
}

impl ExecutionContext {
    pub fn new(run_path: impl Into<PathBuf>) -> Self {
        Self {
            run_path: run_path.into(),
        }
    }
}

/// Errors from executing a notebook.
///
/// Only `CellFailed` is a per-document failure the batch recovers from;
/// the other variants abort the whole run.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    /// A cell raised. The failing cell's error output has already been
    /// recorded in the document, so the persisted file reflects the
    /// partial run.
    #[error("cell {cell_index} raised {ename}: {evalue}")]
    CellFailed {
        cell_index: usize,
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },

    /// The total execution budget for the notebook elapsed.
    #[error("notebook execution exceeded the {}s budget", limit.as_secs())]
    Timeout { limit: Duration },

    /// The kernel process failed underneath us.
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

/// Something that can run all cells of a notebook in place.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn execute(
        &self,
        nb: &mut Notebook,
        ctx: &ExecutionContext,
    ) -> Result<(), ExecuteError>;
}

/// Executes notebooks against a kernel child process.
pub struct KernelEngine {
    spec: KernelSpec,
    timeout: Duration,
}

impl KernelEngine {
    pub fn new(spec: KernelSpec, timeout: Duration) -> Self {
        Self { spec, timeout }
    }

    async fn run_cells(
        &self,
        nb: &mut Notebook,
        ctx: &ExecutionContext,
    ) -> Result<(), ExecuteError> {
        let mut client = KernelClient::launch(&self.spec, &ctx.run_path).await?;
        let mut execution_count = 1;

        for (cell_index, cell) in nb.cells.iter_mut().enumerate() {
            let Cell::Code(cell) = cell else { continue };

            debug!(cell_index, "Executing cell");
            let outcome = client.execute(cell.source.as_str()).await?;

            cell.execution_count = Some(execution_count);
            cell.outputs = outputs_from_messages(outcome.messages, execution_count);

            if outcome.status == ReplyStatus::Error {
                // Cells after the failing one keep their stale state; the
                // kernel is torn down when the client drops.
                return Err(cell_failure(&cell.outputs, cell_index));
            }

            execution_count += 1;
        }

        client.shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl Engine for KernelEngine {
    async fn execute(
        &self,
        nb: &mut Notebook,
        ctx: &ExecutionContext,
    ) -> Result<(), ExecuteError> {
        match tokio::time::timeout(self.timeout, self.run_cells(nb, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(ExecuteError::Timeout {
                limit: self.timeout,
            }),
        }
    }
}

/// Translate wire messages into notebook outputs, in arrival order.
fn outputs_from_messages(messages: Vec<KernelMessage>, execution_count: i64) -> Vec<Output> {
    messages
        .into_iter()
        .filter_map(|msg| match msg {
            KernelMessage::Stream { name, text, .. } => Some(Output::Stream {
                name,
                text: Source::new(text),
            }),
            KernelMessage::ExecuteResult { data, .. } => Some(Output::ExecuteResult {
                execution_count: Some(execution_count),
                data,
                metadata: serde_json::Map::new(),
            }),
            KernelMessage::Error {
                ename,
                evalue,
                traceback,
                ..
            } => Some(Output::Error {
                ename,
                evalue,
                traceback,
            }),
            // Replies are consumed by the client and never reach here.
            KernelMessage::Reply { .. } => None,
        })
        .collect()
}

/// Build the `CellFailed` error from the failing cell's recorded outputs.
fn cell_failure(outputs: &[Output], cell_index: usize) -> ExecuteError {
    let (ename, evalue, traceback) = outputs
        .iter()
        .rev()
        .find_map(|output| match output {
            Output::Error {
                ename,
                evalue,
                traceback,
            } => Some((ename.clone(), evalue.clone(), traceback.clone())),
            _ => None,
        })
        .unwrap_or_else(|| {
            (
                "CellExecutionError".to_string(),
                "kernel reported failure without an error output".to_string(),
                Vec::new(),
            )
        });

    ExecuteError::CellFailed {
        cell_index,
        ename,
        evalue,
        traceback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::path::Path;

    const OK_KERNEL: &str = r#"
while IFS= read -r line; do
  case "$line" in *'"op":"shutdown"'*) exit 0;; esac
  id=${line#*\"id\":\"}; id=${id%%\"*}
  printf '{"msg_type":"stream","id":"%s","name":"stdout","text":"ran\\n"}\n' "$id"
  printf '{"msg_type":"reply","id":"%s","status":"ok"}\n' "$id"
done
"#;

    const FAILING_KERNEL: &str = r#"
while IFS= read -r line; do
  case "$line" in *'"op":"shutdown"'*) exit 0;; esac
  id=${line#*\"id\":\"}; id=${id%%\"*}
  printf '{"msg_type":"error","id":"%s","ename":"ZeroDivisionError","evalue":"division by zero","traceback":["boom\\n"]}\n' "$id"
  printf '{"msg_type":"reply","id":"%s","status":"error"}\n' "$id"
done
"#;

    fn sh_engine(script: &str, timeout: Duration) -> KernelEngine {
        KernelEngine::new(
            KernelSpec {
                name: "fake".to_string(),
                command: "/bin/sh".to_string(),
                args: vec!["-c".to_string(), script.to_string()],
                env: BTreeMap::new(),
            },
            timeout,
        )
    }

    fn notebook(sources: &[&str]) -> Notebook {
        let mut cells = vec![json!({
            "cell_type": "markdown",
            "metadata": {},
            "source": "# heading"
        })];
        for source in sources {
            cells.push(json!({
                "cell_type": "code",
                "metadata": {},
                "execution_count": null,
                "outputs": [],
                "source": source
            }));
        }
        serde_json::from_value(json!({
            "nbformat": 4,
            "nbformat_minor": 5,
            "metadata": {},
            "cells": cells
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_all_cells_execute_in_order() {
        let engine = sh_engine(OK_KERNEL, Duration::from_secs(30));
        let mut nb = notebook(&["a = 1", "print(a)"]);
        let ctx = ExecutionContext::new(Path::new("."));

        engine.execute(&mut nb, &ctx).await.unwrap();

        match &nb.cells[1] {
            Cell::Code(cell) => {
                assert_eq!(cell.execution_count, Some(1));
                assert_eq!(cell.outputs.len(), 1);
            }
            other => panic!("Expected code cell, got {other:?}"),
        }
        match &nb.cells[2] {
            Cell::Code(cell) => assert_eq!(cell.execution_count, Some(2)),
            other => panic!("Expected code cell, got {other:?}"),
        }
        // The markdown cell is untouched.
        assert!(matches!(&nb.cells[0], Cell::Markdown(_)));
    }

    #[tokio::test]
    async fn test_cell_failure_keeps_partial_state() {
        let engine = sh_engine(FAILING_KERNEL, Duration::from_secs(30));
        let mut nb = notebook(&["1/0", "never_runs"]);
        let ctx = ExecutionContext::new(Path::new("."));

        let err = engine.execute(&mut nb, &ctx).await.unwrap_err();
        match err {
            ExecuteError::CellFailed {
                cell_index, ename, ..
            } => {
                assert_eq!(cell_index, 1);
                assert_eq!(ename, "ZeroDivisionError");
            }
            other => panic!("Expected CellFailed, got {other:?}"),
        }

        // The failing cell carries its error output; the next cell never ran.
        match &nb.cells[1] {
            Cell::Code(cell) => {
                assert_eq!(cell.execution_count, Some(1));
                assert!(matches!(cell.outputs[0], Output::Error { .. }));
            }
            other => panic!("Expected code cell, got {other:?}"),
        }
        match &nb.cells[2] {
            Cell::Code(cell) => {
                assert_eq!(cell.execution_count, None);
                assert!(cell.outputs.is_empty());
            }
            other => panic!("Expected code cell, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_not_a_cell_failure() {
        // A kernel that never replies.
        let engine = sh_engine("sleep 30", Duration::from_millis(200));
        let mut nb = notebook(&["x = 1"]);
        let ctx = ExecutionContext::new(Path::new("."));

        let err = engine.execute(&mut nb, &ctx).await.unwrap_err();
        assert!(matches!(err, ExecuteError::Timeout { .. }));
    }
}
