//! Notebook document model and serialization (nbformat v4).
//!
//! Documents are JSON on disk: an ordered list of cells plus metadata.
//! Only the fields the runner touches are modeled as typed fields; unknown
//! fields on cells (ids, attachments, format extensions) ride along in
//! flattened extras maps so a read-write round trip keeps them.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix appended to executed documents, and the marker that excludes a file
/// from discovery as an input.
pub const OUTPUT_SUFFIX: &str = ".nbconvert.ipynb";

/// The only major format version the runner accepts.
const SUPPORTED_NBFORMAT: i64 = 4;

/// A notebook document: format version, document metadata, ordered cells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notebook {
    pub nbformat: i64,
    pub nbformat_minor: i64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub cells: Vec<Cell>,
}

/// One cell of a document, tagged by `cell_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cell_type", rename_all = "snake_case")]
pub enum Cell {
    Code(CodeCell),
    Markdown(TextCell),
    Raw(TextCell),
}

/// An executable cell. The executor populates `execution_count` and
/// `outputs`; both are left untouched for cells that never ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeCell {
    pub source: Source,
    #[serde(default)]
    pub execution_count: Option<i64>,
    #[serde(default)]
    pub outputs: Vec<Output>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A narrative cell (markdown or raw). Never executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextCell {
    pub source: Source,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One output attached to a code cell, tagged by `output_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum Output {
    Stream {
        name: String,
        text: Source,
    },
    DisplayData {
        #[serde(default)]
        data: Map<String, Value>,
        #[serde(default)]
        metadata: Map<String, Value>,
    },
    ExecuteResult {
        #[serde(default)]
        execution_count: Option<i64>,
        #[serde(default)]
        data: Map<String, Value>,
        #[serde(default)]
        metadata: Map<String, Value>,
    },
    Error {
        ename: String,
        evalue: String,
        #[serde(default)]
        traceback: Vec<String>,
    },
}

/// Cell source or stream text.
///
/// nbformat v4 allows both a plain string and a list of line strings; both
/// decode into the joined form, and we always serialize the plain string,
/// which is equally valid v4.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Source(String);

impl Source {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl<'de> Deserialize<'de> for Source {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Joined(String),
            Lines(Vec<String>),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Joined(s) => Source(s),
            // Lines already carry their trailing newlines in nbformat.
            Repr::Lines(lines) => Source(lines.concat()),
        })
    }
}

impl Notebook {
    /// Read and validate a document from disk.
    pub fn read(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read notebook `{}`", path.display()))?;
        let nb: Notebook = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse notebook `{}`", path.display()))?;

        if nb.nbformat != SUPPORTED_NBFORMAT {
            bail!(
                "notebook `{}` has nbformat {}, only version {} is supported",
                path.display(),
                nb.nbformat,
                SUPPORTED_NBFORMAT
            );
        }

        Ok(nb)
    }

    /// Serialize the document to `path`, creating or overwriting it.
    pub fn write(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self).context("failed to serialize notebook")?;
        fs::write(path, raw)
            .with_context(|| format!("failed to write notebook `{}`", path.display()))?;
        Ok(())
    }
}

/// Derive the executed-output path: the trailing `.ipynb` becomes
/// `.nbconvert.ipynb`. A name without the extension gets the suffix appended.
pub fn output_path(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let stem = name.strip_suffix(".ipynb").unwrap_or(name);
    input.with_file_name(format!("{stem}{OUTPUT_SUFFIX}"))
}
