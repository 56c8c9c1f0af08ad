//! Jupyter notebook (.ipynb) document model.
//!
//! Only the parts of the format the executor needs are modelled: the ordered
//! `cells` array, each cell's `cell_type` and its `source` fragments. Everything
//! else in the file (metadata, outputs, execution counts) is ignored.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// A parsed notebook document.
///
/// Immutable once parsed; the driver borrows it for the duration of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notebook {
    /// Notebook cells in document order.
    pub cells: Vec<Cell>,
}

/// A single notebook cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Cell type.
    #[serde(rename = "cell_type")]
    pub kind: CellKind,

    /// Source fragments, concatenated without separators to form the body.
    #[serde(deserialize_with = "deserialize_source", default)]
    pub source: Vec<String>,
}

/// The type tag of a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CellKind {
    /// Executable code.
    Code,
    /// Markdown prose.
    Markdown,
    /// Anything else (`raw`, or types this tool does not know).
    Other(String),
}

impl From<String> for CellKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "code" => CellKind::Code,
            "markdown" => CellKind::Markdown,
            _ => CellKind::Other(value),
        }
    }
}

impl From<CellKind> for String {
    fn from(kind: CellKind) -> Self {
        match kind {
            CellKind::Code => "code".to_string(),
            CellKind::Markdown => "markdown".to_string(),
            CellKind::Other(other) => other,
        }
    }
}

/// nbformat allows `source` to be either a list of lines or one string.
fn deserialize_source<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Source {
        Lines(Vec<String>),
        Text(String),
    }

    Ok(match Source::deserialize(deserializer)? {
        Source::Lines(lines) => lines,
        Source::Text(text) => vec![text],
    })
}

impl Cell {
    /// Create a code cell from source fragments.
    pub fn code(source: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            kind: CellKind::Code,
            source: source.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a markdown cell from source fragments.
    pub fn markdown(source: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            kind: CellKind::Markdown,
            source: source.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether this cell is executable.
    pub fn is_code(&self) -> bool {
        self.kind == CellKind::Code
    }

    /// The cell body: source fragments joined with no inserted separators.
    pub fn body(&self) -> String {
        self.source.concat()
    }
}

impl Notebook {
    /// Create a notebook from cells.
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    /// Parse a notebook from its JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Parse(e.to_string()))
    }

    /// Read and parse a notebook file.
    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Parse(format!("{}: {}", path.display(), e)))
    }

    /// Code cells paired with their position among *all* cells.
    pub fn code_cells(&self) -> impl Iterator<Item = (usize, &Cell)> {
        self.cells.iter().enumerate().filter(|(_, cell)| cell.is_code())
    }

    /// Number of code cells.
    pub fn code_cell_count(&self) -> usize {
        self.code_cells().count()
    }
}
