//! Output directory management.
//!
//! Reports for every notebook of a run land in one output directory:
//!
//! ```text
//! <output_dir>/
//! ├── analysis_output.txt   # report for analysis.ipynb
//! └── cleaning_output.txt   # report for cleaning.ipynb
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Suffix appended to a notebook's file stem to name its report.
const REPORT_SUFFIX: &str = "_output.txt";

/// The directory reports are written to.
#[derive(Debug, Clone)]
pub struct OutputDir {
    /// The directory itself.
    pub root: PathBuf,
}

impl OutputDir {
    /// Use `root` as the output directory, creating it if needed.
    ///
    /// # Errors
    /// Returns [`Error::OutputUnwritable`] if the directory cannot be created.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::OutputUnwritable {
            path: root.clone(),
            message: e.to_string(),
        })?;
        Ok(Self { root })
    }

    /// Report path for a notebook: `<root>/<stem>_output.txt`.
    pub fn report_path(&self, notebook_path: &Path) -> PathBuf {
        let stem = notebook_path
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy();
        self.root.join(format!("{}{}", stem, REPORT_SUFFIX))
    }
}
