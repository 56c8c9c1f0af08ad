//! Dataset reference rewriting.
//!
//! Notebooks reference their data with relative or machine-specific paths
//! (`pd.read_csv("train.csv")`). Before a cell runs, every recognized path
//! literal is re-pointed at the dataset root:
//!
//! ```text
//! code ──► TabularRead ──► GenericOpen ──► ArrayLoad ──► JsonLoad ──► code'
//!              │               │              │             │
//!              └───────────────┴── resolve(root, literal) ──┘
//!                                   │
//!                        Exact │ Fallback (walk) │ Unresolved
//! ```
//!
//! Rules run over the whole cell body one after another; each sees the output
//! of the previous one. Overlap between rules is settled by that order, not by
//! longest match. Because `open("...")` runs before `json.load(open("..."))`,
//! a JSON literal is first rewritten by the generic rule and then matched
//! again by the JSON rule against the already absolute path; that second pass
//! usually misses and lands on the fallback walk. This is kept as is: existing
//! inputs may depend on it.
//!
//! Leading `..` segments survive cleaning, so `../secret.csv` resolves next to
//! the dataset root rather than inside it. Only absolute literals are forced
//! under the root.

mod resolve;
mod rules;

use std::path::{Path, PathBuf};

use regex::Captures;

pub use resolve::{Resolution, clean_path, resolve};
pub use rules::{AccessPattern, RewriteRule, default_rules};

use resolve::to_forward_slashes;

/// A non-fatal note produced while rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteDiagnostic {
    /// The literal was missing and a same-extension file was used instead.
    Fallback {
        pattern: AccessPattern,
        literal: String,
        substitute: PathBuf,
    },
    /// Nothing could be resolved; the occurrence was left untouched.
    Unresolved {
        pattern: AccessPattern,
        literal: String,
        candidate: PathBuf,
    },
}

/// Rewritten code plus what happened along the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rewritten {
    /// The code after all rules ran.
    pub code: String,
    /// Occurrences replaced with an exact match.
    pub exact: usize,
    /// Fallbacks and misses.
    pub diagnostics: Vec<RewriteDiagnostic>,
}

/// Rewrites dataset path literals to live under a dataset root.
///
/// Stateless between calls; the only side effects are read-only filesystem
/// probes.
#[derive(Debug, Clone)]
pub struct PathRewriter {
    dataset_root: PathBuf,
}

impl PathRewriter {
    /// Create a rewriter for the given dataset root.
    ///
    /// A relative root is made absolute against the current directory.
    pub fn new(dataset_root: impl Into<PathBuf>) -> Self {
        let dataset_root = dataset_root.into();
        let dataset_root = std::path::absolute(&dataset_root).unwrap_or(dataset_root);
        Self { dataset_root }
    }

    /// The dataset root.
    pub fn dataset_root(&self) -> &Path {
        &self.dataset_root
    }

    /// Rewrite `code`, returning only the new source.
    pub fn rewrite(&self, code: &str) -> String {
        self.rewrite_with_diagnostics(code).code
    }

    /// Rewrite `code` and report fallbacks and misses.
    pub fn rewrite_with_diagnostics(&self, code: &str) -> Rewritten {
        let mut out = Rewritten {
            code: code.to_string(),
            ..Rewritten::default()
        };

        for rule in default_rules() {
            let replaced = rule
                .matcher
                .replace_all(&out.code, |caps: &Captures<'_>| {
                    self.replace_occurrence(rule.pattern, caps, &mut out.exact, &mut out.diagnostics)
                })
                .into_owned();
            out.code = replaced;
        }

        out
    }

    fn replace_occurrence(
        &self,
        pattern: AccessPattern,
        caps: &Captures<'_>,
        exact: &mut usize,
        diagnostics: &mut Vec<RewriteDiagnostic>,
    ) -> String {
        let (prefix, literal, suffix) = (&caps[1], &caps[2], &caps[3]);

        match resolve(&self.dataset_root, literal) {
            Resolution::Exact(path) => {
                *exact += 1;
                format!("{}{}{}", prefix, to_forward_slashes(&path), suffix)
            }
            Resolution::Fallback {
                candidate,
                substitute,
            } => {
                tracing::warn!(
                    "File not found: {}, using fallback: {}",
                    candidate.display(),
                    substitute.display()
                );
                let rendered = format!("{}{}{}", prefix, to_forward_slashes(&substitute), suffix);
                diagnostics.push(RewriteDiagnostic::Fallback {
                    pattern,
                    literal: literal.to_string(),
                    substitute,
                });
                rendered
            }
            Resolution::Unresolved { candidate } => {
                tracing::error!("No fallback found for missing file: {}", candidate.display());
                diagnostics.push(RewriteDiagnostic::Unresolved {
                    pattern,
                    literal: literal.to_string(),
                    candidate,
                });
                caps[0].to_string()
            }
        }
    }
}
