//! Path literal resolution against the dataset root.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

/// Outcome of resolving one path literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// `root/literal` exists.
    Exact(PathBuf),
    /// `root/literal` is missing; a file with the same extension was found instead.
    Fallback {
        /// The missing candidate.
        candidate: PathBuf,
        /// The substitute picked by the directory walk.
        substitute: PathBuf,
    },
    /// Nothing usable under the root.
    Unresolved {
        /// The missing candidate.
        candidate: PathBuf,
    },
}

/// Resolve `literal` against `root`, probing the filesystem.
///
/// Leading `..` segments are kept, so the candidate may lie outside `root`.
pub fn resolve(root: &Path, literal: &str) -> Resolution {
    let candidate = clean_path(&root.join(relative_part(Path::new(literal))));

    if candidate.exists() {
        return Resolution::Exact(candidate);
    }

    match first_with_extension(root, Path::new(literal).extension()) {
        Some(substitute) => Resolution::Fallback {
            candidate,
            substitute,
        },
        None => Resolution::Unresolved { candidate },
    }
}

/// Clean the literal and drop any root or prefix so it joins under the dataset root.
fn relative_part(literal: &Path) -> PathBuf {
    clean_path(literal)
        .components()
        .filter(|c| !matches!(c, Component::Prefix(_) | Component::RootDir))
        .collect()
}

/// Lexically normalize `.` and `..` segments.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                // `..` at the root stays at the root.
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        PathBuf::from(".")
    } else {
        parts.iter().collect()
    }
}

/// First regular file under `root` whose extension equals `extension`.
///
/// Entries are visited sorted by file name so the pick is stable across
/// filesystems.
fn first_with_extension(root: &Path, extension: Option<&OsStr>) -> Option<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .find(|entry| entry.path().extension() == extension)
        .map(|entry| entry.into_path())
}

/// Render a path for embedding in source text.
pub fn to_forward_slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
