//! Dataset reference rewriting against real directory trees.

use std::fs;
use std::path::Path;

use nbexec_core::rewrite::{AccessPattern, PathRewriter, RewriteDiagnostic};
use tempfile::TempDir;

fn tree(files: &[&str]) -> TempDir {
    let root = TempDir::new().expect("Failed to create dataset root");
    for file in files {
        let path = root.path().join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent");
        }
        fs::write(&path, "").expect("Failed to write dataset file");
    }
    root
}

fn slashed(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[test]
fn test_code_without_access_patterns_is_identity() {
    let root = tree(&["train.csv", "weights.npy"]);
    let rewriter = PathRewriter::new(root.path());

    let samples = [
        "",
        "x = 1",
        "print('train.csv')",
        "path = \"train.csv\"\nwith opener(path) as f:\n    pass\n",
        "df.to_csv('out.csv')",
        "# pd.read_csv is mentioned but not called",
    ];
    for code in samples {
        let out = rewriter.rewrite_with_diagnostics(code);
        assert_eq!(out.code, code);
        assert_eq!(out.exact, 0);
        assert!(out.diagnostics.is_empty());
    }
}

#[test]
fn test_only_path_literals_change() {
    let root = tree(&["data/train.csv", "data/labels.npy"]);
    let rewriter = PathRewriter::new(root.path());

    let code = concat!(
        "import numpy as np\n",
        "df = pd.read_csv('data/train.csv')\n",
        "y = np.load(\"data/labels.npy\", allow_pickle=True)\n",
        "print(len(df), len(y))\n",
    );
    let out = rewriter.rewrite(code);

    let expected = format!(
        concat!(
            "import numpy as np\n",
            "df = pd.read_csv('{}')\n",
            "y = np.load(\"{}\", allow_pickle=True)\n",
            "print(len(df), len(y))\n",
        ),
        slashed(&root.path().join("data/train.csv")),
        slashed(&root.path().join("data/labels.npy")),
    );
    assert_eq!(out, expected);
}

#[test]
fn test_patterns_are_case_insensitive() {
    let root = tree(&["train.csv"]);
    let rewriter = PathRewriter::new(root.path());

    let out = rewriter.rewrite_with_diagnostics("df = PD.READ_CSV('train.csv')");
    assert_eq!(out.exact, 1);
    assert!(out.code.contains(&slashed(&root.path().join("train.csv"))));
}

#[test]
fn test_dot_segments_are_cleaned() {
    let root = tree(&["train.csv"]);
    let rewriter = PathRewriter::new(root.path());

    let out = rewriter.rewrite("open('./raw/../train.csv')");
    assert_eq!(
        out,
        format!("open('{}')", slashed(&root.path().join("train.csv")))
    );
}

#[test]
fn test_parent_segments_can_leave_the_root() {
    let parent = tree(&["secret.csv", "root/train.csv"]);
    let rewriter = PathRewriter::new(parent.path().join("root"));

    let out = rewriter.rewrite("pd.read_csv('../secret.csv')");
    assert_eq!(
        out,
        format!("pd.read_csv('{}')", slashed(&parent.path().join("secret.csv")))
    );

    // An absolute literal is still re-rooted.
    let out = rewriter.rewrite("pd.read_csv('/../secret.csv')");
    assert_eq!(
        out,
        format!("pd.read_csv('{}')", slashed(&parent.path().join("root/train.csv")))
    );
}

#[test]
fn test_fallback_picks_first_file_in_name_order() {
    let root = tree(&["b/zeta.csv", "a/alpha.csv", "a/notes.txt"]);
    let rewriter = PathRewriter::new(root.path());

    for _ in 0..3 {
        let out = rewriter.rewrite_with_diagnostics("pd.read_csv('missing.csv')");
        assert_eq!(
            out.code,
            format!("pd.read_csv('{}')", slashed(&root.path().join("a/alpha.csv")))
        );
        assert!(matches!(
            out.diagnostics.as_slice(),
            [RewriteDiagnostic::Fallback { pattern: AccessPattern::TabularRead, .. }]
        ));
    }
}

#[test]
fn test_unmatched_extension_is_unresolved() {
    let root = tree(&["train.csv", "README"]);
    let rewriter = PathRewriter::new(root.path());

    let code = "open('frame.parquet')";
    let out = rewriter.rewrite_with_diagnostics(code);

    assert_eq!(out.code, code);
    assert!(matches!(
        out.diagnostics.as_slice(),
        [RewriteDiagnostic::Unresolved { pattern: AccessPattern::GenericOpen, .. }]
    ));
}

#[test]
fn test_extensionless_literal_falls_back_to_extensionless_file() {
    let root = tree(&["train.csv", "README"]);
    let rewriter = PathRewriter::new(root.path());

    let out = rewriter.rewrite("open('LICENSE')");
    assert_eq!(
        out,
        format!("open('{}')", slashed(&root.path().join("README")))
    );
}

#[test]
fn test_missing_dataset_root_leaves_code_alone() {
    let parent = TempDir::new().expect("Failed to create temp dir");
    let rewriter = PathRewriter::new(parent.path().join("does-not-exist"));

    let code = "pd.read_csv('train.csv')";
    let out = rewriter.rewrite_with_diagnostics(code);

    assert_eq!(out.code, code);
    assert_eq!(out.diagnostics.len(), 1);
}

#[test]
fn test_relative_root_is_made_absolute() {
    let rewriter = PathRewriter::new("datasets");
    assert!(rewriter.dataset_root().is_absolute());
    assert!(rewriter.dataset_root().ends_with("datasets"));
}
