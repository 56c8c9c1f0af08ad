//! The fixed, ordered set of dataset access patterns.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// The call syntax a rule recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessPattern {
    /// `pd.read_csv("...")`
    TabularRead,
    /// `open("...")`
    GenericOpen,
    /// `np.load("...")`
    ArrayLoad,
    /// `json.load(open("..."))`
    JsonLoad,
}

impl AccessPattern {
    /// Application order. Every rule runs over the output of the previous one.
    pub const ORDER: [AccessPattern; 4] = [
        AccessPattern::TabularRead,
        AccessPattern::GenericOpen,
        AccessPattern::ArrayLoad,
        AccessPattern::JsonLoad,
    ];

    /// Regex with three groups: prefix, path literal, suffix.
    fn source(self) -> &'static str {
        match self {
            AccessPattern::TabularRead => r#"(?i)(pd\.read_csv\(\s*["'])([^"']+)(["']\s*\))"#,
            AccessPattern::GenericOpen => r#"(?i)(open\(\s*["'])([^"']+)(["'])"#,
            AccessPattern::ArrayLoad => r#"(?i)(np\.load\(\s*["'])([^"']+)(["'])"#,
            AccessPattern::JsonLoad => r#"(?i)(json\.load\(\s*open\(\s*["'])([^"']+)(["'])"#,
        }
    }
}

impl fmt::Display for AccessPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessPattern::TabularRead => "pd.read_csv",
            AccessPattern::GenericOpen => "open",
            AccessPattern::ArrayLoad => "np.load",
            AccessPattern::JsonLoad => "json.load(open)",
        };
        f.write_str(name)
    }
}

/// A compiled access pattern.
#[derive(Debug)]
pub struct RewriteRule {
    /// Which call syntax this rule matches.
    pub pattern: AccessPattern,
    /// Matcher capturing (prefix, path literal, suffix).
    pub matcher: Regex,
}

impl RewriteRule {
    fn compile(pattern: AccessPattern) -> Self {
        Self {
            pattern,
            matcher: Regex::new(pattern.source()).expect("access pattern regex must compile"),
        }
    }
}

/// The default rule list, compiled once.
pub fn default_rules() -> &'static [RewriteRule] {
    static RULES: OnceLock<Vec<RewriteRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        AccessPattern::ORDER
            .into_iter()
            .map(RewriteRule::compile)
            .collect()
    })
}
