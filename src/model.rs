use std::fmt::{Display, Formatter};
use std::str::FromStr;

use indexmap::IndexMap;

/// Ordered key/value mapping. Iteration order is the order in which keys
/// first appeared; re-assigning a key updates it in place.
pub type EnvMapping = IndexMap<String, String>;

/// A parsed `KEY=VALUE` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
    pub line: u32,
}

/// Quoting rule for env-style output. Never affects parsing or JSON output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuotePolicy {
    /// Every value is double-quoted.
    #[default]
    Always,
    /// Values are emitted as-is.
    Never,
    /// Values are quoted only when they contain a space or a control character.
    Auto,
}

impl QuotePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Never => "never",
            Self::Auto => "auto",
        }
    }
}

impl Display for QuotePolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuotePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            "auto" => Ok(Self::Auto),
            other => Err(format!(
                "unknown quote policy `{other}` (expected always, never or auto)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Env,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Env => "env",
        }
    }
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "env" | "dotenv" => Ok(Self::Env),
            other => Err(format!("unknown output format `{other}` (expected json or env)")),
        }
    }
}

/// Variable expansion behavior for parsed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubstitutionMode {
    /// Keep `${...}` placeholders exactly as written.
    #[default]
    Disabled,
    /// Expand `$VAR` and `${VAR}` placeholders.
    Expand,
}

/// Returns whether `key` matches `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}
