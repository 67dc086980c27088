use std::path::PathBuf;

use thiserror::Error;

/// Process exit codes for each failure class.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const INTERNAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const MISSING_KEY_ARGUMENT: i32 = 3;
    pub const INVALID_IDENTIFIER: i32 = 4;
    pub const MISSING_VALUE: i32 = 5;
    pub const KEY_NOT_FOUND: i32 = 6;
    pub const IO: i32 = 7;
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("`{0}` requires at least one key")]
    MissingKeyArgument(&'static str),
    #[error("invalid variable name {0:?}")]
    InvalidIdentifier(String),
    #[error("missing value in assignment {0:?} (expected KEY=VALUE)")]
    MissingValue(String),
    #[error("key not found: {0}")]
    KeyNotFound(String),
    #[error("unable to read {}: {source}", .path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid UTF-8 input: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("internal failure: {0}")]
    Internal(String),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingKeyArgument(_) => exit_code::MISSING_KEY_ARGUMENT,
            Self::InvalidIdentifier(_) => exit_code::INVALID_IDENTIFIER,
            Self::MissingValue(_) => exit_code::MISSING_VALUE,
            Self::KeyNotFound(_) => exit_code::KEY_NOT_FOUND,
            Self::SourceUnreadable { .. } | Self::InvalidEncoding(_) | Self::Io(_) => {
                exit_code::IO
            }
            Self::Json(_) | Self::Internal(_) => exit_code::INTERNAL,
        }
    }

    /// Whether `--force` may downgrade this error to a warning.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::KeyNotFound(_))
    }
}

/// A statement the projector could not read. Reported as a warning, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at line {line}, column {column}: {kind}")]
pub struct ParseError {
    pub line: u32,
    pub column: u32,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub(crate) fn new(line: u32, column: u32, kind: ParseErrorKind) -> Self {
        Self { line, column, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("invalid syntax")]
    InvalidSyntax,
    #[error("missing key")]
    MissingKey,
    #[error("invalid key")]
    InvalidKey,
    #[error("unterminated quote")]
    UnterminatedQuote,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_failure_class() {
        let errors = [
            Error::MissingKeyArgument("get"),
            Error::InvalidIdentifier("1BAD".to_owned()),
            Error::MissingValue("FOO".to_owned()),
            Error::KeyNotFound("FOO".to_owned()),
            Error::Io(std::io::Error::other("boom")),
            Error::Internal("boom".to_owned()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(Error::exit_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&exit_code::SUCCESS));
        assert!(!codes.contains(&exit_code::USAGE));
    }

    #[test]
    fn only_missing_keys_are_recoverable() {
        assert!(Error::KeyNotFound("A".to_owned()).is_recoverable());
        assert!(!Error::InvalidIdentifier("A-B".to_owned()).is_recoverable());
        assert!(!Error::MissingValue("A".to_owned()).is_recoverable());
    }

    #[test]
    fn source_unreadable_names_the_path() {
        let err = Error::SourceUnreadable {
            path: PathBuf::from("missing.env"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(err.to_string(), "unable to read missing.env: not found");
        assert_eq!(err.exit_code(), exit_code::IO);
    }
}
