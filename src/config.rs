use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;

use crate::error::Error;
use crate::model::{OutputFormat, QuotePolicy, SubstitutionMode};

/// Path spelling for standard input or output.
pub const STDIO_SENTINEL: &str = "-";

/// Where dotenv text is read from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Source {
    /// No input; parses as an empty mapping.
    #[default]
    Empty,
    Stdin,
    File(PathBuf),
}

impl Source {
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            None | Some("") => Self::Empty,
            Some(STDIO_SENTINEL) => Self::Stdin,
            Some(path) => Self::File(PathBuf::from(path)),
        }
    }

    /// Read the whole source into memory.
    pub fn read(&self) -> Result<String, Error> {
        match self {
            Self::Empty => Ok(String::new()),
            Self::Stdin => {
                let mut buf = Vec::new();
                std::io::stdin().lock().read_to_end(&mut buf)?;
                Ok(String::from_utf8(buf).map_err(|err| err.utf8_error())?)
            }
            Self::File(path) => {
                let bytes = std::fs::read(path).map_err(|source| Error::SourceUnreadable {
                    path: path.clone(),
                    source,
                })?;
                Ok(String::from_utf8(bytes).map_err(|err| err.utf8_error())?)
            }
        }
    }
}

/// Where rendered output goes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Target {
    #[default]
    Stdout,
    File(PathBuf),
}

impl Target {
    pub fn from_arg(arg: &str) -> Self {
        match arg {
            "" | STDIO_SENTINEL => Self::Stdout,
            path => Self::File(PathBuf::from(path)),
        }
    }
}

/// Settings for one session, captured once at startup.
#[derive(Debug, Clone, Default)]
pub struct Config {
    source: Source,
    target: Target,
    format: OutputFormat,
    quote: QuotePolicy,
    substitution_mode: SubstitutionMode,
    force: bool,
    environment: BTreeMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    pub fn target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn quote(mut self, quote: QuotePolicy) -> Self {
        self.quote = quote;
        self
    }

    pub fn substitution_mode(mut self, substitution_mode: SubstitutionMode) -> Self {
        self.substitution_mode = substitution_mode;
        self
    }

    /// Downgrade missing keys and failed assignments to warnings.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Variables visible to `${VAR}` expansion besides the parsed mapping.
    pub fn environment(mut self, environment: BTreeMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    pub fn input_source(&self) -> &Source {
        &self.source
    }

    pub fn output_target(&self) -> &Target {
        &self.target
    }

    pub fn output_format(&self) -> OutputFormat {
        self.format
    }

    pub fn quote_policy(&self) -> QuotePolicy {
        self.quote
    }

    pub fn substitution(&self) -> SubstitutionMode {
        self.substitution_mode
    }

    pub fn is_forced(&self) -> bool {
        self.force
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.environment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_sentinels() {
        assert_eq!(Source::from_arg(None), Source::Empty);
        assert_eq!(Source::from_arg(Some("-")), Source::Stdin);
        assert_eq!(
            Source::from_arg(Some(".env")),
            Source::File(PathBuf::from(".env"))
        );
        assert_eq!(Target::from_arg("-"), Target::Stdout);
        assert_eq!(Target::from_arg("out.env"), Target::File(PathBuf::from("out.env")));
    }

    #[test]
    fn defaults() {
        let config = Config::new();
        assert_eq!(config.input_source(), &Source::Empty);
        assert_eq!(config.output_target(), &Target::Stdout);
        assert_eq!(config.output_format(), OutputFormat::Json);
        assert_eq!(config.quote_policy(), QuotePolicy::Always);
        assert_eq!(config.substitution(), SubstitutionMode::Disabled);
        assert!(!config.is_forced());
    }

    #[test]
    fn empty_source_reads_as_empty_text() {
        assert_eq!(Source::Empty.read().expect("read should succeed"), "");
    }

    #[test]
    fn missing_file_is_unreadable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Source::File(dir.path().join("missing.env"))
            .read()
            .expect_err("missing file should fail");
        assert!(matches!(err, Error::SourceUnreadable { .. }));
    }

    #[test]
    fn invalid_utf8_is_an_encoding_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.env");
        std::fs::write(&path, [b'A', b'=', 0xff]).expect("write fixture");

        let err = Source::File(path).read().expect_err("invalid utf-8 should fail");
        assert!(matches!(err, Error::InvalidEncoding(_)));
    }
}
