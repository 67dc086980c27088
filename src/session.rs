use std::io::Write;

use log::{debug, warn};

use crate::config::{Config, Target};
use crate::error::Error;
use crate::expand::expand;
use crate::format::Formatter;
use crate::guard::PlaceholderGuard;
use crate::model::{EnvMapping, SubstitutionMode, is_identifier};
use crate::parser::project;
use crate::reassemble::reassemble;
use crate::store::{WorkingCopy, persist};

/// Result of one command, ready to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Mapping(EnvMapping),
    Keys(Vec<String>),
}

/// One parse/format round trip over a single source.
///
/// The escape table lives exactly as long as the session; build a new one
/// per command.
#[derive(Debug)]
pub struct JsonDotEnv {
    config: Config,
    text: String,
    guard: PlaceholderGuard,
    mapping: EnvMapping,
}

impl JsonDotEnv {
    /// Read the configured source and parse it.
    pub fn open(config: Config) -> Result<Self, Error> {
        let text = config.input_source().read()?;
        Ok(Self::from_text(config, text))
    }

    pub fn from_text(config: Config, text: impl Into<String>) -> Self {
        let mut session = Self {
            guard: PlaceholderGuard::new(config.substitution()),
            config,
            text: text.into(),
            mapping: EnvMapping::new(),
        };
        session.mapping = session.parse_current();
        session
    }

    /// The parsed mapping. Guarded placeholders are still escaped here.
    pub fn mapping(&self) -> &EnvMapping {
        &self.mapping
    }

    pub fn guard(&self) -> &PlaceholderGuard {
        &self.guard
    }

    pub fn list(&self) -> Output {
        Output::Mapping(self.mapping.clone())
    }

    pub fn keys(&self) -> Output {
        Output::Keys(self.mapping.keys().cloned().collect())
    }

    pub fn get<S: AsRef<str>>(&self, keys: &[S]) -> Result<Output, Error> {
        validate_keys("get", keys)?;

        let mut selected = EnvMapping::new();
        for key in keys {
            let key = key.as_ref();
            match self.mapping.get(key) {
                Some(value) => {
                    selected.insert(key.to_owned(), value.clone());
                }
                None => self.recover(Error::KeyNotFound(key.to_owned()))?,
            }
        }
        Ok(Output::Mapping(selected))
    }

    /// Apply `KEY=VALUE` assignments on a working copy and return the re-parsed mapping.
    pub fn set<S: AsRef<str>>(&mut self, assignments: &[S]) -> Result<Output, Error> {
        let assignments = parse_assignments(assignments)?;

        let mut copy = WorkingCopy::new(&self.text)?;
        for (key, value) in &assignments {
            if let Err(err) = copy.set(key, value) {
                if !self.config.is_forced() {
                    return Err(err);
                }
                warn!("failed to set {key}: {err}");
            }
        }

        self.reload(&copy)?;
        Ok(self.list())
    }

    /// Remove keys on a working copy and return the re-parsed mapping.
    pub fn unset<S: AsRef<str>>(&mut self, keys: &[S]) -> Result<Output, Error> {
        validate_keys("unset", keys)?;

        let mut copy = WorkingCopy::new(&self.text)?;
        for key in keys {
            let key = key.as_ref();
            if self.mapping.contains_key(key) {
                copy.unset(key)?;
            } else {
                self.recover(Error::KeyNotFound(key.to_owned()))?;
            }
        }

        self.reload(&copy)?;
        Ok(self.list())
    }

    pub fn render(&self, output: &Output) -> Result<String, Error> {
        let formatter = Formatter::new(
            self.config.output_format(),
            self.config.quote_policy(),
            &self.guard,
        );
        match output {
            Output::Mapping(mapping) => formatter.mapping(mapping),
            Output::Keys(keys) => formatter.keys(keys),
        }
    }

    /// Render `output` and send it to the configured target.
    pub fn write(&self, output: &Output) -> Result<(), Error> {
        let mut rendered = self.render(output)?;
        rendered.push('\n');

        match self.config.output_target() {
            Target::Stdout => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(rendered.as_bytes())?;
                stdout.flush()?;
            }
            Target::File(path) => persist(path, &rendered)?,
        }
        Ok(())
    }

    fn reload(&mut self, copy: &WorkingCopy) -> Result<(), Error> {
        self.text = copy.read()?;
        self.mapping = self.parse_current();
        Ok(())
    }

    fn parse_current(&mut self) -> EnvMapping {
        let blob = reassemble(&self.text, &mut self.guard);
        debug!(
            "reassembled {} bytes into {} lines",
            self.text.len(),
            blob.lines().count()
        );

        let mut mapping = project(&blob);
        if self.config.substitution() == SubstitutionMode::Expand {
            expand(&mut mapping, self.config.variables());
        }
        mapping
    }

    fn recover(&self, err: Error) -> Result<(), Error> {
        if self.config.is_forced() && err.is_recoverable() {
            warn!("{err}, skipping");
            return Ok(());
        }
        Err(err)
    }
}

fn validate_keys<S: AsRef<str>>(command: &'static str, keys: &[S]) -> Result<(), Error> {
    if keys.is_empty() {
        return Err(Error::MissingKeyArgument(command));
    }
    for key in keys {
        let key = key.as_ref();
        if !is_identifier(key) {
            return Err(Error::InvalidIdentifier(key.to_owned()));
        }
    }
    Ok(())
}

/// Split `KEY=VALUE` arguments, validating every key before anything is applied.
pub fn parse_assignments<S: AsRef<str>>(raw: &[S]) -> Result<Vec<(String, String)>, Error> {
    if raw.is_empty() {
        return Err(Error::MissingKeyArgument("set"));
    }

    raw.iter()
        .map(|assignment| {
            let assignment = assignment.as_ref();
            let Some((key, value)) = assignment.split_once('=') else {
                if !is_identifier(assignment) {
                    return Err(Error::InvalidIdentifier(assignment.to_owned()));
                }
                return Err(Error::MissingValue(assignment.to_owned()));
            };
            if !is_identifier(key) {
                return Err(Error::InvalidIdentifier(key.to_owned()));
            }
            Ok((key.to_owned(), value.to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(text: &str) -> JsonDotEnv {
        JsonDotEnv::from_text(Config::new(), text)
    }

    fn json(session: &JsonDotEnv, output: &Output) -> String {
        session.render(output).expect("render should succeed")
    }

    #[test]
    fn get_returns_requested_submapping() {
        let session = session("FOO=bar\nBAZ=\"qux quux\"\n");
        let output = session.get(&["FOO", "BAZ"]).expect("get should succeed");

        assert_eq!(json(&session, &output), r#"{"FOO":"bar","BAZ":"qux quux"}"#);
    }

    #[test]
    fn get_missing_key_is_fatal_without_force() {
        let session = session("FOO=bar\n");
        let err = session.get(&["NOPE"]).expect_err("get should fail");

        assert!(matches!(err, Error::KeyNotFound(key) if key == "NOPE"));
    }

    #[test]
    fn get_missing_key_is_skipped_with_force() {
        let session = JsonDotEnv::from_text(Config::new().force(true), "FOO=bar\n");
        let output = session.get(&["NOPE", "FOO"]).expect("get should succeed");

        assert_eq!(json(&session, &output), r#"{"FOO":"bar"}"#);
    }

    #[test]
    fn invalid_identifiers_are_fatal_even_with_force() {
        let mut session = JsonDotEnv::from_text(Config::new().force(true), "FOO=bar\n");

        assert!(matches!(session.get(&["1FOO"]), Err(Error::InvalidIdentifier(_))));
        assert!(matches!(session.unset(&["A-B"]), Err(Error::InvalidIdentifier(_))));
        assert!(matches!(session.set(&["A B=1"]), Err(Error::InvalidIdentifier(_))));
    }

    #[test]
    fn commands_require_keys() {
        let mut session = session("FOO=bar\n");
        let none: [&str; 0] = [];

        assert!(matches!(session.get(&none), Err(Error::MissingKeyArgument("get"))));
        assert!(matches!(session.set(&none), Err(Error::MissingKeyArgument("set"))));
        assert!(matches!(session.unset(&none), Err(Error::MissingKeyArgument("unset"))));
    }

    #[test]
    fn set_without_value_is_missing_value() {
        let mut session = JsonDotEnv::from_text(Config::new().force(true), "FOO=bar\n");

        assert!(matches!(session.set(&["FOO"]), Err(Error::MissingValue(_))));
    }

    #[test]
    fn set_keeps_order_and_appends_new_keys() {
        let mut session = session("A=1\nB=2\n");
        session.set(&["A=10", "C=3"]).expect("set should succeed");

        assert_eq!(json(&session, &session.keys()), r#"["A","B","C"]"#);
        assert_eq!(json(&session, &session.list()), r#"{"A":"10","B":"2","C":"3"}"#);
    }

    #[test]
    fn set_values_may_contain_equals_newlines_and_placeholders() {
        let mut session = session("");
        let output = session
            .set(&["URL=a=b", "MULTI=one\ntwo", "TPL=${vars['x']}"])
            .expect("set should succeed");

        assert_eq!(
            json(&session, &output),
            r#"{"URL":"a=b","MULTI":"one\ntwo","TPL":"${vars['x']}"}"#
        );
    }

    #[test]
    fn unset_removes_keys() {
        let mut session = session("FOO=bar\nBAZ=\"qux quux\"\n");
        let output = session.unset(&["FOO"]).expect("unset should succeed");

        assert_eq!(json(&session, &output), r#"{"BAZ":"qux quux"}"#);
    }

    #[test]
    fn unset_missing_key_respects_force() {
        let mut strict = session("FOO=bar\n");
        assert!(matches!(strict.unset(&["NOPE"]), Err(Error::KeyNotFound(_))));

        let mut forced = JsonDotEnv::from_text(Config::new().force(true), "FOO=bar\n");
        let output = forced.unset(&["NOPE", "FOO"]).expect("unset should succeed");
        assert_eq!(json(&forced, &output), "{}");
    }

    #[test]
    fn placeholders_survive_to_json() {
        let session = session("T=${vars['x']}\nU=\"pre ${vars['x']} post\"\n");

        assert_eq!(
            json(&session, &session.list()),
            r#"{"T":"${vars['x']}","U":"pre ${vars['x']} post"}"#
        );
        assert_eq!(session.mapping()["T"], r"\$\{vars['x']\}");
    }

    #[test]
    fn expansion_uses_mapping_and_environment() {
        let config = Config::new()
            .substitution_mode(SubstitutionMode::Expand)
            .environment([("HOME".to_string(), "/home/me".to_string())].into());
        let session = JsonDotEnv::from_text(config, "NAME=app\nDIR=${HOME}/${NAME}\n");

        assert_eq!(session.mapping()["DIR"], "/home/me/app");
    }

    #[test]
    fn multiline_values_render_with_json_newlines() {
        let session = session("KEY=\"line1\nline2\nline3\"\n");

        assert_eq!(json(&session, &session.list()), r#"{"KEY":"line1\nline2\nline3"}"#);
    }

    #[test]
    fn backslash_at_line_end_keeps_the_newline() {
        let session = session("A=\"x\\\ny\"\nB=1\n");

        assert_eq!(json(&session, &session.list()), r#"{"A":"x\ny","B":"1"}"#);
    }

    #[test]
    fn literal_escaped_placeholders_are_not_rewritten() {
        let session = session("A=${X}\nB='\\$\\{X\\}'\n");

        assert_eq!(
            json(&session, &session.list()),
            r#"{"A":"${X}","B":"\\$\\{X\\}"}"#
        );
    }

    #[test]
    fn parse_assignments_splits_on_first_equals() {
        let parsed = parse_assignments(&["A=b=c", "EMPTY="]).expect("parse should succeed");
        assert_eq!(
            parsed,
            [
                ("A".to_string(), "b=c".to_string()),
                ("EMPTY".to_string(), String::new())
            ]
        );
    }
}
