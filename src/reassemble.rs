//! Regroup physical lines into one logical record per declared key.
//!
//! Every record leaves here as a single line of the form `KEY="..."`:
//! embedded control characters are escaped by the normalizer, unquoted
//! values get a synthesized pair of quotes, and physical line breaks inside
//! a value become `\n` escapes.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::guard::PlaceholderGuard;
use crate::normalize::{is_preceded_by_odd_backslashes, normalize, normalize_newlines};
use crate::parser::strip_inline_comment;

static ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^[ \t]*(?:export[ \t]+)?([A-Za-z_][A-Za-z0-9_]*)[ \t]*=([ \t]*")?"#)
        .expect("assignment pattern is valid")
});

/// One complete assignment, however many physical lines it spanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalRecord {
    pub key: String,
    /// The whole record, `KEY="..."`, on one line.
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Record(LogicalRecord),
    /// Comments, blank lines and stray text outside any record.
    Passthrough(String),
}

impl Line {
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Record(record) => Some(&record.key),
            Self::Passthrough(_) => None,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Record(record) => &record.text,
            Self::Passthrough(text) => text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    AwaitingRecord,
    InUnquotedRecord,
    /// `closed` once the value's closing quote has been seen.
    InQuotedRecord { closed: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    QuotedStart { key: &'a str, rest: &'a str },
    UnquotedStart { key: &'a str, rest: &'a str },
    Comment,
    Other,
}

impl<'a> LineKind<'a> {
    pub fn classify(line: &'a str) -> Self {
        if let Some(caps) = ASSIGNMENT.captures(line)
            && let (Some(key), Some(whole)) = (caps.get(1), caps.get(0))
        {
            let key = key.as_str();
            let rest = &line[whole.end()..];
            return if caps.get(2).is_some() {
                Self::QuotedStart { key, rest }
            } else {
                Self::UnquotedStart { key, rest }
            };
        }

        if line.trim_start().starts_with('#') {
            Self::Comment
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Close the current record and open a new one.
    Open,
    /// Append the line to the current record.
    Continue,
    /// Close the current record and emit the line on its own.
    PassThrough,
}

pub fn transition(state: State, kind: &LineKind<'_>) -> Step {
    match (state, kind) {
        (_, LineKind::QuotedStart { .. } | LineKind::UnquotedStart { .. }) => Step::Open,
        (State::InQuotedRecord { closed: false }, _) => Step::Continue,
        (State::InUnquotedRecord, LineKind::Other) => Step::Continue,
        _ => Step::PassThrough,
    }
}

#[derive(Debug)]
pub struct Reassembler {
    state: State,
    current: Option<LogicalRecord>,
    lines: Vec<Line>,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Self {
            state: State::AwaitingRecord,
            current: None,
            lines: Vec::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Feed one physical line, with or without its trailing `\n`.
    pub fn push(&mut self, physical: &str) {
        let (content, terminated) = match physical.strip_suffix('\n') {
            Some(content) => (content, true),
            None => (physical, false),
        };

        let kind = LineKind::classify(content);
        match (transition(self.state, &kind), kind) {
            (Step::Open, LineKind::QuotedStart { key, rest }) => {
                self.open_quoted(key, rest, terminated)
            }
            (Step::Open, LineKind::UnquotedStart { key, rest }) => {
                self.open_unquoted(key, rest, terminated)
            }
            (Step::Continue, _) => self.continue_record(content, terminated),
            _ => self.pass_through(content),
        }
    }

    pub fn finish(mut self) -> Vec<Line> {
        self.close();
        self.lines
    }

    fn open_quoted(&mut self, key: &str, rest: &str, terminated: bool) {
        self.close();
        let fragment = normalize(rest);
        let closed = has_closing_quote(&fragment);

        let mut text = String::with_capacity(key.len() + rest.len() + 4);
        text.push_str(key);
        text.push_str("=\"");
        text.push_str(&fragment);
        if terminated {
            push_line_break(&mut text);
        }

        self.current = Some(LogicalRecord {
            key: key.to_owned(),
            text,
        });
        self.state = State::InQuotedRecord { closed };
    }

    fn open_unquoted(&mut self, key: &str, rest: &str, terminated: bool) {
        self.close();
        let value = unquoted_value(rest);

        let mut text = String::with_capacity(key.len() + value.len() + 4);
        text.push_str(key);
        text.push_str("=\"");
        text.push_str(&normalize(&escape_literal(value)));
        if terminated {
            push_line_break(&mut text);
        }

        self.current = Some(LogicalRecord {
            key: key.to_owned(),
            text,
        });
        self.state = State::InUnquotedRecord;
    }

    fn continue_record(&mut self, content: &str, terminated: bool) {
        let Some(record) = self.current.as_mut() else {
            self.pass_through(content);
            return;
        };

        match self.state {
            State::InUnquotedRecord => {
                record.text.push_str(&normalize(&escape_literal(content)));
            }
            _ => {
                let fragment = normalize(content);
                let closed = has_closing_quote(&fragment);
                record.text.push_str(&fragment);
                self.state = State::InQuotedRecord { closed };
            }
        }
        if terminated {
            push_line_break(&mut record.text);
        }
    }

    fn pass_through(&mut self, content: &str) {
        self.close();
        self.lines
            .push(Line::Passthrough(normalize(content).into_owned()));
    }

    fn close(&mut self) {
        if let Some(mut record) = self.current.take() {
            strip_escaped_newlines(&mut record.text);
            if self.state == State::InUnquotedRecord {
                record.text.push('"');
            }
            self.lines.push(Line::Record(record));
        }
        self.state = State::AwaitingRecord;
    }
}

/// Split `input` into logical records and pass-through lines, in input order.
pub fn records(input: &str) -> Vec<Line> {
    let input = normalize_newlines(input);
    let mut reassembler = Reassembler::new();
    for physical in input.split_inclusive('\n') {
        reassembler.push(physical);
    }
    reassembler.finish()
}

/// Reassemble `input` into one line per record, guarding every record.
pub fn reassemble(input: &str, guard: &mut PlaceholderGuard) -> String {
    let lines = records(input);
    for line in &lines {
        if let Line::Record(record) = line {
            guard.reserve_literals(&record.text);
        }
    }

    let mut blob = String::with_capacity(input.len());
    for (idx, line) in lines.iter().enumerate() {
        if idx > 0 {
            blob.push('\n');
        }
        match line {
            Line::Record(record) => blob.push_str(&guard.guard(&record.text)),
            Line::Passthrough(text) => blob.push_str(text),
        }
    }
    blob
}

/// Backslashes and double quotes in unquoted text are literal.
pub(crate) fn escape_literal(value: &str) -> Cow<'_, str> {
    if !value.contains(['\\', '"']) {
        return Cow::Borrowed(value);
    }

    let mut out = String::with_capacity(value.len() + 4);
    for ch in value.chars() {
        if ch == '\\' || ch == '"' {
            out.push('\\');
        }
        out.push(ch);
    }
    Cow::Owned(out)
}

fn unquoted_value(rest: &str) -> &str {
    let value = strip_inline_comment(rest).trim_start();
    value
        .strip_prefix('\'')
        .and_then(|inner| inner.strip_suffix('\''))
        .unwrap_or(value)
}

fn has_closing_quote(fragment: &str) -> bool {
    let bytes = fragment.as_bytes();
    (0..bytes.len())
        .any(|idx| bytes[idx] == b'"' && !is_preceded_by_odd_backslashes(bytes, idx))
}

/// Spell a physical line break as `\n`. A dangling backslash escapes the break itself.
fn push_line_break(text: &mut String) {
    if is_preceded_by_odd_backslashes(text.as_bytes(), text.len()) {
        text.push('n');
    } else {
        text.push_str("\\n");
    }
}

fn strip_escaped_newlines(text: &mut String) {
    while text.ends_with("\\n")
        && !is_preceded_by_odd_backslashes(text.as_bytes(), text.len() - 2)
    {
        text.truncate(text.len() - 2);
    }
}
