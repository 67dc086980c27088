//! Reversible protection of `${...}` placeholders.
//!
//! Placeholder-looking text in a record is rewritten to `\$\{...\}` before
//! projection so that nothing downstream mistakes it for an expansion. Each
//! rewrite is recorded in an [`EscapeTable`] keyed by the exact spelling the
//! projector will hand back, and [`PlaceholderGuard::unguard`] restores it
//! in a single pass.
//!
//! A value may already hold that escaped spelling as literal text. Such
//! spellings are reserved before guarding starts: placeholders that would
//! produce them are left as written, and `unguard` never rewrites them.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::model::SubstitutionMode;
use crate::parser::unescape;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^{}]*)\}").expect("placeholder pattern is valid"));

static GUARDED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\\$\\\{[^{}]*\\\}").expect("guarded pattern is valid"));

/// Escaped placeholder spelling mapped back to the original placeholder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscapeTable {
    entries: HashMap<String, String>,
}

impl EscapeTable {
    pub fn get(&self, escaped: &str) -> Option<&str> {
        self.entries.get(escaped).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn record(&mut self, escaped: String, original: String) {
        self.entries.entry(escaped).or_insert(original);
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlaceholderGuard {
    mode: SubstitutionMode,
    table: EscapeTable,
    reserved: HashSet<String>,
}

impl PlaceholderGuard {
    pub fn new(mode: SubstitutionMode) -> Self {
        Self {
            mode,
            table: EscapeTable::default(),
            reserved: HashSet::new(),
        }
    }

    pub fn table(&self) -> &EscapeTable {
        &self.table
    }

    /// Note escaped spellings that a record's value already contains literally.
    ///
    /// Call this for every record of an input before guarding any of them.
    pub fn reserve_literals(&mut self, text: &str) {
        if self.mode == SubstitutionMode::Expand || !text.contains('\\') {
            return;
        }

        let decoded = unescape(text);
        for token in GUARDED.find_iter(&decoded) {
            self.reserved.insert(token.as_str().to_owned());
        }
    }

    /// Rewrite every `${...}` in a record's text. Identity when expansion is allowed.
    pub fn guard<'a>(&mut self, text: &'a str) -> Cow<'a, str> {
        if self.mode == SubstitutionMode::Expand || !text.contains("${") {
            return Cow::Borrowed(text);
        }

        let (table, reserved) = (&mut self.table, &self.reserved);
        PLACEHOLDER.replace_all(text, |caps: &Captures<'_>| {
            let content = &caps[1];
            let decoded = unescape(content);
            let escaped = format!("\\$\\{{{decoded}\\}}");
            if reserved.contains(&escaped) {
                return caps[0].to_owned();
            }
            table.record(escaped, format!("${{{decoded}}}"));
            format!("\\$\\{{{content}\\}}")
        })
    }

    /// Restore every recorded placeholder in a projected value.
    ///
    /// Tokens are looked up by exact match in one pass over the text.
    pub fn unguard<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if self.table.is_empty() {
            return Cow::Borrowed(text);
        }

        GUARDED.replace_all(text, |caps: &Captures<'_>| {
            let token = &caps[0];
            if self.reserved.contains(token) {
                return token.to_owned();
            }
            self.table.get(token).unwrap_or(token).to_owned()
        })
    }
}
