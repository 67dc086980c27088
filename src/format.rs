use serde_json::{Map, Value};

use crate::error::Error;
use crate::guard::PlaceholderGuard;
use crate::model::{EnvMapping, OutputFormat, QuotePolicy};
use crate::normalize::{is_control, normalize};
use crate::reassemble::escape_literal;

/// Renders mappings and key lists, restoring guarded placeholders on the way out.
#[derive(Debug, Clone, Copy)]
pub struct Formatter<'a> {
    format: OutputFormat,
    quote: QuotePolicy,
    guard: &'a PlaceholderGuard,
}

impl<'a> Formatter<'a> {
    pub fn new(format: OutputFormat, quote: QuotePolicy, guard: &'a PlaceholderGuard) -> Self {
        Self {
            format,
            quote,
            guard,
        }
    }

    pub fn mapping(&self, mapping: &EnvMapping) -> Result<String, Error> {
        match self.format {
            OutputFormat::Json => {
                let object: Map<String, Value> = mapping
                    .iter()
                    .map(|(key, value)| {
                        (key.clone(), Value::String(self.guard.unguard(value).into_owned()))
                    })
                    .collect();
                Ok(serde_json::to_string(&Value::Object(object))?)
            }
            OutputFormat::Env => {
                let lines: Vec<String> = mapping
                    .iter()
                    .map(|(key, value)| {
                        let value = self.guard.unguard(value);
                        if self.should_quote(&value) {
                            format!("{key}={}", quote_value(&value))
                        } else {
                            format!("{key}={value}")
                        }
                    })
                    .collect();
                Ok(lines.join("\n"))
            }
        }
    }

    pub fn keys<S: AsRef<str>>(&self, keys: &[S]) -> Result<String, Error> {
        let items = keys.iter().map(|key| self.guard.unguard(key.as_ref()).into_owned());
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string(
                &items.map(Value::String).collect::<Vec<_>>(),
            )?),
            OutputFormat::Env => Ok(items.collect::<Vec<_>>().join("\n")),
        }
    }

    fn should_quote(&self, value: &str) -> bool {
        match self.quote {
            QuotePolicy::Always => true,
            QuotePolicy::Never => false,
            QuotePolicy::Auto => needs_quotes(value),
        }
    }
}

/// A value needs quotes under [`QuotePolicy::Auto`] when it holds a space or a control character.
pub fn needs_quotes(value: &str) -> bool {
    value.chars().any(|ch| ch == ' ' || is_control(ch))
}

/// Double-quote `value` so that it stays on one line and parses back unchanged.
pub fn quote_value(value: &str) -> String {
    let escaped = escape_literal(value);
    format!("\"{}\"", normalize(&escaped))
}
