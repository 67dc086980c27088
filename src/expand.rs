use std::collections::{BTreeMap, HashMap};

use crate::model::EnvMapping;

/// Expand `$VAR` and `${VAR}` references in every value of `mapping`.
///
/// Names resolve against the mapping first, then `environment`. Unresolved
/// and self-referencing placeholders are kept as written.
pub fn expand(mapping: &mut EnvMapping, environment: &BTreeMap<String, String>) {
    let mut resolver = SubstitutionResolver::new(mapping, environment);
    for (key, value) in mapping.iter_mut() {
        *value = resolver.resolve_entry(key);
    }
}

struct SubstitutionResolver<'a> {
    raw_values: HashMap<String, String>,
    resolved_values: HashMap<String, String>,
    environment: &'a BTreeMap<String, String>,
}

impl<'a> SubstitutionResolver<'a> {
    fn new(mapping: &EnvMapping, environment: &'a BTreeMap<String, String>) -> Self {
        Self {
            raw_values: mapping
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            resolved_values: HashMap::new(),
            environment,
        }
    }

    fn resolve_entry(&mut self, key: &str) -> String {
        self.resolve_key(key, &mut Vec::new()).0
    }

    /// The expansion of `key`, and whether a reference cycle cut it short.
    fn resolve_key(&mut self, key: &str, stack: &mut Vec<String>) -> (String, bool) {
        if let Some(existing) = self.resolved_values.get(key) {
            return (existing.clone(), false);
        }

        let Some(raw_value) = self.raw_values.get(key).cloned() else {
            return (self.environment.get(key).cloned().unwrap_or_default(), false);
        };

        stack.push(key.to_owned());
        let mut cyclic = false;
        let expanded = expand_template(&raw_value, |name, token| {
            self.resolve_placeholder(name, token, stack)
                .unwrap_or_else(|| {
                    cyclic = true;
                    token.to_owned()
                })
        });
        stack.pop();

        // Only complete expansions are reusable from other entries.
        if !cyclic {
            self.resolved_values
                .insert(key.to_owned(), expanded.clone());
        }
        (expanded, cyclic)
    }

    /// `None` when `name` is part of a reference cycle.
    fn resolve_placeholder(
        &mut self,
        name: &str,
        token: &str,
        stack: &mut Vec<String>,
    ) -> Option<String> {
        if stack.iter().any(|item| item == name) {
            return None;
        }

        if self.raw_values.contains_key(name) {
            let (value, cyclic) = self.resolve_key(name, stack);
            return (!cyclic).then_some(value);
        }

        Some(
            self.environment
                .get(name)
                .cloned()
                .unwrap_or_else(|| token.to_owned()),
        )
    }
}

fn expand_template<F>(input: &str, mut resolve: F) -> String
where
    F: FnMut(&str, &str) -> String,
{
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0usize;
    let mut idx = 0usize;
    let bytes = input.as_bytes();

    while idx < bytes.len() {
        if bytes[idx] != b'$' {
            idx += 1;
            continue;
        }

        let Some((name_start, name_end, token_end)) = parse_placeholder(input, idx) else {
            idx += 1;
            continue;
        };

        out.push_str(&input[cursor..idx]);
        out.push_str(&resolve(&input[name_start..name_end], &input[idx..token_end]));

        cursor = token_end;
        idx = token_end;
    }

    out.push_str(&input[cursor..]);
    out
}

fn parse_placeholder(input: &str, start: usize) -> Option<(usize, usize, usize)> {
    let bytes = input.as_bytes();
    if start + 1 >= bytes.len() {
        return None;
    }

    if bytes[start + 1] == b'{' {
        let name_start = start + 2;
        let name_len = bytes[name_start..].iter().position(|&byte| byte == b'}')?;
        let name_end = name_start + name_len;
        let name = &bytes[name_start..name_end];
        if name.is_empty() || !name.iter().copied().all(is_var_char) {
            return None;
        }

        return Some((name_start, name_end, name_end + 1));
    }

    let name_start = start + 1;
    if !(bytes[name_start].is_ascii_alphabetic() || bytes[name_start] == b'_') {
        return None;
    }

    let name_len = bytes[name_start..]
        .iter()
        .position(|&byte| !is_var_char(byte))
        .unwrap_or(bytes.len() - name_start);

    Some((name_start, name_start + name_len, name_start + name_len))
}

fn is_var_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}
