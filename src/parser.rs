use log::{debug, warn};

use crate::error::{ParseError, ParseErrorKind};
use crate::model::{EnvMapping, Entry, is_identifier};
use crate::normalize::is_preceded_by_odd_backslashes;

/// Project one-statement-per-line dotenv text onto an ordered mapping.
///
/// Statements that cannot be read are logged and skipped. A key assigned
/// more than once keeps its first position and its last value.
pub fn project(input: &str) -> EnvMapping {
    let mut mapping = EnvMapping::new();
    for (idx, line) in input.split('\n').enumerate() {
        match parse_line(line, idx as u32 + 1) {
            Ok(Some(entry)) => {
                if mapping.contains_key(&entry.key) {
                    debug!("line {}: {} overrides an earlier assignment", entry.line, entry.key);
                }
                mapping.insert(entry.key, entry.value);
            }
            Ok(None) => {}
            Err(err) => warn!("skipping unparsable statement: {err}"),
        }
    }
    mapping
}

pub(crate) fn parse_line(line: &str, line_num: u32) -> Result<Option<Entry>, ParseError> {
    let mut working = line.trim_start();
    if working.is_empty() || working.starts_with('#') {
        return Ok(None);
    }

    if let Some(rest) = working.strip_prefix("export")
        && rest
            .chars()
            .next()
            .map(|ch| ch.is_whitespace())
            .unwrap_or(false)
    {
        working = rest.trim_start();
    }

    if working.is_empty() {
        return Err(ParseError::new(line_num, 1, ParseErrorKind::MissingKey));
    }

    let Some(eq_idx) = working.find('=') else {
        let column = working.chars().count() as u32 + 1;
        return Err(ParseError::new(
            line_num,
            column,
            ParseErrorKind::InvalidSyntax,
        ));
    };

    let key = working[..eq_idx].trim_end();
    if key.is_empty() {
        return Err(ParseError::new(line_num, 1, ParseErrorKind::MissingKey));
    }
    if !is_identifier(key) {
        return Err(ParseError::new(line_num, 1, ParseErrorKind::InvalidKey));
    }

    let raw_value = &working[eq_idx + 1..];
    let value_input = raw_value.trim_start();
    let value_column = (line.len() - value_input.len()) as u32 + 1;
    let value = parse_value(raw_value, value_input, line_num, value_column)?;

    Ok(Some(Entry {
        key: key.to_owned(),
        value,
        line: line_num,
    }))
}

fn parse_value(
    raw: &str,
    input: &str,
    line_num: u32,
    column: u32,
) -> Result<String, ParseError> {
    if input.starts_with('"') {
        return parse_double_quoted(input, line_num, column);
    }
    if input.starts_with('\'') || input.starts_with('`') {
        return parse_literal_quoted(input, line_num, column);
    }

    Ok(strip_inline_comment(raw).trim().to_owned())
}

/// Cut an unquoted value at the first `#` that follows whitespace.
pub(crate) fn strip_inline_comment(value: &str) -> &str {
    let bytes = value.as_bytes();
    let cut = (1..bytes.len()).find(|&idx| bytes[idx] == b'#' && bytes[idx - 1].is_ascii_whitespace());
    match cut {
        Some(idx) => value[..idx].trim_end(),
        None => value.trim_end(),
    }
}

fn parse_literal_quoted(input: &str, line_num: u32, column: u32) -> Result<String, ParseError> {
    let quote = input.as_bytes()[0];
    let closing_idx = input
        .bytes()
        .enumerate()
        .skip(1)
        .find(|&(idx, byte)| byte == quote && !is_preceded_by_odd_backslashes(input.as_bytes(), idx))
        .map(|(idx, _)| idx);

    let Some(end_idx) = closing_idx else {
        return Err(ParseError::new(
            line_num,
            column,
            ParseErrorKind::UnterminatedQuote,
        ));
    };

    check_tail(input, end_idx, line_num, column)?;
    Ok(input[1..end_idx].to_owned())
}

fn parse_double_quoted(input: &str, line_num: u32, column: u32) -> Result<String, ParseError> {
    let bytes = input.as_bytes();
    let closing_idx = (1..bytes.len())
        .find(|&idx| bytes[idx] == b'"' && !is_preceded_by_odd_backslashes(bytes, idx));

    let Some(end_idx) = closing_idx else {
        warn!("line {line_num}: unterminated double quote, keeping value as written");
        return Ok(unescape(&input[1..]));
    };

    check_tail(input, end_idx, line_num, column)?;
    Ok(unescape(&input[1..end_idx]))
}

fn check_tail(input: &str, end_idx: usize, line_num: u32, column: u32) -> Result<(), ParseError> {
    let tail = input[end_idx + 1..].trim_start();
    if !tail.is_empty() && !tail.starts_with('#') {
        return Err(ParseError::new(
            line_num,
            column + end_idx as u32 + 1,
            ParseErrorKind::InvalidSyntax,
        ));
    }
    Ok(())
}

/// Decode double-quoted escapes. Unknown escapes such as `\$` are kept verbatim.
pub(crate) fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut idx = 0usize;
    while let Some(offset) = input[idx..].find('\\') {
        out.push_str(&input[idx..idx + offset]);
        let rest_start = idx + offset + 1;
        idx = rest_start + decode_escape(&input[rest_start..], &mut out);
    }
    out.push_str(&input[idx..]);
    out
}

// `rest` starts right after the backslash; returns the bytes consumed.
fn decode_escape(rest: &str, out: &mut String) -> usize {
    let Some(ch) = rest.chars().next() else {
        out.push('\\');
        return 0;
    };

    let decoded = match ch {
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        '0' => '\0',
        '\\' => '\\',
        '"' => '"',
        '\'' => '\'',
        'u' => {
            if let Some(consumed) = decode_unicode(rest, out) {
                return consumed;
            }
            out.push_str("\\u");
            return 1;
        }
        _ => {
            out.push('\\');
            out.push(ch);
            return ch.len_utf8();
        }
    };
    out.push(decoded);
    ch.len_utf8()
}

fn decode_unicode(rest: &str, out: &mut String) -> Option<usize> {
    let body = rest.strip_prefix("u{")?;
    let end = body.find('}')?;
    let hex = &body[..end];
    if hex.is_empty() || hex.len() > 6 || !hex.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        return None;
    }
    let ch = u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)?;
    out.push(ch);
    Some("u{".len() + end + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(line: &str) -> Entry {
        parse_line(line, 1)
            .expect("parse should succeed")
            .expect("line should hold an entry")
    }

    #[test]
    fn parses_basic_values_and_comments() {
        let parsed = project("A=1\nB = 2\n# skip\nC=hello # comment\nD=\n");

        assert_eq!(parsed.len(), 4);
        assert_eq!(parsed["A"], "1");
        assert_eq!(parsed["B"], "2");
        assert_eq!(parsed["C"], "hello");
        assert_eq!(parsed["D"], "");
    }

    #[test]
    fn parses_export_and_quotes() {
        let parsed = project("export QUOTED=\"line\\nvalue\"\nSINGLE='raw value'\n");

        assert_eq!(parsed["QUOTED"], "line\nvalue");
        assert_eq!(parsed["SINGLE"], "raw value");
    }

    #[test]
    fn duplicate_keys_keep_first_position_and_last_value() {
        let parsed = project("A=1\nB=2\nA=3\n");

        let keys: Vec<&str> = parsed.keys().map(String::as_str).collect();
        assert_eq!(keys, ["A", "B"]);
        assert_eq!(parsed["A"], "3");
    }

    #[test]
    fn hash_without_leading_space_is_part_of_the_value() {
        assert_eq!(entry("URL=http://host/#frag").value, "http://host/#frag");
        assert_eq!(entry("A=#x").value, "#x");
    }

    #[test]
    fn decodes_escapes_from_the_normalizer() {
        assert_eq!(entry(r#"A="a\tb\0c\u{1b}d\u{85}""#).value, "a\tb\0c\x1bd\u{85}");
    }

    #[test]
    fn keeps_unknown_escapes_verbatim() {
        assert_eq!(entry(r#"A="\$\{x\}""#).value, r"\$\{x\}");
        assert_eq!(entry(r#"A="\u{zz}""#).value, r"\u{zz}");
    }

    #[test]
    fn parses_double_quoted_value_ending_with_escaped_backslash() {
        let parsed = project("PATH=\"C:\\\\Users\\\\\"\nNEXT=ok\n");

        assert_eq!(parsed["PATH"], "C:\\Users\\");
        assert_eq!(parsed["NEXT"], "ok");
    }

    #[test]
    fn parses_single_quoted_value_ending_with_backslash() {
        let parsed = project("A='C:\\\\Temp\\\\'\nB=ok\n");

        assert_eq!(parsed["A"], "C:\\\\Temp\\\\");
        assert_eq!(parsed["B"], "ok");
    }

    #[test]
    fn accepts_unterminated_double_quote() {
        assert_eq!(entry(r#"A="open\nvalue"#).value, "open\nvalue");
    }

    #[test]
    fn rejects_unterminated_single_quote() {
        let err = parse_line("A='open", 3).expect_err("expected parse error");
        assert_eq!(err.kind, ParseErrorKind::UnterminatedQuote);
        assert_eq!(err.line, 3);
    }

    #[test]
    fn reports_invalid_key() {
        let err = parse_line("BAD KEY=value", 1).expect_err("expected parse error");
        assert_eq!(err.kind, ParseErrorKind::InvalidKey);
    }

    #[test]
    fn reports_trailing_garbage_after_quote() {
        let err = parse_line(r#"A="x" y"#, 1).expect_err("expected parse error");
        assert_eq!(err.kind, ParseErrorKind::InvalidSyntax);
    }

    #[test]
    fn project_skips_unparsable_statements() {
        let parsed = project("A=1\nnot a statement\n1BAD=2\nB=3");

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["A"], "1");
        assert_eq!(parsed["B"], "3");
    }

    #[test]
    fn parses_unicode_values() {
        assert_eq!(entry("GREETING=こんにちは").value, "こんにちは");
    }
}
