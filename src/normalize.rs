use std::borrow::Cow;

/// C0 controls, DEL and C1 controls.
pub fn is_control(ch: char) -> bool {
    matches!(ch as u32, 0x00..=0x1f | 0x7f..=0x9f)
}

/// Spell every control character in `line` as a printable escape sequence.
///
/// Uses the `escape_debug` convention: `\0`, `\t`, `\n`, `\r`, and `\u{hex}`
/// for everything else. The projector's double-quoted decoder reverses each
/// of these, so normalization never loses information.
pub fn normalize(line: &str) -> Cow<'_, str> {
    if !line.chars().any(is_control) {
        return Cow::Borrowed(line);
    }

    let mut out = String::with_capacity(line.len() + 8);
    for ch in line.chars() {
        if is_control(ch) {
            out.extend(ch.escape_debug());
        } else {
            out.push(ch);
        }
    }

    Cow::Owned(out)
}

/// Fold `\r\n` and lone `\r` line terminators into `\n`.
pub fn normalize_newlines(input: &str) -> Cow<'_, str> {
    if !input.contains('\r') {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\r' {
            out.push('\n');
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            continue;
        }
        out.push(ch);
    }

    Cow::Owned(out)
}

pub(crate) fn is_preceded_by_odd_backslashes(bytes: &[u8], idx: usize) -> bool {
    let mut cursor = idx;
    let mut backslash_count = 0usize;
    while cursor > 0 && bytes[cursor - 1] == b'\\' {
        cursor -= 1;
        backslash_count += 1;
    }

    backslash_count % 2 == 1
}
