//! String literal scanning and escape processing.
//!
//! Recognized escapes: `\n`, `\r`, `\t`, `\\`, `\"`, `\'`, `\0`

use crate::LexErrorKind;

#[inline]
pub(crate) fn resolve_escape(c: char) -> Option<char> {
    match c {
        'n' => Some('\n'),
        'r' => Some('\r'),
        't' => Some('\t'),
        '\\' => Some('\\'),
        '"' => Some('"'),
        '\'' => Some('\''),
        '0' => Some('\0'),
        _ => None,
    }
}

/// Scan a string body starting just after the opening quote.
///
/// Returns the number of bytes consumed (including the closing quote when
/// found) and the cooked contents. Raw newlines end an unterminated string
/// so the rest of the file still lexes. The first invalid escape is
/// reported after the closing quote is found.
pub(crate) fn scan_string(rest: &str) -> (usize, Result<String, LexErrorKind>) {
    let mut out = String::new();
    let mut bad_escape = None;
    let mut chars = rest.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => {
                let cooked = match bad_escape {
                    Some(esc) => Err(LexErrorKind::InvalidEscape(esc)),
                    None => Ok(out),
                };
                return (i + 1, cooked);
            }
            '\n' => return (i, Err(LexErrorKind::UnterminatedString)),
            '\\' => match chars.next() {
                Some((_, '\n')) | None => break,
                Some((_, esc)) => match resolve_escape(esc) {
                    Some(resolved) => out.push(resolved),
                    None => {
                        bad_escape.get_or_insert(esc);
                    }
                },
            },
            _ => out.push(c),
        }
    }

    let consumed = rest.find('\n').unwrap_or(rest.len());
    (consumed, Err(LexErrorKind::UnterminatedString))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooks_escapes() {
        let (consumed, cooked) = scan_string(r#"a\tb\n\"q\"" rest"#);
        assert_eq!(cooked, Ok("a\tb\n\"q\"".to_string()));
        assert_eq!(consumed, 12);
    }

    #[test]
    fn invalid_escape_consumes_whole_literal() {
        let (consumed, cooked) = scan_string(r#"x\qy" z"#);
        assert_eq!(cooked, Err(LexErrorKind::InvalidEscape('q')));
        assert_eq!(consumed, 5);
    }

    #[test]
    fn newline_ends_unterminated_string() {
        let (consumed, cooked) = scan_string("abc\n[next]");
        assert_eq!(cooked, Err(LexErrorKind::UnterminatedString));
        assert_eq!(consumed, 3);
    }

    #[test]
    fn eof_ends_unterminated_string() {
        let (consumed, cooked) = scan_string("abc\\");
        assert_eq!(cooked, Err(LexErrorKind::UnterminatedString));
        assert_eq!(consumed, 4);
    }
}
