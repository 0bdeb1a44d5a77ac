/// Generates a fingerprint for a SQL statement by collapsing its
/// constant values, so that statements differing only in literals share
/// one aggregation key.
///
/// Normalization is lexical only:
/// - every maximal run of digits becomes a single `?`
/// - every quoted literal becomes its quote characters around a `?`,
///   matching the nearest closing quote, across newlines
///
/// Nested or escaped quotes are not handled specially; an unterminated
/// quote leaves the rest of the text untouched.
pub fn fingerprint(text: &str) -> String {
    collapse_literals(&collapse_digits(text))
}

fn collapse_digits(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    for c in text.chars() {
        if c.is_ascii_digit() {
            if !in_run {
                out.push('?');
                in_run = true;
            }
        } else {
            in_run = false;
            out.push(c);
        }
    }
    out
}

fn collapse_literals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\'' && c != '"' {
            out.push(c);
            continue;
        }
        let mut literal = String::new();
        let mut closed = false;
        for inner in chars.by_ref() {
            if inner == c {
                closed = true;
                break;
            }
            literal.push(inner);
        }
        if closed {
            out.push(c);
            out.push('?');
            out.push(c);
        } else {
            out.push(c);
            out.push_str(&literal);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_literals_collapse() {
        assert_eq!(
            fingerprint("SELECT * FROM t WHERE id=1"),
            fingerprint("SELECT * FROM t WHERE id=999")
        );
    }

    #[test]
    fn test_quoted_and_numeric_shapes_differ() {
        assert_ne!(
            fingerprint("SELECT * FROM t WHERE id=1"),
            fingerprint("SELECT * FROM t WHERE name='a'")
        );
    }

    #[test]
    fn test_string_literals_collapse() {
        assert_eq!(
            fingerprint("SELECT * FROM t WHERE name='alice'"),
            fingerprint("SELECT * FROM t WHERE name='bob'")
        );
        assert_eq!(
            fingerprint("SELECT * FROM t WHERE name='alice'"),
            "SELECT * FROM t WHERE name='?'"
        );
    }

    #[test]
    fn test_double_quoted_literals_keep_their_quote_kind() {
        assert_eq!(fingerprint(r#"WHERE a = "x" AND b = 'y'"#), r#"WHERE a = "?" AND b = '?'"#);
    }

    #[test]
    fn test_digit_runs_become_one_placeholder() {
        assert_eq!(fingerprint("LIMIT 100, 25"), "LIMIT ?, ?");
    }

    #[test]
    fn test_idempotent() {
        let once = fingerprint("SELECT * FROM t WHERE id=42 AND name='x'");
        assert_eq!(fingerprint(&once), once);
    }

    #[test]
    fn test_literal_spans_newlines() {
        assert_eq!(fingerprint("INSERT INTO t VALUES ('a\nb')"), "INSERT INTO t VALUES ('?')");
    }

    #[test]
    fn test_unterminated_quote_left_alone() {
        assert_eq!(fingerprint("WHERE name = 'oops"), "WHERE name = 'oops");
    }

    #[test]
    fn test_digits_inside_literals_fold_into_placeholder() {
        assert_eq!(fingerprint("WHERE code = 'abc123'"), "WHERE code = '?'");
    }
}
