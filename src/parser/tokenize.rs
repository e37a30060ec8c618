//! Shell-style word splitting for access-log lines.

/// Split on unquoted whitespace. Double and single quotes group words and are
/// removed; a backslash escapes the next char outside quotes and `"`, `\` inside
/// double quotes. Returns `None` on an unterminated quote or trailing backslash.
pub fn split(line: &str) -> Option<Vec<String>> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    out.push(std::mem::take(&mut cur));
                    in_word = false;
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next()? {
                        '"' => break,
                        '\\' => match chars.next()? {
                            e @ ('"' | '\\') => cur.push(e),
                            e => {
                                cur.push('\\');
                                cur.push(e);
                            }
                        },
                        ch => cur.push(ch),
                    }
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next()? {
                        '\'' => break,
                        ch => cur.push(ch),
                    }
                }
            }
            '\\' => {
                in_word = true;
                cur.push(chars.next()?);
            }
            ch => {
                in_word = true;
                cur.push(ch);
            }
        }
    }
    if in_word {
        out.push(cur);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::split;

    #[test]
    fn quoted_fields_stay_whole() {
        let t = split(r#"h2 "GET http://a/ HTTP/1.1" "Mozilla/5.0 (X11)" -"#).unwrap();
        assert_eq!(t, vec!["h2", "GET http://a/ HTTP/1.1", "Mozilla/5.0 (X11)", "-"]);
    }

    #[test]
    fn empty_quotes_yield_empty_token() {
        assert_eq!(split(r#"a "" b"#).unwrap(), vec!["a", "", "b"]);
    }

    #[test]
    fn escapes_and_single_quotes() {
        assert_eq!(split(r#""say \"hi\"" 'x y' a\ b"#).unwrap(), vec![r#"say "hi""#, "x y", "a b"]);
    }

    #[test]
    fn unterminated_quote_fails() {
        assert!(split(r#"a "b c"#).is_none());
        assert!(split("a 'b").is_none());
    }

    #[test]
    fn extra_whitespace_is_collapsed() {
        assert_eq!(split("  a \t b  ").unwrap(), vec!["a", "b"]);
    }
}
