//! Glob patterns for identifier filtering.
//!
//! Supported syntax: `*` (any run), `?` (one character), `[abc]`, `[a-z]`
//! and `[!abc]`. Everything else matches literally. Patterns are anchored at
//! both ends.

use regex::Regex;
use strata_core::ValidationError;

/// Compile `pattern` into an anchored regex.
pub fn compile(pattern: &str) -> Result<Regex, ValidationError> {
    let source = translate(pattern)?;
    Regex::new(&source).map_err(|e| invalid(pattern, &e.to_string()))
}

fn invalid(pattern: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    }
}

/// Translate glob syntax into regex source.
pub fn translate(pattern: &str) -> Result<String, ValidationError> {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                out.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    out.push('^');
                }

                let mut members = 0usize;
                let mut closed = false;
                for member in chars.by_ref() {
                    // A leading ']' is a literal member.
                    if member == ']' && members > 0 {
                        closed = true;
                        break;
                    }
                    match member {
                        '\\' | '[' | ']' | '^' | '&' | '~' => {
                            out.push('\\');
                            out.push(member);
                        }
                        _ => out.push(member),
                    }
                    members += 1;
                }

                if !closed {
                    return Err(invalid(pattern, "unterminated character class"));
                }
                out.push(']');
            }
            _ => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
            }
        }
    }

    out.push('$');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_star_and_question() {
        let re = compile("aws:instances:*:us-east-1:i-????1234").unwrap();
        assert!(re.is_match("aws:instances:prod:us-east-1:i-abcd1234"));
        assert!(!re.is_match("aws:instances:prod:us-west-2:i-abcd1234"));
    }

    #[test]
    fn test_literal_regex_metacharacters() {
        let re = compile("a.b+(c)").unwrap();
        assert!(re.is_match("a.b+(c)"));
        assert!(!re.is_match("axbb(c)"));
    }

    #[test]
    fn test_character_classes() {
        let re = compile("i-[a-c]1").unwrap();
        assert!(re.is_match("i-b1"));
        assert!(!re.is_match("i-d1"));

        let negated = compile("i-[!a-c]1").unwrap();
        assert!(negated.is_match("i-d1"));
        assert!(!negated.is_match("i-a1"));
    }

    #[test]
    fn test_unterminated_class_is_rejected() {
        let err = compile("i-[abc").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPattern { .. }));
    }

    #[test]
    fn test_anchored() {
        let re = compile("prod").unwrap();
        assert!(!re.is_match("aws:prod:x"));
    }

    proptest! {
        /// Property: a pattern without wildcards matches exactly itself.
        #[test]
        fn prop_literal_patterns_match_themselves(s in "[A-Za-z0-9:/._+()-]{0,40}") {
            let re = compile(&s).unwrap();
            prop_assert!(re.is_match(&s));
        }

        /// Property: `prefix*` matches any extension of the prefix.
        #[test]
        fn prop_trailing_star(prefix in "[a-z:]{1,20}", tail in "[a-z0-9:]{0,20}") {
            let re = compile(&format!("{prefix}*")).unwrap();
            let candidate = format!("{}{}", prefix, tail);
            prop_assert!(re.is_match(&candidate));
        }
    }
}
