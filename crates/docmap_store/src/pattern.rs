//! Glob-style key patterns, as used by `SCAN MATCH`.

/// Returns true if `text` matches the glob `pattern`.
///
/// Supports `*`, `?`, character classes (`[abc]`, `[a-z]`, `[^a]`) and
/// backslash escapes.
#[must_use]
pub fn pattern_matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    matches_at(&pattern, &text)
}

fn matches_at(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Backtrack point for the most recent '*': (pattern index after star, text index).
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() {
            match pattern[p] {
                '*' => {
                    star = Some((p + 1, t));
                    p += 1;
                    continue;
                }
                '?' => {
                    p += 1;
                    t += 1;
                    continue;
                }
                '[' => {
                    if let Some((matched, next)) = match_class(pattern, p, text[t]) {
                        if matched {
                            p = next;
                            t += 1;
                            continue;
                        }
                    }
                }
                '\\' if p + 1 < pattern.len() => {
                    if pattern[p + 1] == text[t] {
                        p += 2;
                        t += 1;
                        continue;
                    }
                }
                c => {
                    if c == text[t] {
                        p += 1;
                        t += 1;
                        continue;
                    }
                }
            }
        }

        match star {
            Some((star_p, star_t)) => {
                p = star_p;
                t = star_t + 1;
                star = Some((star_p, star_t + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// Matches `c` against the class starting at `pattern[start] == '['`.
///
/// Returns `(matched, index after the class)`, or `None` if the class is
/// unterminated (treated as a literal mismatch).
fn match_class(pattern: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = pattern.get(i) == Some(&'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    while i < pattern.len() && pattern[i] != ']' {
        let mut lo = pattern[i];
        if lo == '\\' && i + 1 < pattern.len() {
            i += 1;
            lo = pattern[i];
        }
        if i + 2 < pattern.len() && pattern[i + 1] == '-' && pattern[i + 2] != ']' {
            let hi = pattern[i + 2];
            if lo <= c && c <= hi {
                matched = true;
            }
            i += 3;
        } else {
            if lo == c {
                matched = true;
            }
            i += 1;
        }
    }

    if i >= pattern.len() {
        return None;
    }
    Some((matched != negate, i + 1))
}

/// Escapes glob metacharacters so `text` matches only itself.
#[must_use]
pub fn escape_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn star_matches_any_suffix() {
        assert!(pattern_matches("app:users:*", "app:users:42"));
        assert!(pattern_matches("app:users:*", "app:users:"));
        assert!(!pattern_matches("app:users:*", "app:posts:42"));
    }

    #[test]
    fn star_in_the_middle() {
        assert!(pattern_matches("idx:*:tag", "idx:posts:tag"));
        assert!(!pattern_matches("idx:*:tag", "idx:posts:tags"));
        assert!(pattern_matches("*a*b*", "xxaxxbxx"));
    }

    #[test]
    fn question_mark_matches_one() {
        assert!(pattern_matches("k?", "k1"));
        assert!(!pattern_matches("k?", "k"));
        assert!(!pattern_matches("k?", "k12"));
    }

    #[test]
    fn character_classes() {
        assert!(pattern_matches("k[abc]", "kb"));
        assert!(!pattern_matches("k[abc]", "kd"));
        assert!(pattern_matches("k[a-c]", "kc"));
        assert!(pattern_matches("k[^a]", "kb"));
        assert!(!pattern_matches("k[^a]", "ka"));
    }

    #[test]
    fn escapes_are_literal() {
        let pattern = format!("{}:*", escape_pattern("we*rd"));
        assert!(pattern_matches(&pattern, "we*rd:1"));
        assert!(!pattern_matches(&pattern, "weXXrd:1"));
    }

    proptest! {
        #[test]
        fn escaped_text_matches_itself(text in "[a-z*?\\[\\]:]{0,16}") {
            prop_assert!(pattern_matches(&escape_pattern(&text), &text));
        }

        #[test]
        fn prefix_star_matches_extensions(prefix in "[a-z:]{0,8}", rest in "[a-z0-9:]{0,8}") {
            let pattern = format!("{}*", escape_pattern(&prefix));
            let text = format!("{prefix}{rest}");
            prop_assert!(pattern_matches(&pattern, &text));
        }
    }
}
