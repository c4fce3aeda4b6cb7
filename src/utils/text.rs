/// Normalize a team name for comparison: lowercase, punctuation stripped,
/// whitespace collapsed.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_space = true;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Split a stored match name like "Boston Red Sox vs NY Yankees" into its
/// two team tokens. Recognizes " vs ", " v " and " - " separators.
pub fn split_match_name(match_name: &str) -> Option<(String, String)> {
    const SEPARATORS: [&str; 5] = [" vs. ", " vs ", " v ", " - ", " @ "];
    let lower = match_name.to_lowercase();
    for sep in SEPARATORS {
        if let Some(idx) = lower.find(sep) {
            let (left, right) = lower.split_at(idx);
            let right = &right[sep.len()..];
            let a = normalize_name(left);
            let b = normalize_name(right);
            if !a.is_empty() && !b.is_empty() {
                return Some((a, b));
            }
        }
    }
    None
}

/// Symmetric substring containment between a name token and a team name,
/// both already normalized. "red sox" matches "boston red sox" and
/// vice versa.
pub fn fuzzy_contains(token: &str, name: &str) -> bool {
    if token.is_empty() || name.is_empty() {
        return false;
    }
    name.contains(token) || token.contains(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize_name("St. Louis  Cardinals"), "st louis cardinals");
        assert_eq!(normalize_name("  A.C. Milan "), "a c milan");
    }

    #[test]
    fn split_recognizes_common_separators() {
        assert_eq!(
            split_match_name("Boston Red Sox vs NY Yankees"),
            Some(("boston red sox".to_string(), "ny yankees".to_string()))
        );
        assert_eq!(
            split_match_name("Lyon - Lens"),
            Some(("lyon".to_string(), "lens".to_string()))
        );
        assert_eq!(
            split_match_name("Federer v Nadal"),
            Some(("federer".to_string(), "nadal".to_string()))
        );
        assert_eq!(split_match_name("no separator here"), None);
    }

    #[test]
    fn fuzzy_containment_is_symmetric() {
        assert!(fuzzy_contains("red sox", "boston red sox"));
        assert!(fuzzy_contains("boston red sox", "red sox"));
        assert!(!fuzzy_contains("yankees", "boston red sox"));
        assert!(!fuzzy_contains("", "anything"));
    }
}
