//! Text normalization applied before literal and pattern comparisons

/// Normalize text for comparison.
///
/// Without `respect_punctuation` every character that is not a letter or
/// digit is removed, whitespace included, so "ten four" and "tenfour"
/// normalize to the same string. Without `case_sensitive` the result is
/// lowercased.
pub fn normalize(text: &str, case_sensitive: bool, respect_punctuation: bool) -> String {
    let stripped: String = if respect_punctuation {
        text.to_string()
    } else {
        text.chars().filter(|c| c.is_alphanumeric()).collect()
    };

    if case_sensitive {
        stripped
    } else {
        stripped.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_normalization() {
        assert_eq!(normalize("Hello, World!", false, false), "helloworld");
    }

    #[test]
    fn test_case_sensitive_keeps_case() {
        assert_eq!(normalize("Hello, World!", true, false), "HelloWorld");
    }

    #[test]
    fn test_respect_punctuation_keeps_symbols() {
        assert_eq!(normalize("Hello, World!", false, true), "hello, world!");
        assert_eq!(normalize("Hello, World!", true, true), "Hello, World!");
    }

    #[test]
    fn test_whitespace_is_stripped_too() {
        // Known over-aggressive default: distinct phrases collapse together.
        assert_eq!(
            normalize("ten four", false, false),
            normalize("tenfour", false, false)
        );
    }

    #[test]
    fn test_unicode_letters_survive() {
        assert_eq!(normalize("Ça va? Très bien…42!", false, false), "çavatrèsbien42");
    }
}
