//! Rule evaluation
//!
//! Every function here is pure: the same rule and input always yield the
//! same result, and failures (including malformed patterns) are reported as
//! failing results rather than errors.

use regex::{Regex, RegexBuilder};

use super::normalize::normalize;
use super::{
    Aggregation, LengthRule, RegexRule, Rule, RuleResult, RuleSet, RuleSetResult, TextRule,
    ValidationOutcome,
};

#[derive(Clone, Copy)]
enum TextMatch {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
}

impl TextMatch {
    fn apply(self, haystack: &str, needle: &str) -> bool {
        match self {
            TextMatch::Equals => haystack == needle,
            TextMatch::Contains => haystack.contains(needle),
            TextMatch::StartsWith => haystack.starts_with(needle),
            TextMatch::EndsWith => haystack.ends_with(needle),
        }
    }

    fn verb(self) -> &'static str {
        match self {
            TextMatch::Equals => "equal",
            TextMatch::Contains => "contain",
            TextMatch::StartsWith => "start with",
            TextMatch::EndsWith => "end with",
        }
    }
}

/// Evaluate one rule against a response
pub fn validate_rule(rule: &Rule, input: &str) -> RuleResult {
    match rule {
        Rule::Equals(r) => validate_text(r, input, TextMatch::Equals),
        Rule::Contains(r) => validate_text(r, input, TextMatch::Contains),
        Rule::StartsWith(r) => validate_text(r, input, TextMatch::StartsWith),
        Rule::EndsWith(r) => validate_text(r, input, TextMatch::EndsWith),
        Rule::Regex(r) => validate_regex(r, input),
        Rule::Length(r) => validate_length(r, input),
    }
}

fn validate_text(rule: &TextRule, input: &str, op: TextMatch) -> RuleResult {
    let actual = normalize(input, rule.case_sensitive, rule.respect_punctuation);
    let expected = normalize(&rule.value, rule.case_sensitive, rule.respect_punctuation);
    let pass = op.apply(&actual, &expected);

    let message = if pass {
        format!("Response does {} \"{}\"", op.verb(), rule.value)
    } else {
        format!("Expected response to {} \"{}\"", op.verb(), rule.value)
    };

    RuleResult {
        rule_id: rule.id.clone(),
        pass,
        message,
        actual_value: input.to_string(),
        expected_value: rule.value.clone(),
    }
}

fn build_regex(rule: &RegexRule) -> Result<Regex, String> {
    let mut builder = RegexBuilder::new(&rule.pattern);
    builder.case_insensitive(!rule.case_sensitive);

    for flag in rule.flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            'u' => {
                builder.unicode(true);
            }
            'g' | 'y' => {}
            other => return Err(format!("unsupported flag '{other}'")),
        }
    }

    builder.build().map_err(|e| e.to_string())
}

fn validate_regex(rule: &RegexRule, input: &str) -> RuleResult {
    let expected_value = format!("/{}/{}", rule.pattern, rule.flags);

    let regex = match build_regex(rule) {
        Ok(regex) => regex,
        Err(e) => {
            return RuleResult {
                rule_id: rule.id.clone(),
                pass: false,
                message: format!("Invalid regex pattern: {e}"),
                actual_value: input.to_string(),
                expected_value,
            }
        }
    };

    let actual = normalize(input, rule.case_sensitive, rule.respect_punctuation);
    let pass = regex.is_match(&actual);

    let message = if pass {
        format!("Response matches pattern {expected_value}")
    } else {
        format!("Response does not match pattern {expected_value}")
    };

    RuleResult {
        rule_id: rule.id.clone(),
        pass,
        message,
        actual_value: input.to_string(),
        expected_value,
    }
}

/// Human readable form of optional length bounds
pub(super) fn describe_bounds(min: Option<usize>, max: Option<usize>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("{min}..={max}"),
        (Some(min), None) => format!(">= {min}"),
        (None, Some(max)) => format!("<= {max}"),
        (None, None) => "any".to_string(),
    }
}

fn validate_length(rule: &LengthRule, input: &str) -> RuleResult {
    let length = input.chars().count();

    let message = match (rule.min, rule.max) {
        (Some(min), _) if length < min => {
            Some(format!("Response length {length} is below minimum {min}"))
        }
        (_, Some(max)) if length > max => {
            Some(format!("Response length {length} exceeds maximum {max}"))
        }
        _ => None,
    };

    let pass = message.is_none();
    let expected_value = describe_bounds(rule.min, rule.max);

    RuleResult {
        rule_id: rule.id.clone(),
        pass,
        message: message
            .unwrap_or_else(|| format!("Response length {length} is within {expected_value}")),
        actual_value: length.to_string(),
        expected_value,
    }
}

/// Evaluate a rule set; an empty set passes
pub fn validate_rule_set(rule_set: &RuleSet, input: &str) -> RuleSetResult {
    let results: Vec<RuleResult> = rule_set
        .rules
        .iter()
        .map(|rule| validate_rule(rule, input))
        .collect();

    let total_count = results.len();
    let passed_count = results.iter().filter(|r| r.pass).count();

    let pass = total_count == 0
        || match rule_set.aggregation {
            Aggregation::And => passed_count == total_count,
            Aggregation::Or => passed_count > 0,
        };

    let message = if total_count == 0 {
        "No rules to evaluate".to_string()
    } else {
        format!(
            "{passed_count}/{total_count} rules passed ({})",
            rule_set.aggregation
        )
    };

    RuleSetResult {
        rule_set_id: rule_set.id.clone(),
        pass,
        message,
        results,
        aggregation: rule_set.aggregation,
        passed_count,
        total_count,
    }
}

/// Evaluate every rule set.
///
/// The overall verdict is the AND of all non-empty rule sets; empty sets are
/// reported but excluded, so an input with only empty sets passes.
pub fn validate_rule_sets(rule_sets: &[RuleSet], input: &str) -> ValidationOutcome {
    let results: Vec<RuleSetResult> = rule_sets
        .iter()
        .map(|set| validate_rule_set(set, input))
        .collect();

    let pass = results.iter().filter(|r| r.is_evaluated()).all(|r| r.pass);

    ValidationOutcome {
        pass,
        rule_sets: results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_rules_two_passing(aggregation: Aggregation) -> RuleSet {
        RuleSet::new(
            "set",
            aggregation,
            vec![
                Rule::contains("hello", "hello"),
                Rule::starts_with("greet", "hi"),
                Rule::length("len", Some(1), Some(100)),
            ],
        )
    }

    #[test]
    fn test_equals_normalizes_case_and_punctuation() {
        let result = validate_rule(&Rule::equals("eq", "helloworld"), "Hello, World!");
        assert!(result.pass);
        assert_eq!(result.actual_value, "Hello, World!");
        assert_eq!(result.expected_value, "helloworld");
    }

    #[test]
    fn test_equals_respects_options() {
        let rule = Rule::equals("eq", "helloworld").case_sensitive(true);
        assert!(!validate_rule(&rule, "Hello, World!").pass);

        let rule = Rule::equals("eq", "hello world").respect_punctuation(true);
        assert!(!validate_rule(&rule, "Hello, World!").pass);
        assert!(validate_rule(&rule, "HELLO WORLD").pass);
    }

    #[test]
    fn test_equals_merges_separate_words() {
        // Stripping whitespace makes "ten four" indistinguishable from "tenfour".
        let result = validate_rule(&Rule::equals("eq", "tenfour"), "ten four");
        assert!(result.pass);

        let strict = Rule::equals("eq", "tenfour").respect_punctuation(true);
        assert!(!validate_rule(&strict, "ten four").pass);
    }

    #[test]
    fn test_contains_starts_ends() {
        let input = "The answer is 42.";
        assert!(validate_rule(&Rule::contains("c", "ANSWER"), input).pass);
        assert!(validate_rule(&Rule::starts_with("s", "the answer"), input).pass);
        assert!(validate_rule(&Rule::ends_with("e", "42"), input).pass);

        let strict_end = Rule::ends_with("e", "42").respect_punctuation(true);
        let result = validate_rule(&strict_end, input);
        assert!(!result.pass);
        assert_eq!(result.message, "Expected response to end with \"42\"");
    }

    #[test]
    fn test_regex_is_case_insensitive_by_default() {
        let rule = Rule::regex("re", "^PARIS");
        assert!(validate_rule(&rule, "paris is the capital").pass);

        let strict = Rule::regex("re", "^PARIS").case_sensitive(true);
        assert!(!validate_rule(&strict, "paris is the capital").pass);
    }

    #[test]
    fn test_regex_runs_against_normalized_input() {
        let rule = Rule::regex("re", r"^helloworld$");
        assert!(validate_rule(&rule, "Hello, World!").pass);

        let raw = Rule::regex("re", r"world!$").respect_punctuation(true);
        assert!(validate_rule(&raw, "Hello, World!").pass);
    }

    #[test]
    fn test_regex_flags() {
        let rule = Rule::regex("re", r"^second$")
            .with_flags("mg")
            .respect_punctuation(true);
        assert!(validate_rule(&rule, "first\nsecond\nthird").pass);

        let rule = Rule::regex("re", r"^Second$")
            .case_sensitive(true)
            .respect_punctuation(true)
            .with_flags("im");
        assert!(validate_rule(&rule, "first\nsecond").pass);
    }

    #[test]
    fn test_invalid_regex_is_a_failing_result() {
        let result = validate_rule(&Rule::regex("bad", "(unclosed"), "anything");
        assert!(!result.pass);
        assert!(result.message.starts_with("Invalid regex pattern"));
        assert_eq!(result.expected_value, "/(unclosed/");

        let result = validate_rule(&Rule::regex("flag", "a").with_flags("q"), "a");
        assert!(!result.pass);
        assert!(result.message.contains("unsupported flag 'q'"));
    }

    #[test]
    fn test_length_bounds() {
        let rule = Rule::length("len", Some(5), Some(10));

        let ok = validate_rule(&rule, "hello");
        assert!(ok.pass);
        assert_eq!(ok.actual_value, "5");

        let short = validate_rule(&rule, "hi");
        assert!(!short.pass);
        assert!(short.message.contains('2'));
        assert!(short.message.contains('5'));
        assert_eq!(short.message, "Response length 2 is below minimum 5");

        let long = validate_rule(&rule, "hello, world");
        assert!(!long.pass);
        assert_eq!(long.message, "Response length 12 exceeds maximum 10");
    }

    #[test]
    fn test_length_is_never_normalized() {
        let rule = Rule::length("len", None, Some(3));
        assert!(!validate_rule(&rule, "a, b").pass);
        assert!(validate_rule(&Rule::length("len", None, Some(3)), "héé").pass);
        assert!(validate_rule(&Rule::length("any", None, None), "").pass);
    }

    #[test]
    fn test_validate_rule_is_pure() {
        let rules = vec![
            Rule::equals("a", "x"),
            Rule::regex("b", "(bad"),
            Rule::length("c", Some(2), None),
        ];
        for rule in &rules {
            let first = validate_rule(rule, "Some input, here.");
            let second = validate_rule(rule, "Some input, here.");
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_and_aggregation() {
        let result = validate_rule_set(&three_rules_two_passing(Aggregation::And), "hello there");
        assert!(!result.pass);
        assert_eq!(result.passed_count, 2);
        assert_eq!(result.total_count, 3);
        assert_eq!(result.message, "2/3 rules passed (AND)");
    }

    #[test]
    fn test_or_aggregation() {
        let result = validate_rule_set(&three_rules_two_passing(Aggregation::Or), "hello there");
        assert!(result.pass);
        assert_eq!(result.passed_count, 2);
        assert_eq!(result.total_count, 3);

        let none = RuleSet::new("none", Aggregation::Or, vec![Rule::contains("x", "zebra")]);
        assert!(!validate_rule_set(&none, "hello").pass);
    }

    #[test]
    fn test_empty_rule_set_passes() {
        for aggregation in [Aggregation::And, Aggregation::Or] {
            let result = validate_rule_set(&RuleSet::new("empty", aggregation, vec![]), "x");
            assert!(result.pass);
            assert_eq!(result.total_count, 0);
            assert!(!result.is_evaluated());
        }
    }

    #[test]
    fn test_overall_excludes_empty_sets() {
        let failing = RuleSet::new("f", Aggregation::And, vec![Rule::contains("c", "zebra")]);
        let passing = RuleSet::new("p", Aggregation::And, vec![Rule::contains("c", "hello")]);
        let empty = RuleSet::new("e", Aggregation::And, vec![]);

        let outcome = validate_rule_sets(&[passing.clone(), empty.clone()], "hello");
        assert!(outcome.pass);
        assert_eq!(outcome.rule_sets.len(), 2);
        assert_eq!(outcome.evaluated().count(), 1);

        let outcome = validate_rule_sets(&[passing, failing, empty.clone()], "hello");
        assert!(!outcome.pass);
        assert_eq!(outcome.failures(), vec!["f/c: Expected response to contain \"zebra\""]);

        assert!(validate_rule_sets(&[empty], "anything").pass);
        assert!(validate_rule_sets(&[], "anything").pass);
    }
}
