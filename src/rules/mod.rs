//! Rule engine for grading responses
//!
//! Rules are declarative assertions about a single response string. They are
//! grouped into rule sets combined with AND/OR, and evaluation is a pure
//! function of the rule and the input.

mod engine;
mod normalize;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use engine::{validate_rule, validate_rule_set, validate_rule_sets};
pub use normalize::normalize;

/// Literal comparison rule (`equals`, `contains`, `starts_with`, `ends_with`)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRule {
    pub id: String,
    pub value: String,
    #[serde(default, alias = "caseSensitive")]
    pub case_sensitive: bool,
    #[serde(default, alias = "respectPunctuation")]
    pub respect_punctuation: bool,
}

/// Pattern rule
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexRule {
    pub id: String,
    pub pattern: String,
    /// Single-letter flags: i, m, s, x, u (g and y are accepted and ignored)
    #[serde(default)]
    pub flags: String,
    #[serde(default, alias = "caseSensitive")]
    pub case_sensitive: bool,
    #[serde(default, alias = "respectPunctuation")]
    pub respect_punctuation: bool,
}

/// Character-count rule, evaluated on the raw response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthRule {
    pub id: String,
    #[serde(default)]
    pub min: Option<usize>,
    #[serde(default)]
    pub max: Option<usize>,
}

/// A single assertion about a response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rule {
    Equals(TextRule),
    Contains(TextRule),
    #[serde(alias = "startsWith")]
    StartsWith(TextRule),
    #[serde(alias = "endsWith")]
    EndsWith(TextRule),
    Regex(RegexRule),
    Length(LengthRule),
}

impl Rule {
    fn text(id: impl Into<String>, value: impl Into<String>) -> TextRule {
        TextRule {
            id: id.into(),
            value: value.into(),
            case_sensitive: false,
            respect_punctuation: false,
        }
    }

    pub fn equals(id: impl Into<String>, value: impl Into<String>) -> Self {
        Rule::Equals(Self::text(id, value))
    }

    pub fn contains(id: impl Into<String>, value: impl Into<String>) -> Self {
        Rule::Contains(Self::text(id, value))
    }

    pub fn starts_with(id: impl Into<String>, value: impl Into<String>) -> Self {
        Rule::StartsWith(Self::text(id, value))
    }

    pub fn ends_with(id: impl Into<String>, value: impl Into<String>) -> Self {
        Rule::EndsWith(Self::text(id, value))
    }

    pub fn regex(id: impl Into<String>, pattern: impl Into<String>) -> Self {
        Rule::Regex(RegexRule {
            id: id.into(),
            pattern: pattern.into(),
            flags: String::new(),
            case_sensitive: false,
            respect_punctuation: false,
        })
    }

    pub fn length(id: impl Into<String>, min: Option<usize>, max: Option<usize>) -> Self {
        Rule::Length(LengthRule {
            id: id.into(),
            min,
            max,
        })
    }

    /// Set case sensitivity; no effect on length rules
    pub fn case_sensitive(mut self, on: bool) -> Self {
        match &mut self {
            Rule::Equals(r) | Rule::Contains(r) | Rule::StartsWith(r) | Rule::EndsWith(r) => {
                r.case_sensitive = on
            }
            Rule::Regex(r) => r.case_sensitive = on,
            Rule::Length(_) => {}
        }
        self
    }

    /// Keep punctuation and whitespace when comparing; no effect on length rules
    pub fn respect_punctuation(mut self, on: bool) -> Self {
        match &mut self {
            Rule::Equals(r) | Rule::Contains(r) | Rule::StartsWith(r) | Rule::EndsWith(r) => {
                r.respect_punctuation = on
            }
            Rule::Regex(r) => r.respect_punctuation = on,
            Rule::Length(_) => {}
        }
        self
    }

    /// Set regex flags; no effect on other kinds
    pub fn with_flags(mut self, flags: impl Into<String>) -> Self {
        if let Rule::Regex(r) = &mut self {
            r.flags = flags.into();
        }
        self
    }

    pub fn id(&self) -> &str {
        match self {
            Rule::Equals(r) | Rule::Contains(r) | Rule::StartsWith(r) | Rule::EndsWith(r) => &r.id,
            Rule::Regex(r) => &r.id,
            Rule::Length(r) => &r.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Rule::Equals(_) => "equals",
            Rule::Contains(_) => "contains",
            Rule::StartsWith(_) => "starts_with",
            Rule::EndsWith(_) => "ends_with",
            Rule::Regex(_) => "regex",
            Rule::Length(_) => "length",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Equals(r) | Rule::Contains(r) | Rule::StartsWith(r) | Rule::EndsWith(r) => {
                write!(f, "{} {} \"{}\"", r.id, self.kind(), r.value)
            }
            Rule::Regex(r) => write!(f, "{} regex /{}/{}", r.id, r.pattern, r.flags),
            Rule::Length(r) => write!(
                f,
                "{} length {}",
                r.id,
                engine::describe_bounds(r.min, r.max)
            ),
        }
    }
}

/// How rule verdicts inside a set are combined
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Aggregation {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::And => write!(f, "AND"),
            Aggregation::Or => write!(f, "OR"),
        }
    }
}

/// Ordered collection of rules combined by one aggregation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub aggregation: Aggregation,
}

impl RuleSet {
    pub fn new(id: impl Into<String>, aggregation: Aggregation, rules: Vec<Rule>) -> Self {
        Self {
            id: id.into(),
            name: None,
            rules,
            aggregation,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Verdict for one rule
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_id: String,
    pub pass: bool,
    pub message: String,
    pub actual_value: String,
    pub expected_value: String,
}

/// Verdict for one rule set
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSetResult {
    pub rule_set_id: String,
    pub pass: bool,
    pub message: String,
    pub results: Vec<RuleResult>,
    pub aggregation: Aggregation,
    pub passed_count: usize,
    pub total_count: usize,
}

impl RuleSetResult {
    /// Empty sets never count toward the overall verdict
    pub fn is_evaluated(&self) -> bool {
        self.total_count > 0
    }
}

/// Overall verdict across every rule set of a test case
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub pass: bool,
    pub rule_sets: Vec<RuleSetResult>,
}

impl ValidationOutcome {
    /// Rule sets that took part in the verdict
    pub fn evaluated(&self) -> impl Iterator<Item = &RuleSetResult> {
        self.rule_sets.iter().filter(|r| r.is_evaluated())
    }

    /// Messages of every failing rule, prefixed by their set id
    pub fn failures(&self) -> Vec<String> {
        self.rule_sets
            .iter()
            .flat_map(|set| {
                set.results
                    .iter()
                    .filter(|r| !r.pass)
                    .map(move |r| format!("{}/{}: {}", set.rule_set_id, r.rule_id, r.message))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_deserialize_tags() {
        let yaml = r#"
- type: equals
  id: a
  value: "yes"
- type: startsWith
  id: b
  value: "Dear"
  caseSensitive: true
- type: ends_with
  id: c
  value: "."
  respect_punctuation: true
- type: regex
  id: d
  pattern: "\\d+"
  flags: m
- type: length
  id: e
  min: 3
"#;
        let rules: Vec<Rule> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rules.len(), 5);
        assert_eq!(rules[1].kind(), "starts_with");
        assert!(matches!(&rules[1], Rule::StartsWith(r) if r.case_sensitive));
        assert!(matches!(&rules[2], Rule::EndsWith(r) if r.respect_punctuation));
        assert!(matches!(&rules[3], Rule::Regex(r) if r.flags == "m"));
        assert!(matches!(&rules[4], Rule::Length(r) if r.min == Some(3) && r.max.is_none()));
    }

    #[test]
    fn test_aggregation_serde() {
        let set: RuleSet = serde_json::from_str(r#"{"id":"s","aggregation":"OR"}"#).unwrap();
        assert_eq!(set.aggregation, Aggregation::Or);
        assert!(set.is_empty());

        let set: RuleSet = serde_json::from_str(r#"{"id":"s","rules":[]}"#).unwrap();
        assert_eq!(set.aggregation, Aggregation::And);
    }

    #[test]
    fn test_builders_skip_length() {
        let rule = Rule::length("l", Some(1), Some(2))
            .case_sensitive(true)
            .respect_punctuation(true)
            .with_flags("i");
        assert_eq!(rule, Rule::length("l", Some(1), Some(2)));
        assert_eq!(rule.id(), "l");
    }

    #[test]
    fn test_rule_display() {
        assert_eq!(Rule::contains("c", "cat").to_string(), "c contains \"cat\"");
        assert_eq!(
            Rule::regex("r", "^a").with_flags("m").to_string(),
            "r regex /^a/m"
        );
        assert_eq!(
            Rule::length("l", Some(5), Some(10)).to_string(),
            "l length 5..=10"
        );
    }
}
