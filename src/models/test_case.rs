//! Test case definitions
//!
//! A test case is the prompt that a batch repeats plus the rule sets used to
//! grade every response.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::rules::RuleSet;

/// A prompt and the rules its responses are graded against
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub rules: Vec<RuleSet>,
}

impl TestCase {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            prompt: prompt.into(),
            system_prompt: None,
            rules: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_rule_set(mut self, rule_set: RuleSet) -> Self {
        self.rules.push(rule_set);
        self
    }

    /// Display name, falling back to the id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Number of rules across all rule sets
    pub fn rule_count(&self) -> usize {
        self.rules.iter().map(|s| s.rules.len()).sum()
    }

    /// Load a test case from a YAML or JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read test case: {}", path.display()))?;

        let is_yaml = path
            .extension()
            .map(|e| e == "yaml" || e == "yml")
            .unwrap_or(false);

        let test_case: Self = if is_yaml {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML test case: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON test case: {}", path.display()))?
        };

        Ok(test_case)
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} rule sets, {} rules)",
            self.display_name(),
            self.rules.len(),
            self.rule_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Aggregation, Rule};
    use std::io::Write;

    #[test]
    fn test_display_name_fallback() {
        let tc = TestCase::new("greeting", "Say hello");
        assert_eq!(tc.display_name(), "greeting");

        let tc = tc.with_name("Greeting test");
        assert_eq!(tc.display_name(), "Greeting test");
    }

    #[test]
    fn test_rule_count() {
        let tc = TestCase::new("tc", "prompt")
            .with_rule_set(RuleSet::new(
                "a",
                Aggregation::And,
                vec![Rule::contains("r1", "x"), Rule::length("r2", Some(1), None)],
            ))
            .with_rule_set(RuleSet::new("b", Aggregation::Or, vec![]));
        assert_eq!(tc.rule_count(), 2);
    }

    #[test]
    fn test_load_yaml() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            r#"
id: capital
prompt: What is the capital of France?
rules:
  - id: answer
    aggregation: OR
    rules:
      - type: contains
        id: paris
        value: Paris
      - type: regex
        id: paris-re
        pattern: "\\bparis\\b"
"#
        )
        .unwrap();

        let tc = TestCase::load(file.path()).unwrap();
        assert_eq!(tc.id, "capital");
        assert_eq!(tc.rules.len(), 1);
        assert_eq!(tc.rules[0].aggregation, Aggregation::Or);
        assert_eq!(tc.rule_count(), 2);
    }

    #[test]
    fn test_load_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"id":"len","prompt":"Be brief","rules":[{{"id":"s","rules":[{{"type":"length","id":"l","max":20}}]}}]}}"#
        )
        .unwrap();

        let tc = TestCase::load(file.path()).unwrap();
        assert_eq!(tc.rules[0].aggregation, Aggregation::And);
        assert!(tc.system_prompt.is_none());
    }
}
