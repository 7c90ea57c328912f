//! Post-hoc batch analytics
//!
//! Summarizes a finished result set: duration and token distributions, cost,
//! rates, per-rule pass rates and how consistently the responder behaved
//! across repetitions.

mod metrics;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::models::{BatchRunResult, RunStatus};
use crate::rules::normalize;

pub use metrics::{percentile, Percentiles, SampleStats};

/// Pass rate of one rule across every graded run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RulePassRate {
    pub rule_set_id: String,
    pub rule_id: String,
    pub passed: u32,
    pub total: u32,
    pub pass_rate: f64,
}

/// Statistical summary of a batch's results
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchAnalytics {
    pub total_runs: u32,
    pub successful_runs: u32,
    pub passed_runs: u32,
    pub error_runs: u32,
    pub cancelled_runs: u32,
    /// Passed runs over all runs, in percent
    pub pass_rate: f64,
    /// Runs without a response over all runs, in percent
    pub error_rate: f64,
    pub mean_retries: f64,
    /// Run durations in milliseconds
    pub duration: SampleStats,
    /// Total tokens per successful run
    pub tokens: SampleStats,
    pub total_cost: f64,
    pub mean_cost: f64,
    /// Share of successful runs that agree with the majority verdict
    pub verdict_consistency: f64,
    /// Share of successful runs whose normalized response is the most common one
    pub response_consistency: f64,
    /// Mean of verdict and response consistency
    pub consistency_score: f64,
    /// Both verdicts were observed
    pub flaky: bool,
    pub rule_pass_rates: Vec<RulePassRate>,
}

impl BatchAnalytics {
    pub fn from_results(results: &[BatchRunResult]) -> Self {
        if results.is_empty() {
            return Self::default();
        }

        let total = results.len() as u32;
        let successful: Vec<&BatchRunResult> = results.iter().filter(|r| r.is_success()).collect();
        let successful_runs = successful.len() as u32;
        let passed_runs = successful.iter().filter(|r| r.passed).count() as u32;
        let cancelled_runs = results
            .iter()
            .filter(|r| r.status == RunStatus::Cancelled)
            .count() as u32;
        let error_runs = total - successful_runs - cancelled_runs;

        let durations: Vec<f64> = results.iter().map(|r| r.duration_ms as f64).collect();
        let tokens: Vec<f64> = results
            .iter()
            .filter_map(|r| r.token_usage.map(|u| u.total_tokens as f64))
            .collect();
        let costs: Vec<f64> = results
            .iter()
            .filter_map(|r| r.cost.map(|c| c.total_cost))
            .collect();
        let total_cost: f64 = costs.iter().sum();

        let verdict_consistency = verdict_consistency(passed_runs, successful_runs);
        let response_consistency = response_consistency(&successful);

        Self {
            total_runs: total,
            successful_runs,
            passed_runs,
            error_runs,
            cancelled_runs,
            pass_rate: percent(passed_runs, total),
            error_rate: percent(total - successful_runs, total),
            mean_retries: results.iter().map(|r| r.retry_count as f64).sum::<f64>() / total as f64,
            duration: SampleStats::from_samples(&durations),
            tokens: SampleStats::from_samples(&tokens),
            total_cost,
            mean_cost: if costs.is_empty() {
                0.0
            } else {
                total_cost / costs.len() as f64
            },
            verdict_consistency,
            response_consistency,
            consistency_score: if successful_runs == 0 {
                0.0
            } else {
                (verdict_consistency + response_consistency) / 2.0
            },
            flaky: passed_runs > 0 && passed_runs < successful_runs,
            rule_pass_rates: rule_pass_rates(&successful),
        }
    }
}

impl fmt::Display for BatchAnalytics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} runs | Pass: {:.1}% | Errors: {:.1}% | Consistency: {:.2}{} | Duration {}",
            self.total_runs,
            self.pass_rate,
            self.error_rate,
            self.consistency_score,
            if self.flaky { " (flaky)" } else { "" },
            self.duration.format_summary("ms")
        )
    }
}

fn percent(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn verdict_consistency(passed: u32, graded: u32) -> f64 {
    if graded == 0 {
        return 0.0;
    }
    passed.max(graded - passed) as f64 / graded as f64
}

fn response_consistency(successful: &[&BatchRunResult]) -> f64 {
    if successful.is_empty() {
        return 0.0;
    }

    let mut counts: HashMap<String, u32> = HashMap::new();
    for result in successful {
        let key = normalize(result.response.as_deref().unwrap_or(""), false, false);
        *counts.entry(key).or_default() += 1;
    }

    let modal = counts.values().copied().max().unwrap_or(0);
    modal as f64 / successful.len() as f64
}

fn rule_pass_rates(successful: &[&BatchRunResult]) -> Vec<RulePassRate> {
    let mut order: Vec<(String, String)> = Vec::new();
    let mut tally: HashMap<(String, String), (u32, u32)> = HashMap::new();

    for result in successful {
        for set in &result.rule_results {
            for rule in &set.results {
                let key = (set.rule_set_id.clone(), rule.rule_id.clone());
                let entry = tally.entry(key.clone()).or_insert_with(|| {
                    order.push(key);
                    (0, 0)
                });
                entry.1 += 1;
                if rule.pass {
                    entry.0 += 1;
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| {
            let (passed, total) = tally.get(&key).copied()?;
            Some(RulePassRate {
                rule_set_id: key.0,
                rule_id: key.1,
                passed,
                total,
                pass_rate: percent(passed, total),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cost, TokenUsage};
    use crate::rules::{validate_rule_sets, Aggregation, Rule, RuleSet};

    fn graded(index: u32, response: &str, duration_ms: u64) -> BatchRunResult {
        let sets = vec![RuleSet::new(
            "answer",
            Aggregation::And,
            vec![Rule::contains("paris", "paris")],
        )];
        let outcome = validate_rule_sets(&sets, response);
        BatchRunResult::success(index, response, duration_ms)
            .with_verdict(outcome.pass, outcome.rule_sets)
            .with_usage(TokenUsage::new(10, 5), Cost::new(0.01, 0.01))
    }

    #[test]
    fn test_empty_results() {
        assert_eq!(BatchAnalytics::from_results(&[]), BatchAnalytics::default());
    }

    #[test]
    fn test_consistent_batch() {
        let results = vec![
            graded(0, "Paris.", 100),
            graded(1, "paris", 200),
            graded(2, "PARIS!", 300),
        ];
        let analytics = BatchAnalytics::from_results(&results);

        assert_eq!(analytics.pass_rate, 100.0);
        assert_eq!(analytics.verdict_consistency, 1.0);
        assert_eq!(analytics.response_consistency, 1.0);
        assert_eq!(analytics.consistency_score, 1.0);
        assert!(!analytics.flaky);
        assert_eq!(analytics.duration.percentiles.p50, 200.0);
        assert_eq!(analytics.tokens.mean, 15.0);
        assert!((analytics.total_cost - 0.06).abs() < 1e-9);
        assert!((analytics.mean_cost - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_flaky_batch() {
        let results = vec![
            graded(0, "Paris", 100),
            graded(1, "Paris", 100),
            graded(2, "Lyon", 100),
            graded(3, "Marseille", 100),
            BatchRunResult::failed(4, "timeout", 100).with_retry_count(2),
        ];
        let analytics = BatchAnalytics::from_results(&results);

        assert!(analytics.flaky);
        assert_eq!(analytics.successful_runs, 4);
        assert_eq!(analytics.error_runs, 1);
        assert_eq!(analytics.pass_rate, 40.0);
        assert_eq!(analytics.error_rate, 20.0);
        assert_eq!(analytics.verdict_consistency, 0.5);
        assert_eq!(analytics.response_consistency, 0.5);
        assert_eq!(analytics.consistency_score, 0.5);
        assert!((analytics.mean_retries - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_rule_pass_rates() {
        let results = vec![graded(0, "Paris", 1), graded(1, "Rome", 1), graded(2, "Paris", 1)];
        let analytics = BatchAnalytics::from_results(&results);

        assert_eq!(analytics.rule_pass_rates.len(), 1);
        let rate = &analytics.rule_pass_rates[0];
        assert_eq!(rate.rule_set_id, "answer");
        assert_eq!(rate.rule_id, "paris");
        assert_eq!((rate.passed, rate.total), (2, 3));
    }

    #[test]
    fn test_all_errors() {
        let results = vec![
            BatchRunResult::failed(0, "boom", 10),
            BatchRunResult::cancelled(1, 5),
        ];
        let analytics = BatchAnalytics::from_results(&results);

        assert_eq!(analytics.error_runs, 1);
        assert_eq!(analytics.cancelled_runs, 1);
        assert_eq!(analytics.error_rate, 100.0);
        assert_eq!(analytics.consistency_score, 0.0);
        assert!(!analytics.flaky);
        assert!(analytics.rule_pass_rates.is_empty());
    }
}
