//! Output formatters for batch results
//!
//! Provides JSON, table and summary output formats.

use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::analytics::BatchAnalytics;
use crate::models::{BatchRunResult, BatchRunState, BatchStatistics, RunStatus};
use crate::results::SessionSummary;
use crate::rules::ValidationOutcome;
use crate::utils::timer::format_duration_ms;

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Everything reported about one finished batch
#[derive(Clone, Debug, Serialize)]
pub struct BatchReport<'a> {
    pub test_case_id: &'a str,
    pub provider_id: &'a str,
    pub model: &'a str,
    pub state: &'a BatchRunState,
    pub statistics: BatchStatistics,
    pub analytics: BatchAnalytics,
}

impl<'a> BatchReport<'a> {
    pub fn new(test_case_id: &'a str, provider_id: &'a str, model: &'a str, state: &'a BatchRunState) -> Self {
        Self {
            test_case_id,
            provider_id,
            model,
            state,
            statistics: state.statistics(),
            analytics: BatchAnalytics::from_results(&state.results),
        }
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    fn to_json<T: Serialize + ?Sized>(&self, value: &T) -> String {
        if self.format == OutputFormat::JsonPretty {
            serde_json::to_string_pretty(value).unwrap_or_default()
        } else {
            serde_json::to_string(value).unwrap_or_default()
        }
    }

    fn paint(&self, text: &str, color: u8) -> String {
        if self.colorize {
            format!("\x1b[{color}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn rate(&self, rate: f64) -> String {
        let text = format!("{rate:5.1}%");
        if rate >= 90.0 {
            self.paint(&text, 32)
        } else if rate >= 50.0 {
            self.paint(&text, 33)
        } else {
            self.paint(&text, 31)
        }
    }

    /// Format a single run as it completes
    pub fn format_result(&self, result: &BatchRunResult) -> String {
        match self.format {
            OutputFormat::Json | OutputFormat::JsonPretty => self.to_json(result),
            OutputFormat::Table => self.format_result_row(result),
            OutputFormat::Summary => result.to_string(),
        }
    }

    fn verdict(&self, result: &BatchRunResult) -> String {
        match result.status {
            RunStatus::Success if result.passed => self.paint("✓ PASS", 32),
            RunStatus::Success => self.paint("✗ FAIL", 31),
            RunStatus::Failed => self.paint("! ERROR", 31),
            RunStatus::Cancelled => self.paint("○ CANCELLED", 33),
        }
    }

    fn format_result_row(&self, result: &BatchRunResult) -> String {
        let tokens = result
            .token_usage
            .map(|u| u.total_tokens.to_string())
            .unwrap_or_else(|| "-".to_string());
        let detail = match (&result.error, &result.response) {
            (Some(err), _) => err.clone(),
            (None, Some(response)) => preview(response, 40),
            (None, None) => String::new(),
        };

        format!(
            "{:>4}  {}  {:>8}  {:>6}  {:>3}  {}",
            result.run_index + 1,
            self.verdict(result),
            format_duration_ms(result.duration_ms),
            tokens,
            result.retry_count,
            detail
        )
    }

    /// Format a finished batch
    pub fn format_batch(&self, report: &BatchReport<'_>) -> String {
        match self.format {
            OutputFormat::Json | OutputFormat::JsonPretty => self.to_json(report),
            OutputFormat::Table => self.format_batch_table(report),
            OutputFormat::Summary => self.format_batch_brief(report),
        }
    }

    fn format_batch_table(&self, report: &BatchReport<'_>) -> String {
        let state = report.state;
        let stats = &report.statistics;
        let mut output = String::new();

        output.push_str("\n╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str(&format!(
            "║  {:58}  ║\n",
            format!("{} on {}/{}", report.test_case_id, report.provider_id, report.model)
        ));
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        output.push_str(" Run   Verdict       Duration  Tokens  Rty  Detail\n");

        for result in &state.results {
            output.push_str(&format!(" {}\n", self.format_result_row(result)));
        }

        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        output.push_str(&format!(
            "  Status: {} | Runs: {}/{} | Elapsed: {}\n",
            state.status(),
            stats.completed_runs,
            stats.total_runs,
            format_duration_ms(state.elapsed_ms())
        ));
        output.push_str(&format!(
            "  Pass: {} | Fail: {} | Error: {} | Pass Rate: {}\n",
            self.paint(&stats.passed_runs.to_string(), 32),
            stats.failed_runs,
            stats.error_runs,
            self.rate(stats.pass_rate)
        ));
        output.push_str(&format!(
            "  Avg: {:.0}ms | Tokens: {} | Cost: ${:.4}\n",
            stats.avg_duration_ms, stats.total_tokens, stats.total_cost
        ));
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        output.push_str(&self.format_analytics_table(&report.analytics));

        if !state.errors.is_empty() {
            output.push_str("\n Errors:\n");
            for error in &state.errors {
                output.push_str(&format!("   - {error}\n"));
            }
        }

        output
    }

    fn format_batch_brief(&self, report: &BatchReport<'_>) -> String {
        let stats = &report.statistics;
        format!(
            "{} on {}/{} - {}: {}/{} passed ({:.1}%), {} errors, consistency {:.2}{} in {}",
            report.test_case_id,
            report.provider_id,
            report.model,
            report.state.status(),
            stats.passed_runs,
            stats.completed_runs,
            stats.pass_rate,
            stats.error_runs,
            report.analytics.consistency_score,
            if report.analytics.flaky { " (flaky)" } else { "" },
            format_duration_ms(report.state.elapsed_ms())
        )
    }

    /// Format batch analytics on their own
    pub fn format_analytics(&self, analytics: &BatchAnalytics) -> String {
        match self.format {
            OutputFormat::Json | OutputFormat::JsonPretty => self.to_json(analytics),
            OutputFormat::Table => self.format_analytics_table(analytics),
            OutputFormat::Summary => analytics.to_string(),
        }
    }

    fn format_analytics_table(&self, analytics: &BatchAnalytics) -> String {
        let mut output = String::new();

        output.push_str("\n Analytics\n");
        output.push_str(" ───────────────────────────────────────────────────────────\n");
        output.push_str(&format!(" Duration: {}\n", analytics.duration.format_summary("ms")));
        if analytics.tokens.count > 0 {
            output.push_str(&format!(" Tokens:   {}\n", analytics.tokens.format_summary("")));
        }
        output.push_str(&format!(
            " Consistency: {:.2} (verdict {:.2}, response {:.2}){}\n",
            analytics.consistency_score,
            analytics.verdict_consistency,
            analytics.response_consistency,
            if analytics.flaky {
                self.paint(" flaky", 33)
            } else {
                String::new()
            }
        ));
        output.push_str(&format!(
            " Error Rate: {:.1}% | Mean Retries: {:.2} | Mean Cost: ${:.5}\n",
            analytics.error_rate, analytics.mean_retries, analytics.mean_cost
        ));

        if !analytics.rule_pass_rates.is_empty() {
            output.push_str("\n Rule Pass Rates:\n");
            for rule in &analytics.rule_pass_rates {
                let bar_len = ((rule.pass_rate / 5.0) as usize).min(20);
                output.push_str(&format!(
                    "   {:24} {}{} {}\n",
                    format!("{}/{}", rule.rule_set_id, rule.rule_id),
                    "█".repeat(bar_len),
                    "░".repeat(20 - bar_len),
                    self.rate(rule.pass_rate)
                ));
            }
        }

        output
    }

    /// Format a one-off validation of a response
    pub fn format_validation(&self, outcome: &ValidationOutcome) -> String {
        match self.format {
            OutputFormat::Json | OutputFormat::JsonPretty => self.to_json(outcome),
            OutputFormat::Summary => {
                if outcome.pass {
                    "PASS".to_string()
                } else {
                    format!("FAIL: {}", outcome.failures().join("; "))
                }
            }
            OutputFormat::Table => {
                let mut output = String::new();
                for set in &outcome.rule_sets {
                    let mark = if set.pass {
                        self.paint("✓", 32)
                    } else {
                        self.paint("✗", 31)
                    };
                    output.push_str(&format!("{} {}: {}\n", mark, set.rule_set_id, set.message));
                    for rule in &set.results {
                        let mark = if rule.pass {
                            self.paint("✓", 32)
                        } else {
                            self.paint("✗", 31)
                        };
                        output.push_str(&format!("    {} {}: {}\n", mark, rule.rule_id, rule.message));
                    }
                }
                let verdict = if outcome.pass {
                    self.paint("PASS", 32)
                } else {
                    self.paint("FAIL", 31)
                };
                output.push_str(&format!("Overall: {verdict}\n"));
                output
            }
        }
    }

    /// Format the stored session list
    pub fn format_sessions(&self, sessions: &[SessionSummary]) -> String {
        if matches!(self.format, OutputFormat::Json | OutputFormat::JsonPretty) {
            return self.to_json(sessions);
        }

        if sessions.is_empty() {
            return "No saved sessions".to_string();
        }

        let mut output = String::new();
        output.push_str(
            "┌──────────────────────┬──────────────────┬──────────────────┬───────────┬─────────┬──────────┐\n",
        );
        output.push_str(
            "│ Session              │ Provider         │ Test Case        │ Status    │ Runs    │ Rate     │\n",
        );
        output.push_str(
            "├──────────────────────┼──────────────────┼──────────────────┼───────────┼─────────┼──────────┤\n",
        );
        for s in sessions {
            output.push_str(&format!(
                "│ {:20} │ {:16} │ {:16} │ {:9} │ {:>3}/{:<3} │ {:>8} │\n",
                s.id,
                truncate(&s.provider_id, 16),
                truncate(&s.test_case_id, 16),
                s.status.to_string(),
                s.completed_runs,
                s.total_runs,
                format!("{:.1}%", s.pass_rate)
            ));
        }
        output.push_str(
            "└──────────────────────┴──────────────────┴──────────────────┴───────────┴─────────┴──────────┘\n",
        );
        output
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

/// First line of a response, shortened for table rows
fn preview(text: &str, max: usize) -> String {
    truncate(text.lines().next().unwrap_or("").trim(), max)
}

/// Write a batch report to a file
pub fn write_report_to_file(
    path: impl AsRef<Path>,
    report: &BatchReport<'_>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let formatter = ResultFormatter::new(format).no_color();
    let content = formatter.format_batch(report);

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{validate_rule_sets, Aggregation, Rule, RuleSet};

    fn finished_state() -> BatchRunState {
        BatchRunState {
            completed_runs: 2,
            total_runs: 2,
            results: vec![
                BatchRunResult::success(0, "Hello there\nsecond line", 120).with_verdict(true, vec![]),
                BatchRunResult::failed(1, "HTTP 500: oops", 30).with_retry_count(1),
            ],
            errors: vec!["Run 2: HTTP 500: oops".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("TABLE"), Some(OutputFormat::Table));
        assert_eq!(OutputFormat::from_str("csv"), None);
    }

    #[test]
    fn test_formatter_creation() {
        let formatter = ResultFormatter::new(OutputFormat::Json).no_color();
        assert_eq!(formatter.format(), OutputFormat::Json);
        assert!(!formatter.colorize);
    }

    #[test]
    fn test_format_result_row() {
        let formatter = ResultFormatter::new(OutputFormat::Table).no_color();
        let state = finished_state();

        let row = formatter.format_result(&state.results[0]);
        assert!(row.contains("✓ PASS"));
        assert!(row.contains("Hello there"));
        assert!(!row.contains("second line"));

        let row = formatter.format_result(&state.results[1]);
        assert!(row.contains("! ERROR"));
        assert!(row.contains("HTTP 500"));
    }

    #[test]
    fn test_format_batch_table() {
        let state = finished_state();
        let report = BatchReport::new("greeting", "echo", "m", &state);
        let output = ResultFormatter::new(OutputFormat::Table)
            .no_color()
            .format_batch(&report);

        assert!(output.contains("greeting on echo/m"));
        assert!(output.contains("Runs: 2/2"));
        assert!(output.contains("Pass Rate:  50.0%"));
        assert!(output.contains("Run 2: HTTP 500: oops"));
    }

    #[test]
    fn test_format_batch_json() {
        let state = finished_state();
        let report = BatchReport::new("greeting", "echo", "m", &state);
        let json = ResultFormatter::new(OutputFormat::Json).format_batch(&report);

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["test_case_id"], "greeting");
        assert_eq!(value["statistics"]["passed_runs"], 1);
        assert_eq!(value["state"]["results"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_format_validation_summary() {
        let sets = vec![RuleSet::new(
            "shape",
            Aggregation::And,
            vec![Rule::length("short", None, Some(3))],
        )];
        let outcome = validate_rule_sets(&sets, "too long");
        let output = ResultFormatter::new(OutputFormat::Summary).format_validation(&outcome);
        assert!(output.starts_with("FAIL: shape/short"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer string", 6), "a lon…");
    }
}
