//! Output formatting module
//!
//! Provides various output formats for batch results.

mod formatter;
mod progress;

pub use formatter::{write_report_to_file, BatchReport, OutputFormat, ResultFormatter};
pub use progress::follow_progress;
