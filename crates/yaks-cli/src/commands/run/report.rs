//! Run summary and report files

use std::path::{Path, PathBuf};

use tracing::debug;
use yaks_common::crd::TestResults;

use crate::console::Console;
use crate::Result;

/// Directory report files are written to
pub const REPORT_DIR: &str = "_output";

/// File name of the JSON report
pub const JSON_REPORT_FILE: &str = "yaks-results.json";

/// Print totals followed by every suite error and failed scenario
pub fn print_summary(console: &Console, results: &TestResults) {
    let summary = results.summary();

    console.println("Test results:");
    console.println(format!(
        "Total: {}, Passed: {}, Failed: {}, Skipped: {}, Errors: {}, Pending: {}, Undefined: {}",
        summary.total,
        summary.passed,
        summary.failed,
        summary.skipped,
        summary.errors,
        summary.pending,
        summary.undefined
    ));

    for suite in results.suites.iter().filter(|suite| suite.has_errors()) {
        console.println(format!("{}:", suite.name));
        for error in &suite.errors {
            console.println(format!("\t{}", error));
        }
        for failed in suite.tests.iter().filter(|t| !t.error_message.is_empty()) {
            console.println(format!("\t{}: {}", failed.name, failed.error_message));
        }
    }
}

/// Write the results as pretty JSON into `dir`, returning the file path
pub fn write_json_report(results: &TestResults, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(JSON_REPORT_FILE);
    std::fs::write(&path, serde_json::to_string_pretty(results)?)?;
    debug!(path = %path.display(), "wrote json report");
    Ok(path)
}
