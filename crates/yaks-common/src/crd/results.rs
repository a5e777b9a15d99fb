//! Test result types
//!
//! The operator reports a suite-shaped `results` block on each Test; the CLI
//! collects one `TestSuite` per source into `TestResults` for the whole run.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Scenario counters
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TestSummary {
    /// Scenarios executed
    #[serde(default)]
    pub total: u32,
    /// Scenarios passed
    #[serde(default)]
    pub passed: u32,
    /// Scenarios failed
    #[serde(default)]
    pub failed: u32,
    /// Scenarios skipped
    #[serde(default)]
    pub skipped: u32,
    /// Scenarios aborted with an error
    #[serde(default)]
    pub errors: u32,
    /// Scenarios pending
    #[serde(default)]
    pub pending: u32,
    /// Scenarios with undefined steps
    #[serde(default)]
    pub undefined: u32,
}

impl TestSummary {
    fn add(&mut self, other: &TestSummary) {
        self.total += other.total;
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.errors += other.errors;
        self.pending += other.pending;
        self.undefined += other.undefined;
    }
}

/// Outcome of one scenario
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// Scenario name
    pub name: String,
    /// Feature the scenario belongs to
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub class_name: String,
    /// Error type, empty on success
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_type: String,
    /// Error message, empty on success
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
}

/// Results for one test source
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TestSuite {
    /// Source the suite was produced from
    #[serde(default)]
    pub name: String,
    /// Scenario counters
    #[serde(default)]
    pub summary: TestSummary,
    /// Individual scenario results
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<TestResult>,
    /// Human-readable failures that are not scenario results
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl TestSuite {
    /// Create an empty suite for a source
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create a suite holding a single error line
    pub fn from_error(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            errors: vec![error.into()],
            ..Default::default()
        }
    }

    /// Merge results reported by the operator into this suite
    pub fn append_results(&mut self, reported: &TestSuite) {
        self.summary.add(&reported.summary);
        self.tests.extend(reported.tests.iter().cloned());
        self.errors.extend(reported.errors.iter().cloned());
    }

    /// Whether the suite recorded an error line or a failed scenario
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || self.tests.iter().any(|t| !t.error_message.is_empty())
    }
}

/// Results of a whole run
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TestResults {
    /// One suite per source
    #[serde(default)]
    pub suites: Vec<TestSuite>,
}

impl TestResults {
    /// Append a suite
    pub fn push(&mut self, suite: TestSuite) {
        self.suites.push(suite);
    }

    /// Whether any suite recorded errors
    pub fn has_errors(&self) -> bool {
        self.suites.iter().any(TestSuite::has_errors)
    }

    /// Counters summed over all suites
    pub fn summary(&self) -> TestSummary {
        let mut total = TestSummary::default();
        for suite in &self.suites {
            total.add(&suite.summary);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_scenario(name: &str) -> TestResult {
        TestResult {
            name: name.to_string(),
            class_name: "hello".to_string(),
            error_type: "AssertionError".to_string(),
            error_message: "expected 200 but was 500".to_string(),
        }
    }

    #[test]
    fn empty_results_have_no_errors() {
        assert!(!TestResults::default().has_errors());
    }

    #[test]
    fn error_line_marks_suite_failed() {
        let mut results = TestResults::default();
        results.push(TestSuite::new("a.feature"));
        results.push(TestSuite::from_error("b.feature", "ResourceError - boom"));

        assert_eq!(results.suites.len(), 2);
        assert!(!results.suites[0].has_errors());
        assert!(results.suites[1].has_errors());
        assert!(results.has_errors());
    }

    #[test]
    fn failed_scenario_marks_suite_failed() {
        let mut suite = TestSuite::new("a.feature");
        suite.append_results(&TestSuite {
            summary: TestSummary {
                total: 2,
                passed: 1,
                failed: 1,
                ..Default::default()
            },
            tests: vec![failed_scenario("say hello")],
            ..Default::default()
        });

        assert!(suite.has_errors());
        assert_eq!(suite.summary.total, 2);
        assert_eq!(suite.name, "a.feature");
    }

    #[test]
    fn summary_sums_all_suites() {
        let mut results = TestResults::default();
        for passed in [1, 2] {
            let mut suite = TestSuite::new("x");
            suite.summary = TestSummary {
                total: passed,
                passed,
                ..Default::default()
            };
            results.push(suite);
        }
        let summary = results.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 3);
        assert_eq!(summary.failed, 0);
    }
}
