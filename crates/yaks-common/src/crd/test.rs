//! Test CRD types
//!
//! A `Test` is addressed by `(namespace, name)`. The CLI owns the spec; the
//! operator owns the status and moves it through the phases below.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::results::TestSuite;

// =============================================================================
// Phase
// =============================================================================

/// Lifecycle phase of a Test
///
/// `None` is the zero value of a freshly created or freshly reset resource.
/// `Updating` is only ever set by the CLI while it re-applies a spec.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum TestPhase {
    /// No phase reported yet
    #[default]
    #[serde(rename = "")]
    None,
    /// Accepted by the operator
    New,
    /// Runtime pod is being scheduled
    Pending,
    /// Test runtime is executing
    Running,
    /// Spec is being re-applied by the CLI; the operator holds off
    Updating,
    /// All scenarios passed
    Passed,
    /// At least one scenario failed
    Failed,
    /// The test could not be executed
    Error,
    /// The resource is being removed
    Deleting,
}

impl TestPhase {
    /// Whether no further operator-driven transition is expected
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Passed | Self::Failed | Self::Error | Self::Deleting
        )
    }

    /// Whether this phase means the test itself did not succeed
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Error)
    }
}

impl std::fmt::Display for TestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::New => write!(f, "New"),
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Updating => write!(f, "Updating"),
            Self::Passed => write!(f, "Passed"),
            Self::Failed => write!(f, "Failed"),
            Self::Error => write!(f, "Error"),
            Self::Deleting => write!(f, "Deleting"),
        }
    }
}

// =============================================================================
// Spec parts
// =============================================================================

/// Source language of a test
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum Language {
    /// Gherkin feature file
    #[default]
    #[serde(rename = "feature")]
    Gherkin,
}

/// The test source itself
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpec {
    /// File name of the source as seen by the runtime
    pub name: String,
    /// Raw source content
    pub content: String,
    /// Source language
    #[serde(default)]
    pub language: Language,
}

/// An additional file mounted next to the test source
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ResourceSpec {
    /// File name
    pub name: String,
    /// File content
    pub content: String,
}

/// Runtime settings file (dependencies, repositories, loggers)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct SettingsSpec {
    /// File name
    pub name: String,
    /// File content
    pub content: String,
}

/// Selenium sidecar
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct SeleniumSpec {
    /// Container image
    pub image: String,
}

/// KubeDock sidecar enabling Testcontainers inside the runtime pod
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct KubeDockSpec {
    /// Container image
    pub image: String,
}

// =============================================================================
// CRD
// =============================================================================

/// Declarative test executed by the YAKS operator
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "yaks.dev",
    version = "v1alpha1",
    kind = "Test",
    plural = "tests",
    namespaced,
    status = "TestStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TestSpec {
    /// Test source
    pub source: SourceSpec,

    /// Additional resources available to the test
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceSpec>,

    /// Runtime settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<SettingsSpec>,

    /// Environment for the runtime container, as `KEY=VALUE`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,

    /// Secret mounted into the runtime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Selenium sidecar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selenium: Option<SeleniumSpec>,

    /// KubeDock sidecar
    #[serde(default, rename = "kubedock", skip_serializing_if = "Option::is_none")]
    pub kube_dock: Option<KubeDockSpec>,

    /// Development mode: the operator exposes a scenario editor instead of running
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dev: bool,
}

/// Status of a Test, owned by the operator
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestStatus {
    /// Current phase
    #[serde(default)]
    pub phase: TestPhase,

    /// Per-scenario results reported by the runtime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<TestSuite>,
}

impl Test {
    /// Current phase, `None` when no status has been reported
    pub fn phase(&self) -> TestPhase {
        self.status
            .as_ref()
            .map(|s| s.phase)
            .unwrap_or_default()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn terminal_phases() {
        for phase in [
            TestPhase::Passed,
            TestPhase::Failed,
            TestPhase::Error,
            TestPhase::Deleting,
        ] {
            assert!(phase.is_terminal(), "{phase} should be terminal");
        }
        for phase in [
            TestPhase::None,
            TestPhase::New,
            TestPhase::Pending,
            TestPhase::Running,
            TestPhase::Updating,
        ] {
            assert!(!phase.is_terminal(), "{phase} should not be terminal");
        }
    }

    #[test]
    fn only_failed_and_error_are_failures() {
        assert!(TestPhase::Failed.is_failure());
        assert!(TestPhase::Error.is_failure());
        assert!(!TestPhase::Passed.is_failure());
        assert!(!TestPhase::Deleting.is_failure());
        assert!(!TestPhase::Running.is_failure());
    }

    #[test]
    fn zero_phase_serializes_as_empty_string() {
        let status = TestStatus::default();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["phase"], "");

        let parsed: TestStatus = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(parsed.phase, TestPhase::None);
    }

    #[test]
    fn phase_parses_from_operator_status() {
        let parsed: TestStatus =
            serde_json::from_value(serde_json::json!({ "phase": "Passed" })).unwrap();
        assert_eq!(parsed.phase, TestPhase::Passed);
    }

    #[test]
    fn spec_omits_unset_sidecars_and_dev_flag() {
        let spec = TestSpec {
            source: SourceSpec {
                name: "hello.feature".to_string(),
                content: "Feature: hello".to_string(),
                language: Language::Gherkin,
            },
            ..Default::default()
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["source"]["language"], "feature");
        assert!(json.get("selenium").is_none());
        assert!(json.get("kubedock").is_none());
        assert!(json.get("dev").is_none());
        assert!(json.get("env").is_none());
    }

    #[test]
    fn test_kind_and_group() {
        assert_eq!(Test::kind(&()), "Test");
        assert_eq!(Test::group(&()), "yaks.dev");
        assert_eq!(Test::api_version(&()), "yaks.dev/v1alpha1");
    }

    #[test]
    fn phase_defaults_to_none_without_status() {
        let test = Test::new("hello", TestSpec::default());
        assert_eq!(test.phase(), TestPhase::None);
    }
}
