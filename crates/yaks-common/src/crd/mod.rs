//! Custom Resource Definitions for YAKS
//!
//! The `Test` resource is submitted by the CLI and driven to a terminal phase
//! by the operator; the `Instance` resource describes a deployed operator.

mod instance;
mod results;
mod test;

pub use instance::{ClusterType, Instance, InstanceSpec, InstanceStatus, OperatorSpec};
pub use results::{TestResult, TestResults, TestSuite, TestSummary};
pub use test::{
    KubeDockSpec, Language, ResourceSpec, SeleniumSpec, SettingsSpec, SourceSpec, Test, TestPhase,
    TestSpec, TestStatus,
};
