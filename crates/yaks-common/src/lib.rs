//! Common types for YAKS: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod duration;
pub mod error;
pub mod kube_utils;
pub mod sanitize;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Name of the operator `Instance` and of its namespaced resources
pub const OPERATOR_NAME: &str = "yaks";

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "yaks";

/// Label carried by the pods running a test, valued with the test name
pub const TEST_LABEL: &str = "yaks.citrusframework.org/test";

/// Timeout applied to tests and hook steps when none is configured
pub const DEFAULT_TIMEOUT: &str = "30m";
