//! Instance CRD types
//!
//! An `Instance` named `yaks` marks a deployed operator. A global instance
//! reconciles Tests in every namespace.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of cluster an operator was installed on
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ClusterType {
    /// Plain Kubernetes
    #[default]
    Kubernetes,
    /// OpenShift (projects instead of bare namespaces)
    OpenShift,
}

impl std::fmt::Display for ClusterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kubernetes => write!(f, "Kubernetes"),
            Self::OpenShift => write!(f, "OpenShift"),
        }
    }
}

/// Operator settings of an instance
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperatorSpec {
    /// Whether the operator watches all namespaces
    #[serde(default)]
    pub global: bool,

    /// Namespace the operator runs in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Cluster type the operator was installed for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_type: Option<ClusterType>,
}

/// Deployed YAKS operator
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "yaks.dev",
    version = "v1alpha1",
    kind = "Instance",
    plural = "instances",
    namespaced,
    status = "InstanceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    /// Operator settings
    #[serde(default)]
    pub operator: OperatorSpec,
}

/// Status of an instance
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    /// Operator version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Instance {
    /// Whether this instance reconciles Tests in every namespace
    pub fn is_global(&self) -> bool {
        self.spec.operator.global
    }
}
