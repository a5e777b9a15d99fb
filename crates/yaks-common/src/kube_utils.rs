//! Shared Kubernetes utilities using kube-rs
//!
//! Manifest parsing and server-side apply for the operator resources the CLI
//! installs, plus client construction.

use std::path::Path;
use std::time::Duration;

use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use serde::Deserialize;
use tracing::trace;

use crate::{Error, FIELD_MANAGER};

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from an optional kubeconfig path.
///
/// Without a path the configuration is inferred (`KUBECONFIG`, `~/.kube/config`
/// or in-cluster service account).
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig {}: {}", path.display(), e),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "create_client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
        })?,
    };
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}

/// API status reason and HTTP code of a kube error, if it came from the API server
pub fn api_error_status(err: &kube::Error) -> Option<(&str, u16)> {
    match err {
        kube::Error::Api(response) => Some((response.reason.as_str(), response.code)),
        _ => None,
    }
}

/// Parse apiVersion into (group, version)
///
/// # Examples
/// ```
/// use yaks_common::kube_utils::parse_api_version;
///
/// let (group, version) = parse_api_version("apps/v1");
/// assert_eq!(group, "apps");
/// assert_eq!(version, "v1");
///
/// let (group, version) = parse_api_version("v1");
/// assert_eq!(group, "");
/// assert_eq!(version, "v1");
/// ```
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Pluralize a Kubernetes resource kind
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// Build an ApiResource from an apiVersion string and kind
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Parsed manifest metadata for applying to Kubernetes
#[derive(Debug, Clone)]
pub struct ManifestMetadata {
    /// The parsed JSON value
    pub value: serde_json::Value,
    /// Resource name
    pub name: String,
    /// Optional namespace
    pub namespace: Option<String>,
    /// API resource definition
    pub api_resource: ApiResource,
}

/// Split a multi-document YAML string into manifests, skipping empty documents
pub fn parse_manifests(input: &str) -> Result<Vec<ManifestMetadata>, Error> {
    let mut manifests = Vec::new();
    for document in serde_yaml::Deserializer::from_str(input) {
        let value = serde_json::Value::deserialize(document).map_err(|e| {
            Error::internal_with_context(
                "parse_manifests",
                format!("failed to parse manifest as YAML: {}", e),
            )
        })?;
        if value.is_null() {
            continue;
        }
        manifests.push(manifest_metadata(value)?);
    }
    Ok(manifests)
}

fn manifest_metadata(value: serde_json::Value) -> Result<ManifestMetadata, Error> {
    let api_version = value
        .get("apiVersion")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            Error::internal_with_context("parse_manifest", "manifest missing apiVersion")
        })?
        .to_string();

    let kind = value
        .get("kind")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::internal_with_context("parse_manifest", "manifest missing kind"))?
        .to_string();

    let name = value
        .pointer("/metadata/name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            Error::internal_with_context("parse_manifest", "manifest missing metadata.name")
        })?
        .to_string();

    let namespace = value
        .pointer("/metadata/namespace")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let api_resource = build_api_resource(&api_version, &kind);

    Ok(ManifestMetadata {
        value,
        name,
        namespace,
        api_resource,
    })
}

/// Kinds that are cluster-scoped among the ones the CLI applies
fn is_cluster_scoped(kind: &str) -> bool {
    matches!(
        kind,
        "Namespace"
            | "CustomResourceDefinition"
            | "ClusterRole"
            | "ClusterRoleBinding"
            | "ProjectRequest"
            | "Project"
    )
}

/// Apply a parsed manifest using server-side apply.
///
/// Namespaced kinds are placed into `namespace` when given, overriding any
/// namespace in the manifest. Applying is idempotent.
pub async fn apply_manifest(
    client: &Client,
    manifest: &ManifestMetadata,
    namespace: Option<&str>,
) -> Result<(), Error> {
    let params = PatchParams::apply(FIELD_MANAGER).force();
    let kind = &manifest.api_resource.kind;

    let mut value = manifest.value.clone();
    let target_ns = if is_cluster_scoped(kind) {
        None
    } else {
        namespace.map(str::to_string).or(manifest.namespace.clone())
    };
    if let (Some(ns), Some(meta)) = (&target_ns, value.get_mut("metadata")) {
        meta["namespace"] = serde_json::Value::String(ns.clone());
    }

    let api: Api<DynamicObject> = match &target_ns {
        Some(ns) => Api::namespaced_with(client.clone(), ns, &manifest.api_resource),
        None => Api::all_with(client.clone(), &manifest.api_resource),
    };

    api.patch(&manifest.name, &params, &Patch::Apply(&value))
        .await
        .map_err(|e| {
            Error::internal_with_context(
                "apply_manifest",
                format!("failed to apply {}/{}: {}", kind, manifest.name, e),
            )
        })?;

    trace!(kind = %kind, name = %manifest.name, namespace = ?target_ns, "applied manifest");
    Ok(())
}
