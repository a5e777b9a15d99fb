//! Temporary namespace lifecycle

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::client::{ClusterFlavor, TestClient};
use crate::config::RunConfig;
use crate::console::Console;
use crate::Result;

/// Prefix of generated namespace names
pub const TEMP_NAMESPACE_PREFIX: &str = "yaks-";

/// A namespace created for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceHandle {
    pub name: String,
    /// Flavor detected when the namespace was created, reused for removal
    pub flavor: ClusterFlavor,
}

/// Unique name for a temporary namespace
pub fn temporary_namespace_name() -> String {
    format!("{}{}", TEMP_NAMESPACE_PREFIX, Uuid::new_v4())
}

pub struct NamespaceManager<'a, C: ?Sized> {
    client: &'a C,
    console: &'a Console,
}

impl<'a, C: TestClient + ?Sized> NamespaceManager<'a, C> {
    pub fn new(client: &'a C, console: &'a Console) -> Self {
        Self { client, console }
    }

    /// Create a temporary namespace if the configuration asks for one.
    ///
    /// On success the configuration's namespace name points at the new
    /// namespace. Returns `None` when the configuration is not temporary.
    #[instrument(skip_all)]
    pub async fn ensure_namespace(&self, config: &mut RunConfig) -> Result<Option<NamespaceHandle>> {
        if !config.config.namespace.temporary {
            return Ok(None);
        }

        let flavor = self.client.detect_cluster_flavor().await?;
        let name = temporary_namespace_name();

        self.console
            .println(format!("Creating new test namespace {}", name));
        self.client.create_namespace(&name, flavor).await?;
        info!(namespace = %name, ?flavor, "created temporary namespace");

        config.config.namespace.name = name.clone();
        Ok(Some(NamespaceHandle { name, flavor }))
    }

    /// Delete a temporary namespace; failures are reported, never raised
    #[instrument(skip(self), fields(namespace = %handle.name))]
    pub async fn remove_namespace(&self, handle: &NamespaceHandle) {
        match self.client.delete_namespace(&handle.name, handle.flavor).await {
            Ok(()) => {
                self.console
                    .println(format!("AutoRemove namespace {}", handle.name));
            }
            Err(e) => {
                warn!(error = %e, "failed to remove temporary namespace");
                self.console.eprintln(format!(
                    "WARN: Failed to AutoRemove namespace {}",
                    handle.name
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockTestClient;
    use crate::Error;
    use std::collections::HashSet;

    fn temporary_config() -> RunConfig {
        let mut config = RunConfig::default();
        config.config.namespace.temporary = true;
        config
    }

    #[test]
    fn generated_names_are_distinct_and_prefixed() {
        let names: HashSet<String> = (0..100).map(|_| temporary_namespace_name()).collect();
        assert_eq!(names.len(), 100);
        assert!(names.iter().all(|n| n.starts_with(TEMP_NAMESPACE_PREFIX)));
        assert!(names.iter().all(|n| n.len() <= 63));
    }

    #[tokio::test]
    async fn non_temporary_config_is_left_alone() {
        let client = MockTestClient::new();
        let (console, _) = Console::captured();
        let mut config = RunConfig::default();
        config.config.namespace.name = "default".to_string();

        let handle = NamespaceManager::new(&client, &console)
            .ensure_namespace(&mut config)
            .await
            .unwrap();

        assert!(handle.is_none());
        assert_eq!(config.namespace(), "default");
    }

    #[tokio::test]
    async fn temporary_namespace_uses_detected_flavor() {
        let mut client = MockTestClient::new();
        client
            .expect_detect_cluster_flavor()
            .times(1)
            .returning(|| Ok(ClusterFlavor::ProjectBased));
        client
            .expect_create_namespace()
            .withf(|name, flavor| {
                name.starts_with("yaks-") && *flavor == ClusterFlavor::ProjectBased
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let (console, output) = Console::captured();
        let mut config = temporary_config();

        let handle = NamespaceManager::new(&client, &console)
            .ensure_namespace(&mut config)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(config.namespace(), handle.name);
        assert_eq!(handle.flavor, ClusterFlavor::ProjectBased);
        assert!(output.contents().contains("Creating new test namespace yaks-"));
    }

    #[tokio::test]
    async fn creation_failure_aborts() {
        let mut client = MockTestClient::new();
        client
            .expect_detect_cluster_flavor()
            .returning(|| Ok(ClusterFlavor::Generic));
        client.expect_create_namespace().returning(|name, _| {
            Err(Error::resource("Namespace", name, "Forbidden", "not allowed"))
        });
        let (console, _) = Console::captured();
        let mut config = temporary_config();

        let err = NamespaceManager::new(&client, &console)
            .ensure_namespace(&mut config)
            .await
            .unwrap_err();

        assert_eq!(err.reason(), "Forbidden");
        assert!(config.namespace().is_empty());
    }

    #[tokio::test]
    async fn removal_failure_is_only_a_warning() {
        let mut client = MockTestClient::new();
        client
            .expect_delete_namespace()
            .withf(|name, flavor| name == "yaks-1" && *flavor == ClusterFlavor::Generic)
            .returning(|name, _| Err(Error::resource("Namespace", name, "NotFound", "gone")));
        let (console, output) = Console::captured();
        let handle = NamespaceHandle {
            name: "yaks-1".to_string(),
            flavor: ClusterFlavor::Generic,
        };

        NamespaceManager::new(&client, &console)
            .remove_namespace(&handle)
            .await;

        assert!(output
            .contents()
            .contains("WARN: Failed to AutoRemove namespace yaks-1"));
    }
}
