//! Operator bootstrap for temporary namespaces
//!
//! A temporary namespace needs an operator reconciling its tests. A global
//! instance anywhere on the cluster already does; otherwise a namespace-local
//! operator is installed next to the tests.

use minijinja::{context, Environment};
use tracing::{debug, info, instrument};
use yaks_common::OPERATOR_NAME;

use crate::client::{ClusterFlavor, TestClient};
use crate::config::RunConfig;
use crate::console::Console;
use crate::{Error, Result};

/// Image of the operator when none is given
pub const DEFAULT_OPERATOR_IMAGE: &str = "yaks/yaks:0.0.1";

/// ServiceAccount, Role, RoleBinding and Deployment of a namespace-local operator
const OPERATOR_TEMPLATE: &str = include_str!("../../../templates/operator.yaml");

/// Render the operator manifests for a namespace
pub fn render_operator_manifests(
    namespace: &str,
    flavor: ClusterFlavor,
    image: &str,
) -> Result<String> {
    Environment::new()
        .render_str(
            OPERATOR_TEMPLATE,
            context! {
                namespace => namespace,
                image => image,
                openshift => flavor == ClusterFlavor::ProjectBased,
            },
        )
        .map_err(|e| Error::config(format!("failed to render operator manifests: {}", e)))
}

pub struct OperatorBootstrapper<'a, C: ?Sized> {
    client: &'a C,
    console: &'a Console,
    image: &'a str,
    /// Namespace searched first for an existing instance
    default_namespace: &'a str,
}

impl<'a, C: TestClient + ?Sized> OperatorBootstrapper<'a, C> {
    pub fn new(
        client: &'a C,
        console: &'a Console,
        image: &'a str,
        default_namespace: &'a str,
    ) -> Self {
        Self {
            client,
            console,
            image,
            default_namespace,
        }
    }

    /// Make sure an operator reconciles tests in the configured namespace
    #[instrument(skip_all, fields(namespace = %config.namespace()))]
    pub async fn ensure_operator(&self, config: &RunConfig, flavor: ClusterFlavor) -> Result<()> {
        if self.global_instance_available().await? {
            debug!("global operator instance manages the namespace");
            return Ok(());
        }

        let namespace = config.namespace();
        self.client
            .install_operator(namespace, flavor, self.image)
            .await?;

        for role in &config.config.operator.roles {
            let path = config.resolve_path(role);
            let manifest = std::fs::read_to_string(&path).map_err(|e| {
                Error::config(format!(
                    "failed to read operator role {}: {}",
                    path.display(),
                    e
                ))
            })?;
            self.client.apply_role_manifest(namespace, &manifest).await?;
            debug!(role = %path.display(), "applied operator role");
        }

        info!(namespace = %namespace, "operator ready");
        Ok(())
    }

    async fn global_instance_available(&self) -> Result<bool> {
        match self
            .client
            .get_instance(self.default_namespace, OPERATOR_NAME)
            .await
        {
            Ok(instance) => Ok(instance.is_global()),
            Err(e) if e.is_not_found() => {
                let instances = self.client.list_instances().await?;
                if instances.iter().any(|instance| instance.is_global()) {
                    return Ok(true);
                }
                if instances.is_empty() {
                    self.console.println(
                        "Unable to find existing YAKS instance - adding new operator instance to temporary namespace by default",
                    );
                }
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
