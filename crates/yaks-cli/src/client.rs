//! Cluster access for the run command
//!
//! Every cluster interaction of a run goes through [`TestClient`], so the
//! orchestration can be exercised against a mock. [`KubeTestClient`] is the
//! kube-rs implementation.

use std::time::Duration;

use async_trait::async_trait;
use futures::{AsyncBufReadExt, TryStreamExt};
use k8s_openapi::api::core::v1::{Namespace, Pod};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{
    Api, DeleteParams, DynamicObject, ListParams, LogParams, Patch, PatchParams, PostParams,
};
use kube::{Client, CustomResourceExt, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use yaks_common::crd::{ClusterType, Instance, InstanceSpec, OperatorSpec, Test};
use yaks_common::kube_utils::{apply_manifest, build_api_resource, parse_manifests};
use yaks_common::{FIELD_MANAGER, OPERATOR_NAME, TEST_LABEL};

use crate::commands::run::operator::render_operator_manifests;
use crate::console::Console;
use crate::{Error, Result};

const PROJECT_API_GROUP: &str = "project.openshift.io";
const PROJECT_API_VERSION: &str = "project.openshift.io/v1";
const ROUTE_API_VERSION: &str = "route.openshift.io/v1";

/// Interval between lookups of the pod running a test
const LOG_POD_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How namespaces are created and removed on a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterFlavor {
    /// Plain `Namespace` objects
    Generic,
    /// `ProjectRequest` to create, `Project` to delete
    ProjectBased,
}

impl ClusterFlavor {
    pub fn cluster_type(self) -> ClusterType {
        match self {
            ClusterFlavor::Generic => ClusterType::Kubernetes,
            ClusterFlavor::ProjectBased => ClusterType::OpenShift,
        }
    }
}

/// Cluster operations used by a test run
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TestClient: Send + Sync {
    /// Check whether the control plane supports projects
    async fn detect_cluster_flavor(&self) -> Result<ClusterFlavor>;

    async fn create_namespace(&self, name: &str, flavor: ClusterFlavor) -> Result<()>;

    async fn delete_namespace(&self, name: &str, flavor: ClusterFlavor) -> Result<()>;

    /// Get an operator instance, failing with a `NotFound` resource error if absent
    async fn get_instance(&self, namespace: &str, name: &str) -> Result<Instance>;

    /// Operator instances across all namespaces
    async fn list_instances(&self) -> Result<Vec<Instance>>;

    /// Install CRDs and a namespace-local operator, idempotently
    async fn install_operator(
        &self,
        namespace: &str,
        flavor: ClusterFlavor,
        image: &str,
    ) -> Result<()>;

    /// Apply a (multi-document) role manifest into a namespace
    async fn apply_role_manifest(&self, namespace: &str, manifest: &str) -> Result<()>;

    async fn create_test(&self, test: &Test) -> Result<Test>;

    async fn get_test(&self, namespace: &str, name: &str) -> Result<Test>;

    /// Replace spec and metadata; the resource version in `test` guards the write
    async fn replace_test(&self, test: &Test) -> Result<Test>;

    async fn replace_test_status(&self, test: &Test) -> Result<Test>;

    /// Host of the route exposing a dev mode test, once admitted
    async fn route_host(&self, namespace: &str, name: &str) -> Result<Option<String>>;

    /// Stream the logs of the pod running a test until cancelled
    async fn follow_logs(
        &self,
        namespace: &str,
        name: &str,
        console: Console,
        cancel: CancellationToken,
    ) -> Result<()>;
}

/// Real Kubernetes client implementation
pub struct KubeTestClient {
    client: Client,
}

impl KubeTestClient {
    /// Create a new KubeTestClient wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn tests(&self, test: &Test) -> Api<Test> {
        let namespace = test.namespace().unwrap_or_default();
        Api::namespaced(self.client.clone(), &namespace)
    }

    async fn install_crds(&self) -> Result<()> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let params = PatchParams::apply(FIELD_MANAGER).force();
        for crd in [Test::crd(), Instance::crd()] {
            let name = crd.name_any();
            api.patch(&name, &params, &Patch::Apply(&crd))
                .await
                .map_err(|e| Error::from_kube("CustomResourceDefinition", &name, e))?;
            debug!(crd = %name, "applied CRD");
        }
        Ok(())
    }

    async fn running_pod(&self, pods: &Api<Pod>, name: &str) -> Result<Option<String>> {
        let selector = format!("{}={}", TEST_LABEL, name);
        let list = pods
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(|e| Error::from_kube("Pod", name, e))?;
        Ok(list
            .items
            .into_iter()
            .find(|pod| {
                let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
                matches!(phase, Some("Running" | "Succeeded" | "Failed"))
            })
            .map(|pod| pod.name_any()))
    }
}

#[async_trait]
impl TestClient for KubeTestClient {
    async fn detect_cluster_flavor(&self) -> Result<ClusterFlavor> {
        let groups = self
            .client
            .list_api_groups()
            .await
            .map_err(|e| Error::from_kube("APIGroupList", "", e))?;
        if groups.groups.iter().any(|g| g.name == PROJECT_API_GROUP) {
            Ok(ClusterFlavor::ProjectBased)
        } else {
            Ok(ClusterFlavor::Generic)
        }
    }

    async fn create_namespace(&self, name: &str, flavor: ClusterFlavor) -> Result<()> {
        match flavor {
            ClusterFlavor::Generic => {
                let api: Api<Namespace> = Api::all(self.client.clone());
                let mut namespace = Namespace::default();
                namespace.metadata.name = Some(name.to_string());
                api.create(&PostParams::default(), &namespace)
                    .await
                    .map_err(|e| Error::from_kube("Namespace", name, e))?;
            }
            ClusterFlavor::ProjectBased => {
                let resource = build_api_resource(PROJECT_API_VERSION, "ProjectRequest");
                let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource);
                let request = DynamicObject::new(name, &resource);
                api.create(&PostParams::default(), &request)
                    .await
                    .map_err(|e| Error::from_kube("ProjectRequest", name, e))?;
            }
        }
        Ok(())
    }

    async fn delete_namespace(&self, name: &str, flavor: ClusterFlavor) -> Result<()> {
        match flavor {
            ClusterFlavor::Generic => {
                let api: Api<Namespace> = Api::all(self.client.clone());
                api.delete(name, &DeleteParams::default())
                    .await
                    .map_err(|e| Error::from_kube("Namespace", name, e))?;
            }
            ClusterFlavor::ProjectBased => {
                let resource = build_api_resource(PROJECT_API_VERSION, "Project");
                let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource);
                api.delete(name, &DeleteParams::default())
                    .await
                    .map_err(|e| Error::from_kube("Project", name, e))?;
            }
        }
        Ok(())
    }

    async fn get_instance(&self, namespace: &str, name: &str) -> Result<Instance> {
        let api: Api<Instance> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| Error::from_kube("Instance", name, e))
    }

    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let api: Api<Instance> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::from_kube("Instance", "", e))?;
        Ok(list.items)
    }

    async fn install_operator(
        &self,
        namespace: &str,
        flavor: ClusterFlavor,
        image: &str,
    ) -> Result<()> {
        self.install_crds().await?;

        let manifests = render_operator_manifests(namespace, flavor, image)?;
        for manifest in parse_manifests(&manifests)? {
            apply_manifest(&self.client, &manifest, Some(namespace)).await?;
        }

        let mut instance = Instance::new(
            OPERATOR_NAME,
            InstanceSpec {
                operator: OperatorSpec {
                    global: false,
                    namespace: Some(namespace.to_string()),
                    cluster_type: Some(flavor.cluster_type()),
                },
            },
        );
        instance.metadata.namespace = Some(namespace.to_string());
        let api: Api<Instance> = Api::namespaced(self.client.clone(), namespace);
        api.patch(
            OPERATOR_NAME,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&instance),
        )
        .await
        .map_err(|e| Error::from_kube("Instance", OPERATOR_NAME, e))?;

        info!(namespace = %namespace, image = %image, "installed operator");
        Ok(())
    }

    async fn apply_role_manifest(&self, namespace: &str, manifest: &str) -> Result<()> {
        for manifest in parse_manifests(manifest)? {
            apply_manifest(&self.client, &manifest, Some(namespace)).await?;
        }
        Ok(())
    }

    async fn create_test(&self, test: &Test) -> Result<Test> {
        let name = test.name_any();
        self.tests(test)
            .create(&PostParams::default(), test)
            .await
            .map_err(|e| Error::from_kube("Test", &name, e))
    }

    async fn get_test(&self, namespace: &str, name: &str) -> Result<Test> {
        let api: Api<Test> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| Error::from_kube("Test", name, e))
    }

    async fn replace_test(&self, test: &Test) -> Result<Test> {
        let name = test.name_any();
        self.tests(test)
            .replace(&name, &PostParams::default(), test)
            .await
            .map_err(|e| Error::from_kube("Test", &name, e))
    }

    async fn replace_test_status(&self, test: &Test) -> Result<Test> {
        let name = test.name_any();
        let data = serde_json::to_vec(test)?;
        self.tests(test)
            .replace_status(&name, &PostParams::default(), data)
            .await
            .map_err(|e| Error::from_kube("Test", &name, e))
    }

    async fn route_host(&self, namespace: &str, name: &str) -> Result<Option<String>> {
        let resource = build_api_resource(ROUTE_API_VERSION, "Route");
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &resource);
        let route = api
            .get_opt(name)
            .await
            .map_err(|e| Error::from_kube("Route", name, e))?;
        Ok(route.and_then(|route| {
            route
                .data
                .pointer("/status/ingress/0/host")
                .and_then(|host| host.as_str())
                .map(str::to_string)
        }))
    }

    async fn follow_logs(
        &self,
        namespace: &str,
        name: &str,
        console: Console,
        cancel: CancellationToken,
    ) -> Result<()> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        let pod = loop {
            if let Some(pod) = self.running_pod(&pods, name).await? {
                break pod;
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(LOG_POD_POLL_INTERVAL) => {}
            }
        };
        debug!(pod = %pod, test = %name, "following test logs");

        let params = LogParams {
            follow: true,
            ..Default::default()
        };
        let stream = pods
            .log_stream(&pod, &params)
            .await
            .map_err(|e| Error::from_kube("Pod", &pod, e))?;
        let mut lines = Box::pin(stream.lines());

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.try_next() => match line {
                    Ok(Some(line)) => console.println(line),
                    Ok(None) => break,
                    Err(e) => {
                        warn!(pod = %pod, error = %e, "log stream interrupted");
                        break;
                    }
                },
            }
        }
        Ok(())
    }
}
