use base64::{Engine, prelude::BASE64_STANDARD};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Secret;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

use crate::k8s::K8sError;

/// Annotation recording the image pull secret created along with a deployment.
pub const IMAGE_PULL_SECRET_ANNOTATION: &str = "workload.dev/image-pull-secret";
pub const DOCKER_CONFIG_JSON_TYPE: &str = "kubernetes.io/dockerconfigjson";
pub const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";
pub const APP_LABEL: &str = "app";
pub const OWNER_LABEL: &str = "owner";
const CONTAINER_PORT_NAME: &str = "http";

/// Name of the image pull secret owned by deployment `deployment_name`.
pub fn image_pull_secret_name(deployment_name: &str) -> String {
    format!("{deployment_name}-image-pull-secret")
}

#[derive(Debug, Serialize)]
struct DockerConfig<'a> {
    auths: BTreeMap<&'a str, DockerRegistryAuth<'a>>,
}

#[derive(Debug, Serialize)]
struct DockerRegistryAuth<'a> {
    username: &'a str,
    password: &'a str,
    auth: String,
}

/// Registry login used by pods to pull a private image.
#[derive(Debug, Clone)]
pub struct RegistryLogin<'a> {
    pub server: &'a str,
    pub username: &'a str,
    pub password: &'a str,
}

/// Builds the `kubernetes.io/dockerconfigjson` secret for `login`.
pub fn build_image_pull_secret(name: &str, login: &RegistryLogin<'_>) -> Result<Secret, K8sError> {
    let auth = BASE64_STANDARD.encode(format!("{}:{}", login.username, login.password));
    let docker_config = DockerConfig {
        auths: BTreeMap::from([(
            login.server,
            DockerRegistryAuth {
                username: login.username,
                password: login.password,
                auth,
            },
        )]),
    };
    let docker_config = serde_json::to_vec(&docker_config)?;

    let secret_json = json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": name,
        },
        "type": DOCKER_CONFIG_JSON_TYPE,
        "data": {
            DOCKER_CONFIG_JSON_KEY: BASE64_STANDARD.encode(docker_config),
        }
    });

    Ok(serde_json::from_value(secret_json)?)
}

/// Everything needed to build a single container deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    pub name: String,
    pub label: String,
    pub container_name: String,
    pub image: String,
    pub container_port: u16,
    pub replicas: i32,
    pub image_pull_secret: Option<String>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
}

impl WorkloadSpec {
    fn resource_quantities(&self) -> Option<BTreeMap<&'static str, &str>> {
        let mut quantities = BTreeMap::new();
        if let Some(cpu) = &self.cpu {
            quantities.insert("cpu", cpu.as_str());
        }
        if let Some(memory) = &self.memory {
            quantities.insert("memory", memory.as_str());
        }

        (!quantities.is_empty()).then_some(quantities)
    }
}

/// Builds the deployment object for `spec`.
///
/// Pods are labeled `app` and `owner` so they can be found by label or by
/// owning deployment.
pub fn build_deployment(spec: &WorkloadSpec) -> Result<Deployment, K8sError> {
    let labels = json!({
        APP_LABEL: spec.label,
        OWNER_LABEL: spec.name,
    });

    let mut container = json!({
        "name": spec.container_name,
        "image": spec.image,
        "ports": [{
            "name": CONTAINER_PORT_NAME,
            "protocol": "TCP",
            "containerPort": spec.container_port,
        }]
    });
    if let Some(quantities) = spec.resource_quantities() {
        container["resources"] = json!({
            "requests": quantities,
            "limits": quantities,
        });
    }

    let mut pod_spec = json!({ "containers": [container] });
    let mut metadata = json!({ "name": spec.name });
    if let Some(secret_name) = &spec.image_pull_secret {
        pod_spec["imagePullSecrets"] = json!([{ "name": secret_name }]);
        metadata["annotations"] = json!({ IMAGE_PULL_SECRET_ANNOTATION: secret_name });
    }

    let deployment_json = json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": metadata,
        "spec": {
            "replicas": spec.replicas,
            "selector": {
                "matchLabels": labels,
            },
            "template": {
                "metadata": {
                    "labels": labels,
                },
                "spec": pod_spec,
            }
        }
    });

    Ok(serde_json::from_value(deployment_json)?)
}

/// Returns the image pull secret recorded on `deployment` at creation time.
pub fn recorded_image_pull_secret(deployment: &Deployment) -> Option<&str> {
    deployment
        .metadata
        .annotations
        .as_ref()?
        .get(IMAGE_PULL_SECRET_ANNOTATION)
        .map(String::as_str)
}
