#![allow(dead_code)]

use std::io;
use std::net::TcpListener;
use std::sync::Arc;

use workload_api::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use workload_api::routes::deployments::{CreateDeploymentRequest, RegistryType};
use workload_api::routes::images::PullImageRequest;
use workload_api::{config::ApiConfig, startup::run};
use workload_config::{Environment, load_config};

use crate::support::images::FakeImagePuller;
use crate::support::k8s_client::MockK8sClient;

/// Poll cadence used by test servers.
pub const POLL_INTERVAL_MS: u64 = 20;
/// Deletion budget used by test servers, for deployments and pods alike.
pub const DELETION_TIMEOUT_MS: u64 = 400;

pub struct TestApp {
    pub address: String,
    pub api_client: reqwest::Client,
    pub k8s_client: Arc<MockK8sClient>,
    pub image_puller: Arc<FakeImagePuller>,
    pub shutdown_tx: ShutdownTx,
    config: ApiConfig,
    server_handle: tokio::task::JoinHandle<io::Result<()>>,
}

impl TestApp {
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub async fn create_deployment(
        &self,
        deployment: &CreateDeploymentRequest,
    ) -> reqwest::Response {
        self.api_client
            .post(format!("{}/v1/deployments", &self.address))
            .json(deployment)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn read_all_deployments(&self) -> reqwest::Response {
        self.api_client
            .get(format!("{}/v1/deployments", &self.address))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn read_deployment(&self, name: &str) -> reqwest::Response {
        self.api_client
            .get(format!("{}/v1/deployments/{name}", &self.address))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn delete_deployment(&self, name: &str) -> reqwest::Response {
        self.api_client
            .delete(format!("{}/v1/deployments/{name}", &self.address))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn read_pods(&self, label: &str) -> reqwest::Response {
        self.api_client
            .get(format!("{}/v1/pods/{label}", &self.address))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn read_deployment_pod(&self, deployment: &str, pod: &str) -> reqwest::Response {
        self.api_client
            .get(format!(
                "{}/v1/deployments/{deployment}/pods/{pod}",
                &self.address
            ))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn delete_pod(&self, name: &str) -> reqwest::Response {
        self.api_client
            .delete(format!("{}/v1/pods/{name}", &self.address))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn pull_image(&self, image: &PullImageRequest) -> reqwest::Response {
        self.api_client
            .post(format!("{}/v1/images/pull", &self.address))
            .json(image)
            .send()
            .await
            .expect("Failed to execute request.")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

/// A deployment request for a public image.
pub fn public_deployment(name: &str) -> CreateDeploymentRequest {
    CreateDeploymentRequest {
        deployment_name: name.to_string(),
        deployment_label: format!("{name}-app"),
        container_name: name.to_string(),
        container_registry_server: "docker.io".to_string(),
        container_image_name: "nginx".to_string(),
        container_image_tag: "1.27".to_string(),
        container_port: "80".to_string(),
        replica_count: "1".to_string(),
        registry_type: RegistryType::Public,
        registry_username: None,
        registry_password: None,
        cpu: None,
        memory: None,
    }
}

/// A deployment request for an image behind registry credentials.
pub fn private_deployment(name: &str) -> CreateDeploymentRequest {
    CreateDeploymentRequest {
        container_registry_server: "registry.example.com".to_string(),
        registry_type: RegistryType::Private,
        registry_username: Some("deployer".to_string()),
        registry_password: Some("s3cr3t".into()),
        ..public_deployment(name)
    }
}

pub async fn spawn_test_app() -> TestApp {
    // We set the environment to dev.
    Environment::Dev.set();

    let base_address = "127.0.0.1";
    let listener =
        TcpListener::bind(format!("{base_address}:0")).expect("failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let mut config = load_config::<ApiConfig>().expect("Failed to read configuration");
    // Short budgets keep the deletion tests fast.
    config.deletion.poll_interval_ms = POLL_INTERVAL_MS;
    config.deletion.deployment_timeout_ms = DELETION_TIMEOUT_MS;
    config.deletion.pod_timeout_ms = DELETION_TIMEOUT_MS;
    config.deletion.track_image_pull_secret = true;

    let k8s_client = Arc::new(MockK8sClient::default());
    let image_puller = Arc::new(FakeImagePuller::default());
    let (shutdown_tx, _) = create_shutdown_channel();

    let server = run(
        config.clone(),
        listener,
        k8s_client.clone(),
        image_puller.clone(),
        shutdown_tx.clone(),
    )
    .await
    .expect("failed to bind address");

    let server_handle = tokio::spawn(server);

    TestApp {
        address: format!("http://{base_address}:{port}"),
        api_client: reqwest::Client::new(),
        k8s_client,
        image_puller,
        shutdown_tx,
        config,
        server_handle,
    }
}
