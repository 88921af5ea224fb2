use std::{net::TcpListener, sync::Arc};

use actix_web::{
    App, HttpServer,
    dev::Server,
    web::{self, ThinData},
};
use tracing::info;
use tracing_actix_web::TracingLogger;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use workload_telemetry::metrics::init_metrics_handle;

use crate::{
    concurrency::shutdown::{ShutdownTx, create_shutdown_channel},
    config::ApiConfig,
    images::{ImagePuller, registry::OciRegistryPuller},
    k8s::{K8sClient, http::HttpK8sClient},
    metrics::register_metrics,
    routes::{
        DeleteResponse, ErrorMessage, MessageResponse,
        deployments::{
            CreateDeploymentRequest, ReadDeploymentsResponse, RegistryType, create_deployment,
            delete_deployment, read_all_deployments, read_deployment,
        },
        health_check::health_check,
        images::{PullImageRequest, PullImageResponse, pull_image},
        metrics::metrics,
        pods::{ReadPodsResponse, delete_pod, read_deployment_pod, read_pods_by_label},
    },
};

pub struct Application {
    port: u16,
    server: Server,
    shutdown_tx: ShutdownTx,
}

impl Application {
    pub async fn build(config: ApiConfig) -> Result<Self, anyhow::Error> {
        // Both kube and reqwest run on rustls, which needs a process wide provider.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let address = format!("{}:{}", config.application.host, config.application.port);
        let listener = TcpListener::bind(address)?;
        let port = listener.local_addr()?.port();

        let k8s_client = HttpK8sClient::new(&config.kubernetes.namespace).await?;
        let image_puller =
            OciRegistryPuller::new(&config.images.content_dir, config.images.pull_timeout())?;
        let (shutdown_tx, _) = create_shutdown_channel();

        let server = run(
            config,
            listener,
            Arc::new(k8s_client),
            Arc::new(image_puller),
            shutdown_tx.clone(),
        )
        .await?;

        Ok(Self {
            port,
            server,
            shutdown_tx,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serves requests until the server stops or a termination signal
    /// arrives.
    ///
    /// On a signal, in-flight deletions are told to give up before the
    /// server drains its workers.
    pub async fn run_until_stopped(self) -> Result<(), anyhow::Error> {
        let server = self.server;
        let server_handle = server.handle();
        tokio::pin!(server);

        tokio::select! {
            result = &mut server => return Ok(result?),
            signal = shutdown_signal() => {
                signal?;
                info!("termination signal received, stopping the server");
            }
        }

        self.shutdown_tx.shutdown();
        let ((), result) = tokio::join!(server_handle.stop(true), &mut server);
        result?;

        Ok(())
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<(), std::io::Error> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = sigterm.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<(), std::io::Error> {
    tokio::signal::ctrl_c().await
}

pub async fn run(
    config: ApiConfig,
    listener: TcpListener,
    k8s_client: Arc<dyn K8sClient>,
    image_puller: Arc<dyn ImagePuller>,
    shutdown_tx: ShutdownTx,
) -> Result<Server, anyhow::Error> {
    let metrics_handle = init_metrics_handle()?;
    register_metrics();

    let config = web::Data::new(config);
    let k8s_client: web::Data<dyn K8sClient> = k8s_client.into();
    let image_puller: web::Data<dyn ImagePuller> = image_puller.into();
    let shutdown_tx = web::Data::new(shutdown_tx);

    #[derive(OpenApi)]
    #[openapi(
        paths(
            crate::routes::health_check::health_check,
            crate::routes::metrics::metrics,
            crate::routes::deployments::create_deployment,
            crate::routes::deployments::read_all_deployments,
            crate::routes::deployments::read_deployment,
            crate::routes::deployments::delete_deployment,
            crate::routes::pods::read_pods_by_label,
            crate::routes::pods::read_deployment_pod,
            crate::routes::pods::delete_pod,
            crate::routes::images::pull_image,
        ),
        components(schemas(
            ErrorMessage,
            MessageResponse,
            DeleteResponse,
            CreateDeploymentRequest,
            RegistryType,
            ReadDeploymentsResponse,
            ReadPodsResponse,
            PullImageRequest,
            PullImageResponse,
        ))
    )]
    struct ApiDoc;

    let openapi = ApiDoc::openapi();

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .service(health_check)
            .service(metrics)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()),
            )
            .service(
                web::scope("v1")
                    //deployments
                    .service(create_deployment)
                    .service(read_all_deployments)
                    .service(read_deployment)
                    .service(delete_deployment)
                    //pods
                    .service(read_pods_by_label)
                    .service(read_deployment_pod)
                    .service(delete_pod)
                    //images
                    .service(pull_image),
            )
            .app_data(config.clone())
            .app_data(k8s_client.clone())
            .app_data(image_puller.clone())
            .app_data(shutdown_tx.clone())
            .app_data(ThinData(metrics_handle.clone()))
    })
    .disable_signals()
    .listen(listener)?
    .run();

    Ok(server)
}
