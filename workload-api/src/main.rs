use tracing::info;
use workload_api::{config::ApiConfig, startup::Application};
use workload_config::load_config;
use workload_telemetry::tracing::init_tracing_with_namespace;

fn main() -> anyhow::Result<()> {
    let config = load_config::<ApiConfig>()?;
    config.deletion.validate()?;

    // Initialize tracing from the binary name
    let _log_flusher = init_tracing_with_namespace(
        env!("CARGO_BIN_NAME"),
        Some(config.kubernetes.namespace.clone()),
    )?;

    // We start the runtime.
    actix_web::rt::System::new().block_on(async_main(config))?;

    Ok(())
}

async fn async_main(config: ApiConfig) -> anyhow::Result<()> {
    info!(
        host = config.application.host,
        port = config.application.port,
        namespace = config.kubernetes.namespace,
        poll_interval_ms = config.deletion.poll_interval_ms,
        deployment_timeout_ms = config.deletion.deployment_timeout_ms,
        pod_timeout_ms = config.deletion.pod_timeout_ms,
        track_image_pull_secret = config.deletion.track_image_pull_secret,
        "starting workload api"
    );

    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    info!("workload api stopped");

    Ok(())
}
