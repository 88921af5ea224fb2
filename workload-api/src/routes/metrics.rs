use actix_web::{Responder, get, web::ThinData};
use metrics_exporter_prometheus::PrometheusHandle;

#[utoipa::path(
    summary = "Prometheus metrics",
    description = "Renders the deletion counters and duration histograms in the Prometheus text format.",
    responses(
        (status = 200, description = "Metrics rendered", body = String),
    ),
    tag = "Metrics"
)]
#[get("/metrics")]
pub async fn metrics(metrics_handle: ThinData<PrometheusHandle>) -> impl Responder {
    metrics_handle.render()
}
