use actix_web::{HttpResponse, Responder, get};

#[utoipa::path(
    summary = "Liveness probe",
    description = "Answers 'ok' while the server accepts requests. The cluster is not contacted.",
    responses(
        (status = 200, description = "The server is up", body = String),
    ),
    tag = "Health",
)]
#[get("/health_check")]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().body("ok")
}
