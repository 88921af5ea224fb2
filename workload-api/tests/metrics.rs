use workload_telemetry::tracing::init_test_tracing;

use crate::support::test_app::{public_deployment, spawn_test_app};

mod support;

#[tokio::test(flavor = "multi_thread")]
async fn metrics_endpoint_returns_200() {
    init_test_tracing();
    // Arrange
    let app = spawn_test_app().await;

    // Act
    let response = app
        .api_client
        .get(format!("{}/metrics", app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    // Assert
    assert!(response.status().is_success());
}

#[tokio::test(flavor = "multi_thread")]
async fn completed_deletions_are_counted() {
    init_test_tracing();
    // Arrange
    let app = spawn_test_app().await;
    app.create_deployment(&public_deployment("counted")).await;
    let response = app.delete_deployment("counted").await;
    assert!(response.status().is_success());

    // Act
    let response = app
        .api_client
        .get(format!("{}/metrics", app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    // Assert
    let body = response.text().await.expect("failed to read response body");
    assert!(body.contains("workload_deletions_total"));
    assert!(body.contains("outcome=\"completed\""));
}
