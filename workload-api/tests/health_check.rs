use workload_telemetry::tracing::init_test_tracing;

use crate::support::test_app::spawn_test_app;

mod support;

#[tokio::test(flavor = "multi_thread")]
async fn health_check_returns_200() {
    init_test_tracing();
    // Arrange
    let app = spawn_test_app().await;

    // Act
    let response = app
        .api_client
        .get(format!("{}/health_check", app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    // Assert
    assert!(response.status().is_success());
    assert_eq!(Some(2), response.content_length());
}

#[tokio::test(flavor = "multi_thread")]
async fn openapi_document_lists_the_deletion_endpoints() {
    init_test_tracing();
    // Arrange
    let app = spawn_test_app().await;

    // Act
    let response = app
        .api_client
        .get(format!("{}/api-docs/openapi.json", app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    // Assert
    assert!(response.status().is_success());
    let document: serde_json::Value = response
        .json()
        .await
        .expect("failed to deserialize response");
    let paths = document["paths"]
        .as_object()
        .expect("openapi document has no paths");
    let has_delete = |suffix: &str| {
        paths
            .iter()
            .any(|(path, item)| path.ends_with(suffix) && item["delete"].is_object())
    };
    assert!(has_delete("/deployments/{deployment_name}"));
    assert!(has_delete("/pods/{pod_name}"));
}
