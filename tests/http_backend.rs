use std::sync::Arc;

use imagegen::{
    ApiError, Completion, Config, Controller, GenerationRequest, GenerationService, HealthService,
    HistoryService, HistoryView, HttpBackend, Phase, RemoteHistoryEntry, UserIdentity,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer) -> HttpBackend {
    HttpBackend::new(Config::new(server.uri()))
}

fn user() -> UserIdentity {
    UserIdentity::new("user_k3j9x0a1b")
}

#[tokio::test]
async fn generate_posts_prompt_and_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .and(body_json(json!({
            "prompt": "Modern minimalist living room",
            "user_id": "user_k3j9x0a1b",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "image": "uri1",
            "prompt": "Modern minimalist living room",
            "enhanced_prompt": "Modern minimalist living room, high quality",
            "timestamp": "2024-01-01T00:00:00Z",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = GenerationRequest::new("Modern minimalist living room", user()).unwrap();
    let result = backend(&server).generate(&request).await.unwrap();

    assert_eq!(result.image, "uri1");
    assert_eq!(result.timestamp, "2024-01-01T00:00:00Z");
    assert_eq!(
        result.enhanced_prompt.as_deref(),
        Some("Modern minimalist living room, high quality")
    );
}

#[tokio::test]
async fn error_status_carries_service_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "detail": "Error generating image: CUDA out of memory",
        })))
        .mount(&server)
        .await;

    let request = GenerationRequest::new("kitchen", user()).unwrap();
    let err = backend(&server).generate(&request).await.unwrap_err();

    match err {
        ApiError::Status { status, detail } => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(detail.as_deref(), Some("Error generating image: CUDA out of memory"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn structured_validation_detail_is_not_shown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "detail": [{"loc": ["body", "prompt"], "msg": "field required"}],
        })))
        .mount(&server)
        .await;

    let request = GenerationRequest::new("kitchen", user()).unwrap();
    let err = backend(&server).generate(&request).await.unwrap_err();
    assert_eq!(
        err.to_service_error(imagegen::error::GENERATE_FALLBACK).message,
        "Failed to generate image"
    );
}

#[tokio::test]
async fn success_false_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": false })))
        .mount(&server)
        .await;

    let request = GenerationRequest::new("kitchen", user()).unwrap();
    let err = backend(&server).generate(&request).await.unwrap_err();
    assert!(matches!(err, ApiError::Rejected));
}

#[tokio::test]
async fn history_is_scoped_by_user_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/history"))
        .and(query_param("user_id", "user_k3j9x0a1b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "count": 2,
            "history": [
                {"id": "1", "user_id": "user_k3j9x0a1b", "prompt": "Loft", "timestamp": "2024-01-01T00:00:00"},
                {"id": "2", "user_id": "user_k3j9x0a1b", "prompt": "Porch", "timestamp": "2024-01-02T00:00:00"},
            ],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let entries = backend(&server).history(&user()).await.unwrap();
    assert_eq!(
        entries.iter().map(|e| e.prompt.as_str()).collect::<Vec<_>>(),
        vec!["Loft", "Porch"]
    );
    assert_eq!(entries[1].id, "2");
}

#[tokio::test]
async fn health_reports_model_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "healthy",
            "gpu_available": false,
            "model_loaded": true,
        })))
        .mount(&server)
        .await;

    let health = backend(&server).health().await.unwrap();
    assert_eq!(health.status, "healthy");
    assert!(!health.gpu_available);
    assert!(health.model_loaded);
}

#[tokio::test]
async fn transport_failure_falls_back_to_generic_message() {
    // Nothing listens on a port freed right after binding it.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let uri = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let controller = Controller::with_backend(
        user(),
        Arc::new(HttpBackend::new(Config::new(uri))),
    );
    assert_eq!(controller.submit("garden").await, Ok(Completion::Applied));
    assert_eq!(controller.refresh_history().await, Completion::Applied);

    let session = controller.session().await;
    assert_eq!(session.phase(), Phase::IdleWithError);
    assert_eq!(session.error(), Some("Failed to generate image"));
    assert!(matches!(
        controller.history().await.view(),
        HistoryView::Failed(err) if err.message == "Failed to load history"
    ));
}

#[tokio::test]
async fn controller_round_trip_against_http_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "image": "data:image/png;base64,iVBORw0KGgo=",
            "prompt": "Japanese-inspired bedroom",
            "timestamp": "2024-05-01T12:00:00",
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "history": [
                {"id": "1", "user_id": "user_k3j9x0a1b", "prompt": "Japanese-inspired bedroom", "timestamp": "2024-05-01T12:00:00"},
            ],
        })))
        .mount(&server)
        .await;

    let controller = Controller::with_backend(user(), Arc::new(backend(&server)));
    controller.submit("Japanese-inspired bedroom").await.unwrap();

    let session = controller.session().await;
    assert_eq!(session.history().len(), 1);
    assert_eq!(controller.history().await.view(), &HistoryView::NotLoaded);

    controller.refresh_history().await;
    assert_eq!(
        controller.history().await.entries(),
        &[RemoteHistoryEntry {
            id: "1".into(),
            user_id: "user_k3j9x0a1b".into(),
            prompt: "Japanese-inspired bedroom".into(),
            timestamp: "2024-05-01T12:00:00".into(),
        }]
    );
}
