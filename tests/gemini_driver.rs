use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use docchat::llm::{
    CompletionService, GeminiDriver, GeminiSettings, Orchestrator, ServiceError, Turn,
};
use serde_json::{Value, json};

#[derive(Debug, Clone)]
struct Captured {
    model_action: String,
    api_key: Option<String>,
    body: Value,
}

type Log = Arc<Mutex<Vec<Captured>>>;

/// Serve `app` on an ephemeral port and return its base URL.
async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn settings(base_url: String) -> GeminiSettings {
    GeminiSettings {
        base_url,
        api_key: "test-key".to_string(),
        model: "gemini-test".to_string(),
    }
}

async fn generate(
    State(log): State<Log>,
    Path(model_action): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    log.lock().unwrap().push(Captured {
        model_action,
        api_key: headers
            .get("x-goog-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });
    Json(json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": "The total " }, { "text": "is 100." }] },
            "finishReason": "STOP"
        }]
    }))
}

#[tokio::test]
async fn test_generate_content_round_trip() {
    let log: Log = Arc::default();
    let app = Router::new()
        .route("/v1beta/models/{model_action}", post(generate))
        .with_state(Arc::clone(&log));
    let base_url = spawn(app).await;

    let orchestrator = Orchestrator::new(settings(base_url)).with_document_label("Excel document");
    let history = vec![Turn::user("hi"), Turn::model("hello")];
    let reply = orchestrator
        .respond(
            r#"[{"region":"east","total":100}]"#,
            &history,
            "What is the total for east?",
        )
        .await
        .unwrap();
    assert_eq!(reply, "The total is 100.");

    let captured = log.lock().unwrap().clone();
    assert_eq!(captured.len(), 1);
    let call = &captured[0];
    assert_eq!(call.model_action, "gemini-test:generateContent");
    assert_eq!(call.api_key.as_deref(), Some("test-key"));
    assert_eq!(
        call.body["systemInstruction"]["parts"][0]["text"],
        r#"This is an uploaded Excel document data: [{"region":"east","total":100}]. If the question is about the document itself, summarize it (no column name lists)."#
    );
    assert_eq!(
        call.body["contents"],
        json!([
            { "role": "user", "parts": [{ "text": "hi" }] },
            { "role": "model", "parts": [{ "text": "hello" }] },
            { "role": "user", "parts": [{ "text": "What is the total for east?" }] }
        ])
    );
    assert_eq!(call.body["generationConfig"]["topK"], 40);
    assert_eq!(call.body["generationConfig"]["maxOutputTokens"], 8192);
    assert_eq!(call.body["generationConfig"]["responseMimeType"], "text/plain");
}

#[tokio::test]
async fn test_quota_error_maps_to_network_or_quota() {
    let app = Router::new().route(
        "/v1beta/models/{model_action}",
        post(|| async {
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": {
                        "code": 429,
                        "message": "Resource has been exhausted",
                        "status": "RESOURCE_EXHAUSTED"
                    }
                })),
            )
                .into_response()
        }),
    );
    let driver = GeminiDriver::new(settings(spawn(app).await));
    let orchestrator = Orchestrator::with_service(Arc::new(driver));

    let err = orchestrator.respond("doc", &[], "q").await.unwrap_err();
    assert_eq!(
        err,
        ServiceError::NetworkOrQuota {
            status: Some(429),
            message: "Resource has been exhausted".to_string(),
        }
    );
}

#[tokio::test]
async fn test_undecodable_body_is_malformed() {
    let app = Router::new().route(
        "/v1beta/models/{model_action}",
        post(|| async { "<html>maintenance</html>" }),
    );
    let driver = GeminiDriver::new(settings(spawn(app).await));

    let err = driver
        .complete(&Orchestrator::new(GeminiSettings::new("k")).build_request("doc", &[], "q"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "MALFORMED_RESPONSE");
}

#[tokio::test]
async fn test_unreachable_host_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let orchestrator = Orchestrator::new(settings(format!("http://{addr}")));
    let err = orchestrator.respond("doc", &[], "q").await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::NetworkOrQuota { status: None, .. }
    ));
}
