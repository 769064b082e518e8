use std::net::SocketAddr;

use axum::{
    Extension, Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode, header},
    response::Response,
    routing::get,
};
use tower::ServiceExt;

use perimeter::middleware::{AccessGranted, BypassPerimeter, protect};
use perimeter::recorder;
use perimeter::session::{MemorySession, Session};
use perimeter::store::NewAccessToken;
use perimeter::testing::{TestGate, test_config};
use perimeter::Config;

async fn secret(Extension(granted): Extension<AccessGranted>) -> String {
    format!("hello {}", granted.token)
}

fn routes() -> Router {
    Router::new()
        .route("/secret", get(secret))
        .route("/health", get(|| async { "ok" }))
        .route("/open", get(|| async { "open" }))
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn gateway_post(body: &str) -> Request<Body> {
    let mut req = Request::builder()
        .method("POST")
        .uri("/perimeter/")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::USER_AGENT, "Mozilla/5.0 (test)")
        .body(Body::from(body.to_string()))
        .unwrap();
    let addr: SocketAddr = "198.51.100.23:50123".parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .expect("redirect should carry a Location header")
        .to_str()
        .unwrap()
}

async fn body_string(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

#[tokio::test]
async fn test_disabled_gate_passes_everything() {
    let app = TestGate::with_config(Config {
        enabled: false,
        ..test_config()
    })
    .await;
    let router = app.router(routes(), MemorySession::new().shared());

    let response = router.oneshot(get_request("/open")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "open");
}

#[tokio::test]
async fn test_locked_visitor_is_redirected_to_gateway() {
    let app = TestGate::new().await;
    let router = app.router(routes(), MemorySession::new().shared());

    let response = router
        .oneshot(get_request("/secret?page=2"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/perimeter/?next=%2Fsecret%3Fpage%3D2");
}

#[tokio::test]
async fn test_bypass_path_is_not_gated() {
    let app = TestGate::with_config(Config {
        bypass_paths: vec!["/health".to_string()],
        ..test_config()
    })
    .await;
    let router = app.router(routes(), MemorySession::new().shared());

    let response = router.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_bypass_extension_is_not_gated() {
    let app = TestGate::new().await;
    let router = app
        .router(routes(), MemorySession::new().shared())
        .layer(Extension(BypassPerimeter));

    let response = router.oneshot(get_request("/open")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_gateway_submit_unlocks_and_redirects() {
    let app = TestGate::new().await;
    let token = app
        .store
        .create_access_token(NewAccessToken::with_token("X1A2B3"))
        .await
        .unwrap();
    let session = MemorySession::new();
    let router = app.router(routes(), session.clone().shared());

    let response = router
        .clone()
        .oneshot(gateway_post(
            "token=X1A2B3&email=hugo%40example.com&name=Hugo&next=%2Fsecret",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/secret");
    assert_eq!(
        session.get("perimeter").await.unwrap().as_deref(),
        Some("X1A2B3")
    );

    let response = router.oneshot(get_request("/secret")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "hello X1A2B3");

    let uses = recorder::list_uses(&app.db, token.id).await.unwrap();
    assert_eq!(uses.len(), 1);
    assert_eq!(uses[0].user_email, "hugo@example.com");
    assert_eq!(uses[0].user_name, "Hugo");
    assert_eq!(uses[0].client_ip, "198.51.100.23");
    assert_eq!(uses[0].client_user_agent, "Mozilla/5.0 (test)");
}

#[tokio::test]
async fn test_gateway_submit_without_identity_records_unknown() {
    let app = TestGate::new().await;
    let token = app
        .store
        .create_access_token(NewAccessToken::with_token("X1A2B3"))
        .await
        .unwrap();
    let router = app.router(routes(), MemorySession::new().shared());

    let response = router.oneshot(gateway_post("token=X1A2B3")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let uses = recorder::list_uses(&app.db, token.id).await.unwrap();
    assert_eq!(uses[0].user_email, "unknown");
    assert_eq!(uses[0].user_name, "unknown");
}

#[tokio::test]
async fn test_gateway_submit_rejects_invalid_token() {
    let app = TestGate::new().await;
    let session = MemorySession::new();
    let router = app.router(routes(), session.clone().shared());

    let response = router
        .oneshot(gateway_post("token=NOPE&next=%2Fsecret"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");
    assert_eq!(body["error"]["message"], "invalid token");
    assert_eq!(session.get("perimeter").await.unwrap(), None);
}

#[tokio::test]
async fn test_gateway_submit_ignores_offsite_next() {
    let app = TestGate::new().await;
    app.store
        .create_access_token(NewAccessToken::with_token("X1A2B3"))
        .await
        .unwrap();
    let router = app.router(routes(), MemorySession::new().shared());

    let response = router
        .oneshot(gateway_post("token=X1A2B3&next=%2F%2Fevil.example"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_malformed_form_is_bad_request() {
    let app = TestGate::new().await;
    let router = app.router(routes(), MemorySession::new().shared());

    let req = Request::builder()
        .method("POST")
        .uri("/perimeter/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"token":"X1A2B3"}"#))
        .unwrap();
    let response = router.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_session_fails_closed() {
    let app = TestGate::new().await;
    let router = protect(routes(), app.gate.clone());

    let response = router.oneshot(get_request("/secret")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["error"]["message"], "internal error");
}

#[tokio::test]
async fn test_revoked_token_redirects_on_next_request() {
    let app = TestGate::new().await;
    app.store
        .create_access_token(NewAccessToken::with_token("X1A2B3"))
        .await
        .unwrap();
    let session = MemorySession::new();
    let router = app.router(routes(), session.clone().shared());

    router
        .clone()
        .oneshot(gateway_post("token=X1A2B3"))
        .await
        .unwrap();
    app.store.set_active("X1A2B3", false).await.unwrap();

    let response = router.oneshot(get_request("/secret")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/perimeter/?next=%2Fsecret");
}

#[tokio::test]
async fn test_paths_beside_bypass_prefixes_stay_gated() {
    let app = TestGate::with_config(Config {
        bypass_paths: vec!["/health".to_string()],
        ..test_config()
    })
    .await;
    let router = app.router(
        routes()
            .route("/healthcheck-admin", get(|| async { "admin" }))
            .route("/perimeter/admin", get(|| async { "admin" })),
        MemorySession::new().shared(),
    );

    for path in ["/healthcheck-admin", "/perimeter/admin"] {
        let response = router.clone().oneshot(get_request(path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{path} was not gated");
    }
}
