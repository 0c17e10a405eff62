use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode, header};
use moodcap_application::{
    AbuseBlockService, CaptionGenerator, CaptionService, QuotaPolicy, QuotaRule, QuotaService,
    ResultCacheService,
};
use moodcap_core::AppResult;
use moodcap_domain::{BlockEscalation, ImageSource};
use moodcap_infrastructure::{FallbackStores, StoreHealthSet};
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use crate::state::AppState;

use super::build_router;

const ADMIN_TOKEN: &str = "test-admin-token-0123456789abcdef";

#[derive(Default)]
struct EchoGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl CaptionGenerator for EchoGenerator {
    async fn generate(
        &self,
        _image: &ImageSource,
        prompt: &str,
        mood: &str,
    ) -> AppResult<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![format!("{mood}: {prompt}")])
    }
}

struct TestApp {
    router: Router,
    generator: Arc<EchoGenerator>,
}

fn rule(max_generations: i64) -> QuotaRule {
    match QuotaRule::new(max_generations, 24) {
        Ok(rule) => rule,
        Err(error) => panic!("fixture rule should be valid: {error}"),
    }
}

fn test_app(anonymous_max: i64) -> TestApp {
    let Ok(pool) = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(200))
        .connect_lazy("postgres://moodcap@127.0.0.1:1/moodcap")
    else {
        panic!("lazy pool should build");
    };

    let fallback_stores = FallbackStores::new();
    let generator = Arc::new(EchoGenerator::default());
    let result_cache_service = ResultCacheService::new(fallback_stores.cache.clone());
    let quota_service = QuotaService::new(
        fallback_stores.quota.clone(),
        QuotaPolicy::new(rule(anonymous_max), rule(10)),
    );
    let abuse_block_service =
        AbuseBlockService::new(fallback_stores.blocks.clone(), BlockEscalation::default());

    let state = AppState {
        caption_service: CaptionService::new(
            abuse_block_service.clone(),
            quota_service.clone(),
            result_cache_service.clone(),
            generator.clone(),
        ),
        result_cache_service,
        quota_service,
        abuse_block_service,
        store_health: StoreHealthSet::new(Duration::from_secs(30)),
        fallback_stores,
        postgres_pool: pool,
        redis_client: None,
        redis_required: false,
        admin_api_token: Arc::from(ADMIN_TOKEN),
        trusted_proxies: Arc::from(Vec::new()),
    };

    TestApp {
        router: build_router(state)
            .layer(MockConnectInfo(SocketAddr::from(([203, 0, 113, 9], 40_000)))),
        generator,
    }
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    let Ok(request) = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
    else {
        panic!("request should build");
    };
    request
}

fn admin_request(method: &str, uri: &str, body: Option<&Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"));
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    };
    let Ok(request) = request else {
        panic!("request should build");
    };
    request
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let Ok(response) = app.router.clone().oneshot(request).await else {
        panic!("router should answer");
    };
    let status = response.status();
    let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
        panic!("body should be readable");
    };
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn caption_body(mood: &str) -> Value {
    json!({
        "image": "data:image/png;base64,iVBORw0KGgo=",
        "prompt": "  city   lights ",
        "mood": mood,
    })
}

#[tokio::test]
async fn second_identical_request_is_served_from_cache() {
    let app = test_app(5);

    let (status, first) = send(&app, json_request("POST", "/api/captions", &caption_body("Dreamy"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["cached"], json!(false));
    assert_eq!(first["captions"], json!(["dreamy: city lights"]));
    assert_eq!(first["quota"]["remaining"], json!(4));

    let (status, second) =
        send(&app, json_request("POST", "/api/captions", &caption_body("dreamy"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["cached"], json!(true));
    assert_eq!(second["quota"]["remaining"], json!(3));
    assert_eq!(app.generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exhausted_quota_answers_429_with_retry_after() {
    let app = test_app(1);

    let (status, _) = send(&app, json_request("POST", "/api/captions", &caption_body("calm"))).await;
    assert_eq!(status, StatusCode::OK);

    let Ok(response) = app
        .router
        .clone()
        .oneshot(json_request("POST", "/api/captions", &caption_body("calm")))
        .await
    else {
        panic!("router should answer");
    };
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn reported_credentials_are_rejected_with_403() {
    let app = test_app(5);

    let (status, blocked) = send(
        &app,
        admin_request(
            "POST",
            "/api/admin/blocks",
            Some(&json!({ "credential": "Mallory@Example.com", "reason": "scraping" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(blocked["success"], json!(true));
    assert_eq!(blocked["data"]["attempts"], json!(1));

    let mut body = caption_body("calm");
    body["credential"] = json!("mallory@example.com");
    let (status, rejection) = send(&app, json_request("POST", "/api/captions", &body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(rejection["hours_remaining"], json!(24));
    assert_eq!(rejection["reason"], json!("scraping"));
    assert_eq!(app.generator.calls.load(Ordering::SeqCst), 0);

    let (status, unblocked) = send(
        &app,
        admin_request("DELETE", "/api/admin/blocks/mallory@example.com", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unblocked["data"]["deleted"], json!(true));
}

#[tokio::test]
async fn invalid_generation_input_is_a_bad_request() {
    let app = test_app(5);

    let (status, body) = send(&app, json_request("POST", "/api/captions", &caption_body("  "))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn content_store_identifiers_are_accepted_as_references() {
    let app = test_app(5);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/captions",
            &json!({ "image": "uploads/2026/cat.png", "mood": "calm" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cached"], json!(false));

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/captions",
            &json!({ "image": "abcd1234", "image_kind": "reference", "mood": "calm" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.generator.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn admin_routes_require_the_bearer_token() {
    let app = test_app(5);

    let Ok(request) = Request::builder()
        .uri("/api/admin/cache/stats")
        .header(header::AUTHORIZATION, "Bearer not-the-token")
        .body(Body::empty())
    else {
        panic!("request should build");
    };
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn admin_stats_and_quota_status_report_usage() {
    let app = test_app(5);
    for _ in 0..2 {
        let _ = send(&app, json_request("POST", "/api/captions", &caption_body("calm"))).await;
    }

    let (status, stats) = send(&app, admin_request("GET", "/api/admin/cache/stats", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["data"]["entries"], json!(1));
    assert_eq!(stats["data"]["total_usage"], json!(2));
    assert_eq!(stats["data"]["hit_rate"], json!(50.0));

    let (status, quota) = send(
        &app,
        admin_request("GET", "/api/admin/quota/ip:203.0.113.9", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quota["data"]["count"], json!(2));
    assert_eq!(quota["data"]["remaining"], json!(3));

    let (_, reset) = send(&app, admin_request("POST", "/api/admin/quota/reset", None)).await;
    assert_eq!(reset["data"]["removed"], json!(1));
}

#[tokio::test]
async fn admin_input_errors_stay_inside_the_envelope() {
    let app = test_app(5);

    let (status, body) = send(
        &app,
        admin_request(
            "POST",
            "/api/admin/cache/cleanup",
            Some(&json!({ "older_than_days": "soon" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));

    let (status, body) = send(
        &app,
        admin_request("DELETE", "/api/admin/cache/entries/not-a-uuid", None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));

    let (status, body) = send(
        &app,
        admin_request("GET", "/api/admin/quota/someone", None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
}
