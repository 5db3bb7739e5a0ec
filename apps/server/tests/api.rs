use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::{Query, State},
    http::{Request, StatusCode},
    routing::get as get_route,
    Json, Router,
};
use quotegate_gateway::{
    AdapterError, AdapterSet, GatewayCatalog, GatewayStore, NormalizedQuote, ProviderDescriptor,
    QuoteAdapter, RequestParams, ResolutionEngine, UpstreamMeter,
};
use quotegate_server::{api::app_router, build_state, config::Config, AppState};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_config() -> Config {
    Config {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        providers_file: None,
        roles_file: None,
        cors_allow: vec!["*".to_string()],
        request_timeout: Duration::from_secs(15),
        adapter_timeout: Duration::from_secs(4),
        inflight_wait: Duration::from_millis(1500),
    }
}

struct CountingAdapter {
    fail: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl QuoteAdapter for CountingAdapter {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn adapt(
        &self,
        provider: &ProviderDescriptor,
        _role: &str,
        params: &RequestParams,
        meter: &UpstreamMeter,
    ) -> Result<Vec<NormalizedQuote>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        meter.acquire()?;
        if self.fail {
            return Err(AdapterError::server_error(provider.id.as_ref(), "upstream down"));
        }
        Ok(params
            .symbols
            .iter()
            .map(|s| NormalizedQuote::new(s, dec!(1.2345), chrono::Utc::now(), provider.id.as_ref()))
            .collect())
    }
}

fn mock_router(fail: bool, safety_net: bool) -> (axum::Router, Arc<CountingAdapter>) {
    let adapter = Arc::new(CountingAdapter {
        fail,
        calls: AtomicUsize::new(0),
    });
    let adapters = AdapterSet::builtin().with(adapter.clone());
    let providers = format!(
        r#"{{ {} "providers": [
            {{ "id": "upstream", "capabilities": ["ribbon"], "adapter": "counting" }},
            {{ "id": "demo", "capabilities": ["ribbon"], "adapter": "demo" }}
        ] }}"#,
        if safety_net { r#""safetyNet": "demo","# } else { "" }
    );
    let roles = r#"{ "roles": [
        { "role": "ribbon", "primary": "upstream", "cacheTtlSeconds": 60, "symbols": ["EURUSD"] }
    ] }"#;
    let catalog = GatewayCatalog::load(&providers, roles, &adapters).unwrap();
    let engine = ResolutionEngine::new(
        &catalog,
        GatewayStore::for_registry(&catalog.registry),
        Default::default(),
    );
    (app_router(AppState::new(engine), &test_config()), adapter)
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn healthz_works() {
    let config = test_config();
    let state = build_state(&config).unwrap();
    let app = app_router(state, &config);

    let response = app
        .oneshot(Request::builder().uri("/api/v1/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn lists_configured_roles() {
    let config = test_config();
    let app = app_router(build_state(&config).unwrap(), &config);

    let (status, body) = get(&app, "/api/v1/roles").await;
    assert_eq!(status, StatusCode::OK);
    let roles = body.as_array().unwrap();
    assert_eq!(roles[0]["role"], "ribbon");
    assert_eq!(roles[0]["primaryProviderId"], "frankfurter");
    assert_eq!(roles[0]["degradationMode"], "fallback");
}

#[tokio::test]
async fn forced_demo_resolves_without_network() {
    let config = test_config();
    let app = app_router(build_state(&config).unwrap(), &config);

    let (status, body) = get(&app, "/api/v1/roles/ribbon/resolve?forceProvider=demo").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "demo");
    assert_eq!(body["sourceProvider"], "demo");
    assert_eq!(body["primaryProvider"], "frankfurter");
    assert_eq!(body["data"][0]["symbol"], "EUR/USD");
}

#[tokio::test]
async fn unknown_role_is_not_found() {
    let config = test_config();
    let app = app_router(build_state(&config).unwrap(), &config);

    let (status, body) = get(&app, "/api/v1/roles/nope/resolve").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
    assert_eq!(body["message"], "Unknown role: nope");

    let (status, _) = get(&app, "/api/v1/roles/ribbon/resolve?forceProvider=nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn resolves_live_then_cached() {
    let (app, adapter) = mock_router(false, true);

    let (status, body) = get(&app, "/api/v1/roles/ribbon/resolve").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "live");
    assert_eq!(body["data"][0]["value"], 1.2345);

    let (_, body) = get(&app, "/api/v1/roles/ribbon/resolve").await;
    assert_eq!(body["mode"], "cached");

    let (_, body) = get(&app, "/api/v1/roles/ribbon/resolve?bypassCache=true").await;
    assert_eq!(body["mode"], "live");
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failing_chain_degrades_to_demo() {
    let (app, _) = mock_router(true, true);
    let (status, body) = get(&app, "/api/v1/roles/ribbon/resolve").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "demo");
}

#[tokio::test]
async fn exhausted_chain_without_safety_net_is_bad_gateway() {
    let (app, _) = mock_router(true, false);
    let (status, body) = get(&app, "/api/v1/roles/ribbon/resolve").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], 502);
    assert_eq!(body["message"], "upstream: server-error: upstream down");
}

#[tokio::test]
async fn diagnostics_reflect_requests() {
    let (app, _) = mock_router(false, true);

    let (status, body) = get(&app, "/api/v1/diagnostics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["counters"]["requestCount"], 0);
    assert!(body["lastDecision"].is_null());
    assert_eq!(body["cache"]["hasValue"], false);

    get(&app, "/api/v1/roles/ribbon/resolve").await;

    let (_, body) = get(&app, "/api/v1/diagnostics").await;
    assert_eq!(body["counters"]["requestCount"], 1);
    assert_eq!(body["counters"]["upstreamCallCount"], 1);
    assert_eq!(body["lastDecision"]["outcome"], "resolved");
    assert_eq!(body["lastDecision"]["sourceProvider"], "upstream");
    assert_eq!(body["cache"]["hasValue"], true);
    assert_eq!(body["cache"]["entries"][0]["key"], "ribbon");
}

#[tokio::test]
async fn loads_documents_from_files() {
    let tmp = tempfile::tempdir().unwrap();
    let roles_path = tmp.path().join("roles.json");
    std::fs::write(
        &roles_path,
        r#"{ "roles": [ { "role": "fx", "primary": "demo", "symbols": ["usd_chf"] } ] }"#,
    )
    .unwrap();

    let providers_doc = r#"{ "safetyNet": "demo", "providers": [
        { "id": "demo", "capabilities": ["fx"], "adapter": "demo" }
    ] }"#;
    let providers_path = tmp.path().join("providers.json");
    std::fs::write(&providers_path, providers_doc).unwrap();

    let config = Config {
        providers_file: Some(providers_path),
        roles_file: Some(roles_path),
        ..test_config()
    };
    let app = app_router(build_state(&config).unwrap(), &config);

    let (status, body) = get(&app, "/api/v1/roles/fx/resolve").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "demo");
    assert_eq!(body["data"][0]["symbol"], "USD/CHF");
}

#[tokio::test]
async fn missing_document_fails_startup() {
    let config = Config {
        roles_file: Some("/nonexistent/roles.json".into()),
        ..test_config()
    };
    assert!(build_state(&config).is_err());
}

async fn exchange_rate(
    State(hits): State<Arc<AtomicUsize>>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "Realtime Currency Exchange Rate": {
            "1. From_Currency Code": query.get("from_currency"),
            "3. To_Currency Code": query.get("to_currency"),
            "5. Exchange Rate": "1.2345",
            "6. Last Refreshed": "2024-01-15 10:00:01"
        }
    }))
}

/// Serve a stand-in for the Alpha Vantage query endpoint and return its base URL.
async fn spawn_exchange_rate_upstream(hits: Arc<AtomicUsize>) -> String {
    let upstream = Router::new()
        .route("/query", get_route(exchange_rate))
        .with_state(hits);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, upstream).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn budget_counts_each_request_of_a_per_pair_provider() {
    std::env::set_var("QG_TEST_ALPHA_VANTAGE_KEY", "test-key");
    let hits = Arc::new(AtomicUsize::new(0));
    let endpoint = spawn_exchange_rate_upstream(hits.clone()).await;

    let providers = format!(
        r#"{{ "safetyNet": "demo", "providers": [
            {{
                "id": "alpha_vantage", "capabilities": ["ribbon"], "adapter": "alpha_vantage",
                "endpoint": "{}",
                "auth": {{ "type": "env", "var": "QG_TEST_ALPHA_VANTAGE_KEY" }},
                "budget": {{ "dailyLimit": 3, "blockPct": 100 }}
            }},
            {{ "id": "demo", "capabilities": ["ribbon"], "adapter": "demo" }}
        ] }}"#,
        endpoint
    );
    let roles = r#"{ "roles": [
        {
            "role": "ribbon", "primary": "alpha_vantage", "cacheTtlSeconds": 60,
            "symbols": ["EURUSD", "GBPUSD", "USDJPY", "USDCHF", "AUDUSD", "USDCAD"]
        }
    ] }"#;
    let catalog = GatewayCatalog::load(&providers, roles, &AdapterSet::builtin()).unwrap();
    let app = app_router(
        AppState::new(ResolutionEngine::from_catalog(&catalog)),
        &test_config(),
    );

    let (status, body) = get(&app, "/api/v1/roles/ribbon/resolve?bypassCache=true").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "live");
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    for _ in 0..2 {
        let (_, body) = get(&app, "/api/v1/roles/ribbon/resolve?bypassCache=true").await;
        assert_eq!(body["mode"], "demo");
    }

    assert_eq!(hits.load(Ordering::SeqCst), 3);
    let (_, diagnostics) = get(&app, "/api/v1/diagnostics").await;
    assert_eq!(diagnostics["counters"]["upstreamCallCount"], 3);
    assert_eq!(diagnostics["counters"]["upstream429Count"], 0);
    assert_eq!(diagnostics["budget"][0]["providerId"], "alpha_vantage");
    assert_eq!(diagnostics["budget"][0]["dailyUsed"], 3);
    assert_eq!(diagnostics["budget"][0]["state"], "blocked");
}
