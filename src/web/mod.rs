//! Web server module.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::datastore::DatastoreClient;
use crate::dispatch::Dispatcher;
use crate::store::Store;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<Store>,
    pub dispatcher: Arc<Dispatcher>,
    pub datastore: DatastoreClient,
}

/// Web server for Heartbeat.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(
        config: ServerConfig,
        store: Arc<Store>,
        dispatcher: Arc<Dispatcher>,
        datastore: DatastoreClient,
    ) -> Self {
        Self {
            state: AppState {
                config,
                store,
                dispatcher,
                datastore,
            },
        }
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = routes(self.state.clone());

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>()).await?;

        Ok(())
    }
}

/// Build the router with all routes.
pub fn routes(state: AppState) -> Router {
    let origin = HeaderValue::from_str(&state.config.cors_origin).unwrap_or(HeaderValue::from_static("*"));

    Router::new()
        .route("/", get(handlers::handle_index))
        .route("/api/v1/health", get(handlers::handle_health))
        // Monitoring
        .route("/api/v1/status", get(handlers::handle_status))
        .route("/api/v1/history", get(handlers::handle_history))
        .route("/api/v1/incidents", get(handlers::handle_incidents))
        // Email confirmation
        .route("/api/v1/auth/send-confirmation", post(handlers::handle_send_confirmation))
        .route("/api/v1/auth/confirm", get(handlers::handle_confirm))
        .route("/api/v1/auth/is-confirmed", get(handlers::handle_is_confirmed))
        .layer(middleware::from_fn_with_state(origin, cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Adds CORS headers to every response and answers preflights with 204.
async fn cors(State(origin): State<HeaderValue>, req: Request, next: Next) -> Response {
    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };

    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, apikey, Authorization"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Notifier;
    use crate::probe::ProbeSettings;
    use crate::store::{CheckRecord, HealthStatus, Target};
    use crate::testutil::spawn_server;

    use axum::{body::Body, http::Request as HttpRequest, Json};
    use chrono::Utc;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state(datastore_url: &str) -> AppState {
        let config = ServerConfig {
            cors_origin: "https://app.example.com".to_string(),
            datastore_url: datastore_url.to_string(),
            datastore_key: "anon".to_string(),
            ping_retry_delay: Duration::ZERO,
            confirm_token_secret: "test-secret".to_string(),
            confirm_store_path: String::new(),
            ..Default::default()
        };
        let store = Arc::new(Store::in_memory());
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            Notifier::disabled(),
            ProbeSettings::from_config(&config),
        ));
        let datastore = DatastoreClient::from_config(&config);
        AppState {
            config,
            store,
            dispatcher,
            datastore,
        }
    }

    async fn send(router: &Router, req: HttpRequest<Body>) -> (StatusCode, Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get_req(uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn record(ts: i64, status: HealthStatus) -> CheckRecord {
        CheckRecord {
            timestamp_ms: ts,
            status,
            latency_ms: 0,
            http_status_code: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_health_carries_cors_headers() {
        let router = routes(test_state("http://127.0.0.1:9"));
        let resp = router.oneshot(get_req("/api/v1/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example.com"
        );
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(serde_json::from_slice::<Value>(&bytes).unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_preflight_is_no_content() {
        let router = routes(test_state("http://127.0.0.1:9"));
        let req = HttpRequest::builder()
            .method("OPTIONS")
            .uri("/api/v1/status")
            .header("origin", "https://app.example.com")
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, POST, OPTIONS");
        assert_eq!(
            resp.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "Content-Type, apikey, Authorization"
        );
    }

    #[tokio::test]
    async fn test_history_requires_project_id() {
        let router = routes(test_state("http://127.0.0.1:9"));
        let (status, body) = send(&router, get_req("/api/v1/history")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "project_id is required");
    }

    #[tokio::test]
    async fn test_history_limits() {
        let state = test_state("http://127.0.0.1:9");
        let t = Target {
            id: "api".to_string(),
            name: "API".to_string(),
            url: "http://api".to_string(),
        };
        for ts in 0..60 {
            state.store.record_check(&t, record(ts, HealthStatus::Healthy));
        }
        let router = routes(state);

        let (status, body) = send(&router, get_req("/api/v1/history?project_id=api")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["projectId"], "api");
        let items = body["items"].as_array().unwrap();
        assert_eq!(items.len(), 48);
        assert_eq!(items[0]["ts"], 12);
        assert_eq!(items[47]["ts"], 59);

        let (_, body) = send(&router, get_req("/api/v1/history?project_id=api&limit=5")).await;
        assert_eq!(body["items"].as_array().unwrap().len(), 5);

        let (_, body) = send(&router, get_req("/api/v1/history?target_id=api&limit=9999")).await;
        assert_eq!(body["items"].as_array().unwrap().len(), 48);

        let (_, body) = send(&router, get_req("/api/v1/history?project_id=other")).await;
        assert_eq!(body["items"], json!([]));
    }

    #[tokio::test]
    async fn test_incidents_newest_first() {
        let state = test_state("http://127.0.0.1:9");
        let t = Target {
            id: "api".to_string(),
            name: "API".to_string(),
            url: "http://api".to_string(),
        };
        state.store.record_check(&t, record(1, HealthStatus::Healthy));
        state.store.record_check(&t, record(2, HealthStatus::Down));
        state.store.record_check(&t, record(3, HealthStatus::Healthy));
        let router = routes(state);

        let (status, body) = send(&router, get_req("/api/v1/incidents")).await;
        assert_eq!(status, StatusCode::OK);
        let items = body["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["message"], "Service recovered");
        assert_eq!(items[1]["message"], "Service went DOWN");
        assert_eq!(items[1]["projectName"], "API");

        let (_, body) = send(&router, get_req("/api/v1/incidents?limit=1")).await;
        assert_eq!(body["items"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_status_probes_datastore_targets() {
        let target_base = spawn_server(Router::new().route("/", get(|| async { "ok" }))).await;
        let listing = json!([
            {"id": "a", "name": "Alpha", "url": target_base},
            {"id": "b", "name": "Beta", "url": format!("{target_base}/missing")}
        ]);
        let datastore = Router::new().route(
            "/rest/v1/projects",
            get(move || {
                let listing = listing.clone();
                async move { Json(listing) }
            }),
        );
        let datastore_base = spawn_server(datastore).await;

        let state = test_state(&datastore_base);
        let store = state.store.clone();
        let router = routes(state);

        let (status, body) = send(&router, get_req("/api/v1/status")).await;
        assert_eq!(status, StatusCode::OK);
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["id"], "a");
        assert_eq!(items[0]["status"], "HEALTHY");
        assert_eq!(items[1]["status"], "DOWN");
        assert_eq!(items[1]["latency"], 0);

        assert_eq!(store.history("a", 0).len(), 1);
        assert_eq!(store.history("b", 0).len(), 1);
    }

    #[tokio::test]
    async fn test_status_fails_closed_when_datastore_unreachable() {
        let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", closed.local_addr().unwrap());
        drop(closed);

        let router = routes(test_state(&url));
        let (status, body) = send(&router, get_req("/api/v1/status")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "datastore connection error");
    }

    #[tokio::test]
    async fn test_status_fails_closed_on_datastore_error_status() {
        let datastore = Router::new().route(
            "/rest/v1/projects",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        );
        let base = spawn_server(datastore).await;

        let router = routes(test_state(&base));
        let (status, body) = send(&router, get_req("/api/v1/status")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], 503);
    }

    #[tokio::test]
    async fn test_confirmation_flow() {
        let router = routes(test_state("http://127.0.0.1:9"));

        let (status, body) = send(
            &router,
            post_json(
                "/api/v1/auth/send-confirmation",
                json!({"email": "Ann@Example.com", "username": "ann"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert!(body["expiresAt"].as_i64().unwrap() > Utc::now().timestamp());

        let link = reqwest::Url::parse(body["confirmLink"].as_str().unwrap()).unwrap();
        assert!(link.as_str().starts_with("http://localhost:5173/confirm?"));
        let token = link
            .query_pairs()
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        let (_, body) = send(&router, get_req("/api/v1/auth/is-confirmed?email=ann@example.com")).await;
        assert_eq!(body["confirmed"], false);

        let (status, body) = send(&router, get_req(&format!("/api/v1/auth/confirm?token={token}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "Ann@Example.com");
        assert_eq!(body["username"], "ann");

        let (_, body) = send(&router, get_req("/api/v1/auth/is-confirmed?email=ANN@example.com")).await;
        assert_eq!(body["confirmed"], true);

        let (_, body) = send(
            &router,
            post_json("/api/v1/auth/send-confirmation", json!({"email": "ann@example.com"})),
        )
        .await;
        assert_eq!(body["alreadyConfirmed"], true);
    }

    #[tokio::test]
    async fn test_confirm_rejects_bad_tokens() {
        let router = routes(test_state("http://127.0.0.1:9"));

        let (status, body) = send(&router, get_req("/api/v1/auth/confirm")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "token is required");

        let (status, body) = send(&router, get_req("/api/v1/auth/confirm?token=abc.def")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid or expired token");

        let (status, _) = send(&router, get_req("/api/v1/auth/is-confirmed")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_send_confirmation_validation() {
        let router = routes(test_state("http://127.0.0.1:9"));

        let (status, body) = send(
            &router,
            post_json("/api/v1/auth/send-confirmation", json!({"email": "not-an-email"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "email is required");

        let req = HttpRequest::builder()
            .method("POST")
            .uri("/api/v1/auth/send-confirmation")
            .header("content-type", "application/json")
            .body(Body::from("{broken"))
            .unwrap();
        let (status, body) = send(&router, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid json");
    }

    #[tokio::test]
    async fn test_send_confirmation_rate_limited_per_email() {
        let router = routes(test_state("http://127.0.0.1:9"));

        for i in 0..6 {
            let req = HttpRequest::builder()
                .method("POST")
                .uri("/api/v1/auth/send-confirmation")
                .header("content-type", "application/json")
                .header("x-forwarded-for", format!("10.0.0.{i}"))
                .body(Body::from(json!({"email": "spam@example.com"}).to_string()))
                .unwrap();
            let (status, body) = send(&router, req).await;
            if i < 5 {
                assert_eq!(status, StatusCode::OK, "request {i}");
            } else {
                assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(body["error"], "too many requests");
            }
        }
    }

    #[tokio::test]
    async fn test_send_confirmation_rate_limited_per_ip() {
        let router = routes(test_state("http://127.0.0.1:9"));

        for i in 0..11 {
            let req = HttpRequest::builder()
                .method("POST")
                .uri("/api/v1/auth/send-confirmation")
                .header("content-type", "application/json")
                .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
                .body(Body::from(json!({"email": format!("user{i}@example.com")}).to_string()))
                .unwrap();
            let (status, _) = send(&router, req).await;
            let expected = if i < 10 { StatusCode::OK } else { StatusCode::TOO_MANY_REQUESTS };
            assert_eq!(status, expected, "request {i}");
        }
    }
}
