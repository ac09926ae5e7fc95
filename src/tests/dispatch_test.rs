use crate::app::{EndpointSpec, Server, ServerConfig};
use crate::cors::CorsPolicy;
use crate::exchange::{CancelSignal, Exchange};
use crate::middlewares::{CallbackInfo, Middleware};
use crate::session::driver::{MemorySessionDriver, SessionDriver};
use crate::session::manager::{SessionConfig, SESSION_COOKIE_NAME};
use crate::types::{HttpMethods, Priority};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn test_server() -> Server {
    Server::with_config(ServerConfig {
        session: SessionConfig {
            driver: Some(Arc::new(MemorySessionDriver::new()) as Arc<dyn SessionDriver>),
            ..Default::default()
        },
        ..Default::default()
    })
}

fn request(method: &str, uri: &str) -> hyper::Request<Full<Bytes>> {
    hyper::Request::builder()
        .method(method)
        .uri(uri)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

async fn send(
    server: &Server,
    request: hyper::Request<Full<Bytes>>,
) -> hyper::Response<Full<Bytes>> {
    server
        .dispatcher()
        .handle(request, "127.0.0.1".to_string(), CancelSignal::new())
        .await
}

async fn body_text(response: hyper::Response<Full<Bytes>>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// Scenario: plain GET.

#[tokio::test]
async fn plain_get_returns_the_handler_body() {
    let server = test_server();
    server
        .get("/hello", |ex| async move {
            ex.respond(|res| res.ok().text("hi"))
        })
        .unwrap();

    let response = send(&server, request("GET", "/hello")).await;
    assert_eq!(response.status(), hyper::StatusCode::OK);
    assert_eq!(body_text(response).await, "hi");
}

#[tokio::test]
async fn dispatch_is_deterministic_for_a_fixed_registry() {
    let server = test_server();
    server
        .get("/ping", |ex| async move { ex.respond(|res| res.ok().text("pong")) })
        .unwrap();

    for _ in 0..3 {
        let response = send(&server, request("GET", "/ping")).await;
        assert_eq!(body_text(response).await, "pong");
    }
}

// Scenario: placeholder + method filter.

#[tokio::test]
async fn method_filter_selects_the_matching_mapping() {
    let server = test_server();
    server
        .get("/users/{id:int}", |ex| async move {
            let id: i64 = ex.request().param("id").unwrap();
            ex.respond(move |res| res.ok().text(format!("A{}", id)))
        })
        .unwrap();
    server
        .post("/users/{id:int}", |ex| async move {
            let id: i64 = ex.request().param("id").unwrap();
            ex.respond(move |res| res.ok().text(format!("B{}", id)))
        })
        .unwrap();

    let response = send(&server, request("POST", "/users/42")).await;
    assert_eq!(response.status(), hyper::StatusCode::OK);
    assert_eq!(body_text(response).await, "B42");

    let response = send(&server, request("GET", "/users/7")).await;
    assert_eq!(body_text(response).await, "A7");

    // The int placeholder refuses non-digits outright.
    let response = send(&server, request("GET", "/users/abc")).await;
    assert_eq!(response.status(), hyper::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn method_only_mismatch_yields_405() {
    let server = test_server();
    server
        .get("/only-get", |ex| async move { ex.respond(|res| res.ok()) })
        .unwrap();

    let response = send(&server, request("PUT", "/only-get")).await;
    assert_eq!(response.status(), hyper::StatusCode::METHOD_NOT_ALLOWED);

    let response = send(&server, request("GET", "/nope")).await;
    assert_eq!(response.status(), hyper::StatusCode::NOT_FOUND);
}

// Scenario: requirement-driven 404/405.

#[tokio::test]
async fn header_requirement_gates_the_mapping() {
    let server = test_server();
    server
        .endpoint(
            EndpointSpec::get("/admin").require_header("X-Auth"),
            |ex| async move { ex.respond(|res| res.ok().text("admin")) },
        )
        .unwrap();

    // Missing header: the mapping fails on more than the method, so 404.
    let response = send(&server, request("GET", "/admin")).await;
    assert_eq!(response.status(), hyper::StatusCode::NOT_FOUND);

    // Wrong method and missing header: still 404.
    let response = send(&server, request("PUT", "/admin")).await;
    assert_eq!(response.status(), hyper::StatusCode::NOT_FOUND);

    let response = send(
        &server,
        hyper::Request::builder()
            .method("GET")
            .uri("/admin")
            .header("X-Auth", "x")
            .body(Full::new(Bytes::new()))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), hyper::StatusCode::OK);
    assert_eq!(body_text(response).await, "admin");
}

// Scenario: middleware cancel.

struct Gate {
    write_response: bool,
}

#[async_trait]
impl Middleware for Gate {
    fn name(&self) -> &str {
        "gate"
    }

    async fn handle(&self, callback: &mut CallbackInfo, exchange: &mut Exchange) {
        callback.cancel("halt");
        if self.write_response {
            let response = std::mem::take(exchange.response_mut());
            *exchange.response_mut() = response.forbidden().text("nope");
        }
    }
}

#[tokio::test]
async fn cancelled_request_never_enters_the_handler() {
    let server = test_server();
    let entered = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&entered);
    server
        .endpoint(
            EndpointSpec::get("/guarded").middleware(Arc::new(Gate {
                write_response: true,
            })),
            move |ex| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.store(true, Ordering::SeqCst);
                    ex.respond(|res| res.ok().text("handler"))
                }
            },
        )
        .unwrap();

    let response = send(&server, request("GET", "/guarded")).await;
    assert_eq!(response.status(), hyper::StatusCode::FORBIDDEN);
    // The middleware-written body survives; no default overwrite.
    assert_eq!(body_text(response).await, "nope");
    assert!(!entered.load(Ordering::SeqCst));
}

#[tokio::test]
async fn cancel_without_a_written_response_gets_the_engine_default() {
    let server = test_server();
    server
        .endpoint(
            EndpointSpec::get("/gated").middleware(Arc::new(Gate {
                write_response: false,
            })),
            |ex| async move { ex.respond(|res| res.ok().text("handler")) },
        )
        .unwrap();

    let response = send(&server, request("GET", "/gated")).await;
    assert_eq!(response.status(), hyper::StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, "halt");
}

#[tokio::test]
async fn transport_cancel_skips_middleware_and_handler() {
    let server = test_server();
    let entered = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&entered);
    server
        .endpoint(
            EndpointSpec::get("/doomed").middleware(Arc::new(Gate {
                write_response: true,
            })),
            move |ex| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.store(true, Ordering::SeqCst);
                    ex.respond(|res| res.ok().text("handler"))
                }
            },
        )
        .unwrap();

    let cancel = CancelSignal::new();
    cancel.cancel();
    let response = server
        .dispatcher()
        .handle(request("GET", "/doomed"), "127.0.0.1".to_string(), cancel)
        .await;

    // Neither the gate middleware nor the handler ran: the gate's 403 body
    // is absent and the handler flag stayed clear.
    assert!(!entered.load(Ordering::SeqCst));
    assert_eq!(body_text(response).await, "");
}

// Scenario: session round-trip.

#[tokio::test]
async fn session_round_trips_through_the_cookie() {
    let server = test_server();
    server
        .post("/login", |mut ex| async move {
            ex.make_session_persistent().await.unwrap();
            let session = ex.session().await.unwrap();
            session.put("user", "alice").unwrap();
            session.save().await;
            ex.respond(|res| res.ok().text("logged in"))
        })
        .unwrap();
    server
        .get("/me", |mut ex| async move {
            let session = ex.session().await.unwrap();
            let user: String = session.get("user").unwrap_or_default();
            ex.respond(move |res| res.ok().text(user))
        })
        .unwrap();

    let response = send(&server, request("POST", "/login")).await;
    assert_eq!(response.status(), hyper::StatusCode::OK);

    let cookies: Vec<String> = response
        .headers()
        .get_all(hyper::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect();
    let session_cookies: Vec<&String> = cookies
        .iter()
        .filter(|c| c.starts_with(SESSION_COOKIE_NAME))
        .collect();
    assert_eq!(session_cookies.len(), 1);

    let parsed = cookie::Cookie::parse(session_cookies[0].clone()).unwrap();
    let id = parsed.value().to_string();
    assert_eq!(id.len(), 20);
    assert!(session_cookies[0].contains("HttpOnly"));
    assert!(session_cookies[0].contains("Path=/"));
    assert!(session_cookies[0].contains("SameSite=Lax"));

    let response = send(
        &server,
        hyper::Request::builder()
            .method("GET")
            .uri("/me")
            .header(
                hyper::header::COOKIE,
                format!("{}={}", SESSION_COOKIE_NAME, id),
            )
            .body(Full::new(Bytes::new()))
            .unwrap(),
    )
    .await;
    assert_eq!(body_text(response).await, "alice");
}

// Scenario: CORS preflight.

#[tokio::test]
async fn cors_preflight_carries_the_policy_headers() {
    let mut config = ServerConfig {
        session: SessionConfig {
            driver: Some(Arc::new(MemorySessionDriver::new()) as Arc<dyn SessionDriver>),
            ..Default::default()
        },
        ..Default::default()
    };
    config.cors = CorsPolicy {
        allowed_origins: vec!["https://a.example".to_string()],
        allowed_methods: vec!["GET".to_string(), "POST".to_string()],
        allowed_headers: vec!["X-Custom".to_string()],
        max_age: 600,
        ..CorsPolicy::default()
    };
    let server = Server::with_config(config);
    server
        .endpoint(
            EndpointSpec::http("/x").method(HttpMethods::OPTIONS),
            |ex| async move { ex.respond(|res| res.ok()) },
        )
        .unwrap();

    let response = send(
        &server,
        hyper::Request::builder()
            .method("OPTIONS")
            .uri("/x")
            .header("Origin", "https://a.example")
            .header("Access-Control-Request-Headers", "X-Custom")
            .body(Full::new(Bytes::new()))
            .unwrap(),
    )
    .await;

    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    assert_eq!(
        header("Access-Control-Allow-Origin").as_deref(),
        Some("https://a.example")
    );
    assert_eq!(
        header("Access-Control-Allow-Methods").as_deref(),
        Some("GET, POST")
    );
    assert_eq!(
        header("Access-Control-Allow-Headers").as_deref(),
        Some("X-Custom")
    );
    assert_eq!(header("Access-Control-Max-Age").as_deref(), Some("600"));

    // Error responses carry the policy too.
    let missing = send(&server, request("GET", "/missing")).await;
    assert_eq!(missing.status(), hyper::StatusCode::NOT_FOUND);
    assert!(missing.headers().contains_key("Access-Control-Allow-Origin"));
}

// Ranking.

#[tokio::test]
async fn literal_segments_outrank_placeholders() {
    let server = test_server();
    server
        .get("/a/{x}", |ex| async move { ex.respond(|res| res.ok().text("placeholder")) })
        .unwrap();
    server
        .get("/a/b", |ex| async move { ex.respond(|res| res.ok().text("literal")) })
        .unwrap();

    let response = send(&server, request("GET", "/a/b")).await;
    assert_eq!(body_text(response).await, "literal");

    let response = send(&server, request("GET", "/a/z")).await;
    assert_eq!(body_text(response).await, "placeholder");
}

#[tokio::test]
async fn priority_outranks_literal_count() {
    let server = test_server();
    server
        .endpoint(
            EndpointSpec::get("/p/{x}").priority(Priority::High),
            |ex| async move { ex.respond(|res| res.ok().text("high")) },
        )
        .unwrap();
    server
        .get("/p/b", |ex| async move { ex.respond(|res| res.ok().text("normal")) })
        .unwrap();

    let response = send(&server, request("GET", "/p/b")).await;
    assert_eq!(body_text(response).await, "high");
}

#[tokio::test]
async fn insertion_order_breaks_remaining_ties() {
    let server = test_server();
    server
        .get("/t/{a}", |ex| async move { ex.respond(|res| res.ok().text("first")) })
        .unwrap();
    server
        .get("/t/{b}", |ex| async move { ex.respond(|res| res.ok().text("second")) })
        .unwrap();

    let response = send(&server, request("GET", "/t/z")).await;
    assert_eq!(body_text(response).await, "first");
}

// Error isolation.

#[tokio::test]
async fn handler_panic_surfaces_as_bodyless_500() {
    let server = test_server();
    server
        .get("/boom", |ex| async move {
            if ex.request().path == "/boom" {
                panic!("kaput");
            }
            ex
        })
        .unwrap();

    let response = send(&server, request("GET", "/boom")).await;
    assert_eq!(response.status(), hyper::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(response).await, "");
}

#[tokio::test]
async fn unregistered_endpoint_is_gone_after_unregister() {
    let server = test_server();
    let id = server
        .get("/temp", |ex| async move { ex.respond(|res| res.ok()) })
        .unwrap();

    let response = send(&server, request("GET", "/temp")).await;
    assert_eq!(response.status(), hyper::StatusCode::OK);

    server.unregister(id);
    let response = send(&server, request("GET", "/temp")).await;
    assert_eq!(response.status(), hyper::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn query_and_body_views_reach_the_handler() {
    let server = test_server();
    server
        .post("/echo", |ex| async move {
            let name = ex.request().get_query("name").unwrap_or("?").to_string();
            let value: serde_json::Value = ex.request().json().unwrap_or_default();
            ex.respond(move |res| {
                res.ok()
                    .json(serde_json::json!({ "name": name, "echo": value }))
            })
        })
        .unwrap();

    let response = send(
        &server,
        hyper::Request::builder()
            .method("POST")
            .uri("/echo?name=alice")
            .header(hyper::header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from_static(br#"{"k":1}"#)))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), hyper::StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["name"], "alice");
    assert_eq!(body["echo"]["k"], 1);
}
