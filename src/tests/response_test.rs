use crate::error::EmbernetErrorKind;
use crate::res::response_cookie::{CookieOptions, CookieSameSiteOptions, ResponseCookie};
use crate::res::response_status::StatusCode;
use crate::res::{ExchangeState, HttpResponse};
use http_body_util::BodyExt;

#[test]
fn builder_chain_sets_status_and_body() {
    let response = HttpResponse::new().ok().text("hello");
    assert_eq!(response.status_code(), StatusCode::Ok);
    assert!(response.is_written());
}

#[test]
fn status_codes_round_trip() {
    assert_eq!(StatusCode::from_u16(404), StatusCode::NotFound);
    assert_eq!(StatusCode::from_u16(418), StatusCode::Custom(418));
    assert_eq!(StatusCode::Custom(418).as_u16(), 418);
    assert_eq!(StatusCode::NotFound.to_string(), "404 Not Found");
    assert!(StatusCode::Ok.is_success());
    assert!(StatusCode::NotFound.is_client_error());
    assert!(StatusCode::InternalServerError.is_server_error());
}

#[test]
fn state_machine_is_one_way() {
    let mut response = HttpResponse::new();
    assert_eq!(response.state(), ExchangeState::Open);
    response.mark_headers_sent().unwrap();
    assert_eq!(response.state(), ExchangeState::HeadersSent);

    let err = response.mark_headers_sent().unwrap_err();
    assert_eq!(err.kind, EmbernetErrorKind::HeadersAlreadySent);

    response.mark_body_flushing();
    assert_eq!(response.state(), ExchangeState::BodyFlushing);
    response.mark_closed();
    assert_eq!(response.state(), ExchangeState::Closed);
}

#[test]
fn mutation_after_send_fails_and_leaves_state_untouched() {
    let mut response = HttpResponse::new().ok().text("body");
    response.mark_headers_sent().unwrap();

    let err = response.try_set_status(StatusCode::NotFound).unwrap_err();
    assert_eq!(err.kind, EmbernetErrorKind::HeadersAlreadySent);
    assert_eq!(response.status_code(), StatusCode::Ok);

    let err = response.try_insert_header("X-Late", "1").unwrap_err();
    assert_eq!(err.kind, EmbernetErrorKind::HeadersAlreadySent);
    assert!(!response.headers.contains_key("X-Late"));

    let err = response
        .try_set_cookie("late", "1", CookieOptions::default())
        .unwrap_err();
    assert_eq!(err.kind, EmbernetErrorKind::HeadersAlreadySent);
}

#[test]
fn builder_sugar_is_inert_after_send() {
    let mut response = HttpResponse::new().ok().text("body");
    response.mark_headers_sent().unwrap();
    let response = response.not_found().text("replaced");
    assert_eq!(response.status_code(), StatusCode::Ok);
}

#[tokio::test]
async fn conversion_serializes_status_headers_cookies_and_body() {
    let response = HttpResponse::new()
        .created()
        .set_header("X-Trace", "abc")
        .set_cookie("sid", "value", None)
        .text("made");

    let hyper_response = response.into_hyper_response();
    assert_eq!(hyper_response.status(), hyper::StatusCode::CREATED);
    assert_eq!(
        hyper_response
            .headers()
            .get("X-Trace")
            .and_then(|v| v.to_str().ok()),
        Some("abc")
    );
    let set_cookie = hyper_response
        .headers()
        .get(hyper::header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("sid=value"));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Path=/"));

    let body = hyper_response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"made");
}

#[test]
fn removal_cookie_carries_deletion_markers() {
    let marker = ResponseCookie::removal("CNET_SID", &CookieOptions::default());
    let header = marker.to_header_value();
    assert!(header.starts_with("CNET_SID="));
    assert!(header.contains("Max-Age=0"));
    assert!(header.contains("Expires=Thu, 01 Jan 1970"));
}

#[test]
fn same_site_options_serialize() {
    let mut options = CookieOptions::default();
    options.same_site = CookieSameSiteOptions::Strict;
    options.secure = true;
    let cookie = ResponseCookie {
        name: "a".to_string(),
        value: "b".to_string(),
        options,
    };
    let header = cookie.to_header_value();
    assert!(header.contains("SameSite=Strict"));
    assert!(header.contains("Secure"));
}

#[test]
fn one_scheduled_cookie_per_name_latest_wins() {
    let response = HttpResponse::new()
        .set_cookie("sid", "first", None)
        .set_cookie("sid", "second", None);
    let hyper_response = response.into_hyper_response();
    let values: Vec<_> = hyper_response
        .headers()
        .get_all(hyper::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    assert_eq!(values.len(), 1);
    assert!(values[0].starts_with("sid=second"));
}

#[tokio::test]
async fn json_body_sets_content_type() {
    let response = HttpResponse::new().ok().json(serde_json::json!({"k": "v"}));
    let hyper_response = response.into_hyper_response();
    assert_eq!(
        hyper_response
            .headers()
            .get(hyper::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("application/json")
    );
    let body = hyper_response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], br#"{"k":"v"}"#);
}
