use ahash::AHashMap;
use cookie::Cookie;
use url::form_urlencoded;

/// Splits a `Cookie` request header into name/value pairs. Malformed pairs
/// are skipped rather than failing the whole header.
pub(crate) fn parse_cookie_header(raw: &str) -> AHashMap<String, String> {
    let mut cookies = AHashMap::new();
    for parsed in Cookie::split_parse(raw.to_string()).flatten() {
        cookies.insert(parsed.name().to_string(), parsed.value().to_string());
    }
    cookies
}

/// Decodes a query string (or form-urlencoded body) into a map. On repeated
/// keys the last value wins.
pub(crate) fn parse_query_string(raw: &str) -> AHashMap<String, String> {
    form_urlencoded::parse(raw.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// True when the request headers ask for a WebSocket upgrade.
pub(crate) fn is_websocket_upgrade(headers: &hyper::HeaderMap) -> bool {
    let upgrade = headers
        .get(hyper::header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    let connection = headers
        .get(hyper::header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        })
        .unwrap_or(false);
    upgrade && connection
}

/// Computes the `Sec-WebSocket-Accept` value for an upgrade response.
pub(crate) fn websocket_accept_key(key: &str) -> String {
    tokio_tungstenite::tungstenite::handshake::derive_accept_key(key.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_header_splits_pairs() {
        let cookies = parse_cookie_header("a=1; b=2");
        assert_eq!(cookies.get("a").map(String::as_str), Some("1"));
        assert_eq!(cookies.get("b").map(String::as_str), Some("2"));
    }

    #[test]
    fn query_string_decodes_percent_escapes() {
        let params = parse_query_string("name=al%20ice&x=1");
        assert_eq!(params.get("name").map(String::as_str), Some("al ice"));
        assert_eq!(params.get("x").map(String::as_str), Some("1"));
    }
}
