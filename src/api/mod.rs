// API module entry
// Request routing: method/path match over the six endpoints, with the
// CORS preflight short-circuit and the single top-level error boundary

mod handlers;
mod response;
mod token;
mod types;

use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use thiserror::Error;

use crate::config::AppState;
use crate::logger::{self, AccessLogEntry};
use crate::store::StoreError;

/// Failures that escape a handler. All of them surface as the 500
/// envelope; validation and auth outcomes are ordinary responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Malformed request body, or a stored blob that no longer decodes
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("write contention on '{0}' persisted after retries")]
    Contention(&'static str),
}

/// Main entry point for HTTP request handling.
///
/// Generic over the body type so tests can drive it with `Full<Bytes>`
/// while the server feeds it `hyper::body::Incoming`.
pub async fn handle_request<B>(
    req: Request<B>,
    peer_addr: SocketAddr,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let started = std::time::Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let resp = process(req, &state).await;

    if state.cached_access_log.load(Ordering::Relaxed) {
        let mut entry = AccessLogEntry::new(peer_addr.ip().to_string(), method, path);
        entry.status = resp.status().as_u16();
        entry.body_bytes = resp.body().size_hint().exact().unwrap_or(0);
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(resp)
}

async fn process<B>(req: Request<B>, state: &Arc<AppState>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    // 1. Preflight short-circuit before anything touches the body
    if req.method() == Method::OPTIONS {
        return response::preflight();
    }

    // 2. Reject bodies whose declared size exceeds the limit
    if let Some(resp) = check_body_size(&req, state.config.http.max_body_size) {
        return resp;
    }

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    // 3. Read the full body before dispatch
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => return response::server_error(&format!("failed to read request body: {e}")),
    };

    // 4. Dispatch; anything a handler could not turn into a response
    //    becomes the 500 envelope here
    match dispatch(&method, &path, &body, state).await {
        Ok(resp) => resp,
        Err(err) => {
            logger::log_error(&format!("{method} {path}: {err}"));
            response::server_error(&err.to_string())
        }
    }
}

/// Validate Content-Length header and return 413 if exceeded
fn check_body_size<B>(req: &Request<B>, max_body_size: u64) -> Option<Response<Full<Bytes>>> {
    let content_length = req.headers().get("content-length")?;
    content_length.to_str().map_or_else(
        |_| {
            logger::log_warning("Content-Length header contains non-ASCII characters");
            None
        },
        |size_str| match size_str.parse::<u64>() {
            Ok(size) if size > max_body_size => {
                logger::log_warning(&format!(
                    "Request body too large: {size} bytes (max: {max_body_size})"
                ));
                Some(response::payload_too_large(max_body_size))
            }
            Err(_) => {
                logger::log_warning(&format!(
                    "Invalid Content-Length value: '{size_str}', skipping size check"
                ));
                None
            }
            _ => None,
        },
    )
}

/// Route table: method + path, exact matches only
async fn dispatch(
    method: &Method,
    path: &str,
    body: &Bytes,
    state: &Arc<AppState>,
) -> Result<Response<Full<Bytes>>, ApiError> {
    match (method, path) {
        (&Method::GET, "/api/posts") => handlers::list_posts(state).await,
        (&Method::POST, "/api/posts") => handlers::create_post(state, body).await,
        (&Method::GET, "/api/servers") => handlers::list_servers(state).await,
        (&Method::POST, "/api/servers") => handlers::create_server(state, body).await,
        (&Method::POST, "/api/auth/register") => handlers::register(state, body).await,
        (&Method::POST, "/api/auth/login") => handlers::login(state, body).await,
        (&Method::GET, "/api/stats") => handlers::stats(state).await,
        _ => Ok(response::not_found()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::memory::MemoryStore;
    use hyper::StatusCode;
    use serde_json::{json, Value};

    fn test_state() -> Arc<AppState> {
        let config = Config::load_from("does-not-exist").expect("defaults should apply");
        Arc::new(AppState::new(config, Arc::new(MemoryStore::new())))
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:54321".parse().unwrap()
    }

    fn request(method: Method, path: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn send(
        state: &Arc<AppState>,
        method: Method,
        path: &str,
        body: &str,
    ) -> (StatusCode, Value) {
        let resp = handle_request(request(method, path, body), peer(), Arc::clone(state))
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_options_any_path_is_empty_200_with_cors() {
        let state = test_state();
        let resp = handle_request(
            request(Method::OPTIONS, "/anything/at/all", ""),
            peer(),
            Arc::clone(&state),
        )
        .await
        .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let headers = resp.headers();
        assert_eq!(headers.get("Access-Control-Allow-Origin").unwrap(), "*");
        assert_eq!(
            headers.get("Access-Control-Allow-Methods").unwrap(),
            "GET, POST, PUT, DELETE, OPTIONS"
        );
        assert_eq!(
            headers.get("Access-Control-Allow-Headers").unwrap(),
            "Content-Type, Authorization"
        );
        assert_eq!(headers.get("Content-Type").unwrap(), "application/json");

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_posts_empty_before_any_write() {
        let state = test_state();
        let (status, body) = send(&state, Method::GET, "/api/posts", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_created_post_comes_back_first_on_list() {
        let state = test_state();
        let (status, created) = send(
            &state,
            Method::POST,
            "/api/posts",
            r#"{"title":"hello","content":"world"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(created["id"].is_i64());
        assert_eq!(created["platform"], "java");
        assert_eq!(created["author"], "匿名玩家");

        let (_, listed) = send(&state, Method::GET, "/api/posts", "").await;
        assert_eq!(listed[0], created);
    }

    #[tokio::test]
    async fn test_post_ids_non_decreasing_newest_first() {
        let state = test_state();
        send(
            &state,
            Method::POST,
            "/api/posts",
            r#"{"title":"first","content":"a"}"#,
        )
        .await;
        send(
            &state,
            Method::POST,
            "/api/posts",
            r#"{"title":"second","content":"b"}"#,
        )
        .await;

        let (_, listed) = send(&state, Method::GET, "/api/posts", "").await;
        assert_eq!(listed[0]["title"], "second");
        assert_eq!(listed[1]["title"], "first");
        assert!(listed[0]["id"].as_i64().unwrap() >= listed[1]["id"].as_i64().unwrap());
    }

    #[tokio::test]
    async fn test_post_missing_content_is_400_and_store_untouched() {
        let state = test_state();
        let (status, body) = send(&state, Method::POST, "/api/posts", r#"{"title":"x"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "标题和内容不能为空");

        let (_, listed) = send(&state, Method::GET, "/api/posts", "").await;
        assert_eq!(listed, json!([]));
    }

    #[tokio::test]
    async fn test_server_creation_scenario() {
        let state = test_state();
        let (status, server) = send(
            &state,
            Method::POST,
            "/api/servers",
            r#"{"name":"Test","ip":"1.2.3.4","description":"x"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert!(server["id"].is_i64());
        assert_eq!(server["name"], "Test");
        assert_eq!(server["ip"], "1.2.3.4");
        assert_eq!(server["platform"], "java");
        assert_eq!(server["author"], "匿名");
        let created_at = server["createdAt"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(created_at).is_ok());
    }

    #[tokio::test]
    async fn test_server_missing_fields_is_400() {
        let state = test_state();
        let (status, body) = send(
            &state,
            Method::POST,
            "/api/servers",
            r#"{"name":"Test","ip":"1.2.3.4"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "名称、IP和描述不能为空");
    }

    #[tokio::test]
    async fn test_register_then_duplicate_leaves_user_count_alone() {
        let state = test_state();
        let creds = r#"{"username":"steve","password":"hunter2"}"#;

        let (status, body) = send(&state, Method::POST, "/api/auth/register", creds).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (status, body) = send(&state, Method::POST, "/api/auth/register", creds).await;
        // Auth failures keep HTTP 200 by design
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "用户名已存在");

        let (_, stats) = send(&state, Method::GET, "/api/stats", "").await;
        assert_eq!(stats["users"], 1);
    }

    #[tokio::test]
    async fn test_register_rejects_empty_fields() {
        let state = test_state();
        let (status, body) = send(
            &state,
            Method::POST,
            "/api/auth/register",
            r#"{"username":"","password":"pw"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "用户名和密码不能为空");
    }

    #[tokio::test]
    async fn test_login_issues_decodable_token() {
        let state = test_state();
        send(
            &state,
            Method::POST,
            "/api/auth/register",
            r#"{"username":"steve","password":"hunter2"}"#,
        )
        .await;

        let before = chrono::Utc::now().timestamp_millis();
        let (status, body) = send(
            &state,
            Method::POST,
            "/api/auth/login",
            r#"{"username":"steve","password":"hunter2"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["user"]["username"], "steve");
        assert!(body["user"]["id"].is_i64());

        let claims = token::decode(body["token"].as_str().unwrap()).expect("token decodes");
        assert_eq!(claims.username, "steve");
        assert_eq!(claims.user_id, body["user"]["id"].as_i64().unwrap());
        // Expiry lands 7 days after some instant during this test
        assert!(claims.exp >= before + token::TOKEN_TTL_MS);
    }

    #[tokio::test]
    async fn test_login_wrong_password_fails_with_200() {
        let state = test_state();
        send(
            &state,
            Method::POST,
            "/api/auth/register",
            r#"{"username":"steve","password":"hunter2"}"#,
        )
        .await;

        let (status, body) = send(
            &state,
            Method::POST,
            "/api/auth/login",
            r#"{"username":"steve","password":"wrong"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "用户名或密码错误");
    }

    #[tokio::test]
    async fn test_login_unknown_user_is_not_auto_created() {
        let state = test_state();
        let (status, body) = send(
            &state,
            Method::POST,
            "/api/auth/login",
            r#"{"username":"nobody","password":"pw"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);

        let (_, stats) = send(&state, Method::GET, "/api/stats", "").await;
        assert_eq!(stats["users"], 0);
    }

    #[tokio::test]
    async fn test_stats_counts_match_collections() {
        let state = test_state();
        send(
            &state,
            Method::POST,
            "/api/posts",
            r#"{"title":"t","content":"c"}"#,
        )
        .await;
        send(
            &state,
            Method::POST,
            "/api/servers",
            r#"{"name":"n","ip":"1.1.1.1","description":"d"}"#,
        )
        .await;
        send(
            &state,
            Method::POST,
            "/api/auth/register",
            r#"{"username":"u","password":"p"}"#,
        )
        .await;

        let (status, stats) = send(&state, Method::GET, "/api/stats", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats, json!({"posts": 1, "servers": 1, "users": 1}));
    }

    #[tokio::test]
    async fn test_unmatched_route_is_404() {
        let state = test_state();
        let (status, body) = send(&state, Method::GET, "/api/nope", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not found");

        // Wrong method on a known path is also a routing miss
        let (status, _) = send(&state, Method::PUT, "/api/posts", "{}").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_json_body_is_500_envelope() {
        let state = test_state();
        let (status, body) = send(&state, Method::POST, "/api/posts", "{oops").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Server error");
        assert!(body["message"].as_str().unwrap().contains("malformed JSON"));
    }

    #[tokio::test]
    async fn test_declared_oversized_body_is_413() {
        let state = test_state();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/posts")
            .header("content-length", "999999999")
            .body(Full::new(Bytes::from_static(b"{}")))
            .unwrap();

        let resp = handle_request(req, peer(), Arc::clone(&state)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
