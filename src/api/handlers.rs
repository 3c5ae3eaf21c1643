// Route handlers module
//
// Each handler is a read-modify-write against one or two store keys.
// Mutations go through a bounded compare-and-swap retry so concurrent
// writers cannot silently lose updates.

use chrono::Utc;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::response;
use super::token;
use super::types::{
    AuthOutcome, CreatePostRequest, CreateServerRequest, Credentials, LoginSuccess, PublicUser,
};
use super::ApiError;
use crate::config::AppState;
use crate::models::{Post, Server, Stats, User};
use crate::store::{JsonStore, StoreError};

/// Store keys, one whole collection per key
const POSTS_KEY: &str = "posts";
const SERVERS_KEY: &str = "servers";
const USERS_KEY: &str = "users";

/// Bounded retries for the get-mutate-put cycle under write contention
const CAS_RETRIES: usize = 4;

// User-facing messages, kept verbatim from the original service
const MSG_POST_FIELDS_REQUIRED: &str = "标题和内容不能为空";
const MSG_SERVER_FIELDS_REQUIRED: &str = "名称、IP和描述不能为空";
const MSG_CREDENTIALS_REQUIRED: &str = "用户名和密码不能为空";
const MSG_USERNAME_TAKEN: &str = "用户名已存在";
const MSG_REGISTERED: &str = "注册成功";
const MSG_BAD_CREDENTIALS: &str = "用户名或密码错误";

type ApiResult = Result<Response<Full<Bytes>>, ApiError>;

/// GET /api/posts
pub async fn list_posts(state: &Arc<AppState>) -> ApiResult {
    let posts: Vec<Post> = load_collection(&state.store, POSTS_KEY).await?;
    Ok(response::json_response(StatusCode::OK, &posts))
}

/// POST /api/posts
pub async fn create_post(state: &Arc<AppState>, body: &Bytes) -> ApiResult {
    let req: CreatePostRequest = serde_json::from_slice(body)?;
    if !req.is_valid() {
        return Ok(response::bad_request(MSG_POST_FIELDS_REQUIRED));
    }

    let post = req.into_post(&state.config.community, Utc::now());
    prepend(&state.store, POSTS_KEY, &post).await?;
    Ok(response::json_response(StatusCode::CREATED, &post))
}

/// GET /api/servers
pub async fn list_servers(state: &Arc<AppState>) -> ApiResult {
    let servers: Vec<Server> = load_collection(&state.store, SERVERS_KEY).await?;
    Ok(response::json_response(StatusCode::OK, &servers))
}

/// POST /api/servers
pub async fn create_server(state: &Arc<AppState>, body: &Bytes) -> ApiResult {
    let req: CreateServerRequest = serde_json::from_slice(body)?;
    if !req.is_valid() {
        return Ok(response::bad_request(MSG_SERVER_FIELDS_REQUIRED));
    }

    let server = req.into_server(&state.config.community, Utc::now());
    prepend(&state.store, SERVERS_KEY, &server).await?;
    Ok(response::json_response(StatusCode::CREATED, &server))
}

/// POST /api/auth/register
///
/// Empty or duplicate usernames answer HTTP 200 with `success:false`,
/// matching the original service's status convention.
pub async fn register(state: &Arc<AppState>, body: &Bytes) -> ApiResult {
    let creds: Credentials = serde_json::from_slice(body)?;
    if !creds.is_valid() {
        return Ok(response::json_response(
            StatusCode::OK,
            &AuthOutcome::failure(MSG_CREDENTIALS_REQUIRED),
        ));
    }

    for _ in 0..CAS_RETRIES {
        let current = state.store.get(USERS_KEY).await?;
        let mut users: HashMap<String, User> = decode_or_default(current.value)?;

        if users.contains_key(&creds.username) {
            return Ok(response::json_response(
                StatusCode::OK,
                &AuthOutcome::failure(MSG_USERNAME_TAKEN),
            ));
        }

        let user = User::new(creds.username.clone(), creds.password.clone(), Utc::now());
        users.insert(user.username.clone(), user);

        match state
            .store
            .put(USERS_KEY, serde_json::to_value(&users)?, current.version)
            .await
        {
            Ok(_) => {
                return Ok(response::json_response(
                    StatusCode::OK,
                    &AuthOutcome::ok(MSG_REGISTERED),
                ))
            }
            Err(StoreError::VersionConflict { .. }) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(ApiError::Contention(USERS_KEY))
}

/// POST /api/auth/login
///
/// Verifies the password exactly and issues the opaque token on success.
/// Unknown users are not auto-created; any mismatch answers 200 with
/// `success:false`.
pub async fn login(state: &Arc<AppState>, body: &Bytes) -> ApiResult {
    let creds: Credentials = serde_json::from_slice(body)?;
    let users: HashMap<String, User> =
        decode_or_default(state.store.get(USERS_KEY).await?.value)?;

    match users.get(&creds.username) {
        Some(user) if user.password == creds.password => {
            let issued = token::issue(user.id, &user.username, Utc::now());
            Ok(response::json_response(
                StatusCode::OK,
                &LoginSuccess {
                    success: true,
                    token: issued,
                    user: PublicUser {
                        id: user.id,
                        username: user.username.clone(),
                    },
                },
            ))
        }
        _ => Ok(response::json_response(
            StatusCode::OK,
            &AuthOutcome::failure(MSG_BAD_CREDENTIALS),
        )),
    }
}

/// GET /api/stats
///
/// Counts whatever is currently stored; each key is fetched
/// independently, exactly like the original service.
pub async fn stats(state: &Arc<AppState>) -> ApiResult {
    let posts = state.store.get(POSTS_KEY).await?.value;
    let servers = state.store.get(SERVERS_KEY).await?.value;
    let users = state.store.get(USERS_KEY).await?.value;

    let counts = Stats {
        posts: posts.as_ref().and_then(Value::as_array).map_or(0, Vec::len),
        servers: servers.as_ref().and_then(Value::as_array).map_or(0, Vec::len),
        users: users
            .as_ref()
            .and_then(Value::as_object)
            .map_or(0, serde_json::Map::len),
    };

    Ok(response::json_response(StatusCode::OK, &counts))
}

/// Fetch and decode a whole collection, empty when the key is absent
async fn load_collection<T: DeserializeOwned>(
    store: &Arc<dyn JsonStore>,
    key: &str,
) -> Result<Vec<T>, ApiError> {
    decode_or_default(store.get(key).await?.value)
}

/// Insert an entity at the front of its collection (newest first) with
/// a compare-and-swap retry loop.
async fn prepend<T>(store: &Arc<dyn JsonStore>, key: &'static str, entity: &T) -> Result<(), ApiError>
where
    T: Serialize + DeserializeOwned + Clone,
{
    for _ in 0..CAS_RETRIES {
        let current = store.get(key).await?;
        let mut items: Vec<T> = decode_or_default(current.value)?;
        items.insert(0, entity.clone());

        match store
            .put(key, serde_json::to_value(&items)?, current.version)
            .await
        {
            Ok(_) => return Ok(()),
            Err(StoreError::VersionConflict { .. }) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(ApiError::Contention(key))
}

fn decode_or_default<T: DeserializeOwned + Default>(value: Option<Value>) -> Result<T, ApiError> {
    match value {
        Some(v) => Ok(serde_json::from_value(v)?),
        None => Ok(T::default()),
    }
}
