//! In-memory Team Password Manager server for tests.
//!
//! # Design
//! Every request goes through one fallback handler that parses
//! `/index.php/api/vN/<resource>.json`, checks authentication and then
//! dispatches on the method and the resource segments. Collections are
//! paginated with a `link: <...>; rel="next"` header exactly like the real
//! service, using a configurable page size.
//!
//! Error shapes follow the service: authentication failures and unknown
//! resources answer with plain-text 403/404 bodies, while rejected
//! operations (locked passwords, missing fields) answer with a JSON body
//! carrying `error: true`.
//!
//! All requests are recorded so tests can inspect the headers the client
//! sent.

mod auth;
mod store;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use log::{debug, info, warn};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};

pub use store::{Store, COLLECTIONS};

pub const SERVER_VERSION: &str = "7.93.201";
pub const LATEST_VERSION: &str = "7.93.201";

/// Credentials the server accepts and its page size.
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub username: String,
    pub password: String,
    pub private_key: String,
    pub public_key: String,
    pub page_size: usize,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            username: "USER".to_string(),
            password: "PASS".to_string(),
            private_key: "private_secret".to_string(),
            public_key: "public_secret".to_string(),
            page_size: 20,
        }
    }
}

/// One request as the server received it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug)]
struct Inner {
    config: MockConfig,
    store: Store,
    requests: Vec<RecordedRequest>,
    failures: usize,
}

/// Shared handle on the server state. Clones see the same data.
#[derive(Debug, Clone)]
pub struct MockState(Arc<RwLock<Inner>>);

impl MockState {
    pub fn new(config: MockConfig) -> Self {
        let store = Store::new(&config.username);
        Self(Arc::new(RwLock::new(Inner {
            config,
            store,
            requests: Vec::new(),
            failures: 0,
        })))
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.0.read().await.requests.clone()
    }

    /// Blocking variant for callers outside the runtime.
    pub fn requests_blocking(&self) -> Vec<RecordedRequest> {
        self.0.blocking_read().requests.clone()
    }

    /// Insert a row directly, e.g. files, which have no create endpoint.
    pub async fn seed(&self, collection: &str, item: Value) -> Option<u64> {
        self.0.write().await.store.insert(collection, item)
    }

    pub fn seed_blocking(&self, collection: &str, item: Value) -> Option<u64> {
        self.0.blocking_write().store.insert(collection, item)
    }

    /// Answer the next `count` requests with a 500 HTML page.
    pub async fn fail_next(&self, count: usize) {
        self.0.write().await.failures = count;
    }

    pub fn fail_next_blocking(&self, count: usize) {
        self.0.blocking_write().failures = count;
    }
}

pub fn app() -> Router {
    app_with(MockState::new(MockConfig::default()))
}

pub fn app_with(state: MockState) -> Router {
    Router::new().fallback(handle).with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with(listener, MockState::new(MockConfig::default())).await
}

pub async fn run_with(listener: TcpListener, state: MockState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(state)).await
}

/// What a handler needs to know about the request besides its body.
struct Call<'a> {
    version: u8,
    origin: String,
    headers: &'a HeaderMap,
    page_size: usize,
}

impl Call<'_> {
    fn unlock_reason(&self) -> Option<&str> {
        self.headers
            .get("x-unlock-reason")
            .and_then(|value| value.to_str().ok())
            .filter(|reason| !reason.is_empty())
    }
}

async fn handle(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let mut guard = state.0.write().await;
    let inner = &mut *guard;
    let path = uri.path().to_string();
    debug!("{method} {path}");
    inner.requests.push(RecordedRequest {
        method: method.to_string(),
        path: path.clone(),
        headers: headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect(),
        body: body.clone(),
    });

    if inner.failures > 0 {
        inner.failures -= 1;
        warn!("injected failure for {method} {path}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "<html><body>Internal Server Error</body></html>",
        )
            .into_response();
    }

    let Some(signed_path) = path.strip_prefix("/index.php/") else {
        return not_found();
    };
    let Some((version, resource)) = parse_api_path(signed_path) else {
        return not_found();
    };
    if !auth::verify(&inner.config, signed_path, &headers, &body) {
        warn!("authentication failed for {path}");
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }

    let payload = if body.trim().is_empty() {
        Value::Null
    } else {
        match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(_) => return api_error(StatusCode::BAD_REQUEST, "Bad Request", "Invalid JSON body"),
        }
    };

    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    let call = Call {
        version,
        origin: format!("http://{host}/index.php/api/v{version}/"),
        headers: &headers,
        page_size: inner.config.page_size.max(1),
    };
    let segments: Vec<&str> = resource.split('/').collect();
    let store = &mut inner.store;

    match method {
        Method::GET => read(store, &call, &segments),
        Method::POST => create(store, &segments, payload),
        Method::PUT => update(store, &call, &segments, payload),
        Method::DELETE => remove(store, &call, &segments),
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

/// Split `api/v4/projects/1.json` into `(4, "projects/1")`.
fn parse_api_path(signed_path: &str) -> Option<(u8, &str)> {
    let rest = signed_path.strip_prefix("api/v")?;
    let (version, resource) = rest.split_once('/')?;
    let version: u8 = version.parse().ok()?;
    if !(3..=5).contains(&version) {
        return None;
    }
    let resource = resource.strip_suffix(".json")?;
    (!resource.is_empty()).then_some((version, resource))
}

fn id(segment: &str) -> Option<u64> {
    segment.parse().ok()
}

fn decode_search(term: &str) -> String {
    url::form_urlencoded::parse(term.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}

fn field_u64(item: &Value, key: &str) -> Option<u64> {
    item.get(key).and_then(Value::as_u64)
}

fn flag(item: &Value, key: &str) -> bool {
    item.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

fn api_error(status: StatusCode, kind: &str, message: &str) -> Response {
    (
        status,
        Json(json!({ "error": true, "type": kind, "message": message })),
    )
        .into_response()
}

// Reads

fn read(store: &Store, call: &Call<'_>, segments: &[&str]) -> Response {
    let (segments, page) = match segments {
        [base @ .., "page", n] if !base.is_empty() => match id(n) {
            Some(n) => (base, n.max(1) as usize),
            None => return not_found(),
        },
        _ => (segments, 1),
    };
    match listing(store, call, segments) {
        Some(items) => paginate(call, segments, page, items),
        None => show(store, call, segments),
    }
}

/// Rows of a listing resource, or `None` when `segments` is not one.
fn listing(store: &Store, call: &Call<'_>, segments: &[&str]) -> Option<Vec<Value>> {
    let items = match segments {
        [c @ ("projects" | "passwords" | "my_passwords" | "users" | "groups")] => store
            .all(c)
            .into_iter()
            .filter(|item| !flag(item, "archived"))
            .collect(),
        [c @ ("projects" | "passwords"), "archived"] => store
            .all(c)
            .into_iter()
            .filter(|item| flag(item, "archived"))
            .collect(),
        [c @ ("projects" | "passwords"), "favorite"] => {
            let favorites = store.favorites(c)?;
            store
                .all(c)
                .into_iter()
                .filter(|item| field_u64(item, "id").is_some_and(|id| favorites.contains(&id)))
                .collect()
        }
        [c @ ("projects" | "passwords" | "my_passwords"), "search", term] => {
            let needle = decode_search(term).to_lowercase();
            store
                .all(c)
                .into_iter()
                .filter(|item| {
                    item.get("name")
                        .and_then(Value::as_str)
                        .is_some_and(|name| name.to_lowercase().contains(&needle))
                })
                .collect()
        }
        ["projects", project, "passwords"] => {
            let project = id(project)?;
            store
                .all("passwords")
                .into_iter()
                .filter(|item| field_u64(item, "project_id") == Some(project))
                .collect()
        }
        ["projects", project, "subprojects", ..] if segments.len() <= 4 && call.version >= 4 => {
            let project = id(project)?;
            store
                .all("projects")
                .into_iter()
                .filter(|item| field_u64(item, "parent_id") == Some(project))
                .collect()
        }
        [c @ ("projects" | "passwords"), item, "security"] => {
            let row = store.get(c, id(item)?)?;
            match row.get("security") {
                Some(Value::Array(entries)) => entries.clone(),
                Some(Value::Object(_)) => vec![row["security"].clone()],
                _ => Vec::new(),
            }
        }
        [c @ ("projects" | "passwords"), item, "files"] if call.version >= 5 => {
            let owner = id(item)?;
            let key = if *c == "projects" { "project_id" } else { "password_id" };
            store
                .all("files")
                .into_iter()
                .filter(|file| field_u64(file, key) == Some(owner))
                .collect()
        }
        _ => return None,
    };
    Some(items)
}

fn paginate(call: &Call<'_>, segments: &[&str], page: usize, items: Vec<Value>) -> Response {
    let start = (page - 1).saturating_mul(call.page_size);
    let end = start.saturating_add(call.page_size).min(items.len());
    let chunk: Vec<Value> = items.get(start..end).map(<[Value]>::to_vec).unwrap_or_default();
    let mut response = (StatusCode::OK, Json(chunk)).into_response();
    if end < items.len() {
        let next = format!(
            "<{}{}/page/{}.json>; rel=\"next\"",
            call.origin,
            segments.join("/"),
            page + 1
        );
        if let Ok(value) = HeaderValue::from_str(&next) {
            response.headers_mut().insert(header::LINK, value);
        }
    }
    response
}

fn show(store: &Store, call: &Call<'_>, segments: &[&str]) -> Response {
    match segments {
        ["version"] => Json(json!({
            "version": SERVER_VERSION,
            "version_date": "2024-06-03",
            "api_version": format!("v{}", call.version),
        }))
        .into_response(),
        ["version", "check_latest"] => Json(json!({
            "version": SERVER_VERSION,
            "version_date": "2024-06-03",
            "latest_version": LATEST_VERSION,
            "latest_version_date": "2024-06-03",
        }))
        .into_response(),
        ["generate_password"] => Json(json!({ "password": "g3n3rat3d-Passw0rd!" })).into_response(),
        ["users", "me"] => match store.get("users", 1) {
            Some(user) => Json(user.clone()).into_response(),
            None => not_found(),
        },
        ["files", _] if call.version < 5 => not_found(),
        [c, item] if Store::is_collection(c) => {
            let Some(row) = id(item).and_then(|item| store.get(c, item)) else {
                return not_found();
            };
            if *c == "passwords" && flag(row, "locked") && call.unlock_reason().is_none() {
                return api_error(
                    StatusCode::FORBIDDEN,
                    "Locked",
                    "This password is locked. A reason is required to read it.",
                );
            }
            Json(row.clone()).into_response()
        }
        _ => not_found(),
    }
}

// Writes

fn create(store: &mut Store, segments: &[&str], payload: Value) -> Response {
    match segments {
        [c @ ("projects" | "passwords" | "my_passwords" | "users" | "groups")] => {
            let required = if *c == "users" { "username" } else { "name" };
            let has_required = payload
                .get(required)
                .and_then(Value::as_str)
                .is_some_and(|value| !value.is_empty());
            if !has_required {
                return api_error(
                    StatusCode::BAD_REQUEST,
                    "Bad Request",
                    &format!("The {required} field is required"),
                );
            }
            match store.insert(c, payload) {
                Some(id) => {
                    info!("created {c}/{id}");
                    (StatusCode::CREATED, Json(json!({ "id": id }))).into_response()
                }
                None => api_error(StatusCode::BAD_REQUEST, "Bad Request", "Expected a JSON object"),
            }
        }
        [favorite @ ("favorite_passwords" | "favorite_project"), item] => {
            let table = if *favorite == "favorite_project" { "projects" } else { "passwords" };
            let Some(item) = id(item).filter(|item| store.contains(table, *item)) else {
                return not_found();
            };
            if let Some(favorites) = store.favorites_mut(table) {
                favorites.insert(item);
            }
            no_content()
        }
        _ => not_found(),
    }
}

fn update(store: &mut Store, call: &Call<'_>, segments: &[&str], payload: Value) -> Response {
    let done = match segments {
        [c @ ("projects" | "passwords" | "my_passwords" | "users" | "groups"), item] => {
            id(item).is_some_and(|item| store.merge(c, item, &payload))
        }
        ["projects", item, "change_parent"] => {
            let Some(parent) = field_u64(&payload, "parent_id") else {
                return api_error(StatusCode::BAD_REQUEST, "Bad Request", "parent_id is required");
            };
            id(item).is_some_and(|item| store.set("projects", item, "parent_id", json!(parent)))
        }
        [c @ ("projects" | "passwords"), item, "security"] => {
            id(item).is_some_and(|item| store.set(c, item, "security", payload))
        }
        ["passwords", item, "custom_fields"] => {
            id(item).is_some_and(|item| store.merge("passwords", item, &payload))
        }
        ["projects", item, action @ ("archive" | "unarchive")] => id(item)
            .is_some_and(|item| store.set("projects", item, "archived", json!(*action == "archive"))),
        ["passwords", item, "lock"] => {
            id(item).is_some_and(|item| store.set("passwords", item, "locked", json!(true)))
        }
        ["passwords", item, "unlock"] => {
            let Some(reason) = call.unlock_reason() else {
                return api_error(
                    StatusCode::BAD_REQUEST,
                    "Bad Request",
                    "A reason is required to unlock this password",
                );
            };
            id(item).is_some_and(|item| {
                store.set("passwords", item, "unlock_reason", json!(reason))
                    && store.set("passwords", item, "locked", json!(false))
            })
        }
        ["users", item, "change_password"] => {
            if payload.get("password").and_then(Value::as_str).is_none() {
                return api_error(StatusCode::BAD_REQUEST, "Bad Request", "password is required");
            }
            id(item).is_some_and(|item| store.contains("users", item))
        }
        ["users", item, action @ ("activate" | "deactivate")] => id(item)
            .is_some_and(|item| store.set("users", item, "active", json!(*action == "activate"))),
        ["users", item, "convert_to_ldap"] => {
            let Some(login_dn) = payload.get("login_dn").cloned() else {
                return api_error(StatusCode::BAD_REQUEST, "Bad Request", "login_dn is required");
            };
            id(item).is_some_and(|item| {
                store.set("users", item, "login_dn", login_dn)
                    && store.set("users", item, "ldap", json!(true))
            })
        }
        ["users", item, "convert_to_normal"] => id(item).is_some_and(|item| {
            store.unset("users", item, "login_dn") && store.set("users", item, "ldap", json!(false))
        }),
        ["groups", group, action @ ("add_user" | "delete_user"), user] => {
            let (Some(group), Some(user)) = (id(group), id(user)) else {
                return not_found();
            };
            if !store.contains("users", user) {
                return not_found();
            }
            let Some(row) = store.get("groups", group) else {
                return not_found();
            };
            let mut members: Vec<u64> = row
                .get("users")
                .and_then(Value::as_array)
                .map(|ids| ids.iter().filter_map(Value::as_u64).collect())
                .unwrap_or_default();
            members.retain(|member| *member != user);
            if *action == "add_user" {
                members.push(user);
            }
            store.set("groups", group, "users", json!(members))
        }
        _ => false,
    };
    if done {
        no_content()
    } else {
        not_found()
    }
}

fn remove(store: &mut Store, call: &Call<'_>, segments: &[&str]) -> Response {
    let done = match segments {
        ["files", _] if call.version < 5 => false,
        [c, item] if Store::is_collection(c) => id(item).is_some_and(|item| store.remove(c, item)),
        [favorite @ ("favorite_passwords" | "favorite_project"), item] => {
            let table = if *favorite == "favorite_project" { "projects" } else { "passwords" };
            match (id(item), store.favorites_mut(table)) {
                (Some(item), Some(favorites)) => {
                    favorites.remove(&item);
                    true
                }
                _ => false,
            }
        }
        _ => false,
    };
    if done {
        no_content()
    } else {
        not_found()
    }
}
