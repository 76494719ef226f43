//! In-memory stand-in for the Podio API.
//!
//! # Design
//! One shared [`MockState`] holds the issued token, grants and items. Tests
//! keep a clone of it to inject failures (an expired access token, queued
//! error responses, a rejected refresh) and to inspect every request the
//! server saw.
//!
//! The token endpoint is a regular route. Every other path goes through a
//! single fallback handler that checks the `OAuth2` authorization header and
//! then dispatches on method and path segments, so overlapping shapes like
//! `/grant/space/{space}/user/{user}/` and `/grant/{type}/{id}/{user}` are
//! resolved in one ordered `match`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

pub const USERNAME: &str = "user@example.com";
pub const PASSWORD: &str = "s3cret";
pub const APP_ID: i64 = 99;
pub const APP_TOKEN: &str = "app-token";
/// User id behind every token this server issues.
pub const CURRENT_USER_ID: i64 = 1;

const CREATED_ON: &str = "2024-01-15 08:00:00";

/// A canned response served instead of the next authenticated API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub status: u16,
    pub body: String,
    pub retry_after: Option<u64>,
}

impl Fault {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn server_error() -> Self {
        Self::new(
            500,
            r#"{"error":"unavailable","error_description":"The service is temporarily unavailable"}"#,
        )
    }

    pub fn rate_limited(retry_after: u64) -> Self {
        Self {
            retry_after: Some(retry_after),
            ..Self::new(
                429,
                r#"{"error":"rate_limit","error_description":"You have hit the rate limit"}"#,
            )
        }
    }
}

impl IntoResponse for Fault {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response =
            (status, [(header::CONTENT_TYPE, "application/json")], self.body).into_response();
        if let Some(seconds) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}

/// One request as the server received it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub body: Option<Value>,
}

/// A grant held by `user_id` on the object `ref_type`/`ref_id`.
///
/// `space_id` and `org_id` place the object for the per-space and per-org
/// listings; grants created over the API have neither.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredGrant {
    pub space_id: i64,
    pub org_id: i64,
    pub ref_type: String,
    pub ref_id: i64,
    pub user_id: i64,
    pub action: Option<String>,
    pub message: Option<String>,
}

impl StoredGrant {
    fn is_on(&self, ref_type: &str, ref_id: i64) -> bool {
        self.ref_type == ref_type && self.ref_id == ref_id
    }

    fn to_json(&self) -> Value {
        json!({
            "ref": {"type": self.ref_type, "id": self.ref_id},
            "user": {"user_id": self.user_id, "profile_id": self.user_id + 1000},
            "action": self.action,
            "message": self.message,
            "created_on": CREATED_ON,
            "created_by": {"type": "user", "id": CURRENT_USER_ID},
        })
    }
}

#[derive(Debug, Clone)]
struct StoredItem {
    item_id: i64,
    app_id: i64,
    app_item_id: i64,
    external_id: Option<String>,
    revision: i64,
    fields: Vec<Value>,
    tags: Vec<Value>,
}

impl StoredItem {
    /// Value of the `title` field, else the first text value found.
    fn title(&self) -> Option<String> {
        let text = |f: &Value| f["values"][0]["value"].as_str().map(str::to_string);
        self.fields
            .iter()
            .find(|f| f["external_id"] == "title")
            .and_then(text)
            .or_else(|| self.fields.iter().find_map(text))
    }

    fn to_json(&self) -> Value {
        json!({
            "item_id": self.item_id,
            "app_item_id": self.app_item_id,
            "external_id": self.external_id,
            "title": self.title(),
            "link": format!("https://podio.com/items/{}", self.item_id),
            "revision": self.revision,
            "app": {"app_id": self.app_id},
            "fields": self.fields,
            "tags": self.tags,
            "created_on": CREATED_ON,
        })
    }
}

#[derive(Debug)]
struct Inner {
    access_token: Option<String>,
    refresh_token: Option<String>,
    issued: u64,
    refresh_count: usize,
    refresh_rejected: bool,
    faults: VecDeque<Fault>,
    requests: Vec<RecordedRequest>,
    grants: Vec<StoredGrant>,
    items: BTreeMap<i64, StoredItem>,
    next_item_id: i64,
    next_field_id: i64,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            issued: 0,
            refresh_count: 0,
            refresh_rejected: false,
            faults: VecDeque::new(),
            requests: Vec::new(),
            grants: Vec::new(),
            items: BTreeMap::new(),
            next_item_id: 1000,
            next_field_id: 500,
        }
    }
}

/// Shared server state. Clones observe and control the same server.
#[derive(Debug, Clone, Default)]
pub struct MockState {
    inner: Arc<Mutex<Inner>>,
}

impl MockState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate the current access token. The refresh token stays valid.
    pub async fn expire_token(&self) {
        self.inner.lock().await.access_token = None;
    }

    /// Make every later refresh_token grant fail with `invalid_grant`.
    pub async fn reject_refresh(&self) {
        self.inner.lock().await.refresh_rejected = true;
    }

    /// Serve `fault` for the next authenticated API request.
    pub async fn push_fault(&self, fault: Fault) {
        self.inner.lock().await.faults.push_back(fault);
    }

    pub async fn add_grant(&self, grant: StoredGrant) {
        self.inner.lock().await.grants.push(grant);
    }

    pub async fn grants(&self) -> Vec<StoredGrant> {
        self.inner.lock().await.grants.clone()
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.inner.lock().await.requests.clone()
    }

    /// Requests to API paths, excluding the token endpoint.
    pub async fn api_requests(&self) -> Vec<RecordedRequest> {
        self.requests()
            .await
            .into_iter()
            .filter(|r| r.path != "/oauth/token")
            .collect()
    }

    /// Number of successful refresh_token grants.
    pub async fn refresh_count(&self) -> usize {
        self.inner.lock().await.refresh_count
    }
}

pub fn app(state: MockState) -> Router {
    Router::new()
        .route("/oauth/token", post(token))
        .fallback(api)
        .with_state(state)
}

pub async fn run(listener: TcpListener, state: MockState) -> Result<(), std::io::Error> {
    axum::serve(listener, app(state)).await
}

async fn token(
    State(state): State<MockState>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let mut inner = state.inner.lock().await;
    let mut logged = form.clone();
    logged.remove("client_secret");
    logged.remove("password");
    inner.requests.push(RecordedRequest {
        method: "POST".to_string(),
        path: "/oauth/token".to_string(),
        authorization: None,
        body: serde_json::to_value(&logged).ok(),
    });

    let field = |key: &str| form.get(key).map(String::as_str).unwrap_or("");
    if field("client_id").is_empty() || field("client_secret").is_empty() {
        return error(StatusCode::UNAUTHORIZED, "invalid_client", "Missing client credentials");
    }

    let granted = match field("grant_type") {
        "password" => field("username") == USERNAME && field("password") == PASSWORD,
        "app" => field("app_id") == APP_ID.to_string() && field("app_token") == APP_TOKEN,
        "refresh_token" => {
            let valid = !inner.refresh_rejected
                && inner.refresh_token.as_deref() == Some(field("refresh_token"));
            if valid {
                inner.refresh_count += 1;
            }
            valid
        }
        other => {
            return error(
                StatusCode::BAD_REQUEST,
                "unsupported_grant_type",
                &format!("Unsupported grant type '{other}'"),
            )
        }
    };
    if !granted {
        tracing::info!(grant_type = field("grant_type"), "token request rejected");
        return error(StatusCode::BAD_REQUEST, "invalid_grant", "Invalid credentials");
    }

    inner.issued += 1;
    let access_token = format!("access-{}", inner.issued);
    let refresh_token = format!("refresh-{}", inner.issued);
    inner.access_token = Some(access_token.clone());
    inner.refresh_token = Some(refresh_token.clone());
    Json(json!({
        "access_token": access_token,
        "refresh_token": refresh_token,
        "token_type": "bearer",
        "expires_in": 28800,
        "ref": {"type": "user", "id": CURRENT_USER_ID},
    }))
    .into_response()
}

async fn api(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let mut inner = state.inner.lock().await;
    let path = uri.path().to_string();
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    inner.requests.push(RecordedRequest {
        method: method.to_string(),
        path: path.clone(),
        authorization: authorization.clone(),
        body: serde_json::from_str(&body).ok(),
    });
    tracing::debug!(%method, path = %path, "api request");

    let token = authorization
        .as_deref()
        .and_then(|value| value.strip_prefix("OAuth2 "));
    if token.is_none() || token != inner.access_token.as_deref() {
        return error(StatusCode::UNAUTHORIZED, "invalid_token", "expired_token");
    }
    if let Some(fault) = inner.faults.pop_front() {
        return fault.into_response();
    }

    dispatch(&mut inner, &method, &path, &body).unwrap_or_else(|rejection| rejection)
}

type Reply = Result<Response, Response>;

fn dispatch(inner: &mut Inner, method: &Method, path: &str, body: &str) -> Reply {
    let listing = path.ends_with('/');
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    match (method.as_str(), segments.as_slice()) {
        ("GET", ["grant", "space", space_id, "user", user_id]) => {
            let (space_id, user_id) = (parse_id(space_id)?, parse_id(user_id)?);
            Ok(grant_list(inner.grants.iter().filter(|g| {
                g.space_id == space_id && g.user_id == user_id
            })))
        }
        ("GET", ["grant", "org", org_id, "own"]) if listing => {
            let org_id = parse_id(org_id)?;
            Ok(grant_list(inner.grants.iter().filter(|g| {
                g.org_id == org_id && g.user_id == CURRENT_USER_ID
            })))
        }
        ("GET", ["grant", ref_type, ref_id, "count"]) => {
            let ref_id = parse_id(ref_id)?;
            let count = inner.grants.iter().filter(|g| g.is_on(ref_type, ref_id)).count();
            Ok(Json(json!({ "count": count })).into_response())
        }
        ("GET", ["grant", ref_type, ref_id, "own"]) => {
            let ref_id = parse_id(ref_id)?;
            inner
                .grants
                .iter()
                .find(|g| g.is_on(ref_type, ref_id) && g.user_id == CURRENT_USER_ID)
                .map(|g| Json(g.to_json()).into_response())
                .ok_or_else(|| not_found("No grant for the active user"))
        }
        ("GET", ["grant", ref_type, ref_id]) => {
            let ref_id = parse_id(ref_id)?;
            Ok(grant_list(inner.grants.iter().filter(|g| g.is_on(ref_type, ref_id))))
        }
        ("POST", ["grant", ref_type, ref_id]) => {
            let ref_id = parse_id(ref_id)?;
            create_grant(inner, ref_type, ref_id, parse_body(body)?)
        }
        ("DELETE", ["grant", ref_type, ref_id, user_id]) => {
            let (ref_id, user_id) = (parse_id(ref_id)?, parse_id(user_id)?);
            let position = inner
                .grants
                .iter()
                .position(|g| g.is_on(ref_type, ref_id) && g.user_id == user_id)
                .ok_or_else(|| not_found("No such grant"))?;
            inner.grants.remove(position);
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        ("POST", ["item", "app", app_id]) => {
            let app_id = parse_id(app_id)?;
            create_item(inner, app_id, parse_body(body)?)
        }
        ("GET", ["item", item_id]) => {
            let item_id = parse_id(item_id)?;
            inner
                .items
                .get(&item_id)
                .map(|item| Json(item.to_json()).into_response())
                .ok_or_else(|| not_found("Item not found"))
        }
        ("PUT", ["item", item_id]) => {
            let item_id = parse_id(item_id)?;
            update_item(inner, item_id, parse_body(body)?)
        }
        ("DELETE", ["item", item_id]) => {
            let item_id = parse_id(item_id)?;
            inner
                .items
                .remove(&item_id)
                .map(|_| StatusCode::NO_CONTENT.into_response())
                .ok_or_else(|| not_found("Item not found"))
        }
        ("GET", ["app", app_id, "item", app_item_id]) => {
            let (app_id, app_item_id) = (parse_id(app_id)?, parse_id(app_item_id)?);
            inner
                .items
                .values()
                .find(|item| item.app_id == app_id && item.app_item_id == app_item_id)
                .map(|item| Json(item.to_json()).into_response())
                .ok_or_else(|| not_found("Item not found"))
        }
        _ => Err(not_found(&format!("No endpoint for {method} {path}"))),
    }
}

#[derive(Debug, Deserialize)]
struct PersonRef {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct CreateGrantBody {
    people: Vec<PersonRef>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn create_grant(inner: &mut Inner, ref_type: &str, ref_id: i64, body: CreateGrantBody) -> Reply {
    if body.people.is_empty() {
        return Err(invalid_value("At least one person is required"));
    }
    if let Some(action) = &body.action {
        if !matches!(action.as_str(), "view" | "comment" | "rate") {
            return Err(invalid_value(&format!("Invalid action '{action}'")));
        }
    }

    let users: Vec<i64> = body.people.iter().map(|p| p.id).collect();
    inner
        .grants
        .retain(|g| !(g.is_on(ref_type, ref_id) && users.contains(&g.user_id)));
    for &user_id in &users {
        inner.grants.push(StoredGrant {
            space_id: 0,
            org_id: 0,
            ref_type: ref_type.to_string(),
            ref_id,
            user_id,
            action: body.action.clone(),
            message: body.message.clone(),
        });
    }
    Ok(Json(json!({ "ref_type": ref_type, "ref_id": ref_id, "users": users })).into_response())
}

#[derive(Debug, Deserialize)]
struct ItemBody {
    #[serde(default)]
    external_id: Option<String>,
    #[serde(default)]
    fields: Map<String, Value>,
    #[serde(default)]
    tags: Vec<Value>,
}

fn create_item(inner: &mut Inner, app_id: i64, body: ItemBody) -> Reply {
    let mut item = StoredItem {
        item_id: inner.next_item_id,
        app_id,
        app_item_id: inner.items.values().filter(|i| i.app_id == app_id).count() as i64 + 1,
        external_id: body.external_id,
        revision: 0,
        fields: Vec::new(),
        tags: body.tags,
    };
    merge_fields(&mut item.fields, &body.fields, &mut inner.next_field_id)?;
    inner.next_item_id += 1;

    let reply = json!({ "item_id": item.item_id, "title": item.title() });
    inner.items.insert(item.item_id, item);
    Ok(Json(reply).into_response())
}

fn update_item(inner: &mut Inner, item_id: i64, body: ItemBody) -> Reply {
    let Inner {
        items,
        next_field_id,
        ..
    } = inner;
    let item = items
        .get_mut(&item_id)
        .ok_or_else(|| not_found("Item not found"))?;
    merge_fields(&mut item.fields, &body.fields, next_field_id)?;
    if body.external_id.is_some() {
        item.external_id = body.external_id;
    }
    if !body.tags.is_empty() {
        item.tags = body.tags;
    }
    item.revision += 1;
    Ok(Json(json!({ "revision": item.revision, "title": item.title() })).into_response())
}

/// Replace the values of fields named in `incoming`, keyed by field id or
/// external id. Unknown keys add a field.
fn merge_fields(
    fields: &mut Vec<Value>,
    incoming: &Map<String, Value>,
    next_field_id: &mut i64,
) -> Result<(), Response> {
    for (key, values) in incoming {
        if !values.is_array() {
            return Err(invalid_value(&format!("Values of field '{key}' must be a list")));
        }
        let existing = fields.iter_mut().find(|f| {
            f["field_id"].as_i64().map(|id| id.to_string()).as_deref() == Some(key.as_str())
                || f["external_id"].as_str() == Some(key.as_str())
        });
        match existing {
            Some(field) => field["values"] = values.clone(),
            None => {
                let (field_id, external_id) = match key.parse::<i64>() {
                    Ok(id) => (id, None),
                    Err(_) => {
                        *next_field_id += 1;
                        (*next_field_id, Some(key.clone()))
                    }
                };
                fields.push(json!({
                    "field_id": field_id,
                    "external_id": external_id,
                    "label": external_id,
                    "values": values,
                }));
            }
        }
    }
    Ok(())
}

fn grant_list<'a>(grants: impl Iterator<Item = &'a StoredGrant>) -> Response {
    Json(grants.map(StoredGrant::to_json).collect::<Vec<_>>()).into_response()
}

fn parse_id(raw: &str) -> Result<i64, Response> {
    raw.parse()
        .map_err(|_| invalid_value(&format!("Invalid id '{raw}'")))
}

fn parse_body<T: DeserializeOwned>(raw: &str) -> Result<T, Response> {
    serde_json::from_str(raw).map_err(|e| invalid_value(&format!("Invalid body: {e}")))
}

fn error(status: StatusCode, code: &str, description: &str) -> Response {
    (
        status,
        Json(json!({ "error": code, "error_description": description, "error_detail": null })),
    )
        .into_response()
}

fn not_found(description: &str) -> Response {
    error(StatusCode::NOT_FOUND, "not_found", description)
}

fn invalid_value(description: &str) -> Response {
    error(StatusCode::BAD_REQUEST, "invalid_value", description)
}
