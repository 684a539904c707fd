//! Common test utilities: an in-process fake of the storage JSON API.

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::Arc;
use tokio::net::TcpListener;

use gcs_redirector::client::md5_base64;
use gcs_redirector::{EndpointConfig, StorageClient};

/// Stored object.
#[derive(Debug, Clone)]
pub struct FakeObject {
    pub content: Vec<u8>,
    pub content_type: String,
    /// Reported instead of the real digest when set.
    pub md5_override: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeBucket {
    pub versioning: bool,
    pub objects: BTreeMap<String, FakeObject>,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub base_url: String,
    pub buckets: BTreeMap<String, FakeBucket>,
    /// `METHOD path?query` of every request received, in order.
    pub requests: Vec<String>,
    /// Last body received on the external URL config endpoint.
    pub external_url: Option<String>,
    /// Items per list page; unpaginated when `None`.
    pub page_size: Option<usize>,
    /// Open resumable sessions: id -> (bucket, object, content type).
    sessions: HashMap<String, (String, String, String)>,
    next_session: u64,
}

type Shared = Arc<Mutex<FakeState>>;

/// Fake storage server wrapper.
pub struct FakeGcs {
    pub base_url: String,
    pub state: Shared,
}

impl FakeGcs {
    /// Starts the fake on a random local port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let state: Shared = Arc::new(Mutex::new(FakeState {
            base_url: base_url.clone(),
            ..FakeState::default()
        }));

        let app = create_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, state }
    }

    /// Builds a client pointed at this server.
    pub fn client(&self) -> StorageClient {
        StorageClient::new(EndpointConfig::new(&self.base_url)).unwrap()
    }

    /// Builds a client pointed at this server with a separate public host.
    pub fn client_with_public_host(&self, public_host: &str) -> StorageClient {
        StorageClient::new(EndpointConfig::new(&self.base_url).public_host(public_host)).unwrap()
    }

    pub fn create_bucket(&self, name: &str) {
        self.state
            .lock()
            .buckets
            .entry(name.to_string())
            .or_default();
    }

    pub fn put_object(&self, bucket: &str, name: &str, content: &[u8]) {
        self.state
            .lock()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .objects
            .insert(
                name.to_string(),
                FakeObject {
                    content: content.to_vec(),
                    content_type: "text/plain".to_string(),
                    md5_override: None,
                },
            );
    }

    pub fn tamper_md5(&self, bucket: &str, name: &str) {
        let mut state = self.state.lock();
        if let Some(obj) = state
            .buckets
            .get_mut(bucket)
            .and_then(|b| b.objects.get_mut(name))
        {
            obj.md5_override = Some(md5_base64(b"something else"));
        }
    }

    pub fn set_page_size(&self, size: usize) {
        self.state.lock().page_size = Some(size);
    }

    pub fn object(&self, bucket: &str, name: &str) -> Option<FakeObject> {
        self.state
            .lock()
            .buckets
            .get(bucket)
            .and_then(|b| b.objects.get(name).cloned())
    }

    pub fn bucket(&self, name: &str) -> Option<FakeBucket> {
        self.state.lock().buckets.get(name).cloned()
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.lock().requests.clone()
    }

    pub fn external_url(&self) -> Option<String> {
        self.state.lock().external_url.clone()
    }
}

/// Collects formatted log output for assertions.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    /// Installs a subscriber writing into this capture on the current thread.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

fn create_router(state: Shared) -> Router {
    Router::new()
        .route("/storage/v1/b", get(list_buckets).post(insert_bucket))
        .route("/storage/v1/b/:bucket", get(get_bucket))
        .route("/storage/v1/b/:bucket/o", get(list_objects))
        .route("/storage/v1/b/:bucket/o/:object", get(get_object).delete(delete_object))
        .route("/download/storage/v1/b/:bucket/o/:object", get(download_object))
        .route("/upload/storage/v1/b/:bucket/o", post(upload_object))
        .route("/upload/resumable/:session", put(finish_resumable))
        .route("/internal/config/url/external", put(set_external_url))
        .layer(middleware::from_fn_with_state(state.clone(), record_request))
        .with_state(state)
}

async fn record_request(State(state): State<Shared>, req: Request, next: Next) -> Response {
    let line = format!("{} {}", req.method(), req.uri());
    state.lock().requests.push(line);
    next.run(req).await
}

fn error(status: StatusCode, message: &str) -> Response {
    let body = json!({
        "error": {
            "code": status.as_u16(),
            "message": message,
            "errors": [{"domain": "global", "reason": status.canonical_reason().unwrap_or(""), "message": message}],
        }
    });
    (status, Json(body)).into_response()
}

fn paginate<T: Clone>(items: Vec<T>, token: Option<&String>, page_size: Option<usize>) -> (Vec<T>, Option<String>) {
    let start = token.and_then(|t| t.parse().ok()).unwrap_or(0).min(items.len());
    match page_size {
        None => (items[start..].to_vec(), None),
        Some(size) => {
            let end = (start + size).min(items.len());
            let next = (end < items.len()).then(|| end.to_string());
            (items[start..end].to_vec(), next)
        }
    }
}

fn object_json(bucket: &str, name: &str, obj: &FakeObject) -> Value {
    json!({
        "kind": "storage#object",
        "id": format!("{}/{}", bucket, name),
        "bucket": bucket,
        "name": name,
        "size": obj.content.len().to_string(),
        "contentType": obj.content_type,
        "md5Hash": obj.md5_override.clone().unwrap_or_else(|| md5_base64(&obj.content)),
        "generation": "1",
    })
}

async fn list_buckets(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let state = state.lock();
    let names: Vec<String> = state.buckets.keys().cloned().collect();
    let (page, next) = paginate(names, query.get("pageToken"), state.page_size);
    // Older emulator releases capitalise these fields.
    let items: Vec<Value> = page
        .iter()
        .map(|n| json!({"kind": "storage#bucket", "ID": n, "Name": n}))
        .collect();
    let mut body = json!({"kind": "storage#buckets", "items": items});
    if let Some(token) = next {
        body["nextPageToken"] = json!(token);
    }
    Json(body).into_response()
}

async fn insert_bucket(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let name = match body["name"].as_str() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return error(StatusCode::BAD_REQUEST, "missing bucket name"),
    };
    let versioning = body["versioning"]["enabled"].as_bool().unwrap_or(false);

    let mut state = state.lock();
    if state.buckets.contains_key(&name) {
        return error(StatusCode::CONFLICT, "bucket already exists");
    }
    state.buckets.insert(
        name.clone(),
        FakeBucket {
            versioning,
            objects: BTreeMap::new(),
        },
    );
    Json(json!({"kind": "storage#bucket", "id": name, "name": name, "versioning": {"enabled": versioning}}))
        .into_response()
}

async fn get_bucket(State(state): State<Shared>, Path(bucket): Path<String>) -> Response {
    let state = state.lock();
    match state.buckets.get(&bucket) {
        Some(b) => Json(json!({
            "kind": "storage#bucket",
            "id": bucket,
            "name": bucket,
            "versioning": {"enabled": b.versioning},
        }))
        .into_response(),
        None => error(StatusCode::NOT_FOUND, "Not Found"),
    }
}

async fn list_objects(
    State(state): State<Shared>,
    Path(bucket): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let state = state.lock();
    let Some(b) = state.buckets.get(&bucket) else {
        return error(StatusCode::NOT_FOUND, "Not Found");
    };
    let prefix = query.get("prefix").cloned().unwrap_or_default();
    let items: Vec<Value> = b
        .objects
        .iter()
        .filter(|(name, _)| name.starts_with(&prefix))
        .map(|(name, obj)| object_json(&bucket, name, obj))
        .collect();
    let (page, next) = paginate(items, query.get("pageToken"), state.page_size);
    let mut body = json!({"kind": "storage#objects", "items": page});
    if let Some(token) = next {
        body["nextPageToken"] = json!(token);
    }
    Json(body).into_response()
}

async fn get_object(State(state): State<Shared>, Path((bucket, object)): Path<(String, String)>) -> Response {
    let state = state.lock();
    match state.buckets.get(&bucket).and_then(|b| b.objects.get(&object)) {
        Some(obj) => Json(object_json(&bucket, &object, obj)).into_response(),
        None => error(StatusCode::NOT_FOUND, "Not Found"),
    }
}

async fn delete_object(State(state): State<Shared>, Path((bucket, object)): Path<(String, String)>) -> Response {
    let mut state = state.lock();
    match state.buckets.get_mut(&bucket).and_then(|b| b.objects.remove(&object)) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => error(StatusCode::NOT_FOUND, "Not Found"),
    }
}

async fn download_object(State(state): State<Shared>, Path((bucket, object)): Path<(String, String)>) -> Response {
    let state = state.lock();
    match state.buckets.get(&bucket).and_then(|b| b.objects.get(&object)) {
        Some(obj) => (
            [(header::CONTENT_TYPE, obj.content_type.clone())],
            obj.content.clone(),
        )
            .into_response(),
        None => error(StatusCode::NOT_FOUND, "Not Found"),
    }
}

async fn upload_object(
    State(state): State<Shared>,
    Path(bucket): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match query.get("uploadType").map(String::as_str) {
        Some("multipart") => {
            let content_type = headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            let Some(boundary) = content_type.split("boundary=").nth(1) else {
                return error(StatusCode::BAD_REQUEST, "missing boundary");
            };
            let Some((meta, media_type, media)) = parse_multipart(&body, boundary) else {
                return error(StatusCode::BAD_REQUEST, "malformed multipart body");
            };
            let Some(name) = meta["name"].as_str().map(String::from) else {
                return error(StatusCode::BAD_REQUEST, "missing object name");
            };
            store(&state, &bucket, &name, media, media_type)
        }
        Some("resumable") => {
            let Ok(meta) = serde_json::from_slice::<Value>(&body) else {
                return error(StatusCode::BAD_REQUEST, "invalid metadata");
            };
            let Some(name) = meta["name"].as_str().map(String::from) else {
                return error(StatusCode::BAD_REQUEST, "missing object name");
            };
            let content_type = headers
                .get("x-upload-content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/octet-stream")
                .to_string();

            let mut state = state.lock();
            if !state.buckets.contains_key(&bucket) {
                return error(StatusCode::NOT_FOUND, "Not Found");
            }
            state.next_session += 1;
            let id = state.next_session.to_string();
            state.sessions.insert(id.clone(), (bucket, name, content_type));
            let location = format!("{}/upload/resumable/{}", state.base_url, id);
            (StatusCode::OK, [(header::LOCATION, location)]).into_response()
        }
        _ => error(StatusCode::BAD_REQUEST, "unsupported uploadType"),
    }
}

async fn set_external_url(State(state): State<Shared>, headers: HeaderMap, body: String) -> Response {
    let is_text = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/plain"))
        .unwrap_or(false);
    if !is_text {
        return error(StatusCode::UNSUPPORTED_MEDIA_TYPE, "expected text/plain");
    }
    state.lock().external_url = Some(body);
    StatusCode::OK.into_response()
}

async fn finish_resumable(
    State(state): State<Shared>,
    Path(session): Path<String>,
    body: Bytes,
) -> Response {
    let entry = state.lock().sessions.remove(&session);
    match entry {
        Some((bucket, name, content_type)) => store(&state, &bucket, &name, body.to_vec(), content_type),
        None => error(StatusCode::NOT_FOUND, "no such upload session"),
    }
}

fn store(state: &Shared, bucket: &str, name: &str, content: Vec<u8>, content_type: String) -> Response {
    let mut state = state.lock();
    let Some(b) = state.buckets.get_mut(bucket) else {
        return error(StatusCode::NOT_FOUND, "Not Found");
    };
    let obj = FakeObject {
        content,
        content_type,
        md5_override: None,
    };
    let body = object_json(bucket, name, &obj);
    b.objects.insert(name.to_string(), obj);
    Json(body).into_response()
}

/// Splits a two-part `multipart/related` body into (metadata, media type, media).
fn parse_multipart(body: &[u8], boundary: &str) -> Option<(Value, String, Vec<u8>)> {
    let text = String::from_utf8_lossy(body);
    let delimiter = format!("--{}", boundary);
    let mut parts = text
        .split(delimiter.as_str())
        .filter(|p| !p.trim().is_empty() && p.trim() != "--");

    let (_, meta) = parts.next()?.split_once("\r\n\r\n")?;
    let meta: Value = serde_json::from_str(meta.trim_end_matches("\r\n")).ok()?;

    let (headers, media) = parts.next()?.split_once("\r\n\r\n")?;
    let media_type = headers
        .lines()
        .find_map(|l| l.strip_prefix("Content-Type: "))
        .unwrap_or("application/octet-stream")
        .to_string();
    let media = media.strip_suffix("\r\n").unwrap_or(media);

    Some((meta, media_type, media.as_bytes().to_vec()))
}
