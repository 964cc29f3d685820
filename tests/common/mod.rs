//! In-process S3 stand-in for integration tests.
//!
//! Serves path-style PUT/GET/DELETE and ListObjectsV2 from memory, with a
//! configurable page size and a queue of scripted failure statuses.

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use pg_backup_store::S3Config;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

pub const BUCKET: &str = "backups";
pub const ACCESS_KEY: &str = "AKIDEXAMPLE";

#[derive(Debug, Clone)]
pub struct FakeObject {
    pub data: Vec<u8>,
    pub last_modified: DateTime<Utc>,
    pub storage_class: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub bucket: String,
    pub key: String,
    pub host: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Default)]
pub struct FakeState {
    objects: Mutex<BTreeMap<(String, String), FakeObject>>,
    page_size: AtomicUsize,
    failures: Mutex<VecDeque<(Option<Method>, u16)>>,
    hits: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
}

pub struct FakeS3 {
    pub endpoint: String,
    state: Arc<FakeState>,
}

impl FakeS3 {
    pub async fn start() -> Self {
        let state = Arc::new(FakeState {
            page_size: AtomicUsize::new(1000),
            ..FakeState::default()
        });

        let app = Router::new()
            .route("/:bucket", any(bucket_handler))
            .route("/:bucket/*key", any(object_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            endpoint: format!("http://{}", addr),
            state,
        }
    }

    pub fn config(&self) -> S3Config {
        let mut config = S3Config::new("us-east-1", BUCKET, ACCESS_KEY, "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY");
        config.endpoint = Some(self.endpoint.clone());
        config.force_path_style = true;
        config.use_tls = false;
        config.retry_base_delay_ms = 10;
        config.timeout_secs = 5;
        config
    }

    pub fn set_page_size(&self, size: usize) {
        self.state.page_size.store(size, Ordering::SeqCst);
    }

    /// The next requests answer with these statuses, one per request.
    pub fn fail_next(&self, statuses: &[u16]) {
        let mut failures = self.state.failures.lock().unwrap();
        failures.extend(statuses.iter().map(|s| (None, *s)));
    }

    /// Like [`FakeS3::fail_next`], but only consumed by requests with `method`.
    pub fn fail_next_method(&self, method: Method, statuses: &[u16]) {
        let mut failures = self.state.failures.lock().unwrap();
        failures.extend(statuses.iter().map(|s| (Some(method.clone()), *s)));
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn insert(&self, key: &str, data: &[u8], last_modified: DateTime<Utc>) {
        self.state.objects.lock().unwrap().insert(
            (BUCKET.to_string(), key.to_string()),
            FakeObject {
                data: data.to_vec(),
                last_modified,
                storage_class: None,
            },
        );
    }

    pub fn object(&self, key: &str) -> Option<FakeObject> {
        self.state
            .objects
            .lock()
            .unwrap()
            .get(&(BUCKET.to_string(), key.to_string()))
            .cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state
            .objects
            .lock()
            .unwrap()
            .keys()
            .map(|(_, key)| key.clone())
            .collect()
    }
}

fn error_response(status: StatusCode, code: &str) -> Response {
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Error><Code>{}</Code><Message>{}</Message></Error>",
        code, code
    );
    (status, body).into_response()
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Records the request and pops a scripted failure, if any.
fn admit(state: &FakeState, method: &Method, bucket: &str, key: &str, headers: &HeaderMap) -> Option<Response> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let authorization = header("authorization");
    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.clone(),
        bucket: bucket.to_string(),
        key: key.to_string(),
        host: header("host"),
        authorization: authorization.clone(),
    });

    let scripted = {
        let mut failures = state.failures.lock().unwrap();
        let position = failures
            .iter()
            .position(|(only, _)| only.as_ref().map_or(true, |m| m == method));
        position.and_then(|i| failures.remove(i))
    };
    if let Some((_, status)) = scripted {
        let status = StatusCode::from_u16(status).unwrap();
        return Some(error_response(status, "ScriptedFailure"));
    }

    let expected = format!("AWS4-HMAC-SHA256 Credential={}/", ACCESS_KEY);
    let signed = authorization.is_some_and(|a| a.starts_with(&expected));
    if !signed || header("x-amz-date").is_none() || header("x-amz-content-sha256").is_none() {
        return Some(error_response(StatusCode::FORBIDDEN, "AccessDenied"));
    }
    None
}

async fn bucket_handler(
    State(state): State<Arc<FakeState>>,
    Path(bucket): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    if let Some(rejection) = admit(&state, &method, &bucket, "", &headers) {
        return rejection;
    }
    if method != Method::GET || query.get("list-type").map(String::as_str) != Some("2") {
        return error_response(StatusCode::NOT_IMPLEMENTED, "NotImplemented");
    }

    let prefix = query.get("prefix").cloned().unwrap_or_default();
    let start: usize = match query.get("continuation-token") {
        Some(token) => match token.strip_prefix("offset-").and_then(|n| n.parse().ok()) {
            Some(offset) => offset,
            None => return error_response(StatusCode::BAD_REQUEST, "InvalidArgument"),
        },
        None => 0,
    };
    let page_size = state.page_size.load(Ordering::SeqCst).max(1);

    let matching: Vec<(String, FakeObject)> = state
        .objects
        .lock()
        .unwrap()
        .iter()
        .filter(|((b, key), _)| *b == bucket && key.starts_with(&prefix))
        .map(|((_, key), object)| (key.clone(), object.clone()))
        .collect();
    let page: Vec<_> = matching.iter().skip(start).take(page_size).collect();
    let next = start + page.len();
    let truncated = next < matching.len();

    let mut body = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    body.push_str("<ListBucketResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">");
    body.push_str(&format!("<Name>{}</Name>", xml_escape(&bucket)));
    body.push_str(&format!("<Prefix>{}</Prefix>", xml_escape(&prefix)));
    body.push_str(&format!("<KeyCount>{}</KeyCount><MaxKeys>{}</MaxKeys>", page.len(), page_size));
    body.push_str(&format!("<IsTruncated>{}</IsTruncated>", truncated));
    for (key, object) in page {
        body.push_str(&format!(
            "<Contents><Key>{}</Key><LastModified>{}</LastModified><Size>{}</Size><StorageClass>{}</StorageClass></Contents>",
            xml_escape(key),
            object.last_modified.to_rfc3339_opts(SecondsFormat::Millis, true),
            object.data.len(),
            object.storage_class.as_deref().unwrap_or("STANDARD")
        ));
    }
    if truncated {
        body.push_str(&format!("<NextContinuationToken>offset-{}</NextContinuationToken>", next));
    }
    body.push_str("</ListBucketResult>");

    (StatusCode::OK, [("content-type", "application/xml")], body).into_response()
}

async fn object_handler(
    State(state): State<Arc<FakeState>>,
    Path((bucket, key)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(rejection) = admit(&state, &method, &bucket, &key, &headers) {
        return rejection;
    }
    let id = (bucket, key);

    if method == Method::PUT {
        let declared = headers
            .get("x-amz-content-sha256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if declared != hex::encode(Sha256::digest(&body)) {
            return error_response(StatusCode::BAD_REQUEST, "XAmzContentSHA256Mismatch");
        }
        let storage_class = headers
            .get("x-amz-storage-class")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        state.objects.lock().unwrap().insert(
            id,
            FakeObject {
                data: body.to_vec(),
                last_modified: Utc::now(),
                storage_class,
            },
        );
        StatusCode::OK.into_response()
    } else if method == Method::GET {
        let object = state.objects.lock().unwrap().get(&id).cloned();
        match object {
            Some(object) => (StatusCode::OK, object.data).into_response(),
            None => error_response(StatusCode::NOT_FOUND, "NoSuchKey"),
        }
    } else if method == Method::DELETE {
        state.objects.lock().unwrap().remove(&id);
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(StatusCode::METHOD_NOT_ALLOWED, "MethodNotAllowed")
    }
}
