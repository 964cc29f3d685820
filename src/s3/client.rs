use super::endpoint::{resolve_endpoint, resolve_target, Addressing};
use super::listing::{parse_list_objects, ListPage, ListedObject};
use super::signer::{canonical_query, format_amz_date, sign, Credentials, SigningRequest, EMPTY_PAYLOAD_HASH};
use crate::config::S3Config;
use crate::error::{Result, StorageError, MAX_ERROR_BODY};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, TryStreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH};
use reqwest::{Body, Client, Method, Request, Response};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::time::sleep;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use url::Url;

const USER_AGENT: &str = "pg-backup-store/0.1";

#[derive(Debug, Clone)]
enum PayloadSource {
    Memory(Bytes),
    File(PathBuf),
}

/// Upload body whose hash and length are known before the first attempt.
#[derive(Debug, Clone)]
pub struct PutPayload {
    source: PayloadSource,
    content_length: u64,
    sha256: String,
}

impl PutPayload {
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            content_length: data.len() as u64,
            sha256: hex::encode(Sha256::digest(&data)),
            source: PayloadSource::Memory(data),
        }
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| StorageError::io_at("open", path, e))?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 64 * 1024];
        let mut content_length = 0u64;

        loop {
            let bytes_read = file
                .read(&mut buffer)
                .await
                .map_err(|e| StorageError::io_at("read", path, e))?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
            content_length += bytes_read as u64;
        }

        Ok(Self {
            source: PayloadSource::File(path.to_path_buf()),
            content_length,
            sha256: hex::encode(hasher.finalize()),
        })
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    async fn body(&self) -> Result<Body> {
        match &self.source {
            PayloadSource::Memory(data) => Ok(Body::from(data.clone())),
            PayloadSource::File(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| StorageError::io_at("open", path, e))?;
                Ok(Body::wrap_stream(ReaderStream::new(file)))
            }
        }
    }
}

/// Streaming body of a successful GET.
#[derive(Debug)]
pub struct ObjectStream {
    response: Response,
    target: String,
}

impl ObjectStream {
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> {
        let target = self.target;
        self.response
            .bytes_stream()
            .map_err(move |source| StorageError::Network {
                operation: "GET",
                target: target.clone(),
                source,
            })
    }

    pub async fn read_to_end(self) -> Result<Vec<u8>> {
        let mut stream = Box::pin(self.into_stream());
        let mut data = Vec::new();
        while let Some(chunk) = stream.try_next().await? {
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }
}

struct RequestSpec<'a> {
    method: Method,
    bucket: &'a str,
    key: &'a str,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    payload: Option<&'a PutPayload>,
}

impl RequestSpec<'_> {
    fn target(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }

    fn operation(&self) -> &'static str {
        if self.method == Method::PUT {
            "PUT"
        } else if self.method == Method::DELETE {
            "DELETE"
        } else if !self.query.is_empty() {
            "LIST"
        } else {
            "GET"
        }
    }
}

/// Minimal S3 REST client: signed Put/Get/Delete/ListObjectsV2 with retry.
pub struct ObjectStoreClient {
    http: Client,
    endpoint: Url,
    region: String,
    credentials: Credentials,
    addressing: Addressing,
    max_attempts: u32,
    retry_base_delay: Duration,
}

impl ObjectStoreClient {
    pub fn new(config: &S3Config) -> Result<Self> {
        if config.region.trim().is_empty() {
            return Err(StorageError::Config("s3 region is required".to_string()));
        }
        if config.access_key_id.is_empty() || config.secret_access_key.is_empty() {
            return Err(StorageError::Config(
                "s3 access key id and secret access key are required".to_string(),
            ));
        }

        let endpoint = resolve_endpoint(config.endpoint.as_deref(), &config.region, config.use_tls)?;

        let mut builder = Client::builder().user_agent(USER_AGENT);
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let http = builder
            .build()
            .map_err(|e| StorageError::Config(format!("failed to create HTTP client: {}", e)))?;

        debug!(
            "S3 client for {} (region {}, {:?} addressing, {} attempt(s))",
            endpoint,
            config.region,
            Addressing::from_force_path_style(config.force_path_style),
            config.max_attempts()
        );

        Ok(Self {
            http,
            endpoint,
            region: config.region.clone(),
            credentials: Credentials {
                access_key_id: config.access_key_id.clone(),
                secret_access_key: config.secret_access_key.clone(),
                session_token: config.session_token.clone().filter(|t| !t.is_empty()),
            },
            addressing: Addressing::from_force_path_style(config.force_path_style),
            max_attempts: config.max_attempts(),
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        payload: &PutPayload,
        headers: &[(String, String)],
    ) -> Result<()> {
        let spec = RequestSpec {
            method: Method::PUT,
            bucket,
            key,
            query: Vec::new(),
            headers: headers.to_vec(),
            payload: Some(payload),
        };
        self.execute(&spec).await?;
        Ok(())
    }

    pub async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectStream> {
        let spec = RequestSpec {
            method: Method::GET,
            bucket,
            key,
            query: Vec::new(),
            headers: Vec::new(),
            payload: None,
        };
        let response = self.execute(&spec).await?;
        Ok(ObjectStream {
            response,
            target: spec.target(),
        })
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let spec = RequestSpec {
            method: Method::DELETE,
            bucket,
            key,
            query: Vec::new(),
            headers: Vec::new(),
            payload: None,
        };
        self.execute(&spec).await?;
        Ok(())
    }

    /// Fetches a single ListObjectsV2 page.
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation_token: Option<&str>,
    ) -> Result<ListPage> {
        let mut query = vec![("list-type".to_string(), "2".to_string())];
        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            query.push(("prefix".to_string(), prefix.to_string()));
        }
        if let Some(token) = continuation_token.filter(|t| !t.is_empty()) {
            query.push(("continuation-token".to_string(), token.to_string()));
        }

        let spec = RequestSpec {
            method: Method::GET,
            bucket,
            key: "",
            query,
            headers: Vec::new(),
            payload: None,
        };
        let response = self.execute(&spec).await?;
        let body = response
            .text()
            .await
            .map_err(|source| StorageError::Network {
                operation: "LIST",
                target: spec.target(),
                source,
            })?;
        parse_list_objects(&body)
    }

    /// Follows continuation tokens until the listing is exhausted.
    pub async fn list_all_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<ListedObject>> {
        let mut objects = Vec::new();
        let mut seen_tokens = HashSet::new();
        let mut token: Option<String> = None;

        loop {
            let page = self.list_objects(bucket, prefix, token.as_deref()).await?;
            debug!(
                "Listed {} object(s) from s3://{}/{}",
                page.objects.len(),
                bucket,
                prefix.unwrap_or("")
            );
            let next = page.next_token().map(str::to_string);
            objects.extend(page.objects);

            match next {
                Some(next) => {
                    if !seen_tokens.insert(next.clone()) {
                        return Err(StorageError::InvalidResponse(format!(
                            "continuation token {:?} repeated while listing s3://{}",
                            next, bucket
                        )));
                    }
                    token = Some(next);
                }
                None => break,
            }
        }

        Ok(objects)
    }

    async fn execute(&self, spec: &RequestSpec<'_>) -> Result<Response> {
        let mut attempt = 1;
        loop {
            match self.send_once(spec).await {
                Ok(response) => return Ok(response),
                Err(err) if attempt < self.max_attempts && err.is_retryable() => {
                    let delay = backoff(self.retry_base_delay, attempt);
                    warn!(
                        "{} {} failed on attempt {}/{}: {}; retrying in {:?}",
                        spec.operation(),
                        spec.target(),
                        attempt,
                        self.max_attempts,
                        err,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_once(&self, spec: &RequestSpec<'_>) -> Result<Response> {
        let request = self.build_request(spec, Utc::now()).await?;
        debug!("{} {}", request.method(), request.url());

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|source| StorageError::Network {
                operation: spec.operation(),
                target: spec.target(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        Err(StorageError::Http {
            operation: spec.operation(),
            target: spec.target(),
            status: status.as_u16(),
            body: error_excerpt(response).await,
        })
    }

    async fn build_request(&self, spec: &RequestSpec<'_>, timestamp: DateTime<Utc>) -> Result<Request> {
        let target = resolve_target(&self.endpoint, self.addressing, spec.bucket, spec.key)?;
        let url = target.url(&self.endpoint, &canonical_query(&spec.query))?;
        let payload_hash = spec
            .payload
            .map(|p| p.sha256().to_string())
            .unwrap_or_else(|| EMPTY_PAYLOAD_HASH.to_string());

        let mut headers = spec.headers.clone();
        headers.push(("x-amz-date".to_string(), format_amz_date(&timestamp)));
        headers.push(("x-amz-content-sha256".to_string(), payload_hash.clone()));
        if let Some(token) = &self.credentials.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }

        let signing = sign(
            &SigningRequest {
                method: spec.method.as_str(),
                host: &target.host,
                canonical_uri: &target.canonical_uri,
                query: &spec.query,
                headers: &headers,
                payload_hash: &payload_hash,
            },
            &self.credentials,
            &self.region,
            timestamp,
        );

        let mut builder = self
            .http
            .request(spec.method.clone(), url)
            .header(AUTHORIZATION, signing.authorization);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(payload) = spec.payload {
            builder = builder
                .header(CONTENT_LENGTH, payload.content_length())
                .body(payload.body().await?);
        }

        builder.build().map_err(|e| {
            StorageError::Config(format!(
                "invalid {} request for {}: {}",
                spec.operation(),
                spec.target(),
                e
            ))
        })
    }
}

/// Delay before retrying after the given 1-based attempt: linear in the attempt number.
fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt)
}

async fn error_excerpt(mut response: Response) -> String {
    let mut excerpt = Vec::new();
    while excerpt.len() < MAX_ERROR_BODY {
        match response.chunk().await {
            Ok(Some(chunk)) => excerpt.extend_from_slice(&chunk),
            _ => break,
        }
    }
    excerpt.truncate(MAX_ERROR_BODY);
    String::from_utf8_lossy(&excerpt).trim().to_string()
}
