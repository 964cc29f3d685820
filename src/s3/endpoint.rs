use super::signer::uri_encode;
use crate::error::{Result, StorageError};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// `https://endpoint/<bucket>/<key>`
    PathStyle,
    /// `https://<bucket>.endpoint/<key>`
    VirtualHosted,
}

impl Addressing {
    pub fn from_force_path_style(force_path_style: bool) -> Self {
        if force_path_style {
            Addressing::PathStyle
        } else {
            Addressing::VirtualHosted
        }
    }
}

fn scheme(use_tls: bool) -> &'static str {
    if use_tls {
        "https"
    } else {
        "http"
    }
}

pub fn default_endpoint(region: &str, use_tls: bool) -> String {
    let host = if region == "us-east-1" {
        "s3.amazonaws.com".to_string()
    } else {
        format!("s3.{}.amazonaws.com", region)
    };
    format!("{}://{}", scheme(use_tls), host)
}

pub fn resolve_endpoint(endpoint: Option<&str>, region: &str, use_tls: bool) -> Result<Url> {
    let raw = match endpoint.map(str::trim).filter(|e| !e.is_empty()) {
        Some(e) if e.contains("://") => e.to_string(),
        Some(e) => format!("{}://{}", scheme(use_tls), e),
        None => default_endpoint(region, use_tls),
    };

    let mut url = Url::parse(&raw)
        .map_err(|e| StorageError::Config(format!("invalid s3 endpoint {:?}: {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(StorageError::Config(format!(
            "unsupported s3 endpoint scheme {:?}",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(StorageError::Config(format!(
            "s3 endpoint {:?} must include a host",
            raw
        )));
    }

    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    host_name: String,
    /// Value of the `Host` header, including a non-default port.
    pub host: String,
    pub canonical_uri: String,
}

impl RequestTarget {
    pub fn url(&self, endpoint: &Url, canonical_query: &str) -> Result<Url> {
        let mut url = endpoint.clone();
        url.set_host(Some(&self.host_name))
            .map_err(|e| StorageError::Config(format!("invalid host {:?}: {}", self.host_name, e)))?;
        url.set_path(&self.canonical_uri);
        if canonical_query.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(canonical_query));
        }
        Ok(url)
    }
}

fn with_port(host: &str, port: Option<u16>) -> String {
    match port {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

pub fn resolve_target(
    endpoint: &Url,
    addressing: Addressing,
    bucket: &str,
    key: &str,
) -> Result<RequestTarget> {
    if bucket.is_empty() {
        return Err(StorageError::Config("bucket is required".to_string()));
    }
    let endpoint_host = endpoint
        .host_str()
        .ok_or_else(|| StorageError::Config("s3 endpoint has no host".to_string()))?;

    let host_name = match addressing {
        Addressing::PathStyle => endpoint_host.to_string(),
        Addressing::VirtualHosted => {
            let bucket_prefix = format!("{}.", bucket.to_ascii_lowercase());
            if endpoint_host.to_ascii_lowercase().starts_with(&bucket_prefix) {
                endpoint_host.to_string()
            } else {
                format!("{}.{}", bucket, endpoint_host)
            }
        }
    };

    let mut segments: Vec<String> = Vec::new();
    let base_path = endpoint.path().trim_matches('/');
    if !base_path.is_empty() {
        segments.push(base_path.to_string());
    }
    if addressing == Addressing::PathStyle {
        segments.push(uri_encode(bucket, true));
    }
    let key = key.trim_start_matches('/');
    if !key.is_empty() {
        segments.push(uri_encode(key, false));
    }

    Ok(RequestTarget {
        host: with_port(&host_name, endpoint.port()),
        host_name,
        canonical_uri: format!("/{}", segments.join("/")),
    })
}
