//! AWS Signature Version 4 for S3 requests.
//!
//! Everything here is pure: the caller supplies the resolved host, the
//! already-encoded canonical URI, the headers it will send and the payload
//! hash, and gets back the `Authorization` value together with the
//! intermediate strings.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const SERVICE: &str = "s3";
pub const EMPTY_PAYLOAD_HASH: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const SCOPE_DATE_FORMAT: &str = "%Y%m%d";

const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');
const UNRESERVED_AND_SLASH: &AsciiSet = &UNRESERVED.remove(b'/');

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SigningRequest<'a> {
    pub method: &'a str,
    pub host: &'a str,
    /// Path exactly as sent on the wire, already URI-encoded.
    pub canonical_uri: &'a str,
    /// Raw (unencoded) query parameters.
    pub query: &'a [(String, String)],
    /// Headers to sign besides `host`.
    pub headers: &'a [(String, String)],
    pub payload_hash: &'a str,
}

#[derive(Debug, Clone)]
pub struct SigningContext {
    pub amz_date: String,
    pub scope: String,
    pub canonical_request: String,
    pub string_to_sign: String,
    pub signed_headers: String,
    pub signature: String,
    pub authorization: String,
}

/// Percent-encodes everything but `A-Za-z0-9-_.~`, and `/` unless `encode_slash`.
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let set = if encode_slash {
        UNRESERVED
    } else {
        UNRESERVED_AND_SLASH
    };
    utf8_percent_encode(input, set).to_string()
}

pub fn format_amz_date(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(AMZ_DATE_FORMAT).to_string()
}

pub fn payload_hash(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

pub fn canonical_query(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
        .collect();
    encoded.sort();

    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Returns the canonical header block and the signed header list.
pub fn canonical_headers(host: &str, headers: &[(String, String)]) -> (String, String) {
    let mut folded: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.trim().to_ascii_lowercase();
        if name == "host" {
            continue;
        }
        let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
        folded.entry(name).or_default().push(value);
    }
    folded.insert("host".to_string(), vec![host.trim().to_ascii_lowercase()]);

    let mut block = String::new();
    for (name, values) in &folded {
        block.push_str(name);
        block.push(':');
        block.push_str(&values.join(","));
        block.push('\n');
    }
    let signed = folded.keys().cloned().collect::<Vec<_>>().join(";");
    (block, signed)
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

pub fn signing_key(secret_access_key: &str, date: &str, region: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret_access_key).as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

pub fn sign(
    request: &SigningRequest<'_>,
    credentials: &Credentials,
    region: &str,
    timestamp: DateTime<Utc>,
) -> SigningContext {
    let amz_date = format_amz_date(&timestamp);
    let date = timestamp.format(SCOPE_DATE_FORMAT).to_string();
    let scope = format!("{}/{}/{}/aws4_request", date, region, SERVICE);

    let (header_block, signed_headers) = canonical_headers(request.host, request.headers);
    let query = canonical_query(request.query);
    let canonical_request = [
        request.method,
        request.canonical_uri,
        query.as_str(),
        header_block.as_str(),
        signed_headers.as_str(),
        request.payload_hash,
    ]
    .join("\n");

    let hashed_request = payload_hash(canonical_request.as_bytes());
    let string_to_sign = [
        ALGORITHM,
        amz_date.as_str(),
        scope.as_str(),
        hashed_request.as_str(),
    ]
    .join("\n");

    let key = signing_key(&credentials.secret_access_key, &date, region);
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));
    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, credentials.access_key_id, scope, signed_headers, signature
    );

    SigningContext {
        amz_date,
        scope,
        canonical_request,
        string_to_sign,
        signed_headers,
        signature,
        authorization,
    }
}
