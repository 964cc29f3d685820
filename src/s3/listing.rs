use crate::error::{Result, StorageError};
use chrono::{DateTime, NaiveDateTime, Utc};
use xmlparser::{ElementEnd, Token, Tokenizer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    pub key: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One page of a ListObjectsV2 response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<ListedObject>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

impl ListPage {
    /// Token for the following page, if the listing continues.
    pub fn next_token(&self) -> Option<&str> {
        if !self.is_truncated {
            return None;
        }
        self.next_continuation_token
            .as_deref()
            .filter(|token| !token.is_empty())
    }
}

/// Accepts RFC3339 with or without fractional seconds, and zone-less variants as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|t| t.and_utc())
        })
}

fn invalid(message: impl Into<String>) -> StorageError {
    StorageError::InvalidResponse(message.into())
}

fn unescape(raw: &str) -> Result<String> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let end = after
            .find(';')
            .ok_or_else(|| invalid(format!("unterminated entity in {:?}", raw)))?;
        let entity = &after[..end];
        let ch = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
                    .ok_or_else(|| invalid(format!("unknown entity &{};", entity)))?
            }
        };
        out.push(ch);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

pub fn parse_list_objects(xml: &str) -> Result<ListPage> {
    let mut page = ListPage::default();
    let mut stack: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut key: Option<String> = None;
    let mut modified: Option<String> = None;
    let mut saw_root = false;

    for token in Tokenizer::from(xml) {
        let token = token.map_err(|e| invalid(format!("malformed list response: {}", e)))?;
        match token {
            Token::ElementStart { local, .. } => {
                if local.as_str() == "Contents" {
                    key = None;
                    modified = None;
                }
                stack.push(local.as_str().to_string());
                text.clear();
            }
            Token::Text { text: chunk } => text.push_str(&unescape(chunk.as_str())?),
            Token::Cdata { text: chunk, .. } => text.push_str(chunk.as_str()),
            Token::ElementEnd {
                end: ElementEnd::Open,
                ..
            } => {}
            Token::ElementEnd { .. } => {
                let name = stack
                    .pop()
                    .ok_or_else(|| invalid("unbalanced closing tag in list response"))?;
                let value = std::mem::take(&mut text);
                match (stack.last().map(String::as_str), name.as_str()) {
                    (None, "ListBucketResult") => saw_root = true,
                    (Some("ListBucketResult"), "IsTruncated") => {
                        page.is_truncated = value.trim().eq_ignore_ascii_case("true");
                    }
                    (Some("ListBucketResult"), "NextContinuationToken") => {
                        let token = value.trim();
                        if !token.is_empty() {
                            page.next_continuation_token = Some(token.to_string());
                        }
                    }
                    (Some("ListBucketResult"), "Contents") => {
                        if let Some(key) = key.take() {
                            page.objects.push(ListedObject {
                                key,
                                last_modified: modified.take().as_deref().and_then(parse_timestamp),
                            });
                        }
                    }
                    (Some("Contents"), "Key") => key = Some(value),
                    (Some("Contents"), "LastModified") => modified = Some(value),
                    _ => {}
                }
            }
            _ => {}
        }
    }

    if !saw_root {
        return Err(invalid("response is not a ListBucketResult document"));
    }
    Ok(page)
}
