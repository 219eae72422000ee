//! Provider proxy clients.
//!
//! Both clients share the same plumbing: a [`ProviderChannel`] builds `GET {base}/{endpoint}`
//! requests, pushes them through the provider's [`RequestQueue`] and turns the response into
//! either a JSON document or a tagged [`AtlasError`]. The clients then map the documents into
//! domain records and degrade every failure to an empty result.

pub mod deezer;
pub mod lastfm;

use crate::config::ProviderConfig;
use crate::events::SharedEventBroadcaster;
use crate::queue::RequestQueue;
use crate::transport::{ApiRequest, HttpResponse, Transport};
use crate::types::{Provider, Tag};
use crate::{AtlasError, Result};
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Largest `limit` accepted by search, similar and top-track calls.
pub const MAX_LIMIT: u32 = 50;
/// Largest `limit` accepted by tag calls.
pub const MAX_TAG_LIMIT: u32 = 100;

/// Folksonomy tags that say nothing about genre.
const TAG_BLACKLIST: &[&str] = &[
    "seen live",
    "favorites",
    "favourites",
    "favorite",
    "favourite",
    "my favorite",
    "my favorites",
    "favorite artists",
    "favourite artists",
    "albums i own",
    "love",
    "loved",
    "awesome",
    "amazing",
    "beautiful",
    "cool",
    "good",
    "great",
    "best",
    "spotify",
    "under 2000 listeners",
    "check out",
    "to listen",
    "want to see live",
    "male vocalists",
    "female vocalists",
    "male vocalist",
    "female vocalist",
];

/// Queue-mediated access to one provider proxy.
#[derive(Clone)]
pub struct ProviderChannel {
    provider: Provider,
    base_path: String,
    transport: Transport,
    queue: RequestQueue<Value>,
}

impl ProviderChannel {
    pub fn new(
        provider: Provider,
        config: &ProviderConfig,
        transport: Transport,
        broadcaster: Arc<SharedEventBroadcaster>,
    ) -> Self {
        Self {
            provider,
            base_path: config.base_path.trim_end_matches('/').to_string(),
            transport,
            queue: RequestQueue::with_broadcaster(provider, config.queue.clone(), broadcaster),
        }
    }

    pub fn queue(&self) -> &RequestQueue<Value> {
        &self.queue
    }

    /// One queued `GET {base}/{endpoint}?{params}`.
    ///
    /// Throttling answers never come back from here; the queue holds the call until the
    /// provider accepts it.
    pub async fn fetch(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = self
            .transport
            .url(&format!("{}/{endpoint}", self.base_path), params)?;
        let request = ApiRequest::get(url);
        let transport = self.transport.clone();
        let provider = self.provider;

        self.queue
            .enqueue(move || {
                let transport = transport.clone();
                let request = request.clone();
                async move {
                    let response = transport.execute(&request, None).await?;
                    classify(provider, response)
                }
            })
            .await
    }
}

/// Map a proxy response to its JSON document or a tagged error.
///
/// A 2xx body can still carry an error, either as `{"error": {"code", "message"}}` or as
/// `{"error": code, "message": ...}`.
pub fn classify(provider: Provider, response: HttpResponse) -> Result<Value> {
    match response.status {
        429 => {
            return Err(AtlasError::RateLimited {
                retry_after: response.retry_after,
            })
        }
        401 => {
            return Err(AtlasError::Unauthorized(format!(
                "{provider} proxy rejected the request"
            )))
        }
        status if !response.is_success() => {
            return Err(AtlasError::Transport {
                status: Some(status),
                message: response.body.chars().take(200).collect(),
            })
        }
        _ => {}
    }

    let body: Value = serde_json::from_str(&response.body)?;
    if let Some((code, message)) = embedded_error(&body) {
        if provider.is_throttling_code(code) {
            return Err(AtlasError::RateLimited { retry_after: None });
        }
        return Err(AtlasError::Application {
            provider,
            code,
            message,
        });
    }
    Ok(body)
}

fn embedded_error(body: &Value) -> Option<(i64, String)> {
    let top_message = || {
        body.get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    match body.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::Object(error) => {
            let code = error.get("code").and_then(as_i64).unwrap_or_default();
            let message = error
                .get("message")
                .or_else(|| error.get("type"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(top_message);
            Some((code, message))
        }
        other => {
            let code = as_i64(other).unwrap_or_default();
            let message = match other {
                Value::String(text) if text.parse::<i64>().is_err() => text.clone(),
                _ => top_message(),
            };
            Some((code, message))
        }
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Take `name` out of `body` and decode it; a missing or `null` field is `None`.
pub(crate) fn field<T: DeserializeOwned>(body: &mut Value, name: &str) -> Result<Option<T>> {
    match body.get_mut(name).map(Value::take) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
    }
}

/// Take the list `name` out of `body` and decode it entry by entry.
///
/// A missing or `null` list is empty. Entries that fail to decode are skipped with a warning
/// so one malformed record does not cost the rest of the page.
pub(crate) fn entries<T: DeserializeOwned>(body: &mut Value, name: &str) -> Result<Vec<T>> {
    let items = match body.get_mut(name).map(Value::take) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(AtlasError::Parse(format!(
                "expected a list in {name:?}, got {other}"
            )))
        }
    };

    let total = items.len();
    let decoded: Vec<T> = items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping malformed entry {index} in {name:?}: {e}");
                None
            }
        })
        .collect();
    if decoded.len() < total {
        log::debug!("Kept {} of {total} entries in {name:?}", decoded.len());
    }
    Ok(decoded)
}

/// Trimmed query, or `None` when nothing is left.
pub(crate) fn non_empty(query: &str) -> Option<&str> {
    let query = query.trim();
    (!query.is_empty()).then_some(query)
}

pub(crate) fn clamp_limit(limit: u32, max: u32) -> u32 {
    limit.clamp(1, max)
}

/// Drop noise tags and non-positive counts, lowercase and dedupe, cap at `limit`.
pub fn filter_tags<I>(raw: I, limit: u32) -> Vec<Tag>
where
    I: IntoIterator<Item = (String, Option<i64>)>,
{
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter(|(_, count)| count.map_or(true, |count| count > 0))
        .filter_map(|(name, count)| {
            let name = name.trim().to_lowercase();
            if name.is_empty() || is_blacklisted(&name) || !seen.insert(name.clone()) {
                return None;
            }
            Some(Tag {
                name,
                count: count.map(|count| count as u64),
            })
        })
        .take(limit as usize)
        .collect()
}

fn is_blacklisted(tag: &str) -> bool {
    let key = crate::normalize_name(tag);
    TAG_BLACKLIST
        .iter()
        .any(|noise| crate::normalize_name(noise) == key)
}

// Proxies pass numbers through as they get them: sometimes JSON numbers, sometimes strings.

pub(crate) fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

pub(crate) fn lenient_u64<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<u64>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

pub(crate) fn lenient_i64<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<i64>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.as_ref().and_then(as_i64))
}

pub(crate) fn lenient_f64<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// `None` for missing or blank URLs.
pub(crate) fn non_blank(url: Option<String>) -> Option<String> {
    url.filter(|url| !url.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            retry_after: None,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_status_mapping() {
        let throttled = HttpResponse {
            retry_after: Some(std::time::Duration::from_secs(7)),
            ..response(429, "")
        };
        assert!(matches!(
            classify(Provider::Deezer, throttled),
            Err(AtlasError::RateLimited { retry_after: Some(d) }) if d.as_secs() == 7
        ));
        assert!(matches!(
            classify(Provider::Deezer, response(401, "")),
            Err(AtlasError::Unauthorized(_))
        ));
        assert!(matches!(
            classify(Provider::LastFm, response(502, "bad gateway")),
            Err(AtlasError::Transport {
                status: Some(502),
                ..
            })
        ));
        assert_eq!(
            classify(Provider::Deezer, response(200, r#"{"matches":[]}"#)).unwrap(),
            json!({"matches": []})
        );
    }

    #[test]
    fn test_nested_error_shape() {
        let body = r#"{"error":{"type":"DataException","message":"no data","code":800}}"#;
        match classify(Provider::Deezer, response(200, body)) {
            Err(AtlasError::Application { code, message, .. }) => {
                assert_eq!(code, 800);
                assert_eq!(message, "no data");
            }
            other => panic!("unexpected {other:?}"),
        }

        let quota = r#"{"error":{"type":"Exception","message":"Quota limit exceeded","code":4}}"#;
        assert!(matches!(
            classify(Provider::Deezer, response(200, quota)),
            Err(AtlasError::RateLimited { retry_after: None })
        ));
    }

    #[test]
    fn test_flat_error_shape() {
        let body = r#"{"error":6,"message":"The artist you supplied could not be found"}"#;
        match classify(Provider::LastFm, response(200, body)) {
            Err(AtlasError::Application {
                provider,
                code,
                message,
            }) => {
                assert_eq!(provider, Provider::LastFm);
                assert_eq!(code, 6);
                assert!(message.contains("could not be found"));
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            classify(
                Provider::LastFm,
                response(200, r#"{"error":29,"message":"Rate Limit Exceeded"}"#)
            ),
            Err(AtlasError::RateLimited { .. })
        ));
        // Deezer's throttling code means nothing to Last.fm.
        assert!(matches!(
            classify(Provider::LastFm, response(200, r#"{"error":4,"message":"x"}"#)),
            Err(AtlasError::Application { code: 4, .. })
        ));
    }

    #[test]
    fn test_null_error_is_not_an_error() {
        assert!(classify(Provider::LastFm, response(200, r#"{"error":null,"tags":[]}"#)).is_ok());
    }

    #[test]
    fn test_malformed_body_is_parse_error() {
        let err = classify(Provider::Deezer, response(200, "<html>")).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Parse);
    }

    #[test]
    fn test_filter_tags() {
        let raw = vec![
            ("Doom Metal".to_string(), Some(100)),
            ("seen live".to_string(), Some(90)),
            ("Drone".to_string(), Some(80)),
            ("doom metal ".to_string(), Some(70)),
            ("Favourites".to_string(), Some(60)),
            ("sludge".to_string(), Some(0)),
            ("japanese".to_string(), None),
            ("  ".to_string(), Some(10)),
            ("noise".to_string(), Some(5)),
        ];
        let tags = filter_tags(raw, 3);
        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["doom metal", "drone", "japanese"]);
        assert_eq!(tags[0].count, Some(100));
        assert_eq!(tags[2].count, None);
    }

    #[test]
    fn test_limits_and_queries() {
        assert_eq!(clamp_limit(0, MAX_LIMIT), 1);
        assert_eq!(clamp_limit(500, MAX_LIMIT), 50);
        assert_eq!(clamp_limit(500, MAX_TAG_LIMIT), 100);
        assert_eq!(non_empty("  boris "), Some("boris"));
        assert_eq!(non_empty(" \t"), None);
    }

    #[test]
    fn test_field_extraction() {
        let mut body = json!({"matches": [1, 2], "artist": null});
        assert_eq!(field::<Vec<u8>>(&mut body, "matches").unwrap(), Some(vec![1, 2]));
        assert_eq!(field::<u8>(&mut body, "artist").unwrap(), None);
        assert_eq!(field::<u8>(&mut body, "missing").unwrap(), None);
        assert!(field::<u8>(&mut json!({"artist": "x"}), "artist").is_err());
    }

    #[test]
    fn test_entries_skip_malformed_items() {
        let mut body = json!({
            "matches": [1, "two", 3, null, 4],
            "related": null,
            "artist": {"name": "Boris"}
        });
        assert_eq!(entries::<u8>(&mut body, "matches").unwrap(), vec![1, 3, 4]);
        assert!(entries::<u8>(&mut body, "related").unwrap().is_empty());
        assert!(entries::<u8>(&mut body, "missing").unwrap().is_empty());
        assert!(entries::<u8>(&mut body, "artist").is_err());
    }
}
