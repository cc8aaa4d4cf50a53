use chrono::{DateTime, Utc};
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::observation::{AqiIndex, Observation};
use crate::util::{sanitize_label, validate_feed_base, UrlValidationError};

const MAX_RESPONSE_SIZE: usize = 1024 * 1024; // 1MB

/// Errors that end a single fetch cycle. All of them are recoverable by
/// retrying later.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The deadline elapsed before a response was parsed.
    #[error("Request timed out")]
    Timeout,
    /// DNS, connection, TLS or non-2xx HTTP status.
    #[error("Transport error: {0}")]
    Transport(String),
    /// The body was not a successful feed envelope.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    /// No API token is configured; no request was sent.
    #[error("API token is missing")]
    MissingCredential,
}

impl FetchError {
    /// Strips the URL (which carries the token) from reqwest errors.
    fn transport(err: reqwest::Error) -> Self {
        FetchError::Transport(err.without_url().to_string())
    }
}

/// Runs `fut` under a hard deadline. When the deadline elapses the future is
/// dropped, abandoning any in-flight I/O, and `FetchError::Timeout` is
/// returned; the dropped future can never complete afterwards.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| FetchError::Timeout)?
}

/// HTTP client bound to one station of the feed.
#[derive(Clone)]
pub struct FetchClient {
    client: reqwest::Client,
    base_url: Url,
    station: String,
    timeout: Duration,
}

impl FetchClient {
    /// # Errors
    ///
    /// Fails if `base_url` does not pass [`validate_feed_base`].
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        station: &str,
        timeout: Duration,
    ) -> Result<Self, UrlValidationError> {
        Ok(Self {
            client,
            base_url: validate_feed_base(base_url)?,
            station: station.trim().to_string(),
            timeout,
        })
    }

    pub fn station(&self) -> &str {
        &self.station
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `{base}/feed/{station}/?token={token}`
    pub fn feed_url(&self, token: &SecretString) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("feed").push(&self.station).push("");
        }
        url.query_pairs_mut()
            .clear()
            .append_pair("token", token.expose_secret());
        url
    }

    /// Fetches and parses the current observation.
    ///
    /// An empty token fails with [`FetchError::MissingCredential`] before any
    /// network activity. Everything else (connect, status, body) shares one
    /// deadline of `self.timeout`.
    pub async fn fetch(&self, token: &SecretString) -> Result<Observation, FetchError> {
        if token.expose_secret().trim().is_empty() {
            return Err(FetchError::MissingCredential);
        }

        let url = self.feed_url(token);
        tracing::debug!(station = %self.station, timeout_ms = self.timeout.as_millis() as u64, "Fetching station feed");

        let body = with_deadline(self.timeout, async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(FetchError::transport)?;

            if !response.status().is_success() {
                return Err(FetchError::Transport(format!(
                    "HTTP status {}",
                    response.status().as_u16()
                )));
            }

            read_limited_bytes(response, MAX_RESPONSE_SIZE).await
        })
        .await?;

        parse_feed(&body, &self.station, Utc::now())
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::MalformedResponse(format!(
                "response too large ({} bytes)",
                len
            )));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::transport)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::MalformedResponse(
                "response too large".to_string(),
            ));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

// ============================================================================
// Envelope parsing
// ============================================================================

#[derive(Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct FeedData {
    #[serde(default)]
    aqi: serde_json::Value,
    #[serde(default)]
    iaqi: BTreeMap<String, SubReading>,
    #[serde(default)]
    city: City,
    #[serde(default)]
    time: Option<FeedTime>,
}

#[derive(Deserialize)]
struct SubReading {
    #[serde(default)]
    v: serde_json::Value,
}

#[derive(Deserialize, Default)]
struct City {
    name: Option<String>,
    location: Option<String>,
}

#[derive(Deserialize)]
struct FeedTime {
    iso: Option<String>,
}

/// Numbers and numeric strings are readings; anything else (the feed uses
/// `"-"`) is not.
fn numeric(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parses a feed body into an [`Observation`].
///
/// The envelope must carry `status: "ok"` and an object `data`. A missing or
/// non-numeric `aqi` is tolerated and yields [`AqiIndex::Unavailable`].
pub fn parse_feed(
    body: &[u8],
    station: &str,
    received_at: DateTime<Utc>,
) -> Result<Observation, FetchError> {
    let envelope: Envelope = serde_json::from_slice(body)
        .map_err(|e| FetchError::MalformedResponse(format!("invalid JSON: {}", e)))?;

    if envelope.status != "ok" {
        let detail = envelope.data.as_str().unwrap_or("no detail");
        return Err(FetchError::MalformedResponse(format!(
            "status {:?} ({})",
            envelope.status, detail
        )));
    }

    if !envelope.data.is_object() {
        return Err(FetchError::MalformedResponse(
            "data is not an object".to_string(),
        ));
    }

    let data: FeedData = serde_json::from_value(envelope.data)
        .map_err(|e| FetchError::MalformedResponse(format!("unexpected data shape: {}", e)))?;

    let index = numeric(&data.aqi)
        .map(AqiIndex::from_f64)
        .unwrap_or(AqiIndex::Unavailable);

    let particulates = data
        .iaqi
        .iter()
        .filter_map(|(name, reading)| numeric(&reading.v).map(|v| (name.clone(), v)))
        .collect();

    let location = data
        .city
        .name
        .or(data.city.location)
        .map(|l| sanitize_label(&l))
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| station.to_string());

    let observed_at = data
        .time
        .and_then(|t| t.iso)
        .and_then(|iso| DateTime::parse_from_rfc3339(&iso).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(received_at);

    Ok(Observation {
        index,
        particulates,
        location,
        observed_at,
    })
}
