// src/ports/http.rs
//! JSON-over-HTTP adapters for remote enrichment services.
//!
//! Every service takes a POST with a small JSON body and answers JSON. HTTP status codes
//! are folded into `CapabilityError` so the stage runner can tell transient trouble
//! (429, 5xx, connect/timeouts) from permanent rejections (404, 413, 422).

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::lang::LangCode;
use crate::model::{AudioRef, Coordinates, Entity};
use crate::ports::{
    CapResult, CapabilityError, EntityExtractor, GeoPoint, Geocoder, SpeechSynthesizer,
    Summarizer, Translator,
};

const USER_AGENT: &str = "hyperlocal-news-enricher/0.1";

/// Shared transport for one remote capability.
#[derive(Clone)]
pub struct HttpCapabilityClient {
    name: &'static str,
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpCapabilityClient {
    pub fn new(
        name: &'static str,
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .with_context(|| format!("building HTTP client for {name}"))?;
        Ok(Self {
            name,
            http,
            endpoint: endpoint.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            timeout,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST `body` and decode the answer. `on_unprocessable` builds the error for a 422.
    async fn post_json<Req, Resp>(
        &self,
        body: &Req,
        on_unprocessable: impl FnOnce() -> CapabilityError,
    ) -> CapResult<Resp>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned,
    {
        let mut req = self.http.post(&self.endpoint).json(body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(|e| self.transport_error(e))?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(map_status(self.name, status, &detail, on_unprocessable));
        }
        resp.json::<Resp>()
            .await
            .map_err(|e| CapabilityError::Internal(format!("{}: undecodable response: {e}", self.name)))
    }

    fn transport_error(&self, e: reqwest::Error) -> CapabilityError {
        if e.is_timeout() {
            CapabilityError::Timeout(self.timeout.as_millis() as u64)
        } else {
            CapabilityError::ServiceUnavailable(format!("{}: {e}", self.name))
        }
    }
}

/// Fold an unsuccessful HTTP status into a capability error.
pub fn map_status(
    service: &str,
    status: StatusCode,
    detail: &str,
    on_unprocessable: impl FnOnce() -> CapabilityError,
) -> CapabilityError {
    let detail: String = detail.chars().take(200).collect();
    match status {
        StatusCode::TOO_MANY_REQUESTS => CapabilityError::RateLimited(service.to_string()),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => CapabilityError::Timeout(0),
        StatusCode::NOT_FOUND => CapabilityError::NotFound(detail),
        StatusCode::PAYLOAD_TOO_LARGE => CapabilityError::InputTooLong { len: 0, max: 0 },
        StatusCode::UNPROCESSABLE_ENTITY => on_unprocessable(),
        s if s.is_server_error() => {
            CapabilityError::ServiceUnavailable(format!("{service}: HTTP {}", s.as_u16()))
        }
        s => CapabilityError::Validation(format!("{service}: HTTP {} {detail}", s.as_u16())),
    }
}

pub struct HttpTranslator {
    client: HttpCapabilityClient,
}

impl HttpTranslator {
    pub fn new(client: HttpCapabilityClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str, source: LangCode, target: LangCode) -> CapResult<String> {
        #[derive(Serialize)]
        struct Req<'a> {
            text: &'a str,
            source: LangCode,
            target: LangCode,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(alias = "translation", alias = "text")]
            translated_text: String,
        }

        let resp: Resp = self
            .client
            .post_json(&Req { text, source, target }, || {
                CapabilityError::UnsupportedLanguagePair {
                    from: source,
                    to: target,
                }
            })
            .await?;
        Ok(resp.translated_text)
    }

    fn name(&self) -> &'static str {
        self.client.name()
    }
}

pub struct HttpSummarizer {
    client: HttpCapabilityClient,
}

impl HttpSummarizer {
    pub fn new(client: HttpCapabilityClient) -> Self {
        Self { client }
    }
}

#[derive(Serialize)]
struct TextReq<'a> {
    text: &'a str,
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(&self, text: &str) -> CapResult<String> {
        #[derive(Deserialize)]
        struct Resp {
            summary: String,
        }
        let resp: Resp = self
            .client
            .post_json(&TextReq { text }, || {
                CapabilityError::Validation("summarizer rejected input".into())
            })
            .await?;
        Ok(resp.summary)
    }

    fn name(&self) -> &'static str {
        self.client.name()
    }
}

pub struct HttpEntityExtractor {
    client: HttpCapabilityClient,
}

impl HttpEntityExtractor {
    pub fn new(client: HttpCapabilityClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EntityExtractor for HttpEntityExtractor {
    async fn extract(&self, text: &str) -> CapResult<Vec<Entity>> {
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            entities: Vec<Entity>,
        }
        let resp: Resp = self
            .client
            .post_json(&TextReq { text }, || {
                CapabilityError::Validation("extractor rejected input".into())
            })
            .await?;
        Ok(resp.entities)
    }

    fn name(&self) -> &'static str {
        self.client.name()
    }
}

pub struct HttpGeocoder {
    client: HttpCapabilityClient,
}

impl HttpGeocoder {
    pub fn new(client: HttpCapabilityClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn geocode(&self, location: &str) -> CapResult<GeoPoint> {
        #[derive(Serialize)]
        struct Req<'a> {
            query: &'a str,
        }
        #[derive(Deserialize)]
        struct Resp {
            lat: f64,
            #[serde(alias = "lng", alias = "long")]
            lon: f64,
            #[serde(default, alias = "display_name")]
            name: Option<String>,
        }
        let resp: Resp = self
            .client
            .post_json(&Req { query: location }, || {
                CapabilityError::NotFound(location.to_string())
            })
            .await?;
        if !(-90.0..=90.0).contains(&resp.lat) || !(-180.0..=180.0).contains(&resp.lon) {
            return Err(CapabilityError::Internal(format!(
                "geocoder returned out-of-range coordinates for {location}"
            )));
        }
        Ok(GeoPoint {
            coordinates: Coordinates {
                lat: resp.lat,
                lon: resp.lon,
            },
            resolved_name: resp.name,
        })
    }

    fn name(&self) -> &'static str {
        self.client.name()
    }
}

pub struct HttpSpeechSynthesizer {
    client: HttpCapabilityClient,
}

impl HttpSpeechSynthesizer {
    pub fn new(client: HttpCapabilityClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, text: &str, lang: LangCode) -> CapResult<AudioRef> {
        #[derive(Serialize)]
        struct Req<'a> {
            text: &'a str,
            language: LangCode,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(alias = "audio", alias = "uri", alias = "path")]
            audio_url: String,
        }
        let resp: Resp = self
            .client
            .post_json(&Req { text, language: lang }, || {
                CapabilityError::UnsupportedLanguage(lang)
            })
            .await?;
        Ok(AudioRef(resp.audio_url))
    }

    fn name(&self) -> &'static str {
        self.client.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ErrorKind;

    fn kind(status: u16) -> ErrorKind {
        let s = StatusCode::from_u16(status).unwrap();
        map_status("translate", s, "", || CapabilityError::UnsupportedLanguagePair {
            from: LangCode::En,
            to: LangCode::Or,
        })
        .kind()
    }

    #[test]
    fn statuses_map_to_error_kinds() {
        assert_eq!(kind(429), ErrorKind::RateLimited);
        assert_eq!(kind(503), ErrorKind::ServiceUnavailable);
        assert_eq!(kind(500), ErrorKind::ServiceUnavailable);
        assert_eq!(kind(504), ErrorKind::Timeout);
        assert_eq!(kind(404), ErrorKind::NotFound);
        assert_eq!(kind(413), ErrorKind::InputTooLong);
        assert_eq!(kind(422), ErrorKind::UnsupportedLanguagePair);
        assert_eq!(kind(400), ErrorKind::Validation);
    }

    #[test]
    fn only_overload_statuses_are_transient() {
        assert!(kind(429).is_transient());
        assert!(kind(502).is_transient());
        assert!(!kind(404).is_transient());
        assert!(!kind(422).is_transient());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transient() {
        let client = HttpCapabilityClient::new(
            "summarize",
            "http://127.0.0.1:9/summarize",
            None,
            Duration::from_millis(500),
        )
        .unwrap();
        let err = HttpSummarizer::new(client).summarize("text").await.unwrap_err();
        assert!(err.is_transient(), "got {err:?}");
    }
}
