//! Authenticated JSON transport for the OfferKit API.
use std::time::Duration;

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
    Url,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    error::{ApiError, Failure, TimeoutError},
    ClientConfig, Error, Result,
};

pub(crate) const OFFERS_ENDPOINT: &str = "/api/sdk/offers";
pub(crate) const TEST_ENDPOINT: &str = "/api/sdk/test";

const AGENT_ID_HEADER: HeaderName = HeaderName::from_static("x-agent-id");
const AGENT_SECRET_HEADER: HeaderName = HeaderName::from_static("x-agent-secret-key");

/// Sends authenticated POST requests with a per-request timeout.
///
/// Each `Transport` owns its own reqwest client. reqwest clients are bound to the runtime they
/// are first used on, so the health-check thread builds a separate one.
#[derive(Clone)]
pub(crate) struct Transport {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::Client,
    base_url: Url,
    headers: HeaderMap,
    timeout: Duration,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

impl Transport {
    pub fn new(config: &ClientConfig) -> Result<Transport> {
        let base_url = Url::parse(config.resolved_base_url()).map_err(|err| {
            Error::config(format!("invalid base_url configuration: {err}")).with_details(err)
        })?;

        Ok(Transport {
            client: reqwest::Client::new(),
            base_url,
            headers: request_headers(config)?,
            timeout: config.timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    /// POST `body` to `path` and decode the JSON response.
    ///
    /// The whole exchange, including reading the body, is bounded by the configured timeout.
    /// When it elapses the in-flight request future is dropped, which aborts the request.
    pub async fn post<B, R>(&self, path: &str, body: &B) -> std::result::Result<R, Failure>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path);
        log::debug!(target: "offerkit", path; "sending request");

        let exchange = async {
            let response = self
                .client
                .post(url)
                .headers(self.headers.clone())
                .json(body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.json::<ErrorBody>().await.ok();
                let message = body.and_then(|body| body.error).unwrap_or_else(|| {
                    format!(
                        "HTTP {}: {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("Unknown")
                    )
                });
                log::warn!(target: "offerkit", path, status = status.as_u16(); "received non-2xx response: {message}");
                return Err(Failure::Api(ApiError { status, message }));
            }

            Ok::<R, Failure>(response.json::<R>().await?)
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_elapsed) => {
                log::warn!(target: "offerkit", path; "request timed out after {:?}", self.timeout);
                Err(Failure::Timeout(TimeoutError {
                    timeout_ms: self.timeout.as_millis(),
                }))
            }
        }
    }
}

/// SDK headers first, caller-supplied headers on top so they can replace them.
fn request_headers(config: &ClientConfig) -> Result<HeaderMap> {
    let header_value = |name: &str, value: &str| {
        HeaderValue::from_str(value)
            .map_err(|err| Error::config(format!("invalid {name}: {err}")).with_details(err))
    };

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(AGENT_ID_HEADER, header_value("agent_id", &config.agent_id)?);
    let mut secret = header_value("agent_secret", &config.agent_secret)?;
    secret.set_sensitive(true);
    headers.insert(AGENT_SECRET_HEADER, secret);

    for (name, value) in &config.headers {
        headers.insert(name.clone(), value.clone());
    }

    Ok(headers)
}
