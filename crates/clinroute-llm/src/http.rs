//! HTTP transport shared by the provider adapters
//!
//! Sends [`VendorRequest`] bodies with the provider's auth scheme, races every
//! network await against the request's cancellation token and turns non-2xx
//! statuses into [`Error::Api`] with a truncated, key-redacted body.

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::router::ProviderConfig;
use crate::util::sanitize_error_body;
use crate::wire::VendorRequest;

/// How credentials are attached to requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AuthScheme {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `x-goog-api-key: <key>`
    GoogApiKey,
    /// `x-api-key: <key>` plus `anthropic-version`
    Anthropic,
}

/// Anthropic API version header value
pub(crate) const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Configured HTTP client for one provider
#[derive(Clone)]
pub(crate) struct HttpTransport {
    client: Client,
    base_url: String,
    config: ProviderConfig,
    auth: AuthScheme,
}

impl HttpTransport {
    /// Build a transport, using `default_base_url` unless overridden
    pub(crate) fn new(config: ProviderConfig, default_base_url: &str, auth: AuthScheme) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            base_url,
            config,
            auth,
        })
    }

    pub(crate) fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let key = &self.config.api_key;
        let builder = match self.auth {
            AuthScheme::Bearer => {
                let builder = builder.bearer_auth(key);
                match &self.config.organization {
                    Some(org) => builder.header("OpenAI-Organization", org),
                    None => builder,
                }
            }
            AuthScheme::GoogApiKey => builder.header("x-goog-api-key", key),
            AuthScheme::Anthropic => builder
                .header("x-api-key", key)
                .header("anthropic-version", ANTHROPIC_VERSION),
        };

        self.config
            .headers
            .iter()
            .fold(builder, |builder, (name, value)| builder.header(name, value))
    }

    /// POST a vendor body; non-2xx statuses become [`Error::Api`]
    pub(crate) async fn post(
        &self,
        body: &VendorRequest,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let url = format!("{}{}", self.base_url, body.path());
        debug!(url = %url, stream = body.is_stream(), "Sending vendor request");

        let builder = self.authorize(self.client.post(&url).json(body));
        let builder = if body.is_stream() {
            builder.header("Accept", "text/event-stream")
        } else {
            builder
        };

        let response = send(builder, cancel).await?;
        self.check_status(response, cancel).await
    }

    /// GET a path relative to the base URL
    pub(crate) async fn get(&self, path: &str, cancel: &CancellationToken) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = send(self.authorize(self.client.get(&url)), cancel).await?;
        self.check_status(response, cancel).await
    }

    async fn check_status(&self, response: Response, cancel: &CancellationToken) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            text = response.text() => text.unwrap_or_default(),
        };
        Err(Error::Api {
            status: status.as_u16(),
            body: sanitize_error_body(&body, &self.config.api_key),
        })
    }
}

/// Send a request, aborting it if `cancel` fires first
pub(crate) async fn send(builder: RequestBuilder, cancel: &CancellationToken) -> Result<Response> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        result = builder.send() => result.map_err(network_error),
    }
}

/// Read and decode a JSON body, aborting if `cancel` fires first
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: Response,
    cancel: &CancellationToken,
) -> Result<T> {
    let bytes = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(Error::Cancelled),
        bytes = response.bytes() => bytes.map_err(network_error)?,
    };
    serde_json::from_slice(&bytes).map_err(|e| Error::InvalidResponse(e.to_string()))
}

/// Map a reqwest error without echoing the request URL (which may carry keys)
pub(crate) fn network_error(error: reqwest::Error) -> Error {
    let error = error.without_url();
    if error.is_timeout() {
        Error::Network(format!("request timed out: {error}"))
    } else {
        Error::Network(error.to_string())
    }
}

/// Milliseconds elapsed since `start`
pub(crate) fn elapsed_ms(start: tokio::time::Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
