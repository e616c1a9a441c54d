//! HTTP access to the enrichment and email validation services.
//!
//! Both services authenticate with an API key header and scope every call
//! to a tenant header. A `502` or `400` answer is retried once after a short
//! pause; any other non-`200` status is an error. Requests carry the W3C
//! trace headers of the current span.

use crate::config::ApiConfig;
use crate::trace_context::inject_trace_headers;
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "X-Openline-API-KEY";

/// Header carrying the tenant.
pub const TENANT_HEADER: &str = "tenant";

/// External API failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentError {
    /// The request could not be sent
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The body did not parse
    #[error("Failed to parse response: {0}")]
    ResponseParseFailed(String),

    /// Non-200 status
    #[error("API error ({status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// The service answered but reported no result
    #[error("Service reported failure for {0}")]
    Unsuccessful(String),
}

/// Authenticated JSON client for one service.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    config: ApiConfig,
    attempts: usize,
    retry_pause: Duration,
}

impl ApiClient {
    /// Client with two attempts and a 500 ms pause between them.
    #[must_use]
    pub fn new(config: ApiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            attempts: 2,
            retry_pause: Duration::from_millis(500),
        }
    }

    /// Override the pause between attempts.
    #[must_use]
    pub const fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    /// Base URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Send `body` as JSON to `{url}{path}` and parse the JSON answer.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichmentError`] on transport failures, a non-200 status
    /// after the last attempt, or an unparsable body.
    pub async fn call<Req, Resp>(
        &self,
        method: Method,
        path: &str,
        tenant: &str,
        body: &Req,
    ) -> Result<Resp, EnrichmentError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.config.url.trim_end_matches('/'), path);
        let trace_headers = inject_trace_headers(&tracing::Span::current());
        let mut attempt = 1;
        let response = loop {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .header(API_KEY_HEADER, &self.config.api_key)
                .header(TENANT_HEADER, tenant)
                .header("content-type", "application/json");
            for (name, value) in &trace_headers {
                request = request.header(name.as_str(), value.as_str());
            }
            let response = request
                .json(body)
                .send()
                .await
                .map_err(|e| EnrichmentError::RequestFailed(e.to_string()))?;

            let retryable = matches!(
                response.status(),
                StatusCode::BAD_GATEWAY | StatusCode::BAD_REQUEST
            );
            if retryable && attempt < self.attempts {
                tracing::debug!(
                    url = %url,
                    status = %response.status(),
                    attempt,
                    "Retrying API call"
                );
                attempt += 1;
                tokio::time::sleep(self.retry_pause).await;
                continue;
            }
            break response;
        };

        match response.status() {
            StatusCode::OK => response
                .json::<Resp>()
                .await
                .map_err(|e| EnrichmentError::ResponseParseFailed(e.to_string())),
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(EnrichmentError::ApiError {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::trace_context::{otel_layer, tracer_provider};
    use opentelemetry::propagation::TextMapPropagator;
    use opentelemetry_sdk::propagation::TraceContextPropagator;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use tracing::Instrument;
    use tracing_opentelemetry::OpenTelemetrySpanExt;
    use tracing_subscriber::layer::SubscriberExt;
    use wiremock::matchers::{body_json, header, header_regex, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(ApiConfig {
            url: server.uri(),
            api_key: "secret".to_string(),
        })
        .with_retry_pause(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn sends_auth_and_tenant_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/enrichOrganization"))
            .and(header(API_KEY_HEADER, "secret"))
            .and(header(TENANT_HEADER, "acme"))
            .and(body_json(json!({"domain": "acme.com"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let answer: Value = client(&server)
            .call(Method::GET, "/enrichOrganization", "acme", &json!({"domain": "acme.com"}))
            .await
            .unwrap();
        assert_eq!(answer["success"], true);
    }

    #[tokio::test]
    async fn bad_gateway_is_retried_once() {
        let server = MockServer::start().await;
        Mock::given(path("/validateEmail"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(path("/validateEmail"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": 1})))
            .mount(&server)
            .await;

        let answer: Value = client(&server)
            .call(Method::POST, "/validateEmail", "acme", &json!({}))
            .await
            .unwrap();
        assert_eq!(answer["ok"], 1);
    }

    #[tokio::test]
    async fn persistent_bad_request_is_an_error_after_two_attempts() {
        let server = MockServer::start().await;
        Mock::given(path("/validateEmail"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad input"))
            .expect(2)
            .mount(&server)
            .await;

        let err = client(&server)
            .call::<_, Value>(Method::POST, "/validateEmail", "acme", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EnrichmentError::ApiError {
                status: 400,
                message: "bad input".to_string()
            }
        );
    }

    #[tokio::test]
    async fn server_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(path("/validateEmail"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .call::<_, Value>(Method::POST, "/validateEmail", "acme", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichmentError::ApiError { status: 500, .. }));
    }

    #[tokio::test]
    async fn forwards_the_current_trace() {
        let provider = tracer_provider("test");
        let subscriber = tracing_subscriber::registry().with(otel_layer(&provider));
        let _guard = tracing::subscriber::set_default(subscriber);

        let carrier = HashMap::from([(
            "traceparent".to_string(),
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
        )]);
        let span = tracing::info_span!("enrich");
        span.set_parent(TraceContextPropagator::new().extract(&carrier));

        let server = MockServer::start().await;
        Mock::given(path("/enrichOrganization"))
            .and(header_regex(
                "traceparent",
                "^00-4bf92f3577b34da6a3ce929d0e0e4736-[0-9a-f]{16}-01$",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let answer: Value = client(&server)
            .call(Method::GET, "/enrichOrganization", "acme", &json!({}))
            .instrument(span)
            .await
            .unwrap();
        assert_eq!(answer["success"], true);
    }
}
