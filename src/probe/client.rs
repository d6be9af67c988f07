use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::Result;
use crate::classify::FailedRequest;
use crate::error::{ConfigError, Error, ProbeError};

use super::response::{failure_from_response, failure_from_transport};

const CORRELATION_HEADER: &str = "x-correlation-id";

/// Issues GET requests against console endpoints and reports failures in the
/// shape the interceptor expects.
#[derive(Clone)]
pub struct ProbeClient {
    http: reqwest::Client,
    base: Url,
    token: Option<SecretString>,
}

impl ProbeClient {
    /// Build a `ProbeClient` configured with the supplied parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTPS is required but the URL uses HTTP, or if the
    /// underlying HTTP client fails to build.
    pub fn new(
        base: Url,
        token: Option<SecretString>,
        timeout: Duration,
        connect_timeout: Duration,
        insecure_http: bool,
    ) -> Result<Self> {
        if base.scheme() != "https" && !insecure_http {
            return Err(Error::Config(ConfigError::InvalidField {
                field: "probe.base_url",
                message: "only https URLs are accepted without --insecure".to_string(),
            }));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .user_agent(concat!("errgate/", env!("CARGO_PKG_VERSION")))
            .pool_idle_timeout(Duration::from_secs(30));

        if !insecure_http {
            builder = builder.https_only(true);
        }

        let http = builder
            .build()
            .map_err(|err| ProbeError::Client { source: err })?;

        Ok(Self { http, base, token })
    }

    pub fn endpoint_url(&self, endpoint: &str) -> Result<Url> {
        self.base.join(endpoint).map_err(|err| {
            ProbeError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
            .into()
        })
    }

    /// GET `endpoint`; `Ok(None)` on success, the failure record otherwise.
    ///
    /// # Errors
    ///
    /// Only an endpoint that cannot be joined onto the base URL is an error;
    /// HTTP and transport failures are returned as [`FailedRequest`].
    pub async fn probe(&self, endpoint: &str) -> Result<Option<FailedRequest>> {
        let url = self.endpoint_url(endpoint)?;
        let correlation_id = Uuid::now_v7().to_string();
        let started = Instant::now();

        let mut request = self
            .http
            .get(url.clone())
            .header(CORRELATION_HEADER, &correlation_id);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(%url, %correlation_id, error = %err, "probe transport error");
                return Ok(Some(failure_from_transport(url.as_str(), &err)));
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!(
                %url,
                %correlation_id,
                latency_ms = started.elapsed().as_millis(),
                "probe succeeded"
            );
            return Ok(None);
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => {
                warn!(%url, %correlation_id, error = %err, "failed to read error body");
                Default::default()
            }
        };
        debug!(
            %url,
            %correlation_id,
            status = status.as_u16(),
            latency_ms = started.elapsed().as_millis(),
            "probe failed"
        );
        Ok(Some(failure_from_response(url.as_str(), status, &body)))
    }

    /// Probe every endpoint with at most `concurrency` requests in flight.
    /// Results keep the order of `endpoints`.
    pub async fn probe_all(
        &self,
        endpoints: &[String],
        concurrency: usize,
    ) -> Vec<Result<Option<FailedRequest>>> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks: JoinSet<(usize, Result<Option<FailedRequest>>)> = JoinSet::new();

        for (idx, endpoint) in endpoints.iter().cloned().enumerate() {
            let client = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (idx, Err(task_error(&endpoint, "probe limiter closed")));
                };
                (idx, client.probe(&endpoint).await)
            });
        }

        join_in_order(endpoints, tasks).await
    }
}

/// Collect task results into `endpoints` order. A slot whose task never
/// reported back (panic or cancellation) holds a [`ProbeError::Task`].
async fn join_in_order(
    endpoints: &[String],
    mut tasks: JoinSet<(usize, Result<Option<FailedRequest>>)>,
) -> Vec<Result<Option<FailedRequest>>> {
    let mut out: Vec<Option<Result<Option<FailedRequest>>>> =
        endpoints.iter().map(|_| None).collect();
    while let Some(res) = tasks.join_next().await {
        match res {
            Ok((idx, outcome)) => {
                if let Some(slot) = out.get_mut(idx) {
                    *slot = Some(outcome);
                }
            }
            Err(join_err) => {
                warn!(error = %join_err, "probe task failed");
            }
        }
    }
    out.into_iter()
        .zip(endpoints)
        .map(|(slot, endpoint)| {
            slot.unwrap_or_else(|| Err(task_error(endpoint, "probe task panicked or was cancelled")))
        })
        .collect()
}

fn task_error(endpoint: &str, message: &str) -> Error {
    ProbeError::Task {
        endpoint: endpoint.to_string(),
        message: message.to_string(),
    }
    .into()
}

impl std::fmt::Debug for ProbeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeClient")
            .field("base", &self.base.as_str())
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}
