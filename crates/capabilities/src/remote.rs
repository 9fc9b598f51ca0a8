//! Remote-call capability: HTTP request/response over reqwest.
//!
//! Query-style verbs (GET, DELETE) serialize the payload as query
//! parameters; all other verbs send it as a JSON body.  Success requires
//! a 2xx response whose body parses as JSON, which becomes the output
//! payload.  Retries are bounded and explicit and live entirely on this
//! path; the engine itself never retries a node.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{CapabilityError, HttpVerb};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the HTTP invoker.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Per-request timeout; exceeding it fails the capability with
    /// [`CapabilityError::Timeout`].
    pub timeout: Duration,
    /// Retries after a transport failure or a 502/503/504 response.
    pub max_retries: u32,
    /// Base delay for exponential back-off between retries.
    pub retry_base_delay: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(100),
        }
    }
}

// ---------------------------------------------------------------------------
// HttpInvoker
// ---------------------------------------------------------------------------

/// Performs remote-call capabilities over HTTP.
pub struct HttpInvoker {
    client: reqwest::Client,
    config: RemoteConfig,
}

impl HttpInvoker {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Perform the request and return the decoded response payload.
    pub async fn call(
        &self,
        address: &str,
        verb: HttpVerb,
        payload: &Value,
    ) -> Result<Value, CapabilityError> {
        let mut attempts = 0u32;

        loop {
            match self.call_once(address, verb, payload).await {
                Ok(output) => return Ok(output),
                Err(Attempt::Fatal(err)) => return Err(err),
                Err(Attempt::Retryable(err)) => {
                    attempts += 1;
                    if attempts > self.config.max_retries {
                        return Err(err);
                    }

                    let delay = backoff_delay(self.config.retry_base_delay, attempts);
                    warn!(
                        "remote call {} {address} failed (attempt {attempts}/{}), retrying in {delay:?}: {err}",
                        verb.as_str(),
                        self.config.max_retries,
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn call_once(
        &self,
        address: &str,
        verb: HttpVerb,
        payload: &Value,
    ) -> Result<Value, Attempt> {
        let mut request = self
            .client
            .request(method_for(verb), address)
            .timeout(self.config.timeout);

        request = if verb.sends_query() {
            request.query(&query_pairs(payload).map_err(Attempt::Fatal)?)
        } else {
            request.json(payload)
        };

        debug!("remote call {} {address}", verb.as_str());

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                Attempt::Fatal(CapabilityError::Timeout {
                    timeout_ms: self.config.timeout.as_millis() as u64,
                })
            } else {
                Attempt::Retryable(CapabilityError::Invocation {
                    status: None,
                    detail: format!("transport error: {err}"),
                })
            }
        })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let err = CapabilityError::Invocation {
                status: Some(status.as_u16()),
                detail: format!("status {status}: {body}"),
            };
            return if retryable_status(status) {
                Err(Attempt::Retryable(err))
            } else {
                Err(Attempt::Fatal(err))
            };
        }

        serde_json::from_str(&body).map_err(|err| {
            Attempt::Fatal(CapabilityError::Invocation {
                status: Some(status.as_u16()),
                detail: format!("response body is not valid JSON: {err}"),
            })
        })
    }
}

/// Outcome of a single attempt, before retry policy is applied.
enum Attempt {
    Retryable(CapabilityError),
    Fatal(CapabilityError),
}

/// Exponential back-off for the n-th retry (1-based).  The exponent
/// saturates so a large `max_retries` cannot overflow the multiplier.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.saturating_pow(attempt.saturating_sub(1))
}

fn method_for(verb: HttpVerb) -> Method {
    match verb {
        HttpVerb::Get => Method::GET,
        HttpVerb::Post => Method::POST,
        HttpVerb::Put => Method::PUT,
        HttpVerb::Patch => Method::PATCH,
        HttpVerb::Delete => Method::DELETE,
    }
}

fn retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 502 | 503 | 504)
}

/// Flatten a top-level object payload into query pairs.
///
/// Scalars are sent verbatim; nested values are JSON-encoded so the
/// receiver can decode them losslessly.
fn query_pairs(payload: &Value) -> Result<Vec<(String, String)>, CapabilityError> {
    let object = payload
        .as_object()
        .ok_or_else(|| CapabilityError::Invocation {
            status: None,
            detail: "query-style remote call requires an object payload".to_string(),
        })?;

    let mut pairs = Vec::with_capacity(object.len());
    for (key, value) in object {
        let encoded = match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            Value::Bool(_) | Value::Number(_) => value.to_string(),
            Value::Array(_) | Value::Object(_) => {
                serde_json::to_string(value).unwrap_or_default()
            }
        };
        pairs.push((key.clone(), encoded));
    }

    Ok(pairs)
}
