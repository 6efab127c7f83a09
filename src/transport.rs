use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{Error, MultiError, Result};
use crate::resolver::Resolver;

/// Result of one logical request that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// 200 with a decodable body.
    Body(T),
    /// 304, nothing changed since the last request.
    NotModified,
    /// 504, the long poll ran out without a notification.
    GatewayTimeout,
}

impl<T> Outcome<T> {
    pub fn into_body(self) -> Option<T> {
        match self {
            Outcome::Body(body) => Some(body),
            Outcome::NotModified | Outcome::GatewayTimeout => None,
        }
    }
}

/// Executes GET requests against the resolved hosts with per-host retries
/// and linear backoff.
#[derive(Debug, Clone)]
pub struct Transport {
    http: reqwest::Client,
    connect_timeout: Duration,
    retry_interval: Duration,
    max_retries: u32,
}

impl Transport {
    pub fn new(connect_timeout: Duration, retry_interval: Duration, max_retries: u32) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            connect_timeout,
            retry_interval,
            max_retries,
        })
    }

    /// Run `path` against every host the resolver yields, in order. `timeout`
    /// overrides the connect timeout for deliberately slow calls.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        resolver: &dyn Resolver,
        path: &str,
        timeout: Option<Duration>,
    ) -> Result<Outcome<T>> {
        let hosts = resolver.resolve()?;
        if hosts.is_empty() {
            return Err(Error::NoHost);
        }
        let timeout = timeout.unwrap_or(self.connect_timeout);

        let mut errors = MultiError::new();
        for host in hosts {
            let url = format!("{}/{}", host.trim_end_matches('/'), path);
            match self.request(&url, timeout).await {
                Ok(outcome) => return Ok(outcome),
                Err(host_errors) => {
                    info!(%url, errors = host_errors.len(), "request failed on host");
                    errors.extend(host_errors);
                }
            }
        }

        Err(Error::AllHostsFailed(errors))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        url: &str,
        timeout: Duration,
    ) -> std::result::Result<Outcome<T>, MultiError> {
        let mut errors = MultiError::new();

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let wait = self.retry_interval * attempt;
                debug!(%url, attempt, ?wait, "backing off before retry");
                tokio::time::sleep(wait).await;
            }

            let response = match self.http.get(url).timeout(timeout).send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(%url, attempt, error = %e, "connect apollo server failed");
                    errors.push(e);
                    continue;
                }
            };

            match response.status() {
                StatusCode::OK => {
                    let body = match response.bytes().await {
                        Ok(b) => b,
                        Err(e) => {
                            warn!(%url, attempt, error = %e, "read response body failed");
                            errors.push(e);
                            continue;
                        }
                    };
                    match serde_json::from_slice(&body) {
                        Ok(decoded) => return Ok(Outcome::Body(decoded)),
                        Err(e) => {
                            warn!(%url, attempt, error = %e, "decode response body failed");
                            errors.push(Error::Decode(e));
                        }
                    }
                }
                StatusCode::NOT_MODIFIED => {
                    debug!(%url, "not modified");
                    return Ok(Outcome::NotModified);
                }
                StatusCode::GATEWAY_TIMEOUT => {
                    debug!(%url, "gateway timeout");
                    return Ok(Outcome::GatewayTimeout);
                }
                status => {
                    warn!(%url, attempt, status = status.as_u16(), "unexpected status");
                    errors.push(Error::InvalidStatus(status.as_u16()));
                }
            }
        }

        warn!(%url, max_retries = self.max_retries, "failed after max retries");
        Err(errors)
    }
}
