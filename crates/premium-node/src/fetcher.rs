use premium_common::{ApiKey, PremiumError, Result, RetryPolicy, MAX_WAIT_SECS};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::transport::HttpTransport;

/// Query parameter carrying the access credential.
pub const API_KEY_PARAM: &str = "apiKey";

const TOO_MANY_REQUESTS: u16 = 429;

/// Issues one GET with retry/backoff on rate limiting.
///
/// Only 429 responses are retried. Any other non-success status, a timeout or
/// a transport failure ends the call immediately.
pub struct RateLimitedFetcher {
    transport: Arc<dyn HttpTransport>,
    api_key: ApiKey,
    policy: RetryPolicy,
}

impl RateLimitedFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, api_key: ApiKey, policy: RetryPolicy) -> Self {
        Self {
            transport,
            api_key,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch `url` and decode the body as JSON.
    pub async fn fetch(&self, url: &str, params: &[(&str, &str)], timeout: Duration) -> Result<Value> {
        let query = self.with_credential(url, params);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut backoff = self.policy.initial_backoff();

        for attempt in 1..=max_attempts {
            let response = self.transport.get(url, &query, timeout).await?;

            if response.is_success() {
                debug!("GET {} -> {}", url, response.status);
                return serde_json::from_str(&response.body).map_err(|e| {
                    PremiumError::InvalidResponse(format!("{url}: body is not JSON: {e}"))
                });
            }

            if response.status == TOO_MANY_REQUESTS {
                let delay = retry_after_hint(response.retry_after.as_deref()).unwrap_or(backoff);
                backoff = backoff.saturating_mul(2).min(self.policy.max_backoff());

                if attempt < max_attempts {
                    warn!(
                        "429 Too Many Requests for {}. Sleeping {:.2}s (attempt {}/{})",
                        url,
                        delay.as_secs_f64(),
                        attempt,
                        max_attempts
                    );
                    sleep(delay).await;
                }
                continue;
            }

            error!("HTTP {} for {}: {}", response.status, url, response.body);
            return Err(PremiumError::UpstreamHttp {
                url: url.to_string(),
                status: response.status,
                body: response.body,
            });
        }

        error!("Rate limit retries exhausted for {} after {} attempts", url, max_attempts);
        Err(PremiumError::RateLimitExhausted {
            url: url.to_string(),
            attempts: max_attempts,
        })
    }

    /// Owned query with the credential appended unless the URL or params already carry one.
    fn with_credential(&self, url: &str, params: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut query: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let in_url = url.contains(&format!("{API_KEY_PARAM}="));
        let in_params = params.iter().any(|(k, _)| *k == API_KEY_PARAM);
        if !in_url && !in_params {
            query.push((API_KEY_PARAM.to_string(), self.api_key.expose().to_string()));
        }
        query
    }
}

/// Server-provided wait hint in seconds, if present, numeric and at most
/// `MAX_WAIT_SECS`.
fn retry_after_hint(raw: Option<&str>) -> Option<Duration> {
    let secs = raw?.trim().parse::<f64>().ok()?;
    if secs.is_finite() && (0.0..=MAX_WAIT_SECS).contains(&secs) {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}
