use async_trait::async_trait;
use premium_common::{PremiumError, Result};
use reqwest::Client;
use std::time::Duration;

/// Raw outcome of one GET: status, optional `Retry-After`, body text.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub retry_after: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The single outbound seam of the pipeline.
///
/// Implementations map a timed-out call to `PremiumError::Timeout` and any
/// other connection failure to `PremiumError::Transport`; HTTP statuses are
/// returned as data, never as errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<HttpResponse>;
}

/// reqwest-backed transport used by the binaries.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("premium-node/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PremiumError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

fn classify(url: &str, timeout: Duration, err: reqwest::Error) -> PremiumError {
    if err.is_timeout() {
        PremiumError::Timeout {
            url: url.to_string(),
            timeout,
        }
    } else {
        // reqwest's message embeds the full URL, query credential included
        PremiumError::Transport(format!("{url}: {}", err.without_url()))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url)
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(url, timeout, e))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| classify(url, timeout, e))?;

        Ok(HttpResponse {
            status,
            retry_after,
            body,
        })
    }
}
