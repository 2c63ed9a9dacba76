use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

use crate::config::ScrapeConfig;
use crate::error::{Result, ScrapeError};
use crate::security::HostAllowList;

/// Read access to upstream pages.
///
/// The pipeline only talks to the network through this trait so that
/// orchestration can be exercised against canned HTML.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// GET `url` and return the body of a successful response.
    async fn fetch(&self, url: &str) -> Result<String>;

    /// Whether `url` currently answers with a success status.
    async fn probe(&self, url: &str) -> bool;
}

const MAX_REDIRECTS: usize = 10;

/// Redirects stay inside the allow-list; a hop elsewhere ends the chain.
fn follows_redirect(allow: &HostAllowList, target: &str, previous_hops: usize) -> bool {
    previous_hops < MAX_REDIRECTS && allow.allows(target)
}

fn build_client(config: &ScrapeConfig, allow: HostAllowList) -> Result<reqwest::Client> {
    let policy = reqwest::redirect::Policy::custom(move |attempt| {
        if follows_redirect(&allow, attempt.url().as_str(), attempt.previous().len()) {
            attempt.follow()
        } else {
            tracing::warn!(target_url = %attempt.url(), "redirect not followed");
            attempt.stop()
        }
    });
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .user_agent(config.user_agent.as_str())
        .redirect(policy)
        .build()
        .map_err(|e| ScrapeError::network("client", e))
}

/// Retry helper with exponential backoff
async fn retry_with_backoff<F, Fut, T>(
    mut f: F,
    max_retries: usize,
    initial_delay_ms: u64,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_retries && e.is_transient() => {
                let delay_ms = initial_delay_ms * (1 << attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts = max_retries + 1,
                    delay_ms,
                    error = %e,
                    "retrying after error"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// HTTP implementation of [`PageSource`] bound to one chamber's allow-list.
///
/// Every attempt carries the configured timeout; any non-2xx status is
/// treated as transient and retried, except a redirect the client refused
/// to follow. No cookies or credentials are sent.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    allow: HostAllowList,
    max_retries: usize,
    retry_delay_ms: u64,
}

impl HttpFetcher {
    pub fn new(config: &ScrapeConfig, allow: HostAllowList) -> Result<Self> {
        Ok(Self {
            client: build_client(config, allow)?,
            allow,
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
        })
    }

    async fn get_once(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml")
            .header("Accept-Language", "es-AR,es;q=0.9")
            .send()
            .await
            .map_err(|e| ScrapeError::network(url, describe(&e)))?;

        let status = response.status();
        if status.is_redirection() {
            // Only reached when the redirect policy stopped the chain.
            let target = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|loc| response.url().join(loc).ok());
            return match target {
                Some(target) if !self.allow.allows(target.as_str()) => {
                    Err(ScrapeError::DisallowedHost(target.to_string()))
                }
                _ => Err(ScrapeError::network(url, format!("HTTP {} (redirect not followed)", status))),
            };
        }
        if !status.is_success() {
            return Err(ScrapeError::network(url, format!("HTTP {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| ScrapeError::network(url, describe(&e)))
    }

    async fn status_of(&self, method: reqwest::Method, url: &str) -> Option<StatusCode> {
        match self.client.request(method, url).send().await {
            Ok(response) => Some(response.status()),
            Err(e) => {
                tracing::debug!(url, error = %e, "probe failed");
                None
            }
        }
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.allow.check(url)?;
        tracing::debug!(url, "fetching page");
        let body = retry_with_backoff(|| self.get_once(url), self.max_retries, self.retry_delay_ms)
            .await?;
        tracing::debug!(url, bytes = body.len(), "fetched page");
        Ok(body)
    }

    async fn probe(&self, url: &str) -> bool {
        if !self.allow.allows(url) {
            return false;
        }
        match self.status_of(reqwest::Method::HEAD, url).await {
            Some(status) if status.is_success() => true,
            // Some image hosts refuse HEAD outright.
            Some(StatusCode::METHOD_NOT_ALLOWED) | Some(StatusCode::FORBIDDEN) => self
                .status_of(reqwest::Method::GET, url)
                .await
                .is_some_and(|status| status.is_success()),
            _ => false,
        }
    }
}

fn describe(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "timed out".to_string()
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    }
}
