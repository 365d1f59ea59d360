use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use super::{
    AttemptFailure, FetchError, FetchStrategy, FetchTarget, FetchedJson, FetchedResponse, ProxyRoute, Result,
    StatusCode, StatusPolicy, UpstreamRequest,
};
use crate::ports::HttpClientPort;

pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const RELAY_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const ACCEPT_JSON: &str = "application/json, text/plain, */*";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9,ar;q=0.8";
const PREVIEW_CHARS: usize = 200;

/// Fetches a catalog resource directly, then through the configured relays.
///
/// Attempt-level failures never leave this type on their own: callers get
/// either the winning response or `FetchError::AllAttemptsExhausted`.
#[derive(Clone)]
pub struct ResilientFetcher {
    http_client: Arc<dyn HttpClientPort>,
    relays: Vec<ProxyRoute>,
    strategy: FetchStrategy,
    status_policy: StatusPolicy,
    site_origin: String,
}

impl ResilientFetcher {
    pub fn new(http_client: Arc<dyn HttpClientPort>, relays: Vec<ProxyRoute>, site: &Url) -> Self {
        Self {
            http_client,
            relays,
            strategy: FetchStrategy::Sequential,
            status_policy: StatusPolicy::AlwaysFallback,
            site_origin: site.origin().ascii_serialization(),
        }
    }

    pub fn with_strategy(mut self, strategy: FetchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_status_policy(mut self, status_policy: StatusPolicy) -> Self {
        self.status_policy = status_policy;
        self
    }

    /// Direct first, then relays in configuration order.
    pub fn routes(&self) -> Vec<ProxyRoute> {
        let mut routes = Vec::with_capacity(self.relays.len() + 1);
        routes.push(ProxyRoute::Direct);
        routes.extend(self.relays.iter().cloned());
        routes
    }

    pub async fn fetch(&self, target: &FetchTarget, budget: Duration) -> Result<FetchedResponse> {
        debug!(
            url = %target,
            strategy = %self.strategy,
            routes = self.relays.len() + 1,
            "Fetching catalog resource"
        );
        match self.strategy {
            FetchStrategy::Sequential => self.fetch_sequential(target, budget).await,
            FetchStrategy::Racing => self.fetch_racing(target, budget).await,
        }
    }

    /// Fetch and parse. The body must be UTF-8 so it can be forwarded as
    /// received; either failure is reported with a preview of what came back.
    pub async fn fetch_json(&self, target: &FetchTarget, budget: Duration) -> Result<FetchedJson> {
        let fetched = self.fetch(target, budget).await?;

        let parsed = fetched.text().map_err(|e| e.to_string()).and_then(|text| {
            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(value) => Ok((text, value)),
                Err(e) => Err(e.to_string()),
            }
        });

        match parsed {
            Ok((text, value)) => Ok(FetchedJson { fetched, text, value }),
            Err(message) => {
                let body = String::from_utf8_lossy(&fetched.response.body);
                let preview: String = body.chars().take(PREVIEW_CHARS).collect();
                warn!(
                    url = %target,
                    route = %fetched.route,
                    length = fetched.response.body.len(),
                    preview = %preview,
                    "Response is not valid JSON: {}",
                    message
                );
                Err(FetchError::ParseFailure { message, preview })
            }
        }
    }

    async fn fetch_sequential(&self, target: &FetchTarget, budget: Duration) -> Result<FetchedResponse> {
        let mut failures = Vec::new();

        for (index, route) in self.routes().iter().enumerate() {
            match self.attempt(index, route, target, budget).await {
                Ok(fetched) => return Ok(fetched),
                Err(failure) => {
                    let terminal = self.terminal_status(&failure);
                    failures.push(failure);
                    if terminal.is_some() {
                        return Err(FetchError::AllAttemptsExhausted { failures, terminal });
                    }
                }
            }
        }

        Err(FetchError::AllAttemptsExhausted {
            failures,
            terminal: None,
        })
    }

    async fn fetch_racing(&self, target: &FetchTarget, budget: Duration) -> Result<FetchedResponse> {
        let routes = self.routes();
        let mut pending: FuturesUnordered<_> = routes
            .iter()
            .enumerate()
            .map(|(index, route)| self.attempt(index, route, target, budget))
            .collect();
        let mut failures = Vec::new();

        // Returning drops `pending`, which cancels the attempts still in flight.
        while let Some(outcome) = pending.next().await {
            match outcome {
                Ok(fetched) => return Ok(fetched),
                Err(failure) => {
                    let terminal = self.terminal_status(&failure);
                    failures.push(failure);
                    if terminal.is_some() {
                        return Err(FetchError::AllAttemptsExhausted { failures, terminal });
                    }
                }
            }
        }

        Err(FetchError::AllAttemptsExhausted {
            failures,
            terminal: None,
        })
    }

    fn terminal_status(&self, failure: &AttemptFailure) -> Option<StatusCode> {
        match &failure.error {
            FetchError::UpstreamStatus(status) if self.status_policy.is_terminal(&failure.route, *status) => {
                Some(*status)
            }
            _ => None,
        }
    }

    async fn attempt(
        &self,
        index: usize,
        route: &ProxyRoute,
        target: &FetchTarget,
        budget: Duration,
    ) -> std::result::Result<FetchedResponse, AttemptFailure> {
        let started = Instant::now();

        let outcome = match self.build_request(route, target) {
            Ok(request) => match timeout(budget, self.http_client.execute(&request)).await {
                Ok(Ok(response)) if response.status.is_success() => Ok(response),
                Ok(Ok(response)) => Err(FetchError::UpstreamStatus(response.status)),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(FetchError::Timeout(budget)),
            },
            Err(e) => Err(e),
        };
        let elapsed = started.elapsed();

        match outcome {
            Ok(response) => {
                info!(
                    attempt = index,
                    route = %route,
                    url = %target,
                    strategy = %self.strategy,
                    status = response.status.as_u16(),
                    latency_ms = elapsed.as_millis() as u64,
                    "Attempt succeeded"
                );
                Ok(FetchedResponse {
                    attempt: index,
                    route: route.clone(),
                    response,
                    elapsed,
                })
            }
            Err(error) => {
                warn!(
                    attempt = index,
                    route = %route,
                    url = %target,
                    strategy = %self.strategy,
                    kind = error.kind(),
                    latency_ms = elapsed.as_millis() as u64,
                    "Attempt failed: {}",
                    error
                );
                Err(AttemptFailure {
                    index,
                    route: route.clone(),
                    error,
                    elapsed,
                })
            }
        }
    }

    fn build_request(&self, route: &ProxyRoute, target: &FetchTarget) -> Result<UpstreamRequest> {
        let request = UpstreamRequest::new(route.attempt_url(target)?);

        // The catalog rejects requests that do not look like they come from its own site.
        Ok(match route {
            ProxyRoute::Direct => request
                .with_header("user-agent", BROWSER_USER_AGENT)
                .with_header("accept", ACCEPT_JSON)
                .with_header("accept-language", ACCEPT_LANGUAGE)
                .with_header("referer", format!("{}/", self.site_origin))
                .with_header("origin", self.site_origin.clone()),
            ProxyRoute::Relay { .. } => request
                .with_header("user-agent", RELAY_USER_AGENT)
                .with_header("accept", ACCEPT_JSON),
        })
    }
}
