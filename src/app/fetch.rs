use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::StatusCode;
use reqwest::header::USER_AGENT;
use reqwest::redirect::Policy;

use super::error::{AppError, Result};
use super::types::FetchOutcome;

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub user_agents: Arc<[String]>,
    /// Empty means every request goes direct.
    pub proxies: Vec<String>,
    pub fetch_timeout: Duration,
    pub probe_timeout: Duration,
    pub max_connections: usize,
}

/// Bounded-time page downloads with a per-call random identity.
///
/// reqwest binds a proxy to a client, so clients are built per configured
/// proxy up front and every call draws one of them. Cloning is cheap and all
/// clones share the same pools.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    direct: ClientPair,
    proxied: Arc<[ClientPair]>,
    user_agents: Arc<[String]>,
    fetch_timeout: Duration,
    probe_timeout: Duration,
}

/// Both clients for one route. Page fetches follow redirects; probes judge
/// the first response.
#[derive(Debug, Clone)]
struct ClientPair {
    page: reqwest::Client,
    probe: reqwest::Client,
}

impl ClientPair {
    fn build(config: &FetcherConfig, proxy: Option<&str>) -> Result<Self> {
        let upstream = proxy
            .map(|proxy| {
                reqwest::Proxy::all(proxy).map_err(|source| AppError::InvalidProxy {
                    proxy: proxy.to_string(),
                    source,
                })
            })
            .transpose()?;
        let with_route = |builder: reqwest::ClientBuilder| match &upstream {
            Some(upstream) => builder.proxy(upstream.clone()),
            None => builder.no_proxy(),
        };

        let page = with_route(client_builder(config.max_connections, config.fetch_timeout))
            .build()
            .map_err(AppError::HttpClient)?;
        let probe = with_route(client_builder(config.max_connections, config.probe_timeout))
            .redirect(Policy::none())
            .build()
            .map_err(AppError::HttpClient)?;
        Ok(Self { page, probe })
    }
}

impl PageFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let direct = ClientPair::build(&config, None)?;
        let proxied = config
            .proxies
            .iter()
            .map(|proxy| ClientPair::build(&config, Some(proxy)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            direct,
            proxied: proxied.into(),
            user_agents: config.user_agents,
            fetch_timeout: config.fetch_timeout,
            probe_timeout: config.probe_timeout,
        })
    }

    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        let (clients, user_agent) = self.pick_identity();
        let mut request = clients.page.get(url).timeout(self.fetch_timeout);
        if let Some(ua) = user_agent {
            request = request.header(USER_AGENT, ua);
        }

        // text() decodes using the charset the response declares.
        let outcome = match request.send().await {
            Ok(response) if response.status() == StatusCode::OK => match response.text().await {
                Ok(body) => FetchOutcome::Html(body),
                Err(err) => FetchOutcome::Failed(format!("body read failed: {err}")),
            },
            Ok(response) => FetchOutcome::Failed(format!("http {}", response.status().as_u16())),
            Err(err) => FetchOutcome::Failed(describe_error(&err)),
        };

        if let FetchOutcome::Failed(reason) = &outcome {
            tracing::warn!(url = %url, reason = %truncate_for_log(reason, 100), "fetch failed");
        }
        outcome
    }

    /// HEAD existence check. Anything but a 200 counts as absent, redirects included.
    pub async fn probe(&self, url: &str) -> bool {
        let (clients, user_agent) = self.pick_identity();
        let mut request = clients.probe.head(url).timeout(self.probe_timeout);
        if let Some(ua) = user_agent {
            request = request.header(USER_AGENT, ua);
        }

        match request.send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(err) => {
                tracing::debug!(url = %url, reason = %describe_error(&err), "probe failed");
                false
            }
        }
    }

    fn pick_identity(&self) -> (&ClientPair, Option<&str>) {
        let mut rng = rand::thread_rng();
        let clients = self.proxied.choose(&mut rng).unwrap_or(&self.direct);
        let user_agent = self.user_agents.choose(&mut rng).map(String::as_str);
        (clients, user_agent)
    }
}

fn client_builder(max_connections: usize, connect_timeout: Duration) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .pool_max_idle_per_host(max_connections.max(1))
}

fn describe_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}

fn truncate_for_log(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    let mut out = input.chars().take(max_chars).collect::<String>();
    out.push('…');
    out
}
