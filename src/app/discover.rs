use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rand::seq::SliceRandom;
use reqwest::header::USER_AGENT;
use scraper::{Html, Selector};
use url::Url;

use super::config::Settings;
use super::error::{AppError, Result};

/// Result selectors for the search page. They track the engine's markup and
/// are maintained by hand.
const RESULT_LINK_SELECTOR: &str = "a.Link, a.OrganicTitle-Link";

/// Turns a query into candidate URLs. Implementations never fail: a broken
/// source yields whatever was collected so far.
#[async_trait]
pub trait Discoverer: Send + Sync {
    async fn discover(&self, query: &str, max_results: usize) -> Vec<String>;
}

/// Insert-ordered, deduplicated URL collection with the block-list applied.
#[derive(Debug)]
struct CandidateSet<'a> {
    blocked: &'a [String],
    seen: HashSet<String>,
    urls: Vec<String>,
}

impl<'a> CandidateSet<'a> {
    fn new(blocked: &'a [String]) -> Self {
        Self {
            blocked,
            seen: HashSet::new(),
            urls: Vec::new(),
        }
    }

    fn offer(&mut self, href: &str) -> bool {
        let href = href.trim();
        if !is_candidate(href, self.blocked) || !self.seen.insert(href.to_string()) {
            return false;
        }
        self.urls.push(href.to_string());
        true
    }

    fn len(&self) -> usize {
        self.urls.len()
    }

    fn into_urls(self) -> Vec<String> {
        self.urls
    }
}

/// Absolute http(s) URL whose host contains none of the blocked fragments.
///
/// Only the host is matched, not the whole href: a result on an unrelated site
/// whose path or query mentions a blocked name is still a candidate.
pub fn is_candidate(href: &str, blocked: &[String]) -> bool {
    if !(href.starts_with("http://") || href.starts_with("https://")) {
        return false;
    }
    let Some(host) = Url::parse(href)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
    else {
        return false;
    };
    !blocked
        .iter()
        .any(|fragment| !fragment.is_empty() && host.contains(&fragment.to_ascii_lowercase()))
}

/// Scrapes search result pages one at a time, pausing a random interval
/// between pages.
#[derive(Debug, Clone)]
pub struct YandexDiscoverer {
    client: reqwest::Client,
    search_url: String,
    user_agents: Arc<[String]>,
    exclude_domains: Vec<String>,
    page_delay_ms: (u64, u64),
    max_pages: usize,
}

impl YandexDiscoverer {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.search_timeout)
            .no_proxy()
            .build()
            .map_err(AppError::HttpClient)?;
        Ok(Self {
            client,
            search_url: settings.search_url.clone(),
            user_agents: Arc::from(settings.user_agents.clone()),
            exclude_domains: settings.exclude_domains.clone(),
            page_delay_ms: settings.page_delay_ms,
            max_pages: settings.max_pages,
        })
    }

    fn page_url(&self, query: &str, page: usize) -> Option<Url> {
        let mut url = Url::parse(&self.search_url).ok()?;
        url.query_pairs_mut()
            .append_pair("text", query)
            .append_pair("p", &page.to_string());
        Some(url)
    }

    fn pick_user_agent(&self) -> Option<&str> {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }

    fn page_delay(&self) -> Duration {
        let (low, high) = self.page_delay_ms;
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }

    async fn fetch_page(&self, url: Url) -> std::result::Result<String, String> {
        let mut request = self.client.get(url);
        if let Some(ua) = self.pick_user_agent() {
            request = request.header(USER_AGENT, ua);
        }
        let response = request.send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("http {}", response.status().as_u16()));
        }
        response.text().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl Discoverer for YandexDiscoverer {
    async fn discover(&self, query: &str, max_results: usize) -> Vec<String> {
        let mut candidates = CandidateSet::new(&self.exclude_domains);

        for page in 0..self.max_pages {
            if candidates.len() >= max_results {
                break;
            }
            let Some(url) = self.page_url(query, page) else {
                tracing::warn!(search_url = %self.search_url, "invalid search url");
                break;
            };

            let body = match self.fetch_page(url).await {
                Ok(body) => body,
                Err(err) => {
                    tracing::warn!(page, error = %err, "search page failed, stopping discovery");
                    break;
                }
            };

            let links = result_links(&body);
            if links.is_empty() {
                tracing::debug!(page, "no result links, end of results");
                break;
            }
            for href in links {
                if candidates.len() >= max_results {
                    break;
                }
                candidates.offer(&href);
            }
            tracing::debug!(page, collected = candidates.len(), "search page parsed");

            if candidates.len() < max_results && page + 1 < self.max_pages {
                tokio::time::sleep(self.page_delay()).await;
            }
        }

        let urls = candidates.into_urls();
        tracing::info!(query = %query, found = urls.len(), "discovery finished");
        urls
    }
}

fn result_links(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let Ok(selector) = Selector::parse(RESULT_LINK_SELECTOR) else {
        return Vec::new();
    };
    doc.select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .map(str::to_string)
        .collect()
}

/// A fixed seed list, put through the same filter and cap as live results.
#[derive(Debug, Clone)]
pub struct StaticDiscoverer {
    seeds: Vec<String>,
    exclude_domains: Vec<String>,
}

impl StaticDiscoverer {
    pub fn new(seeds: Vec<String>, exclude_domains: Vec<String>) -> Self {
        Self {
            seeds,
            exclude_domains,
        }
    }

    /// One URL per line; blank lines and `#` comments are skipped.
    pub fn from_lines(text: &str, exclude_domains: Vec<String>) -> Self {
        let seeds = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        Self::new(seeds, exclude_domains)
    }
}

#[async_trait]
impl Discoverer for StaticDiscoverer {
    async fn discover(&self, _query: &str, max_results: usize) -> Vec<String> {
        let mut candidates = CandidateSet::new(&self.exclude_domains);
        for seed in &self.seeds {
            if candidates.len() >= max_results {
                break;
            }
            candidates.offer(seed);
        }
        candidates.into_urls()
    }
}
