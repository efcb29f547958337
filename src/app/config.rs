use std::sync::Arc;
use std::time::Duration;

use super::error::{AppError, Result};
use super::fetch::FetcherConfig;
use super::types::Cli;

pub const DEFAULT_MAX_RESULTS: usize = 50;
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MIN_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 3_000;
pub const DEFAULT_MAX_PAGES: usize = 20;
pub const DEFAULT_FETCH_CONCURRENCY: usize = 100;
pub const DEFAULT_SEARCH_URL: &str = "https://yandex.ru/search/";

const MAX_FETCH_CONCURRENCY: usize = 256;

/// Region that means "no regional qualifier".
pub const COUNTRYWIDE_REGION: &str = "Вся Россия";

pub const REGIONS: [&str; 10] = [
    COUNTRYWIDE_REGION,
    "Москва",
    "Санкт-Петербург",
    "Новосибирск",
    "Екатеринбург",
    "Казань",
    "Нижний Новгород",
    "Краснодар",
    "Челябинск",
    "Самара",
];

/// Marketplaces, maps and portals that crowd out real sites in the results.
pub const EXCLUDE_DOMAINS: [&str; 11] = [
    "2gis",
    "yandex",
    "avito",
    "google",
    "market.yandex",
    "mail.ru",
    "ozon",
    "wildberries",
    "aliexpress",
    "amazon",
    "ebay",
];

pub const DEFAULT_USER_AGENTS: [&str; 6] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:131.0) Gecko/20100101 Firefox/131.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:131.0) Gecko/20100101 Firefox/131.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.0 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36 Edg/129.0.0.0",
];

/// Process-wide settings for one invocation. Nothing here changes after startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub use_proxies: bool,
    pub proxies: Vec<String>,
    pub exclude_domains: Vec<String>,
    pub user_agents: Vec<String>,
    pub fetch_timeout: Duration,
    pub probe_timeout: Duration,
    pub search_timeout: Duration,
    pub page_delay_ms: (u64, u64),
    pub max_pages: usize,
    pub max_results: usize,
    pub fetch_concurrency: usize,
    pub search_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            use_proxies: false,
            proxies: Vec::new(),
            exclude_domains: EXCLUDE_DOMAINS.map(String::from).to_vec(),
            user_agents: DEFAULT_USER_AGENTS.map(String::from).to_vec(),
            fetch_timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            search_timeout: Duration::from_millis(DEFAULT_SEARCH_TIMEOUT_MS),
            page_delay_ms: (DEFAULT_MIN_DELAY_MS, DEFAULT_MAX_DELAY_MS),
            max_pages: DEFAULT_MAX_PAGES,
            max_results: DEFAULT_MAX_RESULTS,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            search_url: DEFAULT_SEARCH_URL.to_string(),
        }
    }
}

impl Settings {
    pub fn from_cli(cli: &Cli) -> Self {
        let mut exclude_domains = EXCLUDE_DOMAINS.map(String::from).to_vec();
        for domain in &cli.exclude_domains {
            let domain = domain.trim().to_ascii_lowercase();
            if !domain.is_empty() && !exclude_domains.contains(&domain) {
                exclude_domains.push(domain);
            }
        }
        let user_agents = if cli.user_agents.is_empty() {
            DEFAULT_USER_AGENTS.map(String::from).to_vec()
        } else {
            cli.user_agents.clone()
        };
        let low = cli.min_delay_ms.min(cli.max_delay_ms);
        let high = cli.min_delay_ms.max(cli.max_delay_ms);

        Self {
            use_proxies: cli.use_proxies,
            proxies: cli.proxies.clone(),
            exclude_domains,
            user_agents,
            fetch_timeout: Duration::from_millis(cli.fetch_timeout_ms),
            probe_timeout: Duration::from_millis(cli.probe_timeout_ms),
            search_timeout: Duration::from_millis(cli.search_timeout_ms),
            page_delay_ms: (low, high),
            max_pages: cli.max_pages.max(1),
            max_results: cli.max_results,
            fetch_concurrency: sanitize_fetch_concurrency(cli.fetch_concurrency),
            search_url: cli.search_url.clone(),
        }
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            user_agents: Arc::from(self.user_agents.clone()),
            proxies: if self.use_proxies {
                self.proxies.clone()
            } else {
                Vec::new()
            },
            fetch_timeout: self.fetch_timeout,
            probe_timeout: self.probe_timeout,
            max_connections: self.fetch_concurrency,
        }
    }
}

pub fn sanitize_fetch_concurrency(value: usize) -> usize {
    value.clamp(1, MAX_FETCH_CONCURRENCY)
}

/// Checks a region against the fixed list; `None` means country-wide.
pub fn validate_region(region: Option<&str>) -> Result<Option<&'static str>> {
    let Some(region) = region.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    REGIONS
        .iter()
        .copied()
        .find(|known| known.to_lowercase() == region.to_lowercase())
        .map(Some)
        .ok_or_else(|| AppError::UnknownRegion(region.to_string()))
}
