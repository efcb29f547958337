use std::collections::{HashSet, VecDeque};

use tokio::task::JoinSet;

use super::config::sanitize_fetch_concurrency;
use super::extract::extract;
use super::fetch::PageFetcher;
use super::types::{FetchOutcome, ResultBatch, SeoRecord};

/// Fetches and analyzes every candidate concurrently and waits for all of
/// them. Failed fetches are dropped; the batch carries no ordering.
pub async fn run_batch(fetcher: &PageFetcher, urls: Vec<String>, concurrency: usize) -> ResultBatch {
    let concurrency = sanitize_fetch_concurrency(concurrency);

    let mut queue = VecDeque::new();
    let mut queued = HashSet::new();
    for url in urls {
        if queued.insert(url.clone()) {
            queue.push_back(url);
        }
    }
    let candidates = queue.len();

    let mut batch = ResultBatch::default();
    let mut set = JoinSet::new();
    loop {
        while set.len() < concurrency {
            let Some(url) = queue.pop_front() else {
                break;
            };
            let fetcher = fetcher.clone();
            set.spawn(async move { process_single_url(&fetcher, url).await });
        }

        let Some(joined) = set.join_next().await else {
            break;
        };
        match joined {
            Ok(Some(record)) => batch.push(record),
            Ok(None) => {}
            Err(err) => tracing::error!(error = %err, "fetch worker failed"),
        }
    }

    tracing::info!(
        candidates,
        analyzed = batch.len(),
        dropped = candidates - batch.len(),
        "batch finished"
    );
    batch
}

async fn process_single_url(fetcher: &PageFetcher, url: String) -> Option<SeoRecord> {
    match fetcher.fetch(&url).await {
        FetchOutcome::Html(html) => Some(extract(fetcher, &url, &html).await),
        FetchOutcome::Failed(_) => None,
    }
}
