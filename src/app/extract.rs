use scraper::{Html, Selector};
use url::{Position, Url};

use super::fetch::PageFetcher;
use super::types::{SeoRecord, text_or_sentinel};

/// Everything derivable from the page itself, before any probe runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSignals {
    pub title: String,
    pub description: String,
    pub h1: String,
    pub canonical: bool,
    pub open_graph: bool,
    pub readable_url: bool,
    pub https: bool,
}

impl PageSignals {
    pub fn into_record(self, url: String, robots_txt: bool, sitemap_xml: bool) -> SeoRecord {
        SeoRecord {
            url,
            title: self.title,
            description: self.description,
            h1: self.h1,
            robots_txt,
            sitemap_xml,
            canonical: self.canonical,
            open_graph: self.open_graph,
            readable_url: self.readable_url,
            https: self.https,
        }
    }
}

/// Parses `html` once and derives the on-page signals.
///
/// The DOM does not outlive this call, which keeps callers free to await
/// afterwards without holding a non-`Send` parse tree.
pub fn page_signals(url: &str, html: &str) -> PageSignals {
    let doc = Html::parse_document(html);
    let parsed = Url::parse(url).ok();

    PageSignals {
        title: text_or_sentinel(first_text(&doc, "title").as_deref()),
        description: text_or_sentinel(meta_content(&doc, "meta[name=\"description\"]").as_deref()),
        h1: text_or_sentinel(first_text(&doc, "h1").as_deref()),
        canonical: has_element(&doc, "link[rel~=\"canonical\"]"),
        open_graph: has_element(&doc, "meta[property=\"og:title\"]"),
        readable_url: parsed.as_ref().is_some_and(has_readable_slug),
        https: parsed.as_ref().is_some_and(|u| u.scheme() == "https"),
    }
}

/// Full record for a fetched page, including the robots.txt and sitemap.xml
/// probes against the page's origin.
pub async fn extract(fetcher: &PageFetcher, url: &str, html: &str) -> SeoRecord {
    let signals = page_signals(url, html);

    let (robots_txt, sitemap_xml) = match site_root(url) {
        Some(root) => {
            let robots = format!("{root}/robots.txt");
            let sitemap = format!("{root}/sitemap.xml");
            tokio::join!(fetcher.probe(&robots), fetcher.probe(&sitemap))
        }
        None => (false, false),
    };

    signals.into_record(url.to_string(), robots_txt, sitemap_xml)
}

/// `scheme://host[:port]` of a URL, without a trailing slash.
pub fn site_root(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed.host_str()?;
    Some(parsed[..Position::BeforePath].to_string())
}

/// Human-friendly URL heuristic: a hyphen anywhere after the host.
/// Hyphens in host labels do not count.
fn has_readable_slug(url: &Url) -> bool {
    url[Position::BeforePath..].contains('-')
}

fn first_text(doc: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    doc.select(&selector)
        .next()
        .map(|el| el.text().collect::<String>())
}

fn meta_content(doc: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    doc.select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(str::to_string)
}

fn has_element(doc: &Html, selector: &str) -> bool {
    match Selector::parse(selector) {
        Ok(s) => doc.select(&s).next().is_some(),
        Err(_) => false,
    }
}
