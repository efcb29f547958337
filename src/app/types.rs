use clap::{ArgAction, Parser, ValueEnum};
use serde_json::{Map, Value};

use super::config::{
    DEFAULT_FETCH_CONCURRENCY, DEFAULT_FETCH_TIMEOUT_MS, DEFAULT_MAX_DELAY_MS,
    DEFAULT_MAX_PAGES, DEFAULT_MAX_RESULTS, DEFAULT_MIN_DELAY_MS, DEFAULT_PROBE_TIMEOUT_MS,
    DEFAULT_SEARCH_TIMEOUT_MS, DEFAULT_SEARCH_URL,
};

/// Placeholder for any text field that could not be derived from a page.
pub const SENTINEL: &str = "—";

const PRESENT_GLYPH: &str = "✓";
const ABSENT_GLYPH: &str = "✗";

#[derive(Debug, Parser, Clone)]
#[command(
    name = "serpscan",
    version,
    about = "Scan search results and report on-page SEO signals"
)]
pub struct Cli {
    #[arg(value_name = "QUERY")]
    pub query: Option<String>,

    #[arg(short, long, value_name = "REGION")]
    pub region: Option<String>,

    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_RESULTS)]
    pub max_results: usize,

    #[arg(short, long, value_name = "FILE")]
    pub output: Option<String>,

    #[arg(long, value_enum, default_value_t = FileFormatArg::Html)]
    pub format: FileFormatArg,

    /// Read candidate URLs from a file (one per line) instead of searching.
    #[arg(long, value_name = "FILE")]
    pub seeds: Option<String>,

    #[arg(long, default_value_t = false)]
    pub use_proxies: bool,

    #[arg(long = "proxy", value_name = "URL", action = ArgAction::Append)]
    pub proxies: Vec<String>,

    /// Extra host fragments to drop from search results.
    #[arg(long = "exclude-domain", value_name = "DOMAIN", action = ArgAction::Append)]
    pub exclude_domains: Vec<String>,

    #[arg(long = "user-agent", value_name = "UA", action = ArgAction::Append)]
    pub user_agents: Vec<String>,

    #[arg(long, value_name = "MS", default_value_t = DEFAULT_FETCH_TIMEOUT_MS)]
    pub fetch_timeout_ms: u64,

    #[arg(long, value_name = "MS", default_value_t = DEFAULT_PROBE_TIMEOUT_MS)]
    pub probe_timeout_ms: u64,

    #[arg(long, value_name = "MS", default_value_t = DEFAULT_SEARCH_TIMEOUT_MS)]
    pub search_timeout_ms: u64,

    #[arg(long, value_name = "MS", default_value_t = DEFAULT_MIN_DELAY_MS)]
    pub min_delay_ms: u64,

    #[arg(long, value_name = "MS", default_value_t = DEFAULT_MAX_DELAY_MS)]
    pub max_delay_ms: u64,

    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_PAGES)]
    pub max_pages: usize,

    #[arg(long, value_name = "N", default_value_t = DEFAULT_FETCH_CONCURRENCY)]
    pub fetch_concurrency: usize,

    #[arg(long, value_name = "URL", default_value = DEFAULT_SEARCH_URL)]
    pub search_url: String,

    /// Convert a JSON record list into a spreadsheet and exit.
    #[arg(long, value_name = "FILE", conflicts_with_all = ["query", "seeds"])]
    pub export_json: Option<String>,

    #[arg(long, default_value_t = false)]
    pub list_regions: bool,
}

#[derive(Debug, Copy, Clone, ValueEnum, PartialEq, Eq)]
pub enum FileFormatArg {
    Html,
    Csv,
    Json,
    Xlsx,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataFormat {
    Html,
    Csv,
    Json,
    Xlsx,
}

impl From<FileFormatArg> for DataFormat {
    fn from(value: FileFormatArg) -> Self {
        match value {
            FileFormatArg::Html => DataFormat::Html,
            FileFormatArg::Csv => DataFormat::Csv,
            FileFormatArg::Json => DataFormat::Json,
            FileFormatArg::Xlsx => DataFormat::Xlsx,
        }
    }
}

impl DataFormat {
    pub fn extension(self) -> &'static str {
        match self {
            DataFormat::Html => "html",
            DataFormat::Csv => "csv",
            DataFormat::Json => "json",
            DataFormat::Xlsx => "xlsx",
        }
    }
}

/// Result of a single page download. The reason is for logs only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Html(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeoRecord {
    pub url: String,
    pub title: String,
    pub description: String,
    pub h1: String,
    pub robots_txt: bool,
    pub sitemap_xml: bool,
    pub canonical: bool,
    pub open_graph: bool,
    pub readable_url: bool,
    pub https: bool,
}

pub const RECORD_COLUMNS: [&str; 10] = [
    "URL",
    "Title",
    "Description",
    "H1",
    "Robots.txt",
    "Sitemap.xml",
    "Canonical",
    "Open Graph",
    "ЧПУ",
    "SSL",
];

impl SeoRecord {
    /// Cell values in `RECORD_COLUMNS` order, flags rendered as glyphs.
    pub fn cells(&self) -> [String; 10] {
        [
            self.url.clone(),
            self.title.clone(),
            self.description.clone(),
            self.h1.clone(),
            glyph(self.robots_txt).to_string(),
            glyph(self.sitemap_xml).to_string(),
            glyph(self.canonical).to_string(),
            glyph(self.open_graph).to_string(),
            glyph(self.readable_url).to_string(),
            glyph(self.https).to_string(),
        ]
    }

    pub fn to_flat(&self) -> Map<String, Value> {
        RECORD_COLUMNS
            .iter()
            .zip(self.cells())
            .map(|(column, cell)| (column.to_string(), Value::String(cell)))
            .collect()
    }
}

pub fn glyph(present: bool) -> &'static str {
    if present { PRESENT_GLYPH } else { ABSENT_GLYPH }
}

/// Text value or the sentinel when nothing usable was found.
pub fn text_or_sentinel(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => SENTINEL.to_string(),
    }
}

/// Records from one run. Failed URLs are simply absent; order is unspecified.
#[derive(Debug, Default, Clone)]
pub struct ResultBatch {
    records: Vec<SeoRecord>,
}

impl ResultBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[SeoRecord] {
        &self.records
    }

    pub fn push(&mut self, record: SeoRecord) {
        self.records.push(record);
    }

    pub fn to_flat_records(&self) -> Vec<Map<String, Value>> {
        self.records.iter().map(SeoRecord::to_flat).collect()
    }
}

impl FromIterator<SeoRecord> for ResultBatch {
    fn from_iter<I: IntoIterator<Item = SeoRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}
