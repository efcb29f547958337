use std::fs;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use super::config::{COUNTRYWIDE_REGION, REGIONS, Settings, validate_region};
use super::crawl::run_batch;
use super::data_io::{
    default_output_path, detect_data_format, export_records, parse_export_payload,
    render_report,
};
use super::discover::{Discoverer, StaticDiscoverer, YandexDiscoverer};
use super::error::{AppError, Result};
use super::fetch::PageFetcher;
use super::types::{Cli, DataFormat, ResultBatch};

/// A validated query submission. Lives for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    text: String,
    region: Option<&'static str>,
}

impl SearchQuery {
    pub fn new(text: &str, region: Option<&str>) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::EmptyQuery);
        }
        Ok(Self {
            text: text.to_string(),
            region: validate_region(region)?,
        })
    }

    /// The string handed to the search engine.
    pub fn effective(&self) -> String {
        match self.region {
            Some(region) if region != COUNTRYWIDE_REGION => format!("{} {region}", self.text),
            _ => self.text.clone(),
        }
    }
}

/// Validate, discover, then analyze. Discovery completes before any page is
/// fetched; nothing touches the network when validation fails.
pub async fn analyze_query(
    text: &str,
    region: Option<&str>,
    discoverer: &dyn Discoverer,
    fetcher: &PageFetcher,
    settings: &Settings,
) -> Result<(SearchQuery, ResultBatch)> {
    let query = SearchQuery::new(text, region)?;
    let effective = query.effective();

    tracing::info!(query = %effective, max_results = settings.max_results, "discovering candidates");
    let urls = discoverer.discover(&effective, settings.max_results).await;

    tracing::info!(candidates = urls.len(), concurrency = settings.fetch_concurrency, "analyzing pages");
    let batch = run_batch(fetcher, urls, settings.fetch_concurrency).await;
    Ok((query, batch))
}

pub async fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run_cli(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is_validation() => {
            eprintln!("{err}");
            err.exit_code()
        }
        Err(err) => {
            tracing::error!(error = %err, "run failed");
            err.exit_code()
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn run_cli(cli: Cli) -> Result<()> {
    if cli.list_regions {
        for region in REGIONS {
            println!("{region}");
        }
        return Ok(());
    }

    if let Some(input) = cli.export_json.as_deref() {
        return export_json_file(input, cli.output.as_deref());
    }

    let settings = Settings::from_cli(&cli);
    let text = cli.query.clone().unwrap_or_default();
    // Validate before building clients so a bad submission costs nothing.
    SearchQuery::new(&text, cli.region.as_deref())?;

    let fetcher = PageFetcher::new(settings.fetcher_config())?;
    let discoverer: Box<dyn Discoverer> = match cli.seeds.as_deref() {
        Some(path) => {
            let seeds = fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
            Box::new(StaticDiscoverer::from_lines(&seeds, settings.exclude_domains.clone()))
        }
        None => Box::new(YandexDiscoverer::new(&settings)?),
    };

    let (query, batch) = analyze_query(
        &text,
        cli.region.as_deref(),
        discoverer.as_ref(),
        &fetcher,
        &settings,
    )
    .await?;

    let configured: DataFormat = cli.format.into();
    let format = cli
        .output
        .as_deref()
        .map(|path| detect_data_format(path, configured))
        .unwrap_or(configured);
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&query.effective(), format));

    let bytes = render_report(&query.effective(), &batch, format)?;
    fs::write(&output_path, bytes).map_err(|e| AppError::io(&output_path, e))?;

    if batch.is_empty() {
        tracing::info!(output = %output_path, "no results");
    }
    eprintln!(
        "finished scan: analyzed={} query={:?} output={}",
        batch.len(),
        query.effective(),
        output_path
    );
    Ok(())
}

fn export_json_file(input: &str, output: Option<&str>) -> Result<()> {
    let json = fs::read_to_string(input).map_err(|e| AppError::io(input, e))?;
    let records = parse_export_payload(&json).map_err(|source| AppError::Records {
        path: input.to_string(),
        source,
    })?;
    let file = export_records(&records)?;
    let output_path = output.unwrap_or(file.file_name);
    fs::write(output_path, &file.bytes).map_err(|e| AppError::io(output_path, e))?;
    tracing::info!(
        records = records.len(),
        output = %output_path,
        mime = file.mime,
        "spreadsheet written"
    );
    Ok(())
}
