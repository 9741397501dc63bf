//! One feed refresh: resolve config, load the page, extract, write.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use shinryo_feed::{pipeline, DateFallback, Extraction, Variant};
use tracing::info;

use crate::config::{load_config, resolve_config_path, resolve_output_path};
use crate::fetch::{fetch_page, FetchRequest, PageSource};

/// Default page load budget.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Knobs a caller can set for one run; `None` means "use the config".
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub variant: Option<Variant>,
    pub config: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub source: PageSource,
    pub html_file: Option<PathBuf>,
    pub timeout_ms: u64,
    pub date_fallback: Option<DateFallback>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            variant: None,
            config: None,
            output: None,
            source: PageSource::Auto,
            html_file: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            date_fallback: None,
        }
    }
}

/// What a run produced.
#[derive(Debug)]
pub struct RunReport {
    pub output: PathBuf,
    /// Where the HTML came from.
    pub origin: String,
    pub extraction: Extraction,
}

/// Refresh the feed file.
///
/// A page load failure aborts before anything is written, so the previous
/// feed stays in place.
pub async fn run(options: &RunOptions) -> Result<RunReport> {
    let config_path = resolve_config_path(options.config.as_deref());
    let mut config = load_config(config_path.as_deref(), options.variant)?;
    if let Some(policy) = options.date_fallback {
        config.date_fallback = policy;
    }
    let output = resolve_output_path(options.output.as_deref(), &config);

    let source = match (options.source, &options.html_file) {
        (PageSource::Auto, Some(_)) => PageSource::File,
        (source, _) => source,
    };
    let page = fetch_page(&FetchRequest {
        url: config.page_url.clone(),
        source,
        html_file: options.html_file.clone(),
        timeout_ms: options.timeout_ms,
    })
    .await?;
    info!(
        "loaded {} bytes from {} via {:?} in {}ms",
        page.html.len(),
        page.origin,
        page.via,
        page.elapsed_ms
    );

    let now = Utc::now().with_timezone(&config.zone.offset());
    let extraction = pipeline::run(&page.html, &config, now, &output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    Ok(RunReport {
        output,
        origin: page.origin,
        extraction,
    })
}
