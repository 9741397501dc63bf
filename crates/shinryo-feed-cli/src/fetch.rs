//! Where the page HTML comes from.
//!
//! A headless browser by default; plain HTTP when no browser is installed;
//! a saved file for offline runs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shinryo_feed::FeedError;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::renderer::chromium::{find_chromium, ChromiumRenderer};
use crate::renderer::{render_page, Renderer};

/// Page source selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSource {
    /// Browser when one is installed, otherwise HTTP.
    #[default]
    Auto,
    Browser,
    Http,
    File,
}

impl std::str::FromStr for PageSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(PageSource::Auto),
            "browser" => Ok(PageSource::Browser),
            "http" => Ok(PageSource::Http),
            "file" => Ok(PageSource::File),
            other => Err(format!(
                "unknown source {other:?} (expected auto, browser, http or file)"
            )),
        }
    }
}

/// HTML plus where it came from.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub html: String,
    /// URL after redirects, or the file path for offline runs.
    pub origin: String,
    /// Which source actually produced the page.
    pub via: PageSource,
    pub elapsed_ms: u64,
}

/// What to fetch and how.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub source: PageSource,
    pub html_file: Option<PathBuf>,
    pub timeout_ms: u64,
}

/// Load the page according to `request.source`.
///
/// A load that exceeds the timeout fails with `FeedError::PageLoadTimeout`.
pub async fn fetch_page(request: &FetchRequest) -> Result<FetchedPage> {
    match request.source {
        PageSource::File => read_file(request),
        PageSource::Http => fetch_http(request).await,
        PageSource::Browser => fetch_browser(request).await,
        PageSource::Auto => {
            if find_chromium().is_some() {
                fetch_browser(request).await
            } else {
                warn!("Chromium not found, falling back to plain HTTP");
                fetch_http(request).await
            }
        }
    }
}

fn read_file(request: &FetchRequest) -> Result<FetchedPage> {
    let path = request
        .html_file
        .as_ref()
        .context("--html-file is required with --source file")?;
    let start = Instant::now();
    let html = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(FetchedPage {
        html,
        origin: path.display().to_string(),
        via: PageSource::File,
        elapsed_ms: start.elapsed().as_millis() as u64,
    })
}

async fn fetch_browser(request: &FetchRequest) -> Result<FetchedPage> {
    let renderer = ChromiumRenderer::new().await?;
    let rendered = render_page(&renderer, &request.url, request.timeout_ms).await;
    if let Err(e) = renderer.shutdown().await {
        warn!("browser shutdown failed: {e:#}");
    }
    let (nav, html) = rendered?;
    info!("rendered {} in {}ms", nav.final_url, nav.load_time_ms);
    Ok(FetchedPage {
        html,
        origin: nav.final_url,
        via: PageSource::Browser,
        elapsed_ms: nav.load_time_ms,
    })
}

async fn fetch_http(request: &FetchRequest) -> Result<FetchedPage> {
    let client = HttpClient::new(request.timeout_ms);
    let start = Instant::now();
    let resp = client.get(&request.url).await?;
    let elapsed_ms = start.elapsed().as_millis() as u64;
    info!("fetched {} (HTTP {}) in {elapsed_ms}ms", resp.final_url, resp.status);
    Ok(FetchedPage {
        html: resp.body,
        origin: resp.final_url,
        via: PageSource::Http,
        elapsed_ms,
    })
}

/// Response from an HTTP GET request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

/// Plain HTTP page loader.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    timeout_ms: u64,
}

impl HttpClient {
    /// Create a new HTTP client with a desktop Chrome user-agent.
    pub fn new(timeout_ms: u64) -> Self {
        let ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                  AppleWebKit/537.36 (KHTML, like Gecko) \
                  Chrome/131.0.0.0 Safari/537.36";

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(ua)
            .build()
            .unwrap_or_default();

        Self { client, timeout_ms }
    }

    /// GET with retry on 5xx and connection errors.
    ///
    /// Non-success statuses that survive the retries are `FeedError::PageLoad`;
    /// an elapsed timeout is `FeedError::PageLoadTimeout`.
    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        let mut retries = 0u32;
        let max_retries = 2;

        loop {
            match self.client.get(url).send().await {
                Ok(r) => {
                    let status = r.status();
                    if status.is_server_error() && retries < max_retries {
                        retries += 1;
                        let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
                        warn!("{url} returned {status}, retrying in {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    if !status.is_success() {
                        return Err(FeedError::PageLoad(format!("{url} returned {status}")).into());
                    }

                    let final_url = r.url().to_string();
                    let body = r.text().await.map_err(|e| self.classify(url, e))?;
                    return Ok(HttpResponse {
                        final_url,
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(e) if e.is_timeout() => return Err(self.classify(url, e)),
                Err(e) => {
                    if retries < max_retries {
                        retries += 1;
                        let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(self.classify(url, e));
                }
            }
        }
    }

    fn classify(&self, url: &str, e: reqwest::Error) -> anyhow::Error {
        if e.is_timeout() {
            FeedError::PageLoadTimeout {
                url: url.to_string(),
                timeout_ms: self.timeout_ms,
            }
            .into()
        } else {
            FeedError::PageLoad(format!("{url}: {e}")).into()
        }
    }
}
