//! Browser abstraction for loading the notice page.
//!
//! The listing page builds parts of its markup with scripts, so the default
//! source is a headless Chromium (via chromiumoxide) behind these traits.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Outcome of loading a URL in a browser tab.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// URL after redirects.
    pub final_url: String,
    /// Time until the load event, in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can open tabs.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open a new tab.
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut the engine down.
    async fn shutdown(&self) -> Result<()>;
}

/// One browser tab.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Load `url` and wait for the load event, bounded by `timeout_ms`.
    ///
    /// Expiry is reported as `FeedError::PageLoadTimeout`.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Serialized DOM of the current document.
    async fn get_html(&self) -> Result<String>;
    /// Close the tab.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Load `url` in a fresh tab and return the rendered HTML.
///
/// The tab is closed whether or not loading succeeded. A failure to close
/// is logged; the load outcome is what the caller gets.
pub async fn render_page(
    renderer: &dyn Renderer,
    url: &str,
    timeout_ms: u64,
) -> Result<(NavigationResult, String)> {
    let mut ctx = renderer.new_context().await?;
    let loaded = match ctx.navigate(url, timeout_ms).await {
        Ok(nav) => ctx.get_html().await.map(|html| (nav, html)),
        Err(e) => Err(e),
    };
    if let Err(e) = ctx.close().await {
        warn!("failed to close tab for {url}: {e:#}");
    }
    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use shinryo_feed::FeedError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeRenderer {
        html: Option<String>,
        open: Arc<AtomicUsize>,
        fail_close: bool,
    }

    impl FakeRenderer {
        fn new(html: Option<&str>, fail_close: bool) -> Self {
            Self {
                html: html.map(str::to_string),
                open: Arc::new(AtomicUsize::new(0)),
                fail_close,
            }
        }

        fn open_tabs(&self) -> usize {
            self.open.load(Ordering::SeqCst)
        }
    }

    struct FakeContext {
        html: Option<String>,
        open: Arc<AtomicUsize>,
        fail_close: bool,
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
            self.open.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeContext {
                html: self.html.clone(),
                open: Arc::clone(&self.open),
                fail_close: self.fail_close,
            }))
        }
        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl RenderContext for FakeContext {
        async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
            match &self.html {
                Some(_) => Ok(NavigationResult {
                    final_url: url.to_string(),
                    load_time_ms: 1,
                }),
                None => Err(FeedError::PageLoadTimeout {
                    url: url.to_string(),
                    timeout_ms,
                }
                .into()),
            }
        }
        async fn get_html(&self) -> Result<String> {
            Ok(self.html.clone().unwrap_or_default())
        }
        async fn close(self: Box<Self>) -> Result<()> {
            if self.fail_close {
                anyhow::bail!("target closed");
            }
            self.open.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_render_page_closes_tab() {
        let renderer = FakeRenderer::new(Some("<html></html>"), false);
        let (nav, html) = render_page(&renderer, "https://x.jp/", 1000).await.unwrap();
        assert_eq!(nav.final_url, "https://x.jp/");
        assert_eq!(html, "<html></html>");
        assert_eq!(renderer.open_tabs(), 0);
    }

    #[tokio::test]
    async fn test_render_page_timeout_keeps_error_type() {
        let renderer = FakeRenderer::new(None, false);
        let err = render_page(&renderer, "https://x.jp/", 5).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FeedError>(),
            Some(FeedError::PageLoadTimeout { timeout_ms: 5, .. })
        ));
        assert_eq!(renderer.open_tabs(), 0);
    }

    #[tokio::test]
    async fn test_close_failure_does_not_mask_timeout() {
        let renderer = FakeRenderer::new(None, true);
        let err = render_page(&renderer, "https://x.jp/", 5).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FeedError>(),
            Some(FeedError::PageLoadTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_close_failure_after_load_still_returns_html() {
        let renderer = FakeRenderer::new(Some("<html>ok</html>"), true);
        let (_, html) = render_page(&renderer, "https://x.jp/", 1000).await.unwrap();
        assert_eq!(html, "<html>ok</html>");
    }
}
