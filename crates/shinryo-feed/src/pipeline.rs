//! Rendered page in, feed items out.

use std::path::Path;

use chrono::{DateTime, FixedOffset};
use scraper::Html;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::assemble::assemble;
use crate::config::FeedConfig;
use crate::date::normalize_date;
use crate::error::{FeedResult, RowProcessingError};
use crate::locator::locate;
use crate::row::normalize;
use crate::rss::write_feed;
use crate::types::{DateSource, DatedNotice, Diagnostic, FeedItem};

/// Result of one extraction pass over a page.
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    /// Label of the locator strategy that matched, if any.
    pub strategy: Option<String>,
    /// Qualifying rows the locator returned.
    pub located: usize,
    pub items: Vec<FeedItem>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Extraction {
    /// Rows located but not turned into items.
    pub fn skipped(&self) -> usize {
        self.located.saturating_sub(self.items.len())
    }

    /// One-line report for the operator log.
    pub fn summary(&self) -> String {
        let fallbacks = self
            .diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::DateFallback { .. }))
            .count();
        format!(
            "strategy={} rows={} items={} skipped={} date_fallbacks={}",
            self.strategy.as_deref().unwrap_or("none"),
            self.located,
            self.items.len(),
            self.skipped(),
            fallbacks,
        )
    }
}

/// Locate, normalize, date and assemble the notices in `html`.
///
/// `now` is the processing time used by the `now` date fallback. Row-level
/// failures become diagnostics; only an invalid `config` is an error.
pub fn extract(
    html: &str,
    config: &FeedConfig,
    now: DateTime<FixedOffset>,
) -> FeedResult<Extraction> {
    config.validate()?;
    let base = config.base()?;
    let document = Html::parse_document(html);

    let located = locate(&document, &config.strategies, config.hint.as_ref());
    let mut diagnostics = Vec::new();
    if located.is_empty() {
        warn!("no notice rows found on {}", config.page_url);
        diagnostics.push(Diagnostic::NoNoticesFound);
    }

    let mut notices = Vec::with_capacity(located.rows.len());
    for (index, row) in located.rows.iter().enumerate() {
        match dated_notice(*row, &base, config, now) {
            Ok(notice) => {
                if let Some(notice) = admit(index, notice, config, &mut diagnostics) {
                    notices.push(notice);
                }
            }
            Err(e) => {
                warn!("row {index} skipped: {e}");
                diagnostics.push(Diagnostic::RowSkipped {
                    index,
                    reason: e.to_string(),
                });
            }
        }
    }

    let items = assemble(&notices, config);
    let extraction = Extraction {
        strategy: located.strategy,
        located: located.rows.len(),
        items,
        diagnostics,
    };
    info!("extraction: {}", extraction.summary());
    Ok(extraction)
}

/// Keep a dated row only if it has a title; a dropped row is reported once,
/// as skipped, even when its date came from the fallback.
fn admit(
    index: usize,
    notice: DatedNotice,
    config: &FeedConfig,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<DatedNotice> {
    if notice.row.title(&config.fallback_title_prefix).is_none() {
        warn!("row {index} skipped: no title");
        diagnostics.push(Diagnostic::RowSkipped {
            index,
            reason: "no title".to_string(),
        });
        return None;
    }
    if notice.source == DateSource::Fallback {
        warn!(
            "row {index}: unparseable date {:?}, using processing time",
            notice.row.raw_date_text
        );
        diagnostics.push(Diagnostic::DateFallback {
            index,
            text: notice.row.raw_date_text.clone(),
        });
    }
    debug!(
        "row {index}: {} ({:?})",
        notice.published_at.format("%Y-%m-%d"),
        notice.source
    );
    Some(notice)
}

fn dated_notice(
    row: scraper::ElementRef<'_>,
    base: &url::Url,
    config: &FeedConfig,
    now: DateTime<FixedOffset>,
) -> Result<DatedNotice, RowProcessingError> {
    let row = normalize(row, base)?;
    let (published_at, source) =
        normalize_date(&row.raw_date_text, config.date_fallback, config.zone, now)?;
    Ok(DatedNotice {
        row,
        published_at,
        source,
    })
}

/// Extract from `html` and write the feed to `path`, stamped with `now`.
pub fn run(
    html: &str,
    config: &FeedConfig,
    now: DateTime<FixedOffset>,
    path: &Path,
) -> FeedResult<Extraction> {
    let extraction = extract(html, config, now)?;
    let build_date = now.with_timezone(&config.zone.offset());
    write_feed(&config.channel, &extraction.items, Some(build_date), path)?;
    Ok(extraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::DateFallback;
    use crate::error::FeedError;

    fn now() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2026-10-16T06:00:00+09:00").unwrap()
    }

    const PAGE: &str = r#"<html><body>
        <h2>更新情報</h2>
        <table>
          <tr><th>日付</th><th>内容</th></tr>
          <tr><td>令和7年1月15日</td><td><a href="/shinryohoshu/file/a.pdf">疑義解釈（その1）</a></td></tr>
          <tr><td>不明</td><td>日付なし</td></tr>
          <tr><td>令和6年12月2日</td><td>告示の一部改正</td></tr>
          <tr><td>注記のみ</td></tr>
        </table>
    </body></html>"#;

    #[test]
    fn test_skip_policy_drops_unparseable_date() {
        let extraction = extract(PAGE, &FeedConfig::default(), now()).unwrap();
        assert_eq!(extraction.strategy.as_deref(), Some("heading(更新情報)"));
        assert_eq!(extraction.located, 3);
        assert_eq!(extraction.items.len(), 2);
        assert_eq!(extraction.skipped(), 1);
        assert!(matches!(
            extraction.diagnostics.as_slice(),
            [Diagnostic::RowSkipped { index: 1, .. }]
        ));
        assert_eq!(
            extraction.items[0].link,
            "https://shinryohoshu.mhlw.go.jp/shinryohoshu/file/a.pdf"
        );
    }

    #[test]
    fn test_now_policy_keeps_row() {
        let config = FeedConfig {
            date_fallback: DateFallback::Now,
            ..FeedConfig::default()
        };
        let extraction = extract(PAGE, &config, now()).unwrap();
        assert_eq!(extraction.items.len(), 3);
        assert_eq!(extraction.items[1].published_at, now());
        assert_eq!(
            extraction.diagnostics,
            vec![Diagnostic::DateFallback {
                index: 1,
                text: "不明".to_string()
            }]
        );
        assert!(extraction.summary().contains("date_fallbacks=1"));
    }

    #[test]
    fn test_now_policy_keeps_impossible_date() {
        let page = r#"<html><body><table>
            <tr><td>令和7年13月1日</td><td>告示の一部改正</td></tr>
            <tr><td>不明</td><td>お知らせ</td></tr>
        </table></body></html>"#;
        let config = FeedConfig {
            date_fallback: DateFallback::Now,
            ..FeedConfig::default()
        };
        let extraction = extract(page, &config, now()).unwrap();
        assert_eq!(extraction.items.len(), 2);
        assert_eq!(extraction.skipped(), 0);
        assert_eq!(extraction.items[0].published_at, now());
        assert!(matches!(
            extraction.diagnostics.as_slice(),
            [
                Diagnostic::DateFallback { index: 0, .. },
                Diagnostic::DateFallback { index: 1, .. }
            ]
        ));
    }

    #[test]
    fn test_untitled_row_is_only_reported_as_skipped() {
        let notice = DatedNotice {
            row: crate::types::NoticeRow {
                raw_date_text: String::new(),
                raw_body_html: "<img src=\"x.gif\">".to_string(),
                raw_body_text: String::new(),
                candidate_links: Vec::new(),
            },
            published_at: now(),
            source: DateSource::Fallback,
        };
        let mut diagnostics = Vec::new();
        assert!(admit(3, notice, &FeedConfig::default(), &mut diagnostics).is_none());
        assert_eq!(
            diagnostics,
            vec![Diagnostic::RowSkipped {
                index: 3,
                reason: "no title".to_string()
            }]
        );
    }

    #[test]
    fn test_empty_page_reports_no_notices() {
        let extraction = extract("<html><body><p>メンテナンス中</p></body></html>", &FeedConfig::default(), now())
            .unwrap();
        assert!(extraction.items.is_empty());
        assert_eq!(extraction.strategy, None);
        assert_eq!(extraction.diagnostics, vec![Diagnostic::NoNoticesFound]);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let config = FeedConfig {
            base_url: "not a url".into(),
            ..FeedConfig::default()
        };
        assert!(matches!(extract(PAGE, &config, now()), Err(FeedError::Config(_))));
    }
}
