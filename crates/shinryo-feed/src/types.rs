//! Core data types flowing through the notice pipeline.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Raw notice extracted from one table row, before date and title resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoticeRow {
    /// Rendered text of the first column.
    pub raw_date_text: String,
    /// Inner markup of the second column.
    pub raw_body_html: String,
    /// Rendered text of the second column, one line per visual line.
    pub raw_body_text: String,
    /// Absolute hyperlink targets found in the second column, in document order.
    pub candidate_links: Vec<String>,
}

/// How a notice's publication timestamp was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
    /// Japanese era date (`令和7年1月15日`).
    Era,
    /// Western calendar date in one of the generic layouts.
    Calendar,
    /// Processing time substituted for an unparseable date.
    Fallback,
}

/// A notice paired with its normalized publication timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedNotice {
    pub row: NoticeRow,
    pub published_at: DateTime<FixedOffset>,
    pub source: DateSource,
}

/// One `<item>` of the output feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub published_at: DateTime<FixedOffset>,
    pub guid: String,
    /// True only when `guid` is exactly `link`.
    pub guid_is_permalink: bool,
}

/// Feed-level metadata, constant for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedChannel {
    pub title: String,
    pub link: String,
    pub description: String,
    pub language: String,
    pub generator: Option<String>,
    pub docs: Option<String>,
}

/// A noteworthy, non-fatal event observed while extracting notices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// No locator strategy matched any qualifying row.
    NoNoticesFound,
    /// A row was dropped; `index` is its 0-based position among located rows.
    RowSkipped { index: usize, reason: String },
    /// A row's date could not be parsed and the processing time was used.
    DateFallback { index: usize, text: String },
}
