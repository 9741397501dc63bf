//! Build feed items from dated notices.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::FeedConfig;
use crate::types::{DatedNotice, FeedItem};

/// What goes into an item's `<description>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionFormat {
    /// Inner markup of the description cell.
    #[default]
    Html,
    /// Rendered text of the description cell.
    Text,
}

/// Map notices to feed items, keeping document order.
///
/// Notices without a resolvable title are dropped. A link shared by several
/// notices gets a `#YYYYMMDD` guid suffix per notice, plus a counter when the
/// dates collide too.
pub fn assemble(notices: &[DatedNotice], config: &FeedConfig) -> Vec<FeedItem> {
    let drafts: Vec<(&DatedNotice, String, String)> = notices
        .iter()
        .filter_map(|notice| {
            let Some(title) = notice.row.title(&config.fallback_title_prefix) else {
                debug!("dropping notice without title: {:?}", notice.row.raw_date_text);
                return None;
            };
            let link = notice
                .row
                .canonical_link(&config.preferred_extensions, &config.fallback_link);
            Some((notice, title, link))
        })
        .collect();

    let mut link_counts: HashMap<&str, usize> = HashMap::new();
    for (_, _, link) in &drafts {
        *link_counts.entry(link.as_str()).or_default() += 1;
    }

    let mut used: HashSet<String> = HashSet::new();
    let mut items = Vec::with_capacity(drafts.len());
    for (notice, title, link) in &drafts {
        let base_guid = if link_counts.get(link.as_str()).copied().unwrap_or(0) > 1 {
            format!("{link}#{}", notice.published_at.format("%Y%m%d"))
        } else {
            link.clone()
        };
        let guid = unique_guid(base_guid, &used);
        used.insert(guid.clone());

        items.push(FeedItem {
            title: title.clone(),
            link: link.clone(),
            description: description(notice, config.description),
            published_at: notice.published_at,
            guid_is_permalink: guid == *link,
            guid,
        });
    }
    items
}

fn unique_guid(base: String, used: &HashSet<String>) -> String {
    if !used.contains(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if !used.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn description(notice: &DatedNotice, format: DescriptionFormat) -> String {
    match format {
        DescriptionFormat::Html if !notice.row.raw_body_html.is_empty() => {
            notice.row.raw_body_html.clone()
        }
        _ => notice.row.raw_body_text.clone(),
    }
}
