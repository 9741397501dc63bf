//! Turn a located table row into a [`NoticeRow`].

use scraper::{ElementRef, Node, Selector};
use tracing::debug;
use url::Url;

use crate::error::RowProcessingError;
use crate::locator::cells;
use crate::types::NoticeRow;

/// Elements that start a new line in rendered text.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "ul", "ol", "dl", "dt", "dd", "tr", "table", "h1", "h2", "h3", "h4", "h5",
    "h6", "blockquote", "section", "article", "header", "footer", "pre", "hr",
];

/// Read the date column and the description column of one row.
///
/// Links in the description are resolved against `base`.
pub fn normalize(row: ElementRef<'_>, base: &Url) -> Result<NoticeRow, RowProcessingError> {
    let cells = cells(row);
    if cells.len() < 2 {
        return Err(RowProcessingError::MissingColumns { found: cells.len() });
    }

    let raw_date_text = rendered_text(cells[0])
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let body = cells[1];
    let raw_body_text = rendered_text(body);
    if raw_date_text.is_empty() && raw_body_text.is_empty() {
        return Err(RowProcessingError::EmptyRow);
    }

    Ok(NoticeRow {
        raw_date_text,
        raw_body_html: body.inner_html().trim().to_string(),
        raw_body_text,
        candidate_links: extract_links(body, base),
    })
}

/// Text as a browser would lay it out: `<br>` and block elements break
/// lines, whitespace runs collapse, blank lines are dropped.
pub fn rendered_text(el: ElementRef<'_>) -> String {
    let mut raw = String::new();
    push_rendered(el, &mut raw);
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_rendered(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            // Source line breaks are layout whitespace, not rendered breaks.
            Node::Text(text) => {
                out.extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }))
            }
            Node::Element(element) => {
                let name = element.name();
                if matches!(name, "script" | "style" | "template") {
                    continue;
                }
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                let block = BLOCK_TAGS.contains(&name);
                if block {
                    out.push('\n');
                }
                push_rendered(child_el, out);
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Every usable `a[href]` under `el`, resolved, in document order.
pub fn extract_links(el: ElementRef<'_>, base: &Url) -> Vec<String> {
    let sel = Selector::parse("a[href]").expect("anchor selector is valid");
    el.select(&sel)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| {
            let resolved = resolve_link(href, base);
            if resolved.is_none() {
                debug!("ignoring link {href:?}");
            }
            resolved
        })
        .collect()
}

/// Resolve an href against `base`.
///
/// Absolute URLs pass through unchanged. Fragment-only and `javascript:`
/// links yield `None`.
pub fn resolve_link(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    if href
        .get(..11)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("javascript:"))
    {
        return None;
    }
    if Url::parse(href).is_ok() {
        return Some(href.to_string());
    }
    base.join(href).ok().map(String::from)
}

/// Whether the link's path ends in `.{ext}`, ignoring case, query and fragment.
fn has_extension(link: &str, ext: &str) -> bool {
    let path = match Url::parse(link) {
        Ok(url) => url.path().to_string(),
        Err(_) => link
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    let ext = ext.trim_start_matches('.');
    path.rsplit_once('.')
        .is_some_and(|(stem, found)| !stem.is_empty() && found.eq_ignore_ascii_case(ext))
}

impl NoticeRow {
    /// The link the feed item points at.
    ///
    /// First link with a preferred extension, else the first link, else
    /// `fallback`.
    pub fn canonical_link(&self, preferred_extensions: &[String], fallback: &str) -> String {
        preferred_extensions
            .iter()
            .find_map(|ext| {
                self.candidate_links
                    .iter()
                    .find(|link| has_extension(link, ext))
            })
            .or_else(|| self.candidate_links.first())
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    }

    /// First rendered line of the description, else `{prefix}{date}`.
    pub fn title(&self, fallback_prefix: &str) -> Option<String> {
        if let Some(line) = self.raw_body_text.lines().map(str::trim).find(|l| !l.is_empty()) {
            return Some(line.to_string());
        }
        let date = self.raw_date_text.trim();
        if date.is_empty() {
            return None;
        }
        Some(format!("{fallback_prefix}{date}"))
    }
}
