//! Locate the notice rows inside the rendered page.
//!
//! The page markup changes every few revisions, so the rows are found by an
//! ordered list of strategies. The first strategy that yields at least one
//! qualifying row wins.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Elements treated as a heading when anchoring on heading text.
const HEADING_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "caption", "th", "dt", "strong", "b",
];

/// One structural query for the notice rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LocatorStrategy {
    /// CSS path to the rows themselves (or to tables holding them).
    Exact(String),
    /// CSS selector for a container; rows are the `tr`s of tables inside it.
    Container(String),
    /// Rows of the table owned by, or following, a heading containing this text.
    Heading(String),
    /// Every `table tr` in the document.
    Generic,
}

impl LocatorStrategy {
    pub fn label(&self) -> String {
        match self {
            LocatorStrategy::Exact(css) => format!("exact({css})"),
            LocatorStrategy::Container(css) => format!("container({css})"),
            LocatorStrategy::Heading(text) => format!("heading({text})"),
            LocatorStrategy::Generic => "generic(table tr)".to_string(),
        }
    }
}

/// Picks one table when a strategy matches several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ContainerHint {
    /// 0-based index among the tables that hold qualifying rows.
    Nth(usize),
    /// The table anchored by a heading containing this text.
    Heading(String),
}

/// Rows found by [`locate`].
#[derive(Debug, Clone)]
pub struct LocatedRows<'a> {
    /// Label of the winning strategy; `None` when nothing matched.
    pub strategy: Option<String>,
    pub rows: Vec<ElementRef<'a>>,
}

impl LocatedRows<'_> {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Run the strategies in order and return the rows of the first that matches.
///
/// Rows with fewer than two cells are dropped before a strategy is judged.
/// An empty result is not an error; the caller reports it.
pub fn locate<'a>(
    document: &'a Html,
    strategies: &[LocatorStrategy],
    hint: Option<&ContainerHint>,
) -> LocatedRows<'a> {
    for strategy in strategies {
        let label = strategy.label();
        let candidates = match candidate_rows(document, strategy) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("locator strategy {label} skipped: {e}");
                continue;
            }
        };

        let qualifying: Vec<ElementRef<'a>> =
            candidates.into_iter().filter(|row| is_notice_row(*row)).collect();
        let rows = disambiguate(document, qualifying, hint);

        if rows.is_empty() {
            debug!("locator strategy {label} matched no notice rows");
            continue;
        }

        info!("locator strategy {label} matched {} rows", rows.len());
        return LocatedRows {
            strategy: Some(label),
            rows,
        };
    }

    LocatedRows {
        strategy: None,
        rows: Vec::new(),
    }
}

/// Direct `td`/`th` children of a row, in order.
pub fn cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| matches!(c.value().name(), "td" | "th"))
        .collect()
}

/// A notice row has at least two cells, at least one of them a `td`.
/// Header rows made only of `th` are layout, not notices.
fn is_notice_row(row: ElementRef<'_>) -> bool {
    let cells = cells(row);
    cells.len() >= 2 && cells.iter().any(|c| c.value().name() == "td")
}

fn parse_selector(css: &str) -> Result<Selector, String> {
    Selector::parse(css).map_err(|e| format!("invalid selector {css:?}: {e:?}"))
}

fn candidate_rows<'a>(
    document: &'a Html,
    strategy: &LocatorStrategy,
) -> Result<Vec<ElementRef<'a>>, String> {
    match strategy {
        LocatorStrategy::Exact(css) => {
            let sel = parse_selector(css)?;
            let mut rows = Vec::new();
            for el in document.select(&sel) {
                if el.value().name() == "tr" {
                    push_unique(&mut rows, el);
                } else {
                    for row in rows_within(el)? {
                        push_unique(&mut rows, row);
                    }
                }
            }
            Ok(rows)
        }
        LocatorStrategy::Container(css) => {
            let sel = parse_selector(css)?;
            let mut rows = Vec::new();
            for container in document.select(&sel) {
                for row in rows_within(container)? {
                    push_unique(&mut rows, row);
                }
            }
            Ok(rows)
        }
        LocatorStrategy::Heading(text) => Ok(heading_table(document, text)
            .map(own_rows)
            .unwrap_or_default()),
        LocatorStrategy::Generic => {
            let sel = parse_selector("table tr")?;
            Ok(document.select(&sel).collect())
        }
    }
}

fn rows_within(el: ElementRef<'_>) -> Result<Vec<ElementRef<'_>>, String> {
    let sel = parse_selector("tr")?;
    Ok(el.select(&sel).collect())
}

fn push_unique<'a>(rows: &mut Vec<ElementRef<'a>>, row: ElementRef<'a>) {
    if !rows.iter().any(|r| r.id() == row.id()) {
        rows.push(row);
    }
}

/// Rows belonging to `table` itself, excluding rows of nested tables.
fn own_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let Ok(sel) = parse_selector("tr") else {
        return Vec::new();
    };
    table
        .select(&sel)
        .filter(|row| owning_table(*row).map(|t| t.id()) == Some(table.id()))
        .collect()
}

/// Nearest `table` ancestor.
fn owning_table(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "table")
}

fn collapsed_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The table a heading containing `text` points at.
///
/// A `caption` or `th` heading points at its own table; any other heading
/// points at the next table after it in document order.
pub fn heading_table<'a>(document: &'a Html, text: &str) -> Option<ElementRef<'a>> {
    let needle = text.trim();
    if needle.is_empty() {
        return None;
    }

    let mut heading: Option<ElementRef<'a>> = None;
    for node in document.root_element().descendants() {
        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };
        match heading {
            None => {
                let name = el.value().name();
                if HEADING_TAGS.contains(&name) && collapsed_text(el).contains(needle) {
                    if matches!(name, "caption" | "th") {
                        if let Some(table) = owning_table(el) {
                            return Some(table);
                        }
                    }
                    heading = Some(el);
                }
            }
            Some(h) => {
                if el.value().name() == "table" && !el.ancestors().any(|a| a.id() == h.id()) {
                    return Some(el);
                }
            }
        }
    }
    None
}

/// Group rows by owning table and apply the hint when there is a choice.
fn disambiguate<'a>(
    document: &'a Html,
    rows: Vec<ElementRef<'a>>,
    hint: Option<&ContainerHint>,
) -> Vec<ElementRef<'a>> {
    let mut groups: Vec<(Option<ElementRef<'a>>, Vec<ElementRef<'a>>)> = Vec::new();
    for row in rows {
        let table = owning_table(row);
        let key = table.map(|t| t.id());
        match groups.iter_mut().find(|(t, _)| t.map(|t| t.id()) == key) {
            Some((_, group)) => group.push(row),
            None => groups.push((table, vec![row])),
        }
    }

    if groups.len() <= 1 {
        return groups.into_iter().flat_map(|(_, g)| g).collect();
    }

    match hint {
        None => groups.into_iter().flat_map(|(_, g)| g).collect(),
        Some(ContainerHint::Nth(n)) => {
            let total = groups.len();
            groups.into_iter().nth(*n).map(|(_, g)| g).unwrap_or_else(|| {
                warn!("container hint nth({n}) out of range, {total} tables matched");
                Vec::new()
            })
        }
        Some(ContainerHint::Heading(text)) => {
            let Some(target) = heading_table(document, text) else {
                warn!("container hint heading({text}) found no table");
                return Vec::new();
            };
            groups
                .into_iter()
                .find(|(t, _)| t.map(|t| t.id()) == Some(target.id()))
                .map(|(_, g)| g)
                .unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_TABLES: &str = r#"
        <html><body>
          <h2>お知らせ</h2>
          <table id="first">
            <tr><td>令和7年1月1日</td><td>first table</td></tr>
          </table>
          <h2>更新情報</h2>
          <table id="second">
            <tr><th>日付</th><th>内容</th></tr>
            <tr><td>令和7年1月15日</td><td>second table</td></tr>
            <tr><td colspan="2">single cell</td></tr>
          </table>
        </body></html>
    "#;

    fn texts(rows: &[ElementRef<'_>]) -> Vec<String> {
        rows.iter()
            .map(|r| {
                cells(*r)
                    .into_iter()
                    .map(collapsed_text)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }

    #[test]
    fn test_first_matching_strategy_wins() {
        let doc = Html::parse_document(TWO_TABLES);
        let strategies = vec![
            LocatorStrategy::Exact("div.missing tr".into()),
            LocatorStrategy::Heading("更新情報".into()),
            LocatorStrategy::Generic,
        ];
        let located = locate(&doc, &strategies, None);
        assert_eq!(located.strategy.as_deref(), Some("heading(更新情報)"));
        assert_eq!(texts(&located.rows), vec!["令和7年1月15日 second table"]);
    }

    #[test]
    fn test_rows_with_fewer_than_two_cells_are_skipped() {
        let doc = Html::parse_document(TWO_TABLES);
        let located = locate(&doc, &[LocatorStrategy::Generic], None);
        assert_eq!(located.rows.len(), 2);
    }

    #[test]
    fn test_nth_hint_picks_table() {
        let doc = Html::parse_document(TWO_TABLES);
        let hint = ContainerHint::Nth(1);
        let located = locate(&doc, &[LocatorStrategy::Generic], Some(&hint));
        assert_eq!(texts(&located.rows), vec!["令和7年1月15日 second table"]);
    }

    #[test]
    fn test_heading_hint_picks_table() {
        let doc = Html::parse_document(TWO_TABLES);
        let hint = ContainerHint::Heading("お知らせ".into());
        let located = locate(&doc, &[LocatorStrategy::Generic], Some(&hint));
        assert_eq!(texts(&located.rows), vec!["令和7年1月1日 first table"]);
    }

    #[test]
    fn test_out_of_range_hint_falls_through() {
        let doc = Html::parse_document(TWO_TABLES);
        let hint = ContainerHint::Nth(5);
        let located = locate(&doc, &[LocatorStrategy::Generic], Some(&hint));
        assert!(located.is_empty());
        assert!(located.strategy.is_none());
    }

    #[test]
    fn test_container_strategy() {
        let html = r#"<div class="news"><table>
            <tr><td>令和6年4月1日</td><td>in container</td></tr>
        </table></div>
        <table><tr><td>x</td><td>outside</td></tr></table>"#;
        let doc = Html::parse_document(html);
        let located = locate(&doc, &[LocatorStrategy::Container("div.news".into())], None);
        assert_eq!(texts(&located.rows), vec!["令和6年4月1日 in container"]);
    }

    #[test]
    fn test_caption_heading_owns_table() {
        let html = r#"<table><caption>更新情報</caption>
            <tr><td>令和6年4月1日</td><td>captioned</td></tr></table>"#;
        let doc = Html::parse_document(html);
        let located = locate(&doc, &[LocatorStrategy::Heading("更新情報".into())], None);
        assert_eq!(located.rows.len(), 1);
    }

    #[test]
    fn test_invalid_selector_is_skipped() {
        let doc = Html::parse_document(TWO_TABLES);
        let strategies = vec![LocatorStrategy::Exact("tr[[".into()), LocatorStrategy::Generic];
        let located = locate(&doc, &strategies, None);
        assert_eq!(located.strategy.as_deref(), Some("generic(table tr)"));
    }

    #[test]
    fn test_no_rows() {
        let doc = Html::parse_document("<html><body><p>メンテナンス中</p></body></html>");
        let located = locate(&doc, &[LocatorStrategy::Generic], None);
        assert!(located.is_empty());
    }

    #[test]
    fn test_strategy_serde_shape() {
        let json = serde_json::to_string(&LocatorStrategy::Heading("更新情報".into())).unwrap();
        assert_eq!(json, r#"{"kind":"heading","value":"更新情報"}"#);
        let generic: LocatorStrategy = serde_json::from_str(r#"{"kind":"generic"}"#).unwrap();
        assert_eq!(generic, LocatorStrategy::Generic);
    }
}
