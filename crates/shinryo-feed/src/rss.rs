//! RSS 2.0 rendering, atomic file output, and a minimal reader.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::info;

use crate::error::{FeedError, FeedResult};
use crate::types::{FeedChannel, FeedItem};

/// Render the channel and items as an RSS 2.0 document.
///
/// Descriptions are always CDATA-wrapped; `build_date` becomes
/// `<lastBuildDate>` when given.
pub fn render(
    channel: &FeedChannel,
    items: &[FeedItem],
    build_date: Option<DateTime<FixedOffset>>,
) -> FeedResult<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    writer.write_event(Event::Start(rss))?;
    writer.write_event(Event::Start(BytesStart::new("channel")))?;

    write_text_element(&mut writer, "title", &channel.title)?;
    write_text_element(&mut writer, "link", &channel.link)?;
    write_text_element(&mut writer, "description", &channel.description)?;
    write_text_element(&mut writer, "language", &channel.language)?;
    if let Some(generator) = &channel.generator {
        write_text_element(&mut writer, "generator", generator)?;
    }
    if let Some(docs) = &channel.docs {
        write_text_element(&mut writer, "docs", docs)?;
    }
    if let Some(built) = build_date {
        write_text_element(&mut writer, "lastBuildDate", &built.to_rfc2822())?;
    }

    for item in items {
        writer.write_event(Event::Start(BytesStart::new("item")))?;
        write_text_element(&mut writer, "title", &item.title)?;
        write_text_element(&mut writer, "link", &item.link)?;

        writer.write_event(Event::Start(BytesStart::new("description")))?;
        for section in cdata_sections(&strip_control_chars(&item.description)) {
            writer.write_event(Event::CData(BytesCData::new(section)))?;
        }
        // Empty text keeps the closing tag on the CDATA line.
        writer.write_event(Event::Text(BytesText::new("")))?;
        writer.write_event(Event::End(BytesEnd::new("description")))?;

        let mut guid = BytesStart::new("guid");
        guid.push_attribute((
            "isPermaLink",
            if item.guid_is_permalink { "true" } else { "false" },
        ));
        writer.write_event(Event::Start(guid))?;
        writer.write_event(Event::Text(BytesText::new(&strip_control_chars(&item.guid))))?;
        writer.write_event(Event::End(BytesEnd::new("guid")))?;

        write_text_element(&mut writer, "pubDate", &item.published_at.to_rfc2822())?;
        writer.write_event(Event::End(BytesEnd::new("item")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("channel")))?;
    writer.write_event(Event::End(BytesEnd::new("rss")))?;

    let mut out = writer.into_inner();
    out.push(b'\n');
    String::from_utf8(out).map_err(|e| FeedError::Xml(e.to_string()))
}

/// Render and write the feed to `path`.
///
/// Missing parent directories are created. The document goes to a temporary
/// file beside `path` first and is renamed into place, so readers never see
/// a half-written feed.
pub fn write_feed(
    channel: &FeedChannel,
    items: &[FeedItem],
    build_date: Option<DateTime<FixedOffset>>,
    path: &Path,
) -> FeedResult<()> {
    let xml = render(channel, items, build_date)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(xml.as_bytes())?;
    tmp.as_file().sync_all()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }
    tmp.persist(path).map_err(|e| FeedError::Io(e.error))?;

    info!("wrote {} items to {}", items.len(), path.display());
    Ok(())
}

fn write_text_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> FeedResult<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(&strip_control_chars(text))))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Drop characters XML 1.0 forbids: C0 controls other than tab, LF and CR,
/// and the noncharacters U+FFFE and U+FFFF.
fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|&c| matches!(c, '\t' | '\n' | '\r') || c >= ' ')
        .filter(|&c| !matches!(c, '\u{FFFE}' | '\u{FFFF}'))
        .collect()
}

/// Split text so no section contains `]]>`: `a]]>b` becomes `a]]` and `>b`.
fn cdata_sections(text: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find("]]>") {
        sections.push(rest[..pos + 2].to_string());
        rest = &rest[pos + 2..];
    }
    sections.push(rest.to_string());
    sections
}

/// A feed read back from XML.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    pub title: String,
    pub link: String,
    pub description: String,
    pub language: Option<String>,
    pub items: Vec<ParsedItem>,
}

/// One `<item>` read back from XML.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub guid: Option<String>,
    pub guid_is_permalink: Option<bool>,
    pub pub_date: Option<DateTime<FixedOffset>>,
}

/// Parse an RSS 2.0 document.
///
/// Only the fields this tool writes are read; anything else is ignored.
pub fn read_feed(xml: &str) -> FeedResult<ParsedFeed> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut feed = ParsedFeed::default();
    let mut stack: Vec<String> = Vec::new();
    let mut item: Option<ParsedItem> = None;
    let mut text = String::new();
    let mut saw_rss = false;
    let mut saw_channel = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match name.as_str() {
                    "rss" if stack.is_empty() => {
                        let version = e
                            .attributes()
                            .flatten()
                            .find(|a| a.key.as_ref() == b"version")
                            .map(|a| String::from_utf8_lossy(&a.value).to_string());
                        if version.as_deref() != Some("2.0") {
                            return Err(FeedError::Xml(format!(
                                "unsupported RSS version {version:?}"
                            )));
                        }
                        saw_rss = true;
                    }
                    "channel" if stack.len() == 1 && saw_rss => saw_channel = true,
                    "item" if saw_channel => item = Some(ParsedItem::default()),
                    "guid" => {
                        if let Some(current) = item.as_mut() {
                            current.guid_is_permalink = e
                                .attributes()
                                .flatten()
                                .find(|a| a.key.as_ref() == b"isPermaLink")
                                .map(|a| a.value.as_ref() != b"false");
                        }
                    }
                    _ => {}
                }
                stack.push(name);
                text.clear();
            }
            Ok(Event::Text(e)) => text.push_str(&e.unescape()?),
            Ok(Event::CData(e)) => text.push_str(&String::from_utf8_lossy(&e.into_inner())),
            Ok(Event::End(_)) => {
                let Some(name) = stack.pop() else {
                    return Err(FeedError::Xml("unbalanced end tag".into()));
                };
                let value = std::mem::take(&mut text);
                if name == "item" {
                    if let Some(done) = item.take() {
                        feed.items.push(done);
                    }
                    continue;
                }
                let parent = stack.last().map(String::as_str);
                match (parent, item.as_mut()) {
                    (Some("item"), Some(current)) => match name.as_str() {
                        "title" => current.title = value,
                        "link" => current.link = value,
                        "description" => current.description = value,
                        "guid" => current.guid = Some(value),
                        "pubDate" => {
                            current.pub_date = DateTime::parse_from_rfc2822(value.trim()).ok()
                        }
                        _ => {}
                    },
                    (Some("channel"), _) => match name.as_str() {
                        "title" => feed.title = value,
                        "link" => feed.link = value,
                        "description" => feed.description = value,
                        "language" => feed.language = Some(value),
                        _ => {}
                    },
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(FeedError::Xml(format!("XML parse error: {e}"))),
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(FeedError::Xml(format!("unclosed element <{}>", stack.join("><"))));
    }
    if !saw_channel {
        return Err(FeedError::Xml("not an RSS 2.0 document: no <channel>".into()));
    }
    Ok(feed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> FeedChannel {
        FeedChannel {
            title: "MHLW｜診療報酬改定関連 更新情報".into(),
            link: "https://shinryohoshu.mhlw.go.jp/shinryohoshu/infoMenu/".into(),
            description: "更新履歴".into(),
            language: "ja".into(),
            generator: None,
            docs: None,
        }
    }

    fn item(title: &str, link: &str, description: &str, guid: &str) -> FeedItem {
        FeedItem {
            title: title.into(),
            link: link.into(),
            description: description.into(),
            published_at: DateTime::parse_from_rfc3339("2025-01-15T00:00:00+09:00").unwrap(),
            guid: guid.into(),
            guid_is_permalink: guid == link,
        }
    }

    #[test]
    fn test_empty_feed_is_valid() {
        let xml = render(&channel(), &[], None).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<rss version=\"2.0\">"));
        assert!(xml.contains("<language>ja</language>"));
        assert!(!xml.contains("<item>"));

        let parsed = read_feed(&xml).unwrap();
        assert_eq!(parsed.title, channel().title);
        assert_eq!(parsed.link, channel().link);
        assert_eq!(parsed.language.as_deref(), Some("ja"));
        assert!(parsed.items.is_empty());
    }

    #[test]
    fn test_item_fields() {
        let items = [item(
            "疑義解釈 & 通知",
            "https://x.jp/a.pdf",
            "<a href=\"/a.pdf\">PDF</a>",
            "https://x.jp/a.pdf#20250115",
        )];
        let xml = render(&channel(), &items, None).unwrap();
        assert!(xml.contains("<title>疑義解釈 &amp; 通知</title>"));
        assert!(xml.contains("<![CDATA[<a href=\"/a.pdf\">PDF</a>]]>"));
        assert_eq!(read_feed(&xml).unwrap().items[0].description, "<a href=\"/a.pdf\">PDF</a>");
        assert!(xml.contains("<guid isPermaLink=\"false\">https://x.jp/a.pdf#20250115</guid>"));
        assert!(xml.contains("<pubDate>Wed, 15 Jan 2025 00:00:00 +0900</pubDate>"));
    }

    #[test]
    fn test_permalink_guid() {
        let items = [item("t", "https://x.jp/a.pdf", "d", "https://x.jp/a.pdf")];
        let xml = render(&channel(), &items, None).unwrap();
        assert!(xml.contains("<guid isPermaLink=\"true\">https://x.jp/a.pdf</guid>"));
        let parsed = read_feed(&xml).unwrap();
        assert_eq!(parsed.items[0].guid_is_permalink, Some(true));
    }

    #[test]
    fn test_cdata_terminator_in_description() {
        let items = [item("t", "https://x.jp/", "before]]>after", "g")];
        let xml = render(&channel(), &items, None).unwrap();
        let parsed = read_feed(&xml).unwrap();
        assert_eq!(parsed.items[0].description, "before]]>after");
    }

    #[test]
    fn test_control_characters_stripped() {
        let items = [item("a\u{0}b\u{8}c", "https://x.jp/", "d", "g")];
        let xml = render(&channel(), &items, None).unwrap();
        assert_eq!(read_feed(&xml).unwrap().items[0].title, "abc");
    }

    #[test]
    fn test_xml_noncharacters_stripped() {
        let items = [item("a\u{FFFE}b", "https://x.jp/", "c\u{FFFF}d", "g")];
        let xml = render(&channel(), &items, None).unwrap();
        assert!(!xml.contains('\u{FFFE}'));
        assert!(!xml.contains('\u{FFFF}'));
        let parsed = read_feed(&xml).unwrap();
        assert_eq!(parsed.items[0].title, "ab");
        assert_eq!(parsed.items[0].description, "cd");
    }

    #[test]
    fn test_round_trip_order() {
        let items = [
            item("新しい", "https://x.jp/2.pdf", "<p>2</p>", "https://x.jp/2.pdf"),
            item("古い", "https://x.jp/1.pdf", "<p>1</p>", "https://x.jp/1.pdf"),
        ];
        let build = DateTime::parse_from_rfc3339("2026-10-16T06:00:00+09:00").unwrap();
        let xml = render(&channel(), &items, Some(build)).unwrap();
        assert!(xml.contains("<lastBuildDate>Fri, 16 Oct 2026 06:00:00 +0900</lastBuildDate>"));

        let parsed = read_feed(&xml).unwrap();
        let pairs: Vec<_> = parsed
            .items
            .iter()
            .map(|i| (i.title.as_str(), i.link.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("新しい", "https://x.jp/2.pdf"), ("古い", "https://x.jp/1.pdf")]
        );
        assert_eq!(parsed.items[0].pub_date, Some(items[0].published_at));
    }

    #[test]
    fn test_write_feed_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rss_output").join("feed.xml");
        write_feed(&channel(), &[], None, &path).unwrap();
        let xml = std::fs::read_to_string(&path).unwrap();
        assert!(read_feed(&xml).is_ok());
        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_write_feed_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.xml");
        std::fs::write(&path, "stale").unwrap();
        write_feed(&channel(), &[item("t", "https://x.jp/", "d", "g")], None, &path).unwrap();
        let parsed = read_feed(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.items.len(), 1);
    }

    #[test]
    fn test_read_feed_rejects_garbage() {
        for input in ["", "not xml", "<rss version=\"0.91\"><channel/></rss>", "<rss version=\"2.0\"><channel>"] {
            assert!(read_feed(input).is_err(), "{input:?}");
        }
    }
}
