//! Run configuration.
//!
//! Everything the pipeline would otherwise read from globals (page URLs,
//! channel metadata, locator strategies, policies) lives in [`FeedConfig`],
//! which is passed explicitly into each stage.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::assemble::DescriptionFormat;
use crate::date::{DateFallback, TimestampZone};
use crate::error::{FeedError, FeedResult};
use crate::locator::{ContainerHint, LocatorStrategy};
use crate::types::FeedChannel;

pub const INFO_MENU_URL: &str = "https://shinryohoshu.mhlw.go.jp/shinryohoshu/infoMenu/";
pub const PORTAL_URL: &str = "https://www.mhlw.go.jp/shinryohoshu/";
pub const INFO_MENU_BASE_URL: &str = "https://shinryohoshu.mhlw.go.jp/shinryohoshu/";

pub const DEFAULT_OUTPUT_PATH: &str = "rss_output/mhlw_shinryohoshu.xml";
pub const DEFAULT_TITLE_PREFIX: &str = "更新情報: ";
pub const RSS_DOCS_URL: &str = "https://www.rssboard.org/rss-specification";

/// The notice table's position in the info-menu layout.
pub const NOTICE_TABLE_PATH: &str = "body > table > tbody > tr > td:nth-child(1) > div:nth-child(5) > p:nth-child(2) > table > tbody > tr";

pub const CHANNEL_TITLE: &str = "MHLW｜診療報酬改定関連 更新情報";
pub const CHANNEL_DESCRIPTION: &str = "厚生労働省保険局『診療報酬改定関連』ページの更新履歴";

/// Which of the two known pages a deployment scrapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    #[default]
    InfoMenu,
    Portal,
}

impl Variant {
    pub fn page_url(self) -> &'static str {
        match self {
            Variant::InfoMenu => INFO_MENU_URL,
            Variant::Portal => PORTAL_URL,
        }
    }

    pub fn base_url(self) -> &'static str {
        match self {
            Variant::InfoMenu => INFO_MENU_BASE_URL,
            Variant::Portal => PORTAL_URL,
        }
    }

    /// Locator strategies, most specific first.
    pub fn strategies(self) -> Vec<LocatorStrategy> {
        match self {
            Variant::InfoMenu => vec![
                LocatorStrategy::Exact(NOTICE_TABLE_PATH.to_string()),
                LocatorStrategy::Container("div.update, div.news, #update, #news".to_string()),
                LocatorStrategy::Heading("更新情報".to_string()),
                LocatorStrategy::Generic,
            ],
            Variant::Portal => vec![
                LocatorStrategy::Heading("更新履歴".to_string()),
                LocatorStrategy::Heading("更新情報".to_string()),
                LocatorStrategy::Container("#contents, main".to_string()),
                LocatorStrategy::Generic,
            ],
        }
    }
}

impl std::str::FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info-menu" => Ok(Variant::InfoMenu),
            "portal" => Ok(Variant::Portal),
            other => Err(format!("unknown variant {other:?} (expected info-menu or portal)")),
        }
    }
}

impl Default for FeedChannel {
    fn default() -> Self {
        Self::shinryohoshu()
    }
}

impl FeedChannel {
    /// The channel block every variant publishes under.
    pub fn shinryohoshu() -> Self {
        Self {
            title: CHANNEL_TITLE.to_string(),
            link: INFO_MENU_URL.to_string(),
            description: CHANNEL_DESCRIPTION.to_string(),
            language: "ja".to_string(),
            generator: Some(format!("shinryo-feed {}", env!("CARGO_PKG_VERSION"))),
            docs: Some(RSS_DOCS_URL.to_string()),
        }
    }
}

/// Immutable settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub variant: Variant,
    /// Page to render.
    pub page_url: String,
    /// Base for resolving relative links.
    pub base_url: String,
    /// Item link when a row carries no hyperlink.
    pub fallback_link: String,
    pub channel: FeedChannel,
    pub strategies: Vec<LocatorStrategy>,
    pub hint: Option<ContainerHint>,
    /// Link extensions preferred as an item's canonical link, in priority order.
    pub preferred_extensions: Vec<String>,
    pub fallback_title_prefix: String,
    pub date_fallback: DateFallback,
    pub zone: TimestampZone,
    pub description: DescriptionFormat,
    pub output_path: PathBuf,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self::for_variant(Variant::default())
    }
}

impl FeedConfig {
    pub fn for_variant(variant: Variant) -> Self {
        Self {
            variant,
            page_url: variant.page_url().to_string(),
            base_url: variant.base_url().to_string(),
            fallback_link: variant.page_url().to_string(),
            channel: FeedChannel::shinryohoshu(),
            strategies: variant.strategies(),
            hint: None,
            preferred_extensions: vec!["pdf".to_string()],
            fallback_title_prefix: DEFAULT_TITLE_PREFIX.to_string(),
            date_fallback: DateFallback::default(),
            zone: TimestampZone::default(),
            description: DescriptionFormat::default(),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
        }
    }

    /// Parsed base URL.
    pub fn base(&self) -> FeedResult<Url> {
        Url::parse(&self.base_url)
            .map_err(|e| FeedError::Config(format!("base_url {:?}: {e}", self.base_url)))
    }

    /// Check the invariants the pipeline relies on.
    pub fn validate(&self) -> FeedResult<()> {
        self.base()?;
        for (name, value) in [
            ("page_url", &self.page_url),
            ("fallback_link", &self.fallback_link),
            ("channel.link", &self.channel.link),
        ] {
            Url::parse(value)
                .map_err(|e| FeedError::Config(format!("{name} must be absolute ({value:?}): {e}")))?;
        }
        if self.strategies.is_empty() {
            return Err(FeedError::Config("at least one locator strategy is required".into()));
        }
        if self.channel.title.trim().is_empty() {
            return Err(FeedError::Config("channel.title is empty".into()));
        }
        Ok(())
    }
}
