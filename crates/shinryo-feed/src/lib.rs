//! shinryo-feed: turn the MHLW medical fee schedule notice page into RSS 2.0.

pub mod assemble;
pub mod config;
pub mod date;
pub mod error;
pub mod locator;
pub mod pipeline;
pub mod row;
pub mod rss;
pub mod types;

pub use assemble::{assemble, DescriptionFormat};
pub use config::{FeedConfig, Variant};
pub use date::{normalize_date, parse_date, DateFallback, TimestampZone};
pub use error::{DateParseError, FeedError, FeedResult, RowProcessingError};
pub use locator::{locate, ContainerHint, LocatedRows, LocatorStrategy};
pub use pipeline::{extract, run, Extraction};
pub use row::normalize;
pub use rss::{read_feed, render, write_feed, ParsedFeed, ParsedItem};
pub use types::*;
