//! shinryo-feed CLI: page loading, config resolution and the refresh run.

pub mod config;
pub mod fetch;
pub mod renderer;
pub mod run;

pub use config::{load_config, resolve_config_path, resolve_output_path};
pub use fetch::{fetch_page, FetchRequest, FetchedPage, PageSource};
pub use renderer::{RenderContext, Renderer};
pub use run::{run, RunOptions, RunReport};
