//! shinryo-feed command-line entry point.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use shinryo_feed::{pipeline, read_feed, DateFallback, FeedError, Variant};

use shinryo_feed_cli::config::{load_config, resolve_config_path};
use shinryo_feed_cli::run::{run, RunOptions, DEFAULT_TIMEOUT_MS};
use shinryo_feed_cli::PageSource;

#[derive(Parser)]
#[command(
    name = "shinryo-feed",
    about = "RSS 2.0 feed of the MHLW medical fee schedule revision notices",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the page, extract notices and write the feed (default).
    Run {
        /// Page to scrape (info-menu, portal).
        #[arg(long)]
        variant: Option<Variant>,

        /// Path to a JSON config file.
        /// Also reads from SHINRYO_FEED_CONFIG.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Where to write the feed.
        /// Also reads from SHINRYO_FEED_OUTPUT.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Page source (auto, browser, http, file).
        #[arg(long, default_value = "auto")]
        source: PageSource,

        /// Saved HTML to use instead of the live page.
        #[arg(long)]
        html_file: Option<PathBuf>,

        /// Page load timeout in milliseconds.
        #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
        timeout_ms: u64,

        /// What to do with unreadable dates (skip, now).
        #[arg(long)]
        date_fallback: Option<DateFallback>,
    },

    /// Extract notices from saved HTML and print them as JSON.
    Extract {
        /// Saved page HTML.
        #[arg(long)]
        html_file: PathBuf,

        /// Page the HTML came from (info-menu, portal).
        #[arg(long)]
        variant: Option<Variant>,

        /// Path to a JSON config file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Check that a feed file parses as RSS 2.0.
    Validate {
        /// Feed file to check.
        path: PathBuf,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   shinryo-feed completions bash > ~/.local/share/bash-completion/completions/shinryo-feed
    ///   shinryo-feed completions zsh > ~/.zfunc/_shinryo-feed
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dispatch(cli.command).await {
        if let Some(FeedError::PageLoadTimeout { url, timeout_ms }) = e.downcast_ref::<FeedError>() {
            tracing::error!("gave up on {url} after {timeout_ms}ms, feed left unchanged");
        }
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }
}

async fn dispatch(command: Option<Commands>) -> anyhow::Result<()> {
    match command.unwrap_or(Commands::Run {
        variant: None,
        config: None,
        output: None,
        source: PageSource::Auto,
        html_file: None,
        timeout_ms: DEFAULT_TIMEOUT_MS,
        date_fallback: None,
    }) {
        Commands::Run {
            variant,
            config,
            output,
            source,
            html_file,
            timeout_ms,
            date_fallback,
        } => {
            let report = run(&RunOptions {
                variant,
                config,
                output,
                source,
                html_file,
                timeout_ms,
                date_fallback,
            })
            .await?;

            let extraction = &report.extraction;
            println!("Wrote {}", report.output.display());
            println!("  Source: {}", report.origin);
            println!(
                "  Strategy: {}",
                extraction.strategy.as_deref().unwrap_or("none")
            );
            println!("  Items: {}", extraction.items.len());
            println!("  Skipped rows: {}", extraction.skipped());
            if extraction.items.is_empty() {
                println!("  Warning: no notices found, feed is empty");
            }
        }

        Commands::Extract {
            html_file,
            variant,
            config,
        } => {
            let config = load_config(resolve_config_path(config.as_deref()).as_deref(), variant)?;
            let html = std::fs::read_to_string(&html_file)
                .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", html_file.display()))?;
            let now = chrono::Utc::now().with_timezone(&config.zone.offset());
            let extraction = pipeline::extract(&html, &config, now)?;
            println!("{}", serde_json::to_string_pretty(&extraction)?);
        }

        Commands::Validate { path } => {
            let xml = std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
            match read_feed(&xml) {
                Ok(feed) => {
                    println!("Valid feed: {}", path.display());
                    println!("  Title: {}", feed.title);
                    println!("  Link: {}", feed.link);
                    println!("  Items: {}", feed.items.len());
                }
                Err(e) => anyhow::bail!("invalid feed {}: {e}", path.display()),
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "shinryo-feed", &mut std::io::stdout());
        }
    }

    Ok(())
}
