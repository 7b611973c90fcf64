use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};

use streambox::config::{build_http_client, load_config};
use streambox::discover::{self, DEFAULT_SEARCH_URL};
use streambox::{ProbeConfig, probe_all_with, report};

/// Timeout for fetching search result pages.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "streambox", version)]
#[command(about = "Finds live IPTV stream sources and ranks them by real download speed")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Timeout per network operation in seconds (overrides the config file)
    #[arg(short, long, global = true, value_name = "SECONDS")]
    timeout: Option<f64>,

    /// Maximum number of concurrent probes (overrides the config file)
    #[arg(short, long, global = true)]
    concurrency: Option<usize>,

    /// Number of ranked streams to print
    #[arg(long, global = true, default_value_t = 10)]
    top: usize,

    /// Print the valid results as JSON instead of a table
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Search an IPTV site for a channel and probe every link found
    Search {
        keyword: String,

        /// Number of result pages to walk
        #[arg(short, long, default_value_t = 5)]
        pages: u32,

        #[arg(long, default_value = DEFAULT_SEARCH_URL)]
        base_url: String,
    },
    /// Probe the given URLs
    Probe {
        urls: Vec<String>,

        /// Read more URLs from a file, one per line, `#` starts a comment
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

fn read_url_file(path: &Path) -> Result<Vec<String>, Box<dyn Error>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read URL file {}: {e}", path.display()))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

fn apply_overrides(config: &mut ProbeConfig, cli: &Cli) {
    if let Some(timeout) = cli.timeout {
        config.timeout_seconds = timeout;
    }
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = load_config()?;
    apply_overrides(&mut config, &cli);
    config.validate()?;

    let urls = match &cli.command {
        Command::Search {
            keyword,
            pages,
            base_url,
        } => {
            log::info!("Searching {base_url} for {keyword:?}, {pages} pages");
            let client = build_http_client(SEARCH_TIMEOUT, &config.user_agent)?;
            discover::search(&client, base_url, keyword, *pages).await
        }
        Command::Probe { urls, file } => {
            let mut urls = urls.clone();
            if let Some(path) = file {
                urls.extend(read_url_file(path)?);
            }
            urls
        }
    };

    if urls.is_empty() {
        println!("No stream links found.");
        return Ok(());
    }

    let results = probe_all_with(&urls, &config).await;

    if cli.json {
        println!("{}", report::to_json(&results)?);
    } else {
        print!("{}", report::render(&results, cli.top));
    }
    Ok(())
}
