use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use polars::prelude::*;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bottle_vision::reference::load_documents;
use bottle_vision::view::{self, Selection, Tab};
use bottle_vision::{pipeline, DashboardConfig, DashboardData, SessionContext};

#[derive(Parser)]
#[command(name = "bottle-vision", about = "Shelf-share dashboard pipeline")]
struct Cli {
    /// Dashboard config (TOML). Data paths resolve against its directory.
    #[arg(short, long, default_value = "dashboard.toml")]
    config: PathBuf,

    /// Detections file, overriding the configured one.
    #[arg(short, long)]
    detections: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the render request of a tab as JSON.
    Render {
        #[arg(long, default_value = "main")]
        tab: String,
        #[arg(long)]
        post_code: Option<String>,
        #[arg(long)]
        score_column: Option<String>,
    },
    /// Print the market-share summary as JSON.
    Summary,
    /// Write the pipeline tables as CSV files into a directory.
    Export {
        #[arg(long, default_value = "out")]
        out_dir: PathBuf,
    },
}

/// Log to stderr so JSON output on stdout stays clean.
fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bottle_vision=info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load(cli: &Cli) -> Result<(SessionContext, DashboardData)> {
    let base = cli
        .config
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let config = if cli.config.exists() {
        DashboardConfig::from_file(&cli.config)
            .with_context(|| format!("reading {}", cli.config.display()))?
    } else {
        info!(path = %cli.config.display(), "config not found, using defaults");
        DashboardConfig::default()
    };

    let ctx = SessionContext::load(&config, &base).context("loading reference data")?;
    let detections = cli
        .detections
        .clone()
        .unwrap_or_else(|| config.resolved(&base).data.detections);
    let docs = load_documents(&detections)
        .with_context(|| format!("reading {}", detections.display()))?;
    let data = pipeline::run_documents(&ctx, &docs)?;
    Ok((ctx, data))
}

fn write_csv(dir: &Path, name: &str, df: &DataFrame) -> Result<()> {
    let path = dir.join(name);
    let mut file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    let mut df = df.clone();
    CsvWriter::new(&mut file).finish(&mut df)?;
    info!(path = %path.display(), rows = df.height(), "wrote table");
    Ok(())
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let (ctx, data) = load(&cli)?;

    match &cli.command {
        Command::Render {
            tab,
            post_code,
            score_column,
        } => {
            let selection = Selection {
                tab: tab.parse::<Tab>()?,
                post_code: post_code.clone(),
                score_column: score_column.clone(),
            };
            println!("{}", view::render_json(&ctx, &data, &selection)?);
        }
        Command::Summary => {
            println!("{}", serde_json::to_string_pretty(&data.summary)?);
        }
        Command::Export { out_dir } => {
            std::fs::create_dir_all(out_dir)?;
            write_csv(out_dir, "shelves.csv", &data.shelves)?;
            write_csv(out_dir, "enriched.csv", &data.enriched)?;
            write_csv(out_dir, "correlations.csv", &data.correlations)?;
            write_csv(out_dir, "brand_shares.csv", &data.brand_shares)?;
        }
    }
    Ok(())
}
