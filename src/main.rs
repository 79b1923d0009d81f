use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{error, info};

use datatable_bridge::config;
use datatable_bridge::db;
use datatable_bridge::handler::DataTableHandler;
use datatable_bridge::hooks::Caller;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Answer one DataTables server-side request from a SQLite database and print the JSON response"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Action to run, e.g. `customers_datatable`
    #[arg(long)]
    action: Option<String>,

    /// Request parameters as JSON; read from stdin when omitted
    #[arg(long)]
    request: Option<String>,

    /// Capabilities granted to the caller (repeatable)
    #[arg(long = "capability")]
    capabilities: Vec<String>,

    /// Apply the bundled schema before running
    #[arg(long)]
    migrate: bool,

    /// List registered actions and exit
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.app.database_url.clone());
    let pool = db::init_pool(&database_url).await?;
    if args.migrate {
        db::run_migrations(&pool).await?;
        info!("schema migrated");
    }

    let handler = DataTableHandler::from_config(&cfg, Arc::new(pool));
    if args.list {
        for action in handler.actions() {
            println!("{action}");
        }
        return Ok(());
    }

    let Some(action) = args.action else {
        anyhow::bail!("--action is required unless --list is given");
    };
    let raw = match args.request {
        Some(raw) => raw,
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("failed to read request from stdin")?;
            buf
        }
    };
    let params: serde_json::Value =
        serde_json::from_str(raw.trim()).context("request is not valid JSON")?;

    let caller = Caller::new(0, args.capabilities);
    match handler.handle(&action, &params, &caller).await {
        Ok(page) => {
            if page.is_degraded() {
                for failure in &page.failures {
                    error!(stage = failure.stage.as_str(), message = %failure.message, "query degraded");
                }
            }
            println!("{}", serde_json::to_string_pretty(&page)?);
            Ok(())
        }
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&err.to_json())?);
            std::process::exit(1);
        }
    }
}
