use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;

use headlines::config::{Config, API_KEY_ENV};
use headlines::observe::NewsView;
use headlines::remote::{build_http_client, NewsClient};
use headlines::storage::{Article, Database, DatabaseError};
use headlines::sync::{NewsRepository, NewsSyncScheduler, NewsSyncWorker};
use headlines::util::{clean_content, format_published_date, is_truncated};
use headlines::work::{HostConditions, WorkEngine};

/// Get the config directory path (~/.config/headlines/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let config_dir = PathBuf::from(home).join(".config").join("headlines");
    Ok(config_dir)
}

#[derive(Parser, Debug)]
#[command(name = "headlines", about = "Keeps a local news cache in sync with a search API")]
struct Args {
    /// Config file (defaults to ~/.config/headlines/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Reset database (delete and recreate)
    #[arg(long)]
    reset_db: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sync in the background on a schedule until interrupted
    Run {
        /// Also sync once right away
        #[arg(long)]
        now: bool,
    },
    /// Sync once and exit
    Sync,
    /// Print the cached articles, newest first
    List {
        /// Show at most this many articles
        #[arg(long, value_name = "N")]
        limit: Option<usize>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print one cached article in full
    Show {
        /// Article URL
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    // Set up config directory
    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        tracing::info!(path = %config_dir.display(), "Created config directory");
    }

    // The config may hold an API key: user-only access
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(&config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    tracing::debug!(?config, "Effective configuration");

    let db_path = config_dir.join("news.db");

    // Handle --reset-db flag
    if args.reset_db && db_path.exists() {
        std::fs::remove_file(&db_path).context("Failed to delete database")?;
        println!("Database reset.");
    }

    // Open database
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of headlines appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    match args.command {
        Command::Run { now } => run(&config, db, now).await,
        Command::Sync => sync_once(&config, db).await,
        Command::List { limit, json } => list(&db, limit, json).await,
        Command::Show { url } => show(&db, &url).await,
    }
}

fn require_api_key(config: &Config) -> Result<SecretString> {
    config.api_key().ok_or_else(|| {
        anyhow::anyhow!(
            "No API key configured: set {} or api_key in the config file",
            API_KEY_ENV
        )
    })
}

fn build_repository(config: &Config, db: Database) -> Result<NewsRepository> {
    let api_key = require_api_key(config)?;
    let http = build_http_client(config.request_timeout()).context("Failed to build HTTP client")?;
    let client = NewsClient::new(http, &config.base_url).context("Invalid base_url")?;
    Ok(NewsRepository::new(
        client,
        db,
        config.search_params(),
        api_key,
    ))
}

async fn sync_once(config: &Config, db: Database) -> Result<()> {
    let repository = build_repository(config, db)?;
    let count = repository.sync_news().await.context("Sync failed")?;
    println!("Synced {} articles.", count);
    Ok(())
}

async fn run(config: &Config, db: Database, now: bool) -> Result<()> {
    let repository = build_repository(config, db.clone())?;
    let engine = WorkEngine::new(
        NewsSyncWorker::new(repository),
        Arc::new(HostConditions::default()),
        config.engine_settings(),
    );
    let scheduler = NewsSyncScheduler::new(Arc::new(engine), config.sync_schedule());
    let view = NewsView::new(db, scheduler.clone(), config.view_grace());

    let work_id = scheduler.schedule_periodic_sync();
    tracing::info!(work_id = %work_id, "Background sync running, press Ctrl+C to stop");
    if now {
        view.refresh();
    }

    let mut articles = view.articles();
    let mut sync_state = view.sync_state();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            list = articles.changed() => {
                tracing::info!(
                    articles = list.len(),
                    newest = list.first().map(|a| a.title.as_str()).unwrap_or(""),
                    "Article cache updated"
                );
            }
            state = sync_state.changed() => {
                if let Some(state) = state {
                    tracing::info!(state = %state, "Periodic sync state changed");
                }
            }
            _ = &mut shutdown => break,
        }
    }

    scheduler.shutdown();
    tracing::info!("Background sync stopped");
    Ok(())
}

async fn list(db: &Database, limit: Option<usize>, json: bool) -> Result<()> {
    let mut articles = db
        .list_articles()
        .await
        .context("Failed to read article cache")?;
    if let Some(limit) = limit {
        articles.truncate(limit);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&articles)?);
        return Ok(());
    }

    if articles.is_empty() {
        println!("No cached articles. Run `headlines sync` first.");
        return Ok(());
    }
    for article in &articles {
        println!(
            "{}  {}  {}",
            format_published_date(&article.published_at),
            article.source_name,
            article.title
        );
        println!("    {}", article.id);
    }
    Ok(())
}

async fn show(db: &Database, url: &str) -> Result<()> {
    let article = db
        .get_article(url)
        .await
        .context("Failed to read article cache")?
        .ok_or_else(|| anyhow::anyhow!("No cached article with URL {}", url))?;
    print_article(&article);
    Ok(())
}

fn print_article(article: &Article) {
    println!("{}", article.title);
    println!();
    match &article.author {
        Some(author) => println!("{} | {}", article.source_name, author),
        None => println!("{}", article.source_name),
    }
    println!("{}", format_published_date(&article.published_at));
    if let Some(description) = &article.description {
        println!();
        println!("{}", description);
    }
    println!();
    println!("{}", clean_content(article.content.as_deref()));
    println!();
    if let Some(image) = &article.image_url {
        println!("Image: {}", image);
    }
    if is_truncated(article.content.as_deref()) {
        println!("Read the full story on the official website.");
    }
    println!("{}", article.id);
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
