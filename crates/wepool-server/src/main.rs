//! WePool server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) overlaid by
//! `WEPOOL_*` environment variables, opens the SQLite store, and serves the
//! JSON API under `/api`.
//!
//! # Bootstrapping
//!
//! ```text
//! wepool create-superuser --username admin --email admin@example.com
//! ```

mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use axum::Router;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use wepool_api::{AppState, api_router, auth::hash_password, public::MIN_PASSWORD_LEN};
use wepool_core::{
  account::NewAccount,
  notify::LogNotifier,
  store::MemberStore,
  workflow,
};
use wepool_store_sqlite::SqliteStore;

use crate::settings::ServerConfig;

#[derive(Parser)]
#[command(author, version, about = "WePool membership server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API (the default).
  Serve,
  /// Print the argon2 hash for a password entered on stdin and exit.
  HashPassword,
  /// Create an active staff superuser; the password is read from stdin.
  CreateSuperuser {
    #[arg(long)]
    username: String,
    #[arg(long)]
    email:    String,
  },
  /// Run the qualification sweep once and print what changed.
  CheckQualifications,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => {
      let cfg = ServerConfig::load(&cli.config)?;
      let store = open_store(&cfg).await?;
      serve(cfg, store).await
    }
    Command::HashPassword => {
      let password = read_password()?;
      println!("{}", hash(&password)?);
      Ok(())
    }
    Command::CreateSuperuser { username, email } => {
      let cfg = ServerConfig::load(&cli.config)?;
      let store = open_store(&cfg).await?;
      create_superuser(&store, username, email).await
    }
    Command::CheckQualifications => {
      let cfg = ServerConfig::load(&cli.config)?;
      let store = open_store(&cfg).await?;
      let report = workflow::check_qualifications(&store)
        .await
        .context("qualification sweep failed")?;
      println!(
        "{} member(s) moved to yellow, {} sponsored member(s) qualified, {} skipped",
        report.yellow, report.qualified, report.skipped
      );
      Ok(())
    }
  }
}

async fn open_store(cfg: &ServerConfig) -> anyhow::Result<SqliteStore> {
  if let Some(parent) = cfg.store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }
  SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))
}

async fn serve(cfg: ServerConfig, store: SqliteStore) -> anyhow::Result<()> {
  let state = AppState {
    store:    Arc::new(store),
    notifier: Arc::new(LogNotifier),
    mail:     Arc::new(cfg.mail()),
  };

  let app = Router::new()
    .nest("/api", api_router(state))
    .layer(TraceLayer::new_for_http());
  let address = cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;
  Ok(())
}

async fn create_superuser(
  store: &SqliteStore,
  username: String,
  email: String,
) -> anyhow::Result<()> {
  if store.find_account_by_username(&username).await?.is_some() {
    anyhow::bail!("username {username:?} already exists");
  }
  let password = read_password()?;
  if password.chars().count() < MIN_PASSWORD_LEN {
    anyhow::bail!("password must be at least {MIN_PASSWORD_LEN} characters");
  }

  let account = store
    .create_account(NewAccount {
      username,
      email,
      first_name: String::new(),
      last_name: String::new(),
      password_hash: hash(&password)?,
      is_active: true,
      is_staff: true,
      is_superuser: true,
    })
    .await
    .context("failed to create account")?;

  tracing::info!(account = %account.account_id, username = %account.username, "superuser created");
  Ok(())
}

fn hash(password: &str) -> anyhow::Result<String> {
  hash_password(password).map_err(|e| anyhow::anyhow!("argon2 error: {e}"))
}

/// Read a password from stdin (no echo).
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}
