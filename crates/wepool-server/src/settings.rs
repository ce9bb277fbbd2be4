//! Layered runtime settings: built-in defaults, then `config.toml`, then
//! `WEPOOL_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;
use wepool_core::notify::MailSettings;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:        String,
  pub port:        u16,
  pub store_path:  PathBuf,
  /// Recipient of new-registration notices.
  pub admin_email: String,
  pub from_email:  String,
  /// Public origin used to build verification links.
  pub base_url:    String,
}

impl ServerConfig {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .set_default("host", "127.0.0.1")?
      .set_default("port", 8080)?
      .set_default("store_path", "~/.local/share/wepool/wepool.db")?
      .set_default("admin_email", "admin@localhost")?
      .set_default("from_email", "noreply@localhost")?
      .set_default("base_url", "http://localhost:8080")?
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("WEPOOL"))
      .build()
      .context("failed to read config file")?;

    let mut cfg: Self = settings
      .try_deserialize()
      .context("failed to deserialise ServerConfig")?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    Ok(cfg)
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn mail(&self) -> MailSettings {
    MailSettings {
      from_email:  self.from_email.clone(),
      admin_email: self.admin_email.clone(),
      base_url:    self.base_url.clone(),
    }
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
