//! Configuration for the `ident-server` binary.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use ident_core::resolver::RetryPolicy;
use serde::Deserialize;

/// Prefix of the environment variables that override the config file, e.g.
/// `IDENT_PORT=8080`.
pub const ENV_PREFIX: &str = "IDENT";

/// `store_path` value selecting the in-process [`ident_core::memory::MemoryStore`].
pub const MEMORY_STORE: &str = ":memory:";

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and the
/// environment. Every key is optional.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
  pub host:             String,
  pub port:             u16,
  pub store_path:       PathBuf,
  pub max_attempts:     u32,
  pub retry_backoff_ms: u64,
  pub tx_timeout_ms:    u64,
}

impl Default for ServerConfig {
  fn default() -> Self {
    let policy = RetryPolicy::default();
    Self {
      host:             "127.0.0.1".to_owned(),
      port:             3000,
      store_path:       PathBuf::from("contacts.db"),
      max_attempts:     policy.max_attempts,
      retry_backoff_ms: policy.backoff.as_millis() as u64,
      tx_timeout_ms:    policy.tx_timeout.as_millis() as u64,
    }
  }
}

/// Where contacts live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
  Memory,
  Sqlite(PathBuf),
}

impl ServerConfig {
  /// Layer the TOML file at `path` (if it exists) under `IDENT_*`
  /// environment variables.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    Self::from_sources(
      config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix(ENV_PREFIX)),
    )
  }

  fn from_sources(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
  ) -> Result<Self, config::ConfigError> {
    builder.build()?.try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts: self.max_attempts,
      backoff:      Duration::from_millis(self.retry_backoff_ms),
      tx_timeout:   Duration::from_millis(self.tx_timeout_ms),
    }
  }

  pub fn store_location(&self) -> StoreLocation {
    if self.store_path == Path::new(MEMORY_STORE) {
      StoreLocation::Memory
    } else {
      StoreLocation::Sqlite(expand_tilde(&self.store_path))
    }
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn from_toml(toml: &str) -> ServerConfig {
    ServerConfig::from_sources(
      config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml)),
    )
    .unwrap()
  }

  #[test]
  fn empty_file_gives_defaults() {
    let cfg = from_toml("");
    assert_eq!(cfg, ServerConfig::default());
    assert_eq!(cfg.retry_policy(), RetryPolicy::default());
    assert_eq!(cfg.address(), "127.0.0.1:3000");
  }

  #[test]
  fn file_overrides_some_keys() {
    let cfg = from_toml(
      r#"
      port = 8080
      store_path = ":memory:"
      max_attempts = 5
      tx_timeout_ms = 250
      "#,
    );
    assert_eq!(cfg.host, "127.0.0.1");
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.store_location(), StoreLocation::Memory);

    let policy = cfg.retry_policy();
    assert_eq!(policy.max_attempts, 5);
    assert_eq!(policy.backoff, Duration::from_millis(25));
    assert_eq!(policy.tx_timeout, Duration::from_millis(250));
  }

  #[test]
  fn missing_file_is_not_an_error() {
    assert!(ServerConfig::load(Path::new("/nonexistent/ident/config.toml")).is_ok());
  }

  #[test]
  fn sqlite_paths_are_tilde_expanded() {
    let cfg = from_toml(r#"store_path = "data/contacts.db""#);
    assert_eq!(
      cfg.store_location(),
      StoreLocation::Sqlite(PathBuf::from("data/contacts.db"))
    );

    let expanded = expand_tilde(Path::new("~/contacts.db"));
    if let Ok(home) = std::env::var("HOME") {
      assert_eq!(expanded, PathBuf::from(home).join("contacts.db"));
    }
    assert_eq!(expand_tilde(Path::new("/abs/x.db")), PathBuf::from("/abs/x.db"));
  }
}
