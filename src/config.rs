//! TOML configuration.
//!
//! Every command reads the same file (`--config`, default
//! `./config/crm.toml`). Only `[db]` and `[server]` are required; the other
//! sections fall back to defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::import::ImportKind;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Directory served under `/images` (downloaded Notion note images).
    #[serde(default)]
    pub images_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_search_limit")]
    pub search_limit: i64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            search_limit: default_search_limit(),
        }
    }
}

fn default_search_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
    /// Glob patterns per import kind, relative to `export_dir`.
    #[serde(default)]
    pub patterns: BTreeMap<String, Vec<String>>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            export_dir: default_export_dir(),
            patterns: BTreeMap::new(),
        }
    }
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("./exports")
}

impl ImportConfig {
    /// Patterns for `kind`, falling back to [`ImportKind::default_pattern`].
    pub fn patterns_for(&self, kind: ImportKind) -> Vec<String> {
        self.patterns
            .get(kind.as_str())
            .cloned()
            .unwrap_or_else(|| vec![kind.default_pattern()])
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    if config.api.search_limit < 1 {
        anyhow::bail!("api.search_limit must be >= 1");
    }

    for key in config.import.patterns.keys() {
        if key.parse::<ImportKind>().is_err() {
            anyhow::bail!(
                "Unknown import kind in import.patterns: '{}'. Must be one of: {}",
                key,
                ImportKind::ALL
                    .iter()
                    .map(|k| k.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse(
            r#"
            [db]
            path = "data/crm.sqlite"

            [server]
            bind = "127.0.0.1:8000"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.api.search_limit, 10);
        assert_eq!(cfg.logging.filter, "info");
        assert_eq!(cfg.import.export_dir, PathBuf::from("./exports"));
        assert!(cfg.server.images_dir.is_none());
        assert_eq!(
            cfg.import.patterns_for(ImportKind::Notes),
            vec!["**/*notes*.json".to_string()]
        );
    }

    #[test]
    fn test_pattern_override() {
        let cfg = parse(
            r#"
            [db]
            path = "crm.sqlite"

            [server]
            bind = "127.0.0.1:8000"

            [import.patterns]
            lps = ["notion_export_f8e8*.json"]
            "#,
        )
        .unwrap();
        assert_eq!(
            cfg.import.patterns_for(ImportKind::Lps),
            vec!["notion_export_f8e8*.json".to_string()]
        );
    }

    #[test]
    fn test_rejects_zero_search_limit() {
        let err = parse(
            r#"
            [db]
            path = "crm.sqlite"

            [server]
            bind = "127.0.0.1:8000"

            [api]
            search_limit = 0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("search_limit"));
    }

    #[test]
    fn test_rejects_unknown_pattern_kind() {
        let err = parse(
            r#"
            [db]
            path = "crm.sqlite"

            [server]
            bind = "127.0.0.1:8000"

            [import.patterns]
            invoices = ["*.json"]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invoices"));
    }
}
