use crate::services::storage_service::StoreConfig;
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, path::PathBuf};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub base_url: String,
    pub auto_create_bucket: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Local cloud storage emulator")]
pub struct Args {
    /// Host to bind to (overrides GCS_EMULATOR_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides GCS_EMULATOR_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where buckets and objects are stored (overrides GCS_EMULATOR_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// External URL used in selfLink/mediaLink (overrides GCS_EMULATOR_BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Create missing buckets on upload (overrides GCS_EMULATOR_AUTO_CREATE_BUCKET)
    #[arg(long)]
    pub auto_create_bucket: Option<bool>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::merge(Args::parse(), |name: &str| env::var(name).ok())
    }

    /// Merge CLI args over values looked up through `lookup`.
    ///
    /// CLI flags win; environment values fill the gaps; defaults fill the rest.
    pub fn merge(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_port = lookup("GCS_EMULATOR_PORT")
            .map(|value| {
                value
                    .parse::<u16>()
                    .with_context(|| format!("parsing GCS_EMULATOR_PORT value `{}`", value))
            })
            .transpose()?;
        let env_auto_create = lookup("GCS_EMULATOR_AUTO_CREATE_BUCKET")
            .map(|value| {
                parse_bool(&value).with_context(|| {
                    format!("parsing GCS_EMULATOR_AUTO_CREATE_BUCKET value `{}`", value)
                })
            })
            .transpose()?;

        let port = args.port.or(env_port).unwrap_or(4443);
        let host = args
            .host
            .or_else(|| lookup("GCS_EMULATOR_HOST"))
            .unwrap_or_else(|| "0.0.0.0".into());
        let storage_dir = args
            .storage_dir
            .or_else(|| lookup("GCS_EMULATOR_STORAGE_DIR"))
            .unwrap_or_else(|| "./data/storage".into());
        let base_url = args
            .base_url
            .or_else(|| lookup("GCS_EMULATOR_BASE_URL"))
            .unwrap_or_else(|| format!("http://localhost:{}", port));

        Ok(Self {
            host,
            port,
            storage_dir,
            base_url,
            auto_create_bucket: args.auto_create_bucket.or(env_auto_create).unwrap_or(true),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The part of the configuration the storage core is built from.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            root: PathBuf::from(&self.storage_dir),
            base_url: self.base_url.clone(),
            auto_create_bucket: self.auto_create_bucket,
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => bail!("expected a boolean, got `{}`", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::merge(Args::default(), env_of(&[])).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:4443");
        assert_eq!(cfg.storage_dir, "./data/storage");
        assert_eq!(cfg.base_url, "http://localhost:4443");
        assert!(cfg.auto_create_bucket);
    }

    #[test]
    fn test_env_values_and_cli_precedence() {
        let args = Args {
            port: Some(9000),
            ..Args::default()
        };
        let cfg = AppConfig::merge(
            args,
            env_of(&[
                ("GCS_EMULATOR_PORT", "8000"),
                ("GCS_EMULATOR_STORAGE_DIR", "/tmp/gcs"),
                ("GCS_EMULATOR_AUTO_CREATE_BUCKET", "no"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.base_url, "http://localhost:9000");
        assert!(!cfg.auto_create_bucket);

        let store = cfg.store_config();
        assert_eq!(store.root, PathBuf::from("/tmp/gcs"));
        assert!(!store.auto_create_bucket);
    }

    #[test]
    fn test_invalid_env_values_are_errors() {
        assert!(AppConfig::merge(Args::default(), env_of(&[("GCS_EMULATOR_PORT", "http")])).is_err());
        assert!(
            AppConfig::merge(
                Args::default(),
                env_of(&[("GCS_EMULATOR_AUTO_CREATE_BUCKET", "maybe")])
            )
            .is_err()
        );
    }
}
