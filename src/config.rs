use crate::services::object_store::FsObjectStore;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr};

/// What the upload workflow does when the label service call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LabelPolicy {
    /// Fail the whole upload with a server error.
    Strict,
    /// Persist the photo with an empty label.
    Lenient,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub bucket: String,
    pub vision_url: String,
    pub vision_api_key: Option<String>,
    pub vision_timeout_secs: u64,
    pub label_policy: LabelPolicy,
    pub max_upload_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Photo upload and labelling backend")]
pub struct Args {
    /// Host to bind to (overrides PHOTO_BACKEND_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PHOTO_BACKEND_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where image bytes are stored (overrides PHOTO_BACKEND_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides PHOTO_BACKEND_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Object key prefix for uploaded images (overrides PHOTO_BACKEND_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Base URL of the Cloud Vision API (overrides PHOTO_BACKEND_VISION_URL)
    #[arg(long)]
    pub vision_url: Option<String>,

    /// Cloud Vision API key; labelling is disabled without one
    /// (overrides PHOTO_BACKEND_VISION_API_KEY)
    #[arg(long)]
    pub vision_api_key: Option<String>,

    /// Timeout for a single label request in seconds
    /// (overrides PHOTO_BACKEND_VISION_TIMEOUT_SECS)
    #[arg(long)]
    pub vision_timeout_secs: Option<u64>,

    /// Behaviour on label service failure (overrides PHOTO_BACKEND_LABEL_POLICY)
    #[arg(long, value_enum)]
    pub label_policy: Option<LabelPolicy>,

    /// Maximum accepted request body size (overrides PHOTO_BACKEND_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::merge(args, |name| env::var(name).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge CLI args over values looked up by `lookup`, then over defaults.
    pub fn merge(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_host = lookup("PHOTO_BACKEND_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = parse_var(&lookup, "PHOTO_BACKEND_PORT")?.unwrap_or(8080);
        let env_storage =
            lookup("PHOTO_BACKEND_STORAGE_DIR").unwrap_or_else(|| "./data/objects".into());
        let env_db = lookup("PHOTO_BACKEND_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/meta/photos.db".into());
        let env_bucket = lookup("PHOTO_BACKEND_BUCKET").unwrap_or_else(|| "images".into());
        let env_vision_url = lookup("PHOTO_BACKEND_VISION_URL")
            .unwrap_or_else(|| "https://vision.googleapis.com".into());
        let env_vision_key = lookup("PHOTO_BACKEND_VISION_API_KEY").filter(|k| !k.is_empty());
        let env_timeout = parse_var(&lookup, "PHOTO_BACKEND_VISION_TIMEOUT_SECS")?.unwrap_or(30);
        let env_policy = match lookup("PHOTO_BACKEND_LABEL_POLICY") {
            Some(value) => <LabelPolicy as ValueEnum>::from_str(&value, true).map_err(|err| {
                anyhow::anyhow!("parsing PHOTO_BACKEND_LABEL_POLICY value `{}`: {}", value, err)
            })?,
            None => LabelPolicy::Lenient,
        };
        let env_max_upload =
            parse_var(&lookup, "PHOTO_BACKEND_MAX_UPLOAD_BYTES")?.unwrap_or(10 * 1024 * 1024);

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            bucket: args.bucket.unwrap_or(env_bucket),
            vision_url: args.vision_url.unwrap_or(env_vision_url),
            vision_api_key: args.vision_api_key.or(env_vision_key),
            vision_timeout_secs: args.vision_timeout_secs.unwrap_or(env_timeout),
            label_policy: args.label_policy.unwrap_or(env_policy),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
        };

        // Keys are `<bucket>/<id>`, so the bucket must survive the store's key rules.
        if cfg.bucket.is_empty()
            || FsObjectStore::ensure_key_safe(&format!("{}/x", cfg.bucket)).is_err()
        {
            anyhow::bail!("bucket `{}` is not a usable key prefix", cfg.bucket);
        }

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(name)
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("parsing {} value `{}`", name, value))
        })
        .transpose()
}
