//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::domain::images::{ImageFormat, MAX_UPLOAD_BYTES};

mod cli;

pub use cli::{CliArgs, Command, GlobalOverrides, PostsArgs, UploadArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "pressroom";
const DEFAULT_SERVICE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CACHE_TTL_MS: u64 = 300_000;
const DEFAULT_BATCH_WINDOW_MS: u64 = 50;
const DEFAULT_MAX_RETRIES: u64 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;
const DEFAULT_UPLOAD_MAX_CONCURRENT: u64 = 3;
const DEFAULT_UPLOAD_MAX_ATTEMPTS: u64 = 3;
const DEFAULT_UPLOAD_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_UPLOAD_FOLDER: &str = "blog";
const DEFAULT_IMAGE_MAX_WIDTH: u32 = 1920;
const DEFAULT_IMAGE_MAX_HEIGHT: u32 = 1080;
const DEFAULT_IMAGE_QUALITY: u8 = 80;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub service: ServiceSettings,
    pub cache: CacheSettings,
    pub retry: RetrySettings,
    pub uploads: UploadSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Base URL of the REST data service, e.g. `https://project.example.co/rest/v1/`.
    pub url: Option<Url>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl: Duration,
    pub batch_window: Duration,
}

#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub max_retries: NonZeroU32,
    pub base_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub endpoint: Option<Url>,
    pub folder: String,
    pub max_concurrent: NonZeroUsize,
    pub max_attempts: NonZeroU32,
    pub retry_base_delay: Duration,
    pub max_bytes: NonZeroU64,
    pub max_width: NonZeroU32,
    pub max_height: NonZeroU32,
    pub quality: u8,
    pub format: ImageFormat,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("PRESSROOM").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_global_overrides(&cli.overrides);
    if let Command::Upload(args) = &cli.command {
        raw.apply_upload_overrides(args);
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    service: RawServiceSettings,
    cache: RawCacheSettings,
    retry: RawRetrySettings,
    uploads: RawUploadSettings,
}

impl RawSettings {
    fn apply_global_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.service_url.as_ref() {
            self.service.url = Some(url.clone());
        }
        if let Some(key) = overrides.api_key.as_ref() {
            self.service.api_key = Some(key.clone());
        }
        if overrides.no_cache {
            self.cache.enabled = Some(false);
        }
    }

    fn apply_upload_overrides(&mut self, args: &UploadArgs) {
        if let Some(endpoint) = args.endpoint.as_ref() {
            self.uploads.endpoint = Some(endpoint.clone());
        }
        if let Some(folder) = args.folder.as_ref() {
            self.uploads.folder = Some(folder.clone());
        }
        if let Some(max) = args.max_concurrent {
            self.uploads.max_concurrent = Some(max);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            service,
            cache,
            retry,
            uploads,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            service: build_service_settings(service)?,
            cache: build_cache_settings(cache)?,
            retry: build_retry_settings(retry)?,
            uploads: build_upload_settings(uploads)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_service_settings(service: RawServiceSettings) -> Result<ServiceSettings, LoadError> {
    let url = non_blank(service.url)
        .map(|value| parse_base_url(&value, "service.url"))
        .transpose()?;
    let api_key = non_blank(service.api_key);

    let timeout_secs = service
        .timeout_seconds
        .unwrap_or(DEFAULT_SERVICE_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "service.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServiceSettings {
        url,
        api_key,
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let ttl_ms = cache.ttl_ms.unwrap_or(DEFAULT_CACHE_TTL_MS);
    if ttl_ms == 0 {
        return Err(LoadError::invalid(
            "cache.ttl_ms",
            "must be greater than zero; use `cache.enabled = false` to disable caching",
        ));
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        ttl: Duration::from_millis(ttl_ms),
        batch_window: Duration::from_millis(
            cache.batch_window_ms.unwrap_or(DEFAULT_BATCH_WINDOW_MS),
        ),
    })
}

fn build_retry_settings(retry: RawRetrySettings) -> Result<RetrySettings, LoadError> {
    let max_retries = non_zero_u32(
        retry.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        "retry.max_retries",
    )?;

    Ok(RetrySettings {
        max_retries,
        base_delay: Duration::from_millis(
            retry.base_delay_ms.unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS),
        ),
    })
}

fn build_upload_settings(uploads: RawUploadSettings) -> Result<UploadSettings, LoadError> {
    let endpoint = non_blank(uploads.endpoint)
        .map(|value| {
            Url::parse(&value)
                .map_err(|err| LoadError::invalid("uploads.endpoint", err.to_string()))
        })
        .transpose()?;

    let folder = non_blank(uploads.folder).unwrap_or_else(|| DEFAULT_UPLOAD_FOLDER.to_string());

    let max_concurrent = uploads
        .max_concurrent
        .unwrap_or(DEFAULT_UPLOAD_MAX_CONCURRENT);
    let max_concurrent = usize::try_from(max_concurrent)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| {
            LoadError::invalid("uploads.max_concurrent", "must be greater than zero")
        })?;

    let max_attempts = non_zero_u32(
        uploads.max_attempts.unwrap_or(DEFAULT_UPLOAD_MAX_ATTEMPTS),
        "uploads.max_attempts",
    )?;

    let max_bytes = uploads.max_bytes.unwrap_or(MAX_UPLOAD_BYTES);
    let max_bytes = NonZeroU64::new(max_bytes)
        .ok_or_else(|| LoadError::invalid("uploads.max_bytes", "must be greater than zero"))?;

    let max_width = non_zero_u32(
        uploads
            .max_width
            .unwrap_or(u64::from(DEFAULT_IMAGE_MAX_WIDTH)),
        "uploads.max_width",
    )?;
    let max_height = non_zero_u32(
        uploads
            .max_height
            .unwrap_or(u64::from(DEFAULT_IMAGE_MAX_HEIGHT)),
        "uploads.max_height",
    )?;

    let quality = uploads.quality.unwrap_or(DEFAULT_IMAGE_QUALITY);
    if !(1..=100).contains(&quality) {
        return Err(LoadError::invalid(
            "uploads.quality",
            "must be between 1 and 100",
        ));
    }

    let format = match non_blank(uploads.format) {
        Some(value) => ImageFormat::from_name(&value).ok_or_else(|| {
            LoadError::invalid("uploads.format", format!("unknown format `{value}`"))
        })?,
        None => ImageFormat::Jpeg,
    };

    Ok(UploadSettings {
        endpoint,
        folder,
        max_concurrent,
        max_attempts,
        retry_base_delay: Duration::from_millis(
            uploads
                .retry_base_delay_ms
                .unwrap_or(DEFAULT_UPLOAD_RETRY_DELAY_MS),
        ),
        max_bytes,
        max_width,
        max_height,
        quality,
        format,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServiceSettings {
    url: Option<String>,
    api_key: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    ttl_ms: Option<u64>,
    batch_window_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRetrySettings {
    max_retries: Option<u64>,
    base_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUploadSettings {
    endpoint: Option<String>,
    folder: Option<String>,
    max_concurrent: Option<u64>,
    max_attempts: Option<u64>,
    retry_base_delay_ms: Option<u64>,
    max_bytes: Option<u64>,
    max_width: Option<u64>,
    max_height: Option<u64>,
    quality: Option<u8>,
    format: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Parse a base URL, forcing a trailing slash so relative joins keep the path.
fn parse_base_url(value: &str, key: &'static str) -> Result<Url, LoadError> {
    let normalized = if value.ends_with('/') {
        value.to_string()
    } else {
        format!("{value}/")
    };
    Url::parse(&normalized).map_err(|err| LoadError::invalid(key, err.to_string()))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
