//! UV index lookup with backup key and on-disk fallback.
//!
//! The primary API key is always tried first. A 403 (quota exhausted) moves on
//! to the backup key; any other failure goes straight to the cached payload of
//! the last successful lookup. The cache is only ever a fallback: a fresh
//! lookup always overwrites it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::{
    fmt::{self, Debug},
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    config::Config,
    error::{FetchError, truncate_body},
    model::{Coordinates, ErrorPayload, UvReading},
};

pub const UV_FETCH_FAILED: &str = "No UV data available";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeySlot {
    Primary,
    Backup,
}

impl fmt::Display for ApiKeySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiKeySlot::Primary => f.write_str("primary"),
            ApiKeySlot::Backup => f.write_str("backup"),
        }
    }
}

/// Result of a UV lookup, tagged with where the reading came from.
#[derive(Debug, Clone, PartialEq)]
pub enum UvOutcome {
    /// Live data from the API.
    Fresh { reading: UvReading, key: ApiKeySlot },
    /// Live lookup failed; reading comes from the cache.
    Degraded { reading: UvReading, reason: String },
    /// Neither the API nor the cache produced a reading.
    Failed { reason: String },
}

impl UvOutcome {
    /// Collapse into a reading, or the payload reported to the operator.
    pub fn into_result(self) -> Result<UvReading, ErrorPayload> {
        match self {
            UvOutcome::Fresh { reading, .. } | UvOutcome::Degraded { reading, .. } => Ok(reading),
            UvOutcome::Failed { reason } => Err(ErrorPayload::new(UV_FETCH_FAILED, reason)),
        }
    }
}

#[async_trait]
pub trait UvSource: Send + Sync + Debug {
    async fn fetch_uv(&self, at: Coordinates) -> UvOutcome;
}

/// Single-file store for the raw payload of the last successful lookup.
#[derive(Debug, Clone)]
pub struct UvCache {
    path: PathBuf,
}

impl UvCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn store(&self, raw: &Value) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec(raw)?;
        tokio::fs::write(&self.path, body).await
    }

    pub async fn load(&self) -> io::Result<Value> {
        let body = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Client for the openuv.io `uv` endpoint.
#[derive(Clone)]
pub struct OpenUvClient {
    primary_key: String,
    backup_key: Option<String>,
    base_url: String,
    cache: UvCache,
    http: Client,
}

impl Debug for OpenUvClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenUvClient")
            .field("base_url", &self.base_url)
            .field("has_backup_key", &self.backup_key.is_some())
            .field("cache", &self.cache)
            .finish()
    }
}

impl OpenUvClient {
    pub fn new(
        primary_key: String,
        backup_key: Option<String>,
        base_url: String,
        cache: UvCache,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            primary_key,
            backup_key: backup_key.filter(|k| !k.trim().is_empty()),
            base_url,
            cache,
            http,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Self::new(
            config.uv.api_key.clone(),
            config.uv.backup_api_key.clone(),
            config.uv.base_url.clone(),
            UvCache::new(&config.uv.cache_path),
            config.http_timeout(),
        )
    }

    async fn fetch_live(&self, key: &str, at: Coordinates) -> Result<(UvReading, Value), FetchError> {
        let res = self
            .http
            .get(&self.base_url)
            .query(&[
                ("lat", at.lat.to_string()),
                ("lng", at.lon.to_string()),
                ("alt", "0".to_string()),
            ])
            .header("x-access-token", key)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status,
                body: truncate_body(&body),
            });
        }

        let raw: Value = serde_json::from_str(&body)?;
        let reading = parse_reading(&raw)?;
        Ok((reading, raw))
    }

    async fn fresh(&self, reading: UvReading, raw: Value, key: ApiKeySlot) -> UvOutcome {
        if let Err(e) = self.cache.store(&raw).await {
            tracing::warn!("could not update UV cache {}: {e}", self.cache.path().display());
        } else {
            tracing::debug!("UV data saved to {}", self.cache.path().display());
        }
        UvOutcome::Fresh { reading, key }
    }

    async fn from_cache(&self, reason: String) -> UvOutcome {
        tracing::info!("loading UV data from {}", self.cache.path().display());

        let raw = match self.cache.load().await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::error!("no cached UV data available");
                return UvOutcome::Failed {
                    reason: format!("{reason}; no cached UV data available"),
                };
            }
            Err(e) => {
                tracing::error!("error loading cached UV data: {e}");
                return UvOutcome::Failed {
                    reason: format!("{reason}; cached UV data unreadable: {e}"),
                };
            }
        };

        match parse_reading(&raw) {
            Ok(reading) => UvOutcome::Degraded { reading, reason },
            Err(e) => {
                tracing::error!("cached UV data is unusable: {e}");
                UvOutcome::Failed {
                    reason: format!("{reason}; cached UV data unusable: {e}"),
                }
            }
        }
    }
}

#[async_trait]
impl UvSource for OpenUvClient {
    async fn fetch_uv(&self, at: Coordinates) -> UvOutcome {
        tracing::debug!("fetching UV data");

        let reason = match self.fetch_live(&self.primary_key, at).await {
            Ok((reading, raw)) => return self.fresh(reading, raw, ApiKeySlot::Primary).await,
            Err(e) if e.status() == Some(StatusCode::FORBIDDEN) => match &self.backup_key {
                Some(backup) => {
                    tracing::warn!("primary UV API key limit reached, trying backup key");
                    match self.fetch_live(backup, at).await {
                        Ok((reading, raw)) => {
                            return self.fresh(reading, raw, ApiKeySlot::Backup).await;
                        }
                        Err(e) => {
                            tracing::error!("both UV API keys failed: {e}");
                            format!("primary key rate limited; backup key failed: {e}")
                        }
                    }
                }
                None => {
                    tracing::error!("primary UV API key limit reached and no backup key configured");
                    "primary key rate limited; no backup key configured".to_string()
                }
            },
            Err(e) => {
                tracing::error!("error fetching UV data: {e}");
                e.to_string()
            }
        };

        self.from_cache(reason).await
    }
}

#[derive(Debug, Deserialize)]
struct OuResponse {
    result: OuResult,
}

#[derive(Debug, Deserialize)]
struct OuResult {
    uv: f64,
    uv_max: f64,
    uv_max_time: String,
    #[serde(default)]
    safe_exposure_time: OuSafeExposure,
}

#[derive(Debug, Default, Deserialize)]
struct OuSafeExposure {
    #[serde(default)]
    st1: Option<f64>,
}

/// Turn a raw `uv` response (live or cached) into a reading.
pub fn parse_reading(raw: &Value) -> Result<UvReading, FetchError> {
    let parsed = OuResponse::deserialize(raw)?;
    let result = parsed.result;

    let uv_max_time = DateTime::parse_from_rfc3339(&result.uv_max_time)
        .map_err(|source| FetchError::Timestamp {
            value: result.uv_max_time.clone(),
            source,
        })?
        .with_timezone(&Utc);

    Ok(UvReading::new(
        result.uv,
        result.uv_max,
        uv_max_time,
        result.safe_exposure_time.st1,
    ))
}
