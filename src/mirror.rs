/*============================================================
  Synavera Project: Syn-Tools
  Module: syntools_core::mirror
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Decide whether downloads should prefer the China mirror,
    memoize the decision and persist it across runs.

  Security / Safety Notes:
    Issues two read-only HTTP GETs (public IP echo, IP country
    lookup) only when no decision record exists.

  Dependencies:
    reqwest for HTTP, serde_json for the record, chrono for the
    timezone fallback, urlencoding for the lookup path.

  Operational Scope:
    Owned by the installer; consulted only when an entry needs
    a download.

  Revision History:
    2025-11-12 COD  Implemented cached mirror selection.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Persisted decisions are authoritative
    - Fallback path never raises
============================================================*/

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use urlencoding::encode;

use crate::config::MirrorConfig;
use crate::error::{Result, SyntoolsError};
use crate::logger::Logger;
use crate::manifest::MirrorRegion;

const CHINA_UTC_OFFSET_SECS: i32 = 8 * 3600;

/// Persisted download region preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    China,
    Default,
}

impl Region {
    /// Manifest region key serving this preference.
    pub fn mirror_region(self) -> MirrorRegion {
        match self {
            Region::China => MirrorRegion::Cn,
            Region::Default => MirrorRegion::Default,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::China => f.write_str("China"),
            Region::Default => f.write_str("Default"),
        }
    }
}

/// On-disk decision record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorDecision {
    #[serde(alias = "country")]
    pub region: Region,
}

/// How a decision was reached, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionBasis {
    Cached,
    IpLocation,
    Timezone,
}

impl DecisionBasis {
    fn as_str(self) -> &'static str {
        match self {
            DecisionBasis::Cached => "cached",
            DecisionBasis::IpLocation => "ip-location",
            DecisionBasis::Timezone => "timezone",
        }
    }
}

/// Resolves the country of the caller's public address.
#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn country(&self) -> Result<String>;
}

/// Geolocation via a public IP echo plus ip-api style lookup.
pub struct IpApiLocator {
    client: reqwest::Client,
    ip_url: String,
    geo_url: String,
}

#[derive(Debug, Deserialize)]
struct GeoResponse {
    country: String,
}

impl IpApiLocator {
    pub fn new(config: &MirrorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.probe_timeout_secs))
            .user_agent("Syn-Tools-Core/0.4")
            .build()
            .map_err(|err| SyntoolsError::Network(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            ip_url: config.ip_url.clone(),
            geo_url: config.geo_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GeoLocator for IpApiLocator {
    async fn country(&self) -> Result<String> {
        let ip = self
            .client
            .get(&self.ip_url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| SyntoolsError::Network(format!("IP lookup failed: {err}")))?
            .text()
            .await
            .map_err(|err| SyntoolsError::Network(format!("IP lookup body unreadable: {err}")))?;
        let ip = ip.trim();
        if ip.is_empty() {
            return Err(SyntoolsError::Network("IP lookup returned an empty body".into()));
        }

        let url = format!("{}/{}", self.geo_url, encode(ip));
        let payload = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| SyntoolsError::Network(format!("Geolocation {url} failed: {err}")))?
            .json::<GeoResponse>()
            .await
            .map_err(|err| {
                SyntoolsError::Serialization(format!("Malformed geolocation response: {err}"))
            })?;
        Ok(payload.country)
    }
}

/// Memoized, persisted mirror-region decision.
pub struct MirrorSelector<G> {
    locator: G,
    record_path: PathBuf,
    memo: Option<Region>,
    utc_offset_secs: Option<i32>,
}

impl<G: GeoLocator> MirrorSelector<G> {
    pub fn new(locator: G, record_path: PathBuf) -> Self {
        Self {
            locator,
            record_path,
            memo: None,
            utc_offset_secs: None,
        }
    }

    /// Pin the UTC offset used by the timezone fallback.
    #[cfg(test)]
    pub fn with_utc_offset(mut self, offset_secs: i32) -> Self {
        self.utc_offset_secs = Some(offset_secs);
        self
    }

    /// Return the preferred region, probing at most once per record lifetime.
    pub async fn select_region(&mut self, logger: &Logger) -> Region {
        if let Some(region) = self.memo {
            return region;
        }

        let (region, basis) = match read_decision(&self.record_path) {
            Ok(Some(decision)) => (decision.region, DecisionBasis::Cached),
            Ok(None) => self.probe(logger).await,
            Err(err) => {
                logger.warn(
                    "MIRROR",
                    format!("Ignoring unreadable decision record: {err}"),
                );
                self.probe(logger).await
            }
        };

        if basis != DecisionBasis::Cached {
            if let Err(err) = write_decision(&self.record_path, &MirrorDecision { region }) {
                logger.warn("MIRROR", format!("Failed to persist mirror decision: {err}"));
            }
        }

        logger.info(
            "MIRROR",
            format!("Using {region} server ({})", basis.as_str()),
        );
        self.memo = Some(region);
        region
    }

    async fn probe(&self, logger: &Logger) -> (Region, DecisionBasis) {
        match self.locator.country().await {
            Ok(country) => {
                let region = if country == "China" {
                    Region::China
                } else {
                    Region::Default
                };
                (region, DecisionBasis::IpLocation)
            }
            Err(err) => {
                logger.debug("MIRROR", format!("Geolocation unavailable: {err}"));
                let offset = self
                    .utc_offset_secs
                    .unwrap_or_else(|| Local::now().offset().local_minus_utc());
                (region_for_offset(offset), DecisionBasis::Timezone)
            }
        }
    }
}

/// Timezone heuristic: exactly UTC+8 selects the China mirror.
pub fn region_for_offset(offset_secs: i32) -> Region {
    if offset_secs == CHINA_UTC_OFFSET_SECS {
        Region::China
    } else {
        Region::Default
    }
}

fn read_decision(path: &Path) -> Result<Option<MirrorDecision>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|err| {
        SyntoolsError::Filesystem(format!("Failed to read {}: {err}", path.display()))
    })?;
    serde_json::from_str(&raw).map(Some).map_err(|err| {
        SyntoolsError::Serialization(format!("Invalid record {}: {err}", path.display()))
    })
}

fn write_decision(path: &Path, decision: &MirrorDecision) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            SyntoolsError::Filesystem(format!(
                "Failed to create {}: {err}",
                parent.display()
            ))
        })?;
    }
    let body = serde_json::to_string_pretty(decision)
        .map_err(|err| SyntoolsError::Serialization(err.to_string()))?;
    fs::write(path, body).map_err(|err| {
        SyntoolsError::Filesystem(format!("Failed to write {}: {err}", path.display()))
    })
}
