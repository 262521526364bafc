/*============================================================
  Synavera Project: Syn-Tools
  Module: syntools_core::config
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Load operator configuration for Syn-Tools-Core and resolve
    the tools root, log directory and network policy.

  Security / Safety Notes:
    Reads TOML from operator-controlled paths only. The tools
    root override is taken verbatim from the environment.

  Dependencies:
    serde + toml for parsing, dirs for per-user locations.

  Operational Scope:
    Consulted once at start-up by the binary entry point.

  Revision History:
    2025-11-12 COD  Introduced installer configuration layer.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Explicit defaults with documented overrides
    - Validation before use
============================================================*/

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, SyntoolsError};

/// Environment variable that overrides the tools root.
pub const TOOLS_ROOT_ENV: &str = "RISCV_TOOLS_PATH";

const DEFAULT_TOOLS_DIR: &str = ".riscv-tools";
const CONFIG_DIR: &str = "syn-tools";
const CONFIG_FILE: &str = "config.toml";

/// Root configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyntoolsConfig {
    pub paths: PathsConfig,
    pub download: DownloadConfig,
    pub mirror: MirrorConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub tools_root: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

/// Transfer and integrity policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadConfig {
    /// Connect and read timeout applied to every socket, in seconds.
    pub timeout_secs: u64,
    pub max_attempts: usize,
    /// Extra downloads allowed after a failed verification.
    pub integrity_redownloads: usize,
    pub retry_backoff_ms: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            max_attempts: 3,
            integrity_redownloads: 1,
            retry_backoff_ms: 200,
        }
    }
}

impl DownloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Geolocation endpoints used by the mirror selector.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MirrorConfig {
    pub ip_url: String,
    pub geo_url: String,
    pub probe_timeout_secs: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            ip_url: "https://ifconfig.me/ip".to_string(),
            geo_url: "http://ip-api.com/json".to_string(),
            probe_timeout_secs: 5,
        }
    }
}

impl SyntoolsConfig {
    /// Load from an explicit path, the per-user default path, or defaults.
    pub fn load_from_optional_path(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(SyntoolsError::Config(format!(
                        "Configuration file {} does not exist",
                        explicit.display()
                    )));
                }
                Self::load_from_path(explicit)?
            }
            None => match default_config_path() {
                Some(candidate) if candidate.exists() => Self::load_from_path(&candidate)?,
                _ => Self::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            SyntoolsError::Config(format!(
                "Failed to read configuration {}: {err}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&raw)
            .map_err(|err| SyntoolsError::Config(format!("{} ({})", err, path.display())))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|err| SyntoolsError::Config(format!("Invalid configuration: {err}")))
    }

    fn validate(&self) -> Result<()> {
        if self.download.timeout_secs == 0 {
            return Err(SyntoolsError::Config(
                "download.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.download.max_attempts == 0 {
            return Err(SyntoolsError::Config(
                "download.max_attempts must be at least 1".into(),
            ));
        }
        if self.mirror.probe_timeout_secs == 0 {
            return Err(SyntoolsError::Config(
                "mirror.probe_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the tools root: environment override, then config, then `~/.riscv-tools`.
    pub fn tools_root(&self) -> Result<PathBuf> {
        let env_value = std::env::var_os(TOOLS_ROOT_ENV).map(PathBuf::from);
        self.tools_root_with(env_value)
    }

    fn tools_root_with(&self, env_value: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(root) = env_value.filter(|p| !p.as_os_str().is_empty()) {
            return Ok(root);
        }
        if let Some(root) = &self.paths.tools_root {
            return Ok(root.clone());
        }
        dirs::home_dir()
            .map(|home| home.join(DEFAULT_TOOLS_DIR))
            .ok_or_else(|| SyntoolsError::Config("Unable to determine home directory".into()))
    }

    /// Directory for session logs, defaulting to `<tools_root>/logs`.
    pub fn log_dir(&self, tools_root: &Path) -> PathBuf {
        self.paths
            .log_dir
            .clone()
            .unwrap_or_else(|| tools_root.join("logs"))
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_installer_policy() {
        let config = SyntoolsConfig::default();
        assert_eq!(config.download.timeout_secs, 20);
        assert_eq!(config.download.max_attempts, 3);
        assert_eq!(config.download.integrity_redownloads, 1);
        assert_eq!(config.mirror.probe_timeout_secs, 5);
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let config = SyntoolsConfig::from_toml_str(
            r#"
            [download]
            max_attempts = 5

            [paths]
            tools_root = "/opt/tools"
            "#,
        )
        .unwrap();
        assert_eq!(config.download.max_attempts, 5);
        assert_eq!(config.download.timeout_secs, 20);
        assert_eq!(config.paths.tools_root, Some(PathBuf::from("/opt/tools")));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = SyntoolsConfig::from_toml_str("[download]\nretries = 2\n").unwrap_err();
        assert!(matches!(err, SyntoolsError::Config(_)));
    }

    #[test]
    fn zero_attempts_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[download]\nmax_attempts = 0\n").unwrap();
        let err = SyntoolsConfig::load_from_optional_path(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SyntoolsConfig::load_from_optional_path(Some(&dir.path().join("nope.toml")))
            .unwrap_err();
        assert!(matches!(err, SyntoolsError::Config(_)));
    }

    #[test]
    fn environment_root_wins_over_config() {
        let mut config = SyntoolsConfig::default();
        config.paths.tools_root = Some(PathBuf::from("/from/config"));
        let root = config
            .tools_root_with(Some(PathBuf::from("/from/env")))
            .unwrap();
        assert_eq!(root, PathBuf::from("/from/env"));
        let root = config.tools_root_with(Some(PathBuf::new())).unwrap();
        assert_eq!(root, PathBuf::from("/from/config"));
    }

    #[test]
    fn log_dir_defaults_under_tools_root() {
        let config = SyntoolsConfig::default();
        assert_eq!(
            config.log_dir(Path::new("/t")),
            PathBuf::from("/t").join("logs")
        );
    }
}
