/*============================================================
  Synavera Project: Syn-Tools
  Module: syntools_core::installer
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Drive the acquisition pipeline for every manifest entry:
    platform match, mirror choice, download, verification,
    extraction and environment binding.

  Security / Safety Notes:
    Writes only beneath the tools root (`dist/`, `tools/`,
    `config.json`) and mutates this process' environment.

  Dependencies:
    Internal modules only.

  Operational Scope:
    Invoked once per run by the binary entry point.

  Revision History:
    2025-11-12 COD  Authored manifest installer.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Manifest-level failures abort before network activity
    - Entry-level failures are recorded, never fatal to peers
    - Bounded integrity retries
============================================================*/

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::DownloadConfig;
use crate::download::{ConsoleProgress, Downloader, Transport};
use crate::error::{Result, SyntoolsError};
use crate::extract::Extractor;
use crate::logger::Logger;
use crate::manifest::{load_manifest, MirrorRegion, MirrorTarget, ToolAttribute, ToolEntry};
use crate::mirror::{GeoLocator, MirrorSelector};
use crate::platform::PlatformId;
use crate::verify::Verifier;

/// Execution path of the installed toolchain.
pub const EXEC_PATH_ENV: &str = "RTT_EXEC_PATH";
/// Compiler prefix of the installed toolchain.
pub const CC_PREFIX_ENV: &str = "RTT_CC_PREFIX";

const DECISION_RECORD: &str = "config.json";

/// Environment fact published for downstream build configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvBinding {
    pub key: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Installed,
    AlreadyInstalled,
}

#[derive(Debug)]
pub struct EntryOutcome {
    pub tool_name: String,
    pub export_path: PathBuf,
    pub result: Result<EntryStatus>,
}

/// Per-run summary.
#[derive(Debug, Default)]
pub struct InstallReport {
    pub outcomes: Vec<EntryOutcome>,
    pub env: Vec<EnvBinding>,
}

impl InstallReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.result.is_ok())
    }

    pub fn count(&self, status: EntryStatus) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome.result, Ok(s) if s == status))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|binding| binding.key == key)
            .map(|binding| binding.value.as_str())
    }
}

/// Manifest-driven installer.
pub struct Installer<T, G> {
    tools_root: PathBuf,
    platform: PlatformId,
    downloader: Downloader<T>,
    verifier: Verifier,
    extractor: Extractor,
    selector: MirrorSelector<G>,
    integrity_redownloads: usize,
}

impl<T: Transport, G: GeoLocator> Installer<T, G> {
    pub fn new(
        tools_root: PathBuf,
        platform: PlatformId,
        transport: T,
        locator: G,
        config: &DownloadConfig,
    ) -> Self {
        let selector = MirrorSelector::new(locator, tools_root.join(DECISION_RECORD));
        Self {
            downloader: Downloader::new(transport, config),
            verifier: Verifier::new(),
            extractor: Extractor::default(),
            selector,
            integrity_redownloads: config.integrity_redownloads,
            platform,
            tools_root,
        }
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// Install every entry of the manifest at `manifest_path`.
    pub async fn install(&mut self, manifest_path: &Path, logger: &Logger) -> Result<InstallReport> {
        let manifest = load_manifest(manifest_path)?;
        logger.info(
            "MANIFEST",
            format!(
                "{} (schema {}) declares {} tool(s); platform {}",
                manifest_path.display(),
                manifest.schema_version,
                manifest.tools.len(),
                self.platform
            ),
        );

        let mut report = InstallReport::default();
        for tool in &manifest.tools {
            let export_path = tool.export_path(&self.tools_root);
            let result = self.install_entry(tool, &export_path, logger).await;

            match &result {
                Ok(status) => {
                    logger.info(
                        "TOOL",
                        format!("{} ({}): {:?}", tool.tool_name, tool.attribute, status),
                    );
                    if tool.attribute == ToolAttribute::Toolchain {
                        bind(&mut report, EXEC_PATH_ENV, export_path.display().to_string());
                        bind(&mut report, CC_PREFIX_ENV, tool.tool_name.clone());
                    }
                }
                Err(err) => logger.error(
                    "TOOL",
                    format!("{} failed [{}]: {err}", tool.tool_name, err.kind()),
                ),
            }

            report.outcomes.push(EntryOutcome {
                tool_name: tool.tool_name.clone(),
                export_path,
                result,
            });
        }

        Ok(report)
    }

    async fn install_entry(
        &mut self,
        tool: &ToolEntry,
        export_path: &Path,
        logger: &Logger,
    ) -> Result<EntryStatus> {
        if let ToolAttribute::Other(attribute) = &tool.attribute {
            return Err(SyntoolsError::UnsupportedAttribute {
                tool: tool.tool_name.clone(),
                attribute: attribute.clone(),
            });
        }

        if export_path.exists() {
            return Ok(EntryStatus::AlreadyInstalled);
        }
        if let Some(description) = &tool.description {
            logger.info("TOOL", format!("Installing {}: {description}", tool.tool_name));
        }

        let variant = tool
            .variant_for(&self.platform)
            .ok_or_else(|| SyntoolsError::UnsupportedPlatform {
                tool: tool.tool_name.clone(),
                platform: self.platform.to_string(),
            })?;

        let region = self.selector.select_region(logger).await;
        let target = match variant.mirror(region.mirror_region()) {
            Some(target) => target,
            None => {
                logger.warn(
                    "MIRROR",
                    format!(
                        "{} has no {:?} mirror for {}; using default",
                        tool.tool_name,
                        region.mirror_region(),
                        variant.platform_id
                    ),
                );
                variant.mirror(MirrorRegion::Default).ok_or_else(|| {
                    SyntoolsError::ManifestInvalid(format!(
                        "{}: no default mirror",
                        tool.tool_name
                    ))
                })?
            }
        };

        let dist = self.tools_root.join("dist");
        fs::create_dir_all(&dist).map_err(|err| {
            SyntoolsError::Filesystem(format!("Failed to create {}: {err}", dist.display()))
        })?;
        let staged = dist.join(target.file_name()?);
        logger.info("DOWNLOAD", format!("{} -> {}", target.url, staged.display()));

        self.acquire(tool, target, &staged, logger).await?;

        logger.info("EXTRACT", format!("Extracting {}", staged.display()));
        self.extractor
            .extract_and_normalize(
                &staged,
                &self.tools_root.join("tools"),
                tool.canonical_name(),
                logger,
            )
            .await
            .map_err(|err| match err {
                SyntoolsError::ExtractionFailure(_) => err,
                other => SyntoolsError::ExtractionFailure(other.to_string()),
            })?;

        if !export_path.exists() {
            return Err(SyntoolsError::ExtractionFailure(format!(
                "{} missing after extracting {}",
                export_path.display(),
                staged.display()
            )));
        }
        Ok(EntryStatus::Installed)
    }

    /// Download (or reuse) and verify the staged artifact.
    async fn acquire(
        &self,
        tool: &ToolEntry,
        target: &MirrorTarget,
        staged: &Path,
        logger: &Logger,
    ) -> Result<()> {
        let mut redownloads_left = self.integrity_redownloads;
        let mut need_fetch = !staged.exists();
        if !need_fetch {
            logger.info("DOWNLOAD", format!("Reusing staged {}", staged.display()));
        }

        loop {
            if need_fetch {
                let mut progress = ConsoleProgress::default();
                let fetched = self
                    .downloader
                    .fetch(
                        &target.url,
                        staged,
                        &mut |so_far, total| progress.update(so_far, total),
                        logger,
                    )
                    .await;
                progress.finish();
                fetched?;
            }

            let verdict = self
                .verifier
                .verify(staged, target.expected_size_bytes, &target.expected_hash)
                .await?;
            if verdict.passed() {
                return Ok(());
            }

            discard(staged, logger);
            if redownloads_left == 0 {
                return Err(SyntoolsError::IntegrityCheckFailed {
                    tool: tool.tool_name.clone(),
                    url: target.url.clone(),
                    detail: verdict.to_string(),
                });
            }
            redownloads_left -= 1;
            logger.warn(
                "VERIFY",
                format!("{}: {verdict}; downloading again", staged.display()),
            );
            need_fetch = true;
        }
    }
}

fn bind(report: &mut InstallReport, key: &'static str, value: String) {
    std::env::set_var(key, &value);
    report.env.push(EnvBinding { key, value });
}

fn discard(path: &Path, logger: &Logger) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            logger.warn("VERIFY", format!("Failed to remove {}: {err}", path.display()));
        }
    }
}
