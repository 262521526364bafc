/*============================================================
  Synavera Project: Syn-Tools
  Module: syntools_core::extract
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Unpack verified archives with the system `tar` and rename
    the single top-level directory to its canonical name.

  Security / Safety Notes:
    Executes `tar` with user privileges only. Archives are
    trusted only after size and digest verification.

  Dependencies:
    tokio::process for async command execution.

  Operational Scope:
    Called by the installer after a successful verification.

  Revision History:
    2025-11-12 COD  Crafted extraction and normalization layer.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Deterministic command invocation with explicit checks
    - Idempotent rename step with defined no-op behaviour
    - Reusable helpers for external command diagnostics
============================================================*/

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{Result, SyntoolsError};
use crate::logger::Logger;

/// Result of the rename step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    AlreadyCanonical,
    Renamed,
    /// Source directory vanished; treated as already normalized.
    SourceMissing,
}

/// Archive extractor backed by an external `tar` binary.
pub struct Extractor {
    program: String,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new("tar")
    }
}

impl Extractor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Unpack `archive` into `root` and return `root/<canonical>`.
    pub async fn extract_and_normalize(
        &self,
        archive: &Path,
        root: &Path,
        canonical: &str,
        logger: &Logger,
    ) -> Result<PathBuf> {
        let top = self.top_level_dir(archive).await?;

        fs::create_dir_all(root).map_err(|err| {
            SyntoolsError::Filesystem(format!("Failed to create {}: {err}", root.display()))
        })?;
        self.run(&[
            OsStr::new("-xf"),
            archive.as_os_str(),
            OsStr::new("-C"),
            root.as_os_str(),
        ])
        .await?;

        let outcome = normalize_top_level(root, &top, canonical, logger)?;
        logger.debug("EXTRACT", format!("{top} -> {canonical}: {outcome:?}"));
        Ok(root.join(canonical))
    }

    async fn top_level_dir(&self, archive: &Path) -> Result<String> {
        let listing = self.run(&[OsStr::new("-tf"), archive.as_os_str()]).await?;
        let entries = top_level_entries(&listing);
        let mut dirs = entries.iter().filter(|(_, is_dir)| **is_dir);
        match (entries.len(), dirs.next()) {
            (1, Some((name, _))) => Ok(name.clone()),
            _ => Err(SyntoolsError::ExtractionFailure(format!(
                "{} must contain exactly one top-level directory, found [{}]",
                archive.display(),
                entries.keys().cloned().collect::<Vec<_>>().join(", ")
            ))),
        }
    }

    async fn run(&self, args: &[&OsStr]) -> Result<String> {
        let output = Command::new(&self.program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| map_spawn_error(err, &self.program))?;

        if !output.status.success() {
            let rendered: Vec<String> = args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect();
            return Err(SyntoolsError::CommandFailure {
                command: format!("{} {}", self.program, rendered.join(" ")),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|err| {
            SyntoolsError::Serialization(format!("{} emitted invalid UTF-8: {err}", self.program))
        })
    }
}

/// Map each top-level member name to whether it is a directory.
fn top_level_entries(listing: &str) -> BTreeMap<String, bool> {
    let mut entries = BTreeMap::new();
    for line in listing.lines() {
        let member = line.trim().trim_start_matches("./");
        if member.is_empty() || member == "." {
            continue;
        }
        match member.split_once('/') {
            Some((head, _)) => {
                entries.insert(head.to_string(), true);
            }
            None => {
                entries.entry(member.to_string()).or_insert(false);
            }
        }
    }
    entries
}

/// Rename `root/extracted` to `root/canonical`.
///
/// A stale `root/canonical` left by an earlier partial install is replaced.
/// A missing source is logged and reported as [`Normalization::SourceMissing`].
pub fn normalize_top_level(
    root: &Path,
    extracted: &str,
    canonical: &str,
    logger: &Logger,
) -> Result<Normalization> {
    if extracted == canonical {
        return Ok(Normalization::AlreadyCanonical);
    }
    let source = root.join(extracted);
    let target = root.join(canonical);

    if !source.exists() {
        logger.warn(
            "EXTRACT",
            format!("The folder '{}' does not exist", source.display()),
        );
        return Ok(Normalization::SourceMissing);
    }

    if target.exists() {
        logger.warn(
            "EXTRACT",
            format!("Replacing stale directory {}", target.display()),
        );
        fs::remove_dir_all(&target).map_err(|err| {
            SyntoolsError::ExtractionFailure(format!(
                "Failed to remove stale {}: {err}",
                target.display()
            ))
        })?;
    }

    match fs::rename(&source, &target) {
        Ok(()) => Ok(Normalization::Renamed),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            logger.warn(
                "EXTRACT",
                format!("The folder '{}' does not exist", source.display()),
            );
            Ok(Normalization::SourceMissing)
        }
        Err(err) => Err(SyntoolsError::ExtractionFailure(format!(
            "Failed to rename {} to {}: {err}",
            source.display(),
            target.display()
        ))),
    }
}

fn map_spawn_error(err: io::Error, command: &str) -> SyntoolsError {
    if err.kind() == io::ErrorKind::NotFound {
        SyntoolsError::CommandMissing {
            command: command.into(),
        }
    } else {
        SyntoolsError::ExtractionFailure(format!("Failed to spawn {command}: {err}"))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    /// Write a `.tar.gz` holding each `(path, contents)` member.
    pub(crate) fn build_archive(path: &Path, members: &[(&str, &str)]) {
        let file = fs::File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, name, data.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn listing_collapses_to_top_level_names() {
        let entries = top_level_entries("./gcc-13/\n./gcc-13/bin/gcc\ngcc-13/lib/x.a\nREADME\n");
        assert_eq!(entries.get("gcc-13"), Some(&true));
        assert_eq!(entries.get("README"), Some(&false));
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn renames_versioned_folder_to_canonical_name() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("gcc.tar.gz");
        build_archive(&archive, &[("gcc-13.2-x86_64/bin/gcc", "#!/bin/sh\n")]);
        let root = dir.path().join("tools");

        let installed = Extractor::default()
            .extract_and_normalize(&archive, &root, "riscv64-elf", &Logger::console(false))
            .await
            .unwrap();
        assert_eq!(installed, root.join("riscv64-elf"));
        assert!(root.join("riscv64-elf").join("bin").join("gcc").is_file());
        assert!(!root.join("gcc-13.2-x86_64").exists());
    }

    #[tokio::test]
    async fn leaves_sibling_tools_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("tools");
        fs::create_dir_all(root.join("other-tool")).unwrap();
        let archive = dir.path().join("fip.tar.gz");
        build_archive(&archive, &[("fiptool-v2/fiptool.py", "print()\n")]);

        Extractor::default()
            .extract_and_normalize(&archive, &root, "fiptool", &Logger::console(false))
            .await
            .unwrap();
        assert!(root.join("other-tool").is_dir());
        assert!(root.join("fiptool").join("fiptool.py").is_file());
    }

    #[tokio::test]
    async fn rejects_archives_without_single_top_level_dir() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("flat.tar.gz");
        build_archive(&archive, &[("a/x", "1"), ("b/y", "2")]);

        let err = Extractor::default()
            .extract_and_normalize(&archive, &dir.path().join("tools"), "a", &Logger::console(false))
            .await
            .unwrap_err();
        assert!(matches!(err, SyntoolsError::ExtractionFailure(_)));
    }

    #[tokio::test]
    async fn missing_tar_binary_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = Extractor::new("syntools-no-such-tar")
            .extract_and_normalize(
                &dir.path().join("x.tar.gz"),
                dir.path(),
                "x",
                &Logger::console(false),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyntoolsError::CommandMissing { .. }));
    }

    #[test]
    fn missing_source_is_a_logged_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let outcome =
            normalize_top_level(dir.path(), "gone", "canonical", &Logger::console(false)).unwrap();
        assert_eq!(outcome, Normalization::SourceMissing);
    }

    #[test]
    fn stale_canonical_directory_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("canonical").join("old")).unwrap();
        fs::create_dir_all(dir.path().join("tool-1.0").join("new")).unwrap();

        let outcome =
            normalize_top_level(dir.path(), "tool-1.0", "canonical", &Logger::console(false))
                .unwrap();
        assert_eq!(outcome, Normalization::Renamed);
        assert!(dir.path().join("canonical").join("new").is_dir());
        assert!(!dir.path().join("canonical").join("old").exists());
        assert!(!dir.path().join("tool-1.0").exists());
    }

    #[test]
    fn identical_names_need_no_rename() {
        let dir = tempfile::tempdir().unwrap();
        let outcome =
            normalize_top_level(dir.path(), "same", "same", &Logger::console(false)).unwrap();
        assert_eq!(outcome, Normalization::AlreadyCanonical);
    }
}
