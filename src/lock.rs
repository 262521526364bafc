/*============================================================
  Synavera Project: Syn-Tools
  Module: syntools_core::lock
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Hold an advisory exclusive lock on the tools root for the
    duration of an install run.

  Security / Safety Notes:
    The lock file carries no data. The OS releases the lock
    when the process exits, including on crashes.

  Dependencies:
    fs4 for cross-platform advisory file locks.

  Operational Scope:
    Acquired by the binary entry point before installation.

  Revision History:
    2025-11-12 COD  Added single-installer guard.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Fail fast on contention
============================================================*/

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs4::FileExt;

use crate::error::{Result, SyntoolsError};

const LOCK_FILE: &str = ".install.lock";

/// Exclusive guard over a tools root; released on drop.
#[derive(Debug)]
pub struct InstallLock {
    _file: File,
    path: PathBuf,
}

impl InstallLock {
    pub fn acquire(tools_root: &Path) -> Result<Self> {
        fs::create_dir_all(tools_root).map_err(|err| {
            SyntoolsError::Filesystem(format!(
                "Failed to create tools root {}: {err}",
                tools_root.display()
            ))
        })?;
        let path = tools_root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|err| {
                SyntoolsError::Filesystem(format!("Failed to open {}: {err}", path.display()))
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { _file: file, path }),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Err(SyntoolsError::Locked { path }),
            #[cfg(windows)]
            Err(err) if matches!(err.raw_os_error(), Some(32 | 33)) => {
                Err(SyntoolsError::Locked { path })
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
