/*============================================================
  Synavera Project: Syn-Tools
  Module: syntools_core::platform
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Derive the normalized `<os>-<arch>` identifier used to pick
    the matching manifest variant for this machine.

  Security / Safety Notes:
    Pure computation over compile-time target constants.

  Dependencies:
    None beyond std.

  Operational Scope:
    Called once per run by the installer.

  Revision History:
    2025-11-12 COD  Added platform probe.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Deterministic, side-effect free normalization
============================================================*/

use std::fmt;

/// Normalized platform identifier such as `linux-x86_64`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlatformId(String);

impl PlatformId {
    /// Probe the running host.
    pub fn probe() -> Self {
        Self::from_parts(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Normalize an operating system / architecture pair.
    ///
    /// Names follow the manifest convention: `darwin` rather than `macos`,
    /// `arm64` on Darwin, and `amd64` for 64-bit Windows hosts including
    /// MSYS and Cygwin style system names.
    pub fn from_parts(os: &str, arch: &str) -> Self {
        let os = os.to_ascii_lowercase();
        let arch = arch.to_ascii_lowercase();

        let family = if os == "macos" {
            "darwin".to_string()
        } else if os.starts_with("mingw") || os.starts_with("cygwin") || os.starts_with("msys") {
            "windows".to_string()
        } else {
            os
        };

        let arch = match (family.as_str(), arch.as_str()) {
            ("windows", "x86_64") => "amd64".to_string(),
            ("darwin", "aarch64") => "arm64".to_string(),
            _ => arch,
        };

        Self(format!("{family}-{arch}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlatformId {
    fn from(value: &str) -> Self {
        Self(value.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linux_keeps_machine_name() {
        assert_eq!(PlatformId::from_parts("linux", "x86_64").as_str(), "linux-x86_64");
        assert_eq!(PlatformId::from_parts("Linux", "aarch64").as_str(), "linux-aarch64");
    }

    #[test]
    fn macos_reports_darwin() {
        assert_eq!(PlatformId::from_parts("macos", "aarch64").as_str(), "darwin-arm64");
        assert_eq!(PlatformId::from_parts("macos", "x86_64").as_str(), "darwin-x86_64");
    }

    #[test]
    fn windows_variants_collapse_to_amd64() {
        assert_eq!(PlatformId::from_parts("windows", "x86_64").as_str(), "windows-amd64");
        assert_eq!(
            PlatformId::from_parts("MINGW64_NT-10.0", "x86_64").as_str(),
            "windows-amd64"
        );
        assert_eq!(
            PlatformId::from_parts("CYGWIN_NT-10.0", "x86_64").as_str(),
            "windows-amd64"
        );
    }

    #[test]
    fn probe_is_stable() {
        assert_eq!(PlatformId::probe(), PlatformId::probe());
    }
}
