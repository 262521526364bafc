/*============================================================
  Synavera Project: Syn-Tools
  Module: syntools_core::manifest
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Load the declarative tools manifest and validate it into
    strongly-typed entries before any network activity.

  Security / Safety Notes:
    Export path segments are rejected if they could escape the
    tools root (separators, `..`, empty components).

  Dependencies:
    serde + serde_json for parsing, reqwest::Url for URL checks.

  Operational Scope:
    Consumed by the installer; immutable once loaded.

  Revision History:
    2025-11-12 COD  Rebuilt manifest module as input loader.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Deterministic ordering preserved from the document
    - Eager validation with explicit error paths
============================================================*/

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::Deserialize;

use crate::error::{Result, SyntoolsError};
use crate::platform::PlatformId;

/// The only manifest schema this installer understands.
pub const SUPPORTED_SCHEMA: &str = "1.0.0";

const SHA256_HEX_LEN: usize = 64;

/// Validated manifest document.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub schema_version: String,
    pub tools: Vec<ToolEntry>,
}

/// One installable unit.
#[derive(Debug, Clone)]
pub struct ToolEntry {
    pub attribute: ToolAttribute,
    pub tool_name: String,
    pub description: Option<String>,
    pub export_paths: Vec<String>,
    pub versions: Vec<PlatformVariant>,
}

impl ToolEntry {
    /// Directory name the extracted archive must end up with.
    pub fn canonical_name(&self) -> &str {
        // Non-empty by validation.
        &self.export_paths[0]
    }

    /// `tools_root/tools/<export_paths...>`.
    pub fn export_path(&self, tools_root: &Path) -> PathBuf {
        let mut path = tools_root.join("tools");
        for segment in &self.export_paths {
            path.push(segment);
        }
        path
    }

    /// Variant declared for `platform`, if any. The first match wins.
    pub fn variant_for(&self, platform: &PlatformId) -> Option<&PlatformVariant> {
        self.versions
            .iter()
            .find(|variant| variant.platform_id == platform.as_str())
    }
}

/// Role of a manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolAttribute {
    Toolchain,
    BuildDependency,
    /// Unrecognized value, rejected when the entry is dispatched.
    Other(String),
}

impl From<String> for ToolAttribute {
    fn from(value: String) -> Self {
        match value.as_str() {
            "toolchain" => ToolAttribute::Toolchain,
            "build_dependency" => ToolAttribute::BuildDependency,
            _ => ToolAttribute::Other(value),
        }
    }
}

impl fmt::Display for ToolAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolAttribute::Toolchain => f.write_str("toolchain"),
            ToolAttribute::BuildDependency => f.write_str("build_dependency"),
            ToolAttribute::Other(raw) => f.write_str(raw),
        }
    }
}

/// Download region key used inside the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorRegion {
    Default,
    Cn,
}

/// One row per supported platform identifier.
#[derive(Debug, Clone)]
pub struct PlatformVariant {
    pub platform_id: String,
    pub mirrors: BTreeMap<MirrorRegion, MirrorTarget>,
}

impl PlatformVariant {
    pub fn mirror(&self, region: MirrorRegion) -> Option<&MirrorTarget> {
        self.mirrors.get(&region)
    }
}

/// Concrete artifact location with its integrity expectations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorTarget {
    pub url: String,
    pub expected_size_bytes: u64,
    pub expected_hash: String,
}

impl MirrorTarget {
    /// Final path segment of the URL, used as the staging file name.
    pub fn file_name(&self) -> Result<String> {
        file_name_from_url(&self.url)
    }
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    version: String,
    tools: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawTool {
    attribute: String,
    tool_name: String,
    #[serde(default)]
    description: Option<String>,
    export_paths: Vec<String>,
    version: Vec<BTreeMap<String, RawPlatformDetails>>,
}

#[derive(Debug, Deserialize)]
struct RawPlatformDetails {
    urls: Vec<RawUrl>,
}

#[derive(Debug, Deserialize)]
struct RawUrl {
    region: MirrorRegion,
    url: String,
    size: u64,
    sha256: String,
}

/// Read, parse and validate the manifest at `path`.
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    if !path.exists() {
        return Err(SyntoolsError::ManifestNotFound {
            path: path.to_path_buf(),
        });
    }
    let raw = std::fs::read_to_string(path).map_err(|err| {
        SyntoolsError::Filesystem(format!(
            "Failed to read manifest {}: {err}",
            path.display()
        ))
    })?;
    parse_manifest(&raw)
}

/// Parse and validate manifest text.
///
/// The schema version is checked before the tool entries are decoded so an
/// unsupported document is reported as such even if its body differs.
pub fn parse_manifest(raw: &str) -> Result<Manifest> {
    let document: RawManifest = serde_json::from_str(raw)
        .map_err(|err| SyntoolsError::ManifestInvalid(format!("malformed JSON: {err}")))?;

    if document.version != SUPPORTED_SCHEMA {
        return Err(SyntoolsError::UnsupportedSchema {
            found: document.version,
            expected: SUPPORTED_SCHEMA.to_string(),
        });
    }

    let mut tools = Vec::with_capacity(document.tools.len());
    for (index, value) in document.tools.into_iter().enumerate() {
        let raw_tool: RawTool = serde_json::from_value(value).map_err(|err| {
            SyntoolsError::ManifestInvalid(format!("tools[{index}]: {err}"))
        })?;
        tools.push(validate_tool(index, raw_tool)?);
    }

    Ok(Manifest {
        schema_version: document.version,
        tools,
    })
}

fn validate_tool(index: usize, raw: RawTool) -> Result<ToolEntry> {
    let label = format!("tools[{index}] ({})", raw.tool_name);
    let invalid = |detail: String| SyntoolsError::ManifestInvalid(format!("{label}: {detail}"));

    if raw.export_paths.is_empty() {
        return Err(invalid("export_paths must not be empty".into()));
    }
    for segment in &raw.export_paths {
        if segment.is_empty()
            || segment == "."
            || segment == ".."
            || segment.contains('/')
            || segment.contains('\\')
        {
            return Err(invalid(format!("invalid export path segment `{segment}`")));
        }
    }

    let mut versions = Vec::new();
    for platform_map in raw.version {
        for (platform_id, details) in platform_map {
            let mut mirrors = BTreeMap::new();
            for entry in details.urls {
                let target = validate_target(&entry).map_err(|detail| {
                    invalid(format!("{platform_id}/{:?}: {detail}", entry.region))
                })?;
                if mirrors.insert(entry.region, target).is_some() {
                    return Err(invalid(format!(
                        "{platform_id}: region {:?} declared twice",
                        entry.region
                    )));
                }
            }
            if !mirrors.contains_key(&MirrorRegion::Default) {
                return Err(invalid(format!(
                    "{platform_id}: missing `default` region"
                )));
            }
            versions.push(PlatformVariant {
                platform_id: platform_id.to_ascii_lowercase(),
                mirrors,
            });
        }
    }

    Ok(ToolEntry {
        attribute: ToolAttribute::from(raw.attribute),
        tool_name: raw.tool_name,
        description: raw.description,
        export_paths: raw.export_paths,
        versions,
    })
}

fn validate_target(entry: &RawUrl) -> std::result::Result<MirrorTarget, String> {
    file_name_from_url(&entry.url).map_err(|err| err.to_string())?;
    if entry.sha256.len() != SHA256_HEX_LEN
        || !entry.sha256.chars().all(|c| c.is_ascii_hexdigit())
    {
        return Err(format!("sha256 `{}` is not a 64 digit hex digest", entry.sha256));
    }
    Ok(MirrorTarget {
        url: entry.url.clone(),
        expected_size_bytes: entry.size,
        expected_hash: entry.sha256.to_ascii_lowercase(),
    })
}

fn file_name_from_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|err| SyntoolsError::ManifestInvalid(format!("invalid url `{url}`: {err}")))?;
    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SyntoolsError::ManifestInvalid(format!("url `{url}` has no file name")))
}
