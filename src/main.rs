/*============================================================
  Synavera Project: Syn-Tools
  Module: syntools_core::main
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Entry point for Syn-Tools Core. Reads a tools manifest and
    provisions the declared toolchains and build dependencies
    beneath the tools root.

  Security / Safety Notes:
    Operates within user privileges. Performs HTTP(S) GET
    requests and executes `tar` only.

  Dependencies:
    clap for CLI parsing, chrono for session stamps, tokio for
    the async runtime.

  Operational Scope:
    Invoked by board build scripts before configuration, or by
    operators preparing a fresh workstation or CI runner.

  Revision History:
    2025-11-12 COD  Authored Syn-Tools Core runtime.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Result-first error handling with deterministic exits
    - Structured logging following Synavera cadence
    - Configurable execution via CLI and config file
============================================================*/

mod config;
mod download;
mod error;
mod extract;
mod installer;
mod lock;
mod logger;
mod manifest;
mod mirror;
mod platform;
mod verify;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use clap::{ArgAction, Parser};

use config::SyntoolsConfig;
use download::HttpTransport;
use error::{Result, SyntoolsError};
use installer::{EntryStatus, InstallReport, Installer, CC_PREFIX_ENV, EXEC_PATH_ENV};
use lock::InstallLock;
use logger::Logger;
use mirror::IpApiLocator;
use platform::PlatformId;

/// Command-line arguments for Syn-Tools-Core.
#[derive(Debug, Parser)]
#[command(
    name = "Syn-Tools-Core",
    version,
    author = "Synavera Systems",
    about = "Manifest-driven toolchain installer"
)]
struct Cli {
    /// Path to the tools manifest (JSON).
    #[arg(long, value_name = "PATH")]
    json: PathBuf,
    /// Override configuration file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Override the tools root (takes precedence over RISCV_TOOLS_PATH).
    #[arg(long, value_name = "PATH")]
    tools_root: Option<PathBuf>,
    /// Explicit log file path.
    #[arg(long, value_name = "PATH", conflicts_with = "no_log_file")]
    log: Option<PathBuf>,
    /// Do not write a session log file.
    #[arg(long, action = ArgAction::SetTrue)]
    no_log_file: bool,
    /// Write shell `export` lines for the toolchain environment to PATH on success.
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,
    /// Enable verbose (debug) logging.
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => {
            println!("[Syn-Tools] {}", err);
            err.exit_code()
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = SyntoolsConfig::load_from_optional_path(cli.config.as_deref())?;
    let tools_root = match cli.tools_root.clone() {
        Some(root) => root,
        None => config.tools_root()?,
    };

    let log_path = if cli.no_log_file {
        None
    } else {
        let session_stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        cli.log.clone().or_else(|| {
            Some(
                config
                    .log_dir(&tools_root)
                    .join(format!("install_{session_stamp}.log")),
            )
        })
    };
    let logger = Logger::new(log_path, cli.verbose)?;
    logger.info("INIT", "Syn-Tools Core awakening.");

    // Once the logger exists, fatal errors are recorded and the log is sealed.
    let code = match provision(&cli, &config, tools_root, &logger).await {
        Ok(code) => code,
        Err(err) => {
            logger.error(err.kind(), err.to_string());
            err.exit_code()
        }
    };
    logger.finalize()?;
    Ok(code)
}

async fn provision(
    cli: &Cli,
    config: &SyntoolsConfig,
    tools_root: PathBuf,
    logger: &Logger,
) -> Result<ExitCode> {
    let lock = InstallLock::acquire(&tools_root)?;
    logger.debug("LOCK", format!("Holding {}", lock.path().display()));

    let platform = PlatformId::probe();
    logger.info(
        "PLATFORM",
        format!("Platform {platform}; tools root {}", tools_root.display()),
    );

    let transport = HttpTransport::new(&config.download)?;
    let locator = IpApiLocator::new(&config.mirror)?;
    let mut installer = Installer::new(tools_root, platform, transport, locator, &config.download);

    let report = installer.install(&cli.json, logger).await?;
    print_summary(&report, logger);
    logger.debug(
        "VERIFY",
        format!(
            "{} digest computation(s) this run",
            installer.verifier().hash_invocations()
        ),
    );

    if !report.is_success() {
        logger.error("COMPLETE", "Failed to install tools.");
        return Ok(ExitCode::from(2));
    }
    if let Some(path) = &cli.env_file {
        write_env_file(path, &report)?;
        logger.info("ENV", format!("Environment written to {}", path.display()));
    }
    logger.info("COMPLETE", "Tools installed successfully.");
    Ok(ExitCode::SUCCESS)
}

fn print_summary(report: &InstallReport, logger: &Logger) {
    for outcome in &report.outcomes {
        logger.debug(
            "SUMMARY",
            format!("{} -> {}", outcome.tool_name, outcome.export_path.display()),
        );
    }
    logger.info(
        "SUMMARY",
        format!(
            "installed={} present={} failed={}",
            report.count(EntryStatus::Installed),
            report.count(EntryStatus::AlreadyInstalled),
            report.failed()
        ),
    );
    for key in [EXEC_PATH_ENV, CC_PREFIX_ENV] {
        if let Some(value) = report.env_value(key) {
            logger.info("ENV", format!("{key}={value}"));
        }
    }
}

fn write_env_file(path: &Path, report: &InstallReport) -> Result<()> {
    let mut body = String::new();
    for binding in &report.env {
        body.push_str(&format!("export {}={}\n", binding.key, shell_quote(&binding.value)));
    }
    std::fs::write(path, body).map_err(|err| {
        SyntoolsError::Filesystem(format!("Failed to write {}: {err}", path.display()))
    })
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
