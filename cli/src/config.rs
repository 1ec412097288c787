use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use kstlink::{ExportOptions, LaunchConfig, RetryPolicy, SessionConfig};

use crate::cli::SessionArgs;

/// TOML config file structure
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Connection settings
    pub session: SessionSection,

    /// Defaults for image export
    pub export: Option<ExportOptions>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSection {
    pub name: Option<String>,
    /// Seconds
    pub call_timeout: Option<u64>,
    /// Seconds
    pub write_timeout: Option<u64>,
    pub attempts: Option<u32>,
    pub launch: Option<bool>,
    pub program: Option<PathBuf>,
    pub args: Option<Vec<String>>,
}

/// Merged configuration from file + CLI
#[derive(Debug)]
pub struct MergedConfig {
    pub session: SessionConfig,
    pub export: ExportOptions,
}

/// Load config from file
pub fn load_config(path: Option<&Path>) -> Result<FileConfig> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file: {}", path.display()))?;
            let config: FileConfig = toml::from_str(&content)
                .with_context(|| format!("failed to parse config file: {}", path.display()))?;
            Ok(config)
        }
        None => Ok(FileConfig::default()),
    }
}

/// Merge file config with CLI args (CLI takes precedence)
///
/// `default_name` is used when neither names a session.
pub fn merge_config(
    file: FileConfig,
    cli: &SessionArgs,
    default_name: &str,
) -> Result<MergedConfig> {
    let section = file.session;

    // Name: CLI > file > caller default
    let name = cli
        .name
        .clone()
        .or(section.name)
        .unwrap_or_else(|| default_name.to_string());
    if name.is_empty() {
        anyhow::bail!("session name must not be empty");
    }

    let mut builder = SessionConfig::builder().name(name);

    if let Some(secs) = cli.timeout.or(section.call_timeout) {
        if secs == 0 {
            anyhow::bail!("call timeout must be at least one second");
        }
        builder = builder.call_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = section.write_timeout {
        builder = builder.write_timeout(Duration::from_secs(secs));
    }
    if let Some(attempts) = cli.attempts.or(section.attempts) {
        builder = builder.retry(RetryPolicy::builder().attempts(attempts).build());
    }

    // Launch: the flag turns it on, the file may too
    if cli.launch || section.launch.unwrap_or(false) {
        let mut launch = LaunchConfig::builder();
        if let Some(program) = cli.program.clone().or(section.program) {
            launch = launch.program(program);
        }
        if let Some(args) = section.args {
            launch = launch.args(args);
        }
        builder = builder.launch(launch.build());
    }

    let export = file.export.unwrap_or_default();
    export
        .validate()
        .context("invalid [export] section in config file")?;

    Ok(MergedConfig {
        session: builder.build(),
        export,
    })
}
