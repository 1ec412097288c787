//! Starting the plotting process on demand

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use crate::config::LaunchConfig;
use crate::error::{Error, Result};

/// Executable looked up on `PATH` when no program is configured
pub const DEFAULT_PROGRAM: &str = "kst2";

/// Spawn the plotting process so that it listens under `name`
///
/// The child is detached from our stdio. It is not killed when the session
/// goes away: the plotting process owns its own lifetime.
pub(crate) fn spawn(name: &str, config: &LaunchConfig) -> Result<Child> {
    let program = resolve_program(config)?;

    let child = Command::new(&program)
        .arg(format!("--serverName={name}"))
        .args(config.args())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| Error::LaunchFailed(format!("{}: {e}", program.display())))?;

    tracing::info!(
        program = %program.display(),
        pid = child.id(),
        name,
        "launched plotting process"
    );
    Ok(child)
}

fn resolve_program(config: &LaunchConfig) -> Result<PathBuf> {
    if let Some(program) = config.program() {
        return Ok(program.to_path_buf());
    }
    find_default_program()
}

#[cfg(feature = "launch")]
fn find_default_program() -> Result<PathBuf> {
    which::which(DEFAULT_PROGRAM)
        .map_err(|e| Error::LaunchFailed(format!("{DEFAULT_PROGRAM} not found on PATH: {e}")))
}

#[cfg(not(feature = "launch"))]
fn find_default_program() -> Result<PathBuf> {
    Err(Error::LaunchFailed(
        "no program configured and PATH lookup is disabled".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_program_is_used() {
        let config = LaunchConfig::builder().program("/opt/kst/bin/kst2").build();
        assert_eq!(
            resolve_program(&config).unwrap(),
            PathBuf::from("/opt/kst/bin/kst2")
        );
    }

    #[test]
    fn test_missing_program_fails_to_spawn() {
        let config = LaunchConfig::builder()
            .program("/nonexistent/kstlink-test-binary")
            .build();
        assert!(matches!(spawn("S1", &config), Err(Error::LaunchFailed(_))));
    }
}
