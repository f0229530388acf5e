//! Privilege elevation for system operations
//!
//! drpf runs as an unprivileged user and only elevates the programs named by
//! [`Program`]: `pfctl` for loading and querying rules, `install`, `cat`,
//! `tee` and `rm` for files under `/etc` and `/Library`, and `launchctl` for
//! the startup daemon.
//!
//! # Elevation Strategy
//!
//! - Root runs the program directly.
//! - `run0` when available (no SUID).
//! - `sudo` when stdin is a terminal.
//! - `pkexec` otherwise.
//!
//! # Environment Variables
//!
//! - `DRPF_ELEVATION_METHOD`: force `sudo`, `run0` or `pkexec`. Useful with
//!   sudoers NOPASSWD rules, e.g. `DRPF_ELEVATION_METHOD=sudo drpf apply`.
//! - `DRPF_TEST_NO_ELEVATION`: run the program directly (testing only).
//! - `DRPF_PFCTL_COMMAND`: path of the pfctl binary to run.
//!
//! # Example
//!
//! ```no_run
//! use drpf::elevation::create_elevated_command;
//! use drpf::shell::Program;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut cmd = create_elevated_command(Program::Pfctl, &["-s", "info"])?;
//! let output = cmd.output().await?;
//! # Ok(())
//! # }
//! ```

use crate::shell::Program;
use std::io;
use strum::{AsRefStr, EnumString};
use tokio::process::Command;

/// pfctl location baked in at build time (`DRPF_SYSTEM_PFCTL_PATH`).
const SYSTEM_PFCTL_PATH: &str = match option_env!("DRPF_SYSTEM_PFCTL_PATH") {
    Some(path) => path,
    None => "/sbin/pfctl",
};

/// Error type for privilege elevation operations
#[derive(Debug, thiserror::Error)]
pub enum ElevationError {
    /// No terminal for sudo and pkexec is not installed
    #[error("pkexec not found - run drpf from a terminal or set DRPF_ELEVATION_METHOD")]
    PkexecNotFound,

    /// Requested elevation method is not available (binary not found)
    #[error("Elevation method '{0}' is not available (binary not found)")]
    MethodNotAvailable(String),

    /// Invalid value for `DRPF_ELEVATION_METHOD`
    #[error("Invalid DRPF_ELEVATION_METHOD '{0}'. Valid options: sudo, run0, pkexec")]
    InvalidMethod(String),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Supported elevation front ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
enum ElevationMethod {
    Sudo,
    Run0,
    Pkexec,
}

impl ElevationMethod {
    /// Reads `DRPF_ELEVATION_METHOD`. Unset or empty means automatic detection.
    fn from_env() -> Result<Option<Self>, ElevationError> {
        match std::env::var("DRPF_ELEVATION_METHOD") {
            Ok(value) if !value.trim().is_empty() => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ElevationError::InvalidMethod(value.to_lowercase())),
            _ => Ok(None),
        }
    }

    fn command(self, program: &str, args: &[&str]) -> Result<Command, ElevationError> {
        let name = self.as_ref();
        if !binary_exists(name) {
            return Err(ElevationError::MethodNotAvailable(name.to_string()));
        }
        let mut cmd = Command::new(name);
        cmd.arg(program).args(args);
        Ok(cmd)
    }
}

/// Checks if a binary exists in PATH
fn binary_exists(name: &str) -> bool {
    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths).find_map(|dir| {
                let full_path = dir.join(name);
                full_path.is_file().then_some(full_path)
            })
        })
        .is_some()
}

/// Resolves the executable for an allowlisted program.
pub fn program_path(program: Program) -> String {
    match program {
        Program::Pfctl => std::env::var("DRPF_PFCTL_COMMAND")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| SYSTEM_PFCTL_PATH.to_string()),
        other => other.as_ref().to_string(),
    }
}

fn direct(program: &str, args: &[&str]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd
}

fn build_elevated_command(program: &str, args: &[&str]) -> Result<Command, ElevationError> {
    use std::os::fd::AsFd;

    // 1. Strict Test Mode Override (Highest Priority)
    if std::env::var("DRPF_TEST_NO_ELEVATION").is_ok() {
        return Ok(direct(program, args));
    }

    // An invalid override is an error even for root
    let forced = ElevationMethod::from_env()?;

    // 2. Direct Root Execution
    if nix::unistd::getuid().is_root() {
        return Ok(direct(program, args));
    }

    // 3. Explicit elevation method override
    if let Some(method) = forced {
        return method.command(program, args);
    }

    // 4. Automatic detection
    if binary_exists("run0") {
        return ElevationMethod::Run0.command(program, args);
    }

    let is_atty = nix::unistd::isatty(std::io::stdin().as_fd()).unwrap_or(false);
    if is_atty {
        let mut cmd = Command::new("sudo");
        cmd.arg(program).args(args);
        Ok(cmd)
    } else {
        if !binary_exists("pkexec") {
            return Err(ElevationError::PkexecNotFound);
        }
        let mut cmd = Command::new("pkexec");
        cmd.arg(program).args(args);
        Ok(cmd)
    }
}

/// Creates an elevated command for an allowlisted program.
///
/// Arguments are passed directly without shell interpretation. Callers must
/// validate paths and rule input before calling this.
///
/// # Errors
///
/// Returns [`ElevationError`] when `DRPF_ELEVATION_METHOD` is invalid or no
/// elevation front end is available.
pub fn create_elevated_command(program: Program, args: &[&str]) -> Result<Command, ElevationError> {
    build_elevated_command(&program_path(program), args)
}
