//! Execution of privileged system commands
//!
//! Engine operations never spawn processes themselves; they go through a
//! [`Shell`]. [`ElevatedShell`] runs the command with elevation,
//! [`DryRunShell`] only logs it.

use crate::core::error::{Error, Result};
use crate::elevation::create_elevated_command;
use std::process::Stdio;
use strum::{AsRefStr, Display, EnumIter};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Programs drpf is allowed to run with elevated privileges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Program {
    Pfctl,
    Install,
    Cat,
    Tee,
    Launchctl,
    Rm,
}

/// Runs system commands on behalf of the engine operations.
#[allow(async_fn_in_trait)]
pub trait Shell {
    /// Runs `program` with `args`, feeding `stdin` if given.
    ///
    /// Returns stdout followed by stderr. A non-zero exit is
    /// [`Error::Command`] carrying the same combined output.
    async fn execute(&self, program: Program, args: &[&str], stdin: Option<&str>) -> Result<String>;
}

/// Shell that runs commands through the platform elevation front end.
#[derive(Debug, Default, Clone, Copy)]
pub struct ElevatedShell;

impl Shell for ElevatedShell {
    async fn execute(&self, program: Program, args: &[&str], stdin: Option<&str>) -> Result<String> {
        debug!("Executing {} {}", program, args.join(" "));

        let mut cmd = create_elevated_command(program, args)?;
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        if stdin.is_some() {
            cmd.stdin(Stdio::piped());
        }

        let mut child = cmd.spawn()?;

        if let Some(input) = stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            pipe.write_all(input.as_bytes()).await?;
            // Dropping the pipe closes it so the child sees EOF
            drop(pipe);
        }

        let output = child.wait_with_output().await?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(combined)
        } else {
            warn!(
                "{} exited with {:?}: {}",
                program,
                output.status.code(),
                combined.trim()
            );
            Err(Error::Command {
                program: program.to_string(),
                output: combined,
                exit_code: output.status.code(),
            })
        }
    }
}

/// Shell that logs commands without running them.
///
/// Every command "succeeds" with empty output.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunShell;

impl Shell for DryRunShell {
    async fn execute(&self, program: Program, args: &[&str], stdin: Option<&str>) -> Result<String> {
        info!("[dry-run] {} {}", program, args.join(" "));
        if let Some(input) = stdin {
            debug!("[dry-run] stdin:\n{input}");
        }
        Ok(String::new())
    }
}
