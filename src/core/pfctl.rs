//! pf engine operations
//!
//! Everything here talks to the system through a [`Shell`], so the same code
//! drives the real `pfctl`, a dry run, or a scripted fake in tests.

use crate::core::error::{Error, Result};
use crate::core::firewall::FilterRule;
use crate::core::live_rules::{filter_live_output, parse_live_rules};
use crate::elevation::program_path;
use crate::shell::{Program, Shell};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use strum::{AsRefStr, Display};
use tracing::{error, info, warn};

pub const DEFAULT_ANCHOR_NAME: &str = "drpf";
pub const DEFAULT_ANCHOR_PATH: &str = "/etc/pf.anchors/drpf";
pub const DEFAULT_PF_CONF_PATH: &str = "/etc/pf.conf";
pub const DEFAULT_STARTUP_PLIST_PATH: &str = "/Library/LaunchDaemons/com.drpf.pfctl.plist";

/// Heading written above the anchor lines appended to pf.conf
const ANCHOR_COMMENT: &str = "# drpf anchor point";

/// Where drpf's rules live on the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PfPaths {
    pub anchor_name: String,
    pub anchor_path: PathBuf,
    pub pf_conf_path: PathBuf,
    pub startup_plist_path: PathBuf,
}

impl Default for PfPaths {
    fn default() -> Self {
        Self {
            anchor_name: DEFAULT_ANCHOR_NAME.to_string(),
            anchor_path: PathBuf::from(DEFAULT_ANCHOR_PATH),
            pf_conf_path: PathBuf::from(DEFAULT_PF_CONF_PATH),
            startup_plist_path: PathBuf::from(DEFAULT_STARTUP_PLIST_PATH),
        }
    }
}

impl PfPaths {
    /// Lines pf.conf needs so the anchor's rdr and filter rules are evaluated.
    pub fn anchor_lines(&self) -> [String; 3] {
        [
            format!("rdr-anchor \"{}\"", self.anchor_name),
            format!("anchor \"{}\"", self.anchor_name),
            format!(
                "load anchor \"{}\" from \"{}\"",
                self.anchor_name,
                self.anchor_path.display()
            ),
        ]
    }

    /// launchd label, taken from the plist file name.
    pub fn startup_label(&self) -> String {
        self.startup_plist_path
            .file_stem()
            .map_or_else(|| "com.drpf.pfctl".to_string(), |s| s.to_string_lossy().into_owned())
    }
}

/// Whether pf (or its startup job) is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum PfStatus {
    Enabled,
    Disabled,
}

/// Engine operations over a [`Shell`]
#[derive(Debug)]
pub struct PfControl<S> {
    shell: S,
    paths: PfPaths,
}

impl<S: Shell> PfControl<S> {
    pub fn new(shell: S, paths: PfPaths) -> Self {
        Self { shell, paths }
    }

    pub fn paths(&self) -> &PfPaths {
        &self.paths
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    fn anchor_path(&self) -> String {
        self.paths.anchor_path.to_string_lossy().into_owned()
    }

    async fn pfctl(&self, args: &[&str]) -> Result<String> {
        self.shell.execute(Program::Pfctl, args, None).await
    }

    /// Makes sure pf.conf references the drpf anchor.
    ///
    /// Only the missing lines are appended. Returns `true` if pf.conf was
    /// changed.
    pub async fn setup_pf_conf(&self) -> Result<bool> {
        let pf_conf = self.paths.pf_conf_path.to_string_lossy().into_owned();
        info!("Checking {pf_conf} for anchor rules");

        let content = self.shell.execute(Program::Cat, &[&pf_conf], None).await?;

        let missing: Vec<String> = self
            .paths
            .anchor_lines()
            .into_iter()
            .filter(|line| !content.lines().any(|existing| existing.trim() == line.as_str()))
            .collect();

        if missing.is_empty() {
            return Ok(false);
        }

        let mut append = format!("\n{ANCHOR_COMMENT}\n");
        for line in &missing {
            let _ = writeln!(append, "{line}");
        }

        info!("Appending {} anchor line(s) to {pf_conf}", missing.len());
        self.shell
            .execute(Program::Tee, &["-a", &pf_conf], Some(&append))
            .await
            .inspect_err(|e| error!("Failed to update {pf_conf}: {e}"))?;

        Ok(true)
    }

    /// Installs compiled rule text as the anchor file and loads it.
    ///
    /// Returns pfctl's output.
    pub async fn apply_rules(&self, rules: &str) -> Result<String> {
        let anchor_path = self.anchor_path();
        let staged = stage_file(rules)?;
        let staged_path = staged.path().to_string_lossy().into_owned();
        info!("Installing rules to {anchor_path}");

        self.shell
            .execute(
                Program::Install,
                &["-m", "644", &staged_path, &anchor_path],
                None,
            )
            .await?;

        info!("Loading anchor {}", self.paths.anchor_name);
        let output = self
            .pfctl(&["-a", &self.paths.anchor_name, "-f", &anchor_path])
            .await?;
        info!("Rules applied");
        Ok(output)
    }

    /// Reloads the main ruleset from pf.conf.
    ///
    /// The running ruleset only evaluates anchors pf.conf referenced when it
    /// was loaded, so this is required after [`Self::setup_pf_conf`] appended
    /// the anchor lines.
    pub async fn reload_pf_conf(&self) -> Result<String> {
        let pf_conf = self.paths.pf_conf_path.to_string_lossy().into_owned();
        info!("Reloading main ruleset from {pf_conf}");
        self.pfctl(&["-f", &pf_conf])
            .await
            .inspect_err(|e| error!("Failed to reload {pf_conf}: {e}"))
    }

    /// Rules pf currently has loaded in the anchor, ALTQ noise removed.
    pub async fn current_rules(&self) -> Result<String> {
        let output = self
            .pfctl(&["-a", &self.paths.anchor_name, "-s", "rules"])
            .await?;
        Ok(filter_live_output(&output))
    }

    /// [`Self::current_rules`] parsed into filter rules.
    pub async fn live_rules(&self) -> Result<Vec<FilterRule>> {
        Ok(parse_live_rules(&self.current_rules().await?))
    }

    /// Reads pf's enabled state from `pfctl -s info`.
    pub async fn status(&self) -> Result<PfStatus> {
        match self.pfctl(&["-s", "info"]).await {
            Ok(output) => Ok(parse_status(&output)),
            Err(Error::Command { output, .. }) if output.contains("pf not running") => {
                Ok(PfStatus::Disabled)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn enable(&self) -> Result<String> {
        info!("Enabling pf");
        self.pfctl(&["-e"]).await
    }

    pub async fn disable(&self) -> Result<String> {
        info!("Disabling pf");
        self.pfctl(&["-d"]).await
    }

    /// Raw `pfctl -s info` statistics.
    pub async fn info(&self) -> Result<String> {
        self.pfctl(&["-s", "info"]).await
    }

    /// Enabled when the launchd plist is installed.
    pub async fn startup_status(&self) -> Result<PfStatus> {
        let path = &self.paths.startup_plist_path;
        match tokio::fs::try_exists(path).await {
            Ok(true) => Ok(PfStatus::Enabled),
            Ok(false) => Ok(PfStatus::Disabled),
            Err(e) => Err(Error::file("check", path, e)),
        }
    }

    /// Installs a launchd job that runs `pfctl -e` at boot and loads it.
    pub async fn enable_on_startup(&self) -> Result<String> {
        let plist_path = self.paths.startup_plist_path.to_string_lossy().into_owned();
        info!("Enabling pf on startup via {plist_path}");

        let staged = stage_file(&startup_plist(
            &self.paths.startup_label(),
            &program_path(Program::Pfctl),
        ))?;
        let staged_path = staged.path().to_string_lossy().into_owned();

        self.shell
            .execute(
                Program::Install,
                &["-m", "644", &staged_path, &plist_path],
                None,
            )
            .await?;

        self.shell
            .execute(Program::Launchctl, &["load", "-w", &plist_path], None)
            .await
    }

    /// Unloads and removes the launchd job.
    ///
    /// An unload failure (job not loaded) is logged and ignored.
    pub async fn disable_on_startup(&self) -> Result<String> {
        let plist_path = self.paths.startup_plist_path.to_string_lossy().into_owned();
        info!("Disabling pf on startup by removing {plist_path}");

        if let Err(e) = self
            .shell
            .execute(Program::Launchctl, &["unload", "-w", &plist_path], None)
            .await
        {
            warn!("launchctl unload failed, continuing: {e}");
        }

        self.shell.execute(Program::Rm, &[&plist_path], None).await
    }

    /// Contents of the installed anchor file, empty if nothing is installed.
    pub async fn installed_anchor_text(&self) -> Result<String> {
        read_optional(&self.paths.anchor_path).await
    }
}

/// `Status: Enabled for 0 days ...` means enabled; anything else disabled.
pub fn parse_status(info: &str) -> PfStatus {
    let enabled = info.lines().any(|line| {
        line.strip_prefix("Status:")
            .is_some_and(|status| status.trim_start().starts_with("Enabled"))
    });

    if enabled {
        PfStatus::Enabled
    } else {
        PfStatus::Disabled
    }
}

/// launchd job definition enabling pf at boot.
pub fn startup_plist(label: &str, pfctl: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{label}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{pfctl}</string>
        <string>-e</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>StandardErrorPath</key>
    <string>/tmp/{label}.stderr</string>
    <key>StandardOutPath</key>
    <string>/tmp/{label}.stdout</string>
</dict>
</plist>
"#
    )
}

/// Writes `contents` to a private temp file for an elevated `install`.
///
/// The file is removed when the returned handle drops.
fn stage_file(contents: &str) -> Result<tempfile::NamedTempFile> {
    let mut staged = tempfile::Builder::new()
        .prefix("drpf-")
        .suffix(".conf")
        .tempfile()?;
    staged.write_all(contents.as_bytes())?;
    staged.flush()?;
    Ok(staged)
}

async fn read_optional(path: &Path) -> Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(Error::file("read", path, e)),
    }
}
