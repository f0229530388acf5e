//! Directory management and system integration helpers
//!
//! # Directory Structure
//!
//! - Config: `~/.config/drpf/` (`config.json`)
//! - Data: `~/.local/share/drpf/` (`rules.json` and its `.bak`)
//! - State: `~/.local/state/drpf/` (`drpf.log`, `audit.log`)
//!
//! On macOS all three resolve under `~/Library/Application Support/com.drpf.drpf/`.
//!
//! # Example
//!
//! ```
//! use drpf::utils::{default_rules_path, ensure_dirs};
//!
//! ensure_dirs().expect("Failed to create directories");
//!
//! if let Some(path) = default_rules_path() {
//!     // Open the rule store at `path`
//! }
//! ```

use crate::core::store::RULES_FILE_NAME;
use directories::ProjectDirs;
use network_interface::{NetworkInterface, NetworkInterfaceConfig};
use std::path::PathBuf;
use tracing::warn;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "drpf", "drpf")
}

pub fn get_config_dir() -> Option<PathBuf> {
    project_dirs().map(|pd| pd.config_dir().to_path_buf())
}

pub fn get_data_dir() -> Option<PathBuf> {
    project_dirs().map(|pd| pd.data_dir().to_path_buf())
}

/// State directory; platforms without one (macOS) use the local data dir.
pub fn get_state_dir() -> Option<PathBuf> {
    project_dirs().map(|pd| {
        pd.state_dir()
            .unwrap_or_else(|| pd.data_local_dir())
            .to_path_buf()
    })
}

/// Default location of the rule document.
pub fn default_rules_path() -> Option<PathBuf> {
    get_data_dir().map(|dir| dir.join(RULES_FILE_NAME))
}

pub fn ensure_dirs() -> std::io::Result<()> {
    let dirs = [get_config_dir(), get_data_dir(), get_state_dir()];

    #[cfg(unix)]
    {
        use std::fs::DirBuilder;
        use std::os::unix::fs::DirBuilderExt;

        let mut builder = DirBuilder::new();
        builder.mode(0o700);
        builder.recursive(true);

        for dir in dirs.into_iter().flatten() {
            builder.create(dir)?;
        }
    }

    #[cfg(not(unix))]
    {
        for dir in dirs.into_iter().flatten() {
            std::fs::create_dir_all(dir)?;
        }
    }

    Ok(())
}

/// Names of the system's network interfaces, sorted and deduplicated.
///
/// Interfaces with several addresses are reported once.
pub fn list_interfaces() -> Vec<String> {
    let mut interfaces: Vec<String> = match NetworkInterface::show() {
        Ok(list) => list.into_iter().map(|iface| iface.name).collect(),
        Err(e) => {
            warn!("Failed to enumerate network interfaces: {e}");
            Vec::new()
        }
    };
    interfaces.sort();
    interfaces.dedup();
    interfaces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_path_is_under_data_dir() {
        if let (Some(rules), Some(data)) = (default_rules_path(), get_data_dir()) {
            assert!(rules.starts_with(data));
            assert_eq!(rules.file_name().unwrap(), RULES_FILE_NAME);
        }
    }

    #[test]
    fn test_list_interfaces_sorted_unique() {
        let interfaces = list_interfaces();
        let mut expected = interfaces.clone();
        expected.sort();
        expected.dedup();
        assert_eq!(interfaces, expected);
    }
}
