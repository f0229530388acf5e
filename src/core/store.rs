//! Rule document persistence
//!
//! [`RuleStore`] owns the single in-memory [`RuleDocument`] and the path of
//! the default document file (`rules.json`). The file on disk is the unit of
//! truth: every mutation except a move reloads the document first, so edits
//! made out of band (an import, another drpf invocation) are never clobbered
//! by a stale copy. The price is that unsaved in-memory edits are discarded by
//! the next mutation.
//!
//! # Concurrency
//!
//! No lock is taken. Two processes mutating the same file race on the
//! read-then-write and the later save wins. Writes themselves are atomic
//! (temp file + rename), so a crash never leaves a truncated document.
//!
//! # Import
//!
//! [`RuleStore::import`] copies the source bytes verbatim and only then
//! parses them. A malformed import leaves the bad bytes in place and the
//! previous document in `rules.json.bak`; the backup is the safety net.

use crate::core::error::{Error, Result};
use crate::core::firewall::{FilterRule, PortForwardRule, RuleDocument, move_within};
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// File name of the default rule document inside the data directory.
pub const RULES_FILE_NAME: &str = "rules.json";

/// Owning handle over the rule document and its backing file
#[derive(Debug)]
pub struct RuleStore {
    path: PathBuf,
    document: RuleDocument,
}

impl RuleStore {
    /// Creates a store for `path` holding an empty document. Nothing is read.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            document: RuleDocument::default(),
        }
    }

    /// Creates a store for `path` and loads it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self::new(path);
        store.load()?;
        Ok(store)
    }

    /// Path of the default document file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path the previous document is moved to by [`RuleStore::import`].
    pub fn backup_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".bak");
        PathBuf::from(name)
    }

    pub fn document(&self) -> &RuleDocument {
        &self.document
    }

    /// Loads the default document file.
    ///
    /// A missing file is not an error: the store switches to an empty
    /// document which is created on the next save.
    pub fn load(&mut self) -> Result<()> {
        let json = match std::fs::read(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "Rule file {} not found, starting with an empty document",
                    self.path.display()
                );
                self.document = RuleDocument::default();
                return Ok(());
            }
            Err(e) => {
                error!("Failed to read rule file {}: {e}", self.path.display());
                return Err(Error::file("read", &self.path, e));
            }
        };

        self.document = serde_json::from_slice(&json).map_err(|e| {
            error!("Failed to parse rule file {}: {e}", self.path.display());
            e
        })?;

        info!(
            "Loaded {} filter and {} rdr rules from {}",
            self.document.filter_rules.len(),
            self.document.rdr_rules.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Saves the in-memory document to the default file.
    pub fn save(&self) -> Result<()> {
        self.write_document(&self.path)?;
        info!("Saved rules to {}", self.path.display());
        Ok(())
    }

    /// Saves the in-memory document to another file. The default path is
    /// unchanged.
    pub fn save_as(&self, path: &Path) -> Result<()> {
        self.write_document(path)?;
        info!("Saved rules to {}", path.display());
        Ok(())
    }

    /// Exports the in-memory document for use on another machine.
    pub fn export(&self, path: &Path) -> Result<()> {
        info!("Exporting rules to {}", path.display());
        self.save_as(path)
    }

    /// Replaces the default file with the bytes of `source` and loads it.
    ///
    /// An existing default file is first renamed to [`RuleStore::backup_path`],
    /// replacing any earlier backup. The source is not validated before it is
    /// written; if it is not a valid document the returned load error is the
    /// only signal and the backup holds the previous rules.
    pub fn import(&mut self, source: &Path) -> Result<()> {
        let data = std::fs::read(source).map_err(|e| {
            error!("Failed to read import file {}: {e}", source.display());
            Error::file("read import file", source, e)
        })?;

        let exists = self
            .path
            .try_exists()
            .map_err(|e| Error::file("check", &self.path, e))?;
        if exists {
            let backup = self.backup_path();
            std::fs::rename(&self.path, &backup).map_err(|e| {
                error!("Failed to create backup {}: {e}", backup.display());
                Error::file("create backup", &backup, e)
            })?;
            info!("Previous rules backed up to {}", backup.display());
        }

        write_atomic(&self.path, &data)?;
        info!("Imported {} into {}", source.display(), self.path.display());

        self.load()
    }

    pub fn add_filter_rule(&mut self, rule: FilterRule) -> Result<()> {
        self.load()?;
        info!("Adding filter rule: {rule:?}");
        self.document.filter_rules.push(rule);
        self.save()
    }

    pub fn update_filter_rule(&mut self, index: usize, rule: FilterRule) -> Result<()> {
        self.load()?;
        let slot = checked_slot(&mut self.document.filter_rules, index)?;
        info!("Updating filter rule {index}: {rule:?}");
        *slot = rule;
        self.save()
    }

    /// Removes the filter rule at `index`; later rules shift down by one.
    pub fn delete_filter_rule(&mut self, index: usize) -> Result<FilterRule> {
        self.load()?;
        checked_slot(&mut self.document.filter_rules, index)?;
        let removed = self.document.filter_rules.remove(index);
        info!("Deleted filter rule {index}: {removed:?}");
        self.save()?;
        Ok(removed)
    }

    /// Reorders filter rules in memory only. Call [`RuleStore::save`] to keep
    /// the new order. Out-of-range indices are ignored.
    pub fn move_filter_rule(&mut self, from: usize, to: usize) {
        move_within(&mut self.document.filter_rules, from, to);
    }

    pub fn add_port_forward_rule(&mut self, rule: PortForwardRule) -> Result<()> {
        self.load()?;
        info!("Adding rdr rule: {rule:?}");
        self.document.rdr_rules.push(rule);
        self.save()
    }

    pub fn update_port_forward_rule(&mut self, index: usize, rule: PortForwardRule) -> Result<()> {
        self.load()?;
        let slot = checked_slot(&mut self.document.rdr_rules, index)?;
        info!("Updating rdr rule {index}: {rule:?}");
        *slot = rule;
        self.save()
    }

    /// Removes the port-forward rule at `index`; later rules shift down by one.
    pub fn delete_port_forward_rule(&mut self, index: usize) -> Result<PortForwardRule> {
        self.load()?;
        checked_slot(&mut self.document.rdr_rules, index)?;
        let removed = self.document.rdr_rules.remove(index);
        info!("Deleted rdr rule {index}: {removed:?}");
        self.save()?;
        Ok(removed)
    }

    /// Reorders port-forward rules in memory only.
    pub fn move_port_forward_rule(&mut self, from: usize, to: usize) {
        move_within(&mut self.document.rdr_rules, from, to);
    }

    /// Compiles the in-memory document to pf rule text.
    pub fn generate_compiled_text(&self) -> String {
        self.document.to_pf_conf()
    }

    fn write_document(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.document)?;
        write_atomic(path, json.as_bytes())
    }
}

fn checked_slot<T>(items: &mut [T], index: usize) -> Result<&mut T> {
    let len = items.len();
    items
        .get_mut(index)
        .ok_or(Error::InvalidIndex { index, len })
}

/// Writes `data` to `path` through a temporary file in the same directory
/// followed by a rename, creating parent directories as needed.
///
/// The temporary file is created with mode 0o600 before any data is written.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| {
        error!("Failed to create directory {}: {e}", dir.display());
        Error::file("create directory", &dir, e)
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(&dir)
        .map_err(|e| Error::file("create temp file in", &dir, e))?;
    temp.write_all(data)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| Error::file("write", temp.path().to_path_buf(), e))?;

    temp.persist(path).map_err(|e| {
        error!("Failed to write {}: {}", path.display(), e.error);
        Error::file("write", path, e.error)
    })?;

    Ok(())
}
