use std::path::PathBuf;
use thiserror::Error;

/// Core error types for DRPF
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed without a known path
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File operation failed on a specific path
    #[error("Failed to {op} {}: {source}", path.display())]
    File {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Update/Delete addressed a position outside the freshly loaded list
    #[error("Invalid rule index {index} (list has {len} rules)")]
    InvalidIndex { index: usize, len: usize },

    /// External command (pfctl, launchctl, ...) exited unsuccessfully
    #[error("{program} failed: {output}")]
    Command {
        program: String,
        output: String,
        exit_code: Option<i32>,
    },

    /// Input validation failed
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    /// Privilege escalation failed
    #[error("Elevation error: {0}")]
    Elevation(#[from] crate::elevation::ElevationError),

    /// No home directory to derive config/state paths from
    #[error("Could not determine the {0} directory")]
    DirUnavailable(&'static str),
}

impl Error {
    /// Wraps an I/O error with the operation and path it happened on.
    pub fn file(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            op,
            path: path.into(),
            source,
        }
    }

    /// Returns the captured command output for `Command` errors.
    pub fn command_output(&self) -> Option<&str> {
        match self {
            Self::Command { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
    pub help_url: Option<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
            help_url: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_help(mut self, url: impl Into<String>) -> Self {
        self.help_url = Some(url.into());
        self
    }
}

/// Database of pfctl error patterns and their translations
pub struct PfctlErrorPattern;

impl PfctlErrorPattern {
    /// Matches an error message against known patterns and returns a user-friendly translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        // Permission errors on the pf device
        if lower.contains("permission denied") || lower.contains("operation not permitted") {
            return ErrorTranslation::new("Insufficient permissions to modify packet filter rules")
                .with_suggestion("Run drpf from an account allowed to use sudo")
                .with_suggestion("Check /dev/pf is accessible: ls -l /dev/pf")
                .with_help("https://man.openbsd.org/pfctl");
        }

        // Missing pfctl
        if lower.contains("no such file") || lower.contains("command not found") {
            return ErrorTranslation::new("pfctl is not installed or not found in PATH")
                .with_suggestion("pfctl ships with macOS and the BSDs at /sbin/pfctl")
                .with_suggestion("Set DRPF_PFCTL_COMMAND to the pfctl binary to use");
        }

        // Syntax errors in the generated anchor
        if lower.contains("syntax error") {
            return ErrorTranslation::new("Invalid packet filter rule syntax")
                .with_suggestion("Review the compiled rules with: drpf compile")
                .with_suggestion("Verify port numbers are between 1 and 65535")
                .with_suggestion("Ensure addresses and networks are valid (192.168.1.0/24)")
                .with_help("https://man.openbsd.org/pf.conf");
        }

        // Ports on a protocol without ports
        if lower.contains("port only applies to tcp/udp") {
            return ErrorTranslation::new("Port matching used with a non TCP/UDP protocol")
                .with_suggestion("Use tcp, udp or tcp,udp when a port is set")
                .with_suggestion("Set the port to 'any' for icmp rules");
        }

        // Unknown interface
        if lower.contains("no such interface") || lower.contains("unknown interface") {
            return ErrorTranslation::new("Network interface not found")
                .with_suggestion("List available interfaces: drpf interfaces")
                .with_suggestion("Interface names are case-sensitive (en0, lo0, bridge0)");
        }

        // Host resolution failures
        if lower.contains("no ip address found") || lower.contains("could not parse host") {
            return ErrorTranslation::new("Invalid address in rule")
                .with_suggestion("Use proper IP format: 192.168.1.1 or 192.168.1.0/24")
                .with_suggestion("Use (en0) to match the address of an interface");
        }

        // State toggles
        if lower.contains("pf already enabled") {
            return ErrorTranslation::new("The packet filter is already enabled");
        }
        if lower.contains("pf not enabled") || lower.contains("pf not running") {
            return ErrorTranslation::new("The packet filter is not enabled")
                .with_suggestion("Enable it with: drpf enable");
        }

        // Resource busy
        if lower.contains("resource busy") {
            return ErrorTranslation::new("Packet filter device is busy")
                .with_suggestion("Another process may be modifying pf rules")
                .with_suggestion("Wait a moment and try again");
        }

        // Generic fallback
        ErrorTranslation::new(format!("Packet filter error: {msg}"))
            .with_suggestion("Check the detailed error message for more information")
            .with_suggestion("Verify pf is working: sudo pfctl -s info")
            .with_help("https://man.openbsd.org/pfctl")
    }
}

pub type Result<T> = std::result::Result<T, Error>;
