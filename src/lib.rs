//! DRPF - Dumb Rust pf
//!
//! Manages packet filter (pf) rules from the command line: an ordered rule
//! document stored as JSON, compiled into a dedicated pf anchor and loaded
//! with `pfctl`.
//!
//! # Architecture
//!
//! - [`core`] - Rule model, rule store, pf compiler, live-rule parser, pfctl operations
//! - [`shell`] - Execution of privileged commands (real or dry-run)
//! - [`elevation`] - Privilege escalation via run0/sudo/pkexec
//! - [`audit`] - Audit logging for all privileged operations
//! - [`validators`] - Input validation and sanitization
//! - [`config`] - Configuration loading
//! - [`utils`] - XDG directories, interface discovery
//!
//! # Example
//!
//! ```
//! use drpf::{FilterRule, RuleDocument};
//! use drpf::core::firewall::{Action, Protocol};
//!
//! let doc = RuleDocument {
//!     filter_rules: vec![FilterRule {
//!         action: Action::Pass,
//!         protocol: Protocol::Tcp,
//!         port: "22".to_string(),
//!         keep_state: true,
//!         ..FilterRule::default()
//!     }],
//!     rdr_rules: vec![],
//! };
//! assert_eq!(
//!     doc.to_pf_conf(),
//!     "pass in proto tcp from any to any port 22 keep state\n"
//! );
//! ```

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod config;
pub mod core;
pub mod elevation;
pub mod shell;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use core::error::{Error, Result};
pub use core::firewall::{FilterRule, PortForwardRule, RuleDocument};
pub use core::store::RuleStore;
