//! Core rule management
//!
//! - [`firewall`]: rule model (filter rules, port forwards, the rule document)
//! - [`store`]: persistence and list operations over the rule document
//! - [`pf_conf`]: compilation of the document into pf rule text
//! - [`live_rules`]: parsing of `pfctl -s rules` output
//! - [`diff`]: line diff of installed vs. compiled rules
//! - [`pfctl`]: engine operations (apply, status, startup)
//! - [`error`]: error types

pub mod diff;
pub mod error;
pub mod firewall;
pub mod live_rules;
pub mod pf_conf;
pub mod pfctl;
pub mod store;

#[cfg(test)]
pub mod test_helpers;

#[cfg(test)]
mod tests;
