//! Firewall rule data structures
//!
//! This module defines the structured representation of a pf rule document.
//! It is the unit stored by [`crate::core::store`], compiled by
//! [`crate::core::pf_conf`] and reconstructed (lossily) by
//! [`crate::core::live_rules`].
//!
//! # Document Structure
//!
//! A [`RuleDocument`] holds two ordered lists:
//! - [`PortForwardRule`]s, compiled to `rdr` statements
//! - [`FilterRule`]s, compiled to `pass`/`block` statements
//!
//! List order is evaluation order in pf. Rules have no identifiers; a rule is
//! addressed only by its position.
//!
//! # Example
//!
//! ```
//! use drpf::core::firewall::{Action, FilterRule, Protocol, RuleDocument};
//!
//! let mut doc = RuleDocument::default();
//! doc.filter_rules.push(FilterRule {
//!     action: Action::Pass,
//!     protocol: Protocol::Tcp,
//!     port: "22".to_string(),
//!     keep_state: true,
//!     description: "ssh".to_string(),
//!     ..FilterRule::default()
//! });
//! assert_eq!(doc.filter_rules.len(), 1);
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Wildcard value for interface, address and port fields.
pub const ANY: &str = "any";

/// Conventional internal address of a new port-forward rule.
pub const DEFAULT_INTERNAL_IP: &str = "127.0.0.1";

/// Returns `true` if a free-text match field is the `any` wildcard.
pub fn is_any(value: &str) -> bool {
    value == ANY
}

/// What pf does with a matching packet
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[strum(serialize = "pass")]
    Pass,
    #[default]
    #[strum(serialize = "block")]
    Block,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Pass => "pass",
            Action::Block => "block",
        }
    }
}

/// Traffic direction a filter rule applies to
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "out")]
    Out,
}

impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// Protocol match of a filter rule
///
/// Serialized as the pf token list stored in rule documents: `"tcp,udp"` for
/// the pair, a single token otherwise.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::EnumIter, strum::AsRefStr,
)]
pub enum Protocol {
    /// Match all protocols
    #[default]
    #[strum(serialize = "any")]
    Any,
    #[strum(serialize = "tcp")]
    Tcp,
    #[strum(serialize = "udp")]
    Udp,
    /// Both TCP and UDP, compiled to one line per protocol
    #[strum(serialize = "tcp,udp")]
    TcpUdp,
    #[strum(serialize = "icmp")]
    Icmp,
    #[strum(serialize = "icmp6")]
    Icmp6,
}

impl Protocol {
    pub const fn as_str(self) -> &'static str {
        match self {
            Protocol::Any => "any",
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::TcpUdp => "tcp,udp",
            Protocol::Icmp => "icmp",
            Protocol::Icmp6 => "icmp6",
        }
    }

    /// The individual pf protocol tokens this value stands for.
    pub const fn tokens(self) -> &'static [&'static str] {
        match self {
            Protocol::Any => &["any"],
            Protocol::Tcp => &["tcp"],
            Protocol::Udp => &["udp"],
            Protocol::TcpUdp => &["tcp", "udp"],
            Protocol::Icmp => &["icmp"],
            Protocol::Icmp6 => &["icmp6"],
        }
    }

    /// Maps a single pf protocol token (as printed by pfctl) to a protocol.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "any" => Some(Protocol::Any),
            "tcp" => Some(Protocol::Tcp),
            "udp" => Some(Protocol::Udp),
            "icmp" => Some(Protocol::Icmp),
            "icmp6" | "ipv6-icmp" => Some(Protocol::Icmp6),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Error returned when a protocol string is not one of the supported forms
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported protocol '{0}' (expected any, tcp, udp, tcp,udp, icmp or icmp6)")]
pub struct ParseProtocolError(String);

impl FromStr for Protocol {
    type Err = ParseProtocolError;

    /// Accepts a comma-separated token list with optional whitespace, so
    /// `"udp, tcp"` parses as [`Protocol::TcpUdp`]. Token order is not kept:
    /// it compiles tcp first and saves back as `tcp,udp`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens: Vec<&str> = s.split(',').map(str::trim).collect();
        tokens.sort_unstable();
        tokens.dedup();

        match tokens.as_slice() {
            [single] => Protocol::from_token(single).ok_or_else(|| ParseProtocolError(s.into())),
            ["tcp", "udp"] => Ok(Protocol::TcpUdp),
            _ => Err(ParseProtocolError(s.into())),
        }
    }
}

impl Serialize for Protocol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Protocol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Transport protocol of a port-forward rule
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
pub enum ForwardProtocol {
    #[default]
    #[strum(serialize = "tcp")]
    Tcp,
    #[strum(serialize = "udp")]
    Udp,
}

impl ForwardProtocol {
    pub const fn as_str(self) -> &'static str {
        match self {
            ForwardProtocol::Tcp => "tcp",
            ForwardProtocol::Udp => "udp",
        }
    }
}

/// A traffic filtering statement (`pass`/`block`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterRule {
    pub action: Action,
    pub direction: Direction,
    #[serde(default)]
    pub quick: bool,
    /// Interface name or `any`
    pub interface: String,
    pub protocol: Protocol,
    /// Address, network or `any`
    pub source: String,
    /// Address, network or `any`
    pub destination: String,
    /// Single port, comma list, range (`1000-2000`) or `any`
    pub port: String,
    #[serde(default)]
    pub keep_state: bool,
    #[serde(default)]
    pub description: String,
}

impl Default for FilterRule {
    fn default() -> Self {
        Self {
            action: Action::Block,
            direction: Direction::In,
            quick: false,
            interface: ANY.to_string(),
            protocol: Protocol::Any,
            source: ANY.to_string(),
            destination: ANY.to_string(),
            port: ANY.to_string(),
            keep_state: false,
            description: String::new(),
        }
    }
}

/// A port redirection statement (`rdr`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortForwardRule {
    /// Interface name or `any`
    pub interface: String,
    pub protocol: ForwardProtocol,
    /// `any` or a literal address
    pub external_ip: String,
    pub external_port: String,
    pub internal_ip: String,
    pub internal_port: String,
    #[serde(default)]
    pub description: String,
}

impl Default for PortForwardRule {
    fn default() -> Self {
        Self {
            interface: ANY.to_string(),
            protocol: ForwardProtocol::Tcp,
            external_ip: ANY.to_string(),
            external_port: String::new(),
            internal_ip: DEFAULT_INTERNAL_IP.to_string(),
            internal_port: String::new(),
            description: String::new(),
        }
    }
}

/// The complete persisted rule set
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleDocument {
    #[serde(default)]
    pub filter_rules: Vec<FilterRule>,
    #[serde(default)]
    pub rdr_rules: Vec<PortForwardRule>,
}

impl RuleDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.filter_rules.is_empty() && self.rdr_rules.is_empty()
    }
}

/// Moves the element at `from` to position `to`, shifting the elements in
/// between. Does nothing if `from == to` or either index is out of range.
pub(crate) fn move_within<T>(items: &mut [T], from: usize, to: usize) {
    let len = items.len();
    if from >= len || to >= len || from == to {
        return;
    }
    if from < to {
        items[from..=to].rotate_left(1);
    } else {
        items[to..=from].rotate_right(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_protocol_parse_variants() {
        assert_eq!("any".parse(), Ok(Protocol::Any));
        assert_eq!("tcp,udp".parse(), Ok(Protocol::TcpUdp));
        assert_eq!("udp, tcp".parse(), Ok(Protocol::TcpUdp));
        assert_eq!(" icmp ".parse(), Ok(Protocol::Icmp));
        assert!("gre".parse::<Protocol>().is_err());
        assert!("tcp,icmp".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_protocol_string_roundtrip() {
        for proto in Protocol::iter() {
            assert_eq!(proto.as_str().parse::<Protocol>(), Ok(proto));
            assert_eq!(proto.as_ref(), proto.as_str());
        }
    }

    #[test]
    fn test_enum_serialization_matches_pf_tokens() {
        let rule = FilterRule {
            action: Action::Pass,
            protocol: Protocol::TcpUdp,
            ..FilterRule::default()
        };
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["action"], "pass");
        assert_eq!(json["direction"], "in");
        assert_eq!(json["protocol"], "tcp,udp");
        assert_eq!(json["keep_state"], false);
    }

    #[test]
    fn test_document_json_field_names() {
        let json = r#"{
            "filter_rules": [],
            "rdr_rules": [{
                "interface": "en0", "protocol": "udp", "external_ip": "any",
                "external_port": "53", "internal_ip": "10.0.0.2",
                "internal_port": "5353", "description": ""
            }]
        }"#;
        let doc: RuleDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.rdr_rules[0].protocol, ForwardProtocol::Udp);
        assert_eq!(doc.rdr_rules[0].internal_port, "5353");
    }

    #[test]
    fn test_missing_lists_default_to_empty() {
        let doc: RuleDocument = serde_json::from_str("{}").unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn test_invalid_action_rejected() {
        let json = r#"{"filter_rules":[{"action":"allow","direction":"in","interface":"any",
            "protocol":"any","source":"any","destination":"any","port":"any"}]}"#;
        assert!(serde_json::from_str::<RuleDocument>(json).is_err());
    }

    #[test]
    fn test_defaults_match_form_defaults() {
        let rule = FilterRule::default();
        assert_eq!(rule.action, Action::Block);
        assert!(is_any(&rule.interface) && is_any(&rule.port));

        let fwd = PortForwardRule::default();
        assert_eq!(fwd.internal_ip, DEFAULT_INTERNAL_IP);
        assert!(is_any(&fwd.external_ip));
    }

    #[test]
    fn test_move_within() {
        let mut v = vec![0, 1, 2, 3];
        move_within(&mut v, 0, 2);
        assert_eq!(v, vec![1, 2, 0, 3]);
        move_within(&mut v, 3, 0);
        assert_eq!(v, vec![3, 1, 2, 0]);
        move_within(&mut v, 1, 1);
        move_within(&mut v, 4, 0);
        move_within(&mut v, 0, 4);
        assert_eq!(v, vec![3, 1, 2, 0]);
    }
}
