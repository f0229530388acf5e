//! pf rule text generation
//!
//! Translates a [`RuleDocument`] into the pf rule language loaded into the
//! drpf anchor. Output order is all `rdr` statements, then all filter rules,
//! each in document order and optionally preceded by a `# <description>`
//! comment line.
//!
//! The compiler preserves order only; pf's last-match-wins evaluation (and
//! `quick` short-circuiting) decides what the order means.

use crate::core::firewall::{FilterRule, PortForwardRule, Protocol, RuleDocument, is_any};
use std::fmt::Write;

/// Compiles a rule document to pf rule text.
pub fn compile(doc: &RuleDocument) -> String {
    let mut out = String::new();

    for rule in &doc.rdr_rules {
        write_port_forward(&mut out, rule);
    }
    for rule in &doc.filter_rules {
        write_filter_rule(&mut out, rule);
    }

    out
}

impl RuleDocument {
    /// Generates the pf anchor text for this document.
    pub fn to_pf_conf(&self) -> String {
        compile(self)
    }
}

/// Control characters become spaces so a description stays on its comment line.
fn write_description(out: &mut String, description: &str) {
    if !description.is_empty() {
        let comment: String = description
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        let _ = writeln!(out, "# {comment}");
    }
}

fn write_port_forward(out: &mut String, rule: &PortForwardRule) {
    write_description(out, &rule.description);

    if is_any(&rule.interface) {
        let _ = writeln!(
            out,
            "rdr proto {} from any to {} port {} -> {} port {}",
            rule.protocol,
            rule.external_ip,
            rule.external_port,
            rule.internal_ip,
            rule.internal_port
        );
    } else {
        // `(en0)` matches whatever address the interface currently has
        let target = if is_any(&rule.external_ip) {
            format!("({})", rule.interface)
        } else {
            rule.external_ip.clone()
        };
        let _ = writeln!(
            out,
            "rdr on {} proto {} from any to {} port {} -> {} port {}",
            rule.interface,
            rule.protocol,
            target,
            rule.external_port,
            rule.internal_ip,
            rule.internal_port
        );
    }
}

/// Protocol tokens a filter rule compiles to, one output line each.
///
/// pf cannot match a port without a transport protocol, so `any` with a
/// specific port expands to tcp and udp.
pub fn expand_protocols(rule: &FilterRule) -> &'static [&'static str] {
    if rule.protocol == Protocol::Any && !is_any(&rule.port) {
        &["tcp", "udp"]
    } else {
        rule.protocol.tokens()
    }
}

/// Formats a port field for pf: lists and ranges are wrapped in braces and
/// `-` range separators become `:`.
pub fn format_port(port: &str) -> String {
    if port.contains([',', '-', ':']) {
        format!("{{{}}}", port.replace('-', ":"))
    } else {
        port.to_string()
    }
}

fn write_filter_rule(out: &mut String, rule: &FilterRule) {
    write_description(out, &rule.description);
    let port = format_port(&rule.port);

    for &proto in expand_protocols(rule) {
        let mut parts: Vec<&str> = vec![rule.action.as_str(), rule.direction.as_str()];
        if rule.quick {
            parts.push("quick");
        }
        if !is_any(&rule.interface) {
            parts.extend(["on", rule.interface.as_str()]);
        }

        if is_any(proto) && is_any(&rule.source) && is_any(&rule.destination) && is_any(&rule.port)
        {
            parts.push("all");
        } else {
            if !is_any(proto) {
                parts.extend(["proto", proto]);
            }

            if !is_any(&rule.source) || !is_any(&rule.destination) {
                parts.extend([
                    "from",
                    rule.source.as_str(),
                    "to",
                    rule.destination.as_str(),
                ]);
            } else if !is_any(&rule.port) {
                parts.extend(["from", "any", "to", "any"]);
            }

            if !is_any(&rule.port) && matches!(proto, "tcp" | "udp") {
                parts.extend(["port", port.as_str()]);
            }
        }

        if rule.keep_state {
            parts.push("keep state");
        }

        let _ = writeln!(out, "{}", parts.join(" "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::firewall::{Action, Direction, ForwardProtocol};
    use crate::core::test_helpers::{filter_rule, forward_rule};

    #[test]
    fn test_empty_document_compiles_to_empty_text() {
        assert_eq!(compile(&RuleDocument::new()), "");
    }

    #[test]
    fn test_udp_tcp_list_is_normalized_to_tcp_first() {
        let json = r#"{"action":"pass","direction":"in","interface":"any","protocol":"udp,tcp",
            "source":"any","destination":"any","port":"53"}"#;
        let rule: FilterRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.protocol, Protocol::TcpUdp);

        let doc = RuleDocument {
            filter_rules: vec![rule.clone()],
            rdr_rules: vec![],
        };
        assert_eq!(
            compile(&doc),
            "pass in proto tcp from any to any port 53\n\
             pass in proto udp from any to any port 53\n"
        );
        assert_eq!(serde_json::to_value(&rule).unwrap()["protocol"], "tcp,udp");
    }

    #[test]
    fn test_description_newline_cannot_add_rule_line() {
        let mut rule = filter_rule(Action::Block, Protocol::Any, "any");
        rule.description = "note\npass in all\r".into();
        let doc = RuleDocument {
            filter_rules: vec![rule],
            rdr_rules: vec![],
        };

        assert_eq!(compile(&doc), "# note pass in all \nblock in all\n");
    }

    #[test]
    fn test_any_protocol_with_ports_expands_to_tcp_and_udp() {
        let rule = FilterRule {
            action: Action::Pass,
            port: "22,80".into(),
            keep_state: true,
            description: "web".into(),
            ..FilterRule::default()
        };
        let doc = RuleDocument {
            filter_rules: vec![rule],
            rdr_rules: vec![],
        };

        assert_eq!(
            compile(&doc),
            "# web\n\
             pass in proto tcp from any to any port {22,80} keep state\n\
             pass in proto udp from any to any port {22,80} keep state\n"
        );
    }

    #[test]
    fn test_port_forward_on_interface_uses_interface_address() {
        let doc = RuleDocument {
            filter_rules: vec![],
            rdr_rules: vec![forward_rule("en0", "any", "8080", "192.168.1.5", "80", "web fwd")],
        };
        assert_eq!(
            compile(&doc),
            "# web fwd\nrdr on en0 proto tcp from any to (en0) port 8080 -> 192.168.1.5 port 80\n"
        );
    }

    #[test]
    fn test_port_forward_on_interface_keeps_literal_address() {
        let doc = RuleDocument {
            filter_rules: vec![],
            rdr_rules: vec![forward_rule("en0", "10.0.0.1", "443", "127.0.0.1", "8443", "")],
        };
        assert_eq!(
            compile(&doc),
            "rdr on en0 proto tcp from any to 10.0.0.1 port 443 -> 127.0.0.1 port 8443\n"
        );
    }

    #[test]
    fn test_port_forward_any_interface() {
        let mut rule = forward_rule("any", "any", "53", "127.0.0.1", "5353", "");
        rule.protocol = ForwardProtocol::Udp;
        let doc = RuleDocument {
            filter_rules: vec![],
            rdr_rules: vec![rule],
        };
        assert_eq!(
            compile(&doc),
            "rdr proto udp from any to any port 53 -> 127.0.0.1 port 5353\n"
        );
    }

    #[test]
    fn test_all_wildcards_compile_to_all() {
        let rule = FilterRule {
            direction: Direction::Out,
            quick: true,
            interface: "lo0".into(),
            ..FilterRule::default()
        };
        let doc = RuleDocument {
            filter_rules: vec![rule],
            rdr_rules: vec![],
        };
        assert_eq!(compile(&doc), "block out quick on lo0 all\n");
    }

    #[test]
    fn test_addresses_without_port() {
        let mut rule = filter_rule(Action::Pass, Protocol::Icmp, "any");
        rule.source = "10.0.0.0/8".into();
        let doc = RuleDocument {
            filter_rules: vec![rule],
            rdr_rules: vec![],
        };
        assert_eq!(compile(&doc), "pass in proto icmp from 10.0.0.0/8 to any\n");
    }

    #[test]
    fn test_port_ignored_for_non_transport_protocol() {
        let rule = filter_rule(Action::Block, Protocol::Icmp, "22");
        let doc = RuleDocument {
            filter_rules: vec![rule],
            rdr_rules: vec![],
        };
        assert_eq!(compile(&doc), "block in proto icmp from any to any\n");
    }

    #[test]
    fn test_tcp_udp_pair_compiles_to_two_lines() {
        let rule = filter_rule(Action::Pass, Protocol::TcpUdp, "53");
        let doc = RuleDocument {
            filter_rules: vec![rule],
            rdr_rules: vec![],
        };
        assert_eq!(
            compile(&doc),
            "pass in proto tcp from any to any port 53\npass in proto udp from any to any port 53\n"
        );
    }

    #[test]
    fn test_port_formatting() {
        assert_eq!(format_port("22"), "22");
        assert_eq!(format_port("22,80"), "{22,80}");
        assert_eq!(format_port("1000-2000"), "{1000:2000}");
        assert_eq!(format_port("1000:2000"), "{1000:2000}");
        assert_eq!(format_port("22,6000-6010"), "{22,6000:6010}");
    }

    #[test]
    fn test_port_forwards_precede_filter_rules() {
        let doc = RuleDocument {
            filter_rules: vec![filter_rule(Action::Pass, Protocol::Tcp, "80")],
            rdr_rules: vec![forward_rule("any", "any", "8080", "127.0.0.1", "80", "")],
        };
        let text = doc.to_pf_conf();
        let rdr = text.find("rdr ").unwrap();
        let pass = text.find("pass ").unwrap();
        assert!(rdr < pass);
    }
}
