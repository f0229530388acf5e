//! Input validation and sanitization functions for drpf
//!
//! The rule store persists whatever it is given, so the command line runs
//! every field through here before adding or updating a rule. Field
//! validators return `Result<_, String>`; the rule-level validators wrap
//! failures in [`Error::Validation`] naming the offending field.

use crate::core::error::{Error, Result};
use crate::core::firewall::{FilterRule, PortForwardRule, Protocol, is_any};
use ipnetwork::IpNetwork;
use std::net::IpAddr;

/// Longest description accepted (characters)
pub const MAX_DESCRIPTION_LEN: usize = 128;

/// Sanitizes a rule description for use in a `# <description>` comment line.
///
/// Control characters (including newlines, which would end the comment and
/// start a new rule line) are removed and the result is limited to
/// [`MAX_DESCRIPTION_LEN`] characters.
///
/// # Examples
///
/// ```
/// use drpf::validators::sanitize_description;
///
/// assert_eq!(sanitize_description("web server"), "web server");
///
/// let injected = sanitize_description("ok\npass in all");
/// assert!(!injected.contains('\n'));
/// ```
pub fn sanitize_description(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_DESCRIPTION_LEN)
        .collect::<String>()
        .trim()
        .to_string()
}

fn parse_port_number(input: &str) -> std::result::Result<u16, String> {
    match input.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("Invalid port '{input}' (must be 1-65535)")),
        Ok(port) => Ok(port),
    }
}

/// Validates a single, required port.
///
/// # Errors
///
/// Returns `Err` if the value is not a number between 1 and 65535.
///
/// ```
/// use drpf::validators::validate_port;
///
/// assert_eq!(validate_port("8080").unwrap(), 8080);
/// assert!(validate_port("0").is_err());
/// assert!(validate_port("any").is_err());
/// ```
pub fn validate_port(input: &str) -> std::result::Result<u16, String> {
    parse_port_number(input)
}

/// Validates a port range.
///
/// # Errors
///
/// Returns `Err` if start port is greater than end port.
pub fn validate_port_range(start: u16, end: u16) -> std::result::Result<(u16, u16), String> {
    if start > end {
        Err("Start port must be less than or equal to end port".to_string())
    } else {
        Ok((start, end))
    }
}

/// Validates a filter-rule port specification.
///
/// Accepts `any`, a single port, a comma list, and ranges written `a-b` or
/// `a:b`, in any combination (`22,6000-6010`).
///
/// # Errors
///
/// Returns `Err` on empty list elements, out-of-range ports or reversed ranges.
///
/// ```
/// use drpf::validators::validate_port_spec;
///
/// assert!(validate_port_spec("any").is_ok());
/// assert!(validate_port_spec("22,80,443").is_ok());
/// assert!(validate_port_spec("1000-2000").is_ok());
/// assert!(validate_port_spec("2000:1000").is_err());
/// assert!(validate_port_spec("22,").is_err());
/// ```
pub fn validate_port_spec(input: &str) -> std::result::Result<String, String> {
    let spec = input.trim();
    if is_any(spec) {
        return Ok(spec.to_string());
    }
    if spec.is_empty() {
        return Err("Port cannot be empty (use 'any')".to_string());
    }

    for element in spec.split(',') {
        match element.split_once(['-', ':']) {
            Some((start, end)) => {
                validate_port_range(parse_port_number(start)?, parse_port_number(end)?)?;
            }
            None => {
                parse_port_number(element)?;
            }
        }
    }

    Ok(spec.to_string())
}

/// Validates a network interface name.
///
/// Interface name rules:
/// - `any` matches every interface
/// - Max 15 characters
/// - Alphanumeric, dot, dash, underscore only
/// - Cannot be "." or ".."
///
/// # Errors
///
/// Returns `Err` if interface name violates these constraints.
pub fn validate_interface(name: &str) -> std::result::Result<String, String> {
    if is_any(name) {
        return Ok(name.to_string());
    }

    if name.is_empty() {
        return Err("Interface cannot be empty (use 'any')".to_string());
    }

    if name.len() > 15 {
        return Err("Interface name too long (max 15 characters)".to_string());
    }

    if name == "." || name == ".." {
        return Err("Invalid interface name".to_string());
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err("Interface name contains invalid characters".to_string());
    }

    Ok(name.to_string())
}

/// Validates a source or destination address.
///
/// Accepts `any`, an IPv4/IPv6 address or CIDR network, an interface
/// address `(en0)` or a table `<blocklist>`, optionally negated with `!`.
///
/// # Errors
///
/// Returns `Err` if the value is none of the accepted forms.
///
/// ```
/// use drpf::validators::validate_address;
///
/// assert!(validate_address("any").is_ok());
/// assert!(validate_address("192.168.1.0/24").is_ok());
/// assert!(validate_address("!10.0.0.1").is_ok());
/// assert!(validate_address("(en0)").is_ok());
/// assert!(validate_address("<bruteforce>").is_ok());
/// assert!(validate_address("example.com").is_err());
/// ```
pub fn validate_address(input: &str) -> std::result::Result<String, String> {
    let value = input.trim();
    if is_any(value) {
        return Ok(value.to_string());
    }

    let target = value.strip_prefix('!').unwrap_or(value);

    if let Some(iface) = target.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        validate_interface(iface)?;
        return Ok(value.to_string());
    }

    if let Some(table) = target.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
        if table.is_empty()
            || !table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
        {
            return Err(format!("Invalid table name '{table}'"));
        }
        return Ok(value.to_string());
    }

    target
        .parse::<IpNetwork>()
        .map(|_| value.to_string())
        .map_err(|_| format!("Invalid address '{value}' (expected IP, CIDR, (iface), <table> or any)"))
}

/// Validates a literal IP address (no networks, no wildcard).
///
/// # Errors
///
/// Returns `Err` if the value is not an IPv4 or IPv6 address.
pub fn validate_ip(input: &str) -> std::result::Result<String, String> {
    let value = input.trim();
    value
        .parse::<IpAddr>()
        .map(|_| value.to_string())
        .map_err(|_| format!("Invalid IP address '{value}'"))
}

/// Checks if a port is well-known and returns informational message.
///
/// This is informational only and does not block saving.
pub fn check_well_known_port(port: u16) -> Option<String> {
    if port <= 1024 {
        let name = match port {
            22 => "SSH",
            80 => "HTTP",
            443 => "HTTPS",
            53 => "DNS",
            25 => "SMTP",
            21 => "FTP",
            _ => return Some(format!("Privileged port {} (requires admin)", port)),
        };
        Some(format!("Port {}: {}", port, name))
    } else {
        None
    }
}

fn field<T>(name: &str, result: std::result::Result<T, String>) -> Result<T> {
    result.map_err(|message| Error::Validation {
        field: name.to_string(),
        message,
    })
}

/// Validates every field of a filter rule and returns the sanitized rule.
///
/// # Errors
///
/// Returns [`Error::Validation`] for the first invalid field. A port on an
/// ICMP rule is rejected since pf only matches ports for tcp and udp.
pub fn validate_filter_rule(rule: FilterRule) -> Result<FilterRule> {
    let interface = field("interface", validate_interface(&rule.interface))?;
    let source = field("source", validate_address(&rule.source))?;
    let destination = field("destination", validate_address(&rule.destination))?;
    let port = field("port", validate_port_spec(&rule.port))?;

    if !is_any(&port) && matches!(rule.protocol, Protocol::Icmp | Protocol::Icmp6) {
        return field(
            "port",
            Err(format!("Ports only apply to tcp/udp, not {}", rule.protocol)),
        );
    }

    Ok(FilterRule {
        interface,
        source,
        destination,
        port,
        description: sanitize_description(&rule.description),
        ..rule
    })
}

/// Validates every field of a port-forward rule and returns the sanitized rule.
///
/// # Errors
///
/// Returns [`Error::Validation`] for the first invalid field.
pub fn validate_port_forward_rule(rule: PortForwardRule) -> Result<PortForwardRule> {
    let interface = field("interface", validate_interface(&rule.interface))?;
    let external_ip = if is_any(&rule.external_ip) {
        rule.external_ip.clone()
    } else {
        field("external_ip", validate_ip(&rule.external_ip))?
    };
    let external_port = field("external_port", validate_port(&rule.external_port))?;
    let internal_ip = field("internal_ip", validate_ip(&rule.internal_ip))?;
    let internal_port = field("internal_port", validate_port(&rule.internal_port))?;

    Ok(PortForwardRule {
        interface,
        external_ip,
        external_port: external_port.to_string(),
        internal_ip,
        internal_port: internal_port.to_string(),
        description: sanitize_description(&rule.description),
        ..rule
    })
}
