//! Best-effort parsing of `pfctl -s rules` output
//!
//! Reconstructs [`FilterRule`] values from the rules pf reports as loaded.
//! This is a forward-only keyword scan, not a grammar: recognised keywords
//! consume their value tokens and everything else is ignored.
//!
//! The parser is not the inverse of [`crate::core::pf_conf::compile`]. A rule
//! with protocol `any` and a specific port compiles to a `tcp` and a `udp`
//! line and parses back as two separate rules.

use crate::core::firewall::{Action, Direction, FilterRule, Protocol};
use tracing::debug;

/// Lines shorter than this are not rules (`pass all` style fragments, noise).
const MIN_RULE_TOKENS: usize = 4;

/// Keywords recognised while scanning a rule line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Quick,
    On,
    Proto,
    From,
    To,
    Port,
    Keep,
}

impl Keyword {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "quick" => Some(Keyword::Quick),
            "on" => Some(Keyword::On),
            "proto" => Some(Keyword::Proto),
            "from" => Some(Keyword::From),
            "to" => Some(Keyword::To),
            "port" => Some(Keyword::Port),
            "keep" => Some(Keyword::Keep),
            _ => None,
        }
    }

    /// Number of tokens following the keyword that belong to it.
    const fn consumes(self) -> usize {
        match self {
            Keyword::Quick => 0,
            // `keep state`: the following token is assumed to be `state`
            Keyword::Keep => 1,
            Keyword::On | Keyword::Proto | Keyword::From | Keyword::To | Keyword::Port => 1,
        }
    }
}

/// Removes ALTQ status lines that pfctl mixes into its rule listing.
pub fn filter_live_output(output: &str) -> String {
    output
        .lines()
        .filter(|line| !line.contains("ALTQ"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses pfctl rule output into filter rules, one per recognisable line.
///
/// Lines that are blank, too short, or whose action/direction cannot be
/// represented are skipped.
pub fn parse_live_rules(output: &str) -> Vec<FilterRule> {
    output.lines().filter_map(parse_rule_line).collect()
}

/// Parses a single rule line.
pub fn parse_rule_line(line: &str) -> Option<FilterRule> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < MIN_RULE_TOKENS {
        return None;
    }

    let Ok(action) = tokens[0].parse::<Action>() else {
        debug!("Skipping non-filter line: {line}");
        return None;
    };

    // pfctl prints the block policy between action and direction
    let mut i = 1;
    if action == Action::Block && matches!(tokens[i], "drop" | "return") {
        i += 1;
    }

    let Ok(direction) = tokens[i].parse::<Direction>() else {
        debug!("Skipping line without direction: {line}");
        return None;
    };

    let mut rule = FilterRule {
        action,
        direction,
        ..FilterRule::default()
    };

    i += 1;
    while i < tokens.len() {
        let Some(keyword) = Keyword::from_token(tokens[i]) else {
            i += 1;
            continue;
        };

        let mut value_at = i + 1;
        // `port = 22`
        if keyword == Keyword::Port && tokens.get(value_at) == Some(&"=") {
            value_at += 1;
        }
        let value = tokens.get(value_at).copied();

        match (keyword, value) {
            (Keyword::Quick, _) => rule.quick = true,
            (Keyword::Keep, _) => rule.keep_state = true,
            (Keyword::On, Some(v)) => rule.interface = v.to_string(),
            (Keyword::Proto, Some(v)) => {
                if let Some(protocol) = Protocol::from_token(v) {
                    rule.protocol = protocol;
                }
            }
            (Keyword::From, Some(v)) => rule.source = v.to_string(),
            (Keyword::To, Some(v)) => rule.destination = v.to_string(),
            (Keyword::Port, Some(v)) => rule.port = v.to_string(),
            (_, None) => {}
        }

        i = value_at + keyword.consumes();
    }

    Some(rule)
}
