//! Shared test utilities for core module tests
//!
//! Provides common test helpers to avoid duplication across test suites.
//! This module is only compiled in test mode.

use crate::core::error::{Error, Result};
use crate::core::firewall::{
    Action, Direction, FilterRule, ForwardProtocol, PortForwardRule, Protocol, RuleDocument,
};
use crate::shell::{Program, Shell};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Mutex for tests that need exclusive access to environment variables.
///
/// # Example
///
/// ```ignore
/// let _guard = ENV_VAR_MUTEX.lock().unwrap();
/// unsafe {
///     std::env::set_var("DRPF_ELEVATION_METHOD", "sudo");
/// }
/// // ... test with custom env state ...
/// unsafe {
///     std::env::remove_var("DRPF_ELEVATION_METHOD");
/// }
/// ```
pub static ENV_VAR_MUTEX: Mutex<()> = Mutex::new(());

/// Filter rule with the given action, protocol and port; everything else default.
pub fn filter_rule(action: Action, protocol: Protocol, port: &str) -> FilterRule {
    FilterRule {
        action,
        protocol,
        port: port.to_string(),
        ..FilterRule::default()
    }
}

/// TCP port-forward rule.
pub fn forward_rule(
    interface: &str,
    external_ip: &str,
    external_port: &str,
    internal_ip: &str,
    internal_port: &str,
    description: &str,
) -> PortForwardRule {
    PortForwardRule {
        interface: interface.to_string(),
        protocol: ForwardProtocol::Tcp,
        external_ip: external_ip.to_string(),
        external_port: external_port.to_string(),
        internal_ip: internal_ip.to_string(),
        internal_port: internal_port.to_string(),
        description: description.to_string(),
    }
}

/// A document with three filter rules and two port forwards.
///
/// This is the canonical document for store and compiler tests.
pub fn sample_document() -> RuleDocument {
    RuleDocument {
        filter_rules: vec![
            FilterRule {
                quick: true,
                interface: "lo0".into(),
                action: Action::Pass,
                description: "loopback".into(),
                ..FilterRule::default()
            },
            FilterRule {
                action: Action::Pass,
                protocol: Protocol::Tcp,
                port: "22".into(),
                keep_state: true,
                description: "ssh".into(),
                ..FilterRule::default()
            },
            FilterRule {
                direction: Direction::Out,
                source: "10.0.0.0/8".into(),
                ..FilterRule::default()
            },
        ],
        rdr_rules: vec![
            forward_rule("en0", "any", "8080", "192.168.1.5", "80", "web fwd"),
            PortForwardRule {
                protocol: ForwardProtocol::Udp,
                external_port: "53".into(),
                internal_port: "5353".into(),
                ..PortForwardRule::default()
            },
        ],
    }
}

/// A recorded shell invocation
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub program: Program,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

/// Shell double that records invocations and replays scripted responses.
///
/// Responses are consumed in order; once exhausted every call succeeds with
/// empty output.
#[derive(Debug, Default)]
pub struct FakeShell {
    responses: Mutex<VecDeque<std::result::Result<String, String>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful response.
    pub fn ok(self, output: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(output.to_string()));
        self
    }

    /// Queues a failing response with the given output.
    pub fn fail(self, output: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(output.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Shell for FakeShell {
    async fn execute(&self, program: Program, args: &[&str], stdin: Option<&str>) -> Result<String> {
        self.calls.lock().unwrap().push(RecordedCall {
            program,
            args: args.iter().map(ToString::to_string).collect(),
            stdin: stdin.map(str::to_string),
        });

        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(output)) => Ok(output),
            Some(Err(output)) => Err(Error::Command {
                program: program.as_ref().to_string(),
                output,
                exit_code: Some(1),
            }),
            None => Ok(String::new()),
        }
    }
}
