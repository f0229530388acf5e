#[cfg(test)]
mod tests_impl {
    use crate::core::firewall::{Action, FilterRule, Protocol, RuleDocument};
    use crate::core::live_rules::parse_live_rules;
    use crate::core::pf_conf::compile;
    use crate::core::test_helpers::{forward_rule, sample_document};

    #[test]
    fn test_web_document_end_to_end() {
        let doc = RuleDocument {
            filter_rules: vec![FilterRule {
                action: Action::Pass,
                port: "22,80".into(),
                keep_state: true,
                description: "web".into(),
                ..FilterRule::default()
            }],
            rdr_rules: vec![],
        };

        let text = compile(&doc);
        assert_eq!(
            text,
            "# web\n\
             pass in proto tcp from any to any port {22,80} keep state\n\
             pass in proto udp from any to any port {22,80} keep state\n"
        );

        // Parsing the compiled text yields one rule per protocol line
        let parsed = parse_live_rules(&text);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].protocol, Protocol::Tcp);
        assert_eq!(parsed[1].protocol, Protocol::Udp);
        assert_eq!(parsed[0].port, "{22,80}");
        assert!(parsed.iter().all(|r| r.keep_state && r.description.is_empty()));
    }

    #[test]
    fn test_port_forward_document_end_to_end() {
        let doc = RuleDocument {
            filter_rules: vec![],
            rdr_rules: vec![forward_rule("en0", "any", "8080", "192.168.1.5", "80", "web fwd")],
        };

        assert_eq!(
            compile(&doc),
            "# web fwd\nrdr on en0 proto tcp from any to (en0) port 8080 -> 192.168.1.5 port 80\n"
        );
        // rdr lines are not filter rules
        assert!(parse_live_rules(&compile(&doc)).is_empty());
    }

    #[test]
    fn test_sample_document_layout() {
        let text = compile(&sample_document());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines,
            [
                "# web fwd",
                "rdr on en0 proto tcp from any to (en0) port 8080 -> 192.168.1.5 port 80",
                "rdr proto udp from any to any port 53 -> 127.0.0.1 port 5353",
                "# loopback",
                "pass in quick on lo0 all",
                "# ssh",
                "pass in proto tcp from any to any port 22 keep state",
                "block out from 10.0.0.0/8 to any",
            ]
        );
    }

    #[test]
    fn test_document_json_shape() {
        let json = serde_json::to_value(sample_document()).unwrap();

        let filter = &json["filter_rules"][1];
        assert_eq!(filter["action"], "pass");
        assert_eq!(filter["direction"], "in");
        assert_eq!(filter["protocol"], "tcp");
        assert_eq!(filter["port"], "22");
        assert_eq!(filter["keep_state"], true);

        let rdr = &json["rdr_rules"][0];
        assert_eq!(rdr["interface"], "en0");
        assert_eq!(rdr["external_ip"], "any");
        assert_eq!(rdr["internal_port"], "80");
    }
}

#[cfg(test)]
mod property_tests {
    use crate::core::firewall::{
        Action, Direction, FilterRule, Protocol, RuleDocument, move_within,
    };
    use crate::core::pf_conf::compile;
    use crate::core::store::RuleStore;
    use proptest::prelude::*;

    fn arb_action() -> impl Strategy<Value = Action> {
        prop_oneof![Just(Action::Pass), Just(Action::Block)]
    }

    fn arb_direction() -> impl Strategy<Value = Direction> {
        prop_oneof![Just(Direction::In), Just(Direction::Out)]
    }

    fn arb_protocol() -> impl Strategy<Value = Protocol> {
        prop_oneof![
            Just(Protocol::Any),
            Just(Protocol::Tcp),
            Just(Protocol::Udp),
            Just(Protocol::TcpUdp),
            Just(Protocol::Icmp),
            Just(Protocol::Icmp6),
        ]
    }

    fn arb_port_spec() -> impl Strategy<Value = String> {
        prop_oneof![
            (1u16..=65535).prop_map(|p| p.to_string()),
            proptest::collection::vec(1u16..=65535, 2..5).prop_map(|ports| {
                ports
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",")
            }),
            (1u16..=65535, 1u16..=65535)
                .prop_map(|(a, b)| format!("{}-{}", a.min(b), a.max(b))),
        ]
    }

    fn arb_address() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("any".to_string()),
            (0u8..=255, 0u8..=255, 0u8..=32).prop_map(|(a, b, m)| format!("10.{a}.{b}.0/{m}")),
        ]
    }

    prop_compose! {
        fn arb_filter_rule()(
            action in arb_action(),
            direction in arb_direction(),
            quick in any::<bool>(),
            interface in prop_oneof![Just("any".to_string()), "[a-z]{2,4}[0-9]"],
            protocol in arb_protocol(),
            source in arb_address(),
            destination in arb_address(),
            port in prop_oneof![Just("any".to_string()), arb_port_spec()],
            keep_state in any::<bool>(),
            description in "[a-zA-Z0-9 ]{0,32}",
        ) -> FilterRule {
            FilterRule {
                action,
                direction,
                quick,
                interface,
                protocol,
                source,
                destination,
                port,
                keep_state,
                description,
            }
        }
    }

    fn rule_lines(rule: FilterRule) -> Vec<String> {
        let doc = RuleDocument {
            filter_rules: vec![rule],
            rdr_rules: vec![],
        };
        compile(&doc)
            .lines()
            .filter(|l| !l.starts_with('#'))
            .map(str::to_string)
            .collect()
    }

    proptest! {
        #[test]
        fn test_any_protocol_with_port_compiles_to_tcp_and_udp(
            mut rule in arb_filter_rule(),
            port in arb_port_spec(),
        ) {
            rule.protocol = Protocol::Any;
            rule.port = port;

            let lines = rule_lines(rule);
            prop_assert_eq!(lines.len(), 2);
            prop_assert!(lines[0].contains(" proto tcp "));
            prop_assert!(lines[1].contains(" proto udp "));
            prop_assert_eq!(lines[0].replace(" proto tcp ", " proto udp "), lines[1].clone());
        }

        #[test]
        fn test_all_wildcards_compile_to_all(mut rule in arb_filter_rule()) {
            rule.protocol = Protocol::Any;
            rule.source = "any".into();
            rule.destination = "any".into();
            rule.port = "any".into();

            let lines = rule_lines(rule.clone());
            prop_assert_eq!(lines.len(), 1);

            let tokens: Vec<&str> = lines[0].split_whitespace().collect();
            prop_assert!(tokens.contains(&"all"));
            for keyword in ["proto", "from", "to", "port"] {
                prop_assert!(!tokens.contains(&keyword));
            }
            let expected_tail = if rule.keep_state { "all keep state" } else { "all" };
            prop_assert!(lines[0].ends_with(expected_tail));
        }

        #[test]
        fn test_port_lists_and_ranges_are_wrapped(
            mut rule in arb_filter_rule(),
            port in arb_port_spec(),
        ) {
            rule.protocol = Protocol::Tcp;
            rule.port = port.clone();

            let lines = rule_lines(rule);
            prop_assert_eq!(lines.len(), 1);

            let expected = if port.contains([',', '-']) {
                format!("port {{{}}}", port.replace('-', ":"))
            } else {
                format!("port {port}")
            };
            prop_assert!(lines[0].contains(&expected));
        }

        #[test]
        fn test_move_is_noop_out_of_range_or_same(
            items in proptest::collection::vec(any::<u8>(), 0..10),
            from in 0usize..15,
            to in 0usize..15,
        ) {
            let mut moved = items.clone();
            move_within(&mut moved, from, to);

            if from == to || from >= items.len() || to >= items.len() {
                prop_assert_eq!(moved, items);
            } else {
                // Element lands at `to`, the others keep their relative order
                prop_assert_eq!(moved[to], items[from]);
                let mut rest = items.clone();
                rest.remove(from);
                let mut moved_rest = moved.clone();
                moved_rest.remove(to);
                prop_assert_eq!(moved_rest, rest);
            }
        }

        #[test]
        fn test_save_then_load_is_identity(
            rules in proptest::collection::vec(arb_filter_rule(), 0..6),
        ) {
            let dir = tempfile::TempDir::new().unwrap();
            let path = dir.path().join("rules.json");

            let mut store = RuleStore::new(&path);
            for rule in &rules {
                store.add_filter_rule(rule.clone()).unwrap();
            }

            let reopened = RuleStore::open(&path).unwrap();
            prop_assert_eq!(&reopened.document().filter_rules, &rules);
            prop_assert_eq!(reopened.document(), store.document());
        }

        #[test]
        fn test_delete_shifts_later_rules_down(
            rules in proptest::collection::vec(arb_filter_rule(), 1..6),
            index in 0usize..6,
        ) {
            let dir = tempfile::TempDir::new().unwrap();
            let path = dir.path().join("rules.json");
            let mut store = RuleStore::new(&path);
            for rule in &rules {
                store.add_filter_rule(rule.clone()).unwrap();
            }

            let index = index % rules.len();
            let removed = store.delete_filter_rule(index).unwrap();
            prop_assert_eq!(&removed, &rules[index]);

            let mut expected = rules.clone();
            expected.remove(index);
            prop_assert_eq!(&store.document().filter_rules, &expected);
        }
    }
}
