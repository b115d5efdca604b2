//! Unit tests for public address resolution

#[cfg(test)]
mod tests {
    use crate::renderer::address::*;
    use crate::test_utils::*;
    use crds::{AddressType, GatewayAddress, Listener, ListenerProtocol};
    use k8s_openapi::api::core::v1::{LoadBalancerIngress, Service};

    fn udp_listener(port: i32) -> Listener {
        Listener {
            name: "udp".to_string(),
            port,
            protocol: ListenerProtocol::Udp,
        }
    }

    fn ip(value: &str) -> GatewayAddress {
        GatewayAddress {
            type_: AddressType::IpAddress,
            value: value.to_string(),
        }
    }

    #[test]
    fn test_public_ip_ok() {
        let svc = create_test_service("default", "svc1", Some("default/gw1"), &[(None, Some("UDP"), 1)], &["1.2.3.4"]);
        let addr = resolve_public_address(&udp_listener(1), [&svc]).unwrap();
        assert_eq!(addr.address, ip("1.2.3.4"));
        assert_eq!(addr.port, 1);
    }

    #[test]
    fn test_no_service() {
        let none: [&Service; 0] = [];
        let err = resolve_public_address(&udp_listener(1), none).unwrap_err();
        assert_eq!(err, ResolutionError::NoService);
    }

    #[test]
    fn test_wrong_protocol_errs() {
        let svc = create_test_service("default", "svc1", None, &[(None, Some("SCTP"), 1)], &["1.2.3.4"]);
        let err = resolve_public_address(&udp_listener(1), [&svc]).unwrap_err();
        assert!(matches!(err, ResolutionError::PortMismatch { transport: "UDP", port: 1, .. }));
    }

    #[test]
    fn test_wrong_port_errs() {
        let svc = create_test_service("default", "svc1", None, &[(None, Some("UDP"), 12)], &["1.2.3.4"]);
        let err = resolve_public_address(&udp_listener(1), [&svc]).unwrap_err();
        assert!(matches!(err, ResolutionError::PortMismatch { .. }));
    }

    #[test]
    fn test_absent_protocol_means_tcp() {
        let svc = create_test_service("default", "svc1", None, &[(None, None, 3478)], &["1.2.3.4"]);
        let tls = Listener {
            name: "tls".to_string(),
            port: 3478,
            protocol: ListenerProtocol::Tls,
        };
        assert_eq!(resolve_public_address(&tls, [&svc]).unwrap().address, ip("1.2.3.4"));
        assert!(resolve_public_address(&udp_listener(3478), [&svc]).is_err());
    }

    #[test]
    fn test_dtls_listener_uses_udp_port() {
        let svc = create_test_service("default", "svc1", None, &[(None, Some("UDP"), 443)], &["1.2.3.4"]);
        let dtls = Listener {
            name: "dtls".to_string(),
            port: 443,
            protocol: ListenerProtocol::Dtls,
        };
        assert!(resolve_public_address(&dtls, [&svc]).is_ok());
    }

    #[test]
    fn test_first_matching_port_wins_after_unrelated_ports() {
        let svc = create_test_service(
            "default",
            "svc1",
            None,
            &[(Some("sctp"), Some("SCTP"), 12), (Some("udp-ok"), Some("UDP"), 1)],
            &["1.2.3.4", "5.6.7.8"],
        );
        // second port, second ingress entry
        let addr = resolve_public_address(&udp_listener(1), [&svc]).unwrap();
        assert_eq!(addr.address, ip("5.6.7.8"));
    }

    #[test]
    fn test_duplicate_matching_ports_pick_first() {
        let svc = create_test_service(
            "default",
            "svc1",
            None,
            &[(Some("priority"), Some("UDP"), 1), (None, Some("UDP"), 1)],
            &["5.6.7.8"],
        );
        let addr = resolve_public_address(&udp_listener(1), [&svc]).unwrap();
        assert_eq!(addr.address, ip("5.6.7.8"));
    }

    #[test]
    fn test_port_status_ties_ingress_entry() {
        let svc = with_ingress(
            create_test_service("default", "svc1", None, &[(None, Some("TCP"), 80), (None, Some("UDP"), 1)], &[]),
            vec![
                ingress_for_ports("9.9.9.9", &[("UDP", 1)]),
                ingress_for_ports("8.8.8.8", &[("TCP", 80)]),
            ],
        );
        // port index 1 would pick 8.8.8.8, the port status points to 9.9.9.9
        let addr = resolve_public_address(&udp_listener(1), [&svc]).unwrap();
        assert_eq!(addr.address, ip("9.9.9.9"));
    }

    #[test]
    fn test_hostname_ingress() {
        let svc = with_ingress(
            create_test_service("default", "svc1", None, &[(None, Some("UDP"), 1)], &[]),
            vec![LoadBalancerIngress {
                hostname: Some("lb.example.com".to_string()),
                ..Default::default()
            }],
        );
        let addr = resolve_public_address(&udp_listener(1), [&svc]).unwrap();
        assert_eq!(addr.address.type_, AddressType::Hostname);
        assert_eq!(addr.address.value, "lb.example.com");
    }

    #[test]
    fn test_no_load_balancer_address() {
        let svc = create_test_service("default", "svc1", None, &[(None, Some("UDP"), 1)], &[]);
        let err = resolve_public_address(&udp_listener(1), [&svc]).unwrap_err();
        assert!(matches!(err, ResolutionError::NoLoadBalancerAddress { .. }));
    }

    #[test]
    fn test_annotation_beats_load_balancer() {
        let svc = with_public_address(
            create_test_service("default", "svc1", None, &[(None, Some("UDP"), 1)], &["1.2.3.4"]),
            "10.0.0.1",
        );
        let addr = resolve_public_address(&udp_listener(1), [&svc]).unwrap();
        assert_eq!(addr.address, ip("10.0.0.1"));
    }

    #[test]
    fn test_annotation_skips_port_check() {
        let svc = with_public_address(
            create_test_service("default", "svc1", None, &[(None, Some("SCTP"), 9)], &[]),
            "turn.example.com",
        );
        let addr = resolve_public_address(&udp_listener(1), [&svc]).unwrap();
        assert_eq!(addr.address.type_, AddressType::Hostname);
        assert_eq!(addr.port, 1);
    }

    #[test]
    fn test_malformed_annotation_is_hard_error() {
        for value in ["in valid!", "300.1.2.3", "-bad-.example.com", ""] {
            let svc = with_public_address(
                create_test_service("default", "svc1", None, &[(None, Some("UDP"), 1)], &["1.2.3.4"]),
                value,
            );
            let fallback = create_test_service("default", "svc2", None, &[(None, Some("UDP"), 1)], &["5.6.7.8"]);
            let err = resolve_public_address(&udp_listener(1), [&svc, &fallback]).unwrap_err();
            assert!(
                matches!(err, ResolutionError::MalformedAnnotation { .. }),
                "{value:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_later_service_resolves_after_mismatch() {
        let wrong = create_test_service("default", "a", None, &[(None, Some("TCP"), 1)], &["1.1.1.1"]);
        let right = create_test_service("default", "b", None, &[(None, Some("UDP"), 1)], &["2.2.2.2"]);
        let addr = resolve_public_address(&udp_listener(1), [&wrong, &right]).unwrap();
        assert_eq!(addr.address, ip("2.2.2.2"));

        let empty = create_test_service("default", "c", None, &[(None, Some("UDP"), 1)], &[]);
        let err = resolve_public_address(&udp_listener(1), [&wrong, &empty]).unwrap_err();
        assert!(matches!(err, ResolutionError::PortMismatch { .. }), "first error is kept");
    }

    #[test]
    fn test_non_turn_listener_unsupported() {
        let svc = create_test_service("default", "svc1", None, &[(None, Some("TCP"), 80)], &["1.2.3.4"]);
        let http = Listener {
            name: "http".to_string(),
            port: 80,
            protocol: ListenerProtocol::Unknown,
        };
        let err = resolve_public_address(&http, [&svc]).unwrap_err();
        assert_eq!(err, ResolutionError::UnsupportedProtocol);
        // the annotation does not make it a TURN listener either
        let annotated = with_public_address(svc, "5.6.7.8");
        assert_eq!(resolve_for_service(&http, &annotated).unwrap_err(), ResolutionError::UnsupportedProtocol);
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("::1").unwrap().type_, AddressType::IpAddress);
        assert_eq!(parse_address("Turn.Example.com").unwrap().type_, AddressType::Hostname);
        assert!(parse_address("1.2.3").is_none());
        assert!(parse_address("a..b").is_none());
    }
}
