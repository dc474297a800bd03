use super::candidate_host::*;
use super::candidate_peer_reflexive::*;
use super::candidate_relay::*;
use super::candidate_server_reflexive::*;
use super::*;

pub(crate) fn host(address: &str, port: u16, component: u16, local_preference: u16) -> Result<Candidate> {
    CandidateHostConfig {
        base_config: CandidateConfig {
            address: address.to_owned(),
            port,
            component,
            local_preference: Some(local_preference),
            ..Default::default()
        },
    }
    .new_candidate_host()
}

#[test]
fn test_candidate_priority() -> Result<()> {
    let tests = vec![
        (host("10.0.0.1", 5000, 1, 65535)?, 2130706431),
        (host("10.0.0.1", 5000, 1, 65534)?, 2130706175),
        (host("10.0.0.1", 5001, 2, 65535)?, 2130706430),
        (
            CandidateServerReflexiveConfig {
                base_config: CandidateConfig {
                    address: "1.2.3.4".to_owned(),
                    port: 6000,
                    component: 1,
                    ..Default::default()
                },
                rel_addr: "10.0.0.1".to_owned(),
                rel_port: 5000,
            }
            .new_candidate_server_reflexive()?,
            1694498815,
        ),
        (
            CandidatePeerReflexiveConfig {
                base_config: CandidateConfig {
                    address: "1.2.3.5".to_owned(),
                    port: 6001,
                    component: 1,
                    ..Default::default()
                },
                ..Default::default()
            }
            .new_candidate_peer_reflexive()?,
            1862270975,
        ),
        (
            CandidateRelayConfig {
                base_config: CandidateConfig {
                    address: "5.6.7.8".to_owned(),
                    port: 7000,
                    component: 1,
                    ..Default::default()
                },
                ..Default::default()
            }
            .new_candidate_relay()?,
            16777215,
        ),
    ];

    for (candidate, want) in tests {
        assert_eq!(candidate.priority(), want, "priority of {candidate}");
    }

    Ok(())
}

#[test]
fn test_candidate_priority_override() -> Result<()> {
    let c = CandidateHostConfig {
        base_config: CandidateConfig {
            address: "10.0.0.1".to_owned(),
            port: 5000,
            component: 1,
            priority: 42,
            foundation: "remote-foundation".to_owned(),
            ..Default::default()
        },
    }
    .new_candidate_host()?;

    assert_eq!(c.priority(), 42);
    assert_eq!(c.foundation(), "remote-foundation");
    assert_eq!(c.peer_reflexive_priority(), 1862270975);

    Ok(())
}

#[test]
fn test_candidate_base_and_foundation() -> Result<()> {
    let host_a = host("10.0.0.1", 5000, 1, 65535)?;
    let host_b = host("10.0.0.1", 5002, 2, 65535)?;
    let host_c = host("10.0.0.2", 5000, 1, 65535)?;
    let srflx = CandidateServerReflexiveConfig {
        base_config: CandidateConfig {
            address: "1.2.3.4".to_owned(),
            port: 6000,
            component: 1,
            ..Default::default()
        },
        rel_addr: "10.0.0.1".to_owned(),
        rel_port: 5000,
    }
    .new_candidate_server_reflexive()?;

    assert_eq!(host_a.base(), host_a.addr());
    assert_eq!(srflx.base(), host_a.addr(), "srflx base is its host address");
    assert_eq!(
        host_a.foundation(),
        host_b.foundation(),
        "same type, base IP and transport"
    );
    assert_ne!(host_a.foundation(), host_c.foundation());
    assert_ne!(host_a.foundation(), srflx.foundation());

    let relay = CandidateRelayConfig {
        base_config: CandidateConfig {
            address: "5.6.7.8".to_owned(),
            port: 7000,
            component: 1,
            ..Default::default()
        },
        rel_addr: "1.2.3.4".to_owned(),
        rel_port: 6000,
    }
    .new_candidate_relay()?;
    assert_eq!(relay.base(), relay.addr(), "relay base is the relayed address");
    assert!(relay.is_relayed());

    Ok(())
}

#[test]
fn test_candidate_builder_errors() {
    let no_related = CandidateServerReflexiveConfig {
        base_config: CandidateConfig {
            address: "1.2.3.4".to_owned(),
            port: 6000,
            component: 1,
            ..Default::default()
        },
        ..Default::default()
    }
    .new_candidate_server_reflexive();
    assert_eq!(
        no_related,
        Err(Error::ErrRelatedAddressRequired("srflx".to_owned()))
    );

    let tests = vec![
        (("not-an-ip", 1), Error::ErrAddressParseFailed),
        (("10.0.0.1", 0), Error::ErrInvalidComponent(0)),
        (("10.0.0.1", 257), Error::ErrInvalidComponent(257)),
    ];
    for ((address, component), want) in tests {
        let got = CandidateHostConfig {
            base_config: CandidateConfig {
                address: address.to_owned(),
                component,
                ..Default::default()
            },
        }
        .new_candidate_host();
        assert_eq!(got, Err(want), "{address} component {component}");
    }
}

#[test]
fn test_candidate_equal() -> Result<()> {
    let srflx = |rel_addr: &str| {
        CandidateServerReflexiveConfig {
            base_config: CandidateConfig {
                address: "1.2.3.4".to_owned(),
                port: 6000,
                component: 1,
                ..Default::default()
            },
            rel_addr: rel_addr.to_owned(),
            rel_port: 5000,
        }
        .new_candidate_server_reflexive()
    };
    let c = srflx("10.0.0.1")?;

    assert!(c.equal(&c.clone()));
    assert!(c.equal(&srflx("10.0.0.1")?));
    assert!(!c.equal(&srflx("10.0.0.9")?), "related address differs");

    let host = CandidateHostConfig {
        base_config: CandidateConfig {
            address: "1.2.3.4".to_owned(),
            port: 6000,
            component: 1,
            ..Default::default()
        },
    }
    .new_candidate_host()?;
    assert!(!c.equal(&host), "candidate type differs");

    Ok(())
}
