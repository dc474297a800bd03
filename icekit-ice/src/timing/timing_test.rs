use super::*;

fn pacing() -> Pacing {
    Pacing {
        initial_rto: Duration::from_millis(500),
        max_rto: None,
        max_transmissions: 7,
        final_timeout_multiplier: 16,
        min_check_interval: Duration::from_millis(20),
        check_interval_budget: Duration::from_millis(500),
    }
}

#[test]
fn test_retransmit_timeout_doubles() {
    let p = pacing();
    let got: Vec<u64> = (0..7)
        .map(|n| p.retransmit_timeout(n).as_millis() as u64)
        .collect();

    assert_eq!(got, vec![500, 1000, 2000, 4000, 8000, 16000, 8000]);
    assert_eq!(p.transaction_timeout(), Duration::from_millis(39500));
}

#[test]
fn test_retransmit_timeout_with_ceiling() {
    let p = Pacing {
        max_rto: Some(Duration::from_millis(1600)),
        ..pacing()
    };
    let got: Vec<u64> = (0..7)
        .map(|n| p.retransmit_timeout(n).as_millis() as u64)
        .collect();

    assert_eq!(got, vec![500, 1000, 1600, 1600, 1600, 1600, 8000]);
}

#[test]
fn test_retransmit_timeout_single_transmission() {
    let p = Pacing {
        max_transmissions: 1,
        ..pacing()
    };

    assert_eq!(p.retransmit_timeout(0), Duration::from_secs(8));
    assert_eq!(p.transaction_timeout(), Duration::from_secs(8));
}

#[test]
fn test_check_interval() {
    let p = pacing();
    let tests = vec![
        (0, 500),
        (1, 500),
        (2, 250),
        (5, 100),
        (25, 20),
        (100, 20),
    ];

    for (active, want) in tests {
        assert_eq!(
            p.check_interval(active),
            Duration::from_millis(want),
            "check_interval({active})"
        );
    }
}
