use super::*;

use std::net::{IpAddr, Ipv4Addr};

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

fn transport() -> TransportContext {
    TransportContext {
        local_addr: "10.0.0.1:5000".parse().unwrap(),
        peer_addr: "10.0.0.2:6000".parse().unwrap(),
        ..Default::default()
    }
}

fn request() -> Result<Message> {
    let mut m = Message::new();
    m.build(&[Box::new(BINDING_REQUEST), Box::new(TransactionId::new())])?;
    Ok(m)
}

fn success_for(req: &Message, mapped: SocketAddr) -> Result<Message> {
    let mut m = Message::new();
    m.build(&[
        Box::new(req.clone()),
        Box::new(BINDING_SUCCESS),
        Box::new(XorMappedAddress::from(mapped)),
    ])?;
    Ok(m)
}

#[test]
fn test_transaction_retransmits_until_timeout() -> Result<()> {
    let mut engine = TransactionEngine::new(pacing());
    let t0 = Instant::now();
    let req = request()?;

    let handle = engine.start(&req, transport(), t0)?;
    assert!(engine.poll_transmit().is_some(), "first transmission");
    assert_eq!(engine.poll_timeout(), Some(t0 + Duration::from_millis(500)));

    let mut elapsed = Duration::ZERO;
    let mut sent = 1;
    for wait in [500, 1000, 2000, 4000, 8000, 16000] {
        elapsed += Duration::from_millis(wait);
        engine.handle_timeout(t0 + elapsed);
        assert!(engine.poll_transmit().is_some(), "retransmission at {elapsed:?}");
        assert_eq!(
            engine.poll_event(),
            Some(TransactionEvent::Retransmitted { handle })
        );
        sent += 1;
    }
    assert_eq!(sent, 7);
    assert_eq!(engine.get(handle).map(|t| t.transmissions()), Some(7));

    // No more retransmissions; the final wait is Rm * RTO.
    engine.handle_timeout(t0 + elapsed + Duration::from_millis(7999));
    assert!(engine.poll_transmit().is_none());
    assert!(engine.poll_event().is_none());

    engine.handle_timeout(t0 + Duration::from_millis(39500));
    assert!(engine.poll_transmit().is_none());
    assert_eq!(
        engine.poll_event(),
        Some(TransactionEvent::TimedOut {
            handle,
            transaction_id: req.transaction_id,
        })
    );
    assert!(engine.is_empty());
    assert_eq!(engine.pending_timers(), 0);
    assert_eq!(engine.lookup(&req.transaction_id), None);

    Ok(())
}

#[test]
fn test_transaction_success_response() -> Result<()> {
    let mut engine = TransactionEngine::new(pacing());
    let t0 = Instant::now();
    let req = request()?;
    let handle = engine.start(&req, transport(), t0)?;
    assert_eq!(engine.lookup(&req.transaction_id), Some(handle));

    let mapped = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7)), 40000);
    let resp = success_for(&req, mapped)?;
    let got = engine.on_response(
        handle,
        &resp,
        transport().peer_addr,
        t0 + Duration::from_millis(30),
    )?;

    assert_eq!(
        got,
        TransactionResult::Success {
            mapped_address: mapped,
            rtt: Duration::from_millis(30),
        }
    );
    assert!(engine.is_empty());
    assert_eq!(engine.pending_timers(), 0);

    // Completed exactly once.
    let again = engine.on_response(handle, &resp, transport().peer_addr, t0);
    assert_eq!(again, Err(Error::ErrTransactionNotExists));

    Ok(())
}

#[test]
fn test_transaction_ignores_mismatched_response() -> Result<()> {
    let mut engine = TransactionEngine::new(pacing());
    let t0 = Instant::now();
    let req = request()?;
    let handle = engine.start(&req, transport(), t0)?;

    let mapped: SocketAddr = "192.0.2.7:40000".parse().unwrap();
    let resp = success_for(&req, mapped)?;
    let wrong_source: SocketAddr = "10.0.0.3:6000".parse().unwrap();
    assert_eq!(
        engine.on_response(handle, &resp, wrong_source, t0)?,
        TransactionResult::StillPending,
        "response from another address"
    );

    let other = success_for(&request()?, mapped)?;
    assert_eq!(
        engine.on_response(handle, &other, transport().peer_addr, t0)?,
        TransactionResult::StillPending,
        "response for another transaction"
    );
    assert_eq!(engine.len(), 1);
    assert_eq!(engine.pending_timers(), 1);

    Ok(())
}

#[test]
fn test_transaction_error_response() -> Result<()> {
    let mut engine = TransactionEngine::new(pacing());
    let t0 = Instant::now();
    let req = request()?;
    let handle = engine.start(&req, transport(), t0)?;

    let mut resp = Message::new();
    resp.build(&[
        Box::new(req.clone()),
        Box::new(BINDING_ERROR),
        Box::new(CODE_ROLE_CONFLICT),
    ])?;

    let got = engine.on_response(handle, &resp, transport().peer_addr, t0)?;
    assert_eq!(
        got,
        TransactionResult::Failure {
            code: Some(487),
            reason: "Role Conflict".to_owned(),
            rtt: Duration::ZERO,
        }
    );

    Ok(())
}

#[test]
fn test_transaction_success_without_mapped_address() -> Result<()> {
    let mut engine = TransactionEngine::new(pacing());
    let t0 = Instant::now();
    let req = request()?;
    let handle = engine.start(&req, transport(), t0)?;

    let mut resp = Message::new();
    resp.build(&[Box::new(req.clone()), Box::new(BINDING_SUCCESS)])?;

    match engine.on_response(handle, &resp, transport().peer_addr, t0)? {
        TransactionResult::Failure { code, .. } => assert_eq!(code, None),
        other => panic!("expected failure, got {other:?}"),
    }

    Ok(())
}

#[test]
fn test_transaction_cancel() -> Result<()> {
    let mut engine = TransactionEngine::new(pacing());
    let t0 = Instant::now();
    let req = request()?;
    let handle = engine.start(&req, transport(), t0)?;
    let _ = engine.poll_transmit();

    assert!(engine.cancel(handle));
    assert!(!engine.cancel(handle), "second cancel is a no-op");
    assert_eq!(engine.pending_timers(), 0);

    engine.handle_timeout(t0 + Duration::from_secs(60));
    assert!(engine.poll_transmit().is_none());
    assert!(engine.poll_event().is_none());

    Ok(())
}

#[test]
fn test_transaction_duplicate_and_closed() -> Result<()> {
    let mut engine = TransactionEngine::new(pacing());
    let t0 = Instant::now();
    let req = request()?;
    engine.start(&req, transport(), t0)?;

    assert_eq!(
        engine.start(&req, transport(), t0).err(),
        Some(Error::ErrTransactionExists)
    );

    engine.close();
    assert!(engine.is_empty());
    assert_eq!(
        engine.start(&request()?, transport(), t0).err(),
        Some(Error::ErrTransactionEngineClosed)
    );

    Ok(())
}

#[test]
fn test_transaction_retransmit_now_keeps_schedule() -> Result<()> {
    let mut engine = TransactionEngine::new(pacing());
    let t0 = Instant::now();
    let req = request()?;
    let handle = engine.start(&req, transport(), t0)?;
    let _ = engine.poll_transmit();

    engine.retransmit_now(handle, t0 + Duration::from_millis(100))?;
    let sent = engine.poll_transmit().expect("retransmit");
    assert_eq!(&sent.message[..], &req.raw[..]);
    assert_eq!(sent.transport, transport());
    assert_eq!(engine.poll_timeout(), Some(t0 + Duration::from_millis(500)));

    Ok(())
}
