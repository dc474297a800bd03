use super::*;

fn message_with_tid(tid: [u8; TRANSACTION_ID_SIZE]) -> Result<Message> {
    let mut m = Message::new();
    m.build(&[Box::new(BINDING_SUCCESS), Box::new(TransactionId(tid))])?;
    Ok(m)
}

#[test]
fn test_xor_mapped_address_rfc5769_ipv4() -> Result<()> {
    let tid = [
        0xb7, 0xe7, 0xa7, 0x01, 0xbc, 0x34, 0xd6, 0x86, 0xfa, 0x87, 0xdf, 0xae,
    ];
    let mut m = message_with_tid(tid)?;
    m.add(
        ATTR_XORMAPPED_ADDRESS,
        &[0x00, 0x01, 0xa1, 0x47, 0xe1, 0x12, 0xa6, 0x43],
    );

    let mut addr = XorMappedAddress::default();
    addr.get_from(&m)?;
    assert_eq!(addr.to_string(), "192.0.2.1:32853");

    Ok(())
}

#[test]
fn test_xor_mapped_address_round_trip() -> Result<()> {
    let tests: Vec<SocketAddr> = vec![
        "10.0.0.1:5000".parse().unwrap(),
        "[2001:db8:1234:5678:11:2233:4455:6677]:32853".parse().unwrap(),
    ];

    for addr in tests {
        let mut m = message_with_tid([0x42; TRANSACTION_ID_SIZE])?;
        XorMappedAddress::from(addr).add_to(&mut m)?;

        let mut decoded = Message::new();
        decoded.unmarshal_binary(&m.raw)?;

        let mut got = XorMappedAddress::default();
        got.get_from(&decoded)?;
        assert_eq!(SocketAddr::new(got.ip, got.port), addr, "{addr}");
    }

    Ok(())
}

#[test]
fn test_xor_mapped_address_bad_input() -> Result<()> {
    let tests = vec![
        (vec![0x00, 0x03, 0x00, 0x00, 1, 2, 3, 4], Error::ErrBadAddressFamily(3)),
        (vec![0x00, 0x01, 0x00, 0x00, 1, 2, 3, 4, 5, 6], Error::ErrBadIpLength),
        (vec![0x00, 0x01, 0x00, 0x00], Error::ErrUnexpectedEof),
    ];

    for (value, want) in tests {
        let mut m = message_with_tid([0; TRANSACTION_ID_SIZE])?;
        m.add(ATTR_XORMAPPED_ADDRESS, &value);

        let mut got = XorMappedAddress::default();
        assert_eq!(got.get_from(&m), Err(want), "{value:?}");
    }

    Ok(())
}
