use super::*;
use crate::textattrs::*;

fn header(typ: u16, length: u16, cookie: u32) -> Vec<u8> {
    let mut b = vec![];
    b.extend_from_slice(&typ.to_be_bytes());
    b.extend_from_slice(&length.to_be_bytes());
    b.extend_from_slice(&cookie.to_be_bytes());
    b.extend_from_slice(&[0xab; TRANSACTION_ID_SIZE]);
    b
}

#[test]
fn test_message_type_value() -> Result<()> {
    let tests = vec![
        (BINDING_REQUEST, 0x0001u16),
        (MessageType::new(METHOD_BINDING, CLASS_INDICATION), 0x0011),
        (BINDING_SUCCESS, 0x0101),
        (BINDING_ERROR, 0x0111),
        (MessageType::new(Method(0xfff), CLASS_ERROR_RESPONSE), 0x3fff),
    ];

    for (typ, want) in tests {
        assert_eq!(typ.value(), want, "{typ} value");

        let mut got = MessageType::default();
        got.read_value(want);
        assert_eq!(got, typ, "read_value(0x{want:04x})");
    }

    Ok(())
}

#[test]
fn test_message_build_and_decode() -> Result<()> {
    let tid = TransactionId([7; TRANSACTION_ID_SIZE]);
    let mut m = Message::new();
    m.build(&[
        Box::new(BINDING_REQUEST),
        Box::new(tid),
        Box::new(Username::new(ATTR_USERNAME, "remote:local".to_owned())),
        Box::new(TextAttribute::new(ATTR_SOFTWARE, "icekit".to_owned())),
    ])?;

    assert_eq!(m.raw.len(), MESSAGE_HEADER_SIZE + m.length as usize);
    assert_eq!(m.length % 4, 0, "length must stay 32-bit aligned");
    assert!(is_message(&m.raw));

    let mut decoded = Message::new();
    decoded.unmarshal_binary(&m.raw)?;
    assert_eq!(decoded, m);
    assert_eq!(decoded.transaction_id, tid);
    assert_eq!(decoded.typ, BINDING_REQUEST);

    let username = TextAttribute::get_from_as(&decoded, ATTR_USERNAME)?;
    assert_eq!(username.text, "remote:local");
    let software = TextAttribute::get_from_as(&decoded, ATTR_SOFTWARE)?;
    assert_eq!(software.text, "icekit");
    assert!(!decoded.contains(ATTR_PRIORITY));
    assert_eq!(decoded.get(ATTR_PRIORITY), Err(Error::ErrAttributeNotFound));

    Ok(())
}

#[test]
fn test_message_decode_malformed() -> Result<()> {
    let mut overflow = header(0x0001, 8, MAGIC_COOKIE);
    overflow.extend_from_slice(&[0x00, 0x06, 0x00, 0x10, 1, 2, 3, 4]);

    let mut truncated_attr = header(0x0001, 4, MAGIC_COOKIE);
    truncated_attr.extend_from_slice(&[0x00, 0x06, 0x00, 0x01]);

    let tests = vec![
        ("empty", vec![], Error::ErrUnexpectedHeaderEof),
        ("short header", vec![0x00, 0x01, 0x00], Error::ErrUnexpectedHeaderEof),
        (
            "first bits set",
            header(0xc001, 0, MAGIC_COOKIE),
            Error::ErrInvalidMessageType(0xc001),
        ),
        (
            "bad cookie",
            header(0x0001, 0, 0xdeadbeef),
            Error::ErrInvalidMagicCookie(0xdeadbeef),
        ),
        (
            "unaligned length",
            header(0x0001, 3, MAGIC_COOKIE),
            Error::ErrMessageLengthUnaligned(3),
        ),
        (
            "length past buffer",
            header(0x0001, 8, MAGIC_COOKIE),
            Error::ErrUnexpectedEof,
        ),
        ("attribute overflow", overflow, Error::ErrAttributeSizeOverflow),
        (
            "attribute value missing",
            truncated_attr,
            Error::ErrAttributeSizeOverflow,
        ),
    ];

    for (name, input, want) in tests {
        let mut m = Message::new();
        let got = m.unmarshal_binary(&input);
        assert_eq!(got, Err(want), "{name}");
    }

    Ok(())
}

#[test]
fn test_is_message() {
    let tests = vec![
        (vec![], false),
        (header(0x0001, 0, MAGIC_COOKIE), true),
        (header(0x0001, 0, 0), false),
        (header(0x8001, 0, MAGIC_COOKIE), false),
        (vec![0x00, 0x01, 0x00, 0x00, 0x21, 0x12, 0xa4, 0x42], false),
    ];

    for (input, want) in tests {
        assert_eq!(is_message(&input), want, "is_message({input:?})");
    }
}

#[test]
fn test_message_add_pads_with_zeroes() -> Result<()> {
    let mut m = Message::new();
    m.build(&[Box::new(MessageType::new(METHOD_BINDING, CLASS_INDICATION))])?;
    m.add(ATTR_SOFTWARE, b"abcde");

    assert_eq!(m.length, 12);
    assert_eq!(&m.raw[MESSAGE_HEADER_SIZE + 4..], b"abcde\0\0\0");
    assert_eq!(u16::from_be_bytes([m.raw[2], m.raw[3]]), 12);

    Ok(())
}
