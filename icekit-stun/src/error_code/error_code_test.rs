use super::*;

#[test]
fn test_error_code_attribute() -> Result<()> {
    let tests = vec![
        (CODE_BAD_REQUEST, "Bad Request"),
        (CODE_UNAUTHORIZED, "Unauthorized"),
        (CODE_ROLE_CONFLICT, "Role Conflict"),
        (CODE_SERVER_ERROR, "Server Error"),
    ];

    for (code, reason) in tests {
        let mut m = Message::new();
        m.build(&[Box::new(BINDING_ERROR), Box::new(code)])?;

        let mut decoded = Message::new();
        decoded.unmarshal_binary(&m.raw)?;

        let mut attr = ErrorCodeAttribute::default();
        attr.get_from(&decoded)?;
        assert_eq!(attr.code, code, "code");
        assert_eq!(attr.reason, reason.as_bytes(), "reason for {}", code.0);
    }

    Ok(())
}

#[test]
fn test_error_code_unknown_reason() -> Result<()> {
    let mut m = Message::new();
    m.build(&[Box::new(BINDING_ERROR)])?;
    assert!(ErrorCode(599).add_to(&mut m).is_err());

    m.add(ATTR_ERROR_CODE, &[0, 0, 4]);
    let mut attr = ErrorCodeAttribute::default();
    assert_eq!(attr.get_from(&m), Err(Error::ErrUnexpectedEof));

    Ok(())
}
