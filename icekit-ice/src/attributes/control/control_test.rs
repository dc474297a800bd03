use super::*;
use crate::attributes::{priority::PriorityAttr, use_candidate::UseCandidateAttr};

#[test]
fn test_control_round_trip() -> Result<()> {
    let tests = vec![
        (AttrControl::new(Role::Controlling, 4321), ATTR_ICE_CONTROLLING),
        (AttrControl::new(Role::Controlled, u64::MAX), ATTR_ICE_CONTROLLED),
    ];

    for (control, attr) in tests {
        let mut m = Message::new();
        m.build(&[Box::new(BINDING_REQUEST), Box::new(control)])?;
        assert!(m.contains(attr), "{control:?} should be encoded as {attr}");

        let mut decoded = Message::new();
        decoded.unmarshal_binary(&m.raw)?;

        let mut got = AttrControl::default();
        got.get_from(&decoded)?;
        assert_eq!(got, control);
    }

    Ok(())
}

#[test]
fn test_control_specific_attrs() -> Result<()> {
    let mut m = Message::new();
    m.build(&[Box::new(BINDING_REQUEST), Box::new(AttrControlled(7))])?;

    let mut controlled = AttrControlled::default();
    controlled.get_from(&m)?;
    assert_eq!(controlled, AttrControlled(7));

    let mut controlling = AttrControlling::default();
    assert_eq!(
        controlling.get_from(&m),
        Err(Error::ErrAttributeNotFound),
        "ICE-CONTROLLING is absent"
    );

    m.add(ATTR_ICE_CONTROLLING, &[1, 2, 3]);
    assert_eq!(
        controlling.get_from(&m),
        Err(Error::ErrAttributeSizeInvalid)
    );

    let mut none = Message::new();
    none.build(&[Box::new(BINDING_REQUEST)])?;
    let mut control = AttrControl::default();
    assert_eq!(control.get_from(&none), Err(Error::ErrAttributeNotFound));

    Ok(())
}

#[test]
fn test_priority_and_use_candidate() -> Result<()> {
    let mut m = Message::new();
    m.build(&[
        Box::new(BINDING_REQUEST),
        Box::new(PriorityAttr(0x6e0001ff)),
        Box::new(UseCandidateAttr::new()),
    ])?;

    let mut decoded = Message::new();
    decoded.unmarshal_binary(&m.raw)?;

    let mut priority = PriorityAttr::default();
    priority.get_from(&decoded)?;
    assert_eq!(priority, PriorityAttr(0x6e0001ff));
    assert!(UseCandidateAttr::is_set(&decoded));

    let mut plain = Message::new();
    plain.build(&[Box::new(BINDING_REQUEST)])?;
    assert!(!UseCandidateAttr::is_set(&plain));
    assert_eq!(priority.get_from(&plain), Err(Error::ErrAttributeNotFound));

    Ok(())
}
