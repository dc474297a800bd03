#![allow(dead_code)]

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    //STUN errors
    #[error("attribute not found")]
    ErrAttributeNotFound,
    #[error("unexpected EOF")]
    ErrUnexpectedEof,
    #[error("unexpected EOF: not enough bytes to read header")]
    ErrUnexpectedHeaderEof,
    #[error("attribute size is invalid")]
    ErrAttributeSizeInvalid,
    #[error("attribute size overflow")]
    ErrAttributeSizeOverflow,
    #[error("message length {0} is not a multiple of 4")]
    ErrMessageLengthUnaligned(usize),
    #[error("{0:#010x} is invalid magic cookie (should be 0x2112a442)")]
    ErrInvalidMagicCookie(u32),
    #[error("first two bits of the message type must be zero, got {0:#06x}")]
    ErrInvalidMessageType(u16),
    #[error("integrity check failed")]
    ErrIntegrityMismatch,
    #[error("fingerprint check failed")]
    ErrFingerprintMismatch,
    #[error("FINGERPRINT before MESSAGE-INTEGRITY attribute")]
    ErrFingerprintBeforeIntegrity,
    #[error("FINGERPRINT is not the last attribute")]
    ErrFingerprintNotLast,
    #[error("invalid length of IP value")]
    ErrBadIpLength,
    #[error("unknown address family {0:#04x}")]
    ErrBadAddressFamily(u8),
    #[error("attribute value is too long: {0} bytes, max {1}")]
    ErrAttributeTooLong(usize, usize),

    //Transaction errors
    #[error("transaction not exists")]
    ErrTransactionNotExists,
    #[error("transaction exists with same id")]
    ErrTransactionExists,
    #[error("transaction engine is closed")]
    ErrTransactionEngineClosed,

    //ICE errors
    /// Indicates the session was started twice.
    #[error("attempted to start connectivity checks twice")]
    ErrMultipleStart,

    /// Indicates candidates were supplied once checks were running.
    #[error("candidates must be set before connectivity checks start")]
    ErrCandidatesAfterStart,

    /// Indicates the session was started with an empty remote ufrag.
    #[error("remote ufrag is empty")]
    ErrRemoteUfragEmpty,

    /// Indicates the session was started with an empty remote pwd.
    #[error("remote pwd is empty")]
    ErrRemotePwdEmpty,

    /// Indicates a component id outside 1..=256 or listed twice.
    #[error("invalid component id {0}")]
    ErrInvalidComponent(u16),

    /// Indicates the session has no checklist for the component.
    #[error("unknown component {0}")]
    ErrUnknownComponent(u16),

    /// Indicates a candidate was handed to the checklist of another component.
    #[error("candidate of component {0} given for component {1}")]
    ErrComponentMismatch(u16, u16),

    /// Indicates we were unable to parse a candidate address.
    #[error("failed to parse address")]
    ErrAddressParseFailed,

    /// Indicates a server reflexive, peer reflexive or relayed candidate without a related address.
    #[error("related address is required for {0} candidates")]
    ErrRelatedAddressRequired(String),

    /// Indicates a pair handle that no longer points at a live pair.
    #[error("candidate pair not exists")]
    ErrPairNotExists,

    /// Indicates an attempt to bind a second transaction to a pair.
    #[error("candidate pair already has a transaction in flight")]
    ErrPairTransactionInFlight,

    /// Indicates a check state transition that goes backwards.
    #[error("invalid check state transition from {0} to {1}")]
    ErrInvalidStateTransition(String, String),

    #[error("username mismatch")]
    ErrMismatchUsername,
    #[error("session is closed")]
    ErrSessionClosed,
    #[error("not a STUN packet")]
    ErrNotStunPacket,

    #[error("Other STUN Err: {0}")]
    OtherStunErr(String),
    #[error("{0}")]
    Other(String),
}
