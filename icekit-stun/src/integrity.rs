
use crate::attributes::*;
use crate::message::*;
use crate::textattrs::check_size;
use shared::error::*;

use ring::hmac;
use std::fmt;
use subtle::ConstantTimeEq;

pub(crate) const MESSAGE_INTEGRITY_SIZE: usize = 20;

// MessageIntegrity represents MESSAGE-INTEGRITY attribute, keyed by the
// short-term credential password.
//
// RFC 5389 Section 15.4
#[derive(Default, Clone)]
pub struct MessageIntegrity(pub Vec<u8>);

fn new_hmac(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mac = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, key);
    hmac::sign(&mac, message).as_ref().to_vec()
}

impl fmt::Display for MessageIntegrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KEY: 0x{:x?}", self.0)
    }
}

impl fmt::Debug for MessageIntegrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageIntegrity({} bytes)", self.0.len())
    }
}

impl Setter for MessageIntegrity {
    // add_to adds MESSAGE-INTEGRITY attribute to message.
    fn add_to(&self, m: &mut Message) -> Result<()> {
        for a in &m.attributes.0 {
            // Message should not contain FINGERPRINT attribute
            // before MESSAGE-INTEGRITY.
            if a.typ == ATTR_FINGERPRINT {
                return Err(Error::ErrFingerprintBeforeIntegrity);
            }
        }

        // The text used as input to HMAC is the STUN message,
        // including the header, up to and including the attribute preceding the
        // MESSAGE-INTEGRITY attribute.
        let length = m.length;
        // Adjusting m.length to contain MESSAGE-INTEGRITY TLV.
        m.length += (MESSAGE_INTEGRITY_SIZE + ATTRIBUTE_HEADER_SIZE) as u32;
        m.write_length(); // writing length to m.raw
        let v = new_hmac(&self.0, &m.raw); // calculating HMAC for adjusted m.raw
        m.length = length; // changing m.length back

        m.add(ATTR_MESSAGE_INTEGRITY, &v);

        Ok(())
    }
}

impl MessageIntegrity {
    // new_short_term_integrity returns new MessageIntegrity with key for short-term
    // credentials. Password is SASL-prepared and is used as key.
    pub fn new_short_term_integrity(password: String) -> Self {
        MessageIntegrity(password.as_bytes().to_vec())
    }

    // check checks MESSAGE-INTEGRITY attribute.
    pub fn check(&self, m: &Message) -> Result<()> {
        let v = m.get(ATTR_MESSAGE_INTEGRITY)?;
        check_size(ATTR_MESSAGE_INTEGRITY, v.len(), MESSAGE_INTEGRITY_SIZE)?;

        let offset = m
            .attribute_offset(ATTR_MESSAGE_INTEGRITY)
            .ok_or(Error::ErrAttributeNotFound)?;
        if m.raw.len() < offset {
            return Err(Error::ErrUnexpectedEof);
        }

        // Attributes after MESSAGE-INTEGRITY (FINGERPRINT) are not covered, so the
        // header length is rewritten as if MESSAGE-INTEGRITY were the last attribute.
        let mut b = m.raw[..offset].to_vec();
        let length = offset - MESSAGE_HEADER_SIZE + ATTRIBUTE_HEADER_SIZE + MESSAGE_INTEGRITY_SIZE;
        b[2..4].copy_from_slice(&(length as u16).to_be_bytes());

        let expected = new_hmac(&self.0, &b);
        if bool::from(v.as_slice().ct_eq(expected.as_slice())) {
            Ok(())
        } else {
            Err(Error::ErrIntegrityMismatch)
        }
    }
}
