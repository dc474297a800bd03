#[cfg(test)]
mod error_code_test;

use crate::attributes::*;
use crate::message::*;
use shared::error::*;

use std::fmt;

// ErrorCodeAttribute represents ERROR-CODE attribute.
//
// RFC 5389 Section 15.6
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct ErrorCodeAttribute {
    pub code: ErrorCode,
    pub reason: Vec<u8>,
}

impl fmt::Display for ErrorCodeAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = String::from_utf8_lossy(&self.reason);
        write!(f, "{}: {}", self.code.0, reason)
    }
}

// constants for ERROR-CODE encoding.
const ERROR_CODE_CLASS_BYTE: usize = 2;
const ERROR_CODE_NUMBER_BYTE: usize = 3;
const ERROR_CODE_REASON_START: usize = 4;
const ERROR_CODE_REASON_MAX_B: usize = 763;
const ERROR_CODE_MODULO: u16 = 100;

impl Setter for ErrorCodeAttribute {
    // add_to adds ERROR-CODE to m.
    fn add_to(&self, m: &mut Message) -> Result<()> {
        if self.reason.len() > ERROR_CODE_REASON_MAX_B {
            return Err(Error::ErrAttributeTooLong(
                self.reason.len(),
                ERROR_CODE_REASON_MAX_B,
            ));
        }

        let mut value: Vec<u8> = Vec::with_capacity(ERROR_CODE_REASON_START + self.reason.len());

        let number = (self.code.0 % ERROR_CODE_MODULO) as u8; // error code modulo 100
        let class = (self.code.0 / ERROR_CODE_MODULO) as u8; // hundred digit
        value.extend_from_slice(&[0, 0]);
        value.push(class); // [ERROR_CODE_CLASS_BYTE]
        value.push(number); // [ERROR_CODE_NUMBER_BYTE]
        value.extend_from_slice(&self.reason); // [ERROR_CODE_REASON_START:]

        m.add(ATTR_ERROR_CODE, &value);

        Ok(())
    }
}

impl Getter for ErrorCodeAttribute {
    // get_from decodes ERROR-CODE from m. Reason is copied out of m.
    fn get_from(&mut self, m: &Message) -> Result<()> {
        let v = m.get(ATTR_ERROR_CODE)?;

        if v.len() < ERROR_CODE_REASON_START {
            return Err(Error::ErrUnexpectedEof);
        }

        let class = (v[ERROR_CODE_CLASS_BYTE] & 0x07) as u16;
        let number = v[ERROR_CODE_NUMBER_BYTE] as u16;
        let code = class * ERROR_CODE_MODULO + number;
        self.code = ErrorCode(code);
        self.reason = v[ERROR_CODE_REASON_START..].to_vec();

        Ok(())
    }
}

// ErrorCode is code for ERROR-CODE attribute.
#[derive(PartialEq, Eq, Hash, Copy, Clone, Default, Debug)]
pub struct ErrorCode(pub u16);

impl Setter for ErrorCode {
    // add_to adds ERROR-CODE with default reason to m. If there
    // is no default reason, returns ErrNoDefaultReason.
    fn add_to(&self, m: &mut Message) -> Result<()> {
        let reason = self.reason().ok_or_else(|| {
            Error::OtherStunErr(format!("no default reason for error code {}", self.0))
        })?;

        let a = ErrorCodeAttribute {
            code: *self,
            reason: reason.as_bytes().to_vec(),
        };
        a.add_to(m)
    }
}

impl ErrorCode {
    /// reason returns the default reason phrase for the known codes.
    pub fn reason(&self) -> Option<&'static str> {
        match *self {
            CODE_BAD_REQUEST => Some("Bad Request"),
            CODE_UNAUTHORIZED => Some("Unauthorized"),
            CODE_UNKNOWN_ATTRIBUTE => Some("Unknown Attribute"),
            CODE_ROLE_CONFLICT => Some("Role Conflict"),
            CODE_SERVER_ERROR => Some("Server Error"),
            _ => None,
        }
    }
}

// Error codes from RFC 5389 Section 15.6.
pub const CODE_BAD_REQUEST: ErrorCode = ErrorCode(400);
pub const CODE_UNAUTHORIZED: ErrorCode = ErrorCode(401);
pub const CODE_UNKNOWN_ATTRIBUTE: ErrorCode = ErrorCode(420);
pub const CODE_SERVER_ERROR: ErrorCode = ErrorCode(500);

// Error codes from RFC 8445 Section 7.3.1.1.
pub const CODE_ROLE_CONFLICT: ErrorCode = ErrorCode(487);
