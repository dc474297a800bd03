#[cfg(test)]
mod message_test;

use crate::attributes::*;
use shared::error::*;

use std::fmt;

// MAGIC is magic cookie value.
pub const MAGIC_COOKIE: u32 = 0x2112A442;
pub const ATTRIBUTE_HEADER_SIZE: usize = 4;
pub const MESSAGE_HEADER_SIZE: usize = 20;

// TRANSACTION_ID_SIZE is length of transaction id array (in bytes).
pub const TRANSACTION_ID_SIZE: usize = 12; // 96 bit

const DEFAULT_RAW_CAPACITY: usize = 120;

// Interfaces that are implemented by message attributes, shorthands for them,
// or helpers for message fields as type or transaction id.
pub trait Setter {
    // Setter sets *Message attribute.
    fn add_to(&self, m: &mut Message) -> Result<()>;
}

// Getter parses attribute from *Message.
pub trait Getter {
    fn get_from(&mut self, m: &Message) -> Result<()>;
}

// Checker checks *Message attribute.
pub trait Checker {
    fn check(&self, m: &Message) -> Result<()>;
}

/// is_message returns true if b looks like STUN message.
/// Useful for multiplexing. is_message does not guarantee
/// that decoding will be successful.
pub fn is_message(b: &[u8]) -> bool {
    b.len() >= MESSAGE_HEADER_SIZE
        && u32::from_be_bytes([b[4], b[5], b[6], b[7]]) == MAGIC_COOKIE
        && b[0] & 0xC0 == 0
}

#[derive(PartialEq, Eq, Hash, Copy, Clone, Default, Debug)]
pub struct TransactionId(pub [u8; TRANSACTION_ID_SIZE]);

impl TransactionId {
    /// new returns new random transaction ID.
    pub fn new() -> Self {
        TransactionId(rand::random::<[u8; TRANSACTION_ID_SIZE]>())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl Setter for TransactionId {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.transaction_id = *self;
        m.write_transaction_id();
        Ok(())
    }
}

// Method is uint16 representation of 12-bit STUN method.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone, Hash)]
pub struct Method(pub u16);

pub const METHOD_BINDING: Method = Method(0x001);

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            METHOD_BINDING => write!(f, "Binding"),
            _ => write!(f, "0x{:x}", self.0),
        }
    }
}

// MessageClass is 8-bit representation of 2-bit class of STUN Message Class.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone, Hash)]
pub struct MessageClass(pub u8);

// Possible values for message class in STUN Message Type.
pub const CLASS_REQUEST: MessageClass = MessageClass(0x00); // 0b00
pub const CLASS_INDICATION: MessageClass = MessageClass(0x01); // 0b01
pub const CLASS_SUCCESS_RESPONSE: MessageClass = MessageClass(0x02); // 0b10
pub const CLASS_ERROR_RESPONSE: MessageClass = MessageClass(0x03); // 0b11

impl fmt::Display for MessageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            CLASS_REQUEST => "request",
            CLASS_INDICATION => "indication",
            CLASS_SUCCESS_RESPONSE => "success response",
            CLASS_ERROR_RESPONSE => "error response",
            _ => "unknown message class",
        };

        write!(f, "{s}")
    }
}

// MessageType is STUN Message Type Field.
#[derive(Default, Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub struct MessageType {
    pub method: Method,      // e.g. binding
    pub class: MessageClass, // e.g. request
}

// Common STUN message types.
pub const BINDING_REQUEST: MessageType = MessageType {
    method: METHOD_BINDING,
    class: CLASS_REQUEST,
};
pub const BINDING_SUCCESS: MessageType = MessageType {
    method: METHOD_BINDING,
    class: CLASS_SUCCESS_RESPONSE,
};
pub const BINDING_ERROR: MessageType = MessageType {
    method: METHOD_BINDING,
    class: CLASS_ERROR_RESPONSE,
};

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.class)
    }
}

impl Setter for MessageType {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.set_type(*self);
        Ok(())
    }
}

const METHOD_ABITS: u16 = 0xf; // 0b0000000000001111
const METHOD_BBITS: u16 = 0x70; // 0b0000000001110000
const METHOD_DBITS: u16 = 0xf80; // 0b0000111110000000

const METHOD_BSHIFT: u16 = 1;
const METHOD_DSHIFT: u16 = 2;

const FIRST_BIT: u16 = 0x1;
const SECOND_BIT: u16 = 0x2;

const C0BIT: u16 = FIRST_BIT;
const C1BIT: u16 = SECOND_BIT;

const CLASS_C0SHIFT: u16 = 4;
const CLASS_C1SHIFT: u16 = 7;

impl MessageType {
    /// new returns a message type with the given method and class.
    pub fn new(method: Method, class: MessageClass) -> Self {
        MessageType { method, class }
    }

    /// value returns bit representation of messageType.
    pub fn value(&self) -> u16 {
        //	 0                 1
        //	 2  3  4 5 6 7 8 9 0 1 2 3 4 5
        //	+--+--+-+-+-+-+-+-+-+-+-+-+-+-+
        //	|M |M |M|M|M|C|M|M|M|C|M|M|M|M|
        //	|11|10|9|8|7|1|6|5|4|0|3|2|1|0|
        //	+--+--+-+-+-+-+-+-+-+-+-+-+-+-+
        // Figure 3: Format of STUN Message Type Field

        // Warning: Abandon all hope ye who enter here.
        // Splitting M into A(M0-M3), B(M4-M6), D(M7-M11).
        let method = self.method.0;
        let a = method & METHOD_ABITS; // A = M * 0b0000000000001111 (right 4 bits)
        let b = method & METHOD_BBITS; // B = M * 0b0000000001110000 (3 bits after A)
        let d = method & METHOD_DBITS; // D = M * 0b0000111110000000 (5 bits after B)

        // Shifting to add "holes" for C0 (at 4 bit) and C1 (8 bit).
        let method = a + (b << METHOD_BSHIFT) + (d << METHOD_DSHIFT);

        // C0 is zero bit of C, C1 is first bit.
        // C0 = C * 0b01, C1 = (C * 0b10) >> 1
        // Ct = C0 << 4 + C1 << 8.
        // Optimizations: "((C * 0b10) >> 1) << 8" as "(C * 0b10) << 7"
        // We need C0 shifted by 4, and C1 by 8 to fit "11" and "7" positions
        // (see figure 3).
        let c = self.class.0 as u16;
        let c0 = (c & C0BIT) << CLASS_C0SHIFT;
        let c1 = (c & C1BIT) << CLASS_C1SHIFT;
        let class = c0 + c1;

        method + class
    }

    /// read_value decodes uint16 into MessageType.
    pub fn read_value(&mut self, value: u16) {
        // Decoding class.
        // We are taking first bit from v >> 4 and second from v >> 7.
        let c0 = (value >> CLASS_C0SHIFT) & C0BIT;
        let c1 = (value >> CLASS_C1SHIFT) & C1BIT;
        let class = c0 + c1;
        self.class = MessageClass(class as u8);

        // Decoding method.
        let a = value & METHOD_ABITS; // A(M0-M3)
        let b = (value >> METHOD_BSHIFT) & METHOD_BBITS; // B(M4-M6)
        let d = (value >> METHOD_DSHIFT) & METHOD_DBITS; // D(M7-M11)
        let m = a + b + d;
        self.method = Method(m);
    }
}

/// Message represents a single STUN packet. `raw` always holds the encoded
/// form of the header and attributes added so far.
#[derive(Default, Debug, Clone)]
pub struct Message {
    pub typ: MessageType,
    pub length: u32, // len(Raw) not including header
    pub transaction_id: TransactionId,
    pub attributes: Attributes,
    pub raw: Vec<u8>,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} l={} attrs={} id={}",
            self.typ,
            self.length,
            self.attributes.0.len(),
            self.transaction_id
        )
    }
}

// Messages are equal when type, transaction id and attributes match.
// raw is ignored.
impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.typ == other.typ
            && self.transaction_id == other.transaction_id
            && self.length == other.length
            && self.attributes == other.attributes
    }
}

impl Setter for Message {
    // add_to copies the transaction id into b, for crafting responses.
    fn add_to(&self, b: &mut Message) -> Result<()> {
        b.transaction_id = self.transaction_id;
        b.write_transaction_id();
        Ok(())
    }
}

impl Message {
    /// new returns *Message with pre-allocated Raw.
    pub fn new() -> Self {
        Message {
            raw: Vec::with_capacity(DEFAULT_RAW_CAPACITY),
            ..Default::default()
        }
    }

    pub fn marshal_binary(&self) -> Result<Vec<u8>> {
        Ok(self.raw.clone())
    }

    /// unmarshal_binary copies data into the message and decodes it.
    pub fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        self.raw.clear();
        self.raw.extend_from_slice(data);
        self.decode()
    }

    /// new_transaction_id sets a fresh random transaction id.
    pub fn new_transaction_id(&mut self) -> Result<()> {
        self.transaction_id = TransactionId::new();
        self.write_transaction_id();
        Ok(())
    }

    /// reset resets Message, attributes and underlying buffer length.
    pub fn reset(&mut self) {
        self.raw.clear();
        self.length = 0;
        self.attributes.0.clear();
    }

    /// grow ensures that internal buffer will fit v more bytes and
    /// increases it capacity if necessary.
    fn grow(&mut self, n: usize) {
        if self.raw.len() < n {
            self.raw.resize(n, 0);
        }
    }

    /// add appends new attribute to message.
    ///
    /// Value of attribute is copied to internal buffer so
    /// it is safe to reuse v.
    pub fn add(&mut self, t: AttrType, v: &[u8]) {
        // Allocating buffer for TLV (type-length-value).
        // T = t, L = len(v), V = v.
        // m.raw will look like:
        // [0:20]                               <- message header
        // [20:20+m.length]                     <- existing message attributes
        // [20+m.length:20+m.length+len(v)+4]   <- allocated buffer for new TLV
        // [first:last]                         <- same as previous
        // [0 1|2 3|4    4 + len(v)]            <- mapping for allocated buffer
        //   T   L        V
        let first = MESSAGE_HEADER_SIZE + self.length as usize;
        self.grow(first);
        self.raw.truncate(first);

        let padded = nearest_padded_value_length(v.len());
        self.raw.extend_from_slice(&t.value().to_be_bytes());
        self.raw.extend_from_slice(&(v.len() as u16).to_be_bytes());
        self.raw.extend_from_slice(v);
        // Padding bytes are zeroed.
        self.raw.resize(first + ATTRIBUTE_HEADER_SIZE + padded, 0);

        self.length += (ATTRIBUTE_HEADER_SIZE + padded) as u32;
        self.attributes.0.push(RawAttribute {
            typ: t,
            length: v.len() as u16,
            value: v.to_vec(),
        });
        self.write_length();
    }

    /// write_length writes m.length to m.raw.
    pub fn write_length(&mut self) {
        self.grow(4);
        self.raw[2..4].copy_from_slice(&(self.length as u16).to_be_bytes());
    }

    /// write_header writes header to underlying buffer.
    pub fn write_header(&mut self) {
        self.grow(MESSAGE_HEADER_SIZE);

        self.write_type();
        self.write_length();
        self.raw[4..8].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
        self.raw[8..MESSAGE_HEADER_SIZE].copy_from_slice(&self.transaction_id.0);
    }

    /// write_transaction_id writes m.transaction_id to m.raw.
    pub fn write_transaction_id(&mut self) {
        self.grow(MESSAGE_HEADER_SIZE);
        self.raw[8..MESSAGE_HEADER_SIZE].copy_from_slice(&self.transaction_id.0);
    }

    /// write_type writes m.typ to m.raw.
    pub fn write_type(&mut self) {
        self.grow(2);
        self.raw[..2].copy_from_slice(&self.typ.value().to_be_bytes());
    }

    /// set_type sets m.typ and writes it to m.raw.
    pub fn set_type(&mut self, t: MessageType) {
        self.typ = t;
        self.write_type();
    }

    /// decode decodes m.raw into m.
    pub fn decode(&mut self) -> Result<()> {
        // decoding message header
        let buf = &self.raw;
        if buf.len() < MESSAGE_HEADER_SIZE {
            return Err(Error::ErrUnexpectedHeaderEof);
        }

        let t = u16::from_be_bytes([buf[0], buf[1]]); // first 2 bytes
        let size = u16::from_be_bytes([buf[2], buf[3]]) as usize; // second 2 bytes
        let cookie = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]); // last 4 bytes
        let full_size = MESSAGE_HEADER_SIZE + size; // m.raw.len()

        if t & 0xC000 != 0 {
            return Err(Error::ErrInvalidMessageType(t));
        }
        if cookie != MAGIC_COOKIE {
            return Err(Error::ErrInvalidMagicCookie(cookie));
        }
        if size % ATTRIBUTE_HEADER_SIZE != 0 {
            return Err(Error::ErrMessageLengthUnaligned(size));
        }
        if buf.len() < full_size {
            return Err(Error::ErrUnexpectedEof);
        }

        let mut transaction_id = TransactionId::default();
        transaction_id
            .0
            .copy_from_slice(&buf[8..MESSAGE_HEADER_SIZE]);

        let mut attributes = Vec::new();
        let mut offset = 0;
        let mut b = &buf[MESSAGE_HEADER_SIZE..full_size];

        while offset < size {
            // checking that we have enough bytes to read header
            if b.len() < ATTRIBUTE_HEADER_SIZE {
                return Err(Error::ErrUnexpectedEof);
            }

            let typ = AttrType(u16::from_be_bytes([b[0], b[1]])); // first 2 bytes
            let length = u16::from_be_bytes([b[2], b[3]]); // second 2 bytes
            let a_l = length as usize; // attribute length
            let a_buff_l = nearest_padded_value_length(a_l); // expected buffer length (with padding)

            b = &b[ATTRIBUTE_HEADER_SIZE..]; // slicing again to simplify value read
            offset += ATTRIBUTE_HEADER_SIZE;
            if b.len() < a_buff_l {
                // checking size
                return Err(Error::ErrAttributeSizeOverflow);
            }

            attributes.push(RawAttribute {
                typ,
                length,
                value: b[..a_l].to_vec(),
            });

            offset += a_buff_l;
            b = &b[a_buff_l..];
        }

        self.typ.read_value(t);
        self.length = size as u32;
        self.transaction_id = transaction_id;
        self.attributes = Attributes(attributes);
        self.raw.truncate(full_size);

        Ok(())
    }

    /// build resets message and applies setters to it in batch, returning on
    /// first error.
    pub fn build(&mut self, setters: &[Box<dyn Setter>]) -> Result<()> {
        self.reset();
        self.write_header();
        for s in setters {
            s.add_to(self)?;
        }
        Ok(())
    }

    /// check applies checkers to message in batch, returning on first error.
    pub fn check<C: Checker>(&self, checkers: &[C]) -> Result<()> {
        for c in checkers {
            c.check(self)?;
        }
        Ok(())
    }

    /// parse applies getters to message in batch, returning on first error.
    pub fn parse<G: Getter>(&self, getters: &mut [G]) -> Result<()> {
        for c in getters {
            c.get_from(self)?;
        }
        Ok(())
    }

    /// get returns the value of the first attribute of type t, or
    /// ErrAttributeNotFound.
    pub fn get(&self, t: AttrType) -> Result<Vec<u8>> {
        let (v, ok) = self.attributes.get(t);
        if ok {
            Ok(v.value)
        } else {
            Err(Error::ErrAttributeNotFound)
        }
    }

    /// contains return true if message contain t attribute.
    pub fn contains(&self, t: AttrType) -> bool {
        self.attributes.0.iter().any(|a| a.typ == t)
    }

    /// Returns the byte offset of the first attribute of type `t` within `raw`,
    /// counted from the start of the message header.
    pub(crate) fn attribute_offset(&self, t: AttrType) -> Option<usize> {
        let mut offset = MESSAGE_HEADER_SIZE;
        for a in &self.attributes.0 {
            if a.typ == t {
                return Some(offset);
            }
            offset += ATTRIBUTE_HEADER_SIZE + nearest_padded_value_length(a.length as usize);
        }
        None
    }
}
