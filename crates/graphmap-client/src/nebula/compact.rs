//! Thrift compact protocol codec, as spoken by graphd.
//!
//! Protocol version 2 writes doubles big-endian; version 1 peers send them
//! little-endian, so the decoder follows the version of the message it reads.

use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const PROTOCOL_ID: u8 = 0x82;
pub const VERSION: u8 = 2;
const VERSION_MASK: u8 = 0x1f;
const TYPE_SHIFT: u8 = 5;
const MAX_DEPTH: usize = 64;

/// Compact wire type ids.
pub mod wire {
    pub const STOP: u8 = 0;
    pub const BOOL_TRUE: u8 = 1;
    pub const BOOL_FALSE: u8 = 2;
    pub const BYTE: u8 = 3;
    pub const I16: u8 = 4;
    pub const I32: u8 = 5;
    pub const I64: u8 = 6;
    pub const DOUBLE: u8 = 7;
    pub const BINARY: u8 = 8;
    pub const LIST: u8 = 9;
    pub const SET: u8 = 10;
    pub const MAP: u8 = 11;
    pub const STRUCT: u8 = 12;
    pub const FLOAT: u8 = 13;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Call = 1,
    Reply = 2,
    Exception = 3,
    Oneway = 4,
}

impl MessageType {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            1 => Some(Self::Call),
            2 => Some(Self::Reply),
            3 => Some(Self::Exception),
            4 => Some(Self::Oneway),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unexpected end of message")]
    Eof,

    #[error("bad protocol id {0:#04x}")]
    BadProtocolId(u8),

    #[error("unknown message type {0}")]
    BadMessageType(u8),

    #[error("unknown wire type {0}")]
    BadWireType(u8),

    #[error("expected wire type {expected}, found {found}")]
    UnexpectedType { expected: u8, found: u8 },

    #[error("varint longer than 64 bits")]
    VarintOverflow,

    #[error("length {0} exceeds the remaining input")]
    BadLength(u64),

    #[error("nesting deeper than {}", MAX_DEPTH)]
    TooDeep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub name: String,
    pub kind: MessageType,
    pub seq: i32,
}

fn zigzag(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

fn unzigzag(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

// ── Encoding ─────────────────────────────────────────────────────

/// Writes one message. Struct and field bookkeeping is the caller's:
/// every `struct_begin`/`field_struct_begin` needs its `struct_end`.
pub struct Encoder {
    buf: BytesMut,
    last_field: i16,
    stack: Vec<i16>,
}

impl Encoder {
    pub fn message(name: &str, kind: MessageType, seq: i32) -> Self {
        let mut enc = Self {
            buf: BytesMut::with_capacity(64 + name.len()),
            last_field: 0,
            stack: Vec::new(),
        };
        enc.buf.put_u8(PROTOCOL_ID);
        enc.buf.put_u8((VERSION & VERSION_MASK) | ((kind as u8) << TYPE_SHIFT));
        enc.varint(u64::from(seq as u32));
        enc.write_binary(name.as_bytes());
        enc
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn struct_begin(&mut self) {
        self.stack.push(self.last_field);
        self.last_field = 0;
    }

    pub fn struct_end(&mut self) {
        self.buf.put_u8(wire::STOP);
        self.last_field = self.stack.pop().unwrap_or(0);
    }

    pub fn field_begin(&mut self, id: i16, ty: u8) {
        let delta = i32::from(id) - i32::from(self.last_field);
        if (1..=15).contains(&delta) {
            self.buf.put_u8(((delta as u8) << 4) | ty);
        } else {
            self.buf.put_u8(ty);
            self.varint(zigzag(i64::from(id)));
        }
        self.last_field = id;
    }

    pub fn field_struct_begin(&mut self, id: i16) {
        self.field_begin(id, wire::STRUCT);
        self.struct_begin();
    }

    pub fn field_bool(&mut self, id: i16, value: bool) {
        self.field_begin(id, if value { wire::BOOL_TRUE } else { wire::BOOL_FALSE });
    }

    pub fn field_i32(&mut self, id: i16, value: i32) {
        self.field_begin(id, wire::I32);
        self.write_i32(value);
    }

    pub fn field_i64(&mut self, id: i16, value: i64) {
        self.field_begin(id, wire::I64);
        self.write_i64(value);
    }

    pub fn field_double(&mut self, id: i16, value: f64) {
        self.field_begin(id, wire::DOUBLE);
        self.write_double(value);
    }

    pub fn field_binary(&mut self, id: i16, value: &[u8]) {
        self.field_begin(id, wire::BINARY);
        self.write_binary(value);
    }

    pub fn list_begin(&mut self, elem: u8, len: usize) {
        if len < 15 {
            self.buf.put_u8(((len as u8) << 4) | elem);
        } else {
            self.buf.put_u8(0xf0 | elem);
            self.varint(len as u64);
        }
    }

    pub fn map_begin(&mut self, key: u8, value: u8, len: usize) {
        self.varint(len as u64);
        if len > 0 {
            self.buf.put_u8((key << 4) | value);
        }
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_u8(if value { wire::BOOL_TRUE } else { wire::BOOL_FALSE });
    }

    pub fn write_byte(&mut self, value: i8) {
        self.buf.put_i8(value);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.varint(zigzag(i64::from(value)));
    }

    pub fn write_i32(&mut self, value: i32) {
        self.varint(zigzag(i64::from(value)));
    }

    pub fn write_i64(&mut self, value: i64) {
        self.varint(zigzag(value));
    }

    pub fn write_double(&mut self, value: f64) {
        self.buf.put_f64(value);
    }

    pub fn write_binary(&mut self, value: &[u8]) {
        self.varint(value.len() as u64);
        self.buf.put_slice(value);
    }

    fn varint(&mut self, mut n: u64) {
        while n >= 0x80 {
            self.buf.put_u8((n as u8 & 0x7f) | 0x80);
            n >>= 7;
        }
        self.buf.put_u8(n as u8);
    }
}

// ── Decoding ─────────────────────────────────────────────────────

pub struct Decoder {
    buf: Bytes,
    version: u8,
    last_field: i16,
    stack: Vec<i16>,
    depth: usize,
    pending_bool: Option<bool>,
}

impl Decoder {
    pub fn new(buf: Bytes) -> Self {
        Self {
            buf,
            version: VERSION,
            last_field: 0,
            stack: Vec::new(),
            depth: 0,
            pending_bool: None,
        }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn message_header(&mut self) -> Result<MessageHeader, ProtocolError> {
        let id = self.u8()?;
        if id != PROTOCOL_ID {
            return Err(ProtocolError::BadProtocolId(id));
        }
        let version_and_type = self.u8()?;
        self.version = version_and_type & VERSION_MASK;
        let bits = version_and_type >> TYPE_SHIFT;
        let kind = MessageType::from_bits(bits).ok_or(ProtocolError::BadMessageType(bits))?;
        let seq = self.varint()? as u32 as i32;
        let name = self.read_string()?;
        Ok(MessageHeader { name, kind, seq })
    }

    pub fn struct_begin(&mut self) -> Result<(), ProtocolError> {
        if self.stack.len() + self.depth >= MAX_DEPTH {
            return Err(ProtocolError::TooDeep);
        }
        self.stack.push(self.last_field);
        self.last_field = 0;
        Ok(())
    }

    pub fn struct_end(&mut self) {
        self.last_field = self.stack.pop().unwrap_or(0);
    }

    /// The next field's id and wire type, or `None` at the end of the struct.
    pub fn field(&mut self) -> Result<Option<(i16, u8)>, ProtocolError> {
        let byte = self.u8()?;
        if byte == wire::STOP {
            return Ok(None);
        }
        let ty = byte & 0x0f;
        let delta = i16::from(byte >> 4);
        let id = if delta == 0 {
            self.read_i16()?
        } else {
            self.last_field.wrapping_add(delta)
        };
        self.last_field = id;
        match ty {
            wire::BOOL_TRUE => self.pending_bool = Some(true),
            wire::BOOL_FALSE => self.pending_bool = Some(false),
            _ => {}
        }
        Ok(Some((id, ty)))
    }

    /// Element type and length of a list or set.
    pub fn list_begin(&mut self) -> Result<(u8, usize), ProtocolError> {
        let byte = self.u8()?;
        let short = u64::from(byte >> 4);
        let len = if short == 15 { self.varint()? } else { short };
        Ok((byte & 0x0f, self.checked_len(len)?))
    }

    /// Key type, value type and length of a map.
    pub fn map_begin(&mut self) -> Result<(u8, u8, usize), ProtocolError> {
        let len = self.varint()?;
        if len == 0 {
            return Ok((0, 0, 0));
        }
        let types = self.u8()?;
        Ok((types >> 4, types & 0x0f, self.checked_len(len)?))
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        match self.pending_bool.take() {
            Some(value) => Ok(value),
            None => Ok(self.u8()? == wire::BOOL_TRUE),
        }
    }

    pub fn read_byte(&mut self) -> Result<i8, ProtocolError> {
        Ok(self.u8()? as i8)
    }

    pub fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        Ok(unzigzag(self.varint()?) as i16)
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(unzigzag(self.varint()?) as i32)
    }

    pub fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(unzigzag(self.varint()?))
    }

    pub fn read_double(&mut self) -> Result<f64, ProtocolError> {
        self.need(8)?;
        Ok(if self.version >= 2 {
            self.buf.get_f64()
        } else {
            self.buf.get_f64_le()
        })
    }

    pub fn read_float(&mut self) -> Result<f32, ProtocolError> {
        self.need(4)?;
        Ok(if self.version >= 2 {
            self.buf.get_f32()
        } else {
            self.buf.get_f32_le()
        })
    }

    pub fn read_binary(&mut self) -> Result<Bytes, ProtocolError> {
        let len = self.varint()?;
        let len = self.checked_len(len)?;
        Ok(self.buf.split_to(len))
    }

    /// A binary field as text; invalid UTF-8 is replaced.
    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        Ok(String::from_utf8_lossy(&self.read_binary()?).into_owned())
    }

    /// Expect `expected` as the element type of a list that has elements.
    pub fn expect_elements(&self, expected: u8, found: u8, len: usize) -> Result<(), ProtocolError> {
        if len > 0 && found != expected {
            return Err(ProtocolError::UnexpectedType { expected, found });
        }
        Ok(())
    }

    /// Consume one value of wire type `ty`.
    pub fn skip(&mut self, ty: u8) -> Result<(), ProtocolError> {
        match ty {
            wire::BOOL_TRUE | wire::BOOL_FALSE => {
                self.read_bool()?;
            }
            wire::BYTE => {
                self.u8()?;
            }
            wire::I16 | wire::I32 | wire::I64 => {
                self.varint()?;
            }
            wire::DOUBLE => self.advance(8)?,
            wire::FLOAT => self.advance(4)?,
            wire::BINARY => {
                self.read_binary()?;
            }
            wire::LIST | wire::SET => {
                let (elem, len) = self.list_begin()?;
                self.nested(|d| (0..len).try_for_each(|_| d.skip(elem)))?;
            }
            wire::MAP => {
                let (key, value, len) = self.map_begin()?;
                self.nested(|d| {
                    (0..len).try_for_each(|_| {
                        d.skip(key)?;
                        d.skip(value)
                    })
                })?;
            }
            wire::STRUCT => {
                self.struct_begin()?;
                while let Some((_, field_ty)) = self.field()? {
                    self.skip(field_ty)?;
                }
                self.struct_end();
            }
            other => return Err(ProtocolError::BadWireType(other)),
        }
        Ok(())
    }

    fn nested(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<(), ProtocolError>,
    ) -> Result<(), ProtocolError> {
        if self.stack.len() + self.depth >= MAX_DEPTH {
            return Err(ProtocolError::TooDeep);
        }
        self.depth += 1;
        let result = body(self);
        self.depth -= 1;
        result
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn need(&self, n: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() < n {
            Err(ProtocolError::Eof)
        } else {
            Ok(())
        }
    }

    fn advance(&mut self, n: usize) -> Result<(), ProtocolError> {
        self.need(n)?;
        self.buf.advance(n);
        Ok(())
    }

    // Every element takes at least one byte, so no honest length exceeds
    // what is left of the message.
    fn checked_len(&self, len: u64) -> Result<usize, ProtocolError> {
        if len > self.buf.remaining() as u64 {
            Err(ProtocolError::BadLength(len))
        } else {
            Ok(len as usize)
        }
    }

    fn varint(&mut self) -> Result<u64, ProtocolError> {
        let mut out = 0u64;
        let mut shift = 0;
        loop {
            let byte = self.u8()?;
            out |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(out);
            }
            shift += 7;
            if shift > 63 {
                return Err(ProtocolError::VarintOverflow);
            }
        }
    }
}
