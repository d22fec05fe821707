//! Thrift binary (strict) protocol primitives.
//!
//! Writing goes through free functions on a [`BytesMut`]; reading goes
//! through [`Reader`], which slices strings and binaries out of the reply
//! frame without copying. Unknown fields are [skipped][Reader::skip], never
//! an error, so newer servers can add fields freely.
use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::ProtocolError;
use crate::common::ByteStr;

/// Thrift field type tags.
pub mod ftype {
    pub const STOP: u8 = 0;
    pub const BOOL: u8 = 2;
    pub const BYTE: u8 = 3;
    pub const DOUBLE: u8 = 4;
    pub const I16: u8 = 6;
    pub const I32: u8 = 8;
    pub const I64: u8 = 10;
    /// Strings and binaries share one tag.
    pub const BINARY: u8 = 11;
    pub const STRUCT: u8 = 12;
    pub const MAP: u8 = 13;
    pub const SET: u8 = 14;
    pub const LIST: u8 = 15;
}

/// Thrift message types.
pub mod message {
    pub const CALL: i32 = 1;
    pub const REPLY: i32 = 2;
    pub const EXCEPTION: i32 = 3;
}

/// Strict protocol version bits in the message envelope.
pub const VERSION_1: i32 = 0x8001_0000_u32 as i32;

const VERSION_MASK: i32 = 0xffff_0000_u32 as i32;

// ===== Writing =====

/// Write the `[version|type, name, seq]` message envelope.
pub fn write_message_begin(buf: &mut BytesMut, name: &str, message_type: i32, seq: i32) {
    buf.put_i32(VERSION_1 | message_type);
    write_string(buf, name);
    buf.put_i32(seq);
}

/// Write a field header.
pub fn write_field(buf: &mut BytesMut, field_type: u8, id: i16) {
    buf.put_u8(field_type);
    buf.put_i16(id);
}

/// Write the struct terminator.
pub fn write_stop(buf: &mut BytesMut) {
    buf.put_u8(ftype::STOP);
}

pub fn write_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(value as u8);
}

pub fn write_string(buf: &mut BytesMut, value: &str) {
    write_binary(buf, value.as_bytes());
}

pub fn write_binary(buf: &mut BytesMut, value: &[u8]) {
    buf.put_i32(value.len() as i32);
    buf.put_slice(value);
}

pub fn write_list_begin(buf: &mut BytesMut, element_type: u8, len: usize) {
    buf.put_u8(element_type);
    buf.put_i32(len as i32);
}

pub fn write_map_begin(buf: &mut BytesMut, key_type: u8, value_type: u8, len: usize) {
    buf.put_u8(key_type);
    buf.put_u8(value_type);
    buf.put_i32(len as i32);
}

// ===== Reading =====

macro_rules! underrun {
    ($($tt:tt)*) => {
        ProtocolError::new(format!($($tt)*))
    };
}

/// Bounds-checked reader over one reply frame.
pub struct Reader {
    buf: Bytes,
}

impl Reader {
    pub fn new(frame: Bytes) -> Reader {
        Reader { buf: frame }
    }

    fn ensure(&self, len: usize) -> Result<(), ProtocolError> {
        if self.buf.len() < len {
            return Err(underrun!(
                "truncated frame: need {len} more bytes, have {}",
                self.buf.len()
            ));
        }
        Ok(())
    }

    pub fn byte(&mut self) -> Result<u8, ProtocolError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn i8(&mut self) -> Result<i8, ProtocolError> {
        self.ensure(1)?;
        Ok(self.buf.get_i8())
    }

    pub fn bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.byte()? != 0)
    }

    pub fn i16(&mut self) -> Result<i16, ProtocolError> {
        self.ensure(2)?;
        Ok(self.buf.get_i16())
    }

    pub fn i32(&mut self) -> Result<i32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn i64(&mut self) -> Result<i64, ProtocolError> {
        self.ensure(8)?;
        Ok(self.buf.get_i64())
    }

    pub fn double(&mut self) -> Result<f64, ProtocolError> {
        self.ensure(8)?;
        Ok(self.buf.get_f64())
    }

    pub fn binary(&mut self) -> Result<Bytes, ProtocolError> {
        let len = self.i32()?;
        if len < 0 {
            return Err(underrun!("negative binary length {len}"));
        }
        self.ensure(len as usize)?;
        Ok(self.buf.split_to(len as usize))
    }

    pub fn string(&mut self) -> Result<ByteStr, ProtocolError> {
        let bytes = self.binary()?;
        ByteStr::from_utf8(bytes).map_err(|e| underrun!("non UTF-8 string: {e}"))
    }

    /// Read the message envelope, returning `(method, message type, seq)`.
    pub fn message_begin(&mut self) -> Result<(ByteStr, i32, i32), ProtocolError> {
        let header = self.i32()?;
        if header & VERSION_MASK != VERSION_1 {
            return Err(underrun!("bad message version {header:#010x}"));
        }
        let message_type = header & !VERSION_MASK;
        let name = self.string()?;
        let seq = self.i32()?;
        Ok((name, message_type, seq))
    }

    /// Read the next field header, or `None` at the struct terminator.
    pub fn field_begin(&mut self) -> Result<Option<(u8, i16)>, ProtocolError> {
        let field_type = self.byte()?;
        if field_type == ftype::STOP {
            return Ok(None);
        }
        let id = self.i16()?;
        Ok(Some((field_type, id)))
    }

    /// Returns `(element type, len)`.
    pub fn list_begin(&mut self) -> Result<(u8, usize), ProtocolError> {
        let element_type = self.byte()?;
        let len = self.i32()?;
        if len < 0 {
            return Err(underrun!("negative list length {len}"));
        }
        Ok((element_type, len as usize))
    }

    /// Returns `(key type, value type, len)`.
    pub fn map_begin(&mut self) -> Result<(u8, u8, usize), ProtocolError> {
        let key_type = self.byte()?;
        let value_type = self.byte()?;
        let len = self.i32()?;
        if len < 0 {
            return Err(underrun!("negative map length {len}"));
        }
        Ok((key_type, value_type, len as usize))
    }

    /// Skip one value of the given type, recursing into containers.
    pub fn skip(&mut self, field_type: u8) -> Result<(), ProtocolError> {
        self.skip_depth(field_type, 0)
    }

    fn skip_depth(&mut self, field_type: u8, depth: u8) -> Result<(), ProtocolError> {
        if depth > 32 {
            return Err(underrun!("skip recursion too deep"));
        }
        match field_type {
            ftype::BOOL | ftype::BYTE => {
                self.byte()?;
            }
            ftype::I16 => {
                self.i16()?;
            }
            ftype::I32 => {
                self.i32()?;
            }
            ftype::I64 | ftype::DOUBLE => {
                self.ensure(8)?;
                self.buf.advance(8);
            }
            ftype::BINARY => {
                self.binary()?;
            }
            ftype::STRUCT => {
                while let Some((ty, _)) = self.field_begin()? {
                    self.skip_depth(ty, depth + 1)?;
                }
            }
            ftype::MAP => {
                let (kty, vty, len) = self.map_begin()?;
                for _ in 0..len {
                    self.skip_depth(kty, depth + 1)?;
                    self.skip_depth(vty, depth + 1)?;
                }
            }
            ftype::LIST | ftype::SET => {
                let (ety, len) = self.list_begin()?;
                for _ in 0..len {
                    self.skip_depth(ety, depth + 1)?;
                }
            }
            f => return Err(underrun!("cannot skip unknown field type {f}")),
        }
        Ok(())
    }
}

/// A request message: method name plus argument struct encoding.
pub trait Request {
    const METHOD: &'static str;

    /// Encode the call argument struct, including its terminator.
    fn encode(&self, buf: &mut BytesMut);
}

/// A response message: decoded from the reply's success struct.
pub trait Response: Sized {
    fn decode(reader: &mut Reader) -> Result<Self, ProtocolError>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn skip_unknown_fields() {
        let mut buf = BytesMut::new();
        // a struct carrying one known i32 and three unknown fields
        write_field(&mut buf, ftype::I64, 9);
        buf.put_i64(42);
        write_field(&mut buf, ftype::BINARY, 10);
        write_string(&mut buf, "ignored");
        write_field(&mut buf, ftype::LIST, 11);
        write_list_begin(&mut buf, ftype::BOOL, 3);
        buf.put_slice(&[1, 0, 1]);
        write_field(&mut buf, ftype::I32, 1);
        buf.put_i32(7);
        write_stop(&mut buf);

        let mut reader = Reader::new(buf.freeze());
        let mut known = None;
        while let Some((ty, id)) = reader.field_begin().unwrap() {
            match (id, ty) {
                (1, ftype::I32) => known = Some(reader.i32().unwrap()),
                (_, ty) => reader.skip(ty).unwrap(),
            }
        }
        assert_eq!(known, Some(7));
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let mut buf = BytesMut::new();
        buf.put_i32(100); // claims a 100-byte string
        buf.put_slice(b"short");

        let mut reader = Reader::new(buf.freeze());
        assert!(reader.string().is_err());
    }

    #[test]
    fn message_envelope_roundtrip() {
        let mut buf = BytesMut::new();
        write_message_begin(&mut buf, "OpenSession", message::CALL, 3);

        let mut reader = Reader::new(buf.freeze());
        let (name, ty, seq) = reader.message_begin().unwrap();
        assert_eq!(name, "OpenSession");
        assert_eq!(ty, message::CALL);
        assert_eq!(seq, 3);
    }

    #[test]
    fn rejects_unversioned_envelope() {
        let mut buf = BytesMut::new();
        buf.put_i32(11); // old unstrict encoding: bare name length
        let mut reader = Reader::new(buf.freeze());
        assert!(reader.message_begin().is_err());
    }
}
