//! Decoded cell values.
use std::fmt;

use bytes::Bytes;
use time::{Date, PrimitiveDateTime};

use crate::common::ByteStr;

/// One decoded cell.
///
/// `DECIMAL` values keep the server's exact textual form so no precision is
/// lost; parse them with an arbitrary precision crate of your choosing.
/// Complex typed cells (arrays, maps, structs) arrive as their string
/// rendering and decode to [`Value::Str`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Str(ByteStr),
    Binary(Bytes),
    Date(Date),
    Timestamp(PrimitiveDateTime),
    Decimal(ByteStr),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Widening accessor over every integer variant.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::TinyInt(v) => Some((*v).into()),
            Value::SmallInt(v) => Some((*v).into()),
            Value::Int(v) => Some((*v).into()),
            Value::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    /// Widening accessor over the floating point variants.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some((*v).into()),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) | Value::Decimal(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(v) => Some(v),
            Value::Str(v) => Some(v.as_bytes()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<Date> {
        match self {
            Value::Date(v) => Some(*v),
            Value::Timestamp(v) => Some(v.date()),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<PrimitiveDateTime> {
        match self {
            Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => v.fmt(f),
            Value::TinyInt(v) => v.fmt(f),
            Value::SmallInt(v) => v.fmt(f),
            Value::Int(v) => v.fmt(f),
            Value::BigInt(v) => v.fmt(f),
            Value::Float(v) => v.fmt(f),
            Value::Double(v) => v.fmt(f),
            Value::Str(v) | Value::Decimal(v) => f.write_str(v),
            Value::Binary(v) => write!(f, "<{} bytes>", v.len()),
            Value::Date(v) => v.fmt(f),
            Value::Timestamp(v) => v.fmt(f),
        }
    }
}
