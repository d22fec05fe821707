//! Result set schema and column type descriptors.
//!
//! The server describes column types as a flattened tree of entries with
//! integer pointers. [`TypeDescriptor::from_wire`] resolves that into an
//! owned tree once, and the session caches the result keyed on the wire
//! shape so repeated queries over the same tables skip the walk.
use std::{fmt, sync::Arc};

use crate::{
    common::ByteStr,
    thrift::backend::{Qualifier, TableSchema, TypeDescWire, TypeEntry},
};

crate::common::unit_error! {
    /// Type descriptor from the server does not resolve to a known type.
    pub struct TypeDecodeError("malformed column type descriptor");
}

/// Hive column types, as sent in a primitive type entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HiveType {
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    String,
    Timestamp,
    Binary,
    Array,
    Map,
    Struct,
    Union,
    UserDefined,
    Decimal,
    Null,
    Date,
    Varchar,
    Char,
    IntervalYearMonth,
    IntervalDayTime,
}

impl HiveType {
    pub(crate) fn from_type_id(id: i32) -> Option<HiveType> {
        Some(match id {
            0 => Self::Boolean,
            1 => Self::TinyInt,
            2 => Self::SmallInt,
            3 => Self::Int,
            4 => Self::BigInt,
            5 => Self::Float,
            6 => Self::Double,
            7 => Self::String,
            8 => Self::Timestamp,
            9 => Self::Binary,
            10 => Self::Array,
            11 => Self::Map,
            12 => Self::Struct,
            13 => Self::Union,
            14 => Self::UserDefined,
            15 => Self::Decimal,
            16 => Self::Null,
            17 => Self::Date,
            18 => Self::Varchar,
            19 => Self::Char,
            20 => Self::IntervalYearMonth,
            21 => Self::IntervalDayTime,
            _ => return None,
        })
    }

    /// The Hive name of this type, e.g. `VARCHAR`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::TinyInt => "TINYINT",
            Self::SmallInt => "SMALLINT",
            Self::Int => "INT",
            Self::BigInt => "BIGINT",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::String => "STRING",
            Self::Timestamp => "TIMESTAMP",
            Self::Binary => "BINARY",
            Self::Array => "ARRAY",
            Self::Map => "MAP",
            Self::Struct => "STRUCT",
            Self::Union => "UNIONTYPE",
            Self::UserDefined => "USER_DEFINED",
            Self::Decimal => "DECIMAL",
            Self::Null => "NULL",
            Self::Date => "DATE",
            Self::Varchar => "VARCHAR",
            Self::Char => "CHAR",
            Self::IntervalYearMonth => "INTERVAL_YEAR_MONTH",
            Self::IntervalDayTime => "INTERVAL_DAY_TIME",
        }
    }
}

impl fmt::Display for HiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A fully resolved column type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    pub kind: HiveType,
    /// Total digits for `DECIMAL`.
    pub precision: Option<i32>,
    /// Fractional digits for `DECIMAL`.
    pub scale: Option<i32>,
    /// Character limit for `VARCHAR` and `CHAR`.
    pub max_length: Option<i32>,
    pub nested: Nested,
}

/// Resolved nested structure of a complex type.
#[derive(Debug, Clone, PartialEq)]
pub enum Nested {
    None,
    Array(Box<TypeDescriptor>),
    Map(Box<TypeDescriptor>, Box<TypeDescriptor>),
    Struct(Vec<(ByteStr, TypeDescriptor)>),
}

// hive nests at most a handful of levels; anything deeper is hostile input
const MAX_TYPE_DEPTH: usize = 32;

impl TypeDescriptor {
    pub(crate) fn plain(kind: HiveType) -> TypeDescriptor {
        TypeDescriptor { kind, precision: None, scale: None, max_length: None, nested: Nested::None }
    }

    /// Resolve the flattened wire form, entry 0 as the root.
    pub(crate) fn from_wire(wire: &TypeDescWire) -> Result<TypeDescriptor, TypeDecodeError> {
        Self::resolve(wire, 0, 0)
    }

    fn resolve(wire: &TypeDescWire, ptr: i32, depth: usize) -> Result<TypeDescriptor, TypeDecodeError> {
        if depth > MAX_TYPE_DEPTH {
            return Err(TypeDecodeError);
        }
        let entry = usize::try_from(ptr)
            .ok()
            .and_then(|i| wire.entries.get(i))
            .ok_or(TypeDecodeError)?;
        match entry {
            TypeEntry::Primitive { type_id, qualifiers } => {
                let kind = HiveType::from_type_id(*type_id).ok_or(TypeDecodeError)?;
                let mut desc = TypeDescriptor::plain(kind);
                for (name, value) in qualifiers {
                    let Qualifier::Int(value) = value else { continue };
                    match name.as_str() {
                        "precision" => desc.precision = Some(*value),
                        "scale" => desc.scale = Some(*value),
                        "characterMaximumLength" => desc.max_length = Some(*value),
                        _ => {}
                    }
                }
                Ok(desc)
            }
            TypeEntry::Array { element } => {
                let element = Self::resolve(wire, *element, depth + 1)?;
                Ok(TypeDescriptor {
                    nested: Nested::Array(Box::new(element)),
                    ..Self::plain(HiveType::Array)
                })
            }
            TypeEntry::Map { key, value } => {
                let key = Self::resolve(wire, *key, depth + 1)?;
                let value = Self::resolve(wire, *value, depth + 1)?;
                Ok(TypeDescriptor {
                    nested: Nested::Map(Box::new(key), Box::new(value)),
                    ..Self::plain(HiveType::Map)
                })
            }
            TypeEntry::Struct { fields } | TypeEntry::Union { fields } => {
                let kind = match entry {
                    TypeEntry::Struct { .. } => HiveType::Struct,
                    _ => HiveType::Union,
                };
                let mut resolved = Vec::with_capacity(fields.len());
                for (name, ptr) in fields {
                    resolved.push((name.clone(), Self::resolve(wire, *ptr, depth + 1)?));
                }
                Ok(TypeDescriptor { nested: Nested::Struct(resolved), ..Self::plain(kind) })
            }
            TypeEntry::UserDefined { .. } => Ok(Self::plain(HiveType::UserDefined)),
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.name())?;
        match (self.precision, self.scale, self.max_length) {
            (Some(p), Some(s), _) => write!(f, "({p},{s})"),
            (Some(p), None, _) => write!(f, "({p})"),
            (_, _, Some(len)) => write!(f, "({len})"),
            _ => Ok(()),
        }
    }
}

/// One column of a result set.
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    pub name: ByteStr,
    pub desc: Arc<TypeDescriptor>,
    /// Zero-based column index.
    pub index: usize,
    pub comment: Option<ByteStr>,
}

/// A result set schema, columns in positional order.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    columns: Vec<ColumnDescriptor>,
}

impl Schema {
    pub(crate) fn new(columns: Vec<ColumnDescriptor>) -> Schema {
        Schema { columns }
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, index: usize) -> Option<&ColumnDescriptor> {
        self.columns.get(index)
    }

    /// Case-insensitive lookup by column name.
    pub fn column_by_name(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Sort wire columns into positional order and pair each with its resolved
/// type, resolving through `lookup` so the session can interpose its cache.
pub(crate) async fn resolve_schema<F, Fut>(wire: TableSchema, mut lookup: F) -> Result<Schema, TypeDecodeError>
where
    F: FnMut(TypeDescWire) -> Fut,
    Fut: Future<Output = Result<Arc<TypeDescriptor>, TypeDecodeError>>,
{
    let mut raw = wire.columns;
    raw.sort_by_key(|c| c.position);

    let mut columns = Vec::with_capacity(raw.len());
    for (index, col) in raw.into_iter().enumerate() {
        let desc = lookup(col.type_desc).await?;
        columns.push(ColumnDescriptor { name: col.name, desc, index, comment: col.comment });
    }
    Ok(Schema::new(columns))
}

#[cfg(test)]
mod test {
    use super::*;

    fn primitive(type_id: i32) -> TypeEntry {
        TypeEntry::Primitive { type_id, qualifiers: vec![] }
    }

    #[test]
    fn resolves_decimal_qualifiers() {
        let wire = TypeDescWire {
            entries: vec![TypeEntry::Primitive {
                type_id: 15,
                qualifiers: vec![
                    (ByteStr::from_static("precision"), Qualifier::Int(10)),
                    (ByteStr::from_static("scale"), Qualifier::Int(2)),
                ],
            }],
        };
        let desc = TypeDescriptor::from_wire(&wire).unwrap();
        assert_eq!(desc.kind, HiveType::Decimal);
        assert_eq!(desc.precision, Some(10));
        assert_eq!(desc.scale, Some(2));
        assert_eq!(desc.to_string(), "DECIMAL(10,2)");
    }

    #[test]
    fn resolves_nested_map() {
        let wire = TypeDescWire {
            entries: vec![
                TypeEntry::Map { key: 1, value: 2 },
                primitive(7),
                primitive(4),
            ],
        };
        let desc = TypeDescriptor::from_wire(&wire).unwrap();
        assert_eq!(desc.kind, HiveType::Map);
        let Nested::Map(key, value) = desc.nested else { panic!("expected map") };
        assert_eq!(key.kind, HiveType::String);
        assert_eq!(value.kind, HiveType::BigInt);
    }

    #[test]
    fn rejects_dangling_pointer() {
        let wire = TypeDescWire { entries: vec![TypeEntry::Array { element: 9 }] };
        assert!(TypeDescriptor::from_wire(&wire).is_err());
    }

    #[test]
    fn rejects_pointer_cycle() {
        // entry 0 points back at itself; depth cap must fire
        let wire = TypeDescWire { entries: vec![TypeEntry::Array { element: 0 }] };
        assert!(TypeDescriptor::from_wire(&wire).is_err());
    }

    #[test]
    fn rejects_unknown_type_id() {
        let wire = TypeDescWire { entries: vec![primitive(99)] };
        assert!(TypeDescriptor::from_wire(&wire).is_err());
    }
}
