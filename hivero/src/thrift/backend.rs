//! Responses received from the server.
//!
//! Every response opens with a `TStatus`; callers check it through
//! [`Status::verify`] before touching the payload. Unknown fields are
//! skipped for forward compatibility.
use bytes::Bytes;

use super::{
    HandleIdentifier, OperationHandle, ProtocolError, SessionHandle, StatusCode,
    wire::{Reader, Response, ftype},
};
use crate::{common::ByteStr, error::ServerError};

/// `TStatus`, carried by every response.
#[derive(Debug, Clone)]
pub struct Status {
    pub code: i32,
    pub info_messages: Vec<ByteStr>,
    pub sql_state: Option<ByteStr>,
    pub error_code: Option<i32>,
    pub error_message: Option<ByteStr>,
}

impl Status {
    pub fn status_code(&self) -> Option<StatusCode> {
        StatusCode::from_value(self.code)
    }

    /// Check for success, surfacing anything else as a [`ServerError`].
    ///
    /// `with_info` also accepts `SUCCESS_WITH_INFO`, matching the calls the
    /// server may answer with informational status.
    pub fn verify(&self, with_info: bool) -> Result<(), ServerError> {
        match self.status_code() {
            Some(StatusCode::Success) => Ok(()),
            Some(StatusCode::SuccessWithInfo) if with_info => Ok(()),
            _ => Err(ServerError {
                message: self
                    .error_message
                    .as_ref()
                    .map(|m| m.as_str().to_owned())
                    .unwrap_or_else(|| format!("server returned status code {}", self.code)),
                sql_state: self.sql_state.as_ref().map(|s| s.as_str().to_owned()),
                code: self.error_code,
            }),
        }
    }

    pub(crate) fn decode(r: &mut Reader) -> Result<Status, ProtocolError> {
        let mut code = -1;
        let mut info_messages = Vec::new();
        let mut sql_state = None;
        let mut error_code = None;
        let mut error_message = None;

        while let Some((ty, id)) = r.field_begin()? {
            match (id, ty) {
                (1, ftype::I32) => code = r.i32()?,
                (2, ftype::LIST) => {
                    let (ety, len) = r.list_begin()?;
                    for _ in 0..len {
                        if ety == ftype::BINARY {
                            info_messages.push(r.string()?);
                        } else {
                            r.skip(ety)?;
                        }
                    }
                }
                (3, ftype::BINARY) => sql_state = Some(r.string()?),
                (4, ftype::I32) => error_code = Some(r.i32()?),
                (5, ftype::BINARY) => error_message = Some(r.string()?),
                (_, ty) => r.skip(ty)?,
            }
        }

        Ok(Status { code, info_messages, sql_state, error_code, error_message })
    }
}

/// `TApplicationException`, the reply body of an exception message.
pub struct ApplicationException {
    pub message: String,
    pub kind: i32,
}

impl ApplicationException {
    pub(crate) fn decode(r: &mut Reader) -> Result<ApplicationException, ProtocolError> {
        let mut message = String::new();
        let mut kind = 0;
        while let Some((ty, id)) = r.field_begin()? {
            match (id, ty) {
                (1, ftype::BINARY) => message = r.string()?.as_str().to_owned(),
                (2, ftype::I32) => kind = r.i32()?,
                (_, ty) => r.skip(ty)?,
            }
        }
        Ok(ApplicationException { message, kind })
    }
}

fn decode_handle_identifier(r: &mut Reader) -> Result<HandleIdentifier, ProtocolError> {
    let mut guid = Bytes::new();
    let mut secret = Bytes::new();
    while let Some((ty, id)) = r.field_begin()? {
        match (id, ty) {
            (1, ftype::BINARY) => guid = r.binary()?,
            (2, ftype::BINARY) => secret = r.binary()?,
            (_, ty) => r.skip(ty)?,
        }
    }
    Ok(HandleIdentifier { guid, secret })
}

fn decode_session_handle(r: &mut Reader) -> Result<SessionHandle, ProtocolError> {
    let mut id = None;
    while let Some((ty, fid)) = r.field_begin()? {
        match (fid, ty) {
            (1, ftype::STRUCT) => id = Some(decode_handle_identifier(r)?),
            (_, ty) => r.skip(ty)?,
        }
    }
    Ok(SessionHandle {
        id: id.ok_or_else(|| ProtocolError::new("session handle missing identifier"))?,
    })
}

fn decode_operation_handle(r: &mut Reader) -> Result<OperationHandle, ProtocolError> {
    let mut id = None;
    let mut operation_type = 0;
    let mut has_result_set = false;
    let mut modified_row_count = None;
    while let Some((ty, fid)) = r.field_begin()? {
        match (fid, ty) {
            (1, ftype::STRUCT) => id = Some(decode_handle_identifier(r)?),
            (2, ftype::I32) => operation_type = r.i32()?,
            (3, ftype::BOOL) => has_result_set = r.bool()?,
            (4, ftype::DOUBLE) => modified_row_count = Some(r.double()?),
            (_, ty) => r.skip(ty)?,
        }
    }
    Ok(OperationHandle {
        id: id.ok_or_else(|| ProtocolError::new("operation handle missing identifier"))?,
        operation_type,
        has_result_set,
        modified_row_count,
    })
}

fn missing_status() -> ProtocolError {
    ProtocolError::new("response missing status")
}

/// `TOpenSessionResp`.
pub struct OpenSessionResp {
    pub status: Status,
    pub server_protocol: i32,
    pub session_handle: Option<SessionHandle>,
}

impl Response for OpenSessionResp {
    fn decode(r: &mut Reader) -> Result<Self, ProtocolError> {
        let mut status = None;
        let mut server_protocol = -1;
        let mut session_handle = None;
        while let Some((ty, id)) = r.field_begin()? {
            match (id, ty) {
                (1, ftype::STRUCT) => status = Some(Status::decode(r)?),
                (2, ftype::I32) => server_protocol = r.i32()?,
                (3, ftype::STRUCT) => session_handle = Some(decode_session_handle(r)?),
                (_, ty) => r.skip(ty)?,
            }
        }
        Ok(OpenSessionResp {
            status: status.ok_or_else(missing_status)?,
            server_protocol,
            session_handle,
        })
    }
}

/// Responses whose payload is an operation handle: `TExecuteStatementResp`
/// and the catalog/schema/table/type-info metadata calls.
pub struct HandleResp {
    pub status: Status,
    pub operation_handle: Option<OperationHandle>,
}

impl Response for HandleResp {
    fn decode(r: &mut Reader) -> Result<Self, ProtocolError> {
        let mut status = None;
        let mut operation_handle = None;
        while let Some((ty, id)) = r.field_begin()? {
            match (id, ty) {
                (1, ftype::STRUCT) => status = Some(Status::decode(r)?),
                (2, ftype::STRUCT) => operation_handle = Some(decode_operation_handle(r)?),
                (_, ty) => r.skip(ty)?,
            }
        }
        Ok(HandleResp { status: status.ok_or_else(missing_status)?, operation_handle })
    }
}

/// Responses carrying only a `TStatus`: cancel/close operation, close
/// session.
pub struct StatusResp {
    pub status: Status,
}

impl Response for StatusResp {
    fn decode(r: &mut Reader) -> Result<Self, ProtocolError> {
        let mut status = None;
        while let Some((ty, id)) = r.field_begin()? {
            match (id, ty) {
                (1, ftype::STRUCT) => status = Some(Status::decode(r)?),
                (_, ty) => r.skip(ty)?,
            }
        }
        Ok(StatusResp { status: status.ok_or_else(missing_status)? })
    }
}

/// `TGetOperationStatusResp`.
pub struct OperationStatusResp {
    pub status: Status,
    pub operation_state: Option<i32>,
    pub sql_state: Option<ByteStr>,
    pub error_code: Option<i32>,
    pub error_message: Option<ByteStr>,
}

impl Response for OperationStatusResp {
    fn decode(r: &mut Reader) -> Result<Self, ProtocolError> {
        let mut status = None;
        let mut operation_state = None;
        let mut sql_state = None;
        let mut error_code = None;
        let mut error_message = None;
        while let Some((ty, id)) = r.field_begin()? {
            match (id, ty) {
                (1, ftype::STRUCT) => status = Some(Status::decode(r)?),
                (2, ftype::I32) => operation_state = Some(r.i32()?),
                (3, ftype::BINARY) => sql_state = Some(r.string()?),
                (4, ftype::I32) => error_code = Some(r.i32()?),
                (5, ftype::BINARY) => error_message = Some(r.string()?),
                (_, ty) => r.skip(ty)?,
            }
        }
        Ok(OperationStatusResp {
            status: status.ok_or_else(missing_status)?,
            operation_state,
            sql_state,
            error_code,
            error_message,
        })
    }
}

/// `TFetchResultsResp`.
pub struct FetchResultsResp {
    pub status: Status,
    pub has_more_rows: bool,
    pub results: Option<RowSet>,
}

impl Response for FetchResultsResp {
    fn decode(r: &mut Reader) -> Result<Self, ProtocolError> {
        let mut status = None;
        let mut has_more_rows = false;
        let mut results = None;
        while let Some((ty, id)) = r.field_begin()? {
            match (id, ty) {
                (1, ftype::STRUCT) => status = Some(Status::decode(r)?),
                (2, ftype::BOOL) => has_more_rows = r.bool()?,
                (3, ftype::STRUCT) => results = Some(RowSet::decode(r)?),
                (_, ty) => r.skip(ty)?,
            }
        }
        Ok(FetchResultsResp { status: status.ok_or_else(missing_status)?, has_more_rows, results })
    }
}

/// `TGetResultSetMetadataResp`.
pub struct ResultSetMetadataResp {
    pub status: Status,
    pub schema: Option<TableSchema>,
}

impl Response for ResultSetMetadataResp {
    fn decode(r: &mut Reader) -> Result<Self, ProtocolError> {
        let mut status = None;
        let mut schema = None;
        while let Some((ty, id)) = r.field_begin()? {
            match (id, ty) {
                (1, ftype::STRUCT) => status = Some(Status::decode(r)?),
                (2, ftype::STRUCT) => schema = Some(TableSchema::decode(r)?),
                (_, ty) => r.skip(ty)?,
            }
        }
        Ok(ResultSetMetadataResp { status: status.ok_or_else(missing_status)?, schema })
    }
}

// ===== Schema =====

/// `TTableSchema`.
pub struct TableSchema {
    pub columns: Vec<WireColumnDesc>,
}

impl TableSchema {
    fn decode(r: &mut Reader) -> Result<TableSchema, ProtocolError> {
        let mut columns = Vec::new();
        while let Some((ty, id)) = r.field_begin()? {
            match (id, ty) {
                (1, ftype::LIST) => {
                    let (ety, len) = r.list_begin()?;
                    for _ in 0..len {
                        if ety == ftype::STRUCT {
                            columns.push(WireColumnDesc::decode(r)?);
                        } else {
                            r.skip(ety)?;
                        }
                    }
                }
                (_, ty) => r.skip(ty)?,
            }
        }
        Ok(TableSchema { columns })
    }
}

/// `TColumnDesc`.
pub struct WireColumnDesc {
    pub name: ByteStr,
    pub type_desc: TypeDescWire,
    /// One-based ordinal position.
    pub position: i32,
    pub comment: Option<ByteStr>,
}

impl WireColumnDesc {
    fn decode(r: &mut Reader) -> Result<WireColumnDesc, ProtocolError> {
        let mut name = ByteStr::new();
        let mut type_desc = None;
        let mut position = 0;
        let mut comment = None;
        while let Some((ty, id)) = r.field_begin()? {
            match (id, ty) {
                (1, ftype::BINARY) => name = r.string()?,
                (2, ftype::STRUCT) => type_desc = Some(TypeDescWire::decode(r)?),
                (3, ftype::I32) => position = r.i32()?,
                (4, ftype::BINARY) => comment = Some(r.string()?),
                (_, ty) => r.skip(ty)?,
            }
        }
        Ok(WireColumnDesc {
            name,
            type_desc: type_desc
                .ok_or_else(|| ProtocolError::new("column descriptor missing type"))?,
            position,
            comment,
        })
    }
}

/// `TTypeDesc`: a flattened tree of type entries, pointers index into
/// [`entries`][Self::entries] and entry 0 is the top type.
///
/// This is the type descriptor cache key, so it keeps the exact wire shape
/// and hashes structurally.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeDescWire {
    pub entries: Vec<TypeEntry>,
}

impl TypeDescWire {
    fn decode(r: &mut Reader) -> Result<TypeDescWire, ProtocolError> {
        let mut entries = Vec::new();
        while let Some((ty, id)) = r.field_begin()? {
            match (id, ty) {
                (1, ftype::LIST) => {
                    let (ety, len) = r.list_begin()?;
                    for _ in 0..len {
                        if ety == ftype::STRUCT {
                            entries.push(TypeEntry::decode(r)?);
                        } else {
                            r.skip(ety)?;
                        }
                    }
                }
                (_, ty) => r.skip(ty)?,
            }
        }
        Ok(TypeDescWire { entries })
    }
}

/// `TTypeEntry`, a union over primitive and nested type entries.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeEntry {
    Primitive { type_id: i32, qualifiers: Vec<(ByteStr, Qualifier)> },
    Array { element: i32 },
    Map { key: i32, value: i32 },
    Struct { fields: Vec<(ByteStr, i32)> },
    Union { fields: Vec<(ByteStr, i32)> },
    UserDefined { name: ByteStr },
}

/// `TTypeQualifierValue`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Qualifier {
    Int(i32),
    String(ByteStr),
}

impl TypeEntry {
    fn decode(r: &mut Reader) -> Result<TypeEntry, ProtocolError> {
        let mut entry = None;
        while let Some((ty, id)) = r.field_begin()? {
            match (id, ty) {
                (1, ftype::STRUCT) => entry = Some(Self::decode_primitive(r)?),
                (2, ftype::STRUCT) => entry = Some(TypeEntry::Array { element: single_ptr(r, 1)? }),
                (3, ftype::STRUCT) => entry = Some(Self::decode_map(r)?),
                (4, ftype::STRUCT) => {
                    entry = Some(TypeEntry::Struct { fields: name_to_ptr(r)? });
                }
                (5, ftype::STRUCT) => {
                    entry = Some(TypeEntry::Union { fields: name_to_ptr(r)? });
                }
                (6, ftype::STRUCT) => entry = Some(Self::decode_user_defined(r)?),
                (_, ty) => r.skip(ty)?,
            }
        }
        entry.ok_or_else(|| ProtocolError::new("empty type entry union"))
    }

    fn decode_primitive(r: &mut Reader) -> Result<TypeEntry, ProtocolError> {
        let mut type_id = -1;
        let mut qualifiers = Vec::new();
        while let Some((ty, id)) = r.field_begin()? {
            match (id, ty) {
                (1, ftype::I32) => type_id = r.i32()?,
                (2, ftype::STRUCT) => qualifiers = decode_qualifiers(r)?,
                (_, ty) => r.skip(ty)?,
            }
        }
        Ok(TypeEntry::Primitive { type_id, qualifiers })
    }

    fn decode_map(r: &mut Reader) -> Result<TypeEntry, ProtocolError> {
        let mut key = 0;
        let mut value = 0;
        while let Some((ty, id)) = r.field_begin()? {
            match (id, ty) {
                (1, ftype::I32) => key = r.i32()?,
                (2, ftype::I32) => value = r.i32()?,
                (_, ty) => r.skip(ty)?,
            }
        }
        Ok(TypeEntry::Map { key, value })
    }

    fn decode_user_defined(r: &mut Reader) -> Result<TypeEntry, ProtocolError> {
        let mut name = ByteStr::new();
        while let Some((ty, id)) = r.field_begin()? {
            match (id, ty) {
                (1, ftype::BINARY) => name = r.string()?,
                (_, ty) => r.skip(ty)?,
            }
        }
        Ok(TypeEntry::UserDefined { name })
    }
}

fn single_ptr(r: &mut Reader, field: i16) -> Result<i32, ProtocolError> {
    let mut ptr = 0;
    while let Some((ty, id)) = r.field_begin()? {
        if id == field && ty == ftype::I32 {
            ptr = r.i32()?;
        } else {
            r.skip(ty)?;
        }
    }
    Ok(ptr)
}

fn name_to_ptr(r: &mut Reader) -> Result<Vec<(ByteStr, i32)>, ProtocolError> {
    let mut fields = Vec::new();
    while let Some((ty, id)) = r.field_begin()? {
        match (id, ty) {
            (1, ftype::MAP) => {
                let (kty, vty, len) = r.map_begin()?;
                for _ in 0..len {
                    if kty == ftype::BINARY && vty == ftype::I32 {
                        let name = r.string()?;
                        let ptr = r.i32()?;
                        fields.push((name, ptr));
                    } else {
                        r.skip(kty)?;
                        r.skip(vty)?;
                    }
                }
            }
            (_, ty) => r.skip(ty)?,
        }
    }
    // thrift map ordering is not specified; sort so equal types hash equal
    fields.sort();
    Ok(fields)
}

fn decode_qualifiers(r: &mut Reader) -> Result<Vec<(ByteStr, Qualifier)>, ProtocolError> {
    let mut qualifiers = Vec::new();
    while let Some((ty, id)) = r.field_begin()? {
        match (id, ty) {
            (1, ftype::MAP) => {
                let (kty, vty, len) = r.map_begin()?;
                for _ in 0..len {
                    if kty == ftype::BINARY && vty == ftype::STRUCT {
                        let name = r.string()?;
                        let mut value = None;
                        while let Some((qty, qid)) = r.field_begin()? {
                            match (qid, qty) {
                                (1, ftype::I32) => value = Some(Qualifier::Int(r.i32()?)),
                                (2, ftype::BINARY) => {
                                    value = Some(Qualifier::String(r.string()?));
                                }
                                (_, qty) => r.skip(qty)?,
                            }
                        }
                        if let Some(value) = value {
                            qualifiers.push((name, value));
                        }
                    } else {
                        r.skip(kty)?;
                        r.skip(vty)?;
                    }
                }
            }
            (_, ty) => r.skip(ty)?,
        }
    }
    qualifiers.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(qualifiers)
}

// ===== Row sets =====

/// `TRowSet`: one fetched batch, either columnar (protocol V6 and newer) or
/// row-based (older servers). Exactly one of `columns`/`rows` is populated.
pub struct RowSet {
    pub start_row_offset: i64,
    pub rows: Vec<RowValues>,
    pub columns: Vec<WireColumn>,
}

impl RowSet {
    pub(crate) fn decode(r: &mut Reader) -> Result<RowSet, ProtocolError> {
        let mut start_row_offset = 0;
        let mut rows = Vec::new();
        let mut columns = Vec::new();
        while let Some((ty, id)) = r.field_begin()? {
            match (id, ty) {
                (1, ftype::I64) => start_row_offset = r.i64()?,
                (2, ftype::LIST) => {
                    let (ety, len) = r.list_begin()?;
                    for _ in 0..len {
                        if ety == ftype::STRUCT {
                            rows.push(RowValues::decode(r)?);
                        } else {
                            r.skip(ety)?;
                        }
                    }
                }
                (3, ftype::LIST) => {
                    let (ety, len) = r.list_begin()?;
                    for _ in 0..len {
                        if ety == ftype::STRUCT {
                            columns.push(WireColumn::decode(r)?);
                        } else {
                            r.skip(ety)?;
                        }
                    }
                }
                (_, ty) => r.skip(ty)?,
            }
        }
        Ok(RowSet { start_row_offset, rows, columns })
    }
}

/// `TColumn`: one column's values for a whole batch, plus a null bitmap
/// (a set bit means the value at that row is absent regardless of the payload).
pub enum WireColumn {
    Bool { values: Vec<bool>, nulls: Bytes },
    Byte { values: Vec<i8>, nulls: Bytes },
    Short { values: Vec<i16>, nulls: Bytes },
    Int { values: Vec<i32>, nulls: Bytes },
    Long { values: Vec<i64>, nulls: Bytes },
    Double { values: Vec<f64>, nulls: Bytes },
    String { values: Vec<ByteStr>, nulls: Bytes },
    Binary { values: Vec<Bytes>, nulls: Bytes },
}

impl WireColumn {
    /// Number of rows in this column.
    pub fn len(&self) -> usize {
        match self {
            Self::Bool { values, .. } => values.len(),
            Self::Byte { values, .. } => values.len(),
            Self::Short { values, .. } => values.len(),
            Self::Int { values, .. } => values.len(),
            Self::Long { values, .. } => values.len(),
            Self::Double { values, .. } => values.len(),
            Self::String { values, .. } => values.len(),
            Self::Binary { values, .. } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn decode(r: &mut Reader) -> Result<WireColumn, ProtocolError> {
        let mut column = None;
        while let Some((ty, id)) = r.field_begin()? {
            if ty != ftype::STRUCT {
                r.skip(ty)?;
                continue;
            }
            column = Some(Self::decode_variant(r, id)?);
        }
        column.ok_or_else(|| ProtocolError::new("empty column union"))
    }

    fn decode_variant(r: &mut Reader, id: i16) -> Result<WireColumn, ProtocolError> {
        macro_rules! typed {
            ($variant:ident, $ety:expr, $read:expr) => {{
                let mut values = Vec::new();
                let mut nulls = Bytes::new();
                while let Some((ty, fid)) = r.field_begin()? {
                    match (fid, ty) {
                        (1, ftype::LIST) => {
                            let (ety, len) = r.list_begin()?;
                            if ety != $ety {
                                return Err(ProtocolError::new(format!(
                                    "unexpected element type {ety} in column values"
                                )));
                            }
                            values.reserve(len);
                            for _ in 0..len {
                                values.push($read(r)?);
                            }
                        }
                        (2, ftype::BINARY) => nulls = r.binary()?,
                        (_, ty) => r.skip(ty)?,
                    }
                }
                WireColumn::$variant { values, nulls }
            }};
        }

        Ok(match id {
            1 => typed!(Bool, ftype::BOOL, Reader::bool),
            2 => typed!(Byte, ftype::BYTE, Reader::i8),
            3 => typed!(Short, ftype::I16, Reader::i16),
            4 => typed!(Int, ftype::I32, Reader::i32),
            5 => typed!(Long, ftype::I64, Reader::i64),
            6 => typed!(Double, ftype::DOUBLE, Reader::double),
            7 => typed!(String, ftype::BINARY, Reader::string),
            8 => typed!(Binary, ftype::BINARY, Reader::binary),
            id => return Err(ProtocolError::new(format!("unknown column union field {id}"))),
        })
    }
}

/// One value of a row-based `TColumnValue` union. The inner value field is
/// optional on the wire; absence is the pre-V6 null marker.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Double(f64),
    String(ByteStr),
}

/// `TRow`.
pub struct RowValues {
    pub values: Vec<WireValue>,
}

impl RowValues {
    fn decode(r: &mut Reader) -> Result<RowValues, ProtocolError> {
        let mut values = Vec::new();
        while let Some((ty, id)) = r.field_begin()? {
            match (id, ty) {
                (1, ftype::LIST) => {
                    let (ety, len) = r.list_begin()?;
                    for _ in 0..len {
                        if ety == ftype::STRUCT {
                            values.push(Self::decode_value(r)?);
                        } else {
                            r.skip(ety)?;
                        }
                    }
                }
                (_, ty) => r.skip(ty)?,
            }
        }
        Ok(RowValues { values })
    }

    fn decode_value(r: &mut Reader) -> Result<WireValue, ProtocolError> {
        let mut value = WireValue::Null;
        while let Some((ty, id)) = r.field_begin()? {
            if ty != ftype::STRUCT {
                r.skip(ty)?;
                continue;
            }
            // T*Value wrapper struct; field 1 is the optional value
            while let Some((vty, vid)) = r.field_begin()? {
                if vid != 1 {
                    r.skip(vty)?;
                    continue;
                }
                value = match (id, vty) {
                    (1, ftype::BOOL) => WireValue::Bool(r.bool()?),
                    (2, ftype::BYTE) => WireValue::Byte(r.i8()?),
                    (3, ftype::I16) => WireValue::Short(r.i16()?),
                    (4, ftype::I32) => WireValue::Int(r.i32()?),
                    (5, ftype::I64) => WireValue::Long(r.i64()?),
                    (6, ftype::DOUBLE) => WireValue::Double(r.double()?),
                    (7, ftype::BINARY) => WireValue::String(r.string()?),
                    (_, vty) => {
                        r.skip(vty)?;
                        WireValue::Null
                    }
                };
            }
        }
        Ok(value)
    }
}

#[cfg(test)]
mod test {
    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::thrift::wire::{
        write_field, write_list_begin, write_map_begin, write_stop, write_string,
    };

    fn reader(buf: BytesMut) -> Reader {
        Reader::new(buf.freeze())
    }

    #[test]
    fn decodes_open_session_reply() {
        let mut buf = BytesMut::new();
        write_field(&mut buf, ftype::STRUCT, 1);
        {
            write_field(&mut buf, ftype::I32, 1);
            buf.put_i32(0);
            write_stop(&mut buf);
        }
        write_field(&mut buf, ftype::I32, 2);
        buf.put_i32(7);
        write_field(&mut buf, ftype::STRUCT, 3);
        {
            write_field(&mut buf, ftype::STRUCT, 1);
            {
                write_field(&mut buf, ftype::BINARY, 1);
                buf.put_i32(4);
                buf.put_slice(b"guid");
                write_field(&mut buf, ftype::BINARY, 2);
                buf.put_i32(6);
                buf.put_slice(b"secret");
                write_stop(&mut buf);
            }
            write_stop(&mut buf);
        }
        write_stop(&mut buf);

        let resp = OpenSessionResp::decode(&mut reader(buf)).unwrap();
        assert!(resp.status.verify(false).is_ok());
        assert_eq!(resp.server_protocol, 7);
        let handle = resp.session_handle.unwrap();
        assert_eq!(handle.id.guid.as_ref(), b"guid");
        assert_eq!(handle.id.secret.as_ref(), b"secret");
    }

    #[test]
    fn non_success_status_verifies_into_a_server_error() {
        let mut buf = BytesMut::new();
        write_field(&mut buf, ftype::I32, 1);
        buf.put_i32(3);
        write_field(&mut buf, ftype::BINARY, 3);
        write_string(&mut buf, "42000");
        write_field(&mut buf, ftype::I32, 4);
        buf.put_i32(40000);
        write_field(&mut buf, ftype::BINARY, 5);
        write_string(&mut buf, "semantic analysis failed");
        write_stop(&mut buf);

        let status = Status::decode(&mut reader(buf)).unwrap();
        let err = status.verify(true).unwrap_err();
        assert_eq!(err.message, "semantic analysis failed");
        assert_eq!(err.sql_state.as_deref(), Some("42000"));
        assert_eq!(err.code, Some(40000));
    }

    #[test]
    fn success_with_info_needs_opting_in() {
        let mut buf = BytesMut::new();
        write_field(&mut buf, ftype::I32, 1);
        buf.put_i32(1);
        write_stop(&mut buf);
        let status = Status::decode(&mut reader(buf)).unwrap();
        assert!(status.verify(true).is_ok());
        assert!(status.verify(false).is_err());
    }

    #[test]
    fn decodes_columnar_union_with_null_bitmap() {
        // TColumn union, i32Val variant
        let mut buf = BytesMut::new();
        write_field(&mut buf, ftype::STRUCT, 4);
        {
            write_field(&mut buf, ftype::LIST, 1);
            write_list_begin(&mut buf, ftype::I32, 3);
            for v in [10, 20, 30] {
                buf.put_i32(v);
            }
            write_field(&mut buf, ftype::BINARY, 2);
            buf.put_i32(1);
            buf.put_u8(0b101);
            write_stop(&mut buf);
        }
        write_stop(&mut buf);

        let column = WireColumn::decode(&mut reader(buf)).unwrap();
        let WireColumn::Int { values, nulls } = column else { panic!("expected ints") };
        assert_eq!(values, vec![10, 20, 30]);
        assert_eq!(nulls.as_ref(), &[0b101]);
    }

    #[test]
    fn absent_inner_value_is_the_row_null_marker() {
        // TRow with two TColumnValues: a set i64Val and an empty stringVal
        let mut buf = BytesMut::new();
        write_field(&mut buf, ftype::LIST, 1);
        write_list_begin(&mut buf, ftype::STRUCT, 2);
        {
            write_field(&mut buf, ftype::STRUCT, 5);
            {
                write_field(&mut buf, ftype::I64, 1);
                buf.put_i64(99);
                write_stop(&mut buf);
            }
            write_stop(&mut buf);
        }
        {
            write_field(&mut buf, ftype::STRUCT, 7);
            write_stop(&mut buf); // no value field
            write_stop(&mut buf);
        }
        write_stop(&mut buf);

        let row = RowValues::decode(&mut reader(buf)).unwrap();
        assert_eq!(row.values, vec![WireValue::Long(99), WireValue::Null]);
    }

    #[test]
    fn struct_type_entries_hash_independent_of_map_order() {
        let image = |first: (&str, i32), second: (&str, i32)| {
            let mut buf = BytesMut::new();
            write_field(&mut buf, ftype::LIST, 1);
            write_list_begin(&mut buf, ftype::STRUCT, 1);
            {
                write_field(&mut buf, ftype::STRUCT, 4); // structEntry
                {
                    write_field(&mut buf, ftype::MAP, 1);
                    write_map_begin(&mut buf, ftype::BINARY, ftype::I32, 2);
                    for (name, ptr) in [first, second] {
                        write_string(&mut buf, name);
                        buf.put_i32(ptr);
                    }
                    write_stop(&mut buf);
                }
                write_stop(&mut buf);
            }
            write_stop(&mut buf);
            TypeDescWire::decode(&mut reader(buf)).unwrap()
        };

        let a = image(("x", 1), ("y", 2));
        let b = image(("y", 2), ("x", 1));
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_response_fields_are_skipped() {
        let mut buf = BytesMut::new();
        write_field(&mut buf, ftype::STRUCT, 1);
        {
            write_field(&mut buf, ftype::I32, 1);
            buf.put_i32(0);
            write_stop(&mut buf);
        }
        // a field id this driver does not know
        write_field(&mut buf, ftype::BINARY, 99);
        write_string(&mut buf, "future extension");
        write_stop(&mut buf);

        let resp = StatusResp::decode(&mut reader(buf)).unwrap();
        assert!(resp.status.verify(false).is_ok());
    }
}
