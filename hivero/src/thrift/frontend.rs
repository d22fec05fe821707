//! Requests sent to the server.
//!
//! Field ids follow the `TCLIService` IDL. Optional fields are only written
//! when present; Thrift readers tolerate their absence.
use bytes::{BufMut, BytesMut};
use std::collections::BTreeMap;

use super::{
    FetchOrientation, OperationHandle, ProtocolVersion, SessionHandle,
    wire::{self, Request, ftype},
};

fn write_handle_identifier(buf: &mut BytesMut, id: &super::HandleIdentifier) {
    wire::write_field(buf, ftype::BINARY, 1);
    wire::write_binary(buf, &id.guid);
    wire::write_field(buf, ftype::BINARY, 2);
    wire::write_binary(buf, &id.secret);
    wire::write_stop(buf);
}

/// Writes `1: sessionHandle`; it is field 1 of every request carrying one.
fn write_session_handle(buf: &mut BytesMut, handle: &SessionHandle) {
    wire::write_field(buf, ftype::STRUCT, 1);
    {
        wire::write_field(buf, ftype::STRUCT, 1);
        write_handle_identifier(buf, &handle.id);
    }
    wire::write_stop(buf);
}

/// Writes `1: operationHandle`; it is field 1 of every request carrying one.
fn write_operation_handle(buf: &mut BytesMut, handle: &OperationHandle) {
    wire::write_field(buf, ftype::STRUCT, 1);
    {
        wire::write_field(buf, ftype::STRUCT, 1);
        write_handle_identifier(buf, &handle.id);
    }
    wire::write_field(buf, ftype::I32, 2);
    buf.put_i32(handle.operation_type);
    wire::write_field(buf, ftype::BOOL, 3);
    wire::write_bool(buf, handle.has_result_set);
    if let Some(count) = handle.modified_row_count {
        wire::write_field(buf, ftype::DOUBLE, 4);
        buf.put_f64(count);
    }
    wire::write_stop(buf);
}

fn write_string_map(buf: &mut BytesMut, map: &BTreeMap<String, String>) {
    wire::write_map_begin(buf, ftype::BINARY, ftype::BINARY, map.len());
    for (key, value) in map {
        wire::write_string(buf, key);
        wire::write_string(buf, value);
    }
}

/// `TOpenSessionReq`.
pub struct OpenSession<'a> {
    pub client_protocol: ProtocolVersion,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub configuration: &'a BTreeMap<String, String>,
}

impl Request for OpenSession<'_> {
    const METHOD: &'static str = "OpenSession";

    fn encode(&self, buf: &mut BytesMut) {
        wire::write_field(buf, ftype::STRUCT, 1);
        {
            wire::write_field(buf, ftype::I32, 1);
            buf.put_i32(self.client_protocol.value());
            if let Some(username) = self.username {
                wire::write_field(buf, ftype::BINARY, 2);
                wire::write_string(buf, username);
                wire::write_field(buf, ftype::BINARY, 3);
                wire::write_string(buf, self.password.unwrap_or(""));
            }
            if !self.configuration.is_empty() {
                wire::write_field(buf, ftype::MAP, 4);
                write_string_map(buf, self.configuration);
            }
            wire::write_stop(buf);
        }
        wire::write_stop(buf);
    }
}

/// `TExecuteStatementReq`. Always submitted with `runAsync = true`; control
/// returns as soon as the server hands out an operation handle.
pub struct ExecuteStatement<'a> {
    pub session: &'a SessionHandle,
    pub statement: &'a str,
    pub conf_overlay: Option<&'a BTreeMap<String, String>>,
    pub query_timeout: i64,
}

impl Request for ExecuteStatement<'_> {
    const METHOD: &'static str = "ExecuteStatement";

    fn encode(&self, buf: &mut BytesMut) {
        wire::write_field(buf, ftype::STRUCT, 1);
        {
            write_session_handle(buf, self.session);
            wire::write_field(buf, ftype::BINARY, 2);
            wire::write_string(buf, self.statement);
            if let Some(overlay) = self.conf_overlay {
                wire::write_field(buf, ftype::MAP, 3);
                write_string_map(buf, overlay);
            }
            wire::write_field(buf, ftype::BOOL, 4);
            wire::write_bool(buf, true);
            if self.query_timeout > 0 {
                wire::write_field(buf, ftype::I64, 5);
                buf.put_i64(self.query_timeout);
            }
            wire::write_stop(buf);
        }
        wire::write_stop(buf);
    }
}

/// `TGetOperationStatusReq`.
pub struct GetOperationStatus<'a> {
    pub operation: &'a OperationHandle,
}

impl Request for GetOperationStatus<'_> {
    const METHOD: &'static str = "GetOperationStatus";

    fn encode(&self, buf: &mut BytesMut) {
        wire::write_field(buf, ftype::STRUCT, 1);
        {
            write_operation_handle(buf, self.operation);
            wire::write_stop(buf);
        }
        wire::write_stop(buf);
    }
}

/// `TFetchResultsReq`. `fetch_type` 0 pulls result rows, 1 pulls log lines.
pub struct FetchResults<'a> {
    pub operation: &'a OperationHandle,
    pub orientation: FetchOrientation,
    pub max_rows: i64,
    pub fetch_type: i16,
}

impl Request for FetchResults<'_> {
    const METHOD: &'static str = "FetchResults";

    fn encode(&self, buf: &mut BytesMut) {
        wire::write_field(buf, ftype::STRUCT, 1);
        {
            write_operation_handle(buf, self.operation);
            wire::write_field(buf, ftype::I32, 2);
            buf.put_i32(self.orientation.value());
            wire::write_field(buf, ftype::I64, 3);
            buf.put_i64(self.max_rows);
            wire::write_field(buf, ftype::I16, 4);
            buf.put_i16(self.fetch_type);
            wire::write_stop(buf);
        }
        wire::write_stop(buf);
    }
}

/// `TGetResultSetMetadataReq`.
pub struct GetResultSetMetadata<'a> {
    pub operation: &'a OperationHandle,
}

impl Request for GetResultSetMetadata<'_> {
    const METHOD: &'static str = "GetResultSetMetadata";

    fn encode(&self, buf: &mut BytesMut) {
        wire::write_field(buf, ftype::STRUCT, 1);
        {
            write_operation_handle(buf, self.operation);
            wire::write_stop(buf);
        }
        wire::write_stop(buf);
    }
}

macro_rules! operation_request {
    ($(#[$meta:meta])* $name:ident, $method:literal) => {
        $(#[$meta])*
        pub struct $name<'a> {
            pub operation: &'a OperationHandle,
        }

        impl Request for $name<'_> {
            const METHOD: &'static str = $method;

            fn encode(&self, buf: &mut BytesMut) {
                wire::write_field(buf, ftype::STRUCT, 1);
                {
                    write_operation_handle(buf, self.operation);
                    wire::write_stop(buf);
                }
                wire::write_stop(buf);
            }
        }
    };
}

operation_request! {
    /// `TCancelOperationReq`.
    CancelOperation, "CancelOperation"
}

operation_request! {
    /// `TCloseOperationReq`.
    CloseOperation, "CloseOperation"
}

macro_rules! session_request {
    ($(#[$meta:meta])* $name:ident, $method:literal) => {
        $(#[$meta])*
        pub struct $name<'a> {
            pub session: &'a SessionHandle,
        }

        impl Request for $name<'_> {
            const METHOD: &'static str = $method;

            fn encode(&self, buf: &mut BytesMut) {
                wire::write_field(buf, ftype::STRUCT, 1);
                {
                    write_session_handle(buf, self.session);
                    wire::write_stop(buf);
                }
                wire::write_stop(buf);
            }
        }
    };
}

session_request! {
    /// `TCloseSessionReq`.
    CloseSession, "CloseSession"
}

session_request! {
    /// `TGetCatalogsReq`.
    GetCatalogs, "GetCatalogs"
}

session_request! {
    /// `TGetTableTypesReq`.
    GetTableTypes, "GetTableTypes"
}

session_request! {
    /// `TGetTypeInfoReq`.
    GetTypeInfo, "GetTypeInfo"
}

/// `TGetSchemasReq`. A missing schema pattern matches everything.
pub struct GetSchemas<'a> {
    pub session: &'a SessionHandle,
    pub catalog: Option<&'a str>,
    pub schema_pattern: Option<&'a str>,
}

impl Request for GetSchemas<'_> {
    const METHOD: &'static str = "GetSchemas";

    fn encode(&self, buf: &mut BytesMut) {
        wire::write_field(buf, ftype::STRUCT, 1);
        {
            write_session_handle(buf, self.session);
            if let Some(catalog) = self.catalog {
                wire::write_field(buf, ftype::BINARY, 2);
                wire::write_string(buf, catalog);
            }
            wire::write_field(buf, ftype::BINARY, 3);
            wire::write_string(buf, self.schema_pattern.unwrap_or("%"));
            wire::write_stop(buf);
        }
        wire::write_stop(buf);
    }
}

/// `TGetTablesReq`.
pub struct GetTables<'a> {
    pub session: &'a SessionHandle,
    pub catalog: Option<&'a str>,
    pub schema_pattern: Option<&'a str>,
    pub table_pattern: Option<&'a str>,
    pub table_types: &'a [&'a str],
}

impl Request for GetTables<'_> {
    const METHOD: &'static str = "GetTables";

    fn encode(&self, buf: &mut BytesMut) {
        wire::write_field(buf, ftype::STRUCT, 1);
        {
            write_session_handle(buf, self.session);
            if let Some(catalog) = self.catalog {
                wire::write_field(buf, ftype::BINARY, 2);
                wire::write_string(buf, catalog);
            }
            wire::write_field(buf, ftype::BINARY, 3);
            wire::write_string(buf, self.schema_pattern.unwrap_or("%"));
            if let Some(table) = self.table_pattern {
                wire::write_field(buf, ftype::BINARY, 4);
                wire::write_string(buf, table);
            }
            if !self.table_types.is_empty() {
                wire::write_field(buf, ftype::LIST, 5);
                wire::write_list_begin(buf, ftype::BINARY, self.table_types.len());
                for ty in self.table_types {
                    wire::write_string(buf, ty);
                }
            }
            wire::write_stop(buf);
        }
        wire::write_stop(buf);
    }
}
