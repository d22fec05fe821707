//! In-process fake server for driving sessions in tests.
use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use bytes::Bytes;

use crate::{
    client::CliService,
    common::ByteStr,
    error::Result,
    session::Connector,
    thrift::{
        FetchOrientation, HandleIdentifier, OperationHandle, ProtocolVersion, SessionHandle,
        backend::{
            FetchResultsResp, HandleResp, OpenSessionResp, OperationStatusResp,
            ResultSetMetadataResp, RowSet, Status, StatusResp, TableSchema, TypeDescWire,
            TypeEntry, WireColumn, WireColumnDesc,
        },
    },
};

pub(crate) fn success() -> Status {
    Status { code: 0, info_messages: Vec::new(), sql_state: None, error_code: None, error_message: None }
}

pub(crate) fn error_status(message: &str, sql_state: Option<&str>, code: Option<i32>) -> Status {
    Status {
        code: 3,
        info_messages: Vec::new(),
        sql_state: sql_state.map(ByteStr::copy_from_str),
        error_code: code,
        error_message: Some(ByteStr::copy_from_str(message)),
    }
}

fn empty_rowset() -> RowSet {
    RowSet { start_row_offset: 0, rows: Vec::new(), columns: Vec::new() }
}

/// Canned behavior for one statement.
pub(crate) struct QueryScript {
    /// Operation states reported by successive status polls; the last one
    /// repeats.
    pub states: Vec<i32>,
    /// Error detail attached once the ERROR state is reached.
    pub error: Option<(String, Option<String>, Option<i32>)>,
    /// Result columns as `(name, primitive type id)`.
    pub columns: Vec<(&'static str, i32)>,
    /// Result batches handed out fetch by fetch.
    pub batches: Vec<RowSet>,
    pub logs: Vec<String>,
}

impl QueryScript {
    pub(crate) fn finished() -> QueryScript {
        QueryScript {
            states: vec![2],
            error: None,
            columns: Vec::new(),
            batches: Vec::new(),
            logs: Vec::new(),
        }
    }

    pub(crate) fn states(mut self, states: &[i32]) -> QueryScript {
        self.states = states.to_vec();
        self
    }

    pub(crate) fn error(mut self, message: &str, sql_state: Option<&str>, code: Option<i32>) -> QueryScript {
        self.error = Some((message.to_owned(), sql_state.map(str::to_owned), code));
        self
    }

    pub(crate) fn columns(mut self, columns: &[(&'static str, i32)]) -> QueryScript {
        self.columns = columns.to_vec();
        self
    }

    pub(crate) fn batch(mut self, columns: Vec<WireColumn>) -> QueryScript {
        self.batches.push(RowSet { start_row_offset: 0, rows: Vec::new(), columns });
        self
    }

    pub(crate) fn logs(mut self, lines: &[&str]) -> QueryScript {
        self.logs = lines.iter().map(|l| (*l).to_owned()).collect();
        self
    }
}

struct LiveOperation {
    states: VecDeque<i32>,
    error: Option<(String, Option<String>, Option<i32>)>,
    schema: Vec<(&'static str, i32)>,
    batches: VecDeque<RowSet>,
    logs: Vec<String>,
}

#[derive(Default)]
pub(crate) struct Counters {
    pub offers: Vec<i32>,
    pub opens: usize,
    pub session_closes: usize,
    pub shutdowns: usize,
    pub executes: usize,
    pub status_polls: usize,
    pub row_fetches: usize,
    pub cancels: Vec<Bytes>,
    pub operation_closes: Vec<Bytes>,
    pub metadata_calls: usize,
}

struct State {
    server_protocol: ProtocolVersion,
    scripts: HashMap<String, QueryScript>,
    operations: HashMap<Bytes, LiveOperation>,
    next_id: u8,
    live: bool,
    counters: Counters,
}

/// A scriptable in-memory `CliService`.
///
/// Clones share state, so a [`FakeConnector`] can hand the session a fresh
/// clone per connect attempt while the test keeps its own for assertions.
#[derive(Clone)]
pub(crate) struct FakeServer {
    state: Arc<Mutex<State>>,
}

impl FakeServer {
    pub(crate) fn new(server_protocol: ProtocolVersion) -> FakeServer {
        FakeServer {
            state: Arc::new(Mutex::new(State {
                server_protocol,
                scripts: HashMap::new(),
                operations: HashMap::new(),
                next_id: 0,
                live: true,
                counters: Counters::default(),
            })),
        }
    }

    pub(crate) fn script(&self, statement: &str, script: QueryScript) {
        self.state.lock().unwrap().scripts.insert(statement.to_owned(), script);
    }

    pub(crate) fn counters<R>(&self, f: impl FnOnce(&Counters) -> R) -> R {
        f(&self.state.lock().unwrap().counters)
    }

    /// Simulate losing the connection under the session.
    pub(crate) fn drop_transport(&self) {
        self.state.lock().unwrap().live = false;
    }

    fn start_operation(&self, script: LiveOperation, has_result_set: bool) -> OperationHandle {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let guid = Bytes::from(vec![state.next_id; 16]);
        state.operations.insert(guid.clone(), script);
        OperationHandle {
            id: HandleIdentifier { guid, secret: Bytes::from_static(&[0; 16]) },
            operation_type: 0,
            has_result_set,
            modified_row_count: None,
        }
    }

    fn metadata_operation(&self) -> HandleResp {
        self.state.lock().unwrap().counters.metadata_calls += 1;
        let live = LiveOperation {
            states: VecDeque::from([2]),
            error: None,
            schema: vec![("name", 7)],
            batches: VecDeque::new(),
            logs: Vec::new(),
        };
        let handle = self.start_operation(live, true);
        HandleResp { status: success(), operation_handle: Some(handle) }
    }
}

impl CliService for FakeServer {
    async fn shutdown(&self) -> Result<()> {
        self.state.lock().unwrap().counters.shutdowns += 1;
        Ok(())
    }

    fn is_live(&self) -> bool {
        self.state.lock().unwrap().live
    }

    async fn open_session(
        &self,
        protocol: ProtocolVersion,
        _username: Option<&str>,
        _password: Option<&str>,
        _configuration: &BTreeMap<String, String>,
    ) -> Result<OpenSessionResp> {
        let mut state = self.state.lock().unwrap();
        state.counters.offers.push(protocol.value());
        if protocol > state.server_protocol {
            return Ok(OpenSessionResp {
                status: error_status(
                    &format!("Invalid protocol version {}", protocol.value()),
                    Some("08S01"),
                    None,
                ),
                server_protocol: -1,
                session_handle: None,
            });
        }
        state.counters.opens += 1;
        Ok(OpenSessionResp {
            status: success(),
            server_protocol: protocol.min(state.server_protocol).value(),
            session_handle: Some(SessionHandle {
                id: HandleIdentifier {
                    guid: Bytes::from_static(&[9; 16]),
                    secret: Bytes::from_static(&[8; 16]),
                },
            }),
        })
    }

    async fn close_session(&self, _session: &SessionHandle) -> Result<StatusResp> {
        self.state.lock().unwrap().counters.session_closes += 1;
        Ok(StatusResp { status: success() })
    }

    async fn execute_statement(
        &self,
        _session: &SessionHandle,
        statement: &str,
        _conf_overlay: &BTreeMap<String, String>,
        _query_timeout: i64,
    ) -> Result<HandleResp> {
        let script = {
            let mut state = self.state.lock().unwrap();
            state.counters.executes += 1;
            match state.scripts.remove(statement) {
                Some(script) => script,
                None => {
                    return Ok(HandleResp {
                        status: error_status(
                            &format!("unscripted statement {statement:?}"),
                            Some("42000"),
                            Some(10)
                        ),
                        operation_handle: None,
                    });
                }
            }
        };

        let has_result_set = !script.columns.is_empty();
        let live = LiveOperation {
            states: VecDeque::from(script.states),
            error: script.error,
            schema: script.columns,
            batches: VecDeque::from(script.batches),
            logs: script.logs,
        };
        let handle = self.start_operation(live, has_result_set);
        Ok(HandleResp { status: success(), operation_handle: Some(handle) })
    }

    async fn get_operation_status(
        &self,
        operation: &OperationHandle,
    ) -> Result<OperationStatusResp> {
        let mut state = self.state.lock().unwrap();
        state.counters.status_polls += 1;
        let Some(op) = state.operations.get_mut(&operation.id.guid) else {
            return Ok(OperationStatusResp {
                status: error_status("no such operation", None, None),
                operation_state: None,
                sql_state: None,
                error_code: None,
                error_message: None,
            });
        };

        let current = if op.states.len() > 1 {
            op.states.pop_front().unwrap_or(6)
        } else {
            op.states.front().copied().unwrap_or(6)
        };
        let (error_message, sql_state, error_code) = match (&op.error, current) {
            (Some((message, sql_state, code)), 5) => (
                Some(ByteStr::copy_from_str(message)),
                sql_state.as_deref().map(ByteStr::copy_from_str),
                *code,
            ),
            _ => (None, None, None),
        };
        Ok(OperationStatusResp {
            status: success(),
            operation_state: Some(current),
            sql_state,
            error_code,
            error_message,
        })
    }

    async fn cancel_operation(&self, operation: &OperationHandle) -> Result<StatusResp> {
        self.state.lock().unwrap().counters.cancels.push(operation.id.guid.clone());
        Ok(StatusResp { status: success() })
    }

    async fn close_operation(&self, operation: &OperationHandle) -> Result<StatusResp> {
        let mut state = self.state.lock().unwrap();
        state.counters.operation_closes.push(operation.id.guid.clone());
        state.operations.remove(&operation.id.guid);
        Ok(StatusResp { status: success() })
    }

    async fn fetch_results(
        &self,
        operation: &OperationHandle,
        _orientation: FetchOrientation,
        _max_rows: i64,
        fetch_type: i16,
    ) -> Result<FetchResultsResp> {
        let mut state = self.state.lock().unwrap();
        let Some(op) = state.operations.get_mut(&operation.id.guid) else {
            return Ok(FetchResultsResp {
                status: error_status("no such operation", None, None),
                has_more_rows: false,
                results: None,
            });
        };

        if fetch_type == 1 {
            let lines: Vec<_> = op.logs.drain(..).map(|l| l.into()).collect();
            let count = lines.len();
            return Ok(FetchResultsResp {
                status: success(),
                has_more_rows: false,
                results: Some(RowSet {
                    start_row_offset: 0,
                    rows: Vec::new(),
                    columns: vec![WireColumn::String {
                        values: lines,
                        nulls: Bytes::from(vec![0u8; count.div_ceil(8)]),
                    }],
                }),
            });
        }

        let batch = op.batches.pop_front().unwrap_or_else(empty_rowset);
        let has_more_rows = !op.batches.is_empty();
        state.counters.row_fetches += 1;
        Ok(FetchResultsResp { status: success(), has_more_rows, results: Some(batch) })
    }

    async fn get_result_set_metadata(
        &self,
        operation: &OperationHandle,
    ) -> Result<ResultSetMetadataResp> {
        let state = self.state.lock().unwrap();
        let Some(op) = state.operations.get(&operation.id.guid) else {
            return Ok(ResultSetMetadataResp {
                status: error_status("no such operation", None, None),
                schema: None,
            });
        };

        let columns = op
            .schema
            .iter()
            .enumerate()
            .map(|(i, (name, type_id))| WireColumnDesc {
                name: (*name).into(),
                type_desc: TypeDescWire {
                    entries: vec![TypeEntry::Primitive { type_id: *type_id, qualifiers: vec![] }],
                },
                position: i as i32 + 1,
                comment: None,
            })
            .collect();
        Ok(ResultSetMetadataResp {
            status: success(),
            schema: Some(TableSchema { columns }),
        })
    }

    async fn get_catalogs(&self, _session: &SessionHandle) -> Result<HandleResp> {
        Ok(self.metadata_operation())
    }

    async fn get_schemas(
        &self,
        _session: &SessionHandle,
        _catalog: Option<&str>,
        _schema_pattern: Option<&str>,
    ) -> Result<HandleResp> {
        Ok(self.metadata_operation())
    }

    async fn get_tables(
        &self,
        _session: &SessionHandle,
        _catalog: Option<&str>,
        _schema_pattern: Option<&str>,
        _table_pattern: Option<&str>,
        _table_types: &[&str],
    ) -> Result<HandleResp> {
        Ok(self.metadata_operation())
    }

    async fn get_table_types(&self, _session: &SessionHandle) -> Result<HandleResp> {
        Ok(self.metadata_operation())
    }

    async fn get_type_info(&self, _session: &SessionHandle) -> Result<HandleResp> {
        Ok(self.metadata_operation())
    }
}

/// Hands out shared-state clones of one [`FakeServer`].
pub(crate) struct FakeConnector {
    server: FakeServer,
}

impl FakeConnector {
    pub(crate) fn new(server: &FakeServer) -> FakeConnector {
        FakeConnector { server: server.clone() }
    }
}

impl Connector for FakeConnector {
    type Service = FakeServer;

    async fn connect(&self) -> Result<FakeServer> {
        Ok(self.server.clone())
    }
}
