//! Thrift RPC client over a framed transport.
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicBool, Ordering},
};

use bytes::BytesMut;
use tokio::{net::TcpStream, sync::Mutex};

use crate::{
    error::Result,
    thrift::{
        FetchOrientation, OperationHandle, ProtocolError, ProtocolVersion, SessionHandle,
        backend::{
            ApplicationException, FetchResultsResp, HandleResp, OpenSessionResp,
            OperationStatusResp, ResultSetMetadataResp, StatusResp,
        },
        frontend,
        wire::{self, Reader, Request, Response, ftype, message},
    },
    transport::Framed,
};

/// The HiveServer2 RPC surface, one method per wire call.
///
/// [`Client`] is the production implementation; sessions and cursors are
/// generic over this trait so they can run against an in-process server in
/// tests.
pub trait CliService: Send + Sync {
    /// Tear down the underlying transport, if any.
    fn shutdown(&self) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }

    /// Whether the underlying transport is still usable.
    fn is_live(&self) -> bool {
        true
    }

    fn open_session(
        &self,
        protocol: ProtocolVersion,
        username: Option<&str>,
        password: Option<&str>,
        configuration: &BTreeMap<String, String>,
    ) -> impl Future<Output = Result<OpenSessionResp>> + Send;

    fn close_session(
        &self,
        session: &SessionHandle,
    ) -> impl Future<Output = Result<StatusResp>> + Send;

    fn execute_statement(
        &self,
        session: &SessionHandle,
        statement: &str,
        conf_overlay: &BTreeMap<String, String>,
        query_timeout: i64,
    ) -> impl Future<Output = Result<HandleResp>> + Send;

    fn get_operation_status(
        &self,
        operation: &OperationHandle,
    ) -> impl Future<Output = Result<OperationStatusResp>> + Send;

    fn cancel_operation(
        &self,
        operation: &OperationHandle,
    ) -> impl Future<Output = Result<StatusResp>> + Send;

    fn close_operation(
        &self,
        operation: &OperationHandle,
    ) -> impl Future<Output = Result<StatusResp>> + Send;

    fn fetch_results(
        &self,
        operation: &OperationHandle,
        orientation: FetchOrientation,
        max_rows: i64,
        fetch_type: i16,
    ) -> impl Future<Output = Result<FetchResultsResp>> + Send;

    fn get_result_set_metadata(
        &self,
        operation: &OperationHandle,
    ) -> impl Future<Output = Result<ResultSetMetadataResp>> + Send;

    fn get_catalogs(
        &self,
        session: &SessionHandle,
    ) -> impl Future<Output = Result<HandleResp>> + Send;

    fn get_schemas(
        &self,
        session: &SessionHandle,
        catalog: Option<&str>,
        schema_pattern: Option<&str>,
    ) -> impl Future<Output = Result<HandleResp>> + Send;

    fn get_tables(
        &self,
        session: &SessionHandle,
        catalog: Option<&str>,
        schema_pattern: Option<&str>,
        table_pattern: Option<&str>,
        table_types: &[&str],
    ) -> impl Future<Output = Result<HandleResp>> + Send;

    fn get_table_types(
        &self,
        session: &SessionHandle,
    ) -> impl Future<Output = Result<HandleResp>> + Send;

    fn get_type_info(
        &self,
        session: &SessionHandle,
    ) -> impl Future<Output = Result<HandleResp>> + Send;
}

struct Inner<S> {
    framed: Framed<S>,
    seq: i32,
}

/// A connected Thrift client. Calls are serialized over the connection;
/// one request is in flight at a time.
pub struct Client<S = TcpStream> {
    inner: Mutex<Inner<S>>,
    broken: AtomicBool,
}

impl Client<TcpStream> {
    /// Open a TCP connection to a HiveServer2 endpoint.
    pub async fn connect(host: &str, port: u16) -> Result<Client> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(Client::from_stream(stream))
    }
}

impl<S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send> Client<S> {
    pub(crate) fn from_stream(stream: S) -> Client<S> {
        Client {
            inner: Mutex::new(Inner { framed: Framed::new(stream), seq: 0 }),
            broken: AtomicBool::new(false),
        }
    }

    /// Close the underlying stream. Further calls fail with an io error.
    pub(crate) async fn close_transport(&self) -> Result<()> {
        self.broken.store(true, Ordering::Release);
        self.inner.lock().await.framed.shutdown().await?;
        Ok(())
    }

    async fn call<Q: Request, R: Response>(&self, request: &Q) -> Result<R> {
        let mut inner = self.inner.lock().await;
        let seq = inner.seq;
        inner.seq = inner.seq.wrapping_add(1);

        let mut buf = BytesMut::with_capacity(256);
        wire::write_message_begin(&mut buf, Q::METHOD, message::CALL, seq);
        request.encode(&mut buf);
        if let Err(err) = inner.framed.send(&buf).await {
            self.broken.store(true, Ordering::Release);
            return Err(err.into());
        }

        let frame = match inner.framed.recv().await {
            Ok(frame) => frame,
            Err(err) => {
                self.broken.store(true, Ordering::Release);
                return Err(err.into());
            }
        };
        drop(inner);

        let mut reader = Reader::new(frame);
        let (_, message_type, reply_seq) = reader.message_begin()?;
        if reply_seq != seq {
            return Err(ProtocolError::new(format!(
                "out of order reply: sent seq {seq}, got {reply_seq}"
            ))
            .into());
        }

        match message_type {
            message::REPLY => {
                // reply struct: field 0 carries the success value
                let mut result = None;
                while let Some((ty, id)) = reader.field_begin()? {
                    match (id, ty) {
                        (0, ftype::STRUCT) => result = Some(R::decode(&mut reader)?),
                        (_, ty) => reader.skip(ty)?,
                    }
                }
                result.ok_or_else(|| ProtocolError::new("reply carries no result").into())
            }
            message::EXCEPTION => {
                let ex = ApplicationException::decode(&mut reader)?;
                Err(ProtocolError::new(format!(
                    "server exception (type {}): {}",
                    ex.kind, ex.message
                ))
                .into())
            }
            other => Err(ProtocolError::new(format!("unexpected message type {other}")).into()),
        }
    }
}

impl<S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + Sync> CliService for Client<S> {
    async fn shutdown(&self) -> Result<()> {
        self.close_transport().await
    }

    fn is_live(&self) -> bool {
        !self.broken.load(Ordering::Acquire)
    }

    async fn open_session(
        &self,
        protocol: ProtocolVersion,
        username: Option<&str>,
        password: Option<&str>,
        configuration: &BTreeMap<String, String>,
    ) -> Result<OpenSessionResp> {
        self.call(&frontend::OpenSession {
            client_protocol: protocol,
            username,
            password,
            configuration,
        })
        .await
    }

    async fn close_session(&self, session: &SessionHandle) -> Result<StatusResp> {
        self.call(&frontend::CloseSession { session }).await
    }

    async fn execute_statement(
        &self,
        session: &SessionHandle,
        statement: &str,
        conf_overlay: &BTreeMap<String, String>,
        query_timeout: i64,
    ) -> Result<HandleResp> {
        self.call(&frontend::ExecuteStatement {
            session,
            statement,
            conf_overlay: Some(conf_overlay).filter(|m| !m.is_empty()),
            query_timeout,
        })
        .await
    }

    async fn get_operation_status(
        &self,
        operation: &OperationHandle,
    ) -> Result<OperationStatusResp> {
        self.call(&frontend::GetOperationStatus { operation }).await
    }

    async fn cancel_operation(&self, operation: &OperationHandle) -> Result<StatusResp> {
        self.call(&frontend::CancelOperation { operation }).await
    }

    async fn close_operation(&self, operation: &OperationHandle) -> Result<StatusResp> {
        self.call(&frontend::CloseOperation { operation }).await
    }

    async fn fetch_results(
        &self,
        operation: &OperationHandle,
        orientation: FetchOrientation,
        max_rows: i64,
        fetch_type: i16,
    ) -> Result<FetchResultsResp> {
        self.call(&frontend::FetchResults { operation, orientation, max_rows, fetch_type })
            .await
    }

    async fn get_result_set_metadata(
        &self,
        operation: &OperationHandle,
    ) -> Result<ResultSetMetadataResp> {
        self.call(&frontend::GetResultSetMetadata { operation }).await
    }

    async fn get_catalogs(&self, session: &SessionHandle) -> Result<HandleResp> {
        self.call(&frontend::GetCatalogs { session }).await
    }

    async fn get_schemas(
        &self,
        session: &SessionHandle,
        catalog: Option<&str>,
        schema_pattern: Option<&str>,
    ) -> Result<HandleResp> {
        self.call(&frontend::GetSchemas { session, catalog, schema_pattern }).await
    }

    async fn get_tables(
        &self,
        session: &SessionHandle,
        catalog: Option<&str>,
        schema_pattern: Option<&str>,
        table_pattern: Option<&str>,
        table_types: &[&str],
    ) -> Result<HandleResp> {
        self.call(&frontend::GetTables {
            session,
            catalog,
            schema_pattern,
            table_pattern,
            table_types,
        })
        .await
    }

    async fn get_table_types(&self, session: &SessionHandle) -> Result<HandleResp> {
        self.call(&frontend::GetTableTypes { session }).await
    }

    async fn get_type_info(&self, session: &SessionHandle) -> Result<HandleResp> {
        self.call(&frontend::GetTypeInfo { session }).await
    }
}

#[cfg(test)]
mod test {
    use bytes::Bytes;

    use super::*;
    use crate::thrift::HandleIdentifier;

    fn handle() -> SessionHandle {
        SessionHandle {
            id: HandleIdentifier {
                guid: Bytes::from_static(&[1; 16]),
                secret: Bytes::from_static(&[2; 16]),
            },
        }
    }

    #[tokio::test]
    async fn io_failure_marks_the_client_dead() {
        let (local, remote) = tokio::io::duplex(64);
        let client = Client::from_stream(local);
        assert!(client.is_live());

        // the peer goes away mid conversation
        drop(remote);
        let Err(_) = client.get_catalogs(&handle()).await else {
            panic!("call succeeded with no peer")
        };
        assert!(!client.is_live());
    }

    #[tokio::test]
    async fn shutdown_marks_the_client_dead() {
        let (local, _remote) = tokio::io::duplex(64);
        let client = Client::from_stream(local);
        client.close_transport().await.unwrap();
        assert!(!client.is_live());
    }
}
