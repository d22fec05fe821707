//! Session establishment and the session level API.
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicBool, Ordering},
};

use crate::{
    cache::DescriptorCache,
    client::{CliService, Client},
    config::Config,
    discovery,
    error::{Error, Result},
    metadata::{Schema, TypeDescriptor},
    operation::Operation,
    thrift::{ProtocolError, ProtocolVersion, SessionHandle, backend::{HandleResp, TableSchema}},
};

crate::common::unit_error! {
    /// The session was closed and cannot issue further calls.
    pub struct SessionClosed("session is closed");
}

/// Produces connected service clients for the negotiation retries; every
/// attempt at a lower protocol version runs over a fresh connection.
pub trait Connector: Send + Sync {
    type Service: CliService;

    fn connect(&self) -> impl Future<Output = Result<Self::Service>> + Send;
}

/// Connects [`Client`]s over TCP.
pub struct TcpConnector {
    host: String,
    port: u16,
}

impl TcpConnector {
    pub fn new(host: &str, port: u16) -> TcpConnector {
        TcpConnector { host: host.to_owned(), port }
    }
}

impl Connector for TcpConnector {
    type Service = Client;

    async fn connect(&self) -> Result<Client> {
        Client::connect(&self.host, self.port).await
    }
}

/// An established HiveServer2 session.
///
/// All operations borrow the session; close it with [`close`][Session::close]
/// when done, the server otherwise keeps its side alive until the session
/// times out.
pub struct Session<C: CliService = Client> {
    client: C,
    handle: SessionHandle,
    protocol: ProtocolVersion,
    config: Config,
    cache: DescriptorCache,
    closed: AtomicBool,
}

impl Session<Client> {
    /// Connect and open a session per `config`, running endpoint discovery
    /// first when the config asks for it.
    pub async fn connect(mut config: Config) -> Result<Session<Client>> {
        if config.discovery.is_some() {
            discovery::resolve(&mut config).await?;
        }
        let connector = TcpConnector::new(&config.host, config.port);
        Session::establish(&connector, config).await
    }
}

impl<C: CliService> Session<C> {
    /// Open a session, negotiating the protocol version down from the
    /// configured one until the server accepts.
    ///
    /// Each rejected offer closes the connection and retries one version
    /// lower over a fresh one; [`ProtocolVersion::V8`] is the floor, below
    /// it the rejection surfaces as the error.
    pub async fn establish<Cn>(connector: &Cn, config: Config) -> Result<Session<C>>
    where
        Cn: Connector<Service = C>,
    {
        let session_config = config.session_config();
        let mut offer = config.protocol;

        loop {
            let client = connector.connect().await?;
            let resp = client
                .open_session(
                    offer,
                    config.username.as_deref(),
                    config.password.as_deref(),
                    &session_config,
                )
                .await;

            let mismatch = match resp {
                Ok(resp) => match resp.status.verify(false) {
                    Ok(()) => {
                        // adopt the version the server actually runs
                        match ProtocolVersion::from_value(resp.server_protocol) {
                            Some(server) if server <= offer => {
                                let handle = resp.session_handle.ok_or_else(|| {
                                    ProtocolError::new("open session reply carries no handle")
                                })?;
                                if server != offer {
                                    log::info!("session opened at downgraded protocol {server}");
                                }
                                return Ok(Session {
                                    client,
                                    handle,
                                    protocol: server,
                                    config,
                                    cache: DescriptorCache::new(),
                                    closed: AtomicBool::new(false),
                                });
                            }
                            // claims a version we never offered
                            _ => Error::from(ProtocolError::new(format!(
                                "server answered with unsupported protocol {}",
                                resp.server_protocol
                            ))),
                        }
                    }
                    Err(server) => Error::from(server),
                },
                Err(err) => err,
            };

            // a failed open leaves the connection in an undefined state
            let _ = client.shutdown().await;

            if !is_version_rejection(&mismatch) {
                return Err(mismatch);
            }
            match offer.step_down() {
                Some(lower) if lower >= ProtocolVersion::V8 => {
                    log::debug!("protocol {offer} rejected, retrying at {lower}");
                    offer = lower;
                }
                _ => {
                    log::debug!("protocol {offer} rejected at the version floor: {mismatch}");
                    return Err(ProtocolError::new("no compatible protocol version").into());
                }
            }
        }
    }

    pub fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn client(&self) -> &C {
        &self.client
    }

    /// Whether the session can still issue calls: [`close`][Session::close]
    /// has not been called and the transport has not failed.
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.client.is_live()
    }

    fn guard(&self) -> Result<()> {
        if self.is_open() { Ok(()) } else { Err(SessionClosed.into()) }
    }

    /// Submit a statement for asynchronous execution.
    ///
    /// Returns as soon as the server hands out an operation handle; await
    /// completion through the returned [`Operation`].
    pub async fn execute(&self, statement: &str) -> Result<Operation<'_, C>> {
        self.guard()?;
        let resp = self
            .client
            .execute_statement(
                &self.handle,
                statement,
                &BTreeMap::new(),
                self.config.query_timeout,
            )
            .await?;
        self.operation(resp)
    }

    /// List catalogs.
    pub async fn catalogs(&self) -> Result<Operation<'_, C>> {
        self.guard()?;
        let resp = self.client.get_catalogs(&self.handle).await?;
        self.operation(resp)
    }

    /// List schemas matching `schema_pattern` (SQL `LIKE` syntax, `None`
    /// matches everything).
    pub async fn schemas(
        &self,
        catalog: Option<&str>,
        schema_pattern: Option<&str>,
    ) -> Result<Operation<'_, C>> {
        self.guard()?;
        let resp = self.client.get_schemas(&self.handle, catalog, schema_pattern).await?;
        self.operation(resp)
    }

    /// List tables matching the patterns, optionally filtered by table type
    /// (`"TABLE"`, `"VIEW"`, ..).
    pub async fn tables(
        &self,
        catalog: Option<&str>,
        schema_pattern: Option<&str>,
        table_pattern: Option<&str>,
        table_types: &[&str],
    ) -> Result<Operation<'_, C>> {
        self.guard()?;
        let resp = self
            .client
            .get_tables(&self.handle, catalog, schema_pattern, table_pattern, table_types)
            .await?;
        self.operation(resp)
    }

    /// List the table types the server knows.
    pub async fn table_types(&self) -> Result<Operation<'_, C>> {
        self.guard()?;
        let resp = self.client.get_table_types(&self.handle).await?;
        self.operation(resp)
    }

    /// Describe the server's type system.
    pub async fn type_info(&self) -> Result<Operation<'_, C>> {
        self.guard()?;
        let resp = self.client.get_type_info(&self.handle).await?;
        self.operation(resp)
    }

    fn operation(&self, resp: HandleResp) -> Result<Operation<'_, C>> {
        resp.status.verify(true)?;
        let handle = resp
            .operation_handle
            .ok_or_else(|| ProtocolError::new("reply carries no operation handle"))?;
        Ok(Operation::new(self, handle))
    }

    pub(crate) async fn decode_schema(&self, wire: TableSchema) -> Result<Schema> {
        let schema = crate::metadata::resolve_schema(wire, |key| async move {
            self.cache
                .get_with(key, |key| async move { TypeDescriptor::from_wire(&key) })
                .await
        })
        .await?;
        Ok(schema)
    }

    /// Close the session.
    ///
    /// Idempotent and best effort: the first call sends the close request,
    /// shuts the connection down and drops the cached descriptors. Failures
    /// are logged rather than surfaced since the server reaps dead sessions
    /// on its own.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        match self.client.close_session(&self.handle).await {
            Ok(resp) => {
                if let Err(err) = resp.status.verify(true) {
                    log::warn!("close session refused: {err}");
                }
            }
            Err(err) => log::warn!("close session failed: {err}"),
        }
        if let Err(err) = self.client.shutdown().await {
            log::debug!("connection shutdown failed: {err}");
        }
        self.cache.clear().await;
    }

    #[cfg(test)]
    pub(crate) fn for_test(client: C, protocol: ProtocolVersion, config: Config) -> Session<C> {
        use bytes::Bytes;
        Session {
            client,
            handle: SessionHandle {
                id: crate::thrift::HandleIdentifier {
                    guid: Bytes::from_static(&[1; 16]),
                    secret: Bytes::from_static(&[2; 16]),
                },
            },
            protocol,
            config,
            cache: DescriptorCache::new(),
            closed: AtomicBool::new(false),
        }
    }
}

/// Whether a failed open means the offered protocol version was refused,
/// as opposed to bad credentials or an unreachable server.
fn is_version_rejection(err: &Error) -> bool {
    match err.as_server_error() {
        Some(server) => server.message.to_ascii_lowercase().contains("protocol version"),
        None => matches!(
            err.kind(),
            crate::error::ErrorKind::Protocol(_)
        ),
    }
}
