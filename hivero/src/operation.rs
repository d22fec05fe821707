//! One submitted statement and its server side lifecycle.
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::OnceCell;

use crate::{
    client::CliService,
    error::{Result, ServerError},
    metadata::Schema,
    rows::Rows,
    session::Session,
    thrift::{
        FetchOrientation, OperationHandle, OperationState, ProtocolError,
        backend::{RowValues, WireColumn, WireValue},
    },
};

crate::common::unit_error! {
    /// The statement was cancelled before it finished.
    pub struct OperationCanceled("query was cancelled");
}

crate::common::unit_error! {
    /// The statement hit its server side timeout.
    pub struct OperationTimeout("query timed out");
}

crate::common::unit_error! {
    /// The server reported a state this driver cannot act on.
    pub struct UnknownOperationState("query is in an unknown state");
}

crate::common::unit_error! {
    /// The operation was closed and cannot issue further calls.
    pub struct OperationClosed("operation is closed");
}

/// A statement the server accepted for asynchronous execution.
///
/// Dropping the handle leaves the server side operation running; call
/// [`close`][Operation::close] (or [`cancel`][Operation::cancel]) when the
/// result is no longer wanted.
pub struct Operation<'s, C: CliService> {
    session: &'s Session<C>,
    handle: OperationHandle,
    schema: OnceCell<Schema>,
    closed: AtomicBool,
}

impl<'s, C: CliService> Operation<'s, C> {
    pub(crate) fn new(session: &'s Session<C>, handle: OperationHandle) -> Operation<'s, C> {
        Operation { session, handle, schema: OnceCell::new(), closed: AtomicBool::new(false) }
    }

    pub fn handle(&self) -> &OperationHandle {
        &self.handle
    }

    /// Whether the statement produces a result set.
    pub fn has_result_set(&self) -> bool {
        self.handle.has_result_set
    }

    /// Rows changed by a DML statement, when the server reports it.
    pub fn affected_rows(&self) -> Option<f64> {
        self.handle.modified_row_count
    }

    fn guard(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(OperationClosed.into())
        } else {
            Ok(())
        }
    }

    /// Poll until the operation leaves its running states.
    ///
    /// Terminal states map onto errors by kind: cancellation, timeout and
    /// execution failure each surface as their own error, the latter with
    /// the server's message, SQLSTATE and error code attached.
    pub async fn wait(&self) -> Result<()> {
        self.guard()?;
        loop {
            let resp = self.session.client().get_operation_status(&self.handle).await?;
            resp.status.verify(true)?;

            let state = OperationState::from_value(resp.operation_state.unwrap_or(-1));
            match state {
                OperationState::Finished | OperationState::Closed => return Ok(()),
                OperationState::Canceled => return Err(OperationCanceled.into()),
                OperationState::TimedOut => return Err(OperationTimeout.into()),
                OperationState::Error => {
                    return Err(ServerError {
                        message: resp
                            .error_message
                            .as_deref()
                            .unwrap_or("query failed")
                            .to_owned(),
                        sql_state: resp.sql_state.as_deref().map(str::to_owned),
                        code: resp.error_code,
                    }
                    .into());
                }
                OperationState::Unknown => return Err(UnknownOperationState.into()),
                OperationState::Initialized
                | OperationState::Pending
                | OperationState::Running => {
                    tokio::time::sleep(self.session.config().poll_interval).await;
                }
            }
        }
    }

    /// The result set schema, fetched once and memoized.
    pub async fn schema(&self) -> Result<&Schema> {
        self.guard()?;
        self.schema
            .get_or_try_init(|| async {
                let resp = self
                    .session
                    .client()
                    .get_result_set_metadata(&self.handle)
                    .await?;
                resp.status.verify(true)?;
                let wire = resp
                    .schema
                    .ok_or_else(|| ProtocolError::new("metadata reply carries no schema"))?;
                self.session.decode_schema(wire).await
            })
            .await
    }

    /// Wait for completion and open a cursor over the result set.
    pub async fn rows(&self) -> Result<Rows<'s, C>> {
        self.wait().await?;
        let schema = self.schema().await?.clone();
        Ok(Rows::new(
            self.session.client(),
            self.handle.clone(),
            schema,
            self.session.protocol(),
            self.session.config().fetch_size,
        ))
    }

    /// Pull the execution log lines collected so far.
    ///
    /// Best effort: servers without log support answer with an error, which
    /// comes back as an empty list.
    pub async fn fetch_logs(&self) -> Vec<String> {
        if self.closed.load(Ordering::Acquire) {
            return Vec::new();
        }
        // logs are read in one go from the start, not paged by fetch_size
        let fetched = self
            .session
            .client()
            .fetch_results(&self.handle, FetchOrientation::First, i64::from(i32::MAX), 1)
            .await;

        let resp = match fetched {
            Ok(resp) => resp,
            Err(err) => {
                log::debug!("log fetch failed: {err}");
                return Vec::new();
            }
        };
        if let Err(err) = resp.status.verify(true) {
            log::debug!("log fetch refused: {err}");
            return Vec::new();
        }

        let Some(rowset) = resp.results else { return Vec::new() };
        if !rowset.columns.is_empty() {
            rowset
                .columns
                .into_iter()
                .flat_map(|col| match col {
                    WireColumn::String { values, .. } => values,
                    _ => Vec::new(),
                })
                .map(|line| line.as_str().to_owned())
                .collect()
        } else {
            rowset
                .rows
                .into_iter()
                .flat_map(|RowValues { values }| values)
                .filter_map(|value| match value {
                    WireValue::String(line) => Some(line.as_str().to_owned()),
                    _ => None,
                })
                .collect()
        }
    }

    /// Ask the server to cancel the operation.
    ///
    /// Best effort: a refusal is logged, the caller observes the outcome
    /// through [`wait`][Operation::wait].
    pub async fn cancel(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        match self.session.client().cancel_operation(&self.handle).await {
            Ok(resp) => {
                if let Err(err) = resp.status.verify(true) {
                    log::warn!("cancel refused: {err}");
                }
            }
            Err(err) => log::warn!("cancel failed: {err}"),
        }
    }

    /// Release the server side operation. Idempotent and best effort.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        match self.session.client().close_operation(&self.handle).await {
            Ok(resp) => {
                if let Err(err) = resp.status.verify(true) {
                    log::warn!("close operation refused: {err}");
                }
            }
            Err(err) => log::warn!("close operation failed: {err}"),
        }
    }
}
