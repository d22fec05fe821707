//! `hivero` error types.
use std::{backtrace::Backtrace, fmt, io, str::Utf8Error};

use crate::{
    config::ConfigError,
    metadata::TypeDecodeError,
    operation::{OperationCanceled, OperationClosed, OperationTimeout, UnknownOperationState},
    rows::DecodeError,
    session::SessionClosed,
    thrift::ProtocolError,
};

/// A specialized [`Result`] type for `hivero` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error from `hivero` library.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Returns the server-side error if this error originates from a
    /// [`ServerError`] status or a failed operation.
    pub fn as_server_error(&self) -> Option<&ServerError> {
        match &self.kind {
            ErrorKind::Server(e) => Some(e),
            _ => None,
        }
    }
}

/// All possible error kind from `hivero` library.
pub enum ErrorKind {
    Config(ConfigError),
    Protocol(ProtocolError),
    Io(io::Error),
    Server(ServerError),
    Canceled(OperationCanceled),
    Timeout(OperationTimeout),
    UnknownState(UnknownOperationState),
    Closed(SessionClosed),
    OperationClosed(OperationClosed),
    TypeDecode(TypeDecodeError),
    Decode(DecodeError),
    Utf8(Utf8Error),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ConfigError>e => ErrorKind::Config(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<std::io::Error>e => ErrorKind::Io(e));
from!(<ServerError>e => ErrorKind::Server(e));
from!(<OperationCanceled>e => ErrorKind::Canceled(e));
from!(<OperationTimeout>e => ErrorKind::Timeout(e));
from!(<UnknownOperationState>e => ErrorKind::UnknownState(e));
from!(<SessionClosed>e => ErrorKind::Closed(e));
from!(<OperationClosed>e => ErrorKind::OperationClosed(e));
from!(<TypeDecodeError>e => ErrorKind::TypeDecode(e));
from!(<DecodeError>e => ErrorKind::Decode(e));
from!(<Utf8Error>e => ErrorKind::Utf8(e));

impl std::error::Error for Error { }

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => e.fmt(f),
            Self::Protocol(e) => e.fmt(f),
            Self::Io(e) => e.fmt(f),
            Self::Server(e) => e.fmt(f),
            Self::Canceled(e) => e.fmt(f),
            Self::Timeout(e) => e.fmt(f),
            Self::UnknownState(e) => e.fmt(f),
            Self::Closed(e) => e.fmt(f),
            Self::OperationClosed(e) => e.fmt(f),
            Self::TypeDecode(e) => e.fmt(f),
            Self::Decode(e) => e.fmt(f),
            Self::Utf8(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// A non-success status or failed operation reported by the server.
#[derive(Debug, Clone)]
pub struct ServerError {
    pub message: String,
    /// Five character SQLSTATE, when the server provides one.
    pub sql_state: Option<String>,
    pub code: Option<i32>,
}

impl std::error::Error for ServerError { }

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(state) = &self.sql_state {
            write!(f, " (SQLSTATE {state})")?;
        }
        if let Some(code) = self.code {
            write!(f, " (code {code})")?;
        }
        Ok(())
    }
}
