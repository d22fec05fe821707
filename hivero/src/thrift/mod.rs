//! HiveServer2 `TCLIService` wire protocol.
//!
//! The service is spoken in the Thrift binary (strict) protocol over a
//! length-framed stream. Messages are hand encoded/decoded on [`bytes`]
//! buffers:
//!
//! - [`wire`]: binary protocol primitives
//! - [`frontend`]: requests sent to the server
//! - [`backend`]: responses received from the server
use bytes::Bytes;
use std::{borrow::Cow, fmt};

pub mod wire;
pub mod frontend;
pub mod backend;

/// `TProtocolVersion`, the negotiable version of the `TCLIService` surface.
///
/// Negotiation walks the value down one step at a time, so this is kept as a
/// thin wrapper over the wire integer rather than an enum.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtocolVersion(i32);

impl ProtocolVersion {
    pub const V1: ProtocolVersion = ProtocolVersion(0);
    pub const V6: ProtocolVersion = ProtocolVersion(5);
    pub const V7: ProtocolVersion = ProtocolVersion(6);
    /// The oldest version this driver will negotiate down to.
    pub const V8: ProtocolVersion = ProtocolVersion(7);
    pub const V9: ProtocolVersion = ProtocolVersion(8);
    /// The newest version this driver speaks.
    pub const V10: ProtocolVersion = ProtocolVersion(9);

    /// Returns the wire value.
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Returns the version for a wire value, if this driver knows it.
    pub const fn from_value(value: i32) -> Option<ProtocolVersion> {
        if value >= Self::V1.0 && value <= Self::V10.0 {
            Some(ProtocolVersion(value))
        } else {
            None
        }
    }

    /// Returns the next older version, if any.
    pub const fn step_down(self) -> Option<ProtocolVersion> {
        if self.0 > Self::V1.0 {
            Some(ProtocolVersion(self.0 - 1))
        } else {
            None
        }
    }

    /// Result sets are encoded column-wise starting with V6; older servers
    /// send row-wise values with per-value null markers.
    pub const fn columnar_results(self) -> bool {
        self.0 >= Self::V6.0
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}", self.0 + 1)
    }
}

impl fmt::Debug for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProtocolVersion({self})")
    }
}

/// `TStatusCode`, carried by every response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusCode {
    Success,
    SuccessWithInfo,
    StillExecuting,
    Error,
    InvalidHandle,
}

impl StatusCode {
    pub const fn from_value(value: i32) -> Option<StatusCode> {
        Some(match value {
            0 => Self::Success,
            1 => Self::SuccessWithInfo,
            2 => Self::StillExecuting,
            3 => Self::Error,
            4 => Self::InvalidHandle,
            _ => return None,
        })
    }
}

/// `TOperationState`, the server-side lifecycle of one statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationState {
    Initialized,
    Running,
    Finished,
    Canceled,
    Closed,
    Error,
    Unknown,
    Pending,
    TimedOut,
}

impl OperationState {
    /// Unrecognized wire values map to [`Unknown`][Self::Unknown], which the
    /// operation driver treats as a server error.
    pub const fn from_value(value: i32) -> OperationState {
        match value {
            0 => Self::Initialized,
            1 => Self::Running,
            2 => Self::Finished,
            3 => Self::Canceled,
            4 => Self::Closed,
            5 => Self::Error,
            7 => Self::Pending,
            8 => Self::TimedOut,
            _ => Self::Unknown,
        }
    }
}

/// `TFetchOrientation`. Result fetching always uses [`Next`][Self::Next],
/// log fetching uses [`First`][Self::First].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOrientation {
    Next,
    Prior,
    Relative,
    Absolute,
    First,
    Last,
}

impl FetchOrientation {
    pub const fn value(self) -> i32 {
        match self {
            Self::Next => 0,
            Self::Prior => 1,
            Self::Relative => 2,
            Self::Absolute => 3,
            Self::First => 4,
            Self::Last => 5,
        }
    }
}

/// `THandleIdentifier`, a guid/secret pair minted by the server.
#[derive(Clone, PartialEq, Eq)]
pub struct HandleIdentifier {
    pub guid: Bytes,
    pub secret: Bytes,
}

impl fmt::Debug for HandleIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.guid {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// `TSessionHandle`, the opaque reference to an open session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: HandleIdentifier,
}

/// `TOperationHandle`, the opaque reference to one submitted statement.
///
/// All fields are echoed back verbatim in follow-up calls.
#[derive(Clone, Debug)]
pub struct OperationHandle {
    pub id: HandleIdentifier,
    pub operation_type: i32,
    pub has_result_set: bool,
    pub modified_row_count: Option<f64>,
}

impl PartialEq for OperationHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// An error when translating wire buffers, or a malformed server reply.
pub struct ProtocolError {
    message: Cow<'static, str>,
}

impl ProtocolError {
    pub(crate) fn new(message: impl Into<Cow<'static, str>>) -> ProtocolError {
        ProtocolError { message: message.into() }
    }
}

impl std::error::Error for ProtocolError { }

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "protocol error: {}", self.message)
    }
}

impl fmt::Debug for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
