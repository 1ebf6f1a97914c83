//! The coordinator's error taxonomy and its mapping onto JSON-RPC error codes.
//!
//! Wire and protocol errors turn into JSON-RPC error *responses*; prover
//! failures never do (they become diagnostics, see `document::protect`).

use std::fmt;

use jsonrpc_core::types::ErrorCode;

/// The kinds of failure the coordinator can report to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed LSP framing or JSON-RPC envelope.
    Protocol,
    /// A request arrived before `initialize` succeeded.
    NotInitialized,
    /// The method name isn't one the server handles.
    MethodNotFound,
    /// A `DocumentRequest` targeted a document that isn't `Done`, or doesn't exist.
    DocumentNotReady,
    /// A postponed `PositionRequest` named a version that is no longer current.
    RequestStale,
    /// `$/cancelRequest` removed this id before it was served.
    CancelledByClient,
    /// `shutdown` was received; further requests are refused.
    ServerShuttingDown,
    /// A handler raised or panicked; logged and answered generically.
    Internal,
}

impl ErrorKind {
    /// The JSON-RPC error code used on the wire for this kind.
    pub fn code(&self) -> ErrorCode {
        match self {
            ErrorKind::Protocol => ErrorCode::ParseError,
            ErrorKind::NotInitialized => ErrorCode::ServerError(-32002),
            ErrorKind::MethodNotFound => ErrorCode::MethodNotFound,
            ErrorKind::DocumentNotReady => ErrorCode::ServerError(-32802),
            ErrorKind::RequestStale => ErrorCode::ServerError(-32802),
            ErrorKind::CancelledByClient => ErrorCode::ServerError(-32800),
            ErrorKind::ServerShuttingDown => ErrorCode::ServerError(-32097),
            ErrorKind::Internal => ErrorCode::InternalError,
        }
    }
}

/// An error with a kind and a human-readable message, ready to become a
/// JSON-RPC error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CoordinatorError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        CoordinatorError { kind, message: message.into() }
    }

    pub fn document_not_ready() -> Self {
        Self::new(ErrorKind::DocumentNotReady, "Document is not ready")
    }

    pub fn request_stale() -> Self {
        Self::new(ErrorKind::RequestStale, "Request got old in server")
    }

    pub fn cancelled_by_client() -> Self {
        Self::new(ErrorKind::CancelledByClient, "Cancelled by client")
    }

    pub fn server_shutting_down() -> Self {
        Self::new(ErrorKind::ServerShuttingDown, "Server shutting down")
    }

    pub fn not_initialized() -> Self {
        Self::new(ErrorKind::NotInitialized, "not yet received `initialize` request")
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorKind::MethodNotFound, format!("Method not found: {}", method))
    }

    /// Wraps an arbitrary internal failure (e.g. a handler's `anyhow::Error`)
    /// as an `Internal` error, without exposing its details to the client.
    pub fn internal(err: impl fmt::Display) -> Self {
        log::error!("internal error: {}", err);
        Self::new(ErrorKind::Internal, "An unknown error occurred")
    }

    pub fn code(&self) -> ErrorCode {
        self.kind.code()
    }
}

impl fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CoordinatorError {}
