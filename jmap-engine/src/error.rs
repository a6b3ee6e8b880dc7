// jmap-engine/src/error.rs
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::{HttpError, HttpErrorKind};

/// Server-side `type` values carried by the `error` pseudo-method
pub mod error_types {
    pub const SERVER_UNAVAILABLE: &str = "serverUnavailable";
    pub const SERVER_FAIL: &str = "serverFail";
    pub const SERVER_PARTIAL_FAIL: &str = "serverPartialFail";
    pub const UNKNOWN_METHOD: &str = "unknownMethod";
    pub const INVALID_ARGUMENTS: &str = "invalidArguments";
    pub const INVALID_RESULT_REFERENCE: &str = "invalidResultReference";
    pub const FORBIDDEN: &str = "forbidden";
    pub const ACCOUNT_NOT_FOUND: &str = "accountNotFound";
    pub const ACCOUNT_NOT_SUPPORTED_BY_METHOD: &str = "accountNotSupportedByMethod";
    pub const ACCOUNT_READ_ONLY: &str = "accountReadOnly";
}

// Some servers answer `forbidden` for accounts that exist but belong to
// somebody else. Reported as accountNotFound so the account stays hidden.
const FOREIGN_ACCOUNT_PREFIX: &str = "You do not have access to account";

/// Stable numeric-free identifier for every failure the engine reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    AuthenticationFailed,
    InvalidHttpRequest,
    ServerResponse,
    ReadingResponseBody,
    SendingRequest,
    Cancelled,
    Timeout,
    EncodingRequestBody,
    InvalidRequestPayload,
    TooManyMethodCalls,
    DecodingResponseBody,
    InvalidResponsePayload,
    InvalidSessionResponse,
    ServerUnavailable,
    ServerFail,
    UnknownMethod,
    InvalidArguments,
    InvalidResultReference,
    Forbidden,
    AccountNotFound,
    AccountNotSupportedByMethod,
    AccountReadOnly,
    UnspecifiedType,
    SetRejected,
}

/// Coarse grouping of [`ErrorCode`]s by where the failure originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Transport,
    Payload,
    Session,
    Method,
    Set,
}

impl ErrorCode {
    pub fn class(self) -> ErrorClass {
        use ErrorCode::*;
        match self {
            AuthenticationFailed | InvalidHttpRequest | ServerResponse | ReadingResponseBody
            | SendingRequest | Cancelled | Timeout => ErrorClass::Transport,
            EncodingRequestBody
            | InvalidRequestPayload
            | TooManyMethodCalls
            | DecodingResponseBody
            | InvalidResponsePayload => ErrorClass::Payload,
            InvalidSessionResponse => ErrorClass::Session,
            ServerUnavailable
            | ServerFail
            | UnknownMethod
            | InvalidArguments
            | InvalidResultReference
            | Forbidden
            | AccountNotFound
            | AccountNotSupportedByMethod
            | AccountReadOnly
            | UnspecifiedType => ErrorClass::Method,
            SetRejected => ErrorClass::Set,
        }
    }
}

/// Method-level failure, decoded from an `["error", {...}, tag]` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodError {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<String>>,
}

impl MethodError {
    pub fn new(type_: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            description: None,
            properties: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn code(&self) -> ErrorCode {
        match self.type_.as_str() {
            error_types::SERVER_UNAVAILABLE => ErrorCode::ServerUnavailable,
            error_types::SERVER_FAIL | error_types::SERVER_PARTIAL_FAIL => ErrorCode::ServerFail,
            error_types::UNKNOWN_METHOD => ErrorCode::UnknownMethod,
            error_types::INVALID_ARGUMENTS => ErrorCode::InvalidArguments,
            error_types::INVALID_RESULT_REFERENCE => ErrorCode::InvalidResultReference,
            error_types::FORBIDDEN => {
                let foreign = self
                    .description
                    .as_deref()
                    .is_some_and(|d| d.starts_with(FOREIGN_ACCOUNT_PREFIX));
                if foreign {
                    ErrorCode::AccountNotFound
                } else {
                    ErrorCode::Forbidden
                }
            }
            error_types::ACCOUNT_NOT_FOUND => ErrorCode::AccountNotFound,
            error_types::ACCOUNT_NOT_SUPPORTED_BY_METHOD => ErrorCode::AccountNotSupportedByMethod,
            error_types::ACCOUNT_READ_ONLY => ErrorCode::AccountReadOnly,
            _ => ErrorCode::UnspecifiedType,
        }
    }
}

impl fmt::Display for MethodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{}: {}", self.type_, description),
            None => write!(f, "{}", self.type_),
        }
    }
}

/// Rejection of a single object inside a create/update/destroy batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetError {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<String>>,
}

impl fmt::Display for SetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_)?;
        if let Some(description) = &self.description {
            write!(f, ": {}", description)?;
        }
        if let Some(properties) = &self.properties {
            write!(f, " [{}]", properties.join(", "))?;
        }
        Ok(())
    }
}

/// Reasons a well-known session document is unusable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionProblem {
    #[error("session response does not provide a username")]
    MissingUsername,
    #[error("session response does not provide an API URL")]
    MissingApiUrl,
    #[error("session response provides an invalid API URL")]
    InvalidApiUrl,
    #[error("session response does not provide an upload URL")]
    MissingUploadUrl,
    #[error("session response does not provide a download URL")]
    MissingDownloadUrl,
    #[error("session response does not provide a primary mail account")]
    MissingMailAccount,
    #[error("session response carries a malformed core capability")]
    MalformedCoreCapability,
}

/// The one error type returned by every public operation of the engine.
///
/// Cloneable so a single failed session load can be handed to every caller
/// that was waiting on it.
#[derive(Debug, Clone, Error)]
pub enum JmapError {
    #[error(transparent)]
    Transport(#[from] HttpError),

    #[error("failed to encode request body: {source}")]
    EncodingRequest {
        #[source]
        source: Arc<serde_json::Error>,
    },

    #[error("invalid request payload: {reason}")]
    InvalidRequestPayload { reason: String },

    #[error("request has {calls} method calls, the server allows at most {max}")]
    TooManyMethodCalls { calls: usize, max: u64 },

    #[error("failed to decode response body: {source}")]
    DecodingResponse {
        #[source]
        source: Arc<serde_json::Error>,
    },

    #[error("invalid response payload: {reason}")]
    InvalidResponsePayload {
        reason: String,
        #[source]
        source: Option<Arc<serde_json::Error>>,
    },

    #[error("invalid session response: {0}")]
    InvalidSessionResponse(SessionProblem),

    #[error("method-level error: {0}")]
    Method(MethodError),

    #[error("{object_type} {id} was rejected: {error}")]
    Set {
        object_type: &'static str,
        id: String,
        error: SetError,
    },
}

impl JmapError {
    pub(crate) fn encoding(source: serde_json::Error) -> Self {
        JmapError::EncodingRequest {
            source: Arc::new(source),
        }
    }

    pub(crate) fn decoding(source: serde_json::Error) -> Self {
        JmapError::DecodingResponse {
            source: Arc::new(source),
        }
    }

    pub(crate) fn request(reason: impl Into<String>) -> Self {
        JmapError::InvalidRequestPayload {
            reason: reason.into(),
        }
    }

    pub(crate) fn response(reason: impl Into<String>) -> Self {
        JmapError::InvalidResponsePayload {
            reason: reason.into(),
            source: None,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            JmapError::Transport(e) => match e.kind {
                HttpErrorKind::AuthenticationFailed => ErrorCode::AuthenticationFailed,
                HttpErrorKind::InvalidRequest => ErrorCode::InvalidHttpRequest,
                HttpErrorKind::ServerResponse => ErrorCode::ServerResponse,
                HttpErrorKind::ReadingBody => ErrorCode::ReadingResponseBody,
                HttpErrorKind::Sending => ErrorCode::SendingRequest,
                HttpErrorKind::Cancelled => ErrorCode::Cancelled,
                HttpErrorKind::Timeout => ErrorCode::Timeout,
            },
            JmapError::EncodingRequest { .. } => ErrorCode::EncodingRequestBody,
            JmapError::InvalidRequestPayload { .. } => ErrorCode::InvalidRequestPayload,
            JmapError::TooManyMethodCalls { .. } => ErrorCode::TooManyMethodCalls,
            JmapError::DecodingResponse { .. } => ErrorCode::DecodingResponseBody,
            JmapError::InvalidResponsePayload { .. } => ErrorCode::InvalidResponsePayload,
            JmapError::InvalidSessionResponse(_) => ErrorCode::InvalidSessionResponse,
            JmapError::Method(e) => e.code(),
            JmapError::Set { .. } => ErrorCode::SetRejected,
        }
    }

    pub fn class(&self) -> ErrorClass {
        self.code().class()
    }
}

impl From<MethodError> for JmapError {
    fn from(e: MethodError) -> Self {
        JmapError::Method(e)
    }
}

impl From<SessionProblem> for JmapError {
    fn from(p: SessionProblem) -> Self {
        JmapError::InvalidSessionResponse(p)
    }
}
