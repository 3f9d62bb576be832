//! Structured protocol error records.
//!
//! Protocol failures are data, not unwinding: handlers accumulate
//! [`ErrorRecord`]s on the session and the router attaches them to the
//! response under the `errors` key.

use std::fmt;

use ciborium::value::Value;

use crate::codec::{CodecError, Payload};

/// The closed set of protocol error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Generic unrecoverable error: oversize body, missing form field,
    /// unexpected exception.
    Failure,
    /// The client public key could not be parsed.
    BadClientKey,
    /// Cryptographic or parameter mismatch: signature or nonce check failed.
    BadValue,
    /// Unknown URI or unknown inner command.
    UnknownCommand,
    /// Backend error during an authenticated command.
    CommandFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Failure => "FAILURE",
            ErrorCode::BadClientKey => "BAD_CLIENT_KEY",
            ErrorCode::BadValue => "BAD_VALUE",
            ErrorCode::UnknownCommand => "UNKNOWN_COMMAND",
            ErrorCode::CommandFailed => "COMMAND_FAILED",
        }
    }

    pub fn from_name(name: &str) -> Option<ErrorCode> {
        match name {
            "FAILURE" => Some(ErrorCode::Failure),
            "BAD_CLIENT_KEY" => Some(ErrorCode::BadClientKey),
            "BAD_VALUE" => Some(ErrorCode::BadValue),
            "UNKNOWN_COMMAND" => Some(ErrorCode::UnknownCommand),
            "COMMAND_FAILED" => Some(ErrorCode::CommandFailed),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured error: the code, the object it refers to (a field or URI),
/// and a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub code: ErrorCode,
    pub object: String,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(code: ErrorCode, object: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            object: object.into(),
            message: message.into(),
        }
    }

    pub fn to_payload(&self) -> Payload {
        let mut p = Payload::new();
        p.set_str("code", self.code.as_str());
        p.set_str("object", &self.object);
        p.set_str("message", &self.message);
        p
    }

    pub fn from_payload(p: &Payload) -> Result<Self, CodecError> {
        let code_name = p.get_str("code")?;
        let code = ErrorCode::from_name(code_name).ok_or(CodecError::MissingOrWrongType {
            key: "code".into(),
            expected: "error code name",
        })?;
        Ok(Self {
            code,
            object: p.get_str("object")?.to_string(),
            message: p.get_str("message")?.to_string(),
        })
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: {}", self.code, self.object, self.message)
    }
}

/// Render a list of records as the wire value stored under `errors`.
pub fn error_list_value(errors: &[ErrorRecord]) -> Value {
    Value::Array(errors.iter().map(|e| e.to_payload().into_value()).collect())
}

/// Decode an `errors` array out of a response payload. Empty when absent.
pub fn errors_in(payload: &Payload) -> Vec<ErrorRecord> {
    let Some(Value::Array(items)) = payload.get_value("errors") else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|v| Payload::from_value(v.clone()).ok())
        .filter_map(|p| ErrorRecord::from_payload(&p).ok())
        .collect()
}
