//! Error types for the MycoKV client
//!
//! Client-side failures (bad keys, unencodable values, overlapping
//! commands) are raised before anything is written to the stream. Server
//! failures arrive as response lines prefixed with one of fifteen codes.

use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for MycoKV operations
pub type Result<T> = std::result::Result<T, MycoKvError>;

/// Custom error types for the MycoKV client
#[derive(Error, Debug)]
pub enum MycoKvError {
    #[error("Connection to MycoKV at {addr} failed, verify that MycoKV is running and that the host and port are correct: {source}")]
    Connection {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    KeyFormat(#[from] KeyFormatError),

    #[error(transparent)]
    ValueType(#[from] ValueTypeError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("Already awaiting response")]
    AlreadyAwaiting,

    #[error("Not connected to MycoKV")]
    NotConnected,

    #[error("Connection closed by server")]
    ConnectionClosed,

    #[error("No response from MycoKV within {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol parse error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MycoKvError {
    /// The server error code, if this error came back from the server
    pub fn server_code(&self) -> Option<ErrorCode> {
        match self {
            MycoKvError::Server(err) => Some(err.code),
            _ => None,
        }
    }
}

impl From<nom::Err<nom::error::Error<&str>>> for MycoKvError {
    fn from(err: nom::Err<nom::error::Error<&str>>) -> Self {
        MycoKvError::Protocol(format!("Parse error: {:?}", err))
    }
}

/// Which lexical rule a key broke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRule {
    Empty,
    Whitespace,
    Wildcard,
    WildcardInWrite,
    Nesting,
}

impl fmt::Display for KeyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            KeyRule::Empty => "keys may not be empty",
            KeyRule::Whitespace => "keys may not contain whitespace",
            KeyRule::Wildcard => {
                "a wildcard may only appear as the final segment, as '.*' with an optional depth"
            }
            KeyRule::WildcardInWrite => "wildcards are only allowed when reading",
            KeyRule::Nesting => {
                "keys may not start or end with '.' or contain consecutive '.' characters"
            }
        };
        f.write_str(text)
    }
}

/// A key was rejected before being sent
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid MycoKV key {key:?}: {rule}")]
pub struct KeyFormatError {
    pub key: String,
    pub rule: KeyRule,
}

impl KeyFormatError {
    pub fn new(key: &str, rule: KeyRule) -> Self {
        Self {
            key: key.to_string(),
            rule,
        }
    }
}

/// A value has no representation on the wire
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid MycoKV value: {value}\n{reason}")]
pub struct ValueTypeError {
    pub value: String,
    pub reason: String,
}

impl ValueTypeError {
    pub fn new(value: impl fmt::Debug, reason: impl Into<String>) -> Self {
        Self {
            value: format!("{:?}", value),
            reason: reason.into(),
        }
    }

    pub fn unsupported(value: impl fmt::Debug) -> Self {
        Self::new(
            value,
            "MycoKV can only store strings, numbers, booleans, and null.",
        )
    }
}

/// Error codes the server prefixes onto failed responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    UnknownCommand,
    MissingKey,
    InvalidKey,
    MissingValue,
    InvalidValue,
    LogWrite,
    LogRead,
    LogLoad,
    KeyNotFound,
    Restore,
    OperationFailure,
    Internal,
    Serialization,
    MissingCommand,
    InvalidExpiration,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 15] = [
        ErrorCode::UnknownCommand,
        ErrorCode::MissingKey,
        ErrorCode::InvalidKey,
        ErrorCode::MissingValue,
        ErrorCode::InvalidValue,
        ErrorCode::LogWrite,
        ErrorCode::LogRead,
        ErrorCode::LogLoad,
        ErrorCode::KeyNotFound,
        ErrorCode::Restore,
        ErrorCode::OperationFailure,
        ErrorCode::Internal,
        ErrorCode::Serialization,
        ErrorCode::MissingCommand,
        ErrorCode::InvalidExpiration,
    ];

    /// The three character code as it appears on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UnknownCommand => "E01",
            ErrorCode::MissingKey => "E02",
            ErrorCode::InvalidKey => "E03",
            ErrorCode::MissingValue => "E04",
            ErrorCode::InvalidValue => "E05",
            ErrorCode::LogWrite => "E06",
            ErrorCode::LogRead => "E07",
            ErrorCode::LogLoad => "E08",
            ErrorCode::KeyNotFound => "E09",
            ErrorCode::Restore => "E10",
            ErrorCode::OperationFailure => "E11",
            ErrorCode::Internal => "E12",
            ErrorCode::Serialization => "E13",
            ErrorCode::MissingCommand => "E14",
            ErrorCode::InvalidExpiration => "E15",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::UnknownCommand => "Unknown command",
            ErrorCode::MissingKey => "Missing key",
            ErrorCode::InvalidKey => "Invalid key",
            ErrorCode::MissingValue => "Missing value",
            ErrorCode::InvalidValue => "Invalid value",
            ErrorCode::LogWrite => "Log write failure",
            ErrorCode::LogRead => "Log read failure",
            ErrorCode::LogLoad => "Log load failure",
            ErrorCode::KeyNotFound => "Key not found",
            ErrorCode::Restore => "Restore error",
            ErrorCode::OperationFailure => "Operation failure",
            ErrorCode::Internal => "Internal error",
            ErrorCode::Serialization => "Serialization failure",
            ErrorCode::MissingCommand => "Missing command",
            ErrorCode::InvalidExpiration => "Invalid expiration",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error line returned by the server
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("MycoKV returned error code {code}: {description}. {message}", description = .code.description())]
pub struct ServerError {
    pub code: ErrorCode,
    /// The raw response line, code included
    pub message: String,
}

impl ServerError {
    /// Whether a response line starts with a known error code
    pub fn has_error(raw: &str) -> bool {
        Self::code_of(raw).is_some()
    }

    /// Build the typed error for a response line, if it is an error line
    pub fn classify(raw: &str) -> Option<Self> {
        Self::code_of(raw).map(|code| Self {
            code,
            message: raw.to_string(),
        })
    }

    pub fn is_key_not_found(&self) -> bool {
        self.code == ErrorCode::KeyNotFound
    }

    fn code_of(raw: &str) -> Option<ErrorCode> {
        raw.get(..3).and_then(ErrorCode::from_code)
    }
}
