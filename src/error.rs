use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Main error type for the rendezvous automaton
///
/// None of these are fatal to the managed interface: callers log them and
/// carry on with the next cycle, except `SocketFault`, which makes the
/// supervisor rebuild the socket.
#[derive(Debug)]
pub enum RoamError {
    /// Configuration or CLI argument errors
    Config(String),

    /// The tunnel device could not be dumped
    DeviceQueryFailed(String),

    /// One line of the device dump could not be parsed
    MalformedRecord(String),

    /// An inbound datagram was not a gossip message
    MalformedGossipPayload(String),

    /// The tunnel device rejected a command (e.g. set endpoint)
    DeviceCommandFailed(String),

    /// The rendezvous socket itself failed
    SocketFault(String),

    /// System I/O errors
    Io(std::io::Error),

    /// Serialization/deserialization errors
    Serialization(serde_json::Error),

    /// Internal lock poisoning or concurrency errors
    Concurrency(String),
}

impl fmt::Display for RoamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoamError::Config(msg) => write!(f, "Configuration error: {}", msg),
            RoamError::DeviceQueryFailed(msg) => write!(f, "Device query failed: {}", msg),
            RoamError::MalformedRecord(msg) => write!(f, "Malformed device record: {}", msg),
            RoamError::MalformedGossipPayload(msg) => {
                write!(f, "Malformed gossip payload: {}", msg)
            }
            RoamError::DeviceCommandFailed(msg) => write!(f, "Device command failed: {}", msg),
            RoamError::SocketFault(msg) => write!(f, "Socket fault: {}", msg),
            RoamError::Io(err) => write!(f, "I/O error: {}", err),
            RoamError::Serialization(err) => write!(f, "Serialization error: {}", err),
            RoamError::Concurrency(msg) => write!(f, "Concurrency error: {}", msg),
        }
    }
}

impl std::error::Error for RoamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RoamError::Io(err) => Some(err),
            RoamError::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, RoamError>;

impl RoamError {
    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RoamError::Config(_) => StatusCode::BAD_REQUEST,
            RoamError::DeviceQueryFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            RoamError::DeviceCommandFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            RoamError::SocketFault(_) => StatusCode::SERVICE_UNAVAILABLE,
            RoamError::MalformedRecord(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RoamError::MalformedGossipPayload(_) => StatusCode::BAD_REQUEST,
            RoamError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RoamError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RoamError::Concurrency(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            RoamError::Config(_) => "configuration_error",
            RoamError::DeviceQueryFailed(_) => "device_query_failed",
            RoamError::MalformedRecord(_) => "malformed_record",
            RoamError::MalformedGossipPayload(_) => "malformed_gossip_payload",
            RoamError::DeviceCommandFailed(_) => "device_command_failed",
            RoamError::SocketFault(_) => "socket_fault",
            RoamError::Io(_) => "io_error",
            RoamError::Serialization(_) => "serialization_error",
            RoamError::Concurrency(_) => "concurrency_error",
        }
    }
}

// Axum IntoResponse implementation for HTTP error responses
impl IntoResponse for RoamError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let error_response = json!({
            "error": {
                "code": status_code.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });

        (status_code, Json(error_response)).into_response()
    }
}

// Conversions from common error types
impl From<std::io::Error> for RoamError {
    fn from(err: std::io::Error) -> Self {
        RoamError::Io(err)
    }
}

impl From<serde_json::Error> for RoamError {
    fn from(err: serde_json::Error) -> Self {
        RoamError::Serialization(err)
    }
}

// Helper macros for common error construction patterns
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::RoamError::Config($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::RoamError::Config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! malformed_record {
    ($msg:expr) => {
        $crate::error::RoamError::MalformedRecord($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::RoamError::MalformedRecord(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! concurrency_error {
    ($msg:expr) => {
        $crate::error::RoamError::Concurrency($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::RoamError::Concurrency(format!($fmt, $($arg)*))
    };
}
