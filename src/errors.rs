use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::rpc::identifier::Identifier;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// Protocol-level failures of an incoming call.
///
/// Handlers return the recognized kinds directly; anything else they hit is
/// reported as [`RpcError::Internal`], whose detail is logged and never sent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcError {
    #[error("parse error")]
    ParseError,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl RpcError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn code(&self) -> i64 {
        match self {
            Self::ParseError => PARSE_ERROR,
            Self::InvalidRequest(_) => INVALID_REQUEST,
            Self::MethodNotFound(_) => METHOD_NOT_FOUND,
            Self::InvalidParams(_) => INVALID_PARAMS,
            Self::Internal(_) => INTERNAL_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest(_) => "Invalid Request",
            Self::MethodNotFound(_) => "Method not found",
            Self::InvalidParams(_) => "Invalid params",
            Self::Internal(_) => "Internal error",
        }
    }

    /// The `data` member sent on the wire.
    pub fn data(&self) -> Option<&str> {
        match self {
            Self::InvalidRequest(message) | Self::InvalidParams(message) => Some(message),
            Self::ParseError | Self::MethodNotFound(_) | Self::Internal(_) => None,
        }
    }

    pub fn to_error_object(&self) -> Value {
        match self.data() {
            Some(data) => json!({
                "code": self.code(),
                "message": self.message(),
                "data": data,
            }),
            None => json!({
                "code": self.code(),
                "message": self.message(),
            }),
        }
    }
}

/// Failure of a call this side sent to the peer.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("peer replied with error: {0}")]
    Remote(Value),
    #[error("request {method} timed out")]
    Timeout { method: Identifier },
    #[error("connection closed before a reply arrived")]
    ConnectionClosed,
    #[error("outgoing method {0} is not registered")]
    UnknownMethod(Identifier),
    #[error("failed to encode params: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode result: {0}")]
    Decode(#[source] serde_json::Error),
}

impl CallError {
    /// Error code of a remote failure, when the peer sent one.
    pub fn remote_code(&self) -> Option<i64> {
        match self {
            Self::Remote(error) => error.get("code").and_then(Value::as_i64),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("method {0} is already registered")]
    Duplicate(Identifier),
    #[error("method registries are already installed")]
    AlreadyInstalled,
    #[error("method registries have not been installed")]
    NotInstalled,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized: {message}")]
    Unauthorized {
        code: &'static str,
        message: &'static str,
    },
    #[error("internal error")]
    Internal { code: &'static str, message: String },
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: Value,
}

impl AppError {
    pub fn unauthorized(code: &'static str, message: &'static str) -> Self {
        Self::Unauthorized { code, message }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            code: "internal_error",
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::Unauthorized { code, message } => {
                (StatusCode::UNAUTHORIZED, code, message.to_string())
            }
            Self::Internal { code, message } => {
                tracing::error!(error = %message, "request failed with internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    code,
                    "internal server error".to_string(),
                )
            }
        };

        (
            status,
            Json(ErrorResponse {
                code: code.to_string(),
                message,
                details: json!({}),
            }),
        )
            .into_response()
    }
}
