//! Control responses and their token encoding.

use thiserror::Error;

use super::tokens::{CodecError, TokenLine};

/// Status code of a successful request.
pub const STATUS_SUCCESS: i64 = 0;
/// Status code of a failed request.
pub const STATUS_FAILURE: i64 = 1;

/// Raw response line: numeric status plus a free-form detail phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub status: i64,
    pub detail: String,
}

impl ResponseFrame {
    pub fn encode(&self) -> String {
        if self.detail.is_empty() {
            self.status.to_string()
        } else {
            format!("{} {}", self.status, self.detail)
        }
    }

    /// The detail is rebuilt from the remaining tokens joined by single spaces.
    pub fn decode(line: &str) -> Result<Self, CodecError> {
        let tokens = TokenLine::parse(line);
        let status = tokens.get_int(0)?;
        let detail = tokens.join_from(1)?;
        Ok(Self { status, detail })
    }
}

/// Errors raised while interpreting a response line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    #[error("malformed response: {0}")]
    Codec(#[from] CodecError),
    #[error("unknown response status {0}")]
    UnknownStatus(i64),
}

/// Outcome of a control request as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Success,
    /// Request was rejected, with a human-readable reason
    Failure(String),
}

impl Response {
    /// Create a failure response.
    pub fn error(message: impl Into<String>) -> Self {
        Response::Failure(message.into())
    }

    /// Create a success response.
    pub fn ok() -> Self {
        Response::Success
    }

    /// Check if this response indicates a failure.
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Failure(_))
    }

    pub fn to_frame(&self) -> ResponseFrame {
        match self {
            Response::Success => ResponseFrame {
                status: STATUS_SUCCESS,
                detail: String::new(),
            },
            Response::Failure(detail) => ResponseFrame {
                status: STATUS_FAILURE,
                detail: detail.split_whitespace().collect::<Vec<_>>().join(" "),
            },
        }
    }

    pub fn encode(&self) -> String {
        self.to_frame().encode()
    }

    pub fn from_frame(frame: ResponseFrame) -> Result<Self, ResponseError> {
        match frame.status {
            STATUS_SUCCESS => Ok(Response::Success),
            STATUS_FAILURE => Ok(Response::Failure(frame.detail)),
            other => Err(ResponseError::UnknownStatus(other)),
        }
    }

    pub fn decode(line: &str) -> Result<Self, ResponseError> {
        Self::from_frame(ResponseFrame::decode(line)?)
    }
}
