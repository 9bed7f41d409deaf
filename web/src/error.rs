use std::error::Error as StdError;
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use sse::UpgradeError;

pub type Result<T> = core::result::Result<T, Error>;

/// Web-layer error: carries just enough kind information to pick an HTTP
/// status code and message for the client.
#[derive(Debug)]
pub struct Error {
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request cannot be answered with the representation it asked for.
    NotAcceptable,
    Internal,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Web Error: {self:?}")
    }
}

impl StdError for Error {}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self.error_kind {
            ErrorKind::NotAcceptable => {
                (StatusCode::NOT_ACCEPTABLE, "NOT ACCEPTABLE").into_response()
            }
            ErrorKind::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL SERVER ERROR").into_response()
            }
        }
    }
}

// An upgrade failure means the client did not ask for an event stream;
// the fallback answer is 406.
impl From<UpgradeError> for Error {
    fn from(_err: UpgradeError) -> Self {
        Self {
            error_kind: ErrorKind::NotAcceptable,
        }
    }
}
