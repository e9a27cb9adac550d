//! HTTP surface errors
//!
//! Every failed RPC leaves the gateway as a JSON body `{"code", "message"}`
//! carrying the numeric status code, with the matching HTTP status.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rpc::{Code, Status};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Rpc(#[from] Status),

    #[error("invalid request body: {0}")]
    InvalidBody(String),
}

impl Error {
    pub fn code(&self) -> Code {
        match self {
            Error::Rpc(status) => status.code(),
            Error::InvalidBody(_) => Code::InvalidArgument,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: Code,
    message: String,
}

/// HTTP status for an RPC status code.
pub fn http_status(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let code = self.code();
        let message = match self {
            Error::Rpc(status) => status.message().to_owned(),
            other => other.to_string(),
        };
        (http_status(code), Json(ErrorBody { code, message })).into_response()
    }
}
