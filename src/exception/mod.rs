//! `HttpException` — an error that is answered to the client as
//! `{"status": <code>, "message": <text>}` with the matching status code.
//!
//! Handlers return it (directly, or as the `Err` side of a `Result`) to pick
//! a non-200 answer; guards, fallbacks and the recovery middleware use it for
//! their own responses so every error body has the same shape.

use serde::Serialize;
use thiserror::Error;

use crate::http::{Response, StatusCode};

/// A structured HTTP error.
///
/// # Examples
///
/// ```
/// use routeway::{HttpException, http::StatusCode};
///
/// let e = HttpException::not_found("no such user");
/// assert_eq!(e.status(), StatusCode::NOT_FOUND);
///
/// let res = e.into_response();
/// assert_eq!(res.body_text(), r#"{"status":404,"message":"no such user"}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} {message}", .status.as_u16())]
pub struct HttpException {
    status: StatusCode,
    message: String,
}

/// Wire shape shared by every structured error body. Field order is the
/// serialization order.
#[derive(Serialize)]
pub(crate) struct StatusBody<'a> {
    pub status: u16,
    pub message: &'a str,
}

impl HttpException {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// An exception whose message is the status code's reason phrase.
    pub fn from_status(status: StatusCode) -> Self {
        Self::new(status, status.canonical_reason())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The `{status, message}` body as a JSON value, used as view data when an
    /// exception reply is rendered.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({ "status": self.status.as_u16(), "message": self.message })
    }

    pub fn into_response(self) -> Response {
        status_response(self.status, &self.message)
    }
}

/// Builds a `{status, message}` JSON response with `status` as the HTTP code.
pub(crate) fn status_response(status: StatusCode, message: &str) -> Response {
    Response::json(
        status,
        &StatusBody {
            status: status.as_u16(),
            message,
        },
    )
}

impl From<StatusCode> for HttpException {
    fn from(status: StatusCode) -> Self {
        Self::from_status(status)
    }
}

impl From<serde_json::Error> for HttpException {
    fn from(e: serde_json::Error) -> Self {
        Self::bad_request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_puts_status_first() {
        let res = HttpException::forbidden("Forbidden").into_response();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(res.body_text(), r#"{"status":403,"message":"Forbidden"}"#);
    }

    #[test]
    fn from_status_uses_reason_phrase() {
        let e = HttpException::from(StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(e.message(), "Method Not Allowed");
        assert_eq!(e.to_string(), "405 Method Not Allowed");
    }

    #[test]
    fn bad_json_becomes_bad_request() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let e = HttpException::from(err);
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
    }
}
