//! Handler return values.
//!
//! A handler may return anything implementing [`IntoReply`]. The conversion
//! lands in one of two shapes:
//!
//! - [`Reply::Exception`] — an [`HttpException`]; answered with its status.
//! - [`Reply::Json`] — any other value. A JSON object carrying an integer
//!   `status` and a string `message` is still answered with that status; see
//!   [`normalize`](crate::normalize).

use serde::Serialize;
use serde_json::Value;

use crate::exception::HttpException;

/// A handler's answer, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Json(Value),
    Exception(HttpException),
}

impl Reply {
    /// The reply as view data: the JSON value, or `{status, message}` for an
    /// exception.
    pub fn to_value(&self) -> Value {
        match self {
            Reply::Json(value) => value.clone(),
            Reply::Exception(e) => e.to_value(),
        }
    }
}

/// Conversion of a handler's return value into a [`Reply`].
///
/// Implemented for strings, [`serde_json::Value`], [`Json<T>`],
/// [`HttpException`], `Option<T>` (where `None` is JSON `null`) and
/// `Result<T, E>` with `E: Into<HttpException>`, so handlers can use `?`:
///
/// ```rust,no_run
/// use routeway::{Context, HttpException, Json};
/// use serde::Deserialize;
///
/// #[derive(Deserialize, serde::Serialize)]
/// struct NewUser { name: String }
///
/// async fn create(ctx: Context) -> Result<Json<NewUser>, HttpException> {
///     let user: NewUser = ctx.json()?;
///     Ok(Json(user))
/// }
/// ```
pub trait IntoReply {
    fn into_reply(self) -> Reply;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Reply {
        self
    }
}

impl IntoReply for Value {
    fn into_reply(self) -> Reply {
        Reply::Json(self)
    }
}

impl IntoReply for HttpException {
    fn into_reply(self) -> Reply {
        Reply::Exception(self)
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Reply {
        Reply::Json(Value::from(self))
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Reply {
        Reply::Json(Value::String(self))
    }
}

impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> Reply {
        match self {
            Some(inner) => inner.into_reply(),
            None => Reply::Json(Value::Null),
        }
    }
}

impl<T, E> IntoReply for Result<T, E>
where
    T: IntoReply,
    E: Into<HttpException>,
{
    fn into_reply(self) -> Reply {
        match self {
            Ok(inner) => inner.into_reply(),
            Err(e) => Reply::Exception(e.into()),
        }
    }
}

/// Serializes any `T: Serialize` as the reply body.
///
/// A value that cannot be represented as JSON becomes a `500` exception.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> Reply {
        match serde_json::to_value(&self.0) {
            Ok(value) => Reply::Json(value),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize handler reply");
                Reply::Exception(HttpException::internal("Internal Server Error"))
            }
        }
    }
}
