//! Structured responses and the writer that turns them into HTTP responses.
//!
//! The serialization strategy is picked purely from [`ResponseKind`]. The
//! typed constructors on [`Response`] always pair a kind with a body it can
//! carry; a mismatched pair built by hand is logged and degraded to an empty
//! body with the declared status.

use crate::context::RequestHead;
use crate::error::SerializationError;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::error;

/// The response type handed back to the host transport.
pub type HttpResponse = axum::response::Response;

/// Escape hatch for handlers that need the raw transport handles.
pub type CustomWriter = Box<dyn FnOnce(&RequestHead, &mut HttpResponse) + Send>;

/// Root element used when encoding structured bodies as XML.
const XML_ROOT: &str = "response";

/// Declared type of a response; selects the serialization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseKind {
    Json,
    Html,
    Xml,
    #[default]
    PlainText,
    File,
    Redirect,
    None,
    Custom,
}

impl ResponseKind {
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            ResponseKind::Json => Some("application/json"),
            ResponseKind::Html => Some("text/html"),
            ResponseKind::Xml => Some("application/xml"),
            ResponseKind::PlainText => Some("text/plain"),
            ResponseKind::File
            | ResponseKind::Redirect
            | ResponseKind::None
            | ResponseKind::Custom => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResponseKind::Json => "json",
            ResponseKind::Html => "html",
            ResponseKind::Xml => "xml",
            ResponseKind::PlainText => "plain-text",
            ResponseKind::File => "file",
            ResponseKind::Redirect => "redirect",
            ResponseKind::None => "none",
            ResponseKind::Custom => "custom",
        }
    }
}

/// Response payload.
pub enum ResponseBody {
    Empty,
    Text(String),
    Bytes(Bytes),
    Structured(Value),
    FilePath(PathBuf),
    RedirectTarget(String),
    Custom(CustomWriter),
}

impl ResponseBody {
    fn name(&self) -> &'static str {
        match self {
            ResponseBody::Empty => "empty",
            ResponseBody::Text(_) => "text",
            ResponseBody::Bytes(_) => "bytes",
            ResponseBody::Structured(_) => "structured",
            ResponseBody::FilePath(_) => "file path",
            ResponseBody::RedirectTarget(_) => "redirect target",
            ResponseBody::Custom(_) => "custom writer",
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Empty => write!(f, "Empty"),
            ResponseBody::Text(s) => f.debug_tuple("Text").field(s).finish(),
            ResponseBody::Bytes(b) => f.debug_tuple("Bytes").field(b).finish(),
            ResponseBody::Structured(v) => f.debug_tuple("Structured").field(v).finish(),
            ResponseBody::FilePath(p) => f.debug_tuple("FilePath").field(p).finish(),
            ResponseBody::RedirectTarget(u) => f.debug_tuple("RedirectTarget").field(u).finish(),
            ResponseBody::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// A handler's response, consumed exactly once by the [`ResponseWriter`].
#[derive(Debug)]
pub struct Response {
    /// Falls back to 301 for redirects and to the configured default otherwise.
    pub status: Option<StatusCode>,
    pub body: ResponseBody,
    pub kind: ResponseKind,
    pub headers: HeaderMap,
}

impl Response {
    pub fn new(kind: ResponseKind, body: ResponseBody) -> Self {
        Self {
            status: None,
            body,
            kind,
            headers: HeaderMap::new(),
        }
    }

    pub fn json(body: Value) -> Self {
        Self::new(ResponseKind::Json, ResponseBody::Structured(body))
    }

    /// Serializes any value up front so encoding errors surface in the handler.
    pub fn to_json<T: Serialize>(body: &T) -> Result<Self, SerializationError> {
        Ok(Self::json(serde_json::to_value(body)?))
    }

    pub fn xml(body: Value) -> Self {
        Self::new(ResponseKind::Xml, ResponseBody::Structured(body))
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self::new(ResponseKind::Html, ResponseBody::Text(body.into()))
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::new(ResponseKind::PlainText, ResponseBody::Text(body.into()))
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(ResponseKind::File, ResponseBody::FilePath(path.into()))
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Self::new(
            ResponseKind::Redirect,
            ResponseBody::RedirectTarget(location.into()),
        )
    }

    pub fn none() -> Self {
        Self::new(ResponseKind::None, ResponseBody::Empty)
    }

    pub fn custom<F>(writer: F) -> Self
    where
        F: FnOnce(&RequestHead, &mut HttpResponse) + Send + 'static,
    {
        Self::new(ResponseKind::Custom, ResponseBody::Custom(Box::new(writer)))
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

enum Rendered {
    Body(Bytes),
    File(PathBuf),
    Redirect(HeaderValue),
    Nothing,
    Custom(CustomWriter),
}

fn mismatch(kind: ResponseKind, body: &ResponseBody) -> SerializationError {
    SerializationError::Mismatch {
        kind: kind.name(),
        body: body.name(),
    }
}

fn render(kind: ResponseKind, body: ResponseBody) -> Result<Rendered, SerializationError> {
    match (kind, body) {
        (ResponseKind::None, _) => Ok(Rendered::Nothing),

        (
            ResponseKind::Json | ResponseKind::Xml | ResponseKind::Html | ResponseKind::PlainText,
            ResponseBody::Empty,
        ) => Ok(Rendered::Body(Bytes::new())),

        (ResponseKind::Json, ResponseBody::Structured(value)) => {
            Ok(Rendered::Body(serde_json::to_vec(&value)?.into()))
        }
        (ResponseKind::Json, ResponseBody::Text(text)) => {
            Ok(Rendered::Body(serde_json::to_vec(&text)?.into()))
        }

        (ResponseKind::Xml, ResponseBody::Structured(value)) => {
            let encoded = quick_xml::se::to_string_with_root(XML_ROOT, &value)
                .map_err(|e| SerializationError::Xml(e.to_string()))?;
            Ok(Rendered::Body(encoded.into()))
        }

        (
            ResponseKind::Json | ResponseKind::Xml | ResponseKind::Html | ResponseKind::PlainText,
            ResponseBody::Bytes(bytes),
        ) => Ok(Rendered::Body(bytes)),
        (ResponseKind::Xml | ResponseKind::Html | ResponseKind::PlainText, ResponseBody::Text(text)) => {
            Ok(Rendered::Body(text.into()))
        }

        (ResponseKind::File, ResponseBody::FilePath(path)) => Ok(Rendered::File(path)),
        (ResponseKind::File, ResponseBody::Text(path)) => Ok(Rendered::File(path.into())),

        (ResponseKind::Redirect, ResponseBody::RedirectTarget(location))
        | (ResponseKind::Redirect, ResponseBody::Text(location)) => {
            HeaderValue::from_str(&location)
                .map(Rendered::Redirect)
                .map_err(|_| SerializationError::InvalidRedirect(location))
        }

        (ResponseKind::Custom, ResponseBody::Custom(writer)) => Ok(Rendered::Custom(writer)),

        (kind, body) => Err(mismatch(kind, &body)),
    }
}

/// Writes [`Response`] values using the global defaults.
#[derive(Debug, Clone)]
pub struct ResponseWriter {
    default_status: StatusCode,
    base_headers: HeaderMap,
}

impl ResponseWriter {
    pub fn new(default_status: StatusCode, base_headers: HeaderMap) -> Self {
        Self {
            default_status,
            base_headers,
        }
    }

    pub fn default_status(&self) -> StatusCode {
        self.default_status
    }

    /// Turns `response` into an HTTP response. Never fails: serialization
    /// errors are logged and produce an empty body with the declared status.
    pub async fn write(&self, head: &RequestHead, response: Response) -> HttpResponse {
        let Response {
            status,
            body,
            kind,
            headers,
        } = response;

        let status = status.unwrap_or(match kind {
            ResponseKind::Redirect => StatusCode::MOVED_PERMANENTLY,
            _ => self.default_status,
        });

        let rendered = match render(kind, body) {
            Ok(rendered) => rendered,
            Err(err) => {
                error!(
                    kind = kind.name(),
                    status = status.as_u16(),
                    error = %err,
                    "Failed to serialize response"
                );
                Rendered::Body(Bytes::new())
            }
        };

        match rendered {
            Rendered::Body(bytes) => {
                let mut out = with_status(Body::from(bytes), status);
                self.apply_headers(out.headers_mut(), headers, kind);
                out
            }
            Rendered::Nothing => {
                let mut out = with_status(Body::empty(), status);
                self.apply_headers(out.headers_mut(), headers, kind);
                out
            }
            Rendered::Redirect(location) => {
                let mut out = with_status(Body::empty(), status);
                self.apply_headers(out.headers_mut(), headers, kind);
                out.headers_mut().insert(header::LOCATION, location);
                out
            }
            Rendered::File(path) => {
                let mut out = serve_file(head, &path).await;
                self.apply_headers(out.headers_mut(), headers, kind);
                out
            }
            Rendered::Custom(writer) => {
                let mut out = with_status(Body::empty(), status);
                self.apply_headers(out.headers_mut(), headers, kind);
                writer(head, &mut out);
                out
            }
        }
    }

    /// Base headers first, then the response's own, then the kind's
    /// content type if nobody set one.
    fn apply_headers(&self, target: &mut HeaderMap, own: HeaderMap, kind: ResponseKind) {
        for (name, value) in &self.base_headers {
            target.insert(name.clone(), value.clone());
        }

        for name in own.keys() {
            target.remove(name);
        }
        for (name, value) in &own {
            target.append(name.clone(), value.clone());
        }

        if !target.contains_key(header::CONTENT_TYPE) {
            if let Some(content_type) = kind.content_type() {
                target.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
        }
    }
}

fn with_status(body: Body, status: StatusCode) -> HttpResponse {
    let mut response = HttpResponse::new(body);
    *response.status_mut() = status;
    response
}

/// Streams the file at `path`; a missing file yields 404.
async fn serve_file(head: &RequestHead, path: &Path) -> HttpResponse {
    // files are always fetched, whatever method reached the handler
    let method = if head.method == Method::HEAD {
        Method::HEAD
    } else {
        Method::GET
    };

    let mut request = Request::new(Body::empty());
    *request.method_mut() = method;
    *request.uri_mut() = head.uri.clone();
    *request.headers_mut() = head.headers.clone();

    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(err) => {
            error!(path = %path.display(), error = %err, "Failed to serve file");
            with_status(Body::empty(), StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
