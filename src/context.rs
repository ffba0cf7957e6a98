use crate::body::{self, ParsedBody};
use crate::error::BodyError;
use crate::params::PathParams;
use crate::staging::StagedFile;
use axum::http::{header, request::Parts, HeaderMap, Method, Uri};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use tokio::sync::OnceCell;

/// Default directory for staged uploads.
pub const DEFAULT_STORAGE_LOCATION: &str = "storage";

/// Read-only request metadata shared with the response writer.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl RequestHead {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        Self {
            method,
            uri,
            headers,
        }
    }

    pub fn from_parts(parts: &Parts) -> Self {
        Self::new(parts.method.clone(), parts.uri.clone(), parts.headers.clone())
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

/// Everything a handler or middleware can see about one request.
///
/// Owned by the task serving the request and dropped once the response is
/// written; staged uploads that were not stored are removed at that point.
#[derive(Debug)]
pub struct RequestContext {
    head: RequestHead,
    query: HashMap<String, Vec<String>>,
    body: Bytes,
    params: PathParams,
    request_id: Option<String>,
    storage_dir: PathBuf,
    store: RwLock<HashMap<String, Value>>,
    parsed: OnceCell<ParsedBody>,
}

impl RequestContext {
    pub fn new(head: RequestHead, body: Bytes, params: PathParams) -> Self {
        let query = parse_query(head.uri.query());
        Self {
            head,
            query,
            body,
            params,
            request_id: None,
            storage_dir: PathBuf::from(DEFAULT_STORAGE_LOCATION),
            store: RwLock::new(HashMap::new()),
            parsed: OnceCell::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_storage_dir(mut self, storage_dir: PathBuf) -> Self {
        self.storage_dir = storage_dir;
        self
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn uri(&self) -> &Uri {
        &self.head.uri
    }

    pub fn path(&self) -> &str {
        self.head.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn query(&self) -> &HashMap<String, Vec<String>> {
        &self.query
    }

    /// First value of a query parameter.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Stores a value for later middleware or the handler.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
        store.insert(key.into(), value);
    }

    pub fn get_stored(&self, key: &str) -> Option<Value> {
        let store = self.store.read().unwrap_or_else(|e| e.into_inner());
        store.get(key).cloned()
    }

    /// Looks `key` up in the store, then the path parameters, then the
    /// query string, then the parsed body.
    pub async fn lookup(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.get_stored(key) {
            return Some(value);
        }
        if let Some(value) = self.param(key) {
            return Some(Value::String(value.to_string()));
        }
        if let Some(value) = self.query_value(key) {
            return Some(Value::String(value.to_string()));
        }
        if self.body.is_empty() {
            return None;
        }
        self.body().await.ok()?.field(key).cloned()
    }

    /// The body parsed according to its content type. Parsed at most once.
    pub async fn body(&self) -> Result<&ParsedBody, BodyError> {
        self.parsed
            .get_or_try_init(|| body::parse(&self.head, &self.body, &self.storage_dir))
            .await
    }

    /// Files uploaded in a multipart body, keyed by form field name.
    pub async fn files(&self) -> Result<&HashMap<String, StagedFile>, BodyError> {
        Ok(self.body().await?.files())
    }

    /// Deserializes a JSON body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, BodyError> {
        if self.body.is_empty() {
            return Err(BodyError::Empty);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}

fn parse_query(query: Option<&str>) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params
                .entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }
    }
    params
}
