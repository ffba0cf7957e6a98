//! Content-type driven parsing of request bodies into a key/value view.

use crate::context::RequestHead;
use crate::error::BodyError;
use crate::staging::StagedFile;
use axum::body::Body;
use axum::extract::{FromRequest, Multipart};
use axum::http::{header, Request};
use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Parsed request body: plain fields plus any staged file uploads.
#[derive(Debug, Default)]
pub struct ParsedBody {
    fields: HashMap<String, Value>,
    files: HashMap<String, StagedFile>,
}

impl ParsedBody {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &HashMap<String, Value> {
        &self.fields
    }

    pub fn file(&self, form_name: &str) -> Option<&StagedFile> {
        self.files.get(form_name)
    }

    /// Staged uploads keyed by form field name.
    pub fn files(&self) -> &HashMap<String, StagedFile> {
        &self.files
    }
}

pub(crate) async fn parse(
    head: &RequestHead,
    raw: &Bytes,
    storage_dir: &Path,
) -> Result<ParsedBody, BodyError> {
    if raw.is_empty() {
        return Err(BodyError::Empty);
    }

    let content_type = head.content_type().unwrap_or_default();
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    debug!(content_type = %mime, size = raw.len(), "Parsing request body");

    match mime.as_str() {
        "application/json" => parse_json(raw),
        "application/xml" | "text/xml" => parse_xml(raw),
        "application/x-www-form-urlencoded" => Ok(parse_form(raw)),
        "multipart/form-data" => parse_multipart(content_type, raw.clone(), storage_dir).await,
        other => Err(BodyError::UnsupportedContentType(other.to_string())),
    }
}

fn parse_json(raw: &[u8]) -> Result<ParsedBody, BodyError> {
    match serde_json::from_slice(raw)? {
        Value::Object(map) => Ok(ParsedBody {
            fields: map.into_iter().collect(),
            ..Default::default()
        }),
        _ => Err(BodyError::NotAnObject),
    }
}

fn parse_xml(raw: &[u8]) -> Result<ParsedBody, BodyError> {
    let text = std::str::from_utf8(raw).map_err(|e| BodyError::Xml(e.to_string()))?;
    let map: HashMap<String, String> =
        quick_xml::de::from_str(text).map_err(|e| BodyError::Xml(e.to_string()))?;

    Ok(ParsedBody {
        fields: map
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect(),
        ..Default::default()
    })
}

/// Repeated keys become arrays.
fn parse_form(raw: &[u8]) -> ParsedBody {
    let mut fields: HashMap<String, Value> = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(raw) {
        let value = Value::String(value.into_owned());
        match fields.remove(key.as_ref()) {
            None => {
                fields.insert(key.into_owned(), value);
            }
            Some(Value::Array(mut values)) => {
                values.push(value);
                fields.insert(key.into_owned(), Value::Array(values));
            }
            Some(first) => {
                fields.insert(key.into_owned(), Value::Array(vec![first, value]));
            }
        }
    }

    ParsedBody {
        fields,
        ..Default::default()
    }
}

async fn parse_multipart(
    content_type: &str,
    raw: Bytes,
    storage_dir: &Path,
) -> Result<ParsedBody, BodyError> {
    let request = Request::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(raw))
        .map_err(|e| BodyError::Multipart(e.to_string()))?;
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| BodyError::Multipart(e.to_string()))?;

    let mut parsed = ParsedBody::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| BodyError::Multipart(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| BodyError::Multipart(e.to_string()))?;

        match file_name {
            Some(file_name) => {
                let staged = StagedFile::stage(storage_dir, &name, &file_name, &data)?;
                parsed.files.insert(name, staged);
            }
            None => {
                let value = String::from_utf8_lossy(&data).into_owned();
                parsed.fields.insert(name, Value::String(value));
            }
        }
    }

    Ok(parsed)
}
