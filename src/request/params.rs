//! Parameter trees and their url-encoded and multipart encodings.
//!
//! Nested values are flattened with bracket keys:
//!
//! - scalar under `k` becomes `k=value`
//! - sequence under `k` recurses with `k[]` for every element
//! - mapping under `k` recurses with `k[nested]` (or `nested` at top level)
//!
//! Sibling keys are emitted in lexicographic order because [`Parameters`] is a
//! `BTreeMap`; sequence elements keep their order.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;
use tracing::debug;

use crate::error::ClientError;

/// Top-level parameter mapping. Ordered so encodings are deterministic.
pub type Parameters = BTreeMap<String, ParamValue>;

/// A node of a parameter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// A value rendered through its string form.
    Scalar(String),
    /// An ordered sequence, flattened with `k[]`.
    List(Vec<ParamValue>),
    /// A nested mapping, flattened with `k[nested]`.
    Map(Parameters),
    /// A file part; forces multipart encoding.
    File(FilePayload),
}

/// Where the bytes of a file parameter come from.
#[derive(Debug, Clone, PartialEq)]
pub enum FileSource {
    /// In-memory payload.
    Bytes(Bytes),
    /// A local file read when the body is built.
    Path(PathBuf),
}

/// A file parameter: payload plus the metadata of its multipart part.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePayload {
    source: FileSource,
    filename: String,
    mime_type: String,
}

impl FilePayload {
    /// Creates a file part from in-memory bytes.
    pub fn from_bytes(
        bytes: impl Into<Bytes>,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            source: FileSource::Bytes(bytes.into()),
            filename: filename.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Creates a file part backed by a local file.
    ///
    /// The filename defaults to the last path component.
    pub fn from_path(path: impl Into<PathBuf>, mime_type: impl Into<String>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        Self {
            source: FileSource::Path(path),
            filename,
            mime_type: mime_type.into(),
        }
    }

    /// Overrides the filename reported in the part header.
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// The payload source.
    #[must_use]
    pub fn source(&self) -> &FileSource {
        &self.source
    }

    /// Filename reported in `Content-Disposition`.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// MIME type reported in the part `Content-Type`.
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    async fn read(&self) -> Result<Bytes, ClientError> {
        match &self.source {
            FileSource::Bytes(bytes) => Ok(bytes.clone()),
            FileSource::Path(path) => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|e| ClientError::filesystem(path.clone(), e)),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl From<&String> for ParamValue {
    fn from(value: &String) -> Self {
        Self::Scalar(value.clone())
    }
}

macro_rules! scalar_from_display {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(value: $ty) -> Self {
                    Self::Scalar(value.to_string())
                }
            }
        )*
    };
}

scalar_from_display!(i32, i64, u32, u64, usize, f64, bool);

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<Parameters> for ParamValue {
    fn from(map: Parameters) -> Self {
        Self::Map(map)
    }
}

impl From<FilePayload> for ParamValue {
    fn from(file: FilePayload) -> Self {
        Self::File(file)
    }
}

impl From<&serde_json::Value> for ParamValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Scalar(String::new()),
            serde_json::Value::String(s) => Self::Scalar(s.clone()),
            serde_json::Value::Array(items) => Self::List(items.iter().map(Into::into).collect()),
            serde_json::Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.into()))
                    .collect(),
            ),
            other => Self::Scalar(other.to_string()),
        }
    }
}

/// Converts a JSON object into parameters. Non-object values yield an empty map.
#[must_use]
pub fn from_json(value: &serde_json::Value) -> Parameters {
    match ParamValue::from(value) {
        ParamValue::Map(map) => map,
        _ => Parameters::new(),
    }
}

/// A flattened leaf: its bracketed key and the scalar or file at that key.
#[derive(Debug, Clone, Copy)]
enum Leaf<'a> {
    Text(&'a str),
    File(&'a FilePayload),
}

fn flatten(parameters: &Parameters) -> Vec<(String, Leaf<'_>)> {
    let mut pairs = Vec::new();
    for (key, value) in parameters {
        flatten_into(key.clone(), value, &mut pairs);
    }
    pairs
}

fn flatten_into<'a>(key: String, value: &'a ParamValue, out: &mut Vec<(String, Leaf<'a>)>) {
    match value {
        ParamValue::Scalar(text) => out.push((key, Leaf::Text(text))),
        ParamValue::File(file) => out.push((key, Leaf::File(file))),
        ParamValue::List(items) => {
            let nested = format!("{key}[]");
            for item in items {
                flatten_into(nested.clone(), item, out);
            }
        }
        ParamValue::Map(map) => {
            for (nested_key, nested_value) in map {
                flatten_into(format!("{key}[{nested_key}]"), nested_value, out);
            }
        }
    }
}

/// Flattens parameters into percent-encoded `(key, value)` pairs.
///
/// File values cannot be url-encoded and are skipped.
#[must_use]
pub fn encode(parameters: &Parameters) -> Vec<(String, String)> {
    flatten(parameters)
        .into_iter()
        .filter_map(|(key, leaf)| match leaf {
            Leaf::Text(text) => Some((
                urlencoding::encode(&key).into_owned(),
                urlencoding::encode(text).into_owned(),
            )),
            Leaf::File(file) => {
                debug!(key = %key, filename = %file.filename(), "skipping file value in url-encoded form");
                None
            }
        })
        .collect()
}

/// Joins the encoded pairs with `=` and `&`.
#[must_use]
pub fn query_string(parameters: &Parameters) -> String {
    let mut out = String::new();
    for (index, (key, value)) in encode(parameters).iter().enumerate() {
        if index > 0 {
            out.push('&');
        }
        let _ = write!(out, "{key}={value}");
    }
    out
}

/// Whether any value in the tree, at any depth, is a file.
#[must_use]
pub fn is_multipart(parameters: &Parameters) -> bool {
    parameters.values().any(contains_file)
}

fn contains_file(value: &ParamValue) -> bool {
    match value {
        ParamValue::Scalar(_) => false,
        ParamValue::File(_) => true,
        ParamValue::List(items) => items.iter().any(contains_file),
        ParamValue::Map(map) => map.values().any(contains_file),
    }
}

/// Builds an `application/x-www-form-urlencoded` body.
#[must_use]
pub fn build_url_encoded_body(parameters: &Parameters) -> Bytes {
    Bytes::from(query_string(parameters))
}

/// Generates a fresh multipart boundary token.
#[must_use]
pub fn generate_boundary() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "Boundary-{:016x}{:016x}",
        rng.r#gen::<u64>(),
        rng.r#gen::<u64>()
    )
}

/// Builds a `multipart/form-data` body framed by `boundary`.
///
/// # Errors
///
/// Returns [`ClientError::Filesystem`] if a path-backed file cannot be read.
pub async fn build_multipart_body(
    parameters: &Parameters,
    boundary: &str,
) -> Result<Bytes, ClientError> {
    let mut body = BytesMut::new();
    for (key, leaf) in flatten(parameters) {
        body.put_slice(format!("--{boundary}\r\n").as_bytes());
        match leaf {
            Leaf::Text(text) => {
                body.put_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n", escape_quoted(&key))
                        .as_bytes(),
                );
                body.put_slice(b"\r\n");
                body.put_slice(text.as_bytes());
            }
            Leaf::File(file) => {
                body.put_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        escape_quoted(&key),
                        escape_quoted(file.filename())
                    )
                    .as_bytes(),
                );
                if !file.mime_type().is_empty() {
                    body.put_slice(format!("Content-Type: {}\r\n", file.mime_type()).as_bytes());
                }
                body.put_slice(b"\r\n");
                body.put_slice(&file.read().await?);
            }
        }
        body.put_slice(b"\r\n");
    }
    body.put_slice(format!("--{boundary}--\r\n").as_bytes());
    Ok(body.freeze())
}

/// `Content-Type` header value for a multipart body.
#[must_use]
pub fn multipart_content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={boundary}")
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\r', '\n'], " ")
}
