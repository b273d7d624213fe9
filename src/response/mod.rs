//! Response model and body serializers.

mod serializer;

use std::path::PathBuf;

use serde::Deserialize;

use crate::request::Headers;

pub use serializer::{JsonSerializer, ResponseSerializer, TextSerializer};

/// Status line and headers of a received response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// HTTP status code.
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    /// Response headers.
    pub headers: Headers,
    /// Declared `Content-Length`, when the server sent one.
    pub content_length: Option<u64>,
}

impl ResponseHead {
    /// Creates a head with no headers.
    pub fn new(status: u16, url: impl Into<String>) -> Self {
        Self {
            status,
            url: url.into(),
            headers: Headers::new(),
            content_length: None,
        }
    }

    /// Whether the status is in `200..300`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseValue {
    /// Body decoded as UTF-8 text.
    Text(String),
    /// Body parsed as JSON.
    Json(serde_json::Value),
    /// Body saved to disk by a download.
    File(PathBuf),
}

impl ResponseValue {
    /// The JSON value, if this is a JSON body.
    #[must_use]
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The text, if this is a text body.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// The saved path, if this is a download.
    #[must_use]
    pub fn as_path(&self) -> Option<&std::path::Path> {
        match self {
            Self::File(path) => Some(path),
            _ => None,
        }
    }
}

/// The successful result of a logical request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Status and headers.
    pub head: ResponseHead,
    /// Decoded body.
    pub value: ResponseValue,
}

/// Which serializer decodes a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Parse as JSON; non-JSON bodies fail with a parse error.
    #[default]
    Json,
    /// Decode as UTF-8 text.
    Text,
}

impl ResponseFormat {
    /// Serializer implementing this format.
    #[must_use]
    pub fn serializer(self) -> std::sync::Arc<dyn ResponseSerializer> {
        match self {
            Self::Json => std::sync::Arc::new(JsonSerializer),
            Self::Text => std::sync::Arc::new(TextSerializer),
        }
    }
}
