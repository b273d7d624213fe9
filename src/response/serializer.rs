//! Status validation and body decoding.
//!
//! Validation decides whether a request succeeded; decoding is best-effort
//! and only yields a value. [`ResponseSerializer::serialize`] runs both.

use std::fmt::Debug;

use bytes::Bytes;

use super::{ResponseHead, ResponseValue};
use crate::error::ClientError;

/// Validates a response and decodes its body.
pub trait ResponseSerializer: Debug + Send + Sync {
    /// Fails with [`ClientError::HttpStatus`] unless the status is in `200..300`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::HttpStatus`] carrying the status, the raw body
    /// and whatever [`decode`](Self::decode) made of it.
    fn validate(&self, head: &ResponseHead, body: &Bytes) -> Result<(), ClientError> {
        if head.is_success() {
            return Ok(());
        }
        Err(ClientError::http_status(
            head.url.clone(),
            head.clone(),
            body.clone(),
            self.decode(body),
        ))
    }

    /// Decodes the body, or returns `None` if it cannot be decoded.
    fn decode(&self, body: &[u8]) -> Option<ResponseValue>;

    /// Validates, then decodes.
    ///
    /// # Errors
    ///
    /// Returns the validation error, or [`ClientError::Parse`] if the body
    /// could not be decoded.
    fn serialize(&self, head: &ResponseHead, body: &Bytes) -> Result<ResponseValue, ClientError> {
        self.validate(head, body)?;
        self.decode(body)
            .ok_or_else(|| ClientError::parse(head.url.clone(), "undecodable body", head.clone()))
    }

    /// `Accept` header value advertised for this format.
    fn accept(&self) -> &'static str;
}

/// Decodes bodies as UTF-8 text. Invalid sequences are replaced.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextSerializer;

impl ResponseSerializer for TextSerializer {
    fn decode(&self, body: &[u8]) -> Option<ResponseValue> {
        Some(ResponseValue::Text(String::from_utf8_lossy(body).into_owned()))
    }

    fn accept(&self) -> &'static str {
        "text/plain, */*"
    }
}

/// Parses bodies as JSON. An empty body decodes to `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    fn parse(body: &[u8]) -> Result<serde_json::Value, serde_json::Error> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_slice(body)
    }
}

impl ResponseSerializer for JsonSerializer {
    fn validate(&self, head: &ResponseHead, body: &Bytes) -> Result<(), ClientError> {
        if !head.is_success() {
            return Err(ClientError::http_status(
                head.url.clone(),
                head.clone(),
                body.clone(),
                self.decode(body),
            ));
        }
        Self::parse(body)
            .map(|_| ())
            .map_err(|e| ClientError::parse(head.url.clone(), e.to_string(), head.clone()))
    }

    fn decode(&self, body: &[u8]) -> Option<ResponseValue> {
        Self::parse(body).ok().map(ResponseValue::Json)
    }

    /// Checks the status, then parses the body once.
    fn serialize(&self, head: &ResponseHead, body: &Bytes) -> Result<ResponseValue, ClientError> {
        if !head.is_success() {
            return Err(ClientError::http_status(
                head.url.clone(),
                head.clone(),
                body.clone(),
                self.decode(body),
            ));
        }
        Self::parse(body)
            .map(ResponseValue::Json)
            .map_err(|e| ClientError::parse(head.url.clone(), e.to_string(), head.clone()))
    }

    fn accept(&self) -> &'static str {
        "application/json"
    }
}
