//! Fetcher Core Library
//!
//! An asynchronous HTTP client engine: verb requests, downloads and uploads
//! with pluggable request encoding and response decoding, a single retry after
//! an authorization failure, and progress reporting for long transfers.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`request`] - Request model, parameter encoding and URL composition
//! - [`response`] - Response model and the text/JSON serializers
//! - [`transport`] - Transport boundary and the reqwest-backed implementation
//! - [`dispatch`] - Task registry routing transport events to per-task delegates
//! - [`client`] - Public facade with the authorization retry
//! - [`auth`] - Authorization collaborator and credentials
//! - [`config`] - Client configuration
//! - [`error`] - Error types

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod request;
pub mod response;
pub mod transport;
mod user_agent;

// Re-export commonly used types
pub use auth::{AccessError, Authorizer, Credential};
pub use client::{
    Client, DownloadOptions, RequestHandle, RequestOptions, UploadOptions, UploadPayload,
};
pub use config::{ClientConfig, ServerTrustPolicy};
pub use dispatch::Progress;
pub use error::{ClientError, TransportError};
pub use request::{CachePolicy, FilePayload, Method, ParamValue, Parameters};
pub use response::{Response, ResponseFormat, ResponseValue};
