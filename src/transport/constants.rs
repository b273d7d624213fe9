//! Transport defaults (timeouts, redirect limit, chunking).

/// Default connect timeout in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default total request timeout in seconds (large transfers included).
pub const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Default maximum number of redirects followed per task.
pub const MAX_REDIRECTS: usize = 10;

/// Chunk size used when streaming in-memory upload payloads.
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Prefix of temporary download files.
pub const TEMP_FILE_PREFIX: &str = "fetcher-download-";
