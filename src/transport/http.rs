//! reqwest-backed transport.
//!
//! Automatic redirects are disabled so every 3xx is routed through the
//! dispatcher. Credential challenges (`401` + `WWW-Authenticate`) are raised
//! as events and answered credentials are applied as HTTP Basic.
//!
//! Once a redirect leaves the request's origin, `Authorization`, `Cookie` and
//! `Proxy-Authorization` are no longer sent and challenges are not answered.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument, warn};

use super::constants::{TEMP_FILE_PREFIX, UPLOAD_CHUNK_SIZE};
use super::filename::suggested_filename;
use super::{
    BodyStream, Challenge, ChallengeDisposition, EventSink, RedirectDecision, TaskId, TaskKind,
    Transport, TransportEvent, TransportTask, UploadSource, UploadStream,
};
use crate::config::{ClientConfig, ServerTrustPolicy};
use crate::error::{ClientError, TransportError};
use crate::request::{Headers, Method, Request};
use crate::response::ResponseHead;

/// Transport executing tasks on a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    client: reqwest::Client,
    max_redirects: usize,
    temp_dir: PathBuf,
}

/// What a running task has produced so far, kept across cancellation.
#[derive(Debug, Default)]
struct Attempt {
    head: Option<ResponseHead>,
    temp_path: Option<PathBuf>,
}

impl ReqwestTransport {
    /// Builds the transport from client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let accept_any = config.server_trust == ServerTrustPolicy::AcceptAny;
        if accept_any {
            warn!("server trust policy is AcceptAny: certificate validation disabled");
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .gzip(config.gzip)
            .user_agent(config.user_agent())
            .danger_accept_invalid_certs(accept_any)
            .build()
            .map_err(|e| ClientError::Configuration {
                message: e.to_string(),
            })?;
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                max_redirects: config.max_redirects,
                temp_dir: std::env::temp_dir(),
            }),
        })
    }
}

impl Transport for ReqwestTransport {
    fn submit(&self, task: TransportTask, events: EventSink) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.run(task, events).await });
    }
}

impl Inner {
    #[instrument(skip_all, fields(task = %task.id, url = %task.request.url()))]
    async fn run(&self, task: TransportTask, events: EventSink) {
        let TransportTask {
            id,
            kind,
            request,
            upload,
            cancel,
        } = task;
        let mut attempt = Attempt::default();

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TransportError::Cancelled),
            result = self.execute(id, kind, &request, upload.as_ref(), &events, &mut attempt) => result,
        };

        if outcome.is_err()
            && let Some(temp_path) = attempt.temp_path.take()
        {
            debug!(path = %temp_path.display(), "removing partial download");
            let _ = tokio::fs::remove_file(&temp_path).await;
        }

        debug!(ok = outcome.is_ok(), "task finished");
        events.emit(
            id,
            TransportEvent::Completed {
                response: attempt.head,
                error: outcome.err(),
            },
        );
    }

    async fn execute(
        &self,
        id: TaskId,
        kind: TaskKind,
        request: &Request,
        upload: Option<&UploadSource>,
        events: &EventSink,
        attempt: &mut Attempt,
    ) -> Result<(), TransportError> {
        let mut method = request.method();
        let mut url = request.url().clone();
        let mut send_body = true;
        let mut strip_credentials = false;
        let mut authorization: Option<String> = None;
        let mut redirects = 0usize;
        let mut challenge_failures = 0u32;

        let (response, head) = loop {
            let body = if send_body {
                self.request_body(id, kind, request, upload, events).await?
            } else {
                None
            };
            let explicit_length = matches!(body, Some((_, Some(_))));

            let mut builder = self
                .client
                .request(reqwest_method(method), url.clone())
                .timeout(request.timeout());
            for (name, value) in request.headers().iter() {
                if (!send_body && is_body_header(name))
                    || (strip_credentials && is_credential_header(name))
                    || (explicit_length && name.eq_ignore_ascii_case("content-length"))
                {
                    continue;
                }
                builder = builder.header(name, value);
            }
            if let Some(value) = &authorization {
                builder = builder.header(AUTHORIZATION, value.as_str());
            }
            if let Some((body, length)) = body {
                builder = builder.body(body);
                if let Some(length) = length {
                    builder = builder.header(CONTENT_LENGTH, length);
                }
            }

            let response = builder
                .send()
                .await
                .map_err(|e| TransportError::from_reqwest(&e))?;
            let head = response_head(&response);
            let status = head.status;

            if matches!(status, 301 | 302 | 303 | 307 | 308)
                && let Some(location) = head.headers.get("location")
            {
                let target = url
                    .join(location)
                    .map_err(|e| TransportError::InvalidRedirect(format!("{location}: {e}")))?;
                let (redirect_head, redirect_target) = (head.clone(), target.clone());
                let decision = events
                    .ask(id, move |reply| TransportEvent::Redirect {
                        response: redirect_head,
                        location: redirect_target,
                        reply,
                    })
                    .await
                    .unwrap_or(RedirectDecision::Follow(target));
                if let RedirectDecision::Follow(next) = decision {
                    redirects += 1;
                    if redirects > self.max_redirects {
                        return Err(TransportError::TooManyRedirects {
                            limit: self.max_redirects,
                        });
                    }
                    if method != Method::Head
                        && (status == 303 || (matches!(status, 301 | 302) && method == Method::Post))
                    {
                        method = Method::Get;
                        send_body = false;
                    }
                    if next.origin() != url.origin() && !strip_credentials {
                        debug!(from = %url, to = %next, "cross-origin redirect, dropping credentials");
                        strip_credentials = true;
                        authorization = None;
                    }
                    debug!(status, to = %next, redirects, "following redirect");
                    url = next;
                    continue;
                }
            }

            if status == 401
                && !strip_credentials
                && let Some(www_authenticate) = head.headers.get("www-authenticate")
            {
                let challenge = Challenge::Credential {
                    realm: parse_realm(www_authenticate),
                    previous_failures: challenge_failures,
                };
                let disposition = events
                    .ask(id, move |reply| TransportEvent::Challenge { challenge, reply })
                    .await
                    .unwrap_or(ChallengeDisposition::PerformDefaultHandling);
                if let ChallengeDisposition::UseCredential(credential) = disposition {
                    debug!(user = credential.user(), "answering credential challenge");
                    challenge_failures += 1;
                    authorization = Some(credential.basic_authorization());
                    continue;
                }
            }

            break (response, head);
        };

        attempt.head = Some(head.clone());
        events.emit(id, TransportEvent::Response(head.clone()));

        if kind == TaskKind::Download {
            return self.download_to_temp(id, response, &head, events, attempt).await;
        }

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| TransportError::from_reqwest(&e))?;
            events.emit(id, TransportEvent::Data(chunk));
        }
        Ok(())
    }

    /// Body for one send. Uploads are streamed with progress reporting; other
    /// tasks send the pre-encoded request body.
    async fn request_body(
        &self,
        id: TaskId,
        kind: TaskKind,
        request: &Request,
        upload: Option<&UploadSource>,
        events: &EventSink,
    ) -> Result<Option<(reqwest::Body, Option<u64>)>, TransportError> {
        if kind != TaskKind::Upload {
            return Ok(request
                .body()
                .cloned()
                .map(|body| (reqwest::Body::from(body), None)));
        }

        let (stream, total): (BodyStream, Option<u64>) = match upload {
            None => return Ok(None),
            Some(UploadSource::Bytes(bytes)) => (chunked(bytes.clone()), Some(bytes.len() as u64)),
            Some(UploadSource::File(path)) => {
                let file = File::open(path)
                    .await
                    .map_err(|e| TransportError::Body(format!("{}: {e}", path.display())))?;
                let length = file.metadata().await.ok().map(|meta| meta.len());
                let stream: BodyStream =
                    Box::pin(ReaderStream::with_capacity(file, UPLOAD_CHUNK_SIZE));
                (stream, length)
            }
            Some(UploadSource::Stream) => {
                let provided = events
                    .ask(id, |reply| TransportEvent::NeedBodyStream { reply })
                    .await
                    .flatten();
                let Some(UploadStream(stream)) = provided else {
                    debug!("no body stream supplied, sending without body");
                    return Ok(None);
                };
                let declared = request
                    .headers()
                    .get("content-length")
                    .and_then(|value| value.parse().ok());
                (stream, declared)
            }
        };

        let body = reqwest::Body::wrap_stream(with_send_progress(stream, id, total, events.clone()));
        Ok(Some((body, total)))
    }

    async fn download_to_temp(
        &self,
        id: TaskId,
        response: reqwest::Response,
        head: &ResponseHead,
        events: &EventSink,
        attempt: &mut Attempt,
    ) -> Result<(), TransportError> {
        let final_url = response.url().clone();
        let temp_path = self
            .temp_dir
            .join(format!("{TEMP_FILE_PREFIX}{:016x}.tmp", rand::random::<u64>()));
        attempt.temp_path = Some(temp_path.clone());
        let io_error = |source| TransportError::Io {
            path: temp_path.clone(),
            source,
        };

        let file = File::create(&temp_path).await.map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        let mut stream = response.bytes_stream();
        let mut total_written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| TransportError::from_reqwest(&e))?;
            writer.write_all(&chunk).await.map_err(io_error)?;
            let bytes_written = chunk.len() as u64;
            total_written += bytes_written;
            events.emit(
                id,
                TransportEvent::ReceiveProgress {
                    bytes_written,
                    total_written,
                    total_expected: head.content_length,
                },
            );
        }
        writer.flush().await.map_err(io_error)?;

        attempt.temp_path = None;
        events.emit(
            id,
            TransportEvent::FinishedDownloading {
                temp_path,
                suggested_filename: suggested_filename(&head.headers, &final_url),
            },
        );
        Ok(())
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Head => reqwest::Method::HEAD,
        Method::Delete => reqwest::Method::DELETE,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
    }
}

fn is_body_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("content-type") || name.eq_ignore_ascii_case("content-length")
}

/// Headers that must not follow a redirect to another origin.
fn is_credential_header(name: &str) -> bool {
    ["authorization", "cookie", "proxy-authorization"]
        .iter()
        .any(|sensitive| name.eq_ignore_ascii_case(sensitive))
}

fn response_head(response: &reqwest::Response) -> ResponseHead {
    let headers: Headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    ResponseHead {
        status: response.status().as_u16(),
        url: response.url().to_string(),
        headers,
        content_length: response.content_length(),
    }
}

/// Extracts `realm="..."` from a `WWW-Authenticate` value.
fn parse_realm(www_authenticate: &str) -> Option<String> {
    let start = www_authenticate.find("realm=")? + "realm=".len();
    let rest = &www_authenticate[start..];
    let value = match rest.strip_prefix('"') {
        Some(quoted) => &quoted[..quoted.find('"')?],
        None => rest.split([',', ' ']).next().unwrap_or(""),
    };
    (!value.is_empty()).then(|| value.to_string())
}

fn chunked(bytes: Bytes) -> BodyStream {
    let chunks: Vec<Result<Bytes, std::io::Error>> = (0..bytes.len())
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(|start| Ok(bytes.slice(start..(start + UPLOAD_CHUNK_SIZE).min(bytes.len()))))
        .collect();
    Box::pin(futures_util::stream::iter(chunks))
}

fn with_send_progress(
    stream: BodyStream,
    id: TaskId,
    total_expected: Option<u64>,
    events: EventSink,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let mut total_sent: u64 = 0;
    stream.inspect(move |chunk| {
        if let Ok(chunk) = chunk {
            let bytes_sent = chunk.len() as u64;
            total_sent += bytes_sent;
            events.emit(
                id,
                TransportEvent::SendProgress {
                    bytes_sent,
                    total_sent,
                    total_expected,
                },
            );
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_realm_quoted_and_bare() {
        assert_eq!(
            parse_realm(r#"Basic realm="api", charset="UTF-8""#).as_deref(),
            Some("api")
        );
        assert_eq!(parse_realm("Basic realm=files").as_deref(), Some("files"));
        assert!(parse_realm("Bearer").is_none());
    }

    #[tokio::test]
    async fn test_chunked_splits_on_chunk_size() {
        let payload = Bytes::from(vec![7u8; UPLOAD_CHUNK_SIZE * 2 + 5]);
        let chunks: Vec<Bytes> = chunked(payload)
            .map(Result::unwrap)
            .collect()
            .await;
        let sizes: Vec<usize> = chunks.iter().map(Bytes::len).collect();
        assert_eq!(sizes, vec![UPLOAD_CHUNK_SIZE, UPLOAD_CHUNK_SIZE, 5]);
    }

    #[tokio::test]
    async fn test_send_progress_reports_running_total() {
        let (sink, mut receiver) = EventSink::channel();
        let stream = chunked(Bytes::from(vec![1u8; UPLOAD_CHUNK_SIZE + 1]));
        let _: Vec<_> = with_send_progress(stream, TaskId::new(9), Some(65_537), sink)
            .collect()
            .await;

        let mut totals = Vec::new();
        while let Ok((id, event)) = receiver.try_recv() {
            assert_eq!(id, TaskId::new(9));
            if let TransportEvent::SendProgress {
                total_sent,
                total_expected,
                ..
            } = event
            {
                assert_eq!(total_expected, Some(65_537));
                totals.push(total_sent);
            }
        }
        assert_eq!(totals, vec![UPLOAD_CHUNK_SIZE as u64, UPLOAD_CHUNK_SIZE as u64 + 1]);
    }

    #[test]
    fn test_body_headers_detected_case_insensitively() {
        assert!(is_body_header("Content-Type"));
        assert!(is_body_header("content-length"));
        assert!(!is_body_header("Authorization"));
    }

    #[test]
    fn test_credential_headers_detected_case_insensitively() {
        assert!(is_credential_header("Authorization"));
        assert!(is_credential_header("cookie"));
        assert!(is_credential_header("Proxy-Authorization"));
        assert!(!is_credential_header("Accept"));
    }

    #[test]
    fn test_reqwest_method_mapping() {
        assert_eq!(reqwest_method(Method::Put), reqwest::Method::PUT);
        assert_eq!(reqwest_method(Method::Head), reqwest::Method::HEAD);
    }

    #[test]
    fn test_transport_builds_from_default_config() {
        let transport = ReqwestTransport::new(&ClientConfig::default()).unwrap();
        assert_eq!(transport.inner.max_redirects, crate::transport::constants::MAX_REDIRECTS);
    }
}
