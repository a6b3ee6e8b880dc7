// jmap-engine/src/http/mod.rs
use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// What went wrong on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    AuthenticationFailed,
    InvalidRequest,
    ServerResponse,
    ReadingBody,
    Sending,
    Cancelled,
    Timeout,
}

/// Error from HTTP request
#[derive(Debug, Clone)]
pub struct HttpError {
    pub kind: HttpErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl HttpError {
    pub fn new(kind: HttpErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn cancelled() -> Self {
        Self::new(HttpErrorKind::Cancelled, "request was cancelled")
    }

    pub fn timeout() -> Self {
        Self::new(HttpErrorKind::Timeout, "request deadline exceeded")
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(status) = self.status {
            write!(f, "HTTP error {}: {}", status, self.message)
        } else {
            write!(f, "HTTP error: {}", self.message)
        }
    }
}

impl std::error::Error for HttpError {}

/// Per-call cancellation, deadline and language preferences.
///
/// Cloning shares the cancellation token, so cancelling a clone cancels the
/// original too.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub cancellation: CancellationToken,
    pub deadline: Option<Instant>,
    pub accept_language: Option<String>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            cancellation: CancellationToken::new(),
            deadline: None,
            accept_language: None,
        }
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_accept_language(mut self, language: impl Into<String>) -> Self {
        self.accept_language = Some(language.into());
        self
    }

    /// Fails if the caller gave up, either explicitly or by deadline.
    pub fn check(&self) -> Result<(), HttpError> {
        if self.cancellation.is_cancelled() {
            return Err(HttpError::cancelled());
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(HttpError::timeout()),
            _ => Ok(()),
        }
    }

    /// Drive `fut` to completion unless the context is cancelled or expires first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, HttpError>
    where
        F: Future<Output = Result<T, HttpError>>,
    {
        self.check()?;
        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = self.cancellation.cancelled() => Err(HttpError::cancelled()),
            _ = expired => Err(HttpError::timeout()),
            result = fut => result,
        }
    }

    /// Tie a response body to this context: once it is cancelled or expires the
    /// stream yields one error and ends.
    pub fn bind_stream(&self, body: ByteStream) -> ByteStream {
        let token = self.cancellation.clone();
        let deadline = self.deadline;
        let stopped: BoxFuture<'static, HttpError> = async move {
            match deadline {
                Some(deadline) => tokio::select! {
                    _ = token.cancelled() => HttpError::cancelled(),
                    _ = tokio::time::sleep_until(deadline) => HttpError::timeout(),
                },
                None => {
                    token.cancelled().await;
                    HttpError::cancelled()
                }
            }
        }
        .boxed();

        stream::unfold(Some((body, stopped)), |state| async move {
            let (mut body, mut stopped) = state?;
            tokio::select! {
                biased;
                error = &mut stopped => Some((Err(error), None)),
                item = body.next() => item.map(|item| (item, Some((body, stopped)))),
            }
        })
        .boxed()
    }
}

/// Raw body of a successful API or upload call
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub body: Vec<u8>,
    /// Value of the `Content-Language` response header, if any
    pub language: Option<String>,
}

impl TransportResponse {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            language: None,
        }
    }
}

pub type ByteStream = BoxStream<'static, Result<Bytes, HttpError>>;

/// A blob being streamed down from the server
pub struct BlobDownload {
    pub body: ByteStream,
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
    pub language: Option<String>,
}

impl fmt::Debug for BlobDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobDownload")
            .field("size", &self.size)
            .field("content_type", &self.content_type)
            .field("content_disposition", &self.content_disposition)
            .field("cache_control", &self.cache_control)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

/// Generic HTTP client trait - users can implement their own
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// POST a JMAP request body to the API URL on behalf of `username`
    async fn post_json(
        &self,
        url: &str,
        username: &str,
        body: Vec<u8>,
        ctx: &RequestContext,
    ) -> Result<TransportResponse, HttpError>;

    /// GET the well-known session document for `username`
    async fn get_session(
        &self,
        url: &str,
        username: &str,
        ctx: &RequestContext,
    ) -> Result<Vec<u8>, HttpError>;

    /// Stream `body` to an expanded upload URL
    async fn upload(
        &self,
        url: &str,
        _username: &str,
        _content_type: &str,
        _body: ByteStream,
        _ctx: &RequestContext,
    ) -> Result<TransportResponse, HttpError> {
        Err(HttpError::new(
            HttpErrorKind::InvalidRequest,
            format!("blob upload to {} is not supported by this client", url),
        ))
    }

    /// Stream a blob from an expanded download URL, `None` when it does not exist
    async fn download(
        &self,
        url: &str,
        _username: &str,
        _ctx: &RequestContext,
    ) -> Result<Option<BlobDownload>, HttpError> {
        Err(HttpError::new(
            HttpErrorKind::InvalidRequest,
            format!("blob download from {} is not supported by this client", url),
        ))
    }
}

#[cfg(feature = "reqwest")]
pub mod reqwest;

#[cfg(feature = "reqwest")]
pub use self::reqwest::{Credentials, ReqwestClient};
