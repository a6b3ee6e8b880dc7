// jmap-engine/src/testing.rs
//! Canned-response transport for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::http::{
    BlobDownload, ByteStream, HttpClient, HttpError, HttpErrorKind, RequestContext,
    TransportResponse,
};

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub url: String,
    pub username: String,
    pub body: Value,
    pub accept_language: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedUpload {
    pub url: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

#[derive(Default)]
pub(crate) struct MockTransport {
    session: Option<Value>,
    responses: Mutex<VecDeque<Result<TransportResponse, HttpError>>>,
    upload_response: Option<Value>,
    download: Option<(Vec<u8>, String)>,
    cancel_on_send: Option<CancellationToken>,
    requests: Mutex<Vec<RecordedRequest>>,
    session_requests: Mutex<Vec<String>>,
    uploads: Mutex<Vec<RecordedUpload>>,
    downloads: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session: Value) -> Self {
        self.session = Some(session);
        self
    }

    /// Queue a JMAP response body for the next API call
    pub fn respond(self, body: Value) -> Self {
        self.respond_with(TransportResponse::new(body.to_string()))
    }

    pub fn respond_with(self, response: TransportResponse) -> Self {
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn fail(self, error: HttpError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Cancel `token` once the API call has returned
    pub fn cancel_on_send(mut self, token: CancellationToken) -> Self {
        self.cancel_on_send = Some(token);
        self
    }

    pub fn with_upload_response(mut self, body: Value) -> Self {
        self.upload_response = Some(body);
        self
    }

    pub fn with_download(mut self, body: &[u8], content_type: &str) -> Self {
        self.download = Some((body.to_vec(), content_type.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn session_requests(&self) -> Vec<String> {
        self.session_requests.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for MockTransport {
    async fn post_json(
        &self,
        url: &str,
        username: &str,
        body: Vec<u8>,
        ctx: &RequestContext,
    ) -> Result<TransportResponse, HttpError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            username: username.to_string(),
            body: serde_json::from_slice(&body).unwrap(),
            accept_language: ctx.accept_language.clone(),
        });
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("no canned response left");
        if let Some(token) = &self.cancel_on_send {
            token.cancel();
        }
        next
    }

    async fn get_session(
        &self,
        _url: &str,
        username: &str,
        ctx: &RequestContext,
    ) -> Result<Vec<u8>, HttpError> {
        self.session_requests
            .lock()
            .unwrap()
            .push(username.to_string());
        ctx.check()?;
        match &self.session {
            Some(session) => Ok(session.to_string().into_bytes()),
            None => Err(HttpError::new(HttpErrorKind::ServerResponse, "no session").with_status(404)),
        }
    }

    async fn upload(
        &self,
        url: &str,
        _username: &str,
        content_type: &str,
        body: ByteStream,
        _ctx: &RequestContext,
    ) -> Result<TransportResponse, HttpError> {
        let chunks: Vec<Bytes> = body.try_collect().await?;
        self.uploads.lock().unwrap().push(RecordedUpload {
            url: url.to_string(),
            content_type: content_type.to_string(),
            body: chunks.concat(),
        });
        let response = self
            .upload_response
            .clone()
            .expect("no canned upload response");
        Ok(TransportResponse::new(response.to_string()))
    }

    async fn download(
        &self,
        url: &str,
        _username: &str,
        _ctx: &RequestContext,
    ) -> Result<Option<BlobDownload>, HttpError> {
        self.downloads.lock().unwrap().push(url.to_string());
        Ok(self.download.clone().map(|(body, content_type)| BlobDownload {
            size: Some(body.len() as u64),
            body: stream::iter([Ok(Bytes::from(body))]).boxed(),
            content_type: Some(content_type),
            content_disposition: None,
            cache_control: None,
            language: None,
        }))
    }
}
