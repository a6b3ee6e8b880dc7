// jmap-engine/src/client.rs
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::cache::SessionLoader;
use crate::error::JmapError;
use crate::events::{SessionEventListener, SessionListeners, SessionOutdated};
use crate::http::{HttpClient, RequestContext};
use crate::request::{Invocation, Request, RequestBuilder};
use crate::response::Response;
use crate::session::{Session, SessionResponse};
use crate::types::SessionState;

/// A decoded result together with what the server said about the round trip
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    pub value: T,
    pub session_state: SessionState,
    /// `Content-Language` of the response, if the server sent one
    pub language: Option<String>,
}

impl<T> Reply<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reply<U> {
        Reply {
            value: f(self.value),
            session_state: self.session_state,
            language: self.language,
        }
    }
}

/// Tag of one account's share of a multi-account request, e.g. `a1:I`
pub(crate) fn account_tag(account_id: &str, tag: &str) -> String {
    format!("{}:{}", account_id, tag)
}

/// Distinct account ids in first-seen order
pub(crate) fn unique_accounts<S: AsRef<str>>(account_ids: &[S]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    account_ids
        .iter()
        .map(|id| id.as_ref())
        .filter(|id| seen.insert(*id))
        .map(String::from)
        .collect()
}

/// Resolve each id against the primary mail account, then deduplicate.
/// An empty list means the primary mail account alone.
pub(crate) fn mail_accounts<S: AsRef<str>>(session: &Session, account_ids: &[S]) -> Vec<String> {
    if account_ids.is_empty() {
        return vec![session.mail_account_id("").to_string()];
    }
    let resolved: Vec<&str> = account_ids
        .iter()
        .map(|id| session.mail_account_id(id.as_ref()))
        .collect();
    unique_accounts(&resolved)
}

pub struct JmapClient<C: HttpClient> {
    http: C,
    session_url: String,
    session_timeout: Option<Duration>,
    listeners: SessionListeners,
}

impl<C: HttpClient> JmapClient<C> {
    pub fn new(http: C, session_url: impl Into<String>) -> Self {
        Self {
            http,
            session_url: session_url.into(),
            session_timeout: None,
            listeners: SessionListeners::default(),
        }
    }

    /// Deadline for session fetches made on behalf of a [`SessionCache`](crate::cache::SessionCache)
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    pub fn http(&self) -> &C {
        &self.http
    }

    pub fn session_url(&self) -> &str {
        &self.session_url
    }

    pub fn add_session_event_listener(&self, listener: Arc<dyn SessionEventListener>) {
        self.listeners.add(listener);
    }

    /// Retrieve and validate the well-known session document for `username`
    pub async fn fetch_session(
        &self,
        username: &str,
        ctx: &RequestContext,
    ) -> Result<Session, JmapError> {
        let body = self
            .http
            .get_session(&self.session_url, username, ctx)
            .await
            .map_err(|e| {
                error!(username, error = %e, "failed to fetch session");
                JmapError::from(e)
            })?;
        let response: SessionResponse = serde_json::from_slice(&body).map_err(|e| {
            error!(username, error = %e, "failed to decode session response");
            JmapError::decoding(e)
        })?;
        Session::from_response(response).inspect_err(|e| {
            error!(username, error = %e, "rejected session response");
        })
    }

    /// Build a request bounded by the session's `maxCallsInRequest`
    pub fn request(
        &self,
        session: &Session,
        invocations: impl IntoIterator<Item = Invocation>,
    ) -> Result<Request, JmapError> {
        RequestBuilder::new()
            .max_calls(session.max_calls_in_request())
            .calls(invocations)
            .build()
            .inspect_err(|e| warn!(username = session.username(), error = %e, "invalid request"))
    }

    /// One request/response round trip.
    ///
    /// Sends `request` to the session's API URL, parses and correlates the
    /// response, signals listeners when the session state moved, and hands the
    /// response to `decode`. Errors are returned as they are; nothing is retried.
    pub async fn command<T, F>(
        &self,
        operation: &'static str,
        session: &Session,
        ctx: &RequestContext,
        request: Request,
        decode: F,
    ) -> Result<Reply<T>, JmapError>
    where
        F: FnOnce(&Response) -> Result<T, JmapError>,
    {
        let username = session.username();
        let body = request.to_json()?;
        debug!(
            operation,
            username,
            calls = request.invocations().len(),
            "sending request"
        );

        let sent = self
            .http
            .post_json(session.api_url().as_str(), username, body, ctx)
            .await;
        let transport = sent.map_err(|e| {
            error!(operation, username, error = %e, "request failed");
            JmapError::from(e)
        })?;
        // the caller may have given up while the response was in flight
        ctx.check()?;

        let response = Response::parse(&transport.body).inspect_err(|e| {
            error!(operation, username, error = %e, "failed to decode response");
        })?;

        if response.session_state() != session.state() {
            self.session_outdated(session, &request, response.session_state());
        }

        response.correlate(&request).inspect_err(|e| {
            error!(operation, username, error = %e, "response does not match request");
        })?;

        let value = decode(&response).inspect_err(|e| match e {
            JmapError::Method(m) => warn!(
                operation,
                username,
                session_state = %response.session_state(),
                error_type = %m.type_,
                "method level error"
            ),
            _ => error!(operation, username, error = %e, "failed to map response"),
        })?;

        Ok(Reply {
            value,
            session_state: response.session_state().clone(),
            language: transport.language,
        })
    }

    fn session_outdated(&self, session: &Session, request: &Request, new_state: &SessionState) {
        let event = SessionOutdated {
            username: session.username().to_string(),
            account_ids: request.account_ids(),
            previous_state: session.state().clone(),
            new_state: new_state.clone(),
        };
        self.listeners.signal(&event);
    }
}

#[async_trait]
impl<C: HttpClient> SessionLoader for JmapClient<C> {
    async fn load(&self, username: &str) -> Result<Session, JmapError> {
        // shared by every caller waiting on this user, so no single caller's context applies
        let ctx = match self.session_timeout {
            Some(timeout) => RequestContext::new().with_timeout(timeout),
            None => RequestContext::new(),
        };
        self.fetch_session(username, &ctx).await
    }
}
