// jmap-engine/src/response.rs
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{JmapError, MethodError};
use crate::registry::{Method, ResponseParameters, ERROR_METHOD};
use crate::request::Request;
use crate::types::SessionState;

/// Arguments of one response entry
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResponseBody {
    Known(ResponseParameters),
    Error(MethodError),
    /// A method name missing from the registry, kept verbatim
    Unrecognized(Value),
}

/// One `[methodName, arguments, tag]` entry of a response
#[derive(Debug, Clone, PartialEq)]
pub struct MethodResponse {
    pub name: String,
    pub tag: String,
    pub body: MethodResponseBody,
}

impl MethodResponse {
    fn decode(name: String, parameters: Value, tag: String) -> Result<Self, JmapError> {
        let body = if name == ERROR_METHOD {
            let error = serde_json::from_value(parameters).map_err(|e| {
                invalid_payload(format!("malformed error response tagged '{}'", tag), e)
            })?;
            MethodResponseBody::Error(error)
        } else if let Some(method) = Method::from_name(&name) {
            let parameters = method.decode(parameters).map_err(|e| {
                invalid_payload(format!("malformed {} response tagged '{}'", name, tag), e)
            })?;
            MethodResponseBody::Known(parameters)
        } else {
            MethodResponseBody::Unrecognized(parameters)
        };
        Ok(Self { name, tag, body })
    }

    pub fn is_error(&self) -> bool {
        matches!(self.body, MethodResponseBody::Error(_))
    }
}

fn invalid_payload(reason: String, source: serde_json::Error) -> JmapError {
    JmapError::InvalidResponsePayload {
        reason,
        source: Some(Arc::new(source)),
    }
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(rename = "methodResponses")]
    method_responses: Vec<(String, Value, String)>,
    #[serde(rename = "sessionState")]
    session_state: SessionState,
    #[serde(rename = "createdIds")]
    #[serde(default)]
    created_ids: Option<HashMap<String, String>>,
}

/// A decoded JMAP response
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    method_responses: Vec<MethodResponse>,
    session_state: SessionState,
    created_ids: Option<HashMap<String, String>>,
}

impl Response {
    pub fn parse(body: &[u8]) -> Result<Self, JmapError> {
        let wire: WireResponse = serde_json::from_slice(body)
            .map_err(|e| invalid_payload("response is not a JMAP response object".to_string(), e))?;

        let method_responses = wire
            .method_responses
            .into_iter()
            .map(|(name, parameters, tag)| MethodResponse::decode(name, parameters, tag))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            method_responses,
            session_state: wire.session_state,
            created_ids: wire.created_ids,
        })
    }

    pub fn session_state(&self) -> &SessionState {
        &self.session_state
    }

    pub fn method_responses(&self) -> &[MethodResponse] {
        &self.method_responses
    }

    pub fn created_ids(&self) -> Option<&HashMap<String, String>> {
        self.created_ids.as_ref()
    }

    /// Find the single response to `method` under `tag`.
    ///
    /// When the tag carries no such response, an `error` entry under the same
    /// tag takes its place and is returned as [`JmapError::Method`]. An `error`
    /// next to a real response belongs to an implicit call and is not matched.
    pub fn match_one(&self, method: Method, tag: &str) -> Result<&ResponseParameters, JmapError> {
        let tagged = || self.method_responses.iter().filter(move |r| r.tag == tag);
        let mut matches = tagged().filter(|r| r.name == method.name());

        let found = match matches.next() {
            Some(found) => {
                if matches.next().is_some() {
                    return Err(JmapError::response(format!(
                        "more than one {} response tagged '{}'",
                        method, tag
                    )));
                }
                found
            }
            None => tagged().find(|r| r.name == ERROR_METHOD).ok_or_else(|| {
                JmapError::response(format!("no {} response tagged '{}'", method, tag))
            })?,
        };

        match &found.body {
            MethodResponseBody::Known(parameters) => Ok(parameters),
            MethodResponseBody::Error(error) => {
                warn!(
                    tag,
                    error_type = %error.type_,
                    description = error.description.as_deref().unwrap_or_default(),
                    "method level error in response"
                );
                Err(JmapError::Method(error.clone()))
            }
            MethodResponseBody::Unrecognized(_) => Err(JmapError::response(format!(
                "{} response tagged '{}' could not be decoded",
                method, tag
            ))),
        }
    }

    /// Typed form of [`Response::match_one`]
    pub fn get<T>(&self, method: Method, tag: &str) -> Result<T, JmapError>
    where
        T: TryFrom<ResponseParameters, Error = Method>,
    {
        let parameters = self.match_one(method, tag)?.clone();
        T::try_from(parameters).map_err(|actual| {
            JmapError::response(format!(
                "{} response tagged '{}' does not have the shape of {}",
                actual, tag, method
            ))
        })
    }

    /// Check that every entry answers an invocation of `request`.
    ///
    /// An entry must carry the tag of an invocation and either that
    /// invocation's method name, `error`, or a registered implicit companion
    /// of that method. Each (name, tag) pair may appear once.
    pub fn correlate(&self, request: &Request) -> Result<(), JmapError> {
        let mut seen = HashSet::new();
        for response in &self.method_responses {
            let invocation = request.invocation(&response.tag).ok_or_else(|| {
                JmapError::response(format!(
                    "{} response tagged '{}' does not match any invocation",
                    response.name, response.tag
                ))
            })?;

            let expected = response.name == invocation.method().name()
                || response.name == ERROR_METHOD
                || Method::from_name(&response.name)
                    .is_some_and(|m| m.is_companion_of(invocation.method()));
            if !expected {
                return Err(JmapError::response(format!(
                    "unexpected {} response tagged '{}' for a {} invocation",
                    response.name,
                    response.tag,
                    invocation.method()
                )));
            }

            if !seen.insert((response.name.as_str(), response.tag.as_str())) {
                return Err(JmapError::response(format!(
                    "duplicate {} response tagged '{}'",
                    response.name, response.tag
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::request::{Invocation, RequestBuilder};
    use crate::types::{GetResponse, Mailbox, QueryResponse, SetResponse, Email, EmailSubmission};
    use serde_json::json;

    fn parse(value: Value) -> Response {
        Response::parse(&serde_json::to_vec(&value).unwrap()).unwrap()
    }

    #[test]
    fn test_parse_keeps_order_and_state() {
        let response = parse(json!({
            "methodResponses": [
                ["Email/query", {"accountId": "a", "ids": ["m1"]}, "0"],
                ["Mailbox/get", {"accountId": "a", "state": "s", "list": []}, "1"]
            ],
            "sessionState": "abc",
            "createdIds": {"k": "v"}
        }));
        assert_eq!(response.session_state().as_str(), "abc");
        assert_eq!(response.method_responses().len(), 2);
        assert_eq!(response.method_responses()[1].name, "Mailbox/get");
        assert_eq!(response.created_ids().unwrap()["k"], "v");
    }

    #[test]
    fn test_parse_tolerates_unknown_methods() {
        let response = parse(json!({
            "methodResponses": [["Sieve/get", {"whatever": 1}, "0"]],
            "sessionState": "abc"
        }));
        assert!(matches!(
            response.method_responses()[0].body,
            MethodResponseBody::Unrecognized(_)
        ));
    }

    #[test]
    fn test_parse_failures_are_payload_errors() {
        for body in [&b"not json"[..], br#"{"methodResponses": [["a", {}]], "sessionState": "x"}"#] {
            let err = Response::parse(body).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidResponsePayload);
        }
        let bad_shape = Response::parse(
            br#"{"methodResponses": [["Email/query", {"ids": 3}, "0"]], "sessionState": "x"}"#,
        )
        .unwrap_err();
        assert_eq!(bad_shape.code(), ErrorCode::InvalidResponsePayload);
    }

    #[test]
    fn test_match_one_by_method_and_tag() {
        let response = parse(json!({
            "methodResponses": [
                ["Email/query", {"accountId": "a", "ids": ["m1"]}, "0"],
                ["Email/query", {"accountId": "a", "ids": ["m2"]}, "1"],
                ["Mailbox/get", {"accountId": "a", "state": "s", "list": []}, "0"]
            ],
            "sessionState": "abc"
        }));

        let first: QueryResponse<Email> = response.get(Method::EmailQuery, "0").unwrap();
        let second: QueryResponse<Email> = response.get(Method::EmailQuery, "1").unwrap();
        let mailboxes: GetResponse<Mailbox> = response.get(Method::MailboxGet, "0").unwrap();
        assert_eq!(first.ids, vec!["m1".to_string()]);
        assert_eq!(second.ids, vec!["m2".to_string()]);
        assert_eq!(mailboxes.state.as_str(), "s");

        let missing = response.match_one(Method::EmailQuery, "2").unwrap_err();
        assert_eq!(missing.code(), ErrorCode::InvalidResponsePayload);
        let missing = response.match_one(Method::MailboxGet, "1").unwrap_err();
        assert_eq!(missing.code(), ErrorCode::InvalidResponsePayload);
    }

    #[test]
    fn test_match_one_returns_method_error() {
        let response = parse(json!({
            "methodResponses": [
                ["error", {"type": "accountNotFound", "description": "no such account"}, "0"]
            ],
            "sessionState": "abc"
        }));
        match response.match_one(Method::EmailGet, "0") {
            Err(JmapError::Method(e)) => {
                assert_eq!(e.type_, "accountNotFound");
                assert_eq!(e.description.as_deref(), Some("no such account"));
                assert_eq!(e.code(), ErrorCode::AccountNotFound);
            }
            other => panic!("Expected method error, got {:?}", other),
        }
    }

    #[test]
    fn test_match_one_rejects_duplicates() {
        let response = parse(json!({
            "methodResponses": [
                ["Email/query", {"accountId": "a", "ids": []}, "0"],
                ["Email/query", {"accountId": "a", "ids": []}, "0"]
            ],
            "sessionState": "abc"
        }));
        assert!(response.match_one(Method::EmailQuery, "0").is_err());
    }

    #[test]
    fn test_match_one_prefers_response_over_error() {
        let response = parse(json!({
            "methodResponses": [
                ["EmailSubmission/set", {"accountId": "a", "created": {"s0": {"id": "sub1"}}}, "0"],
                ["error", {"type": "serverFail"}, "0"]
            ],
            "sessionState": "abc"
        }));

        let submission: SetResponse<EmailSubmission> =
            response.get(Method::EmailSubmissionSet, "0").unwrap();
        assert!(submission.created.unwrap().contains_key("s0"));
        match response.match_one(Method::EmailSet, "0") {
            Err(JmapError::Method(e)) => assert_eq!(e.code(), ErrorCode::ServerFail),
            other => panic!("Expected method error, got {:?}", other),
        }
    }

    #[test]
    fn test_implicit_companion_shares_tag() {
        let request = RequestBuilder::new()
            .call(Invocation::new(Method::EmailSubmissionSet, &json!({"accountId": "a"}), "0").unwrap())
            .build()
            .unwrap();
        let response = parse(json!({
            "methodResponses": [
                ["EmailSubmission/set", {"accountId": "a", "created": {"s0": {"id": "sub1"}}}, "0"],
                ["Email/set", {"accountId": "a", "updated": {"m1": null}}, "0"]
            ],
            "sessionState": "abc"
        }));
        response.correlate(&request).unwrap();

        let submission: SetResponse<EmailSubmission> =
            response.get(Method::EmailSubmissionSet, "0").unwrap();
        let email: SetResponse<Email> = response.get(Method::EmailSet, "0").unwrap();
        assert!(submission.created.unwrap().contains_key("s0"));
        assert!(email.updated.unwrap().contains_key("m1"));
    }

    #[test]
    fn test_correlate_flags_unexpected_entries() {
        let request = RequestBuilder::new()
            .call(Invocation::new(Method::EmailGet, &json!({"accountId": "a"}), "0").unwrap())
            .build()
            .unwrap();

        let stray_tag = parse(json!({
            "methodResponses": [["Email/get", {"accountId": "a", "list": []}, "9"]],
            "sessionState": "abc"
        }));
        assert!(stray_tag.correlate(&request).is_err());

        let unseen_companion = parse(json!({
            "methodResponses": [
                ["Email/get", {"accountId": "a", "list": []}, "0"],
                ["Mailbox/get", {"accountId": "a", "list": []}, "0"]
            ],
            "sessionState": "abc"
        }));
        assert!(unseen_companion.correlate(&request).is_err());

        let with_error = parse(json!({
            "methodResponses": [["error", {"type": "serverFail"}, "0"]],
            "sessionState": "abc"
        }));
        assert!(with_error.correlate(&request).is_ok());
    }
}
