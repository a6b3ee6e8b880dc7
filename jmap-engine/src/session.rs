// jmap-engine/src/session.rs
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{JmapError, SessionProblem};
use crate::registry::Capability;
use crate::types::SessionState;

/// Account id callers pass to mean "the user's primary account"
pub const DEFAULT_ACCOUNT_ID: &str = "*";

/// JMAP Session response (RFC 8620 Section 2), as served by the well-known endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionResponse {
    #[serde(default)]
    pub capabilities: HashMap<String, Value>,
    #[serde(default)]
    pub accounts: HashMap<String, AccountData>,
    #[serde(rename = "primaryAccounts")]
    #[serde(default)]
    pub primary_accounts: HashMap<String, String>,
    #[serde(default)]
    pub username: String,
    /// The URL to use for JMAP API requests
    #[serde(rename = "apiUrl")]
    #[serde(default)]
    pub api_url: String,
    /// Download URL template for binary data
    #[serde(rename = "downloadUrl")]
    #[serde(default)]
    pub download_url: String,
    /// Upload URL template for files
    #[serde(rename = "uploadUrl")]
    #[serde(default)]
    pub upload_url: String,
    /// Event source URL for push notifications
    #[serde(rename = "eventSourceUrl")]
    #[serde(default)]
    pub event_source_url: Option<String>,
    #[serde(default)]
    pub state: SessionState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "isPersonal")]
    #[serde(default)]
    pub is_personal: Option<bool>,
    #[serde(rename = "isReadOnly")]
    #[serde(default)]
    pub is_read_only: Option<bool>,
    #[serde(rename = "accountCapabilities")]
    #[serde(default)]
    pub account_capabilities: Option<HashMap<String, Value>>,
}

/// Limits advertised under `urn:ietf:params:jmap:core`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreCapability {
    #[serde(rename = "maxSizeUpload", default)]
    pub max_size_upload: Option<u64>,
    #[serde(rename = "maxConcurrentUpload", default)]
    pub max_concurrent_upload: Option<u64>,
    #[serde(rename = "maxSizeRequest", default)]
    pub max_size_request: Option<u64>,
    #[serde(rename = "maxConcurrentRequests", default)]
    pub max_concurrent_requests: Option<u64>,
    #[serde(rename = "maxCallsInRequest", default)]
    pub max_calls_in_request: Option<u64>,
    #[serde(rename = "maxObjectsInGet", default)]
    pub max_objects_in_get: Option<u64>,
    #[serde(rename = "maxObjectsInSet", default)]
    pub max_objects_in_set: Option<u64>,
    #[serde(rename = "collationAlgorithms", default)]
    pub collation_algorithms: Vec<String>,
}

/// A validated, immutable view of one user's session.
///
/// Never updated in place: a newer state means fetching a new `Session`.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    username: String,
    api_url: Url,
    upload_url_template: String,
    download_url_template: String,
    event_source_url: Option<String>,
    mail_account_id: String,
    primary_accounts: HashMap<String, String>,
    accounts: HashMap<String, AccountData>,
    core: CoreCapability,
    state: SessionState,
}

impl Session {
    pub fn from_response(response: SessionResponse) -> Result<Self, JmapError> {
        if response.username.is_empty() {
            return Err(SessionProblem::MissingUsername.into());
        }
        if response.api_url.is_empty() {
            return Err(SessionProblem::MissingApiUrl.into());
        }
        let api_url =
            Url::parse(&response.api_url).map_err(|_| SessionProblem::InvalidApiUrl)?;
        if response.upload_url.is_empty() {
            return Err(SessionProblem::MissingUploadUrl.into());
        }
        if response.download_url.is_empty() {
            return Err(SessionProblem::MissingDownloadUrl.into());
        }
        let mail_account_id = response
            .primary_accounts
            .get(Capability::Mail.urn())
            .filter(|id| !id.is_empty())
            .cloned()
            .ok_or(SessionProblem::MissingMailAccount)?;
        let core = match response.capabilities.get(Capability::Core.urn()) {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|_| SessionProblem::MalformedCoreCapability)?,
            None => CoreCapability::default(),
        };

        Ok(Self {
            username: response.username,
            api_url,
            upload_url_template: response.upload_url,
            download_url_template: response.download_url,
            event_source_url: response.event_source_url,
            mail_account_id,
            primary_accounts: response.primary_accounts,
            accounts: response.accounts,
            core,
            state: response.state,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    pub fn upload_url_template(&self) -> &str {
        &self.upload_url_template
    }

    pub fn download_url_template(&self) -> &str {
        &self.download_url_template
    }

    pub fn event_source_url(&self) -> Option<&str> {
        self.event_source_url.as_deref()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn core_capability(&self) -> &CoreCapability {
        &self.core
    }

    pub fn max_calls_in_request(&self) -> Option<u64> {
        self.core.max_calls_in_request
    }

    pub fn accounts(&self) -> &HashMap<String, AccountData> {
        &self.accounts
    }

    pub fn primary_account(&self, capability: Capability) -> Option<&str> {
        self.primary_accounts
            .get(capability.urn())
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    /// `account_id` unless it is empty or [`DEFAULT_ACCOUNT_ID`], else the primary mail account
    pub fn mail_account_id<'a>(&'a self, account_id: &'a str) -> &'a str {
        explicit(account_id).unwrap_or(&self.mail_account_id)
    }

    pub fn submission_account_id<'a>(&'a self, account_id: &'a str) -> &'a str {
        explicit(account_id)
            .or_else(|| self.primary_account(Capability::Submission))
            .unwrap_or(&self.mail_account_id)
    }

    pub fn blob_account_id<'a>(&'a self, account_id: &'a str) -> &'a str {
        explicit(account_id)
            .or_else(|| self.primary_account(Capability::Blob))
            .unwrap_or(&self.mail_account_id)
    }

    pub fn account_id<'a>(&'a self, capability: Capability, account_id: &'a str) -> &'a str {
        explicit(account_id)
            .or_else(|| self.primary_account(capability))
            .unwrap_or(&self.mail_account_id)
    }
}

fn explicit(account_id: &str) -> Option<&str> {
    (!account_id.is_empty() && account_id != DEFAULT_ACCOUNT_ID).then_some(account_id)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn session_json() -> Value {
        json!({
            "capabilities": {
                "urn:ietf:params:jmap:core": {
                    "maxSizeUpload": 50000000,
                    "maxCallsInRequest": 16,
                    "maxObjectsInGet": 500,
                    "collationAlgorithms": ["i;ascii-casemap"]
                },
                "urn:ietf:params:jmap:mail": {}
            },
            "accounts": {
                "cs": {"name": "camina@example.org", "isPersonal": true, "isReadOnly": false}
            },
            "primaryAccounts": {
                "urn:ietf:params:jmap:mail": "cs",
                "urn:ietf:params:jmap:submission": "cs",
                "urn:ietf:params:jmap:blob": "cs"
            },
            "username": "camina",
            "apiUrl": "https://jmap.example.org/jmap/",
            "downloadUrl": "https://jmap.example.org/download/{accountId}/{blobId}/{name}?accept={type}",
            "uploadUrl": "https://jmap.example.org/upload/{accountId}/",
            "eventSourceUrl": "https://jmap.example.org/eventsource/",
            "state": "3e25b2a0"
        })
    }

    pub(crate) fn test_session() -> Session {
        let response: SessionResponse = serde_json::from_value(session_json()).unwrap();
        Session::from_response(response).unwrap()
    }

    fn problem_for(mutate: impl FnOnce(&mut Value)) -> SessionProblem {
        let mut value = session_json();
        mutate(&mut value);
        let response: SessionResponse = serde_json::from_value(value).unwrap();
        match Session::from_response(response) {
            Err(JmapError::InvalidSessionResponse(problem)) => problem,
            other => panic!("Expected invalid session, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_session() {
        let session = test_session();
        assert_eq!(session.username(), "camina");
        assert_eq!(session.api_url().as_str(), "https://jmap.example.org/jmap/");
        assert_eq!(session.state().as_str(), "3e25b2a0");
        assert_eq!(session.max_calls_in_request(), Some(16));
        assert_eq!(session.core_capability().max_objects_in_get, Some(500));
    }

    #[test]
    fn test_missing_fields() {
        assert_eq!(
            problem_for(|v| v["username"] = json!("")),
            SessionProblem::MissingUsername
        );
        assert_eq!(
            problem_for(|v| {
                v.as_object_mut().unwrap().remove("apiUrl");
            }),
            SessionProblem::MissingApiUrl
        );
        assert_eq!(
            problem_for(|v| v["apiUrl"] = json!("not a url")),
            SessionProblem::InvalidApiUrl
        );
        assert_eq!(
            problem_for(|v| v["uploadUrl"] = json!("")),
            SessionProblem::MissingUploadUrl
        );
        assert_eq!(
            problem_for(|v| v["downloadUrl"] = json!("")),
            SessionProblem::MissingDownloadUrl
        );
        assert_eq!(
            problem_for(|v| v["primaryAccounts"] = json!({})),
            SessionProblem::MissingMailAccount
        );
        assert_eq!(
            problem_for(|v| v["capabilities"]["urn:ietf:params:jmap:core"] =
                json!({"maxCallsInRequest": "many"})),
            SessionProblem::MalformedCoreCapability
        );
    }

    #[test]
    fn test_account_resolution() {
        let session = test_session();
        assert_eq!(session.mail_account_id(""), "cs");
        assert_eq!(session.mail_account_id(DEFAULT_ACCOUNT_ID), "cs");
        assert_eq!(session.mail_account_id("other"), "other");
        assert_eq!(session.submission_account_id(""), "cs");
        assert_eq!(session.account_id(Capability::Contacts, ""), "cs");
        assert_eq!(session.account_id(Capability::Contacts, "book"), "book");
    }

    #[test]
    fn test_blob_account_falls_back_to_mail() {
        let mut value = session_json();
        value["primaryAccounts"] = json!({"urn:ietf:params:jmap:mail": "m"});
        let response: SessionResponse = serde_json::from_value(value).unwrap();
        let session = Session::from_response(response).unwrap();
        assert_eq!(session.blob_account_id("*"), "m");
        assert_eq!(session.primary_account(Capability::Blob), None);
    }
}
