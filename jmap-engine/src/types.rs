// jmap-engine/src/types.rs
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{JmapError, SetError};

/// Opaque per-type state string (`state`, `newState`, `queryState`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(String);

/// Opaque token versioning the whole session
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionState(String);

macro_rules! string_newtype {
    ($($name:ident),+) => {
        $(
            impl $name {
                pub fn new(value: impl Into<String>) -> Self {
                    Self(value.into())
                }

                pub fn as_str(&self) -> &str {
                    &self.0
                }
            }

            impl From<&str> for $name {
                fn from(value: &str) -> Self {
                    Self(value.to_string())
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }
        )+
    };
}

string_newtype!(State, SessionState);

// Method response shapes

/// `Foo/get` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct GetResponse<T> {
    #[serde(rename = "accountId")]
    pub account_id: String,
    #[serde(default)]
    pub state: State,
    #[serde(default)]
    pub list: Vec<T>,
    #[serde(rename = "notFound")]
    #[serde(default)]
    pub not_found: Vec<String>,
}

/// `Foo/query` response; `T` only ties it to the queried object type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct QueryResponse<T> {
    #[serde(rename = "accountId")]
    pub account_id: String,
    #[serde(rename = "queryState")]
    #[serde(default)]
    pub query_state: State,
    #[serde(rename = "canCalculateChanges")]
    #[serde(default)]
    pub can_calculate_changes: bool,
    #[serde(default)]
    pub position: u64,
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(skip)]
    _object: PhantomData<fn() -> T>,
}

/// `Foo/changes` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ChangesResponse<T> {
    #[serde(rename = "accountId")]
    pub account_id: String,
    #[serde(rename = "oldState")]
    pub old_state: State,
    #[serde(rename = "newState")]
    pub new_state: State,
    #[serde(rename = "hasMoreChanges")]
    #[serde(default)]
    pub has_more_changes: bool,
    #[serde(default)]
    pub created: Vec<String>,
    #[serde(default)]
    pub updated: Vec<String>,
    #[serde(default)]
    pub destroyed: Vec<String>,
    #[serde(skip)]
    _object: PhantomData<fn() -> T>,
}

/// `Foo/set` response with per-object outcomes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct SetResponse<T> {
    #[serde(rename = "accountId")]
    pub account_id: String,
    #[serde(rename = "oldState")]
    #[serde(default)]
    pub old_state: Option<State>,
    #[serde(rename = "newState")]
    #[serde(default)]
    pub new_state: Option<State>,
    #[serde(default)]
    pub created: Option<HashMap<String, T>>,
    #[serde(default)]
    pub updated: Option<HashMap<String, Option<Value>>>,
    #[serde(default)]
    pub destroyed: Option<Vec<String>>,
    #[serde(rename = "notCreated")]
    #[serde(default)]
    pub not_created: Option<HashMap<String, SetError>>,
    #[serde(rename = "notUpdated")]
    #[serde(default)]
    pub not_updated: Option<HashMap<String, SetError>>,
    #[serde(rename = "notDestroyed")]
    #[serde(default)]
    pub not_destroyed: Option<HashMap<String, SetError>>,
}

impl<T> SetResponse<T> {
    /// Take the object created under `creation_id`, or the server's reason for refusing it
    pub fn take_created(
        &mut self,
        object_type: &'static str,
        creation_id: &str,
    ) -> Result<T, JmapError> {
        if let Some(error) = self
            .not_created
            .as_mut()
            .and_then(|m| m.remove(creation_id))
        {
            return Err(JmapError::Set {
                object_type,
                id: creation_id.to_string(),
                error,
            });
        }
        self.created
            .as_mut()
            .and_then(|m| m.remove(creation_id))
            .ok_or_else(|| {
                JmapError::response(format!(
                    "{} set response has no outcome for creation id '{}'",
                    object_type, creation_id
                ))
            })
    }
}

/// Per-object result of a batched create/update/destroy
#[derive(Debug, Clone, PartialEq)]
pub struct SetOutcome<T> {
    pub created: HashMap<String, T>,
    pub updated: Vec<String>,
    pub destroyed: Vec<String>,
    pub not_created: HashMap<String, SetError>,
    pub not_updated: HashMap<String, SetError>,
    pub not_destroyed: HashMap<String, SetError>,
    pub new_state: Option<State>,
}

impl<T> From<SetResponse<T>> for SetOutcome<T> {
    fn from(r: SetResponse<T>) -> Self {
        Self {
            created: r.created.unwrap_or_default(),
            updated: r
                .updated
                .map(|m| m.into_keys().collect())
                .unwrap_or_default(),
            destroyed: r.destroyed.unwrap_or_default(),
            not_created: r.not_created.unwrap_or_default(),
            not_updated: r.not_updated.unwrap_or_default(),
            not_destroyed: r.not_destroyed.unwrap_or_default(),
            new_state: r.new_state,
        }
    }
}

impl<T> SetOutcome<T> {
    pub fn is_complete(&self) -> bool {
        self.not_created.is_empty() && self.not_updated.is_empty() && self.not_destroyed.is_empty()
    }
}

/// `Email/import` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailImportResponse {
    #[serde(rename = "accountId")]
    pub account_id: String,
    #[serde(rename = "oldState")]
    #[serde(default)]
    pub old_state: Option<State>,
    #[serde(rename = "newState")]
    pub new_state: State,
    #[serde(default)]
    pub created: Option<HashMap<String, Email>>,
    #[serde(rename = "notCreated")]
    #[serde(default)]
    pub not_created: Option<HashMap<String, SetError>>,
}

/// `CalendarEvent/parse` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEventParseResponse {
    #[serde(rename = "accountId")]
    pub account_id: String,
    #[serde(default)]
    pub parsed: Option<HashMap<String, Vec<CalendarEvent>>>,
    #[serde(rename = "notParsable")]
    #[serde(default)]
    pub not_parsable: Option<Vec<String>>,
    #[serde(rename = "notFound")]
    #[serde(default)]
    pub not_found: Option<Vec<String>>,
}

// Request arguments

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparator {
    pub property: String,
    #[serde(rename = "isAscending")]
    pub is_ascending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
}

impl Comparator {
    pub fn descending(property: &str) -> Self {
        Self {
            property: property.to_string(),
            is_ascending: false,
            collation: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailFilterCondition {
    #[serde(rename = "inMailbox")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_mailbox: Option<String>,
    #[serde(rename = "inMailboxOtherThan")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_mailbox_other_than: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<DateTime<Utc>>,
    #[serde(rename = "hasKeyword")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_keyword: Option<String>,
    #[serde(rename = "notKeyword")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_keyword: Option<String>,
    #[serde(rename = "hasAttachment")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_attachment: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MailboxFilterCondition {
    #[serde(rename = "parentId")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(rename = "hasAnyRole")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_any_role: Option<bool>,
    #[serde(rename = "isSubscribed")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_subscribed: Option<bool>,
}

// Mail objects

/// JMAP Email object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Email {
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "blobId")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_id: Option<String>,
    #[serde(rename = "threadId")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(rename = "mailboxIds")]
    #[serde(default)]
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub mailbox_ids: HashMap<String, bool>,
    #[serde(default)]
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub keywords: HashMap<String, bool>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(rename = "receivedAt")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(rename = "messageId")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Vec<String>>,
    #[serde(rename = "inReplyTo")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<Vec<String>>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Vec<EmailAddress>>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Vec<EmailAddress>>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cc: Option<Vec<EmailAddress>>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bcc: Option<Vec<EmailAddress>>,
    #[serde(rename = "replyTo")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Vec<EmailAddress>>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(rename = "sentAt")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<FixedOffset>>,
    #[serde(rename = "hasAttachment")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_attachment: Option<bool>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(rename = "bodyValues")]
    #[serde(default)]
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub body_values: HashMap<String, EmailBodyValue>,
    #[serde(rename = "textBody")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_body: Option<Vec<BodyPart>>,
    #[serde(rename = "htmlBody")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_body: Option<Vec<BodyPart>>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<BodyPart>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailAddress {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailBodyValue {
    pub value: String,
    #[serde(rename = "isEncodingProblem")]
    #[serde(default)]
    pub is_encoding_problem: bool,
    #[serde(rename = "isTruncated")]
    #[serde(default)]
    pub is_truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyPart {
    #[serde(rename = "partId")]
    #[serde(default)]
    pub part_id: Option<String>,
    #[serde(rename = "blobId")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_id: Option<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    #[serde(default)]
    pub type_: String,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disposition: Option<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
}

/// JMAP Mailbox object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mailbox {
    pub id: String,
    pub name: String,
    #[serde(rename = "parentId")]
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(rename = "sortOrder")]
    #[serde(default)]
    pub sort_order: u32,
    #[serde(rename = "totalEmails")]
    #[serde(default)]
    pub total_emails: u64,
    #[serde(rename = "unreadEmails")]
    #[serde(default)]
    pub unread_emails: u64,
    #[serde(rename = "totalThreads")]
    #[serde(default)]
    pub total_threads: u64,
    #[serde(rename = "unreadThreads")]
    #[serde(default)]
    pub unread_threads: u64,
    #[serde(rename = "myRights")]
    #[serde(default)]
    pub my_rights: MailboxRights,
    #[serde(rename = "isSubscribed")]
    #[serde(default)]
    pub is_subscribed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxRights {
    #[serde(rename = "mayReadItems", default)]
    pub may_read_items: bool,
    #[serde(rename = "mayAddItems", default)]
    pub may_add_items: bool,
    #[serde(rename = "mayRemoveItems", default)]
    pub may_remove_items: bool,
    #[serde(rename = "maySetSeen", default)]
    pub may_set_seen: bool,
    #[serde(rename = "maySetKeywords", default)]
    pub may_set_keywords: bool,
    #[serde(rename = "mayCreateChild", default)]
    pub may_create_child: bool,
    #[serde(rename = "mayRename", default)]
    pub may_rename: bool,
    #[serde(rename = "mayDelete", default)]
    pub may_delete: bool,
    #[serde(rename = "maySubmit", default)]
    pub may_submit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    #[serde(rename = "emailIds")]
    #[serde(default)]
    pub email_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub email: String,
    #[serde(rename = "replyTo")]
    #[serde(default)]
    pub reply_to: Option<Vec<EmailAddress>>,
    #[serde(default)]
    pub bcc: Option<Vec<EmailAddress>>,
    #[serde(rename = "textSignature")]
    #[serde(default)]
    pub text_signature: Option<String>,
    #[serde(rename = "htmlSignature")]
    #[serde(default)]
    pub html_signature: Option<String>,
    #[serde(rename = "mayDelete")]
    #[serde(default)]
    pub may_delete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VacationResponse {
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "isEnabled")]
    #[serde(default)]
    pub is_enabled: bool,
    #[serde(rename = "fromDate")]
    #[serde(default)]
    pub from_date: Option<DateTime<Utc>>,
    #[serde(rename = "toDate")]
    #[serde(default)]
    pub to_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(rename = "textBody")]
    #[serde(default)]
    pub text_body: Option<String>,
    #[serde(rename = "htmlBody")]
    #[serde(default)]
    pub html_body: Option<String>,
}

/// Quota object (RFC 9425)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quota {
    pub id: String,
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(default)]
    pub used: u64,
    #[serde(rename = "hardLimit")]
    #[serde(default)]
    pub hard_limit: u64,
    #[serde(rename = "warnLimit")]
    #[serde(default)]
    pub warn_limit: Option<u64>,
    #[serde(rename = "softLimit")]
    #[serde(default)]
    pub soft_limit: Option<u64>,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailSubmission {
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "identityId")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<String>,
    #[serde(rename = "emailId")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_id: Option<String>,
    #[serde(rename = "threadId")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope: Option<Envelope>,
    #[serde(rename = "sendAt")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_at: Option<DateTime<Utc>>,
    #[serde(rename = "undoStatus")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undo_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "mailFrom")]
    pub mail_from: SmtpAddress,
    #[serde(rename = "rcptTo")]
    pub rcpt_to: Vec<SmtpAddress>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmtpAddress {
    pub email: String,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,
}

// Contact and calendar objects are passed through untouched apart from their id.

/// JSContact card
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactCard {
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

/// JSCalendar event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

// Blob types (RFC 9404)

/// Blob/upload request object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobUploadObject {
    pub data: Vec<DataSourceObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "type")]
    pub type_: Option<String>,
}

/// Data source for blob upload - one of text, base64, or blob reference
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataSourceObject {
    AsText {
        #[serde(rename = "data:asText")]
        data_as_text: String,
    },
    AsBase64 {
        #[serde(rename = "data:asBase64")]
        data_as_base64: String,
    },
    BlobRef {
        #[serde(rename = "blobId")]
        blob_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        offset: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        length: Option<u64>,
    },
}

/// Blob created by Blob/upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobCreatedInfo {
    pub id: String,
    #[serde(rename = "type")]
    #[serde(default)]
    pub type_: Option<String>,
    #[serde(default)]
    pub size: u64,
}

/// Blob/upload response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobUploadResponse {
    #[serde(rename = "accountId")]
    pub account_id: String,
    #[serde(default)]
    pub created: HashMap<String, BlobCreatedInfo>,
    #[serde(default)]
    #[serde(rename = "notCreated")]
    pub not_created: HashMap<String, SetError>,
}

/// Blob as returned by Blob/get
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub id: String,
    #[serde(rename = "data:asText")]
    #[serde(default)]
    pub data_as_text: Option<String>,
    #[serde(rename = "data:asBase64")]
    #[serde(default)]
    pub data_as_base64: Option<String>,
    /// Dynamic digest properties (digest:sha, digest:sha-256, etc.)
    #[serde(flatten)]
    pub digests: HashMap<String, Value>,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "isEncodingProblem")]
    #[serde(default)]
    pub is_encoding_problem: bool,
    #[serde(rename = "isTruncated")]
    #[serde(default)]
    pub is_truncated: bool,
}

impl Blob {
    /// Get digest value for algorithm if present
    pub fn digest(&self, algorithm: &str) -> Option<&str> {
        self.digests
            .get(&format!("digest:{}", algorithm))
            .and_then(Value::as_str)
    }

    /// Get data as bytes (decodes base64 if needed)
    pub fn as_bytes(&self) -> Option<Result<Vec<u8>, base64::DecodeError>> {
        if let Some(text) = &self.data_as_text {
            Some(Ok(text.as_bytes().to_vec()))
        } else {
            self.data_as_base64
                .as_deref()
                .map(crate::blob::decode_base64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_source_serialization() {
        let text = DataSourceObject::AsText {
            data_as_text: "hello".to_string(),
        };
        assert_eq!(serde_json::to_value(text).unwrap(), json!({"data:asText": "hello"}));

        let blob_ref = DataSourceObject::BlobRef {
            blob_id: "G123".to_string(),
            offset: Some(10),
            length: None,
        };
        assert_eq!(
            serde_json::to_value(blob_ref).unwrap(),
            json!({"blobId": "G123", "offset": 10})
        );
    }

    #[test]
    fn test_blob_digest() {
        let blob: Blob = serde_json::from_value(json!({
            "id": "G123",
            "size": 5,
            "data:asBase64": "aGVsbG8=",
            "digest:sha": "abc123",
            "digest:sha-512": "def456"
        }))
        .unwrap();
        assert_eq!(blob.digest("sha"), Some("abc123"));
        assert_eq!(blob.digest("sha-512"), Some("def456"));
        assert_eq!(blob.digest("md5"), None);
        assert_eq!(blob.as_bytes().unwrap().unwrap(), b"hello");
    }

    #[test]
    fn test_response_shapes_over_objects_without_default() {
        let quotas: GetResponse<Quota> = serde_json::from_value(json!({"accountId": "a"})).unwrap();
        assert!(quotas.list.is_empty());
        assert!(quotas.not_found.is_empty());

        let query: QueryResponse<Mailbox> =
            serde_json::from_value(json!({"accountId": "a", "ids": ["x"]})).unwrap();
        assert_eq!(query.ids, vec!["x".to_string()]);

        let changes: ChangesResponse<Thread> = serde_json::from_value(json!({
            "accountId": "a",
            "oldState": "1",
            "newState": "2"
        }))
        .unwrap();
        assert!(changes.created.is_empty());

        let set: SetResponse<Identity> = serde_json::from_value(json!({
            "accountId": "a",
            "created": {"n": {"id": "i1", "email": "naomi@example.org"}}
        }))
        .unwrap();
        assert_eq!(set.created.unwrap()["n"].email, "naomi@example.org");

        let blobs: GetResponse<Blob> =
            serde_json::from_value(json!({"accountId": "a", "list": [{"id": "G1", "size": 1}]})).unwrap();
        assert_eq!(serde_json::to_value(&blobs).unwrap()["list"][0]["id"], "G1");
    }

    #[test]
    fn test_mailbox_defaults() {
        let mailbox: Mailbox = serde_json::from_value(json!({
            "id": "a",
            "name": "Inbox",
            "role": "inbox"
        }))
        .unwrap();
        assert_eq!(mailbox.role.as_deref(), Some("inbox"));
        assert_eq!(mailbox.unread_emails, 0);
        assert!(!mailbox.my_rights.may_delete);
    }

    #[test]
    fn test_email_dates() {
        let email: Email = serde_json::from_value(json!({
            "id": "e1",
            "receivedAt": "2024-03-01T10:00:00Z",
            "sentAt": "2024-03-01T11:00:00+01:00",
            "keywords": {"$seen": true}
        }))
        .unwrap();
        assert_eq!(email.received_at, email.sent_at.map(|d| d.with_timezone(&Utc)));
        assert_eq!(email.keywords.get("$seen"), Some(&true));
    }

    #[test]
    fn test_set_response_take_created() {
        let mut response: SetResponse<ContactCard> = serde_json::from_value(json!({
            "accountId": "a",
            "newState": "2",
            "created": {"c": {"id": "card-1", "uid": "x"}},
            "notCreated": {"d": {"type": "invalidProperties", "properties": ["name"]}}
        }))
        .unwrap();
        let card = response.take_created("ContactCard", "c").unwrap();
        assert_eq!(card.id.as_deref(), Some("card-1"));
        assert_eq!(card.properties.get("uid"), Some(&json!("x")));

        match response.take_created("ContactCard", "d") {
            Err(JmapError::Set { id, error, .. }) => {
                assert_eq!(id, "d");
                assert_eq!(error.type_, "invalidProperties");
            }
            other => panic!("Expected set error, got {:?}", other),
        }
        assert!(response.take_created("ContactCard", "e").is_err());
    }

    #[test]
    fn test_set_outcome_keeps_per_object_errors() {
        let response: SetResponse<Email> = serde_json::from_value(json!({
            "accountId": "a",
            "updated": {"e1": null},
            "notUpdated": {"e2": {"type": "notFound"}},
            "destroyed": ["e3"]
        }))
        .unwrap();
        let outcome = SetOutcome::from(response);
        assert_eq!(outcome.updated, vec!["e1".to_string()]);
        assert_eq!(outcome.destroyed, vec!["e3".to_string()]);
        assert_eq!(outcome.not_updated["e2"].type_, "notFound");
        assert!(!outcome.is_complete());
    }
}
