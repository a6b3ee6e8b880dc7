// jmap-engine/src/email.rs
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::client::{account_tag, mail_accounts, JmapClient, Reply};
use crate::error::JmapError;
use crate::http::{HttpClient, RequestContext};
use crate::registry::Method;
use crate::request::{Invocation, Request, ResultReference};
use crate::response::Response;
use crate::session::Session;
use crate::types::{
    ChangesResponse, Comparator, Email, EmailFilterCondition, EmailImportResponse,
    EmailSubmission, GetResponse, QueryResponse, SetOutcome, SetResponse, State, Thread,
};

pub const KEYWORD_SEEN: &str = "$seen";
pub const KEYWORD_DRAFT: &str = "$draft";

const CREATE_ID: &str = "c";
const IMPORT_ID: &str = "i";
const SUBMISSION_ID: &str = "s0";

/// How much of each message body to fetch alongside the metadata
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BodyOptions {
    pub fetch_bodies: bool,
    /// Truncate body values to this many bytes; no limit when `None`
    pub max_body_value_bytes: Option<u64>,
}

impl BodyOptions {
    pub fn with_bodies() -> Self {
        Self {
            fetch_bodies: true,
            max_body_value_bytes: None,
        }
    }

    fn apply(&self, arguments: &mut Value) {
        if let Some(arguments) = arguments.as_object_mut() {
            arguments.insert("fetchAllBodyValues".to_string(), json!(self.fetch_bodies));
            if let Some(max) = self.max_body_value_bytes {
                arguments.insert("maxBodyValueBytes".to_string(), json!(max));
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Emails {
    pub emails: Vec<Email>,
    pub not_found: Vec<String>,
    pub state: State,
}

/// One page of a mailbox or search listing
#[derive(Debug, Clone, PartialEq)]
pub struct EmailPage {
    pub emails: Vec<Email>,
    pub total: Option<u64>,
    pub limit: Option<u64>,
    pub position: u64,
    pub query_state: State,
}

/// What changed in an account since a given state
#[derive(Debug, Clone, PartialEq)]
pub struct EmailChanges {
    pub created: Vec<Email>,
    pub updated: Vec<Email>,
    pub destroyed: Vec<String>,
    pub has_more_changes: bool,
    pub old_state: State,
    pub new_state: State,
}

/// Arguments of one message to add with `Email/import`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailImport {
    #[serde(rename = "blobId")]
    pub blob_id: String,
    #[serde(rename = "mailboxIds")]
    pub mailbox_ids: HashMap<String, bool>,
    pub keywords: HashMap<String, bool>,
    #[serde(rename = "receivedAt")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
}

impl EmailImport {
    pub fn new(blob_id: impl Into<String>, mailbox_id: impl Into<String>) -> Self {
        Self {
            blob_id: blob_id.into(),
            mailbox_ids: HashMap::from([(mailbox_id.into(), true)]),
            keywords: HashMap::new(),
            received_at: None,
        }
    }
}

/// Move a sent message between mailboxes once it is submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveMail {
    pub from_mailbox_id: String,
    pub to_mailbox_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedEmail {
    pub submission: EmailSubmission,
    /// `newState` of the implicit `Email/set` that updated the submitted message
    pub email_state: Option<State>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Threads {
    pub threads: Vec<Thread>,
    pub not_found: Vec<String>,
    pub state: State,
}

fn email_get(account_id: &str, body: BodyOptions, ids: Value) -> Value {
    let mut arguments = json!({"accountId": account_id});
    if let Some(map) = arguments.as_object_mut() {
        match ids {
            Value::Object(reference) => {
                map.insert("#ids".to_string(), Value::Object(reference));
            }
            ids => {
                map.insert("ids".to_string(), ids);
            }
        }
    }
    body.apply(&mut arguments);
    arguments
}

fn reference(result_of: &str, name: Method, path: &str) -> Result<Value, JmapError> {
    serde_json::to_value(ResultReference::new(result_of, name, path)).map_err(JmapError::encoding)
}

fn email_query(account_id: &str, filter: &EmailFilterCondition, offset: u64, limit: Option<u64>) -> Value {
    let mut arguments = json!({
        "accountId": account_id,
        "filter": filter,
        "sort": [Comparator::descending("receivedAt")],
        "calculateTotal": true,
    });
    if let Some(map) = arguments.as_object_mut() {
        if offset > 0 {
            map.insert("position".to_string(), json!(offset));
        }
        if let Some(limit) = limit {
            map.insert("limit".to_string(), json!(limit));
        }
    }
    arguments
}

fn email_page(response: &Response, query_tag: &str, get_tag: &str) -> Result<EmailPage, JmapError> {
    let query: QueryResponse<Email> = response.get(Method::EmailQuery, query_tag)?;
    let get: GetResponse<Email> = response.get(Method::EmailGet, get_tag)?;
    Ok(EmailPage {
        emails: get.list,
        total: query.total,
        limit: query.limit,
        position: query.position,
        query_state: query.query_state,
    })
}

impl<C: HttpClient> JmapClient<C> {
    pub async fn get_emails(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_id: &str,
        ids: &[String],
        body: BodyOptions,
    ) -> Result<Reply<Emails>, JmapError> {
        let account_id = session.mail_account_id(account_id);
        let request = self.request(
            session,
            [Invocation::new(Method::EmailGet, &email_get(account_id, body, json!(ids)), "0")?],
        )?;

        self.command("GetEmails", session, ctx, request, |response| {
            let get: GetResponse<Email> = response.get(Method::EmailGet, "0")?;
            Ok(Emails {
                emails: get.list,
                not_found: get.not_found,
                state: get.state,
            })
        })
        .await
    }

    /// Newest first page of a mailbox: `Email/query` chained into `Email/get`
    pub async fn get_all_emails_in_mailbox(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_id: &str,
        mailbox_id: &str,
        offset: u64,
        limit: Option<u64>,
        body: BodyOptions,
    ) -> Result<Reply<EmailPage>, JmapError> {
        let account_id = session.mail_account_id(account_id);
        let filter = EmailFilterCondition {
            in_mailbox: Some(mailbox_id.to_string()),
            ..Default::default()
        };
        let ids = reference("0", Method::EmailQuery, "/ids/*")?;
        let request = self.request(
            session,
            [
                Invocation::new(
                    Method::EmailQuery,
                    &email_query(account_id, &filter, offset, limit),
                    "0",
                )?,
                Invocation::new(Method::EmailGet, &email_get(account_id, body, ids), "1")?,
            ],
        )?;

        debug!(account_id, mailbox_id, offset, "listing mailbox");
        self.command("GetAllEmailsInMailbox", session, ctx, request, |response| {
            email_page(response, "0", "1")
        })
        .await
    }

    /// Run the same search in several accounts at once
    pub async fn query_emails<S: AsRef<str>>(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_ids: &[S],
        filter: &EmailFilterCondition,
        offset: u64,
        limit: Option<u64>,
        body: BodyOptions,
    ) -> Result<Reply<HashMap<String, EmailPage>>, JmapError> {
        let account_ids = mail_accounts(session, account_ids);
        let mut invocations = Vec::with_capacity(account_ids.len() * 2);
        for account_id in &account_ids {
            let query_tag = account_tag(account_id, "0");
            let ids = reference(&query_tag, Method::EmailQuery, "/ids/*")?;
            invocations.push(Invocation::new(
                Method::EmailQuery,
                &email_query(account_id, filter, offset, limit),
                query_tag,
            )?);
            invocations.push(Invocation::new(
                Method::EmailGet,
                &email_get(account_id, body, ids),
                account_tag(account_id, "1"),
            )?);
        }
        let request = self.request(session, invocations)?;

        self.command("QueryEmails", session, ctx, request, |response| {
            account_ids
                .iter()
                .map(|account_id| -> Result<_, JmapError> {
                    let page = email_page(
                        response,
                        &account_tag(account_id, "0"),
                        &account_tag(account_id, "1"),
                    )?;
                    Ok((account_id.clone(), page))
                })
                .collect()
        })
        .await
    }

    /// `Email/changes` with the created and updated messages fetched in the same request
    pub async fn get_emails_since(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_id: &str,
        since_state: &str,
        max_changes: Option<u64>,
        body: BodyOptions,
    ) -> Result<Reply<EmailChanges>, JmapError> {
        let account_id = session.mail_account_id(account_id);
        let mut changes = json!({"accountId": account_id, "sinceState": since_state});
        if let (Some(max), Some(map)) = (max_changes, changes.as_object_mut()) {
            map.insert("maxChanges".to_string(), json!(max));
        }
        let created = reference("0", Method::EmailChanges, "/created")?;
        let updated = reference("0", Method::EmailChanges, "/updated")?;
        let request = self.request(
            session,
            [
                Invocation::new(Method::EmailChanges, &changes, "0")?,
                Invocation::new(Method::EmailGet, &email_get(account_id, body, created), "1")?,
                Invocation::new(Method::EmailGet, &email_get(account_id, body, updated), "2")?,
            ],
        )?;

        self.command("GetEmailsSince", session, ctx, request, |response| {
            let changes: ChangesResponse<Email> = response.get(Method::EmailChanges, "0")?;
            let created: GetResponse<Email> = response.get(Method::EmailGet, "1")?;
            let updated: GetResponse<Email> = response.get(Method::EmailGet, "2")?;
            Ok(EmailChanges {
                created: created.list,
                updated: updated.list,
                destroyed: changes.destroyed,
                has_more_changes: changes.has_more_changes,
                old_state: changes.old_state,
                new_state: changes.new_state,
            })
        })
        .await
    }

    /// Create a message, typically a draft, optionally destroying the one it replaces
    pub async fn create_email(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_id: &str,
        email: &Email,
        replace_id: Option<&str>,
    ) -> Result<Reply<Email>, JmapError> {
        let account_id = session.mail_account_id(account_id);
        let mut set = json!({"accountId": account_id, "create": {CREATE_ID: email}});
        if let (Some(id), Some(map)) = (replace_id, set.as_object_mut()) {
            map.insert("destroy".to_string(), json!([id]));
        }
        let request = self.request(session, [Invocation::new(Method::EmailSet, &set, "0")?])?;

        self.command("CreateEmail", session, ctx, request, |response| {
            let mut set: SetResponse<Email> = response.get(Method::EmailSet, "0")?;
            set.take_created("Email", CREATE_ID)
        })
        .await
    }

    /// Patch messages by id; rejected patches are reported per message
    pub async fn update_emails(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_id: &str,
        updates: &HashMap<String, Map<String, Value>>,
    ) -> Result<Reply<SetOutcome<Email>>, JmapError> {
        let account_id = session.mail_account_id(account_id);
        let request = self.request(
            session,
            [Invocation::new(
                Method::EmailSet,
                &json!({"accountId": account_id, "update": updates}),
                "0",
            )?],
        )?;
        self.email_set("UpdateEmails", session, ctx, request).await
    }

    pub async fn delete_emails(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_id: &str,
        ids: &[String],
    ) -> Result<Reply<SetOutcome<Email>>, JmapError> {
        let account_id = session.mail_account_id(account_id);
        let request = self.request(
            session,
            [Invocation::new(
                Method::EmailSet,
                &json!({"accountId": account_id, "destroy": ids}),
                "0",
            )?],
        )?;
        self.email_set("DeleteEmails", session, ctx, request).await
    }

    async fn email_set(
        &self,
        operation: &'static str,
        session: &Session,
        ctx: &RequestContext,
        request: Request,
    ) -> Result<Reply<SetOutcome<Email>>, JmapError> {
        self.command(operation, session, ctx, request, |response| {
            let set: SetResponse<Email> = response.get(Method::EmailSet, "0")?;
            let outcome = SetOutcome::from(set);
            if !outcome.is_complete() {
                warn!(
                    operation,
                    not_updated = outcome.not_updated.len(),
                    not_destroyed = outcome.not_destroyed.len(),
                    "some messages were rejected"
                );
            }
            Ok(outcome)
        })
        .await
    }

    /// Add a message from an already uploaded RFC 5322 blob
    pub async fn import_email(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_id: &str,
        import: &EmailImport,
    ) -> Result<Reply<Email>, JmapError> {
        let account_id = session.mail_account_id(account_id);
        let request = self.request(
            session,
            [Invocation::new(
                Method::EmailImport,
                &json!({"accountId": account_id, "emails": {IMPORT_ID: import}}),
                "0",
            )?],
        )?;

        self.command("ImportEmail", session, ctx, request, |response| {
            let mut imported: EmailImportResponse = response.get(Method::EmailImport, "0")?;
            if let Some(error) = imported.not_created.as_mut().and_then(|m| m.remove(IMPORT_ID)) {
                return Err(JmapError::Set {
                    object_type: "Email",
                    id: IMPORT_ID.to_string(),
                    error,
                });
            }
            imported
                .created
                .as_mut()
                .and_then(|m| m.remove(IMPORT_ID))
                .ok_or_else(|| JmapError::response("Email/import response has no imported message"))
        })
        .await
    }

    /// Send a message through `EmailSubmission/set`.
    ///
    /// On success the server clears `$draft`, sets `$seen` and optionally moves
    /// the message, reporting that as an implicit `Email/set` response under the
    /// same tag as the submission.
    pub async fn submit_email(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_id: &str,
        identity_id: &str,
        email_id: &str,
        move_mail: Option<&MoveMail>,
    ) -> Result<Reply<SubmittedEmail>, JmapError> {
        let account_id = session.submission_account_id(account_id);

        let mut update = Map::new();
        update.insert(format!("keywords/{}", KEYWORD_DRAFT), Value::Null);
        update.insert(format!("keywords/{}", KEYWORD_SEEN), Value::Bool(true));
        if let Some(m) = move_mail.filter(|m| m.from_mailbox_id != m.to_mailbox_id) {
            update.insert(format!("mailboxIds/{}", m.from_mailbox_id), Value::Null);
            update.insert(format!("mailboxIds/{}", m.to_mailbox_id), Value::Bool(true));
        }
        let creation_ref = format!("#{}", SUBMISSION_ID);

        let request = self.request(
            session,
            [
                Invocation::new(
                    Method::EmailSubmissionSet,
                    &json!({
                        "accountId": account_id,
                        "create": {
                            SUBMISSION_ID: {"identityId": identity_id, "emailId": email_id}
                        },
                        "onSuccessUpdateEmail": {creation_ref.clone(): update},
                    }),
                    "0",
                )?,
                Invocation::new(
                    Method::EmailSubmissionGet,
                    &json!({"accountId": account_id, "ids": [creation_ref]}),
                    "1",
                )?,
            ],
        )?;

        self.command("SubmitEmail", session, ctx, request, |response| {
            let mut set: SetResponse<EmailSubmission> =
                response.get(Method::EmailSubmissionSet, "0")?;
            let created = set.take_created("EmailSubmission", SUBMISSION_ID)?;

            // the message is already on its way when only the implicit update failed
            let email_state = match response.get::<SetResponse<Email>>(Method::EmailSet, "0") {
                Ok(mut email) => {
                    if let Some(error) = email.not_updated.as_mut().and_then(|m| m.remove(email_id)) {
                        return Err(JmapError::Set {
                            object_type: "Email",
                            id: email_id.to_string(),
                            error,
                        });
                    }
                    email.new_state
                }
                Err(JmapError::Method(error)) => {
                    warn!(email_id, error_type = %error.type_, "submitted message was not updated");
                    None
                }
                Err(e) => return Err(e),
            };

            let get: GetResponse<EmailSubmission> =
                response.get(Method::EmailSubmissionGet, "1")?;
            let submission = get.list.into_iter().next().unwrap_or(created);
            Ok(SubmittedEmail {
                submission,
                email_state,
            })
        })
        .await
    }

    pub async fn get_threads(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_id: &str,
        ids: &[String],
    ) -> Result<Reply<Threads>, JmapError> {
        let account_id = session.mail_account_id(account_id);
        let request = self.request(
            session,
            [Invocation::new(
                Method::ThreadGet,
                &json!({"accountId": account_id, "ids": ids}),
                "0",
            )?],
        )?;

        self.command("GetThreads", session, ctx, request, |response| {
            let get: GetResponse<Thread> = response.get(Method::ThreadGet, "0")?;
            Ok(Threads {
                threads: get.list,
                not_found: get.not_found,
                state: get.state,
            })
        })
        .await
    }
}
