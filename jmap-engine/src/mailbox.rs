// jmap-engine/src/mailbox.rs
use std::collections::HashMap;

use serde_json::json;
use tracing::debug;

use crate::client::{account_tag, mail_accounts, JmapClient, Reply};
use crate::error::JmapError;
use crate::http::{HttpClient, RequestContext};
use crate::registry::Method;
use crate::request::{Invocation, ResultReference};
use crate::session::Session;
use crate::types::{GetResponse, Mailbox, MailboxFilterCondition, State};

#[derive(Debug, Clone, PartialEq)]
pub struct Mailboxes {
    pub mailboxes: Vec<Mailbox>,
    pub not_found: Vec<String>,
    pub state: State,
}

impl<C: HttpClient> JmapClient<C> {
    /// `Mailbox/get` for the given ids, or every mailbox when `ids` is `None`
    pub async fn get_mailboxes(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_id: &str,
        ids: Option<&[String]>,
    ) -> Result<Reply<Mailboxes>, JmapError> {
        let account_id = session.mail_account_id(account_id);
        let request = self.request(
            session,
            [Invocation::new(
                Method::MailboxGet,
                &json!({"accountId": account_id, "ids": ids}),
                "0",
            )?],
        )?;

        self.command("GetMailboxes", session, ctx, request, |response| {
            let get: GetResponse<Mailbox> = response.get(Method::MailboxGet, "0")?;
            Ok(Mailboxes {
                mailboxes: get.list,
                not_found: get.not_found,
                state: get.state,
            })
        })
        .await
    }

    /// Every mailbox of each account, in one request
    pub async fn get_all_mailboxes<S: AsRef<str>>(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_ids: &[S],
    ) -> Result<Reply<HashMap<String, Vec<Mailbox>>>, JmapError> {
        let account_ids = mail_accounts(session, account_ids);
        let invocations = account_ids
            .iter()
            .map(|account_id| {
                Invocation::new(
                    Method::MailboxGet,
                    &json!({"accountId": account_id}),
                    account_tag(account_id, "0"),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        let request = self.request(session, invocations)?;

        self.command("GetAllMailboxes", session, ctx, request, |response| {
            let mut result = HashMap::with_capacity(account_ids.len());
            for account_id in &account_ids {
                let get: GetResponse<Mailbox> =
                    response.get(Method::MailboxGet, &account_tag(account_id, "0"))?;
                debug!(account_id = %account_id, count = get.list.len(), "mailboxes");
                result.insert(account_id.clone(), get.list);
            }
            Ok(result)
        })
        .await
    }

    /// `Mailbox/query` chained into `Mailbox/get` per account
    pub async fn search_mailboxes<S: AsRef<str>>(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_ids: &[S],
        filter: &MailboxFilterCondition,
    ) -> Result<Reply<HashMap<String, Vec<Mailbox>>>, JmapError> {
        let account_ids = mail_accounts(session, account_ids);
        let mut invocations = Vec::with_capacity(account_ids.len() * 2);
        for account_id in &account_ids {
            let query_tag = account_tag(account_id, "0");
            invocations.push(Invocation::new(
                Method::MailboxQuery,
                &json!({"accountId": account_id, "filter": filter}),
                query_tag.clone(),
            )?);
            invocations.push(Invocation::new(
                Method::MailboxGet,
                &json!({
                    "accountId": account_id,
                    "#ids": ResultReference::new(query_tag, Method::MailboxQuery, "/ids"),
                }),
                account_tag(account_id, "1"),
            )?);
        }
        let request = self.request(session, invocations)?;

        self.command("SearchMailboxes", session, ctx, request, |response| {
            account_ids
                .iter()
                .map(|account_id| -> Result<_, JmapError> {
                    let get: GetResponse<Mailbox> =
                        response.get(Method::MailboxGet, &account_tag(account_id, "1"))?;
                    Ok((account_id.clone(), get.list))
                })
                .collect()
        })
        .await
    }
}
