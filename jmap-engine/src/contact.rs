// jmap-engine/src/contact.rs
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::client::{account_tag, unique_accounts, JmapClient, Reply};
use crate::error::{JmapError, SetError};
use crate::http::{HttpClient, RequestContext};
use crate::registry::{Capability, Method};
use crate::request::{Invocation, ResultReference};
use crate::session::Session;
use crate::types::{Comparator, ContactCard, GetResponse, SetResponse, State};

const CREATE_ID: &str = "c";

/// `ContactCard/query` filter condition
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContactCardFilterCondition {
    #[serde(rename = "inAddressBook")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_address_book: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "updatedAfter")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_after: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContactCards {
    pub cards: Vec<ContactCard>,
    pub not_found: Vec<String>,
    pub state: State,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedContactCard {
    pub card: ContactCard,
    pub state: Option<State>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeletedContactCards {
    pub destroyed: Vec<String>,
    pub not_destroyed: HashMap<String, SetError>,
    pub state: Option<State>,
}

impl<C: HttpClient> JmapClient<C> {
    pub async fn get_contact_cards(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_id: &str,
        ids: Option<&[String]>,
    ) -> Result<Reply<ContactCards>, JmapError> {
        let account_id = session.account_id(Capability::Contacts, account_id);
        let request = self.request(
            session,
            [Invocation::new(
                Method::ContactCardGet,
                &json!({"accountId": account_id, "ids": ids}),
                "0",
            )?],
        )?;

        self.command("GetContactCards", session, ctx, request, |response| {
            let get: GetResponse<ContactCard> = response.get(Method::ContactCardGet, "0")?;
            Ok(ContactCards {
                cards: get.list,
                not_found: get.not_found,
                state: get.state,
            })
        })
        .await
    }

    /// Search the address books of several accounts, most recently updated first
    /// unless `sort` says otherwise
    pub async fn query_contact_cards<S: AsRef<str>>(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_ids: &[S],
        filter: &ContactCardFilterCondition,
        sort: Option<&[Comparator]>,
        position: u64,
        limit: Option<u64>,
    ) -> Result<Reply<HashMap<String, Vec<ContactCard>>>, JmapError> {
        let account_ids = if account_ids.is_empty() {
            vec![session.account_id(Capability::Contacts, "").to_string()]
        } else {
            let resolved: Vec<&str> = account_ids
                .iter()
                .map(|id| session.account_id(Capability::Contacts, id.as_ref()))
                .collect();
            unique_accounts(&resolved)
        };
        let default_sort = [Comparator::descending("updated")];
        let sort = sort.unwrap_or(&default_sort);

        let mut invocations = Vec::with_capacity(account_ids.len() * 2);
        for account_id in &account_ids {
            let query_tag = account_tag(account_id, "0");
            let mut query = json!({"accountId": account_id, "filter": filter, "sort": sort});
            if let Some(map) = query.as_object_mut() {
                if position > 0 {
                    map.insert("position".to_string(), json!(position));
                }
                if let Some(limit) = limit {
                    map.insert("limit".to_string(), json!(limit));
                }
            }
            invocations.push(Invocation::new(Method::ContactCardQuery, &query, query_tag.clone())?);
            invocations.push(Invocation::new(
                Method::ContactCardGet,
                &json!({
                    "accountId": account_id,
                    "#ids": ResultReference::new(query_tag, Method::ContactCardQuery, "/ids/*"),
                }),
                account_tag(account_id, "1"),
            )?);
        }
        let request = self.request(session, invocations)?;

        self.command("QueryContactCards", session, ctx, request, |response| {
            account_ids
                .iter()
                .map(|account_id| -> Result<_, JmapError> {
                    let get: GetResponse<ContactCard> =
                        response.get(Method::ContactCardGet, &account_tag(account_id, "1"))?;
                    Ok((account_id.clone(), get.list))
                })
                .collect()
        })
        .await
    }

    /// Create a card and fetch it back with the properties the server filled in
    pub async fn create_contact_card(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_id: &str,
        card: &ContactCard,
    ) -> Result<Reply<CreatedContactCard>, JmapError> {
        let account_id = session.account_id(Capability::Contacts, account_id);
        let request = self.request(
            session,
            [
                Invocation::new(
                    Method::ContactCardSet,
                    &json!({"accountId": account_id, "create": {CREATE_ID: card}}),
                    "0",
                )?,
                Invocation::new(
                    Method::ContactCardGet,
                    &json!({
                        "accountId": account_id,
                        "#ids": ResultReference::new(
                            "0",
                            Method::ContactCardSet,
                            format!("/created/{}/id", CREATE_ID),
                        ),
                    }),
                    "1",
                )?,
            ],
        )?;

        self.command("CreateContactCard", session, ctx, request, |response| {
            let mut set: SetResponse<ContactCard> = response.get(Method::ContactCardSet, "0")?;
            let created = set
                .take_created("ContactCard", CREATE_ID)
                .inspect_err(|e| error!(error = %e, "contact card was not created"))?;
            let get: GetResponse<ContactCard> = response.get(Method::ContactCardGet, "1")?;
            Ok(CreatedContactCard {
                card: get.list.into_iter().next().unwrap_or(created),
                state: set.new_state,
            })
        })
        .await
    }

    pub async fn delete_contact_cards(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_id: &str,
        ids: &[String],
    ) -> Result<Reply<DeletedContactCards>, JmapError> {
        let account_id = session.account_id(Capability::Contacts, account_id);
        let request = self.request(
            session,
            [Invocation::new(
                Method::ContactCardSet,
                &json!({"accountId": account_id, "destroy": ids}),
                "0",
            )?],
        )?;

        self.command("DeleteContactCards", session, ctx, request, |response| {
            let set: SetResponse<ContactCard> = response.get(Method::ContactCardSet, "0")?;
            Ok(DeletedContactCards {
                destroyed: set.destroyed.unwrap_or_default(),
                not_destroyed: set.not_destroyed.unwrap_or_default(),
                state: set.new_state,
            })
        })
        .await
    }
}
