// jmap-engine/src/identity.rs
use std::collections::HashMap;

use serde_json::json;
use tracing::debug;

use crate::client::{account_tag, mail_accounts, JmapClient, Reply};
use crate::error::JmapError;
use crate::http::{HttpClient, RequestContext};
use crate::registry::{Capability, Method};
use crate::request::Invocation;
use crate::session::Session;
use crate::types::{GetResponse, Identity, Quota, SetResponse, State, VacationResponse};

/// The only id a VacationResponse object ever has
pub const VACATION_RESPONSE_ID: &str = "singleton";

const IDENTITY_TAG: &str = "I";
const QUOTA_TAG: &str = "Q";

#[derive(Debug, Clone, PartialEq)]
pub struct Identities {
    pub identities: Vec<Identity>,
    pub state: State,
}

/// Everything a client needs per account right after login
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountBootstrap {
    pub identities: Vec<Identity>,
    pub quotas: Vec<Quota>,
}

impl<C: HttpClient> JmapClient<C> {
    pub async fn get_identities(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_id: &str,
    ) -> Result<Reply<Identities>, JmapError> {
        let account_id = session.mail_account_id(account_id);
        let request = self.request(
            session,
            [Invocation::new(Method::IdentityGet, &json!({"accountId": account_id}), "0")?],
        )?;

        self.command("GetIdentities", session, ctx, request, |response| {
            let get: GetResponse<Identity> = response.get(Method::IdentityGet, "0")?;
            Ok(Identities {
                identities: get.list,
                state: get.state,
            })
        })
        .await
    }

    /// The account's vacation auto-reply, `None` when the server has not set one up
    pub async fn get_vacation_response(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_id: &str,
    ) -> Result<Reply<Option<VacationResponse>>, JmapError> {
        let account_id = session.mail_account_id(account_id);
        let request = self.request(
            session,
            [Invocation::new(
                Method::VacationResponseGet,
                &json!({"accountId": account_id, "ids": [VACATION_RESPONSE_ID]}),
                "0",
            )?],
        )?;

        self.command("GetVacationResponse", session, ctx, request, |response| {
            let get: GetResponse<VacationResponse> =
                response.get(Method::VacationResponseGet, "0")?;
            Ok(get.list.into_iter().next())
        })
        .await
    }

    /// Overwrite the vacation auto-reply and read back what the server stored
    pub async fn set_vacation_response(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_id: &str,
        vacation: &VacationResponse,
    ) -> Result<Reply<VacationResponse>, JmapError> {
        let account_id = session.mail_account_id(account_id);
        let mut patch = serde_json::to_value(vacation).map_err(JmapError::encoding)?;
        if let Some(patch) = patch.as_object_mut() {
            patch.remove("id");
        }
        let request = self.request(
            session,
            [
                Invocation::new(
                    Method::VacationResponseSet,
                    &json!({"accountId": account_id, "update": {VACATION_RESPONSE_ID: patch}}),
                    "0",
                )?,
                Invocation::new(
                    Method::VacationResponseGet,
                    &json!({"accountId": account_id, "ids": [VACATION_RESPONSE_ID]}),
                    "1",
                )?,
            ],
        )?;

        self.command("SetVacationResponse", session, ctx, request, |response| {
            let mut set: SetResponse<VacationResponse> =
                response.get(Method::VacationResponseSet, "0")?;
            if let Some(error) = set
                .not_updated
                .as_mut()
                .and_then(|m| m.remove(VACATION_RESPONSE_ID))
            {
                return Err(JmapError::Set {
                    object_type: "VacationResponse",
                    id: VACATION_RESPONSE_ID.to_string(),
                    error,
                });
            }
            let get: GetResponse<VacationResponse> =
                response.get(Method::VacationResponseGet, "1")?;
            get.list
                .into_iter()
                .next()
                .ok_or_else(|| JmapError::response("VacationResponse/get returned no singleton"))
        })
        .await
    }

    pub async fn get_quotas<S: AsRef<str>>(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_ids: &[S],
    ) -> Result<Reply<HashMap<String, Vec<Quota>>>, JmapError> {
        let account_ids = if account_ids.is_empty() {
            vec![session.account_id(Capability::Quota, "").to_string()]
        } else {
            mail_accounts(session, account_ids)
        };
        let invocations = account_ids
            .iter()
            .map(|account_id| {
                Invocation::new(
                    Method::QuotaGet,
                    &json!({"accountId": account_id}),
                    account_tag(account_id, QUOTA_TAG),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        let request = self.request(session, invocations)?;

        self.command("GetQuotas", session, ctx, request, |response| {
            account_ids
                .iter()
                .map(|account_id| -> Result<_, JmapError> {
                    let get: GetResponse<Quota> =
                        response.get(Method::QuotaGet, &account_tag(account_id, QUOTA_TAG))?;
                    Ok((account_id.clone(), get.list))
                })
                .collect()
        })
        .await
    }

    /// Identities and quotas of several accounts in a single request
    pub async fn get_bootstrap<S: AsRef<str>>(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_ids: &[S],
    ) -> Result<Reply<HashMap<String, AccountBootstrap>>, JmapError> {
        let account_ids = mail_accounts(session, account_ids);
        let mut invocations = Vec::with_capacity(account_ids.len() * 2);
        for account_id in &account_ids {
            invocations.push(Invocation::new(
                Method::IdentityGet,
                &json!({"accountId": account_id}),
                account_tag(account_id, IDENTITY_TAG),
            )?);
            invocations.push(Invocation::new(
                Method::QuotaGet,
                &json!({"accountId": account_id}),
                account_tag(account_id, QUOTA_TAG),
            )?);
        }
        let request = self.request(session, invocations)?;

        debug!(accounts = account_ids.len(), "bootstrap");
        self.command("GetBootstrap", session, ctx, request, |response| {
            let mut result = HashMap::with_capacity(account_ids.len());
            for account_id in &account_ids {
                let identities: GetResponse<Identity> =
                    response.get(Method::IdentityGet, &account_tag(account_id, IDENTITY_TAG))?;
                let quotas: GetResponse<Quota> =
                    response.get(Method::QuotaGet, &account_tag(account_id, QUOTA_TAG))?;
                result.insert(
                    account_id.clone(),
                    AccountBootstrap {
                        identities: identities.list,
                        quotas: quotas.list,
                    },
                );
            }
            Ok(result)
        })
        .await
    }
}
