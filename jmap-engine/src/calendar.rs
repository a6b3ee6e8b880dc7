// jmap-engine/src/calendar.rs
use std::collections::HashMap;

use serde_json::json;
use tracing::debug;

use crate::client::{JmapClient, Reply};
use crate::error::JmapError;
use crate::http::{HttpClient, RequestContext};
use crate::registry::{Capability, Method};
use crate::request::Invocation;
use crate::session::Session;
use crate::types::{CalendarEvent, CalendarEventParseResponse};

/// Events found in iCalendar blobs, keyed by blob id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedCalendar {
    pub parsed: HashMap<String, Vec<CalendarEvent>>,
    pub not_parsable: Vec<String>,
    pub not_found: Vec<String>,
}

impl<C: HttpClient> JmapClient<C> {
    /// Turn uploaded iCalendar blobs into JSCalendar events without storing them
    pub async fn parse_calendar_blob(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_id: &str,
        blob_ids: &[String],
    ) -> Result<Reply<ParsedCalendar>, JmapError> {
        let account_id = session.account_id(Capability::Calendars, account_id);
        let request = self.request(
            session,
            [Invocation::new(
                Method::CalendarEventParse,
                &json!({"accountId": account_id, "blobIds": blob_ids}),
                "0",
            )?],
        )?;

        self.command("ParseCalendarBlob", session, ctx, request, |response| {
            let parse: CalendarEventParseResponse =
                response.get(Method::CalendarEventParse, "0")?;
            let parsed = ParsedCalendar {
                parsed: parse.parsed.unwrap_or_default(),
                not_parsable: parse.not_parsable.unwrap_or_default(),
                not_found: parse.not_found.unwrap_or_default(),
            };
            if !parsed.not_parsable.is_empty() {
                debug!(blobs = ?parsed.not_parsable, "blobs are not iCalendar data");
            }
            Ok(parsed)
        })
        .await
    }
}
