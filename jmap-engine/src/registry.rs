// jmap-engine/src/registry.rs
//! Static table of the methods this engine speaks.
//!
//! Each method name maps to the capability that owns it and to the shape of
//! its response arguments. Adding a method family means adding lines to the
//! `methods!` invocation below and nothing else.
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::types::{
    Blob, BlobUploadResponse, CalendarEventParseResponse, ChangesResponse, ContactCard, Email,
    EmailImportResponse, EmailSubmission, GetResponse, Identity, Mailbox, QueryResponse, Quota,
    SetResponse, Thread, VacationResponse,
};

/// Name of the pseudo-method used for method-level errors
pub const ERROR_METHOD: &str = "error";

/// Capability URNs declared in a request's `using` list.
///
/// Ordered so that `Core` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    Core,
    Mail,
    Submission,
    VacationResponse,
    Blob,
    Quota,
    Contacts,
    Calendars,
}

impl Capability {
    pub const ALL: &'static [Capability] = &[
        Capability::Core,
        Capability::Mail,
        Capability::Submission,
        Capability::VacationResponse,
        Capability::Blob,
        Capability::Quota,
        Capability::Contacts,
        Capability::Calendars,
    ];

    pub fn urn(self) -> &'static str {
        match self {
            Capability::Core => "urn:ietf:params:jmap:core",
            Capability::Mail => "urn:ietf:params:jmap:mail",
            Capability::Submission => "urn:ietf:params:jmap:submission",
            Capability::VacationResponse => "urn:ietf:params:jmap:vacationresponse",
            Capability::Blob => "urn:ietf:params:jmap:blob",
            Capability::Quota => "urn:ietf:params:jmap:quota",
            Capability::Contacts => "urn:ietf:params:jmap:contacts",
            Capability::Calendars => "urn:ietf:params:jmap:calendars",
        }
    }

    pub fn from_urn(urn: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.urn() == urn)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.urn())
    }
}

impl Serialize for Capability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.urn())
    }
}

impl<'de> Deserialize<'de> for Capability {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let urn = String::deserialize(deserializer)?;
        Capability::from_urn(&urn)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown capability '{}'", urn)))
    }
}

macro_rules! methods {
    ($($variant:ident => $name:literal, $capability:ident, $shape:ty;)+) => {
        /// Every method this engine can put into a request and decode from a response
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Method {
            $($variant),+
        }

        impl Method {
            pub const ALL: &'static [Method] = &[$(Method::$variant),+];

            pub fn name(self) -> &'static str {
                match self {
                    $(Method::$variant => $name),+
                }
            }

            pub fn capability(self) -> Capability {
                match self {
                    $(Method::$variant => Capability::$capability),+
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Method::$variant),)+
                    _ => None,
                }
            }

            pub(crate) fn decode(
                self,
                parameters: Value,
            ) -> Result<ResponseParameters, serde_json::Error> {
                match self {
                    $(Method::$variant => {
                        serde_json::from_value(parameters).map(ResponseParameters::$variant)
                    })+
                }
            }
        }

        /// Decoded response arguments, one variant per method
        #[derive(Debug, Clone, PartialEq)]
        pub enum ResponseParameters {
            $($variant($shape)),+
        }

        impl ResponseParameters {
            pub fn method(&self) -> Method {
                match self {
                    $(ResponseParameters::$variant(_) => Method::$variant),+
                }
            }
        }

        $(
            impl TryFrom<ResponseParameters> for $shape {
                type Error = Method;

                fn try_from(parameters: ResponseParameters) -> Result<Self, Method> {
                    match parameters {
                        ResponseParameters::$variant(shape) => Ok(shape),
                        #[allow(unreachable_patterns)]
                        other => Err(other.method()),
                    }
                }
            }
        )+
    };
}

methods! {
    MailboxGet => "Mailbox/get", Mail, GetResponse<Mailbox>;
    MailboxQuery => "Mailbox/query", Mail, QueryResponse<Mailbox>;
    EmailGet => "Email/get", Mail, GetResponse<Email>;
    EmailQuery => "Email/query", Mail, QueryResponse<Email>;
    EmailChanges => "Email/changes", Mail, ChangesResponse<Email>;
    EmailSet => "Email/set", Mail, SetResponse<Email>;
    EmailImport => "Email/import", Mail, EmailImportResponse;
    ThreadGet => "Thread/get", Mail, GetResponse<Thread>;
    IdentityGet => "Identity/get", Submission, GetResponse<Identity>;
    EmailSubmissionGet => "EmailSubmission/get", Submission, GetResponse<EmailSubmission>;
    EmailSubmissionSet => "EmailSubmission/set", Submission, SetResponse<EmailSubmission>;
    VacationResponseGet => "VacationResponse/get", VacationResponse, GetResponse<VacationResponse>;
    VacationResponseSet => "VacationResponse/set", VacationResponse, SetResponse<VacationResponse>;
    QuotaGet => "Quota/get", Quota, GetResponse<Quota>;
    BlobGet => "Blob/get", Blob, GetResponse<Blob>;
    BlobUpload => "Blob/upload", Blob, BlobUploadResponse;
    ContactCardGet => "ContactCard/get", Contacts, GetResponse<ContactCard>;
    ContactCardQuery => "ContactCard/query", Contacts, QueryResponse<ContactCard>;
    ContactCardSet => "ContactCard/set", Contacts, SetResponse<ContactCard>;
    CalendarEventParse => "CalendarEvent/parse", Calendars, CalendarEventParseResponse;
}

/// Responses a server emits on its own under the tag of another call.
///
/// `(trigger, companion)`: an invocation of `trigger` may be answered by an
/// additional `companion` response carrying the same tag.
pub const IMPLICIT_COMPANIONS: &[(Method, Method)] =
    &[(Method::EmailSubmissionSet, Method::EmailSet)];

impl Method {
    pub fn is_companion_of(self, trigger: Method) -> bool {
        IMPLICIT_COMPANIONS
            .iter()
            .any(|&(t, c)| t == trigger && c == self)
    }

    /// Methods the server may run on its own when this one is invoked
    pub fn companions(self) -> impl Iterator<Item = Method> {
        IMPLICIT_COMPANIONS
            .iter()
            .filter(move |&&(t, _)| t == self)
            .map(|&(_, c)| c)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Method {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Method {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Method::from_name(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown method '{}'", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique_and_round_trip() {
        let names: HashSet<_> = Method::ALL.iter().map(|m| m.name()).collect();
        assert_eq!(names.len(), Method::ALL.len());
        for method in Method::ALL {
            assert_eq!(Method::from_name(method.name()), Some(*method));
        }
        assert_eq!(Method::from_name(ERROR_METHOD), None);
        assert_eq!(Method::from_name("Email/frobnicate"), None);
    }

    #[test]
    fn test_capability_ownership() {
        assert_eq!(Method::EmailGet.capability(), Capability::Mail);
        assert_eq!(Method::IdentityGet.capability(), Capability::Submission);
        assert_eq!(Method::BlobUpload.capability(), Capability::Blob);
        assert_eq!(Method::ContactCardSet.capability(), Capability::Contacts);
        assert_eq!(
            Method::CalendarEventParse.capability().urn(),
            "urn:ietf:params:jmap:calendars"
        );
    }

    #[test]
    fn test_capability_serialization() {
        assert_eq!(
            serde_json::to_value(Capability::Core).unwrap(),
            json!("urn:ietf:params:jmap:core")
        );
        let c: Capability = serde_json::from_value(json!("urn:ietf:params:jmap:quota")).unwrap();
        assert_eq!(c, Capability::Quota);
        assert!(serde_json::from_value::<Capability>(json!("urn:example:other")).is_err());
        assert!(Capability::Core < Capability::Mail);
    }

    #[test]
    fn test_decode_by_method_name() {
        let decoded = Method::MailboxGet
            .decode(json!({
                "accountId": "cs",
                "state": "n",
                "list": [{"id": "a", "name": "Inbox", "role": "inbox"}],
                "notFound": []
            }))
            .unwrap();
        assert_eq!(decoded.method(), Method::MailboxGet);

        let response: GetResponse<Mailbox> = decoded.clone().try_into().unwrap();
        assert_eq!(response.list[0].name, "Inbox");

        let wrong: Result<GetResponse<Email>, Method> = decoded.try_into();
        assert_eq!(wrong.unwrap_err(), Method::MailboxGet);
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        assert!(Method::EmailQuery.decode(json!({"ids": "nope"})).is_err());
    }

    #[test]
    fn test_companions() {
        assert!(Method::EmailSet.is_companion_of(Method::EmailSubmissionSet));
        assert!(!Method::EmailGet.is_companion_of(Method::EmailSubmissionSet));
        assert!(!Method::EmailSubmissionSet.is_companion_of(Method::EmailSet));
        assert_eq!(
            Method::EmailSubmissionSet.companions().collect::<Vec<_>>(),
            vec![Method::EmailSet]
        );
        assert_eq!(Method::EmailGet.companions().count(), 0);
    }
}
