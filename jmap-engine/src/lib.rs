// jmap-engine/src/lib.rs
pub mod blob;
pub mod cache;
pub mod calendar;
pub mod client;
pub mod config;
pub mod contact;
pub mod email;
pub mod error;
pub mod events;
pub mod http;
pub mod identity;
pub mod mailbox;
pub mod registry;
pub mod request;
pub mod response;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

pub use blob::{
    data_source_from_bytes, decode_base64, encode_base64,
    expand_download_url, expand_upload_url, BlobResult, UploadedBlob,
};
pub use cache::{SessionCache, SessionLoader, UsernameResolver};
pub use calendar::ParsedCalendar;
pub use client::{JmapClient, Reply};
pub use config::{EngineConfig, SessionCacheConfig};
pub use contact::{
    ContactCardFilterCondition, ContactCards, CreatedContactCard, DeletedContactCards,
};
pub use email::{
    BodyOptions, EmailChanges, EmailImport, EmailPage, Emails, MoveMail, SubmittedEmail, Threads,
};
pub use error::{ErrorClass, ErrorCode, JmapError, MethodError, SessionProblem, SetError};
pub use events::{SessionEventListener, SessionListeners, SessionOutdated};
pub use http::{
    BlobDownload, ByteStream, HttpClient, HttpError, HttpErrorKind, RequestContext,
    TransportResponse,
};
pub use identity::{AccountBootstrap, Identities};
pub use mailbox::Mailboxes;
pub use registry::{Capability, Method};
pub use request::{Invocation, Request, RequestBuilder, ResultReference};
pub use response::{MethodResponse, MethodResponseBody, Response};
pub use session::{AccountData, CoreCapability, Session, SessionResponse};
pub use types::{
    // Method response shapes
    ChangesResponse,
    GetResponse,
    QueryResponse,
    SetOutcome,
    SetResponse,
    SessionState,
    State,
    // Filter/Sort
    Comparator,
    EmailFilterCondition,
    MailboxFilterCondition,
    // Mail
    BodyPart,
    Email,
    EmailAddress,
    EmailBodyValue,
    EmailSubmission,
    Envelope,
    Identity,
    Mailbox,
    MailboxRights,
    Quota,
    SmtpAddress,
    Thread,
    VacationResponse,
    // Contacts and calendars
    CalendarEvent,
    ContactCard,
    // Blob types (RFC 9404)
    Blob,
    BlobCreatedInfo,
    BlobUploadObject,
    BlobUploadResponse,
    DataSourceObject,
};

pub use error::error_types;

#[cfg(feature = "reqwest")]
pub use http::{Credentials, ReqwestClient};
