// jmap-engine/src/blob.rs
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::client::{JmapClient, Reply};
use crate::error::JmapError;
use crate::http::{BlobDownload, ByteStream, HttpClient, RequestContext};
use crate::registry::Method;
use crate::request::Invocation;
use crate::response::Response;
use crate::session::Session;
use crate::types::{Blob, BlobUploadObject, BlobUploadResponse, DataSourceObject, GetResponse, State};

pub const DIGEST_SHA512: &str = "sha-512";

/// Encode bytes as base64
pub fn encode_base64(data: &[u8]) -> String {
    use base64::prelude::*;
    BASE64_STANDARD.encode(data)
}

/// Decode base64 string to bytes
pub fn decode_base64(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::prelude::*;
    BASE64_STANDARD.decode(s)
}

/// Create DataSourceObject from raw bytes
pub fn data_source_from_bytes(bytes: &[u8]) -> DataSourceObject {
    DataSourceObject::AsBase64 {
        data_as_base64: encode_base64(bytes),
    }
}

// Level 1 URI template expansion: everything but unreserved characters is escaped.
fn encode_template_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Fill the `{accountId}` placeholder of the session's upload URL template
pub fn expand_upload_url(template: &str, account_id: &str) -> String {
    template.replace("{accountId}", &encode_template_value(account_id))
}

/// Fill the `{accountId}`, `{blobId}`, `{name}` and `{type}` placeholders of
/// the session's download URL template
pub fn expand_download_url(
    template: &str,
    account_id: &str,
    blob_id: &str,
    name: &str,
    type_: &str,
) -> String {
    template
        .replace("{accountId}", &encode_template_value(account_id))
        .replace("{blobId}", &encode_template_value(blob_id))
        .replace("{name}", &encode_template_value(name))
        .replace("{type}", &encode_template_value(type_))
}

/// A blob stored on the server
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedBlob {
    pub id: String,
    pub size: u64,
    pub type_: Option<String>,
    /// Only known when the upload went through the API
    pub sha512: Option<String>,
    pub state: Option<State>,
}

/// Result of `Blob/get` for a single id
#[derive(Debug, Clone, PartialEq)]
pub struct BlobResult {
    /// `None` when the server reports the id as not found
    pub blob: Option<Blob>,
    pub state: State,
}

// Response of a POST to the upload URL (RFC 8620 Section 6.1)
#[derive(Deserialize)]
struct UploadResponse {
    #[serde(rename = "blobId")]
    blob_id: String,
    #[serde(rename = "type")]
    #[serde(default)]
    type_: Option<String>,
    #[serde(default)]
    size: u64,
}

const UPLOAD_TAG: &str = "0";
const DIGEST_TAG: &str = "1";
const CREATION_ID: &str = "0";

impl<C: HttpClient> JmapClient<C> {
    /// Upload a small payload inline and learn its SHA-512 digest in the same round trip
    pub async fn upload_blob(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_id: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<Reply<UploadedBlob>, JmapError> {
        let account_id = session.blob_account_id(account_id);
        let upload = BlobUploadObject {
            data: vec![data_source_from_bytes(data)],
            type_: Some(content_type.to_string()),
        };
        let invocations = [
            Invocation::new(
                Method::BlobUpload,
                &json!({
                    "accountId": account_id,
                    "create": { CREATION_ID: upload },
                }),
                UPLOAD_TAG,
            )?,
            Invocation::new(
                Method::BlobGet,
                &json!({
                    "accountId": account_id,
                    // Blob/upload answers with a created map, so the new blob is named by creation id
                    "ids": [format!("#{}", CREATION_ID)],
                    "properties": [format!("digest:{}", DIGEST_SHA512), "size"],
                }),
                DIGEST_TAG,
            )?,
        ];
        let request = self.request(session, invocations)?;

        debug!(account_id, size = data.len(), "uploading blob inline");
        self.command("UploadBlob", session, ctx, request, |response| {
            decode_inline_upload(response)
        })
        .await
    }

    pub async fn get_blob(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_id: &str,
        id: &str,
    ) -> Result<Reply<BlobResult>, JmapError> {
        let account_id = session.blob_account_id(account_id);
        let request = self.request(
            session,
            [Invocation::new(
                Method::BlobGet,
                &json!({
                    "accountId": account_id,
                    "ids": [id],
                    "properties": ["data", format!("digest:{}", DIGEST_SHA512), "size"],
                }),
                "0",
            )?],
        )?;

        self.command("GetBlob", session, ctx, request, |response| {
            let get: GetResponse<Blob> = response.get(Method::BlobGet, "0")?;
            if get.list.len() > 1 {
                return Err(JmapError::response(format!(
                    "Blob/get returned {} blobs for one id",
                    get.list.len()
                )));
            }
            Ok(BlobResult {
                blob: get.list.into_iter().next(),
                state: get.state,
            })
        })
        .await
    }

    /// Stream a large payload to the session's upload endpoint
    pub async fn upload_blob_stream(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_id: &str,
        content_type: &str,
        body: ByteStream,
    ) -> Result<UploadedBlob, JmapError> {
        let account_id = session.blob_account_id(account_id);
        let url = expand_upload_url(session.upload_url_template(), account_id);
        debug!(account_id, url = %url, "uploading blob stream");

        let response = self
            .http()
            .upload(&url, session.username(), content_type, body, ctx)
            .await
            .map_err(|e| {
                error!(account_id, error = %e, "blob upload failed");
                JmapError::from(e)
            })?;
        let upload: UploadResponse = serde_json::from_slice(&response.body).map_err(|e| {
            error!(account_id, error = %e, "failed to decode upload response");
            JmapError::decoding(e)
        })?;

        Ok(UploadedBlob {
            id: upload.blob_id,
            size: upload.size,
            type_: upload.type_,
            sha512: None,
            state: None,
        })
    }

    /// Stream a blob down from the session's download endpoint; `None` if it does not exist
    pub async fn download_blob_stream(
        &self,
        session: &Session,
        ctx: &RequestContext,
        account_id: &str,
        blob_id: &str,
        name: &str,
        type_: &str,
    ) -> Result<Option<BlobDownload>, JmapError> {
        let account_id = session.blob_account_id(account_id);
        let url = expand_download_url(
            session.download_url_template(),
            account_id,
            blob_id,
            name,
            type_,
        );
        debug!(account_id, blob_id, url = %url, "downloading blob");

        let download = self
            .http()
            .download(&url, session.username(), ctx)
            .await
            .map_err(|e| {
                error!(account_id, blob_id, error = %e, "blob download failed");
                JmapError::from(e)
            })?;
        if download.is_none() {
            warn!(account_id, blob_id, "blob not found");
        }
        Ok(download)
    }
}

fn decode_inline_upload(response: &Response) -> Result<UploadedBlob, JmapError> {
    let mut upload: BlobUploadResponse = response.get(Method::BlobUpload, UPLOAD_TAG)?;
    if let Some(error) = upload.not_created.remove(CREATION_ID) {
        return Err(JmapError::Set {
            object_type: "Blob",
            id: CREATION_ID.to_string(),
            error,
        });
    }
    let created = upload.created.remove(CREATION_ID).ok_or_else(|| {
        JmapError::response("Blob/upload response has no created blob".to_string())
    })?;

    let digest: GetResponse<Blob> = response.get(Method::BlobGet, DIGEST_TAG)?;
    let [blob] = <[Blob; 1]>::try_from(digest.list).map_err(|list| {
        JmapError::response(format!(
            "Blob/get returned {} blobs for one upload",
            list.len()
        ))
    })?;

    Ok(UploadedBlob {
        id: created.id,
        size: created.size,
        type_: created.type_,
        sha512: blob.digest(DIGEST_SHA512).map(String::from),
        state: Some(digest.state),
    })
}
