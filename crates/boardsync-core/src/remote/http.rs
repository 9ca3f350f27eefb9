//! JSON-over-HTTPS client for the remote RPC service.
//!
//! Every call is a `POST {base}/api/query` or `POST {base}/api/mutation` with
//! body `{"path": "<module>:<function>", "args": {...}}`. The service answers
//! `{"status": "success", "value": ...}` or `{"status": "error", "errorMessage": ...}`.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{RemoteApi, RemoteBoard};
use crate::auth::TokenSource;
use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::models::{BoardPatch, EncryptedContent, Workspace};

#[derive(Debug, Clone, Copy)]
enum CallKind {
    Query,
    Mutation,
}

impl CallKind {
    const fn endpoint(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
        }
    }
}

/// Remote service reached over HTTPS with a bearer token.
#[derive(Clone)]
pub struct HttpRemoteApi {
    base_url: String,
    client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
}

impl std::fmt::Debug for HttpRemoteApi {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemoteApi")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpRemoteApi {
    pub fn new(config: &RemoteConfig, tokens: Arc<dyn TokenSource>) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url.clone(),
            client: reqwest::Client::builder().build()?,
            tokens,
        })
    }

    async fn call<T: DeserializeOwned>(&self, kind: CallKind, path: &str, args: Value) -> Result<T> {
        let url = format!("{}/api/{}", self.base_url, kind.endpoint());
        let mut request = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .json(&json!({ "path": path, "args": args, "format": "json" }));
        if let Some(token) = self.tokens.fetch_token().await? {
            request = request.bearer_auth(token);
        }

        tracing::debug!(path, "Remote call");
        let response = request.send().await.map_err(|error| {
            if error.is_connect() || error.is_timeout() {
                Error::Network(format!("{path}: {error}"))
            } else {
                Error::Http(error)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let envelope = response.json::<ResponseEnvelope>().await?;
        envelope.into_value(path)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseEnvelope {
    status: String,
    #[serde(default)]
    value: Value,
    error_message: Option<String>,
}

impl ResponseEnvelope {
    fn into_value<T: DeserializeOwned>(self, path: &str) -> Result<T> {
        if self.status == "success" {
            return Ok(serde_json::from_value(self.value)?);
        }
        let message = self
            .error_message
            .unwrap_or_else(|| format!("{path} failed"));
        Err(classify_message(message))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

/// Turn a non-success HTTP status into the error taxonomy.
fn status_error(status: StatusCode, body: &str) -> Error {
    let message = parse_api_error(status, body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Unauthorized(message),
        StatusCode::NOT_FOUND => Error::NotFound(message),
        StatusCode::PAYLOAD_TOO_LARGE | StatusCode::TOO_MANY_REQUESTS => Error::Rejected(message),
        status if status.is_server_error() => Error::Network(message),
        _ => Error::Rejected(message),
    }
}

/// Application-level failures reported inside a 200 response.
fn classify_message(message: String) -> Error {
    let lower = message.to_ascii_lowercase();
    if lower.contains("unauthenticated") || lower.contains("unauthorized") {
        Error::Unauthorized(message)
    } else if lower.contains("not found") {
        Error::NotFound(message)
    } else {
        Error::Rejected(message)
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = payload.error_message.or(payload.message).or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

/// Encrypted content with its byte fields base64 encoded.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireContent {
    ciphertext: String,
    iv: String,
    version: u64,
    checksum: String,
    updated_at: i64,
    updated_by: String,
}

impl From<&EncryptedContent> for WireContent {
    fn from(content: &EncryptedContent) -> Self {
        Self {
            ciphertext: BASE64.encode(&content.ciphertext),
            iv: BASE64.encode(&content.iv),
            version: content.version,
            checksum: content.checksum.clone(),
            updated_at: content.updated_at,
            updated_by: content.updated_by.clone(),
        }
    }
}

impl TryFrom<WireContent> for EncryptedContent {
    type Error = Error;

    fn try_from(wire: WireContent) -> Result<Self> {
        let decode = |field: &str, value: &str| {
            BASE64
                .decode(value)
                .map_err(|error| Error::Encryption(format!("invalid base64 in {field}: {error}")))
        };
        Ok(Self {
            ciphertext: decode("ciphertext", &wire.ciphertext)?,
            iv: decode("iv", &wire.iv)?,
            version: wire.version,
            checksum: wire.checksum,
            updated_at: wire.updated_at,
            updated_by: wire.updated_by,
        })
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        self.call(CallKind::Query, "workspaces:list", json!({}))
            .await
    }

    async fn ensure_default_workspace(&self) -> Result<Workspace> {
        self.call(CallKind::Mutation, "workspaces:ensureDefault", json!({}))
            .await
    }

    async fn list_boards(&self, workspace_id: &str) -> Result<Vec<RemoteBoard>> {
        self.call(
            CallKind::Query,
            "boards:list",
            json!({ "workspaceId": workspace_id }),
        )
        .await
    }

    async fn create_board(
        &self,
        workspace_id: &str,
        name: &str,
        idempotency_key: Option<&str>,
    ) -> Result<RemoteBoard> {
        self.call(
            CallKind::Mutation,
            "boards:create",
            json!({
                "workspaceId": workspace_id,
                "name": name,
                "idempotencyKey": idempotency_key,
            }),
        )
        .await
    }

    async fn update_board(&self, board_id: &str, patch: &BoardPatch) -> Result<()> {
        let _: Value = self
            .call(
                CallKind::Mutation,
                "boards:update",
                json!({ "boardId": board_id, "patch": patch }),
            )
            .await?;
        Ok(())
    }

    async fn archive_board(&self, board_id: &str) -> Result<()> {
        let _: Value = self
            .call(
                CallKind::Mutation,
                "boards:archive",
                json!({ "boardId": board_id }),
            )
            .await?;
        Ok(())
    }

    async fn get_content(&self, board_id: &str) -> Result<Option<EncryptedContent>> {
        let wire: Option<WireContent> = self
            .call(
                CallKind::Query,
                "boardContent:get",
                json!({ "boardId": board_id }),
            )
            .await?;
        wire.map(EncryptedContent::try_from).transpose()
    }

    async fn save_content(&self, board_id: &str, content: &EncryptedContent) -> Result<()> {
        let _: Value = self
            .call(
                CallKind::Mutation,
                "boardContent:save",
                json!({ "boardId": board_id, "content": WireContent::from(content) }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use crate::error::ErrorKind;

    #[test]
    fn status_codes_map_onto_error_taxonomy() {
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED, "").kind(),
            ErrorKind::AuthNotReady
        );
        assert_eq!(
            status_error(StatusCode::FORBIDDEN, "").kind(),
            ErrorKind::AuthNotReady
        );
        assert_eq!(
            status_error(StatusCode::NOT_FOUND, "").kind(),
            ErrorKind::PermanentRejection
        );
        assert_eq!(
            status_error(StatusCode::PAYLOAD_TOO_LARGE, "").kind(),
            ErrorKind::PermanentRejection
        );
        assert_eq!(
            status_error(StatusCode::BAD_GATEWAY, "").kind(),
            ErrorKind::TransientNetwork
        );
    }

    #[test]
    fn api_error_message_prefers_json_fields() {
        let message = parse_api_error(
            StatusCode::PAYLOAD_TOO_LARGE,
            r#"{"errorMessage":"content exceeds 1MB"}"#,
        );
        assert_eq!(message, "content exceeds 1MB (413)");
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }

    #[test]
    fn envelope_errors_are_classified() {
        let envelope: ResponseEnvelope = serde_json::from_str(
            r#"{"status":"error","errorMessage":"Unauthenticated call to boards:list"}"#,
        )
        .unwrap();
        let error = envelope.into_value::<Value>("boards:list").unwrap_err();
        assert!(matches!(error, Error::Unauthorized(_)));
    }

    #[test]
    fn envelope_success_decodes_value() {
        let envelope: ResponseEnvelope = serde_json::from_str(
            r#"{"status":"success","value":{"id":"ws_1","name":"Mine","isDefault":true,"createdAt":5}}"#,
        )
        .unwrap();
        let workspace: Workspace = envelope.into_value("workspaces:ensureDefault").unwrap();
        assert_eq!(workspace.id, "ws_1");
        assert!(workspace.is_default);
    }

    #[test]
    fn wire_content_carries_base64_bytes() {
        let content = EncryptedContent {
            ciphertext: vec![0, 1, 2, 250],
            iv: vec![7; 12],
            version: 3,
            checksum: "abc".to_string(),
            updated_at: 10,
            updated_by: "user-1".to_string(),
        };
        let wire = WireContent::from(&content);
        assert_eq!(wire.ciphertext, "AAEC+g==");
        assert_eq!(EncryptedContent::try_from(wire).unwrap(), content);
    }

    #[test]
    fn debug_hides_token_source() {
        let api = HttpRemoteApi::new(
            &RemoteConfig::new("https://sync.example.com/").unwrap(),
            Arc::new(StaticToken::new(Some("secret".to_string()))),
        )
        .unwrap();
        let debug = format!("{api:?}");
        assert!(debug.contains("https://sync.example.com"));
        assert!(!debug.contains("secret"));
    }
}
