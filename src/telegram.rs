//! Telegram Bot API messaging collaborator.
//!
//! Only the two calls the monitoring pipeline needs: sending a notification
//! and editing a live stats message. The 409 conflict returned when another
//! bot instance holds the long-poll session gets its own predicate because
//! the scheduler treats it as non-fatal.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

const API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Telegram transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Telegram API error {code:?}: {description}")]
    Api {
        code: Option<i64>,
        description: String,
    },
}

impl NotifyError {
    /// True for the 409 returned when another bot instance owns the session.
    pub fn is_conflict(&self) -> bool {
        matches!(self, NotifyError::Api { code: Some(409), .. })
    }
}

/// Outbound messaging seam. The scheduler only ever needs these two calls;
/// tests substitute a recording fake.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a Markdown message, returning the new message id.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64, NotifyError>;

    /// Edit a previously sent message in place.
    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), NotifyError>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    error_code: Option<i64>,
    description: Option<String>,
    result: Option<T>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, NotifyError> {
        if self.ok {
            self.result.ok_or_else(|| NotifyError::Api {
                code: None,
                description: "response marked ok but carried no result".to_string(),
            })
        } else {
            Err(NotifyError::Api {
                code: self.error_code,
                description: self
                    .description
                    .unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Bot API client over reqwest.
pub struct TelegramClient {
    http: reqwest::Client,
    token: String,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            token: token.into(),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", API_BASE, self.token, method)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, NotifyError> {
        let response: ApiResponse<T> = self
            .http
            .post(self.endpoint(method))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;
        response.into_result()
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64, NotifyError> {
        let sent: SentMessage = self
            .call(
                "sendMessage",
                json!({
                    "chat_id": chat_id,
                    "text": text,
                    "parse_mode": "Markdown",
                    "disable_web_page_preview": true,
                }),
            )
            .await?;
        Ok(sent.message_id)
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), NotifyError> {
        // editMessageText returns the edited message or `true`; neither is
        // interesting here.
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                json!({
                    "chat_id": chat_id,
                    "message_id": message_id,
                    "text": text,
                    "parse_mode": "Markdown",
                    "disable_web_page_preview": true,
                }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_parsed_from_failed_response() {
        let raw = r#"{"ok":false,"error_code":409,"description":"Conflict: terminated by other getUpdates request"}"#;
        let response: ApiResponse<SentMessage> = serde_json::from_str(raw).unwrap();
        let err = response.into_result().unwrap_err();
        assert!(err.is_conflict());
        assert!(err.to_string().contains("Conflict"));
    }

    #[test]
    fn sent_message_parsed_from_ok_response() {
        let raw = r#"{"ok":true,"result":{"message_id":77,"date":0,"chat":{"id":1,"type":"private"}}}"#;
        let response: ApiResponse<SentMessage> = serde_json::from_str(raw).unwrap();
        assert_eq!(response.into_result().unwrap().message_id, 77);
    }

    #[test]
    fn non_conflict_errors_are_not_conflicts() {
        let err = NotifyError::Api {
            code: Some(403),
            description: "Forbidden: bot was blocked by the user".to_string(),
        };
        assert!(!err.is_conflict());
    }
}
