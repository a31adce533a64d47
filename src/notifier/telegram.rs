use std::sync::Arc;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::NotifyError;
use crate::notifier::{MessageHandle, Notifier};

/// Telegram Bot API channel. Handles are the `message_id` of the sent
/// message in the configured chat.
pub struct TelegramNotifier {
    client: reqwest::Client,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    api_url: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(api_url: &str, token: String, chat_id: String) -> Self {
        // Telegram allows about one message per second to the same chat.
        let quota = Quota::per_second(nonzero!(1u32));
        Self {
            client: reqwest::Client::new(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            api_url: api_url.trim_end_matches('/').to_owned(),
            token,
            chat_id,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
        error: NotifyError,
    ) -> Result<T, Report<NotifyError>> {
        self.rate_limiter.until_ready().await;

        // The URL carries the bot token, so it is never attached to reports.
        let response = self
            .client
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| e.without_url())
            .change_context(error)
            .attach_with(|| format!("method: {method}"))?;

        let status = response.status();
        let parsed: TelegramResponse<T> = response
            .json()
            .await
            .map_err(|e| e.without_url())
            .change_context(error)
            .attach_with(|| format!("method: {method}, HTTP status: {status}"))?;

        parsed.into_result(status.as_u16()).map_err(|report| {
            let context = report.current_context().context_for(error);
            report.change_context(context)
        })
    }
}

impl Notifier for TelegramNotifier {
    fn send(&self, text: &str) -> BoxFuture<'_, Result<MessageHandle, Report<NotifyError>>> {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
        });
        Box::pin(async move {
            let sent: SentMessage = self.call("sendMessage", body, NotifyError::Send).await?;
            debug!(message_id = sent.message_id, "telegram message sent");
            Ok(MessageHandle::new(sent.message_id.to_string()))
        })
    }

    fn delete(&self, handle: &MessageHandle) -> BoxFuture<'_, Result<(), Report<NotifyError>>> {
        let handle = handle.clone();
        Box::pin(async move {
            let message_id: i64 = handle
                .as_str()
                .parse()
                .change_context(NotifyError::InvalidHandle)
                .attach_with(|| format!("handle: {handle}"))?;
            let body = serde_json::json!({
                "chat_id": self.chat_id,
                "message_id": message_id,
            });
            let _deleted: bool = self.call("deleteMessage", body, NotifyError::Delete).await?;
            debug!(message_id, "telegram message deleted");
            Ok(())
        })
    }
}

// ── Bot API response types ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> TelegramResponse<T> {
    fn into_result(self, status: u16) -> Result<T, Report<ApiRejected>> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(Report::new(ApiRejected {
                status,
                description: self.description.unwrap_or_else(|| "no description".into()),
            })),
        }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("telegram rejected the call ({status}): {description}")]
struct ApiRejected {
    status: u16,
    description: String,
}

impl ApiRejected {
    /// A 400 on `deleteMessage` means the message is missing or past the
    /// 48 hour delete window. Other rejections may clear up on retry.
    fn context_for(&self, error: NotifyError) -> NotifyError {
        match (error, self.status) {
            (NotifyError::Delete, 400) => NotifyError::Gone,
            _ => error,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}
