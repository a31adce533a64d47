use error_stack::Report;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::error::NotifyError;
use crate::notifier::{MessageHandle, Notifier};

/// Writes alerts to the log instead of an external service.
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn send(&self, text: &str) -> BoxFuture<'_, Result<MessageHandle, Report<NotifyError>>> {
        let handle = MessageHandle::new(Uuid::new_v4().to_string());
        tracing::warn!(handle = %handle, "ALERT: {}", text);
        Box::pin(async move { Ok(handle) })
    }

    fn delete(&self, handle: &MessageHandle) -> BoxFuture<'_, Result<(), Report<NotifyError>>> {
        tracing::info!(handle = %handle, "alert retracted");
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn terminal_notifier_issues_distinct_handles() {
        let notifier = TerminalNotifier;
        let first = notifier.send("first").await.unwrap();
        let second = notifier.send("second").await.unwrap();
        assert_ne!(first, second);
        notifier.delete(&first).await.unwrap();
    }
}
