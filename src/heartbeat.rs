use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::message::MessageTemplate;
use crate::notifier::Notifier;

/// Status messages sent outside the alert lifecycle. Their handles are never
/// retracted.
pub struct Heartbeat {
    notifier: Arc<dyn Notifier>,
    template: MessageTemplate,
}

impl Heartbeat {
    pub fn new(notifier: Arc<dyn Notifier>, template: MessageTemplate) -> Self {
        Self { notifier, template }
    }

    pub async fn announce_startup(&self) {
        let text = self.template.startup(Utc::now());
        match self.notifier.send(&text).await {
            Ok(handle) => info!(handle = %handle, "startup message sent"),
            Err(report) => warn!(error = ?report, "startup message failed"),
        }
    }

    /// Send a status message every `interval` until `cancel` fires. The first
    /// one goes out after one full interval.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        let mut timer = tokio::time::interval(interval);
        timer.tick().await; // skip immediate first tick

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("heartbeat cancelled");
                    break;
                }
                _ = timer.tick() => {
                    let text = self.template.heartbeat(Utc::now());
                    if let Err(report) = self.notifier.send(&text).await {
                        warn!(error = ?report, "heartbeat message failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::notifier::recording::RecordingNotifier;

    fn heartbeat(notifier: Arc<RecordingNotifier>) -> Heartbeat {
        Heartbeat::new(notifier, MessageTemplate::new(HashMap::new(), 1000.0))
    }

    #[tokio::test]
    async fn startup_failure_is_not_fatal() {
        let notifier = Arc::new(RecordingNotifier::new());
        notifier.fail_sends(true);
        heartbeat(notifier.clone()).announce_startup().await;
        assert_eq!(notifier.send_attempts(), 1);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sends_once_per_interval_until_cancelled() {
        let notifier = Arc::new(RecordingNotifier::new());
        let beat = heartbeat(notifier.clone());
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { beat.run(Duration::from_secs(60), cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(150)).await;
        cancel.cancel();
        task.await.unwrap();

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(_, text)| text.contains("still running")));
    }
}
