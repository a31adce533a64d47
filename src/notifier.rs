pub mod telegram;
pub mod terminal;

use std::fmt;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::NotifyError;

/// Opaque reference to a delivered notification, used only to retract it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageHandle(String);

impl MessageHandle {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Channel that alerts are published to and retracted from.
pub trait Notifier: Send + Sync {
    fn send(&self, text: &str) -> BoxFuture<'_, Result<MessageHandle, Report<NotifyError>>>;

    fn delete(&self, handle: &MessageHandle) -> BoxFuture<'_, Result<(), Report<NotifyError>>>;
}

#[cfg(test)]
pub mod recording {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    /// In-memory channel that records every call and can be switched into a
    /// failing mode for sends or deletes. Deletes can also be made to report
    /// the message as already gone.
    #[derive(Default)]
    pub struct RecordingNotifier {
        next_id: AtomicUsize,
        fail_sends: AtomicBool,
        fail_deletes: AtomicBool,
        gone_deletes: AtomicBool,
        sent: Mutex<Vec<(MessageHandle, String)>>,
        deleted: Mutex<Vec<MessageHandle>>,
        send_attempts: AtomicUsize,
        delete_attempts: AtomicUsize,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_sends(&self, fail: bool) {
            self.fail_sends.store(fail, Ordering::SeqCst);
        }

        pub fn fail_deletes(&self, fail: bool) {
            self.fail_deletes.store(fail, Ordering::SeqCst);
        }

        pub fn gone_deletes(&self, gone: bool) {
            self.gone_deletes.store(gone, Ordering::SeqCst);
        }

        pub fn sent(&self) -> Vec<(MessageHandle, String)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn deleted(&self) -> Vec<MessageHandle> {
            self.deleted.lock().unwrap().clone()
        }

        pub fn send_attempts(&self) -> usize {
            self.send_attempts.load(Ordering::SeqCst)
        }

        pub fn delete_attempts(&self) -> usize {
            self.delete_attempts.load(Ordering::SeqCst)
        }
    }

    impl Notifier for RecordingNotifier {
        fn send(&self, text: &str) -> BoxFuture<'_, Result<MessageHandle, Report<NotifyError>>> {
            let text = text.to_owned();
            Box::pin(async move {
                self.send_attempts.fetch_add(1, Ordering::SeqCst);
                if self.fail_sends.load(Ordering::SeqCst) {
                    return Err(Report::new(NotifyError::Send));
                }
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let handle = MessageHandle::new(format!("msg-{id}"));
                self.sent.lock().unwrap().push((handle.clone(), text));
                Ok(handle)
            })
        }

        fn delete(&self, handle: &MessageHandle) -> BoxFuture<'_, Result<(), Report<NotifyError>>> {
            let handle = handle.clone();
            Box::pin(async move {
                self.delete_attempts.fetch_add(1, Ordering::SeqCst);
                if self.fail_deletes.load(Ordering::SeqCst) {
                    return Err(Report::new(NotifyError::Delete));
                }
                if self.gone_deletes.load(Ordering::SeqCst) {
                    return Err(Report::new(NotifyError::Gone));
                }
                self.deleted.lock().unwrap().push(handle);
                Ok(())
            })
        }
    }
}
