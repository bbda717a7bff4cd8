//! Short, auto-dismissing user notices.
//!
//! Posting never blocks and never fails; with nobody subscribed the notice is
//! simply dropped.

use tokio::sync::broadcast;

pub const BROADCAST_SUCCESS: &str = "Transaction was broadcast successfully";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, text: text.into() }
    }
}

#[derive(Debug, Clone)]
pub struct Notices {
    tx: broadcast::Sender<Notice>,
}

impl Notices {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    pub fn post(&self, notice: Notice) {
        tracing::debug!(level = ?notice.level, text = %notice.text, "notice");
        let _ = self.tx.send(notice);
    }
}

impl Default for Notices {
    fn default() -> Self {
        Self::new(16)
    }
}
