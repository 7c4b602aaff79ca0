//! Replies to audience members.
//!
//! Physical delivery (SMS) is outside this crate; an [`Outbox`] only
//! receives finished notices.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub to: String,
    pub text: String,
}

impl Notice {
    pub fn new(to: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            text: text.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {:?}", self.to, self.text)
    }
}

pub trait Outbox: Send {
    fn send(&mut self, notice: Notice);
}

/// Writes notices to the log, tagged with the sending number.
#[derive(Debug, Clone)]
pub struct LogOutbox {
    sender: String,
}

impl LogOutbox {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
        }
    }
}

impl Outbox for LogOutbox {
    fn send(&mut self, notice: Notice) {
        tracing::info!(from = %self.sender, to = %notice.to, text = %notice.text, "outbound notice");
    }
}

/// Keeps notices in memory.
#[derive(Debug, Default)]
pub struct MemoryOutbox {
    sent: Vec<Notice>,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> &[Notice] {
        &self.sent
    }

    pub fn take(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.sent)
    }
}

impl Outbox for MemoryOutbox {
    fn send(&mut self, notice: Notice) {
        self.sent.push(notice);
    }
}
