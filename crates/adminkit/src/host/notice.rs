//! One-time admin notices shown on the next rendered page.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::helpers::html_escape;

/// Notice severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

impl NoticeLevel {
    /// CSS modifier used in notice markup.
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeLevel::Success => "success",
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        }
    }
}

/// A banner message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    /// Create a success notice.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    /// Create an error notice.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    /// Render as dismissible notice markup.
    pub fn to_html(&self) -> String {
        format!(
            r#"<div class="notice notice-{} is-dismissible"><p>{}</p></div>"#,
            self.level.as_str(),
            html_escape(&self.message)
        )
    }
}

/// Where notices wait until the next render.
pub trait NoticeQueue: Send + Sync {
    /// Queue a notice.
    fn push(&self, notice: Notice);

    /// Take all queued notices.
    fn drain(&self) -> Vec<Notice>;
}

/// In-memory notice queue.
#[derive(Debug, Default)]
pub struct Notices {
    queue: Mutex<Vec<Notice>>,
}

impl Notices {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued notices.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether no notices are queued.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl NoticeQueue for Notices {
    fn push(&self, notice: Notice) {
        self.queue.lock().push(notice);
    }

    fn drain(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.queue.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_empties_queue() {
        let notices = Notices::new();
        notices.push(Notice::success("Settings saved."));
        notices.push(Notice::error("Nope"));
        assert_eq!(notices.len(), 2);

        let drained = notices.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].level, NoticeLevel::Success);
        assert!(notices.is_empty());
        assert!(notices.drain().is_empty());
    }

    #[test]
    fn notice_html_is_escaped() {
        let html = Notice::error("<b>bad</b>").to_html();
        assert_eq!(
            html,
            r#"<div class="notice notice-error is-dismissible"><p>&lt;b&gt;bad&lt;/b&gt;</p></div>"#
        );
    }

    #[test]
    fn level_serializes_lowercase() {
        let json = serde_json::to_string(&Notice::success("ok")).unwrap_or_default();
        assert!(json.contains(r#""level":"success""#));
    }
}
