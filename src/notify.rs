//! User-facing notices
//!
//! The equivalent of toast messages: games, settlement and the reward
//! services push a [`Notice`] through a [`Notifier`] whenever the user has to
//! learn about a failure or a success.

use crate::errors::{ArcadeError, ErrorCategory};
use serde::Serialize;
use std::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
            category: None,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
            category: None,
        }
    }

    pub fn error(message: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            category: Some(category),
        }
    }

    pub fn from_error(err: &ArcadeError) -> Self {
        let category = err.category();
        let message = match category {
            ErrorCategory::Defect => format!("Something went wrong, please start a new game ({})", err),
            _ => err.to_string(),
        };
        Self::error(message, category)
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Surface a failure unless it is an ignorable re-entrant trigger
pub fn notify_failure(notifier: &dyn Notifier, err: &ArcadeError) {
    if !err.is_ignorable() {
        notifier.notify(Notice::from_error(err));
    }
}

/// Writes notices to the log; used by the server, where no UI is attached
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info | NoticeLevel::Success => info!(message = %notice.message, "notice"),
            NoticeLevel::Error => match notice.category {
                Some(ErrorCategory::Defect) => error!(message = %notice.message, "notice"),
                _ => warn!(message = %notice.message, "notice"),
            },
        }
    }
}

/// Keeps every notice in order, for tests and for clients that poll
#[derive(Debug, Default)]
pub struct NoticeLog {
    notices: Mutex<Vec<Notice>>,
}

impl NoticeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|n| n.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn drain(&self) -> Vec<Notice> {
        let mut notices = self.notices.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *notices)
    }
}

impl Notifier for NoticeLog {
    fn notify(&self, notice: Notice) {
        self.notices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PreconditionError;
    use crate::games::types::GameError;

    #[test]
    fn test_busy_failures_are_not_surfaced() {
        let log = NoticeLog::new();

        notify_failure(&log, &GameError::Busy.into());
        assert!(log.notices().is_empty());

        notify_failure(&log, &PreconditionError::NoWallet.into());
        let notices = log.drain();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(notices[0].category, Some(ErrorCategory::Precondition));
        assert!(log.notices().is_empty());
    }

    #[test]
    fn test_defect_notice_asks_for_restart() {
        let notice = Notice::from_error(&GameError::MalformedShape("3x3".to_string()).into());
        assert!(notice.message.contains("start a new game"));
        assert_eq!(notice.category, Some(ErrorCategory::Defect));
    }
}
