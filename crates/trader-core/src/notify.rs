//! User-facing notifications.
//!
//! Flows report progress as [`Notice`]s. A notice carrying an id replaces the
//! active notice with the same id, so one logical operation shows a single
//! evolving status instead of a stack of messages.

use std::sync::{Mutex, PoisonError};

use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Loading,
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: Option<String>,
    pub kind: NoticeKind,
    pub title: String,
    pub description: Option<String>,
}

impl Notice {
    fn new(kind: NoticeKind, title: impl Into<String>) -> Self {
        Self { id: None, kind, title: title.into(), description: None }
    }

    pub fn loading(title: impl Into<String>) -> Self {
        Self::new(NoticeKind::Loading, title)
    }

    pub fn info(title: impl Into<String>) -> Self {
        Self::new(NoticeKind::Info, title)
    }

    pub fn success(title: impl Into<String>) -> Self {
        Self::new(NoticeKind::Success, title)
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self::new(NoticeKind::Error, title)
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Keeps the currently visible notices plus the full history.
#[derive(Debug, Default)]
pub struct ToastBoard {
    inner: Mutex<BoardState>,
}

#[derive(Debug, Default)]
struct BoardState {
    active: Vec<Notice>,
    history: Vec<Notice>,
}

impl ToastBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visible notices, oldest first.
    pub fn active(&self) -> Vec<Notice> {
        self.lock().active.clone()
    }

    /// Every notice ever shown, in order.
    pub fn history(&self) -> Vec<Notice> {
        self.lock().history.clone()
    }

    /// The visible notice with this id.
    pub fn get(&self, id: &str) -> Option<Notice> {
        self.lock().active.iter().find(|n| n.id.as_deref() == Some(id)).cloned()
    }

    pub fn last(&self) -> Option<Notice> {
        self.lock().history.last().cloned()
    }

    /// Titles of every notice shown under `id`, in order.
    pub fn titles_for(&self, id: &str) -> Vec<String> {
        self.lock()
            .history
            .iter()
            .filter(|n| n.id.as_deref() == Some(id))
            .map(|n| n.title.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BoardState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Notifier for ToastBoard {
    fn notify(&self, notice: Notice) {
        let mut state = self.lock();
        state.history.push(notice.clone());
        let existing = notice
            .id
            .as_deref()
            .and_then(|id| state.active.iter().position(|n| n.id.as_deref() == Some(id)));
        match existing {
            Some(pos) => state.active[pos] = notice,
            None => state.active.push(notice),
        }
    }
}

/// Writes notices to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        let id = notice.id.as_deref().unwrap_or("-");
        let description = notice.description.as_deref().unwrap_or("");
        match notice.kind {
            NoticeKind::Error => error!(id, description, "{}", notice.title),
            _ => info!(id, kind = ?notice.kind, description, "{}", notice.title),
        }
    }
}
