//! User-facing notifications raised by admin operations.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::util::lock::mutex_lock;

const SOURCE: &str = "application::notify";

const DEFAULT_TOAST_TTL: Duration = Duration::from_millis(6000);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub id: Uuid,
    pub kind: ToastKind,
    pub text: String,
    pub ttl: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Error,
}

impl ToastKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ToastKind::Success => "success",
            ToastKind::Error => "error",
        }
    }
}

impl Toast {
    pub fn success(text: impl Into<String>) -> Self {
        Self::success_with_ttl(text, DEFAULT_TOAST_TTL)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::error_with_ttl(text, DEFAULT_TOAST_TTL)
    }

    pub fn success_with_ttl(text: impl Into<String>, ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ToastKind::Success,
            text: text.into(),
            ttl,
        }
    }

    pub fn error_with_ttl(text: impl Into<String>, ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ToastKind::Error,
            text: text.into(),
            ttl,
        }
    }
}

/// Sink for toasts. The admin UI renders them; the CLI logs them.
pub trait Notifier: Send + Sync {
    fn notify(&self, toast: Toast);
}

/// Writes toasts to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, toast: Toast) {
        match toast.kind {
            ToastKind::Success => info!(
                target = SOURCE,
                toast_id = %toast.id,
                kind = toast.kind.as_str(),
                "{}",
                toast.text
            ),
            ToastKind::Error => warn!(
                target = SOURCE,
                toast_id = %toast.id,
                kind = toast.kind.as_str(),
                "{}",
                toast.text
            ),
        }
    }
}

/// Keeps every toast in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    toasts: Mutex<Vec<Toast>>,
}

impl RecordingNotifier {
    pub fn toasts(&self) -> Vec<Toast> {
        mutex_lock(&self.toasts, SOURCE, "recording_notifier.toasts").clone()
    }

    pub fn last(&self) -> Option<Toast> {
        mutex_lock(&self.toasts, SOURCE, "recording_notifier.last")
            .last()
            .cloned()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, toast: Toast) {
        mutex_lock(&self.toasts, SOURCE, "recording_notifier.notify").push(toast);
    }
}
