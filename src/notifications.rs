//! Change notifications (local-only)

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

const MAX_NOTIFICATIONS: usize = 100;

/// Receives user-facing alerts from the monitor. Fire-and-forget.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

/// Writes alerts to the log and the console
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) {
        tracing::info!(title = %title, "{}", message);
        println!("[{}] {}", title, message);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEntry {
    pub id: String,
    pub timestamp: i64,
    pub title: String,
    pub body: String,
}

/// Bounded in-memory notification queue
#[derive(Debug, Default)]
pub struct NotificationCenter {
    entries: RwLock<VecDeque<NotificationEntry>>,
    next_id: AtomicU64,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, title: &str, body: &str) -> NotificationEntry {
        let seq = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = NotificationEntry {
            id: format!("note_{}", seq),
            timestamp: chrono::Utc::now().timestamp_millis(),
            title: title.to_string(),
            body: body.to_string(),
        };

        if let Ok(mut list) = self.entries.write() {
            list.push_back(entry.clone());
            while list.len() > MAX_NOTIFICATIONS {
                list.pop_front();
            }
        }
        entry
    }

    /// Newest first, at most `limit` (default 20, capped at 100)
    pub fn list(&self, limit: Option<usize>) -> Vec<NotificationEntry> {
        let limit = limit.unwrap_or(20).min(MAX_NOTIFICATIONS);
        match self.entries.read() {
            Ok(list) => list.iter().rev().take(limit).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) -> bool {
        if let Ok(mut list) = self.entries.write() {
            list.clear();
            return true;
        }
        false
    }
}

impl Notifier for NotificationCenter {
    fn notify(&self, title: &str, message: &str) {
        tracing::info!(title = %title, "{}", message);
        self.push(title, message);
    }
}
