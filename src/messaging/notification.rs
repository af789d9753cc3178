// User-facing notifications for problems the engine works around

use std::time::{SystemTime, UNIX_EPOCH};

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// What part of the engine raised it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationCategory {
    /// Unknown chord or pattern names
    Resolution,
    /// Values clamped or defaulted
    Configuration,
    /// Heartbeat overruns and late events
    Timing,
    /// MIDI port problems
    Output,
}

/// Notification with timestamp
#[derive(Debug, Clone)]
pub struct Notification {
    pub level: NotificationLevel,
    pub category: NotificationCategory,
    pub message: String,
    pub timestamp: u64, // Unix timestamp in milliseconds
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl Notification {
    pub fn new(
        level: NotificationLevel,
        category: NotificationCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            category,
            message: message.into(),
            timestamp: unix_millis(),
        }
    }

    pub fn info(category: NotificationCategory, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, category, message)
    }

    pub fn warning(category: NotificationCategory, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, category, message)
    }

    pub fn error(category: NotificationCategory, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, category, message)
    }
}
