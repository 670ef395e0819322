//! Tracing setup and the user-facing notification ring.

use chrono::Local;
use std::collections::VecDeque;
use tracing::debug;

/// Maximum number of notifications kept in memory
const MAX_NOTIFICATIONS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

/// A non-blocking, user-visible notification
#[derive(Debug, Clone)]
pub struct Notification {
    pub timestamp: String,
    pub severity: Severity,
    pub message: String,
}

impl Notification {
    fn new(severity: Severity, message: String) -> Self {
        Self {
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            severity,
            message,
        }
    }

    /// Format for display in a notification area
    pub fn format_for_display(&self) -> String {
        format!(
            "[{}] {} {}",
            self.timestamp,
            self.severity.as_str(),
            self.message
        )
    }
}

/// Bounded ring of notifications. Component-local failures land here instead
/// of interrupting the view; the embedding UI drains and presents them.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    entries: VecDeque<Notification>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(MAX_NOTIFICATIONS),
        }
    }

    pub fn push(&mut self, severity: Severity, message: impl Into<String>) {
        let notification = Notification::new(severity, message.into());
        debug!(
            target: "notify",
            severity = notification.severity.as_str(),
            message = %notification.message,
            "notification"
        );
        if self.entries.len() >= MAX_NOTIFICATIONS {
            self.entries.pop_front();
        }
        self.entries.push_back(notification);
    }

    pub fn recent(&self, count: usize) -> Vec<Notification> {
        self.entries.iter().rev().take(count).rev().cloned().collect()
    }

    /// Take everything, oldest first
    pub fn drain(&mut self) -> Vec<Notification> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Initialize tracing for the binary: env-filter driven, compact format on
/// stderr so stdout stays clean for results.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
