//! Development-mode runtime.
//!
//! - [`channel`]: WebSocket channel that pushes [`NotificationEvent`]s to browsers
//! - [`lifecycle`]: turns compiler rebuild events into notifications
//! - [`modules`]: cache of loaded server output, purged on rebuild
//! - [`exit_guard`]: one-shot cleanup when a watch session ends
//! - [`app_server`]: HTTP server for the built application

pub mod app_server;
pub mod channel;
pub mod exit_guard;
pub mod lifecycle;
pub mod modules;

pub use app_server::{AppServer, LIVE_RELOAD_PATH};
pub use channel::{ClientRegistry, ClientState, NotificationChannel, DEFAULT_NOTIFY_PORT};
pub use exit_guard::{empty_dir, shutdown_signal, ExitGuard};
pub use lifecycle::{EventSink, LifecycleState, RebuildHook, RebuildLifecycle};
pub use modules::{content_type_for, purge, LoadedModule, ModuleRegistry};

use serde::{Deserialize, Serialize};

/// Prefix of every lifecycle log line, on the console and in browsers.
pub const LOG_MARKER: &str = "🔥 ";

/// Message pushed to connected browsers.
///
/// Serialized as a JSON object with a `type` field:
/// `{"type":"LOG","message":"🔥 Rebuilding..."}` or `{"type":"RELOAD"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationEvent {
    /// A line for the browser console
    Log { message: String },

    /// Reload the page
    Reload,

    /// Any event type this version does not know
    #[serde(other)]
    Unknown,
}

impl NotificationEvent {
    pub fn log(message: impl Into<String>) -> Self {
        NotificationEvent::Log {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let log = NotificationEvent::log("🔥 Rebuilding...");
        assert_eq!(
            serde_json::to_string(&log).unwrap(),
            r#"{"type":"LOG","message":"🔥 Rebuilding..."}"#
        );
        assert_eq!(
            serde_json::to_string(&NotificationEvent::Reload).unwrap(),
            r#"{"type":"RELOAD"}"#
        );
    }

    #[test]
    fn test_unknown_event_type() {
        let event: NotificationEvent = serde_json::from_str(r#"{"type":"PING"}"#).unwrap();
        assert_eq!(event, NotificationEvent::Unknown);
    }
}
