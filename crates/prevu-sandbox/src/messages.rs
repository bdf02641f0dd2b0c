//! Host ↔ sandbox message protocol.
//!
//! The sandbox posts exactly three message kinds; their wire shapes are a
//! stable contract consumed by hosts (`{"type": …, "payload": {…}}`). Every
//! message travels inside an [`Envelope`] stamped with the posting sandbox's
//! instance id, and the session drops envelopes from any instance other
//! than the currently mounted one — the equivalent of validating a message
//! event's source window before trusting its payload.

use serde::{Deserialize, Serialize};

/// Console severity levels captured inside the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Log,
    Warn,
    Error,
    Info,
    Debug,
}

/// A structured message posted from the sandbox to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SandboxMessage {
    /// An otherwise-unhandled runtime exception. The only path by which a
    /// runtime (as opposed to compile-time) error reaches the host.
    PreviewError {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },

    /// One captured console call.
    ConsoleLog { level: LogLevel, message: String },

    /// A visual-selection click on an element in the preview.
    VisualEditSelect {
        selector: String,
        #[serde(rename = "tagName")]
        tag_name: String,
    },
}

/// A message plus the posting sandbox's instance id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub sandbox_id: u64,
    pub message: SandboxMessage,
}
