//! Message transforms for backend→client traffic.
//!
//! A transform sees application messages only; control frames never reach
//! it. Its return value decides the outbound framing: `Text` goes out as a
//! text frame, `Binary` as a binary frame.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use tokio_tungstenite::tungstenite::Message;

/// A decoded application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    Text(String),
    Binary(Bytes),
}

impl WsMessage {
    /// True for text payloads.
    pub fn is_text(&self) -> bool {
        matches!(self, WsMessage::Text(_))
    }

    /// Raw payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            WsMessage::Text(text) => text.as_bytes(),
            WsMessage::Binary(data) => data,
        }
    }

    /// Extract an application message from a decoded frame.
    pub fn from_frame(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) => Some(WsMessage::Text(text.as_str().to_owned())),
            Message::Binary(data) => Some(WsMessage::Binary(data)),
            _ => None,
        }
    }

    /// Encode as a single final frame.
    pub fn into_frame(self) -> Message {
        match self {
            WsMessage::Text(text) => Message::text(text),
            WsMessage::Binary(data) => Message::binary(data),
        }
    }
}

/// Error returned by a transform for one message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("transform failed: {0}")]
pub struct TransformError(String);

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A pure `message → message` function.
///
/// Implementations are shared by every tunnel of a service and may be called
/// from many tasks at once.
pub trait Transform: Send + Sync {
    fn apply(&self, message: WsMessage) -> Result<WsMessage, TransformError>;
}

impl<F> Transform for F
where
    F: Fn(WsMessage) -> Result<WsMessage, TransformError> + Send + Sync,
{
    fn apply(&self, message: WsMessage) -> Result<WsMessage, TransformError> {
        self(message)
    }
}

/// Shared handle to a transform.
pub type TransformFunction = Arc<dyn Transform>;

/// Run a transform, turning a panic into a `TransformError`.
pub fn apply_guarded(transform: &dyn Transform, message: WsMessage) -> Result<WsMessage, TransformError> {
    match catch_unwind(AssertUnwindSafe(|| transform.apply(message))) {
        Ok(result) => result,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic".to_string());
            Err(TransformError::new(format!("transform panicked: {}", reason)))
        }
    }
}

/// Returns messages unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Transform for Identity {
    fn apply(&self, message: WsMessage) -> Result<WsMessage, TransformError> {
        Ok(message)
    }
}

/// Uppercases text; binary payloads are uppercased as ASCII.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uppercase;

impl Transform for Uppercase {
    fn apply(&self, message: WsMessage) -> Result<WsMessage, TransformError> {
        Ok(match message {
            WsMessage::Text(text) => WsMessage::Text(text.to_uppercase()),
            WsMessage::Binary(data) => WsMessage::Binary(Bytes::from(data.to_ascii_uppercase())),
        })
    }
}

/// Re-serializes JSON payloads without insignificant whitespace.
///
/// Payloads that are not JSON fail the message.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCompact;

impl Transform for JsonCompact {
    fn apply(&self, message: WsMessage) -> Result<WsMessage, TransformError> {
        let value: serde_json::Value = serde_json::from_slice(message.as_bytes())
            .map_err(|e| TransformError::new(format!("invalid JSON: {}", e)))?;
        let compact = serde_json::to_string(&value).map_err(|e| TransformError::new(e.to_string()))?;
        Ok(match message {
            WsMessage::Text(_) => WsMessage::Text(compact),
            WsMessage::Binary(_) => WsMessage::Binary(Bytes::from(compact)),
        })
    }
}

/// Named transforms that services can refer to from configuration.
#[derive(Clone, Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, TransformFunction>,
}

impl TransformRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `identity`, `uppercase` and `json_compact`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("identity", Identity);
        registry.register("uppercase", Uppercase);
        registry.register("json_compact", JsonCompact);
        registry
    }

    /// Register a transform under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, transform: impl Transform + 'static) {
        self.transforms.insert(name.into(), Arc::new(transform));
    }

    /// Look up a transform by name.
    pub fn get(&self, name: &str) -> Option<TransformFunction> {
        self.transforms.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.transforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("transforms", &self.names())
            .finish()
    }
}
