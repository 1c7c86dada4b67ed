//! Message envelope for all IPC traffic.
//!
//! Every payload crossing the host/guest boundary travels inside a
//! [`Message`]. Responses reuse the id of the request they answer, which is
//! what request/response correlation hangs off.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// Number of random base36 characters in a generated message id.
const ID_RANDOM_LEN: usize = 9;

/// Kind discriminant of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
    Notification,
    Error,
}

/// The envelope every IPC payload travels in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Message kind.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Correlation id. Responses carry the id of their request.
    pub id: String,
    /// Channel the message belongs to.
    pub channel: String,
    /// Channel-specific payload.
    pub payload: Value,
    /// Creation time in unix milliseconds.
    pub timestamp: u64,
    /// Identity of the sender, e.g. `main` or `renderer-17...`.
    pub source: String,
    /// Identity of the intended receiver. Required for requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

impl Message {
    /// Creates a request message with a fresh id.
    #[must_use]
    pub fn request(channel: &str, payload: Value, source: &str, destination: &str) -> Self {
        Self {
            kind: MessageKind::Request,
            id: generate_id(),
            channel: channel.to_string(),
            payload,
            timestamp: unix_millis(),
            source: source.to_string(),
            destination: Some(destination.to_string()),
        }
    }

    /// Creates a response correlated with the given request.
    #[must_use]
    pub fn response(request: &Self, payload: Value, source: &str) -> Self {
        Self {
            kind: MessageKind::Response,
            id: request.id.clone(),
            channel: request.channel.clone(),
            payload,
            timestamp: unix_millis(),
            source: source.to_string(),
            destination: Some(request.source.clone()),
        }
    }

    /// Creates a notification. Notifications need no destination.
    #[must_use]
    pub fn notification(channel: &str, payload: Value, source: &str) -> Self {
        Self {
            kind: MessageKind::Notification,
            id: generate_id(),
            channel: channel.to_string(),
            payload,
            timestamp: unix_millis(),
            source: source.to_string(),
            destination: None,
        }
    }

    /// Creates a notification addressed to a specific receiver.
    #[must_use]
    pub fn notification_to(channel: &str, payload: Value, source: &str, destination: &str) -> Self {
        let mut message = Self::notification(channel, payload, source);
        message.destination = Some(destination.to_string());
        message
    }

    /// Creates a standalone error message.
    ///
    /// The payload must carry `code` and `message` fields to pass
    /// [`validate_message`].
    #[must_use]
    pub fn error(channel: &str, payload: Value, source: &str) -> Self {
        Self {
            kind: MessageKind::Error,
            id: generate_id(),
            channel: channel.to_string(),
            payload,
            timestamp: unix_millis(),
            source: source.to_string(),
            destination: None,
        }
    }

    /// Creates a success response wrapping `data` in the standard envelope.
    #[must_use]
    pub fn success_response(request: &Self, data: Value, source: &str) -> Self {
        Self::response(request, json!({ "success": true, "data": data }), source)
    }

    /// Creates an error response wrapping the error in the standard envelope.
    #[must_use]
    pub fn error_response(
        request: &Self,
        code: &str,
        message: &str,
        details: Option<Value>,
        source: &str,
    ) -> Self {
        let mut error = json!({ "code": code, "message": message });
        if let (Some(details), Some(map)) = (details, error.as_object_mut()) {
            map.insert("details".to_string(), details);
        }
        Self::response(request, json!({ "success": false, "error": error }), source)
    }

    /// Returns `true` if this is a request.
    #[must_use]
    pub const fn is_request(&self) -> bool {
        matches!(self.kind, MessageKind::Request)
    }

    /// Returns `true` if this is a response carrying a success envelope.
    #[must_use]
    pub fn is_success_response(&self) -> bool {
        matches!(self.kind, MessageKind::Response) && self.payload["success"] == json!(true)
    }

    /// Returns `true` if this is an error message or a response carrying a
    /// failure envelope.
    #[must_use]
    pub fn is_error_response(&self) -> bool {
        match self.kind {
            MessageKind::Error => true,
            MessageKind::Response => self.payload["success"] == json!(false),
            _ => false,
        }
    }

    /// Extracts the error carried by a failure envelope, if any.
    #[must_use]
    pub fn error_from_response(&self) -> Option<ResponseError> {
        if !self.is_error_response() {
            return None;
        }
        let error = if self.kind == MessageKind::Error {
            &self.payload
        } else {
            &self.payload["error"]
        };
        serde_json::from_value(error.clone()).ok()
    }

    /// Extracts the data carried by a success envelope, or the raw payload
    /// when the message carries no envelope.
    #[must_use]
    pub fn response_data(&self) -> Value {
        if self.is_success_response() {
            self.payload["data"].clone()
        } else {
            self.payload.clone()
        }
    }
}

/// Error carried by a failure envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Optional structured context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Validation failures for incoming messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message is missing required field '{0}'")]
    MissingField(&'static str),
    #[error("request message has no destination")]
    RequestWithoutDestination,
    #[error("error message payload is missing '{0}'")]
    MalformedErrorPayload(&'static str),
}

/// Validates the structural invariants of a message.
///
/// # Errors
///
/// Returns a [`ValidationError`] when a required field is empty, a request
/// lacks a destination, or an error payload lacks `code`/`message`.
pub fn validate_message(message: &Message) -> Result<(), ValidationError> {
    if message.id.is_empty() {
        return Err(ValidationError::MissingField("id"));
    }
    if message.channel.is_empty() {
        return Err(ValidationError::MissingField("channel"));
    }
    if message.source.is_empty() {
        return Err(ValidationError::MissingField("source"));
    }
    if message.is_request() && message.destination.as_deref().is_none_or(str::is_empty) {
        return Err(ValidationError::RequestWithoutDestination);
    }
    if message.kind == MessageKind::Error {
        if message.payload.get("code").is_none() {
            return Err(ValidationError::MalformedErrorPayload("code"));
        }
        if message.payload.get("message").is_none() {
            return Err(ValidationError::MalformedErrorPayload("message"));
        }
    }
    Ok(())
}

/// Generates a message id of the form `<unix-millis>-<base36 random>`.
#[must_use]
pub fn generate_id() -> String {
    format!("{}-{}", unix_millis(), random_base36(ID_RANDOM_LEN))
}

/// Generates `len` random base36 characters.
#[must_use]
pub fn random_base36(len: usize) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}
