//! Channel registry for the IPC boundary.
//!
//! Every channel crossing the host/guest boundary is declared here with a
//! security level and explicit sender/receiver allow-lists. Authorization
//! checks never fail hard: an unknown channel or identity simply yields
//! `false` from the predicates.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Identity wildcard accepted by the sender/receiver allow-lists.
pub const ANY_IDENTITY: &str = "all";

/// Security classification of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// Freely usable by any declared participant.
    Public,
    /// Carries commands that mutate host state.
    Protected,
    /// Host-internal only.
    Private,
}

/// Declaration of a single IPC channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDescriptor {
    /// Channel name, e.g. `window:create`.
    pub name: String,
    /// Human-readable description of the channel's purpose.
    pub description: String,
    /// Loose JSON schema of the expected payload.
    pub payload_schema: Value,
    /// Security classification.
    pub security_level: SecurityLevel,
    /// Identities allowed to send on this channel.
    pub allowed_senders: Vec<String>,
    /// Identities allowed to receive on this channel.
    pub allowed_receivers: Vec<String>,
}

impl ChannelDescriptor {
    fn new(
        name: &str,
        description: &str,
        payload_schema: Value,
        security_level: SecurityLevel,
        allowed_senders: &[&str],
        allowed_receivers: &[&str],
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            payload_schema,
            security_level,
            allowed_senders: allowed_senders.iter().map(ToString::to_string).collect(),
            allowed_receivers: allowed_receivers.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Registry of all declared IPC channels.
///
/// Constructed once by the composition root and shared by reference with
/// every collaborator that needs authorization checks.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, ChannelDescriptor>,
}

impl ChannelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry populated with every builtin channel.
    #[must_use]
    pub fn with_builtin_channels() -> Self {
        let mut registry = Self::new();
        for descriptor in builtin_channels() {
            registry.register(descriptor);
        }
        registry
    }

    /// Registers a channel, replacing any previous declaration of the same
    /// name.
    pub fn register(&mut self, descriptor: ChannelDescriptor) {
        self.channels.insert(descriptor.name.clone(), descriptor);
    }

    /// Looks up a channel declaration.
    #[must_use]
    pub fn get_channel(&self, name: &str) -> Option<&ChannelDescriptor> {
        self.channels.get(name)
    }

    /// Returns `true` if the channel is declared.
    #[must_use]
    pub fn channel_exists(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Returns `true` if `sender` may send on `channel`.
    ///
    /// Unknown channels yield `false`.
    #[must_use]
    pub fn can_send(&self, channel: &str, sender: &str) -> bool {
        self.channels
            .get(channel)
            .is_some_and(|descriptor| identity_allowed(&descriptor.allowed_senders, sender))
    }

    /// Returns `true` if `receiver` may receive on `channel`.
    ///
    /// Unknown channels yield `false`.
    #[must_use]
    pub fn can_receive(&self, channel: &str, receiver: &str) -> bool {
        self.channels
            .get(channel)
            .is_some_and(|descriptor| identity_allowed(&descriptor.allowed_receivers, receiver))
    }

    /// Names of all channels at the given security level.
    #[must_use]
    pub fn channels_for_security_level(&self, level: SecurityLevel) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .channels
            .values()
            .filter(|descriptor| descriptor.security_level == level)
            .map(|descriptor| descriptor.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Names of all channels the given identity may send on.
    #[must_use]
    pub fn channels_for_sender(&self, sender: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .channels
            .values()
            .filter(|descriptor| identity_allowed(&descriptor.allowed_senders, sender))
            .map(|descriptor| descriptor.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Names of all channels the given identity may receive on.
    #[must_use]
    pub fn channels_for_receiver(&self, receiver: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .channels
            .values()
            .filter(|descriptor| identity_allowed(&descriptor.allowed_receivers, receiver))
            .map(|descriptor| descriptor.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Names of every declared channel.
    #[must_use]
    pub fn all_channel_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.channels.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Names of all public channels.
    #[must_use]
    pub fn public_channel_names(&self) -> Vec<&str> {
        self.channels_for_security_level(SecurityLevel::Public)
    }

    /// Names of all protected channels.
    #[must_use]
    pub fn protected_channel_names(&self) -> Vec<&str> {
        self.channels_for_security_level(SecurityLevel::Protected)
    }

    /// Names of all private channels.
    #[must_use]
    pub fn private_channel_names(&self) -> Vec<&str> {
        self.channels_for_security_level(SecurityLevel::Private)
    }
}

fn identity_allowed(allowed: &[String], identity: &str) -> bool {
    allowed.iter().any(|entry| entry == identity || entry == ANY_IDENTITY)
}

#[allow(clippy::too_many_lines)]
fn builtin_channels() -> Vec<ChannelDescriptor> {
    vec![
        ChannelDescriptor::new(
            "app:ready",
            "Application metadata requested by a guest at startup",
            json!({ "type": "object" }),
            SecurityLevel::Public,
            &["renderer"],
            &["main"],
        ),
        ChannelDescriptor::new(
            "app:error",
            "Application-level error notification",
            json!({ "type": "object", "required": ["message"] }),
            SecurityLevel::Public,
            &["main", "renderer"],
            &["all"],
        ),
        ChannelDescriptor::new(
            "app:quit",
            "Graceful shutdown request",
            json!({ "type": "object" }),
            SecurityLevel::Protected,
            &["renderer"],
            &["main"],
        ),
        ChannelDescriptor::new(
            "window:create",
            "Create a window of a given type",
            json!({ "type": "object", "required": ["windowType"] }),
            SecurityLevel::Protected,
            &["main", "renderer"],
            &["main"],
        ),
        ChannelDescriptor::new(
            "window:close",
            "Close a window by id",
            json!({ "type": "object", "required": ["windowId"] }),
            SecurityLevel::Protected,
            &["main", "renderer"],
            &["main"],
        ),
        ChannelDescriptor::new(
            "window:message",
            "Arbitrary message routed between windows",
            json!({ "type": "object", "required": ["targetWindowId"] }),
            SecurityLevel::Public,
            &["all"],
            &["all"],
        ),
        ChannelDescriptor::new(
            "window:state-sync",
            "Shared state update pushed from one window to the rest",
            json!({ "type": "object", "required": ["domain", "key"] }),
            SecurityLevel::Public,
            &["all"],
            &["all"],
        ),
        ChannelDescriptor::new(
            "window:request-sync",
            "Request the current shared state for a domain",
            json!({ "type": "object", "required": ["domain"] }),
            SecurityLevel::Public,
            &["renderer"],
            &["main"],
        ),
        ChannelDescriptor::new(
            "window:event",
            "Window lifecycle event rebroadcast to guests",
            json!({ "type": "object", "required": ["event"] }),
            SecurityLevel::Public,
            &["main"],
            &["all"],
        ),
        ChannelDescriptor::new(
            "window:created",
            "Notification that a window finished creation",
            json!({ "type": "object", "required": ["windowId", "windowType"] }),
            SecurityLevel::Protected,
            &["main"],
            &["all"],
        ),
        ChannelDescriptor::new(
            "window:closed",
            "Notification that a window was destroyed",
            json!({ "type": "object", "required": ["windowId"] }),
            SecurityLevel::Protected,
            &["main"],
            &["all"],
        ),
        ChannelDescriptor::new(
            "camera:list",
            "Enumerate available capture devices",
            json!({ "type": "object" }),
            SecurityLevel::Public,
            &["renderer"],
            &["main"],
        ),
        ChannelDescriptor::new(
            "camera:start",
            "Start a capture session",
            json!({ "type": "object" }),
            SecurityLevel::Protected,
            &["renderer"],
            &["main"],
        ),
        ChannelDescriptor::new(
            "camera:stop",
            "Stop the capture session",
            json!({ "type": "object" }),
            SecurityLevel::Protected,
            &["renderer"],
            &["main"],
        ),
        ChannelDescriptor::new(
            "camera:frame",
            "Captured frame pushed to guests",
            json!({ "type": "object", "required": ["timestamp"] }),
            SecurityLevel::Public,
            &["main"],
            &["renderer"],
        ),
        ChannelDescriptor::new(
            "detection:start",
            "Start detection processing",
            json!({ "type": "object" }),
            SecurityLevel::Protected,
            &["renderer"],
            &["main"],
        ),
        ChannelDescriptor::new(
            "detection:stop",
            "Stop detection processing",
            json!({ "type": "object" }),
            SecurityLevel::Protected,
            &["renderer"],
            &["main"],
        ),
        ChannelDescriptor::new(
            "detection:face:found",
            "Face detection result broadcast",
            json!({ "type": "object", "required": ["faces"] }),
            SecurityLevel::Public,
            &["main"],
            &["all"],
        ),
        ChannelDescriptor::new(
            "detection:eye-contact:detected",
            "Eye contact detection result broadcast",
            json!({ "type": "object", "required": ["detected"] }),
            SecurityLevel::Public,
            &["main"],
            &["all"],
        ),
        ChannelDescriptor::new(
            "config:get",
            "Read the application configuration",
            json!({ "type": "object" }),
            SecurityLevel::Public,
            &["renderer"],
            &["main"],
        ),
        ChannelDescriptor::new(
            "config:update",
            "Patch the application configuration",
            json!({ "type": "object" }),
            SecurityLevel::Protected,
            &["main", "renderer"],
            &["all"],
        ),
        ChannelDescriptor::new(
            "state:get",
            "Read a value from the shared state store",
            json!({ "type": "object", "required": ["domain"] }),
            SecurityLevel::Public,
            &["renderer"],
            &["main"],
        ),
        ChannelDescriptor::new(
            "state:set",
            "Write a value into the shared state store",
            json!({ "type": "object", "required": ["domain", "key"] }),
            SecurityLevel::Protected,
            &["renderer"],
            &["main"],
        ),
        ChannelDescriptor::new(
            "state:update",
            "Synced state change pushed to guests",
            json!({ "type": "object", "required": ["domain", "key"] }),
            SecurityLevel::Public,
            &["main"],
            &["renderer"],
        ),
        ChannelDescriptor::new(
            "log:message",
            "Guest log record forwarded to the host logger",
            json!({ "type": "object", "required": ["level", "message"] }),
            SecurityLevel::Public,
            &["renderer"],
            &["main"],
        ),
    ]
}
