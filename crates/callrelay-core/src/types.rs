// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the callrelay telephony bridge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::{CanonicalPayload, CanonicalValue};

/// Namespace for deriving OS call UUIDs from non-UUID call identifiers.
const CALL_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6c0f_5a3e_91d2_4b7e_a8c4_3f1e_2d9b_7c55);

/// Identifier of one OS-tracked call.
///
/// `raw` is the identifier as the push payload carried it (and as the
/// application layer knows it).  `uuid` is what the OS call subsystem sees:
/// the raw value itself when it parses as a UUID, otherwise a stable v5 UUID
/// derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId {
    raw: String,
    uuid: Uuid,
}

impl CallId {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let uuid = Uuid::parse_str(&raw)
            .unwrap_or_else(|_| Uuid::new_v5(&CALL_ID_NAMESPACE, raw.as_bytes()));
        Self { raw, uuid }
    }

    /// Identifier for an OS-originated call, which only ever has a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self {
            raw: uuid.to_string(),
            uuid,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Lifecycle phase of a [`CallSession`].
///
/// ```text
/// Pending -> Reported -> Active -> Ended
///                  \_____________/^
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallPhase {
    /// Created locally, not yet accepted by the OS.
    Pending,
    /// The OS accepted the report and is showing its call UI.
    Reported,
    /// Audio route activated for the call.
    Active,
    /// Torn down. Terminal.
    Ended,
}

impl CallPhase {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: CallPhase) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Reported)
                | (Self::Reported, Self::Active)
                | (Self::Reported, Self::Ended)
                | (Self::Active, Self::Ended)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Ended
    }
}

impl std::fmt::Display for CallPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Reported => "reported",
            Self::Active => "active",
            Self::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// Kind of remote handle shown by the OS call UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleType {
    PhoneNumber,
    EmailAddress,
    Generic,
}

/// One OS-tracked telephony call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSession {
    pub id: CallId,
    pub caller_name: String,
    pub caller_number: String,
    pub has_video: bool,
    pub phase: CallPhase,
    /// Set once the OS has delivered an answer (or start) action.
    pub answered: bool,
    /// Tells apart successive sessions that reuse one call id.
    #[serde(default)]
    pub epoch: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CallSession {
    pub fn new(id: CallId, caller_name: String, caller_number: String, has_video: bool) -> Self {
        let now = Utc::now();
        Self {
            id,
            caller_name,
            caller_number,
            has_video,
            phase: CallPhase::Pending,
            answered: false,
            epoch: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Canonical classification of a native telephony event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallEventKind {
    IncomingPush,
    Accept,
    Decline,
    Answer,
    End,
    Start,
    ForegroundResume,
    /// The push credential changed.
    TokenUpdated,
}

/// A platform-neutral telephony event.  Payloads are already normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct CallEvent {
    pub kind: CallEventKind,
    pub call_id: Option<CallId>,
    pub payload: Option<CanonicalPayload>,
}

impl CallEvent {
    pub fn new(kind: CallEventKind) -> Self {
        Self {
            kind,
            call_id: None,
            payload: None,
        }
    }

    pub fn with_call_id(mut self, call_id: CallId) -> Self {
        self.call_id = Some(call_id);
        self
    }

    pub fn with_payload(mut self, payload: CanonicalPayload) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Unique identifier for a bridge message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Application-side method channel a message is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    /// Call UI actions and app lifecycle.
    CallKit,
    /// Push token and incoming-call notifications.
    Voip,
}

impl ChannelKind {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::CallKit => "callkit",
            Self::Voip => "voip",
        }
    }

    /// Full channel name under the configured prefix.
    pub fn channel_name(self, prefix: &str) -> String {
        format!("{prefix}/{}", self.suffix())
    }
}

/// Outbound method names understood by the application layer.
pub mod methods {
    pub const CALLKIT_ACCEPT_LAUNCHED: &str = "callkitAcceptLaunched";
    pub const VOIP_TOKEN_RECEIVED: &str = "onVoIPTokenReceived";
    pub const INCOMING_CALL: &str = "onIncomingCall";
    pub const ANSWER_CALL: &str = "answerCall";
    pub const END_CALL: &str = "endCall";
    pub const APP_DID_BECOME_ACTIVE: &str = "appDidBecomeActive";
}

/// One outbound unit on the bridge channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeMessage {
    pub id: MessageId,
    pub channel: ChannelKind,
    pub method: String,
    pub arguments: CanonicalValue,
    /// Messages sharing a dedupe key are delivered at most once per window.
    pub dedupe_key: Option<String>,
}

impl BridgeMessage {
    pub fn new(channel: ChannelKind, method: impl Into<String>, arguments: CanonicalValue) -> Self {
        Self {
            id: MessageId::new(),
            channel,
            method: method.into(),
            arguments,
            dedupe_key: None,
        }
    }

    pub fn with_dedupe_key(mut self, key: impl Into<String>) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }
}
