// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic port definitions for the OS telephony subsystem and the
// application-layer endpoint.
//
// The relay drives the OS through `PlatformBridge` (CallKit on iOS,
// ConnectionService on Android) and reaches the application layer through
// `AppEndpoint` (a Flutter-style method channel).

use callrelay_core::config::ProviderConfig;
use callrelay_core::error::Result;
use callrelay_core::types::{CallId, HandleType};
use callrelay_core::value::CanonicalValue;

/// Unified OS bridge that groups the call-management capabilities.
pub trait PlatformBridge: CallProvider + AudioRoute {
    /// Human-readable platform name (e.g. "iOS", "Android").
    fn platform_name(&self) -> &str;
}

/// The OS call-management subsystem (`CXProvider`, `TelecomManager`).
pub trait CallProvider {
    /// Register the app's call capabilities. Called once at startup.
    fn register(&self, config: &ProviderConfig) -> Result<()>;

    /// Report a newly arrived incoming call so the OS shows its call UI.
    ///
    /// Returns `CallRelayError::Report` when the OS rejects the call
    /// (duplicate identifier, capability mismatch, do-not-disturb, ...).
    fn report_new_incoming_call(&self, update: &CallUpdate) -> Result<()>;

    /// Tell the OS a call ended for a reason it did not initiate itself.
    fn report_call_ended(&self, call: &CallId, reason: EndReason) -> Result<()>;
}

/// The OS audio session used while a call is live.
pub trait AudioRoute {
    /// Put the audio session into call mode (play-and-record, voice chat,
    /// bluetooth allowed, other audio ducked) and activate it.
    fn configure_for_call(&self) -> Result<()>;

    /// Release the call-mode audio session.
    fn deactivate(&self) -> Result<()>;
}

/// The application-layer receiver of bridge messages.
///
/// Invoked only from the bridge channel's worker, so implementations see a
/// single consistent calling context.
pub trait AppEndpoint: Send + Sync {
    /// Whether the application layer is attached and can accept messages.
    fn is_ready(&self) -> bool;

    /// Fire-and-forget method invocation. No return value is read back.
    fn invoke(&self, channel: &str, method: &str, arguments: &CanonicalValue) -> Result<()>;
}

/// Acknowledgement handle for an action the OS asked the app to perform.
///
/// Exactly one of the two methods is called, after the corresponding event
/// has been handed to the bridge channel.
pub trait ActionAck {
    fn fulfill(self: Box<Self>);
    fn fail(self: Box<Self>);
}

/// Description of an incoming call for the OS call UI.
#[derive(Debug, Clone, PartialEq)]
pub struct CallUpdate {
    pub call: CallId,
    pub handle_type: HandleType,
    pub handle_value: String,
    pub caller_name: String,
    pub has_video: bool,
}

/// Why a call ended, as reported to the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Failed,
    RemoteEnded,
    Unanswered,
    AnsweredElsewhere,
    DeclinedElsewhere,
}

impl EndReason {
    /// Numeric code shared with the native glue (matches
    /// `CXCallEndedReason` raw values).
    pub fn code(self) -> u32 {
        match self {
            Self::Failed => 1,
            Self::RemoteEnded => 2,
            Self::Unanswered => 3,
            Self::AnsweredElsewhere => 4,
            Self::DeclinedElsewhere => 5,
        }
    }
}

/// Bit for each handle type in the mask shared with the native glue.
pub fn handle_type_mask(types: &[HandleType]) -> u32 {
    types.iter().fold(0, |mask, t| {
        mask | match t {
            HandleType::Generic => 1 << 0,
            HandleType::PhoneNumber => 1 << 1,
            HandleType::EmailAddress => 1 << 2,
        }
    })
}

/// Simultaneous calls a `PhoneAccount` may hold, clamped to a JNI `int`.
pub fn max_simultaneous_calls(config: &ProviderConfig) -> i32 {
    i32::try_from(config.max_call_groups.saturating_mul(config.max_calls_per_group))
        .unwrap_or(i32::MAX)
}

/// Numeric handle type shared with the native glue (`CXHandle.HandleType`).
pub fn handle_type_code(handle: HandleType) -> u32 {
    match handle {
        HandleType::Generic => 1,
        HandleType::PhoneNumber => 2,
        HandleType::EmailAddress => 3,
    }
}
