// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for callrelay.

use thiserror::Error;

use crate::types::CallPhase;

/// Top-level error type for all callrelay operations.
#[derive(Debug, Error)]
pub enum CallRelayError {
    // -- Event routing --
    #[error("malformed {event} payload: missing {}", missing.join(", "))]
    MalformedPayload {
        event: &'static str,
        missing: Vec<&'static str>,
    },

    // -- OS call subsystem --
    #[error("call {call_id} rejected by the OS: {reason}")]
    Report { call_id: String, reason: String },

    #[error("audio session configuration failed: {0}")]
    AudioSession(String),

    #[error("call {call_id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        call_id: String,
        from: CallPhase,
        to: CallPhase,
    },

    // -- Bridge channel --
    #[error("delivery of {method} timed out after {attempts} attempts")]
    DeliveryTimeout { method: String, attempts: u32 },

    #[error("application endpoint error: {0}")]
    Endpoint(String),

    // -- Platform bridge --
    #[error("platform bridge error: {0}")]
    Bridge(String),

    #[error("feature not available on this platform")]
    PlatformUnavailable,

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How far an error propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Handled where it happened; caller never sees it.
    Local,
    /// Drops the one event being routed; nothing is forwarded.
    EventTerminal,
    /// Ends the one call session; the OS is told about the failure.
    SessionTerminal,
    /// Worth another attempt later.
    Retryable,
}

impl CallRelayError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::MalformedPayload { .. } => ErrorClass::EventTerminal,
            Self::InvalidTransition { .. } => ErrorClass::EventTerminal,
            Self::Endpoint(_) => ErrorClass::EventTerminal,
            Self::DeliveryTimeout { .. } => ErrorClass::EventTerminal,
            Self::Serialization(_) => ErrorClass::EventTerminal,

            Self::Report { .. } => ErrorClass::SessionTerminal,

            // The call keeps going without a guaranteed audio route.
            Self::AudioSession(_) => ErrorClass::Local,
            Self::PlatformUnavailable => ErrorClass::Local,

            Self::Bridge(_) => ErrorClass::Retryable,
            Self::Io(io_err) => match io_err.kind() {
                std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::WouldBlock => ErrorClass::Retryable,
                _ => ErrorClass::Local,
            },
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CallRelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_lists_missing_fields() {
        let err = CallRelayError::MalformedPayload {
            event: "IncomingPush",
            missing: vec!["caller_number", "voice_sdk_id"],
        };
        assert_eq!(
            err.to_string(),
            "malformed IncomingPush payload: missing caller_number, voice_sdk_id"
        );
        assert_eq!(err.class(), ErrorClass::EventTerminal);
    }

    #[test]
    fn report_error_ends_the_session_only() {
        let err = CallRelayError::Report {
            call_id: "xyz".into(),
            reason: "duplicate call identifier".into(),
        };
        assert_eq!(err.class(), ErrorClass::SessionTerminal);
        assert!(err.to_string().contains("xyz"));
    }

    #[test]
    fn audio_failure_is_local() {
        assert_eq!(
            CallRelayError::AudioSession("category rejected".into()).class(),
            ErrorClass::Local
        );
    }
}
