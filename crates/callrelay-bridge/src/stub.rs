// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stub bridge for desktop/CI builds where no OS call subsystem exists.
//
// The provider side accepts every request and logs what a phone would have
// shown, so recorded event streams can be replayed on a workstation.  The
// endpoint side is never ready: desktop hosts supply their own endpoint.

use callrelay_core::config::ProviderConfig;
use callrelay_core::error::{CallRelayError, Result};
use callrelay_core::types::CallId;
use callrelay_core::value::CanonicalValue;

use crate::traits::*;

/// Provider bridge returned on non-mobile platforms.
pub struct StubBridge;

impl PlatformBridge for StubBridge {
    fn platform_name(&self) -> &str {
        "Desktop (stub)"
    }
}

impl CallProvider for StubBridge {
    fn register(&self, config: &ProviderConfig) -> Result<()> {
        tracing::info!(
            name = %config.localized_name,
            groups = config.max_call_groups,
            per_group = config.max_calls_per_group,
            video = config.supports_video,
            "stub provider registered"
        );
        Ok(())
    }

    fn report_new_incoming_call(&self, update: &CallUpdate) -> Result<()> {
        tracing::info!(
            call_id = %update.call,
            os_uuid = %update.call.uuid(),
            caller = %update.caller_name,
            handle = %update.handle_value,
            "stub provider: incoming call would ring here"
        );
        Ok(())
    }

    fn report_call_ended(&self, call: &CallId, reason: EndReason) -> Result<()> {
        tracing::info!(call_id = %call, reason = ?reason, "stub provider: call ended");
        Ok(())
    }
}

impl AudioRoute for StubBridge {
    fn configure_for_call(&self) -> Result<()> {
        tracing::debug!("stub audio route: call mode");
        Ok(())
    }

    fn deactivate(&self) -> Result<()> {
        tracing::debug!("stub audio route: released");
        Ok(())
    }
}

/// Endpoint with no application layer behind it.
pub struct StubEndpoint;

impl AppEndpoint for StubEndpoint {
    fn is_ready(&self) -> bool {
        false
    }

    fn invoke(&self, channel: &str, method: &str, _arguments: &CanonicalValue) -> Result<()> {
        tracing::warn!(channel, method, "AppEndpoint::invoke called on stub endpoint");
        Err(CallRelayError::PlatformUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callrelay_core::types::HandleType;

    #[test]
    fn stub_provider_accepts_everything() {
        let bridge = StubBridge;
        assert_eq!(bridge.platform_name(), "Desktop (stub)");
        bridge.register(&ProviderConfig::default()).unwrap();
        let update = CallUpdate {
            call: CallId::new("abc-123"),
            handle_type: HandleType::Generic,
            handle_value: "+15551234567".into(),
            caller_name: "Jane".into(),
            has_video: false,
        };
        bridge.report_new_incoming_call(&update).unwrap();
        bridge.report_call_ended(&update.call, EndReason::RemoteEnded).unwrap();
        bridge.configure_for_call().unwrap();
        bridge.deactivate().unwrap();
    }

    #[test]
    fn stub_endpoint_is_never_ready() {
        let endpoint = StubEndpoint;
        assert!(!endpoint.is_ready());
        assert!(matches!(
            endpoint.invoke("p/callkit", "answerCall", &CanonicalValue::Null),
            Err(CallRelayError::PlatformUnavailable)
        ));
    }
}
