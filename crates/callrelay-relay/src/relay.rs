// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Process-scoped assembly of the relay.  Created once at startup by the host
// and kept for the life of the process; the OS provider registration it
// holds has no teardown.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use callrelay_bridge::traits::{AppEndpoint, PlatformBridge};
use callrelay_core::config::RelayConfig;
use callrelay_core::error::Result;

use crate::actions::ActionRegistry;
use crate::channel::{BridgeChannel, DeliveryReport};
use crate::reporter::CallSessionReporter;
use crate::router::EventRouter;

pub struct CallRelay {
    router: EventRouter,
}

impl CallRelay {
    /// Register the call provider with the OS and spawn the bridge channel.
    ///
    /// Must run inside a tokio runtime.
    pub fn start(
        config: &RelayConfig,
        platform: Box<dyn PlatformBridge>,
        endpoint: Arc<dyn AppEndpoint>,
    ) -> Result<Self> {
        let reporter = CallSessionReporter::new(platform, config.provider.clone());
        reporter.register()?;

        let channel = BridgeChannel::spawn(
            endpoint,
            config.channel_prefix.clone(),
            config.delivery.clone(),
        );
        let registry = ActionRegistry::new(&config.extra_actions);
        info!(
            platform = reporter.platform_name(),
            prefix = %config.channel_prefix,
            actions = registry.len(),
            "call relay started"
        );

        Ok(Self {
            router: EventRouter::new(registry, reporter, channel),
        })
    }

    /// The inbound port for native events.
    pub fn router(&mut self) -> &mut EventRouter {
        &mut self.router
    }

    pub fn reports(&self) -> broadcast::Receiver<DeliveryReport> {
        self.router.channel().subscribe()
    }

    /// Stop the bridge channel. Only used when the host itself exits.
    pub fn shutdown(&self) {
        self.router.channel().shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use callrelay_core::config::ProviderConfig;
    use callrelay_core::value::NativeValue;

    use crate::channel::DeliveryOutcome;
    use crate::router::Routed;
    use crate::testing::{FakePlatform, RecordingEndpoint};

    #[tokio::test(start_paused = true)]
    async fn start_registers_provider_and_routes() {
        let platform = FakePlatform::new();
        let endpoint = RecordingEndpoint::not_ready();
        let mut config = RelayConfig::default();
        config.provider = ProviderConfig {
            localized_name: "Acme Phone".into(),
            ..ProviderConfig::default()
        };

        let mut relay = CallRelay::start(&config, Box::new(platform.clone()), endpoint.clone()).unwrap();
        assert_eq!(
            platform.state().registered.as_ref().map(|p| p.localized_name.as_str()),
            Some("Acme Phone")
        );

        let mut reports = relay.reports();
        let routed = relay
            .router()
            .on_native_event(
                "ACTION_CALL_ACCEPT",
                Some(NativeValue::map([("call_id", NativeValue::from("abc-123"))])),
            )
            .unwrap();
        let Routed::Forwarded(id) = routed else {
            panic!("accept not forwarded: {routed:?}");
        };

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(endpoint.calls().is_empty());
        endpoint.set_ready(true);

        let report = reports.recv().await.unwrap();
        assert_eq!(report.id, id);
        assert!(matches!(report.outcome, DeliveryOutcome::Delivered { .. }));
        assert_eq!(endpoint.calls()[0].channel, "com.callrelay.app/callkit");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drops_pending_messages() {
        let endpoint = RecordingEndpoint::not_ready();
        let mut relay =
            CallRelay::start(&RelayConfig::default(), Box::new(FakePlatform::new()), endpoint.clone())
                .unwrap();
        let mut reports = relay.reports();

        relay.router().on_foreground_resume();
        relay.shutdown();
        assert_eq!(reports.recv().await.unwrap().outcome, DeliveryOutcome::Cancelled);
    }
}
