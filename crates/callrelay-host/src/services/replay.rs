// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Replays newline-delimited JSON host events through the relay, the way the
// OS would deliver them on a phone.

use std::io::Write;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use callrelay_core::error::ErrorClass;
use callrelay_core::types::{CallEventKind, CallId};
use callrelay_core::value::NativeValue;
use callrelay_relay::{CallRelay, DeliveryOutcome, DeliveryReport, Routed};

use super::console::{ConsoleAck, ConsoleEndpoint};

/// One recorded OS or host event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    /// Launch/resume intent with an action identifier.
    Intent {
        action: String,
        #[serde(default)]
        extras: Option<serde_json::Value>,
    },
    /// VoIP push payload.
    Push { payload: serde_json::Value },
    /// Push credentials, hex encoded.
    VoipToken { token: String },
    Answer { call_id: String },
    End { call_id: String },
    Start { call_id: String },
    AudioActivated,
    AudioDeactivated,
    BecameActive,
    ProviderReset,
    /// The application layer finished starting.
    Attach,
    /// The application layer went away.
    Detach,
    /// Pause the replay.
    Wait { ms: u64 },
}

/// Counters for one replay run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub events: usize,
    pub forwarded: usize,
    pub handled: usize,
    pub ignored: usize,
    /// Events the relay refused (malformed, bad transition).
    pub dropped: usize,
    /// Incoming calls the OS refused to show.
    pub rejected: usize,
    /// Lines that were not a valid host event.
    pub invalid: usize,
}

impl ReplayStats {
    fn record(&mut self, routed: Routed) {
        match routed {
            Routed::Forwarded(_) => self.forwarded += 1,
            Routed::Handled => self.handled += 1,
            Routed::Ignored => self.ignored += 1,
        }
    }
}

/// Feed every line of `input` to the relay.
pub async fn replay<R, W>(input: R, relay: &mut CallRelay, endpoint: &ConsoleEndpoint<W>) -> ReplayStats
where
    R: AsyncBufRead + Unpin,
    W: Write + Send,
{
    let mut stats = ReplayStats::default();
    let mut lines = input.lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "event input unreadable, stopping replay");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let event: HostEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, line, "skipping invalid host event");
                stats.invalid += 1;
                continue;
            }
        };
        stats.events += 1;
        apply(event, relay, endpoint, &mut stats).await;
    }

    info!(
        events = stats.events,
        forwarded = stats.forwarded,
        dropped = stats.dropped,
        rejected = stats.rejected,
        invalid = stats.invalid,
        "replay finished"
    );
    stats
}

async fn apply<W: Write + Send>(
    event: HostEvent,
    relay: &mut CallRelay,
    endpoint: &ConsoleEndpoint<W>,
    stats: &mut ReplayStats,
) {
    let router = relay.router();
    let result = match event {
        HostEvent::Intent { action, extras } => {
            router.on_native_event(&action, extras.map(NativeValue::from_json))
        }
        HostEvent::Push { payload } => router.on_push_payload(NativeValue::from_json(payload)),
        HostEvent::VoipToken { token } => match hex::decode(token.trim()) {
            Ok(bytes) => Ok(router.on_voip_token(&bytes)),
            Err(e) => {
                warn!(error = %e, "VoIP token is not hex");
                stats.invalid += 1;
                return;
            }
        },
        HostEvent::Answer { call_id } => provider_action(router, CallEventKind::Answer, "answer", call_id),
        HostEvent::End { call_id } => provider_action(router, CallEventKind::End, "end", call_id),
        HostEvent::Start { call_id } => provider_action(router, CallEventKind::Start, "start", call_id),
        HostEvent::AudioActivated => {
            router.on_audio_activated();
            Ok(Routed::Handled)
        }
        HostEvent::AudioDeactivated => {
            router.on_audio_deactivated();
            Ok(Routed::Handled)
        }
        HostEvent::BecameActive => Ok(router.on_foreground_resume()),
        HostEvent::ProviderReset => {
            router.on_provider_reset();
            Ok(Routed::Handled)
        }
        HostEvent::Attach => {
            endpoint.set_attached(true);
            return;
        }
        HostEvent::Detach => {
            endpoint.set_attached(false);
            return;
        }
        HostEvent::Wait { ms } => {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            return;
        }
    };

    match result {
        Ok(routed) => {
            debug!(?routed, "event routed");
            stats.record(routed);
        }
        // The router has already logged why.
        Err(e) => match e.class() {
            ErrorClass::SessionTerminal => stats.rejected += 1,
            ErrorClass::EventTerminal | ErrorClass::Retryable | ErrorClass::Local => {
                stats.dropped += 1
            }
        },
    }
}

fn provider_action(
    router: &mut callrelay_relay::EventRouter,
    kind: CallEventKind,
    action: &'static str,
    call_id: String,
) -> callrelay_core::error::Result<Routed> {
    let ack = Box::new(ConsoleAck {
        action,
        call_id: call_id.clone(),
    });
    router.on_provider_action(kind, CallId::new(call_id), ack)
}

/// Outcomes collected while waiting for forwarded messages to resolve.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryTally {
    pub delivered: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
    pub duplicate: usize,
    /// Reports missed because the subscriber fell behind.
    pub lagged: usize,
}

impl DeliveryTally {
    pub fn resolved(&self) -> usize {
        self.delivered + self.failed + self.timed_out + self.cancelled + self.duplicate + self.lagged
    }
}

/// Wait until `expected` delivery reports have arrived or `timeout` passes.
pub async fn drain(
    mut reports: broadcast::Receiver<DeliveryReport>,
    expected: usize,
    timeout: Duration,
) -> DeliveryTally {
    let mut tally = DeliveryTally::default();
    let deadline = tokio::time::Instant::now() + timeout;

    while tally.resolved() < expected {
        match tokio::time::timeout_at(deadline, reports.recv()).await {
            Ok(Ok(report)) => match report.outcome {
                DeliveryOutcome::Delivered { .. } => tally.delivered += 1,
                DeliveryOutcome::Failed(_) => tally.failed += 1,
                DeliveryOutcome::TimedOut { .. } => tally.timed_out += 1,
                DeliveryOutcome::Cancelled => tally.cancelled += 1,
                DeliveryOutcome::Duplicate => tally.duplicate += 1,
            },
            Ok(Err(broadcast::error::RecvError::Lagged(n))) => {
                tally.lagged += usize::try_from(n).unwrap_or(usize::MAX);
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => break,
            Err(_) => {
                warn!(
                    outstanding = expected - tally.resolved(),
                    "gave up waiting for deliveries"
                );
                break;
            }
        }
    }
    tally
}
