// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory doubles for the OS and application ports, shared by the unit
// tests of this crate.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::time::Instant;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use callrelay_bridge::traits::{
    ActionAck, AppEndpoint, AudioRoute, CallProvider, CallUpdate, EndReason, PlatformBridge,
};
use callrelay_core::config::ProviderConfig;
use callrelay_core::error::{CallRelayError, Result};
use callrelay_core::types::CallId;
use callrelay_core::value::CanonicalValue;

use crate::channel::BridgeChannel;

/// One invocation observed by [`RecordingEndpoint`].
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub channel: String,
    pub method: String,
    pub arguments: CanonicalValue,
    pub at: Instant,
}

/// Application endpoint that records every invocation.
#[derive(Default)]
pub struct RecordingEndpoint {
    ready: AtomicBool,
    calls: Mutex<Vec<Invocation>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingEndpoint {
    pub fn ready() -> Arc<Self> {
        let endpoint = Self::default();
        endpoint.ready.store(true, Ordering::SeqCst);
        Arc::new(endpoint)
    }

    pub fn not_ready() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Make every invocation of `method` fail.
    pub fn fail_method(&self, method: &str) {
        self.failing.lock().unwrap().insert(method.to_owned());
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.method).collect()
    }
}

impl AppEndpoint for RecordingEndpoint {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn invoke(&self, channel: &str, method: &str, arguments: &CanonicalValue) -> Result<()> {
        self.calls.lock().unwrap().push(Invocation {
            channel: channel.to_owned(),
            method: method.to_owned(),
            arguments: arguments.clone(),
            at: Instant::now(),
        });
        if self.failing.lock().unwrap().contains(method) {
            return Err(CallRelayError::Endpoint(format!("{method} not implemented")));
        }
        Ok(())
    }
}

/// What the fake OS call subsystem has been asked to do.
#[derive(Debug, Default)]
pub struct PlatformState {
    pub registered: Option<ProviderConfig>,
    pub reported: Vec<CallUpdate>,
    pub ended: Vec<(CallId, EndReason)>,
    pub audio_configured: u32,
    pub audio_deactivated: u32,
    /// Raw call ids the OS refuses to report.
    pub reject: HashSet<String>,
    pub fail_audio: bool,
}

/// OS call subsystem double. Clones share state.
#[derive(Clone, Default)]
pub struct FakePlatform {
    state: Arc<Mutex<PlatformState>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(&self, raw_call_id: &str) {
        self.state().reject.insert(raw_call_id.to_owned());
    }

    pub fn fail_audio(&self) {
        self.state().fail_audio = true;
    }

    pub fn state(&self) -> MutexGuard<'_, PlatformState> {
        self.state.lock().unwrap()
    }
}

impl PlatformBridge for FakePlatform {
    fn platform_name(&self) -> &str {
        "Fake"
    }
}

impl CallProvider for FakePlatform {
    fn register(&self, config: &ProviderConfig) -> Result<()> {
        self.state().registered = Some(config.clone());
        Ok(())
    }

    fn report_new_incoming_call(&self, update: &CallUpdate) -> Result<()> {
        let mut state = self.state();
        if state.reject.contains(update.call.as_str()) {
            return Err(CallRelayError::Report {
                call_id: update.call.to_string(),
                reason: "call identifier already in use".into(),
            });
        }
        state.reported.push(update.clone());
        Ok(())
    }

    fn report_call_ended(&self, call: &CallId, reason: EndReason) -> Result<()> {
        self.state().ended.push((call.clone(), reason));
        Ok(())
    }
}

impl AudioRoute for FakePlatform {
    fn configure_for_call(&self) -> Result<()> {
        let mut state = self.state();
        if state.fail_audio {
            return Err(CallRelayError::AudioSession("category rejected".into()));
        }
        state.audio_configured += 1;
        Ok(())
    }

    fn deactivate(&self) -> Result<()> {
        self.state().audio_deactivated += 1;
        Ok(())
    }
}

/// How an [`ActionAck`] was completed, and how many messages the channel had
/// accepted at that moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckRecord {
    pub fulfilled: bool,
    pub accepted_at_ack: u64,
}

pub type AckSlot = Arc<Mutex<Option<AckRecord>>>;

/// Action acknowledgement that records its completion.
pub struct RecordingAck {
    channel: BridgeChannel,
    slot: AckSlot,
}

impl RecordingAck {
    pub fn new(channel: &BridgeChannel) -> (Box<Self>, AckSlot) {
        let slot = AckSlot::default();
        let ack = Box::new(Self {
            channel: channel.clone(),
            slot: Arc::clone(&slot),
        });
        (ack, slot)
    }

    fn record(&self, fulfilled: bool) {
        *self.slot.lock().unwrap() = Some(AckRecord {
            fulfilled,
            accepted_at_ack: self.channel.accepted(),
        });
    }
}

impl ActionAck for RecordingAck {
    fn fulfill(self: Box<Self>) {
        self.record(true);
    }

    fn fail(self: Box<Self>) {
        self.record(false);
    }
}

/// Layer counting warnings and errors.
#[derive(Clone, Default)]
struct LevelCounter {
    warnings: Arc<AtomicUsize>,
    errors: Arc<AtomicUsize>,
}

impl<S: Subscriber> Layer<S> for LevelCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        match *event.metadata().level() {
            Level::WARN => self.warnings.fetch_add(1, Ordering::SeqCst),
            Level::ERROR => self.errors.fetch_add(1, Ordering::SeqCst),
            _ => 0,
        };
    }
}

/// Log lines emitted on this thread while `f` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogCount {
    pub warnings: usize,
    pub errors: usize,
}

pub fn count_logs<T>(f: impl FnOnce() -> T) -> (T, LogCount) {
    let counter = LevelCounter::default();
    let subscriber = tracing_subscriber::registry().with(counter.clone());
    let out = tracing::subscriber::with_default(subscriber, f);
    let count = LogCount {
        warnings: counter.warnings.load(Ordering::SeqCst),
        errors: counter.errors.load(Ordering::SeqCst),
    };
    (out, count)
}
