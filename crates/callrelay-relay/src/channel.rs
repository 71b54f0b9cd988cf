// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bridge channel: asynchronous at-least-once relay to the application layer.
//
// One worker task owns the outbound queue and is the only context that ever
// touches the endpoint, so messages accepted while the endpoint is ready are
// invoked in send order.  While the endpoint is not ready the head of the
// queue waits on the retry schedule; everything behind it waits too.
//
// Delivery protocol per message:
//   1. endpoint not ready  -> wait (backoff), re-check, until the budget runs out
//   2. readiness first seen -> wait the settle delay, re-check
//   3. ready and settled    -> invoke once; the outcome is reported, not retried

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{Notify, broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use callrelay_bridge::traits::AppEndpoint;
use callrelay_core::config::DeliveryConfig;
use callrelay_core::error::CallRelayError;
use callrelay_core::types::{BridgeMessage, MessageId};

use crate::retry::{RetryDecision, next_retry, retry_budget};

/// Capacity of the delivery-report broadcast buffer.
const REPORT_CAPACITY: usize = 64;

/// Final outcome of one accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Invoked on the endpoint after `attempts` readiness checks.
    Delivered { attempts: u32 },
    /// The endpoint was ready but the invocation failed. Not retried.
    Failed(String),
    /// The endpoint never became ready within the retry budget.
    TimedOut { attempts: u32 },
    /// Withdrawn by `cancel` or dropped at shutdown.
    Cancelled,
    /// Same id or dedupe key as a pending or recently delivered message.
    Duplicate,
}

/// Published once per message on the report stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub id: MessageId,
    pub method: String,
    pub outcome: DeliveryOutcome,
}

enum Command {
    Deliver(BridgeMessage),
    Cancel(MessageId),
}

/// Handle to the bridge channel worker. Cheap to clone.
#[derive(Clone)]
pub struct BridgeChannel {
    commands: mpsc::UnboundedSender<Command>,
    reports: broadcast::Sender<DeliveryReport>,
    shutdown: Arc<Notify>,
    accepted: Arc<AtomicU64>,
}

impl BridgeChannel {
    /// Spawn the worker on the current tokio runtime.
    ///
    /// `channel_prefix` is joined with each message's [`ChannelKind`] to form
    /// the method channel name handed to the endpoint.
    ///
    /// [`ChannelKind`]: callrelay_core::types::ChannelKind
    pub fn spawn(
        endpoint: Arc<dyn AppEndpoint>,
        channel_prefix: impl Into<String>,
        config: DeliveryConfig,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);
        let shutdown = Arc::new(Notify::new());

        info!(
            settle_ms = config.settle_delay_ms,
            retry_budget_ms = retry_budget(&config.retry).map(|d| d.as_millis() as u64),
            "bridge channel starting"
        );

        let worker = Worker {
            endpoint,
            prefix: channel_prefix.into(),
            recent: RecentKeys::new(config.dedupe_window),
            config,
            pending: VecDeque::new(),
            reports: reports.clone(),
            settled: false,
            closed: false,
        };
        tokio::spawn(worker.run(rx, Arc::clone(&shutdown)));

        Self {
            commands,
            reports,
            shutdown,
            accepted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Hand a message to the channel. Returns immediately.
    pub fn deliver(&self, message: BridgeMessage) -> MessageId {
        let id = message.id;
        let method = message.method.clone();
        match self.commands.send(Command::Deliver(message)) {
            Ok(()) => {
                self.accepted.fetch_add(1, Ordering::SeqCst);
                debug!(message_id = %id, method = %method, "message handed to bridge channel");
            }
            Err(_) => {
                error!(message_id = %id, method = %method, "bridge channel worker is gone, message lost");
            }
        }
        id
    }

    /// Withdraw a message that has not been invoked yet.
    pub fn cancel(&self, id: MessageId) {
        if self.commands.send(Command::Cancel(id)).is_err() {
            debug!(message_id = %id, "cancel after bridge channel stopped");
        }
    }

    /// Stop the worker. Pending messages are reported as cancelled.
    pub fn shutdown(&self) {
        info!("bridge channel shutdown requested");
        self.shutdown.notify_one();
    }

    /// Subscribe to delivery reports published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryReport> {
        self.reports.subscribe()
    }

    /// Number of messages handed to the worker so far.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::SeqCst)
    }
}

struct Pending {
    message: BridgeMessage,
    /// Readiness checks that found the endpoint not ready.
    checks: u32,
}

struct Worker {
    endpoint: Arc<dyn AppEndpoint>,
    prefix: String,
    config: DeliveryConfig,
    pending: VecDeque<Pending>,
    recent: RecentKeys,
    reports: broadcast::Sender<DeliveryReport>,
    /// The settle delay has elapsed since readiness was last observed.
    settled: bool,
    /// Every handle has been dropped; exit once the queue drains.
    closed: bool,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>, shutdown: Arc<Notify>) {
        loop {
            if self.pending.is_empty() {
                if self.closed {
                    break;
                }
                tokio::select! {
                    biased;
                    _ = shutdown.notified() => break,
                    cmd = rx.recv() => match cmd {
                        Some(cmd) => self.apply(cmd),
                        None => self.closed = true,
                    },
                }
                continue;
            }

            self.drain_ready_commands(&mut rx);
            if self.pending.is_empty() {
                continue;
            }

            if !self.endpoint.is_ready() {
                self.settled = false;
                let Some(delay) = self.note_not_ready() else {
                    continue;
                };
                if !self.wait(delay, &mut rx, &shutdown).await {
                    break;
                }
                continue;
            }

            if !self.settled {
                debug!(settle_ms = self.config.settle_delay_ms, "endpoint ready, settling");
                if !self.wait(self.config.settle_delay(), &mut rx, &shutdown).await {
                    break;
                }
                self.settled = true;
                continue;
            }

            if let Some(head) = self.pending.pop_front() {
                self.invoke(head);
            }
        }

        self.drain_ready_commands(&mut rx);
        while let Some(pending) = self.pending.pop_front() {
            warn!(
                message_id = %pending.message.id,
                method = %pending.message.method,
                "bridge channel stopped before delivery"
            );
            self.report(&pending.message, DeliveryOutcome::Cancelled);
        }
        info!("bridge channel stopped");
    }

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Deliver(message) => self.enqueue(message),
            Command::Cancel(id) => self.cancel(id),
        }
    }

    fn drain_ready_commands(&mut self, rx: &mut mpsc::UnboundedReceiver<Command>) {
        loop {
            match rx.try_recv() {
                Ok(cmd) => self.apply(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
    }

    fn enqueue(&mut self, message: BridgeMessage) {
        let keys = dedupe_keys(&message);
        if keys.iter().any(|k| self.recent.contains(k)) {
            debug!(
                message_id = %message.id,
                method = %message.method,
                dedupe_key = ?message.dedupe_key,
                "duplicate delivery dropped"
            );
            self.report(&message, DeliveryOutcome::Duplicate);
            return;
        }
        for key in keys {
            self.recent.insert(key);
        }
        self.pending.push_back(Pending { message, checks: 0 });
    }

    fn cancel(&mut self, id: MessageId) {
        let Some(pos) = self.pending.iter().position(|p| p.message.id == id) else {
            debug!(message_id = %id, "cancel for unknown or already delivered message");
            return;
        };
        if let Some(pending) = self.pending.remove(pos) {
            info!(message_id = %id, method = %pending.message.method, "delivery cancelled");
            self.forget(&pending.message);
            self.report(&pending.message, DeliveryOutcome::Cancelled);
        }
    }

    /// Count a failed readiness check on the head message.  Returns how long
    /// to wait, or `None` after timing the head out.
    fn note_not_ready(&mut self) -> Option<Duration> {
        let head = self.pending.front_mut()?;
        head.checks += 1;
        match next_retry(head.checks - 1, &self.config.retry) {
            RetryDecision::RetryAfter(delay) => Some(delay),
            RetryDecision::Exhausted => {
                let attempts = head.checks;
                if let Some(expired) = self.pending.pop_front() {
                    let err = CallRelayError::DeliveryTimeout {
                        method: expired.message.method.clone(),
                        attempts,
                    };
                    error!(message_id = %expired.message.id, error = %err, "delivery abandoned");
                    self.forget(&expired.message);
                    self.report(&expired.message, DeliveryOutcome::TimedOut { attempts });
                }
                None
            }
        }
    }

    /// Sleep for `delay` while still accepting commands.  Returns `false` on
    /// shutdown.
    async fn wait(
        &mut self,
        delay: Duration,
        rx: &mut mpsc::UnboundedReceiver<Command>,
        shutdown: &Notify,
    ) -> bool {
        let sleep = tokio::time::sleep_until(Instant::now() + delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.notified() => return false,
                _ = &mut sleep => return true,
                cmd = rx.recv(), if !self.closed => match cmd {
                    Some(cmd) => self.apply(cmd),
                    None => self.closed = true,
                },
            }
        }
    }

    fn invoke(&mut self, pending: Pending) {
        let message = &pending.message;
        let channel = message.channel.channel_name(&self.prefix);
        match self.endpoint.invoke(&channel, &message.method, &message.arguments) {
            Ok(()) => {
                info!(
                    message_id = %message.id,
                    channel = %channel,
                    method = %message.method,
                    "bridge message delivered"
                );
                self.report(
                    message,
                    DeliveryOutcome::Delivered {
                        attempts: pending.checks + 1,
                    },
                );
            }
            Err(e) => {
                error!(
                    message_id = %message.id,
                    channel = %channel,
                    method = %message.method,
                    error = %e,
                    "bridge invocation failed"
                );
                self.report(message, DeliveryOutcome::Failed(e.to_string()));
            }
        }
    }

    fn forget(&mut self, message: &BridgeMessage) {
        for key in dedupe_keys(message) {
            self.recent.remove(&key);
        }
    }

    fn report(&self, message: &BridgeMessage, outcome: DeliveryOutcome) {
        // No subscribers is normal.
        let _ = self.reports.send(DeliveryReport {
            id: message.id,
            method: message.method.clone(),
            outcome,
        });
    }
}

fn dedupe_keys(message: &BridgeMessage) -> Vec<String> {
    let mut keys = vec![format!("id:{}", message.id)];
    if let Some(key) = &message.dedupe_key {
        keys.push(format!("key:{key}"));
    }
    keys
}

/// Bounded FIFO set of recently accepted keys.
struct RecentKeys {
    capacity: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl RecentKeys {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            members: HashSet::new(),
        }
    }

    fn contains(&self, key: &str) -> bool {
        self.members.contains(key)
    }

    fn insert(&mut self, key: String) {
        if self.capacity == 0 || !self.members.insert(key.clone()) {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.members.remove(&old);
            }
        }
    }

    fn remove(&mut self, key: &str) {
        if self.members.remove(key) {
            self.order.retain(|k| k != key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callrelay_core::config::RetryConfig;
    use callrelay_core::types::ChannelKind;
    use callrelay_core::value::CanonicalValue;

    use crate::testing::RecordingEndpoint;

    fn config() -> DeliveryConfig {
        DeliveryConfig {
            settle_delay_ms: 150,
            retry: RetryConfig {
                base_delay_ms: 500,
                max_delay_ms: 500,
                multiplier: 1,
                max_attempts: None,
            },
            dedupe_window: 16,
        }
    }

    fn message(method: &str) -> BridgeMessage {
        BridgeMessage::new(ChannelKind::CallKit, method, CanonicalValue::Null)
    }

    async fn next_report(rx: &mut broadcast::Receiver<DeliveryReport>) -> DeliveryReport {
        rx.recv().await.expect("report stream closed")
    }

    #[tokio::test(start_paused = true)]
    async fn ready_endpoint_receives_in_send_order() {
        let endpoint = RecordingEndpoint::ready();
        let channel = BridgeChannel::spawn(endpoint.clone(), "com.acme", config());
        let mut reports = channel.subscribe();

        let a = channel.deliver(message("A"));
        let b = channel.deliver(message("B"));

        assert_eq!(next_report(&mut reports).await.id, a);
        assert_eq!(next_report(&mut reports).await.id, b);

        let methods: Vec<_> = endpoint.calls().into_iter().map(|c| c.method).collect();
        assert_eq!(methods, ["A", "B"]);
        assert_eq!(endpoint.calls()[0].channel, "com.acme/callkit");
        assert_eq!(channel.accepted(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn first_delivery_waits_for_settle_delay() {
        let endpoint = RecordingEndpoint::ready();
        let start = Instant::now();
        let channel = BridgeChannel::spawn(endpoint.clone(), "p", config());
        let mut reports = channel.subscribe();

        channel.deliver(message("A"));
        next_report(&mut reports).await;

        let calls = endpoint.calls();
        assert!(calls[0].at >= start + Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn not_ready_then_ready_delivers_exactly_once() {
        let endpoint = RecordingEndpoint::not_ready();
        let channel = BridgeChannel::spawn(endpoint.clone(), "p", config());
        let mut reports = channel.subscribe();

        let id = channel.deliver(message("callkitAcceptLaunched"));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(endpoint.calls().is_empty());

        let ready_at = Instant::now();
        endpoint.set_ready(true);

        let report = next_report(&mut reports).await;
        assert_eq!(report.id, id);
        assert!(matches!(report.outcome, DeliveryOutcome::Delivered { attempts } if attempts > 1));

        tokio::time::sleep(Duration::from_secs(10)).await;
        let calls = endpoint.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].at >= ready_at);
    }

    #[tokio::test(start_paused = true)]
    async fn default_backoff_keeps_lag_after_readiness_short() {
        let endpoint = RecordingEndpoint::not_ready();
        let cfg = DeliveryConfig::default();
        let bound = cfg.retry.max_delay() + cfg.settle_delay();
        let channel = BridgeChannel::spawn(endpoint.clone(), "p", cfg);
        let mut reports = channel.subscribe();

        channel.deliver(message("callkitAcceptLaunched"));
        tokio::time::sleep(Duration::from_millis(3_600)).await;
        let ready_at = Instant::now();
        endpoint.set_ready(true);
        next_report(&mut reports).await;

        let lag = endpoint.calls()[0].at - ready_at;
        assert!(lag <= bound, "delivered {lag:?} after readiness");
        assert!(bound <= Duration::from_millis(1_200));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_retry_times_out() {
        let endpoint = RecordingEndpoint::not_ready();
        let mut cfg = config();
        cfg.retry.max_attempts = Some(2);
        let channel = BridgeChannel::spawn(endpoint.clone(), "p", cfg);
        let mut reports = channel.subscribe();

        channel.deliver(message("A"));
        let report = next_report(&mut reports).await;
        assert_eq!(report.outcome, DeliveryOutcome::TimedOut { attempts: 3 });

        endpoint.set_ready(true);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(endpoint.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_id_and_key_are_dropped() {
        let endpoint = RecordingEndpoint::ready();
        let channel = BridgeChannel::spawn(endpoint.clone(), "p", config());
        let mut reports = channel.subscribe();

        let first = message("answerCall").with_dedupe_key("answerCall:abc");
        channel.deliver(first.clone());
        channel.deliver(first);
        channel.deliver(message("answerCall").with_dedupe_key("answerCall:abc"));

        let outcomes: Vec<_> = [
            next_report(&mut reports).await,
            next_report(&mut reports).await,
            next_report(&mut reports).await,
        ]
        .into_iter()
        .map(|r| r.outcome)
        .collect();
        assert_eq!(
            outcomes,
            [
                DeliveryOutcome::Duplicate,
                DeliveryOutcome::Duplicate,
                DeliveryOutcome::Delivered { attempts: 1 },
            ]
        );
        assert_eq!(endpoint.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_message_is_never_invoked() {
        let endpoint = RecordingEndpoint::not_ready();
        let channel = BridgeChannel::spawn(endpoint.clone(), "p", config());
        let mut reports = channel.subscribe();

        let keyed = message("endCall").with_dedupe_key("endCall:abc");
        let id = channel.deliver(keyed);
        tokio::time::sleep(Duration::from_secs(1)).await;
        channel.cancel(id);
        assert_eq!(next_report(&mut reports).await.outcome, DeliveryOutcome::Cancelled);

        endpoint.set_ready(true);
        // The key is released, so a fresh message with it goes through.
        channel.deliver(message("endCall").with_dedupe_key("endCall:abc"));
        assert!(matches!(
            next_report(&mut reports).await.outcome,
            DeliveryOutcome::Delivered { .. }
        ));
        assert_eq!(endpoint.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_invocation_is_reported_and_not_retried() {
        let endpoint = RecordingEndpoint::ready();
        endpoint.fail_method("boom");
        let channel = BridgeChannel::spawn(endpoint.clone(), "p", config());
        let mut reports = channel.subscribe();

        channel.deliver(message("boom"));
        channel.deliver(message("after"));

        assert!(matches!(
            next_report(&mut reports).await.outcome,
            DeliveryOutcome::Failed(_)
        ));
        assert_eq!(
            next_report(&mut reports).await.outcome,
            DeliveryOutcome::Delivered { attempts: 1 }
        );
        let methods: Vec<_> = endpoint.calls().into_iter().map(|c| c.method).collect();
        assert_eq!(methods, ["boom", "after"]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending() {
        let endpoint = RecordingEndpoint::not_ready();
        let channel = BridgeChannel::spawn(endpoint.clone(), "p", config());
        let mut reports = channel.subscribe();

        channel.deliver(message("A"));
        tokio::time::sleep(Duration::from_millis(700)).await;
        channel.shutdown();

        assert_eq!(next_report(&mut reports).await.outcome, DeliveryOutcome::Cancelled);
        endpoint.set_ready(true);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(endpoint.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn endpoint_detach_resettles() {
        let endpoint = RecordingEndpoint::ready();
        let channel = BridgeChannel::spawn(endpoint.clone(), "p", config());
        let mut reports = channel.subscribe();

        channel.deliver(message("A"));
        next_report(&mut reports).await;

        endpoint.set_ready(false);
        channel.deliver(message("B"));
        tokio::time::sleep(Duration::from_secs(2)).await;
        let reattached = Instant::now();
        endpoint.set_ready(true);
        next_report(&mut reports).await;

        let calls = endpoint.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].at >= reattached + Duration::from_millis(150));
    }

    #[test]
    fn recent_keys_evict_oldest() {
        let mut recent = RecentKeys::new(2);
        recent.insert("a".into());
        recent.insert("b".into());
        recent.insert("c".into());
        assert!(!recent.contains("a"));
        assert!(recent.contains("b"));
        assert!(recent.contains("c"));

        recent.remove("b");
        assert!(!recent.contains("b"));
    }
}
