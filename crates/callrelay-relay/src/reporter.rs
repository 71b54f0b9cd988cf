// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Call session reporter: owns the OS call-provider registration and the
// lifecycle of every call the OS is tracking.
//
// Sessions are keyed by the OS UUID: provider actions coming back from the
// OS carry only that, never the raw id the push payload used.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use callrelay_bridge::traits::{CallUpdate, EndReason, PlatformBridge};
use callrelay_core::config::ProviderConfig;
use callrelay_core::error::{CallRelayError, Result};
use callrelay_core::types::{CallId, CallPhase, CallSession, HandleType};
use uuid::Uuid;

pub struct CallSessionReporter {
    platform: Box<dyn PlatformBridge>,
    provider: ProviderConfig,
    sessions: HashMap<Uuid, CallSession>,
    /// Sessions created so far; seeds each new session's epoch.
    created: u64,
}

impl CallSessionReporter {
    pub fn new(platform: Box<dyn PlatformBridge>, provider: ProviderConfig) -> Self {
        Self {
            platform,
            provider,
            sessions: HashMap::new(),
            created: 0,
        }
    }

    /// Register the app's call capabilities with the OS. Called once.
    #[instrument(skip(self), fields(platform = self.platform.platform_name()))]
    pub fn register(&self) -> Result<()> {
        self.platform.register(&self.provider)?;
        info!(
            name = %self.provider.localized_name,
            max_call_groups = self.provider.max_call_groups,
            max_calls_per_group = self.provider.max_calls_per_group,
            supports_video = self.provider.supports_video,
            "call provider registered"
        );
        Ok(())
    }

    /// Report a newly arrived incoming call so the OS shows its call UI.
    ///
    /// A rejection is returned as [`CallRelayError::Report`] and the session
    /// is discarded. Nothing is retried.
    #[instrument(skip(self, call_id, caller_name, caller_number), fields(call_id = %call_id))]
    pub fn report_incoming(
        &mut self,
        call_id: CallId,
        caller_name: &str,
        caller_number: &str,
        has_video: bool,
    ) -> Result<()> {
        if let Some(existing) = self.sessions.get(&call_id.uuid()) {
            if !existing.phase.is_terminal() {
                let err = CallRelayError::Report {
                    call_id: call_id.to_string(),
                    reason: format!("call already {}", existing.phase),
                };
                error!(error = %err, "incoming call not reported");
                return Err(err);
            }
        }

        let mut session = CallSession::new(
            call_id.clone(),
            caller_name.to_owned(),
            caller_number.to_owned(),
            has_video,
        );
        session.epoch = self.next_epoch();
        let update = CallUpdate {
            call: call_id.clone(),
            handle_type: HandleType::Generic,
            handle_value: caller_number.to_owned(),
            caller_name: caller_name.to_owned(),
            has_video,
        };

        if let Err(e) = self.platform.report_new_incoming_call(&update) {
            let err = match e {
                CallRelayError::Report { .. } => e,
                other => CallRelayError::Report {
                    call_id: call_id.to_string(),
                    reason: other.to_string(),
                },
            };
            error!(error = %err, "OS rejected incoming call");
            self.sessions.remove(&call_id.uuid());
            return Err(err);
        }

        advance(&mut session, CallPhase::Reported)?;
        info!(os_uuid = %call_id.uuid(), has_video, "incoming call reported");
        self.sessions.insert(call_id.uuid(), session);
        Ok(())
    }

    /// The OS delivered an answer action. Configures the audio route and
    /// marks the session answered; activation follows from the OS.
    pub fn on_answer(&mut self, call: &CallId) -> Result<()> {
        match self.sessions.get_mut(&call.uuid()) {
            Some(session) if session.phase.is_terminal() => {
                return Err(invalid(session, CallPhase::Active));
            }
            Some(session) => {
                session.answered = true;
                session.updated_at = Utc::now();
            }
            None => debug!(call_id = %call, "answer for a call not reported by this process"),
        }
        self.configure_audio();
        info!(call_id = %call, "call answered");
        Ok(())
    }

    /// The OS started a call on its own (outgoing, or restored from recents).
    pub fn on_start(&mut self, call: &CallId) -> Result<()> {
        if let Some(session) = self.sessions.get(&call.uuid()) {
            if session.phase.is_terminal() {
                return Err(invalid(session, CallPhase::Reported));
            }
            debug!(call_id = %call, phase = %session.phase, "start for a known call");
            return Ok(());
        }

        let mut session = CallSession::new(call.clone(), String::new(), String::new(), false);
        session.epoch = self.next_epoch();
        advance(&mut session, CallPhase::Reported)?;
        session.answered = true;
        self.sessions.insert(call.uuid(), session);
        info!(call_id = %call, "call started by the OS");
        Ok(())
    }

    /// The OS activated the audio session. Re-applies call mode and moves
    /// every answered call to `Active`.
    pub fn on_audio_activated(&mut self) -> Vec<CallId> {
        self.configure_audio();

        let mut activated = Vec::new();
        for session in self.sessions.values_mut() {
            if session.answered
                && session.phase == CallPhase::Reported
                && advance(session, CallPhase::Active).is_ok()
            {
                activated.push(session.id.clone());
            }
        }
        info!(count = activated.len(), "audio session activated");
        activated
    }

    pub fn on_audio_deactivated(&self) {
        info!("audio session deactivated");
        if let Err(e) = self.platform.deactivate() {
            warn!(error = %e, "audio session release failed");
        }
    }

    /// The OS ended a call (user hung up in the system UI).
    pub fn end(&mut self, call: &CallId) -> Result<()> {
        let Some(session) = self.sessions.get_mut(&call.uuid()) else {
            debug!(call_id = %call, "end for a call not reported by this process");
            return Ok(());
        };
        advance(session, CallPhase::Ended)?;
        info!(call_id = %call, "call ended");
        Ok(())
    }

    /// End a call from this side and tell the OS why.
    pub fn teardown(&mut self, call: &CallId, reason: EndReason) -> Result<()> {
        let Some(session) = self.sessions.get_mut(&call.uuid()) else {
            debug!(call_id = %call, "teardown for a call not reported by this process");
            return Ok(());
        };
        advance(session, CallPhase::Ended)?;
        if let Err(e) = self.platform.report_call_ended(&session.id, reason) {
            warn!(call_id = %call, error = %e, "OS not told about ended call");
        }
        info!(call_id = %call, ?reason, "call torn down");
        Ok(())
    }

    /// The OS reset its provider; every live call is gone.
    pub fn reset(&mut self) -> Vec<CallId> {
        let mut ended = Vec::new();
        for session in self.sessions.values_mut() {
            if !session.phase.is_terminal() && advance(session, CallPhase::Ended).is_ok() {
                ended.push(session.id.clone());
            }
        }
        warn!(count = ended.len(), "call provider reset, live calls ended");
        ended
    }

    /// Looks a call up by its OS UUID, so an id rebuilt from the UUID alone
    /// finds the session reported under the raw id.
    pub fn session(&self, call: &CallId) -> Option<&CallSession> {
        self.sessions.get(&call.uuid())
    }

    /// The id a call was reported under, or `call` itself when unknown.
    pub fn resolve(&self, call: &CallId) -> CallId {
        self.session(call).map_or_else(|| call.clone(), |session| session.id.clone())
    }

    /// Calls not yet ended.
    pub fn live_sessions(&self) -> usize {
        self.sessions.values().filter(|s| !s.phase.is_terminal()).count()
    }

    pub fn platform_name(&self) -> &str {
        self.platform.platform_name()
    }

    fn next_epoch(&mut self) -> u64 {
        self.created += 1;
        self.created
    }

    fn configure_audio(&self) {
        if let Err(e) = self.platform.configure_for_call() {
            let err = match e {
                CallRelayError::AudioSession(_) => e,
                other => CallRelayError::AudioSession(other.to_string()),
            };
            error!(error = %err, "call proceeds without a configured audio route");
        }
    }
}

fn advance(session: &mut CallSession, to: CallPhase) -> Result<()> {
    if !session.phase.can_transition_to(to) {
        return Err(invalid(session, to));
    }
    debug!(call_id = %session.id, from = %session.phase, to = %to, "call phase change");
    session.phase = to;
    session.updated_at = Utc::now();
    Ok(())
}

fn invalid(session: &CallSession, to: CallPhase) -> CallRelayError {
    CallRelayError::InvalidTransition {
        call_id: session.id.to_string(),
        from: session.phase,
        to,
    }
}
