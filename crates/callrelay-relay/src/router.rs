// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Event router: the inbound port the host calls for every native telephony
// event.  Classifies the event, normalizes its payload, updates OS call
// state through the reporter and hands application-bound messages to the
// bridge channel.

use tracing::{debug, info, instrument, warn};

use callrelay_bridge::traits::{ActionAck, EndReason};
use callrelay_core::error::{CallRelayError, Result};
use callrelay_core::normalize::{normalize, normalize_extras};
use callrelay_core::types::{
    BridgeMessage, CallEvent, CallEventKind, CallId, ChannelKind, MessageId, methods,
};
use callrelay_core::value::{CanonicalPayload, CanonicalValue, NativeValue};

use crate::actions::ActionRegistry;
use crate::channel::BridgeChannel;
use crate::reporter::CallSessionReporter;

/// Fields an incoming-call push must carry.
pub const REQUIRED_PUSH_FIELDS: [&str; 4] =
    ["call_id", "caller_name", "caller_number", "voice_sdk_id"];

/// Key under which push payloads may nest their call data.
const CALL_DATA_KEY: &str = "call_data";

/// What the router did with one native event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// A message was handed to the bridge channel.
    Forwarded(MessageId),
    /// Consumed natively; nothing goes to the application.
    Handled,
    /// Not a recognized event.
    Ignored,
}

pub struct EventRouter {
    registry: ActionRegistry,
    reporter: CallSessionReporter,
    channel: BridgeChannel,
}

impl EventRouter {
    pub fn new(registry: ActionRegistry, reporter: CallSessionReporter, channel: BridgeChannel) -> Self {
        Self {
            registry,
            reporter,
            channel,
        }
    }

    /// A launch or resume intent carrying an action identifier and extras.
    #[instrument(skip(self, raw_extras))]
    pub fn on_native_event(&mut self, raw_action: &str, raw_extras: Option<NativeValue>) -> Result<Routed> {
        let Some(kind) = self.registry.classify(raw_action) else {
            debug!("unrecognized action ignored");
            return Ok(Routed::Ignored);
        };

        let extras = normalize_extras(raw_extras);
        let mut event = CallEvent::new(kind);
        if let Some(raw) = string_field(&extras, "call_id") {
            event = event.with_call_id(CallId::new(raw));
        }
        self.route(raw_action, event.with_payload(extras))
    }

    /// A VoIP push payload, call data nested under `call_data` or flat.
    pub fn on_push_payload(&mut self, payload: NativeValue) -> Result<Routed> {
        let payload = match normalize(payload) {
            CanonicalValue::Map(map) => map,
            other => {
                debug!(value = ?other, "push payload is not a map");
                CanonicalPayload::new()
            }
        };
        self.incoming(payload)
    }

    /// New VoIP push credentials.
    pub fn on_voip_token(&mut self, token: &[u8]) -> Routed {
        let token = hex::encode(token);
        info!(token_len = token.len(), "VoIP push token updated");
        self.forward(BridgeMessage::new(
            ChannelKind::Voip,
            methods::VOIP_TOKEN_RECEIVED,
            CanonicalValue::String(token),
        ))
    }

    /// An action the OS asks the app to perform on a call.  `ack` is
    /// completed after the resulting message, if any, is handed off.
    #[instrument(skip(self, ack), fields(call_id = %call))]
    pub fn on_provider_action(
        &mut self,
        kind: CallEventKind,
        call: CallId,
        ack: Box<dyn ActionAck>,
    ) -> Result<Routed> {
        match self.call_action(kind, &call) {
            Ok(routed) => {
                ack.fulfill();
                Ok(routed)
            }
            Err(e) => {
                warn!(error = %e, ?kind, "call action failed");
                ack.fail();
                Err(e)
            }
        }
    }

    pub fn on_audio_activated(&mut self) -> Vec<CallId> {
        self.reporter.on_audio_activated()
    }

    pub fn on_audio_deactivated(&mut self) {
        self.reporter.on_audio_deactivated();
    }

    /// The app returned to the foreground.
    pub fn on_foreground_resume(&mut self) -> Routed {
        self.forward(BridgeMessage::new(
            ChannelKind::CallKit,
            methods::APP_DID_BECOME_ACTIVE,
            CanonicalValue::Null,
        ))
    }

    pub fn on_provider_reset(&mut self) -> Vec<CallId> {
        self.reporter.reset()
    }

    pub fn reporter(&self) -> &CallSessionReporter {
        &self.reporter
    }

    pub fn channel(&self) -> &BridgeChannel {
        &self.channel
    }

    fn route(&mut self, raw_action: &str, event: CallEvent) -> Result<Routed> {
        let CallEvent {
            kind,
            call_id,
            payload,
        } = event;
        let payload = payload.unwrap_or_default();

        match kind {
            CallEventKind::IncomingPush => self.incoming(payload),
            CallEventKind::Accept => Ok(self.accept_launched(raw_action, call_id.as_ref(), payload)),
            CallEventKind::Decline => {
                if let Some(call) = &call_id {
                    self.reporter.teardown(call, EndReason::DeclinedElsewhere)?;
                }
                info!(call_id = ?call_id.as_ref().map(CallId::as_str), "call declined");
                Ok(Routed::Handled)
            }
            CallEventKind::Answer | CallEventKind::End | CallEventKind::Start => {
                let Some(call) = call_id else {
                    return Err(malformed(kind, vec!["call_id"]));
                };
                self.call_action(kind, &call)
            }
            CallEventKind::ForegroundResume => Ok(self.on_foreground_resume()),
            CallEventKind::TokenUpdated => match string_field(&payload, "token") {
                Some(token) => Ok(self.forward(BridgeMessage::new(
                    ChannelKind::Voip,
                    methods::VOIP_TOKEN_RECEIVED,
                    CanonicalValue::String(token),
                ))),
                None => Err(malformed(kind, vec!["token"])),
            },
        }
    }

    fn incoming(&mut self, payload: CanonicalPayload) -> Result<Routed> {
        let call_data = match payload.get(CALL_DATA_KEY) {
            Some(CanonicalValue::Map(nested)) => nested.clone(),
            _ => payload,
        };

        let values = REQUIRED_PUSH_FIELDS.map(|field| string_field(&call_data, field));
        let [Some(call_id), Some(caller_name), Some(caller_number), Some(_)] = values.clone() else {
            let missing = REQUIRED_PUSH_FIELDS
                .into_iter()
                .zip(&values)
                .filter(|(_, value)| value.is_none())
                .map(|(field, _)| field)
                .collect();
            return Err(malformed(CallEventKind::IncomingPush, missing));
        };

        let has_video = call_data
            .get("has_video")
            .and_then(CanonicalValue::as_bool)
            .unwrap_or(false);
        let call = CallId::new(call_id);
        self.reporter
            .report_incoming(call.clone(), &caller_name, &caller_number, has_video)?;

        let message = BridgeMessage::new(
            ChannelKind::Voip,
            methods::INCOMING_CALL,
            CanonicalValue::Map(call_data),
        )
        .with_dedupe_key(self.dedupe_key(methods::INCOMING_CALL, &call));
        Ok(self.forward(message))
    }

    fn accept_launched(
        &mut self,
        raw_action: &str,
        call: Option<&CallId>,
        extras: CanonicalPayload,
    ) -> Routed {
        let mut arguments = CanonicalPayload::new();
        arguments.insert("action".into(), raw_action.into());
        arguments.insert("extras".into(), CanonicalValue::Map(extras));

        let mut message = BridgeMessage::new(
            ChannelKind::CallKit,
            methods::CALLKIT_ACCEPT_LAUNCHED,
            CanonicalValue::Map(arguments),
        );
        if let Some(call) = call {
            message = message.with_dedupe_key(self.dedupe_key(methods::CALLKIT_ACCEPT_LAUNCHED, call));
        }
        self.forward(message)
    }

    fn call_action(&mut self, kind: CallEventKind, call: &CallId) -> Result<Routed> {
        // The OS may hand back only the UUID; the application knows the raw id.
        let call = &self.reporter.resolve(call);
        let method = match kind {
            CallEventKind::Answer => {
                self.reporter.on_answer(call)?;
                methods::ANSWER_CALL
            }
            CallEventKind::End => {
                self.reporter.end(call)?;
                methods::END_CALL
            }
            CallEventKind::Start => {
                self.reporter.on_start(call)?;
                return Ok(Routed::Handled);
            }
            other => {
                debug!(kind = ?other, "not a call action");
                return Ok(Routed::Ignored);
            }
        };

        let message = BridgeMessage::new(ChannelKind::CallKit, method, call.as_str().into())
            .with_dedupe_key(self.dedupe_key(method, call));
        Ok(self.forward(message))
    }

    /// Scoped to the current session of `call`: a call id reported again
    /// after it ended is a new call, not a repeat.
    fn dedupe_key(&self, method: &str, call: &CallId) -> String {
        match self.reporter.session(call) {
            Some(session) => format!("{method}:{}#{}", session.id, session.epoch),
            None => format!("{method}:{call}"),
        }
    }

    fn forward(&self, message: BridgeMessage) -> Routed {
        Routed::Forwarded(self.channel.deliver(message))
    }
}

fn event_name(kind: CallEventKind) -> &'static str {
    match kind {
        CallEventKind::IncomingPush => "incoming push",
        CallEventKind::Accept => "accept",
        CallEventKind::Decline => "decline",
        CallEventKind::Answer => "answer",
        CallEventKind::End => "end",
        CallEventKind::Start => "start",
        CallEventKind::ForegroundResume => "foreground resume",
        CallEventKind::TokenUpdated => "token update",
    }
}

/// Build and log a malformed-payload error. The only log line for the event.
fn malformed(kind: CallEventKind, missing: Vec<&'static str>) -> CallRelayError {
    let err = CallRelayError::MalformedPayload {
        event: event_name(kind),
        missing,
    };
    warn!(error = %err, "event dropped");
    err
}

/// A string field. Any other kind counts as missing.
fn string_field(payload: &CanonicalPayload, key: &str) -> Option<String> {
    payload.get(key)?.as_str().map(str::to_owned)
}
