// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Console stand-in for the application layer.  Every bridge message becomes
// one JSON line on the writer; readiness is toggled by `attach`/`detach`
// host events.

use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{info, warn};

use callrelay_bridge::traits::{ActionAck, AppEndpoint};
use callrelay_core::error::{CallRelayError, Result};
use callrelay_core::value::CanonicalValue;

#[derive(Serialize)]
struct OutboundLine<'a> {
    channel: &'a str,
    method: &'a str,
    arguments: &'a CanonicalValue,
}

pub struct ConsoleEndpoint<W> {
    ready: AtomicBool,
    out: Mutex<W>,
}

impl<W: Write + Send> ConsoleEndpoint<W> {
    pub fn new(out: W, attached: bool) -> Self {
        Self {
            ready: AtomicBool::new(attached),
            out: Mutex::new(out),
        }
    }

    pub fn set_attached(&self, attached: bool) {
        info!(attached, "application endpoint readiness changed");
        self.ready.store(attached, Ordering::SeqCst);
    }
}

impl<W: Write + Send> AppEndpoint for ConsoleEndpoint<W> {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn invoke(&self, channel: &str, method: &str, arguments: &CanonicalValue) -> Result<()> {
        let line = serde_json::to_string(&OutboundLine {
            channel,
            method,
            arguments,
        })?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| CallRelayError::Endpoint("console writer poisoned".into()))?;
        writeln!(out, "{line}").map_err(|e| CallRelayError::Endpoint(e.to_string()))?;
        out.flush().map_err(|e| CallRelayError::Endpoint(e.to_string()))?;
        Ok(())
    }
}

/// Acknowledgement for provider actions read from the event stream.
pub struct ConsoleAck {
    pub action: &'static str,
    pub call_id: String,
}

impl ActionAck for ConsoleAck {
    fn fulfill(self: Box<Self>) {
        info!(action = self.action, call_id = %self.call_id, "provider action fulfilled");
    }

    fn fail(self: Box<Self>) {
        warn!(action = self.action, call_id = %self.call_id, "provider action failed");
    }
}
