// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// callrelay relay: routes native telephony events to the OS call subsystem
// and, through the bridge channel, to the application layer.

pub mod actions;
pub mod channel;
pub mod relay;
pub mod reporter;
pub mod retry;
pub mod router;

#[cfg(test)]
pub(crate) mod testing;

pub use actions::ActionRegistry;
pub use channel::{BridgeChannel, DeliveryOutcome, DeliveryReport};
pub use relay::CallRelay;
pub use reporter::CallSessionReporter;
pub use router::{EventRouter, Routed};
