// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Registry of recognized native action identifiers.

use std::collections::HashMap;

use callrelay_core::config::ActionBinding;
use callrelay_core::types::CallEventKind;

/// Namespace used by the incoming-call notification plugin on Android.
pub const CALLKIT_INCOMING_NAMESPACE: &str = "com.hiennv.flutter_callkit_incoming";

/// Built-in short action identifiers. Each is registered both bare and
/// under [`CALLKIT_INCOMING_NAMESPACE`].
const BUILTIN: &[(&str, CallEventKind)] = &[
    ("ACTION_CALL_INCOMING", CallEventKind::IncomingPush),
    ("ACTION_CALL_ACCEPT", CallEventKind::Accept),
    ("ACTION_CALL_DECLINE", CallEventKind::Decline),
    ("ACTION_CALL_ENDED", CallEventKind::End),
    ("ACTION_CALL_START", CallEventKind::Start),
];

/// Exact-match lookup from action identifier to event kind.
#[derive(Debug, Clone)]
pub struct ActionRegistry {
    actions: HashMap<String, CallEventKind>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl ActionRegistry {
    /// Built-in identifiers plus `extra` bindings (which win on conflict).
    pub fn new(extra: &[ActionBinding]) -> Self {
        let mut actions = HashMap::new();
        for (short, kind) in BUILTIN {
            actions.insert((*short).to_owned(), *kind);
            actions.insert(format!("{CALLKIT_INCOMING_NAMESPACE}.{short}"), *kind);
        }
        for binding in extra {
            actions.insert(binding.action.clone(), binding.kind);
        }
        Self { actions }
    }

    /// Classify an action identifier. Matching is exact and case-sensitive.
    pub fn classify(&self, action: &str) -> Option<CallEventKind> {
        self.actions.get(action).copied()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
