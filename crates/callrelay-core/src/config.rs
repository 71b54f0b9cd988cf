// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Relay configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::types::{CallEventKind, HandleType};

/// File name of the persisted configuration inside the data directory.
pub const CONFIG_FILE: &str = "callrelay.json";

/// Persistent relay settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Prefix for the application-side method channels
    /// (`<prefix>/callkit`, `<prefix>/voip`).
    pub channel_prefix: String,
    /// Capabilities registered with the OS call subsystem.
    pub provider: ProviderConfig,
    /// Bridge channel timing.
    pub delivery: DeliveryConfig,
    /// Action identifiers recognized in addition to the built-in registry.
    pub extra_actions: Vec<ActionBinding>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel_prefix: "com.callrelay.app".into(),
            provider: ProviderConfig::default(),
            delivery: DeliveryConfig::default(),
            extra_actions: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Load the configuration from `path`, falling back to defaults when the
    /// file is missing or unreadable.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no relay config on disk, using defaults");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "relay config unreadable, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str(&data) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "relay config invalid, using defaults");
                Self::default()
            }
        }
    }

    /// Persist the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }
}

/// Capabilities announced to the OS call subsystem at registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Name shown by the OS call UI.
    pub localized_name: String,
    pub max_call_groups: u32,
    pub max_calls_per_group: u32,
    pub supports_video: bool,
    pub handle_types: Vec<HandleType>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            localized_name: "callrelay".into(),
            max_call_groups: 2,
            max_calls_per_group: 1,
            supports_video: false,
            handle_types: vec![HandleType::PhoneNumber, HandleType::Generic],
        }
    }
}

/// Bridge channel timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Pause between first observing readiness and the first invocation.
    pub settle_delay_ms: u64,
    pub retry: RetryConfig,
    /// How many recently accepted messages are remembered for de-duplication.
    pub dedupe_window: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 150,
            retry: RetryConfig::default(),
            dedupe_window: 256,
        }
    }
}

impl DeliveryConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Backoff used while the application endpoint is not ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// First wait after a not-ready observation.
    pub base_delay_ms: u64,
    /// Upper bound for a single wait, and so for how late a message lands
    /// after the endpoint becomes ready.
    pub max_delay_ms: u64,
    /// Growth factor between consecutive waits. `1` gives a fixed delay.
    pub multiplier: u32,
    /// Readiness checks before giving up. `None` retries until shutdown.
    pub max_attempts: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 1_000,
            multiplier: 2,
            max_attempts: Some(270),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Maps an additional OS action identifier onto an event kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionBinding {
    pub action: String,
    pub kind: CallEventKind,
}
