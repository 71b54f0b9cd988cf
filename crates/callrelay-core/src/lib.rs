// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// callrelay — Core types, payload normalization, and error definitions shared
// across all crates.

pub mod config;
pub mod error;
pub mod normalize;
pub mod types;
pub mod value;

pub use config::RelayConfig;
pub use error::{CallRelayError, ErrorClass};
pub use normalize::normalize;
pub use types::*;
pub use value::{CanonicalPayload, CanonicalValue, NativeValue};
