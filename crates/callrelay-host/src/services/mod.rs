// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Host services: where configuration lives, the console application
// endpoint, and the replay loop that feeds recorded events to the relay.

pub mod console;
pub mod data_dir;
pub mod replay;
