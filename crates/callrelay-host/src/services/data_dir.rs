// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-aware data directory resolution.

use std::path::PathBuf;

use callrelay_core::config::CONFIG_FILE;

/// Return the host data directory, creating it if needed.
pub fn data_dir() -> PathBuf {
    let dir = resolve(
        std::env::var("XDG_DATA_HOME").ok(),
        std::env::var("HOME").ok(),
    );
    if let Err(e) = std::fs::create_dir_all(&dir) {
        tracing::warn!(path = %dir.display(), error = %e, "data directory not created");
    }
    dir
}

/// Default location of the relay configuration file.
pub fn config_path() -> PathBuf {
    data_dir().join(CONFIG_FILE)
}

fn resolve(xdg_data_home: Option<String>, home: Option<String>) -> PathBuf {
    // XDG data dir, then ~/.local/share
    let base = match (xdg_data_home, home) {
        (Some(xdg), _) if !xdg.is_empty() => PathBuf::from(xdg),
        (_, Some(home)) => PathBuf::from(home).join(".local").join("share"),
        _ => std::env::temp_dir(),
    };
    base.join("callrelay")
}
