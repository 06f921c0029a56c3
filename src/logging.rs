/*
 * aurguard - Trust and resolution core for AUR package helpers.
 * Copyright (C) 2025  compiledkernel-idk and aurguard contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Logging setup on top of tracing.
//!
//! Console output goes to stderr so `--json` output on stdout stays clean.
//! `RUST_LOG` overrides the configured level.

use std::path::Path;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the logging system
pub fn init() {
    init_with_level("warn")
}

/// Initialize logging with a specific level
pub fn init_with_level(level: &str) {
    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter(level))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init();
}

/// Initialize logging with optional file output
pub fn init_with_file(level: &str, log_file: Option<&Path>) {
    let Some(path) = log_file else {
        return init_with_level(level);
    };

    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    match std::fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            let file_layer = fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .with_target(true);

            let _ = tracing_subscriber::registry()
                .with(filter(level))
                .with(fmt::layer().with_writer(std::io::stderr).compact())
                .with(file_layer)
                .try_init();
        }
        Err(e) => {
            init_with_level(level);
            tracing::warn!(path = %path.display(), error = %e, "cannot open log file, logging to stderr only");
        }
    }
}

pub use tracing::{debug, error, info, trace, warn};

/// Span around parsing one PKGBUILD
#[macro_export]
macro_rules! span_parse {
    ($path:expr) => {
        tracing::debug_span!("parse", path = %$path)
    };
}

/// Span around scanning a recipe against a blocklist
#[macro_export]
macro_rules! span_scan {
    ($terms:expr) => {
        tracing::debug_span!("scan", terms = $terms)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_does_not_panic() {
        init_with_level("debug");
        init();
    }

    #[test]
    fn test_init_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("aurguard.log");
        init_with_file("info", Some(&path));
        assert!(path.exists());
    }
}
