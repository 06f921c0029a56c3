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

//! Hierarchical error types with position context.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::aur::ParseError;
use crate::pacman::ConfError;

/// Main error type for aurguard operations
#[derive(Debug, Error)]
pub enum AurguardError {
    /// PKGBUILD could not be parsed; no partial recipe exists
    #[error("PKGBUILD parse failed: {0}")]
    RecipeParse(#[from] ParseError),

    /// pacman.conf could not be parsed; no partial configuration exists
    #[error("pacman.conf parse failed: {0}")]
    PacmanConf(#[from] ConfError),

    /// PKGBUILD security issues reached the blocking threshold
    #[error("PKGBUILD security issue: {count} blocking finding(s), highest {severity}")]
    PkgbuildSecurityIssue {
        count: usize,
        severity: SecuritySeverity,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// File system errors
    #[error("File system error for '{path}': {message}")]
    FileSystem {
        path: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

/// Security severity levels for PKGBUILD findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecuritySeverity {
    /// Informational - style issues
    Info,
    /// Low - minor concerns
    Low,
    /// Medium - should be reviewed
    Medium,
    /// High - likely malicious or dangerous
    High,
    /// Critical - definitely malicious
    Critical,
}

impl fmt::Display for SecuritySeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecuritySeverity::Info => write!(f, "INFO"),
            SecuritySeverity::Low => write!(f, "LOW"),
            SecuritySeverity::Medium => write!(f, "MEDIUM"),
            SecuritySeverity::High => write!(f, "HIGH"),
            SecuritySeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl std::str::FromStr for SecuritySeverity {
    type Err = AurguardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(SecuritySeverity::Info),
            "low" => Ok(SecuritySeverity::Low),
            "medium" => Ok(SecuritySeverity::Medium),
            "high" => Ok(SecuritySeverity::High),
            "critical" => Ok(SecuritySeverity::Critical),
            other => Err(AurguardError::config(format!("unknown severity `{}`", other))),
        }
    }
}

impl AurguardError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        AurguardError::ConfigError {
            message: message.into(),
        }
    }

    /// Create a filesystem error
    pub fn filesystem<E: Into<std::io::Error>>(
        path: impl Into<String>,
        message: impl Into<String>,
        source: E,
    ) -> Self {
        AurguardError::FileSystem {
            path: path.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Result type alias for aurguard operations
pub type AurguardResult<T> = std::result::Result<T, AurguardError>;
