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

//! Configuration management with validation and defaults.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{AurguardError, AurguardResult, SecuritySeverity};
use crate::security::{ArgPredicate, BannedTerm, Blocklist, ScanOptions};

/// Main configuration structure for aurguard
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// PKGBUILD scanning
    pub security: SecurityConfig,

    /// Where to find pacman's own configuration
    pub pacman: PacmanConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// PKGBUILD scanning configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityConfig {
    /// Scan PKGBUILDs at all
    pub enabled: bool,

    /// Findings at or above this severity block the build
    pub block_severity: SecuritySeverity,

    /// Nested command substitution levels to inspect (unset = all)
    pub substitution_depth: Option<usize>,

    /// Start from the built-in blocklist
    pub use_standard_terms: bool,

    /// Extra terms, appended after the built-in ones
    pub banned: Vec<BannedTermConfig>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            block_severity: SecuritySeverity::High,
            substitution_depth: None,
            use_standard_terms: true,
            banned: Vec::new(),
        }
    }
}

/// A `[[security.banned]]` entry
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BannedTermConfig {
    /// Regex for the command name, anchored at both ends
    pub command: String,
    #[serde(default)]
    pub any_flags: Vec<String>,
    #[serde(default)]
    pub all_flags: Vec<String>,
    /// Regex some argument must match
    pub arg_pattern: Option<String>,
    #[serde(default)]
    pub piped_input: bool,
    pub reason: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_severity")]
    pub severity: SecuritySeverity,
}

fn default_category() -> String {
    "custom".to_string()
}

fn default_severity() -> SecuritySeverity {
    SecuritySeverity::Medium
}

impl BannedTermConfig {
    /// Compile into a term. All given conditions must hold.
    pub fn to_term(&self) -> AurguardResult<BannedTerm> {
        let bad_regex = |what: &str, e: regex::Error| {
            AurguardError::config(format!(
                "banned term `{}`: invalid {} regex: {}",
                self.command, what, e
            ))
        };

        let term = BannedTerm::new(&self.command, &self.reason, &self.category, self.severity)
            .map_err(|e| bad_regex("command", e))?;

        let mut predicates = Vec::new();
        if !self.any_flags.is_empty() {
            predicates.push(ArgPredicate::AnyFlag(self.any_flags.clone()));
        }
        if !self.all_flags.is_empty() {
            predicates.push(ArgPredicate::AllFlags(self.all_flags.clone()));
        }
        if let Some(pattern) = &self.arg_pattern {
            predicates.push(ArgPredicate::arg_matches(pattern).map_err(|e| bad_regex("argument", e))?);
        }
        if self.piped_input {
            predicates.push(ArgPredicate::PipedInput);
        }

        Ok(match predicates.len() {
            0 => term,
            1 => term.with_args(predicates.remove(0)),
            _ => term.with_args(ArgPredicate::All(predicates)),
        })
    }
}

impl SecurityConfig {
    /// The blocklist this configuration describes
    pub fn blocklist(&self) -> AurguardResult<Blocklist> {
        let mut list = if self.use_standard_terms {
            Blocklist::standard()
        } else {
            Blocklist::new()
        };
        for entry in &self.banned {
            list.push(entry.to_term()?);
        }
        Ok(list)
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            substitution_depth: self.substitution_depth,
        }
    }

    fn apply(mut self, file: SecurityFile) -> Self {
        if let Some(enabled) = file.enabled {
            self.enabled = enabled;
        }
        if let Some(severity) = file.block_severity {
            self.block_severity = severity;
        }
        if file.substitution_depth.is_some() {
            self.substitution_depth = file.substitution_depth;
        }
        if let Some(standard) = file.use_standard_terms {
            self.use_standard_terms = standard;
        }
        // Later files add to the terms of earlier ones
        self.banned.extend(file.banned);

        self
    }
}

/// pacman integration
#[derive(Debug, Clone, PartialEq)]
pub struct PacmanConfig {
    pub config_path: PathBuf,
}

impl Default for PacmanConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("/etc/pacman.conf"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (unset = stderr only)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
        }
    }
}

/// One config file as written. Keys left out keep the value of the layer
/// below, so a file can also set a key back to its default.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    security: SecurityFile,
    pacman: PacmanFile,
    logging: LoggingFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SecurityFile {
    enabled: Option<bool>,
    block_severity: Option<SecuritySeverity>,
    substitution_depth: Option<usize>,
    use_standard_terms: Option<bool>,
    banned: Vec<BannedTermConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PacmanFile {
    config_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoggingFile {
    level: Option<String>,
    file: Option<PathBuf>,
}

impl ConfigFile {
    fn read(path: &Path) -> AurguardResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AurguardError::filesystem(path.display().to_string(), "cannot read config", e)
        })?;
        let file = toml::from_str::<ConfigFile>(&content).map_err(|e| {
            AurguardError::config(format!("{}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "loaded config");
        Ok(file)
    }
}

impl Config {
    /// Load configuration from multiple sources with precedence:
    /// 1. /etc/aurguard/aurguard.toml (system-wide)
    /// 2. ~/.config/aurguard/config.toml (user)
    /// 3. Environment variables (AURGUARD_*)
    ///
    /// Missing files are skipped; a file that exists but does not parse is
    /// an error.
    pub fn load() -> AurguardResult<Self> {
        let mut layers = vec![PathBuf::from("/etc/aurguard/aurguard.toml")];
        if let Some(config_dir) = dirs::config_dir() {
            layers.push(config_dir.join("aurguard").join("config.toml"));
        }

        let config = Config::load_layers(&layers)?
            .apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then each existing file in order
    pub fn load_layers(paths: &[PathBuf]) -> AurguardResult<Self> {
        let mut config = Config::default();
        for path in paths.iter().filter(|p| p.exists()) {
            config = config.apply(ConfigFile::read(path)?);
        }
        Ok(config)
    }

    /// Defaults plus a single config file
    pub fn load_from(path: &Path) -> AurguardResult<Self> {
        Ok(Config::default().apply(ConfigFile::read(path)?))
    }

    fn apply(mut self, file: ConfigFile) -> Self {
        self.security = self.security.apply(file.security);

        if let Some(path) = file.pacman.config_path {
            self.pacman.config_path = path;
        }

        if let Some(level) = file.logging.level {
            self.logging.level = level;
        }
        if file.logging.file.is_some() {
            self.logging.file = file.logging.file;
        }

        self
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> AurguardResult<Self> {
        if let Some(val) = var("AURGUARD_SECURITY_ENABLED") {
            self.security.enabled = val == "1" || val.to_lowercase() == "true";
        }

        if let Some(val) = var("AURGUARD_BLOCK_SEVERITY") {
            self.security.block_severity = val.parse()?;
        }

        if let Some(val) = var("AURGUARD_PACMAN_CONF") {
            self.pacman.config_path = PathBuf::from(val);
        }

        if let Some(val) = var("AURGUARD_LOG_LEVEL") {
            self.logging.level = val;
        }

        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> AurguardResult<()> {
        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];
        if !LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(AurguardError::config(format!(
                "unknown log level `{}`",
                self.logging.level
            )));
        }
        for entry in &self.security.banned {
            if entry.command.trim().is_empty() {
                return Err(AurguardError::config("banned term with an empty command"));
            }
        }
        // Surface bad regexes at load time rather than at first scan
        self.security.blocklist().map(|_| ())
    }
}
