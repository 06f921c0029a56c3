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

//! pacman.conf reader.
//!
//! Every directive is kept as an ordered list of values; repeated keys
//! append. Directives are also recorded per section so repository blocks
//! can be inspected on their own.

use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Structural error in pacman.conf. Fatal for the whole file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfError {
    #[error("line {line}: empty directive name")]
    EmptyKey { line: usize },

    #[error("line {line}: directive name `{key}` contains whitespace")]
    KeyWithWhitespace { line: usize, key: String },

    #[error("line {line}: unterminated section header")]
    UnterminatedSection { line: usize },

    #[error("line {line}: empty section header")]
    EmptySection { line: usize },

    #[error("line {line}: unexpected text after section header: `{text}`")]
    TrailingText { line: usize, text: String },

    #[error("line {line}: line continuation at end of file")]
    ContinuationAtEof { line: usize },
}

impl ConfError {
    /// 1-based line where the offending logical line starts
    pub fn line(&self) -> usize {
        match self {
            ConfError::EmptyKey { line }
            | ConfError::KeyWithWhitespace { line, .. }
            | ConfError::UnterminatedSection { line }
            | ConfError::EmptySection { line }
            | ConfError::TrailingText { line, .. }
            | ConfError::ContinuationAtEof { line } => *line,
        }
    }
}

/// Ordered key -> values store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    order: Vec<String>,
    values: HashMap<String, Vec<String>>,
}

impl Directives {
    fn record(&mut self, key: &str, values: &[String]) {
        match self.values.get_mut(key) {
            Some(existing) => existing.extend_from_slice(values),
            None => {
                self.order.push(key.to_string());
                self.values.insert(key.to_string(), values.to_vec());
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.values.get(key).map(Vec::as_slice)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Keys in the order they first appeared
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// A `[name]` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    /// Line of the header
    pub line: usize,
    pub directives: Directives,
}

/// Parsed pacman.conf
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacmanConf {
    directives: Directives,
    sections: Vec<Section>,
}

impl PacmanConf {
    /// Parse pacman.conf text. Any structural error rejects the whole file.
    pub fn parse(text: &str) -> Result<Self, ConfError> {
        let mut conf = PacmanConf::default();
        let mut logical = String::new();
        let mut start: Option<usize> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let first_line = *start.get_or_insert(line_no);

            let content = match raw.find('#') {
                Some(pos) => &raw[..pos],
                None => raw,
            };
            let content = content.trim_end();

            if let Some(joined) = content.strip_suffix('\\') {
                logical.push_str(joined);
                continue;
            }
            logical.push_str(content);

            conf.apply(&logical, first_line)?;
            logical.clear();
            start = None;
        }

        if let Some(line) = start {
            return Err(ConfError::ContinuationAtEof { line });
        }

        debug!(
            directives = conf.directives.len(),
            sections = conf.sections.len(),
            "parsed pacman.conf"
        );
        Ok(conf)
    }

    fn apply(&mut self, line: &str, line_no: usize) -> Result<(), ConfError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        if let Some(header) = line.strip_prefix('[') {
            let close = header
                .find(']')
                .ok_or(ConfError::UnterminatedSection { line: line_no })?;
            let name = header[..close].trim();
            if name.is_empty() {
                return Err(ConfError::EmptySection { line: line_no });
            }
            let rest = header[close + 1..].trim();
            if !rest.is_empty() {
                return Err(ConfError::TrailingText {
                    line: line_no,
                    text: rest.to_string(),
                });
            }
            self.sections.push(Section {
                name: name.to_string(),
                line: line_no,
                directives: Directives::default(),
            });
            return Ok(());
        }

        let (key, values) = match line.split_once('=') {
            Some((key, value)) => (
                key.trim(),
                value.split_whitespace().map(str::to_string).collect::<Vec<_>>(),
            ),
            None => (line, Vec::new()),
        };

        if key.is_empty() {
            return Err(ConfError::EmptyKey { line: line_no });
        }
        if key.contains(char::is_whitespace) {
            return Err(ConfError::KeyWithWhitespace {
                line: line_no,
                key: key.to_string(),
            });
        }

        self.directives.record(key, &values);
        if let Some(section) = self.sections.last_mut() {
            section.directives.record(key, &values);
        }
        Ok(())
    }

    /// All values recorded for `key` across the file, in order
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.directives.get(key)
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key)?.first().map(String::as_str)
    }

    /// True for bare directives such as `Color` as well as keyed ones
    pub fn contains(&self, key: &str) -> bool {
        self.directives.contains(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.directives.keys()
    }

    /// Section names in document order
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.name.as_str())
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn ignored_packages(&self) -> Vec<&str> {
        self.list("IgnorePkg")
    }

    pub fn hold_packages(&self) -> Vec<&str> {
        self.list("HoldPkg")
    }

    pub fn parallel_downloads(&self) -> Option<u32> {
        self.first("ParallelDownloads")?.parse().ok()
    }

    /// Repository sections, i.e. everything but `[options]`
    pub fn repositories(&self) -> Vec<&str> {
        self.sections().filter(|name| *name != "options").collect()
    }

    fn list(&self, key: &str) -> Vec<&str> {
        self.get(key)
            .map(|values| values.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }
}
