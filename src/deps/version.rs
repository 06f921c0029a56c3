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

//! Package versions with a total order.
//!
//! Upstream version strings come in every shape imaginable, so parsing never
//! fails: text that is a strict `MAJOR.MINOR.PATCH[-PRE][+BUILD]` becomes a
//! [`Version::Ideal`], anything else is kept verbatim as a [`Version::Opaque`].
//! A trailing Arch package release (`60.0.2-1`) is read as build metadata.
//!
//! Ordering rules:
//! - ideal vs ideal: major, minor, patch, then pre-release segments
//!   (a release sorts above all of its pre-releases); build metadata is
//!   ignored
//! - opaque vs opaque: plain string comparison
//! - ideal vs opaque: the ideal version is always greater

use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// A single dot-separated pre-release identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Numeric(u64),
    Alpha(String),
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Segment::Numeric(a), Segment::Numeric(b)) => a.cmp(b),
            (Segment::Numeric(_), Segment::Alpha(_)) => Ordering::Less,
            (Segment::Alpha(_), Segment::Numeric(_)) => Ordering::Greater,
            (Segment::Alpha(a), Segment::Alpha(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Numeric(n) => write!(f, "{}", n),
            Segment::Alpha(s) => write!(f, "{}", s),
        }
    }
}

/// A package version
#[derive(Debug, Clone)]
pub enum Version {
    /// Conforms to the structured grammar; `text` is what was parsed
    Ideal { version: semver::Version, text: String },
    /// Anything else, compared as raw text
    Opaque(String),
}

impl Version {
    /// Parse a version string. Never fails.
    pub fn parse(text: &str) -> Self {
        let parsed = with_pkgrel(text).or_else(|| semver::Version::parse(text).ok());
        match parsed {
            Some(version) => Version::Ideal {
                version,
                text: text.to_string(),
            },
            None => Version::Opaque(text.to_string()),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        matches!(self, Version::Ideal { .. })
    }

    pub fn major(&self) -> Option<u64> {
        self.ideal().map(|v| v.major)
    }

    pub fn minor(&self) -> Option<u64> {
        self.ideal().map(|v| v.minor)
    }

    pub fn patch(&self) -> Option<u64> {
        self.ideal().map(|v| v.patch)
    }

    /// Pre-release identifiers in order. Empty for releases and opaque versions.
    pub fn prerelease_segments(&self) -> Vec<Segment> {
        self.ideal().map(|v| segments(&v.pre)).unwrap_or_default()
    }

    /// Build metadata, or the package release of `pkgver-pkgrel` text.
    /// Never affects ordering.
    pub fn build(&self) -> Option<&str> {
        self.ideal()
            .filter(|v| !v.build.is_empty())
            .map(|v| v.build.as_str())
    }

    fn ideal(&self) -> Option<&semver::Version> {
        match self {
            Version::Ideal { version, .. } => Some(version),
            Version::Opaque(_) => None,
        }
    }
}

/// `MAJOR.MINOR.PATCH-PKGREL` where the release is `N` or `N.M`
fn with_pkgrel(text: &str) -> Option<semver::Version> {
    let (upstream, pkgrel) = text.rsplit_once('-')?;
    let numeric = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    let valid_pkgrel = match pkgrel.split_once('.') {
        Some((rel, sub)) => numeric(rel) && numeric(sub),
        None => numeric(pkgrel),
    };
    if !valid_pkgrel || upstream.contains('+') {
        return None;
    }

    let mut version = semver::Version::parse(upstream).ok()?;
    if !version.pre.is_empty() {
        return None;
    }
    version.build = semver::BuildMetadata::new(pkgrel).ok()?;
    Some(version)
}

fn segments(pre: &semver::Prerelease) -> Vec<Segment> {
    if pre.is_empty() {
        return Vec::new();
    }
    pre.as_str()
        .split('.')
        .map(|ident| match ident.parse::<u64>() {
            Ok(n) if ident.bytes().all(|b| b.is_ascii_digit()) => Segment::Numeric(n),
            _ => Segment::Alpha(ident.to_string()),
        })
        .collect()
}

fn compare_ideal(a: &semver::Version, b: &semver::Version) -> Ordering {
    a.major
        .cmp(&b.major)
        .then(a.minor.cmp(&b.minor))
        .then(a.patch.cmp(&b.patch))
        .then_with(|| match (a.pre.is_empty(), b.pre.is_empty()) {
            (true, true) => Ordering::Equal,
            // A release is newer than any of its pre-releases
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => segments(&a.pre).cmp(&segments(&b.pre)),
        })
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Version::Ideal { version: a, .. }, Version::Ideal { version: b, .. }) => compare_ideal(a, b),
            (Version::Ideal { .. }, Version::Opaque(_)) => Ordering::Greater,
            (Version::Opaque(_), Version::Ideal { .. }) => Ordering::Less,
            (Version::Opaque(a), Version::Opaque(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Ideal { text, .. } | Version::Opaque(text) => f.write_str(text),
        }
    }
}

impl FromStr for Version {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Version::parse(s))
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Version::parse(s)
    }
}
