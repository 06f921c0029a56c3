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

//! Dependency specifiers and version constraints.
//!
//! Provides:
//! - Ordered package versions
//! - `name[<op>version]` parsing and rendering
//! - Constraint satisfaction

pub mod version;

use std::fmt;

pub use version::{Segment, Version};

/// Operator characters that can never appear in a package name
const OPERATOR_CHARS: &[char] = &['<', '>', '='];

/// Dependency type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepType {
    Required,
    Optional,
    Make,
    Check,
}

/// Version requirement attached to a dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Any version is acceptable
    Unconstrained,
    /// `>=`
    AtLeast(Version),
    /// `>`
    MoreThan(Version),
    /// `=`
    ExactlyEquals(Version),
    /// `<=`
    AtMost(Version),
    /// `<`
    LessThan(Version),
}

impl Requirement {
    /// Canonical operator spelling
    pub fn operator(&self) -> Option<&'static str> {
        match self {
            Requirement::Unconstrained => None,
            Requirement::AtLeast(_) => Some(">="),
            Requirement::MoreThan(_) => Some(">"),
            Requirement::ExactlyEquals(_) => Some("="),
            Requirement::AtMost(_) => Some("<="),
            Requirement::LessThan(_) => Some("<"),
        }
    }

    pub fn version(&self) -> Option<&Version> {
        match self {
            Requirement::Unconstrained => None,
            Requirement::AtLeast(v)
            | Requirement::MoreThan(v)
            | Requirement::ExactlyEquals(v)
            | Requirement::AtMost(v)
            | Requirement::LessThan(v) => Some(v),
        }
    }

    /// Check if a candidate version satisfies this requirement
    pub fn satisfied_by(&self, candidate: &Version) -> bool {
        match self {
            Requirement::Unconstrained => true,
            Requirement::AtLeast(v) => candidate >= v,
            Requirement::MoreThan(v) => candidate > v,
            Requirement::ExactlyEquals(v) => candidate == v,
            Requirement::AtMost(v) => candidate <= v,
            Requirement::LessThan(v) => candidate < v,
        }
    }

    fn from_operator(op: &str, version: Version) -> Self {
        match op {
            ">=" => Requirement::AtLeast(version),
            ">" => Requirement::MoreThan(version),
            "<=" => Requirement::AtMost(version),
            "<" => Requirement::LessThan(version),
            _ => Requirement::ExactlyEquals(version),
        }
    }
}

/// Dependency specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub requirement: Requirement,
}

impl Dependency {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            requirement: Requirement::Unconstrained,
        }
    }

    pub fn with_requirement(name: &str, requirement: Requirement) -> Self {
        Self {
            name: name.to_string(),
            requirement,
        }
    }

    /// Parse `name[<op>version]`.
    ///
    /// Operators are matched longest first so `>=` is never split into `>`
    /// and `=`. Returns `None` only when the name would be empty.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let split = text.find(OPERATOR_CHARS).unwrap_or(text.len());
        let name = text[..split].trim();
        if name.is_empty() {
            return None;
        }

        let rest = &text[split..];
        if rest.is_empty() {
            return Some(Self::new(name));
        }

        let op = [">=", "<=", ">", "<", "="]
            .into_iter()
            .find(|op| rest.starts_with(*op))?;
        let version = Version::parse(rest[op.len()..].trim());

        Some(Self::with_requirement(name, Requirement::from_operator(op, version)))
    }

    /// Render back to specifier text. Inverse of [`Dependency::parse`].
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Check if a candidate version of this package satisfies the dependency
    pub fn satisfied_by(&self, candidate: &Version) -> bool {
        self.requirement.satisfied_by(candidate)
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.requirement.operator(), self.requirement.version()) {
            (Some(op), Some(v)) => write!(f, "{}{}{}", self.name, op, v),
            _ => write!(f, "{}", self.name),
        }
    }
}

/// Parse a dependency specifier string
pub fn parse_dependency(text: &str) -> Option<Dependency> {
    Dependency::parse(text)
}

/// Render a dependency back to its specifier text
pub fn render_dependency(dep: &Dependency) -> String {
    dep.render()
}

/// Check whether `candidate` satisfies `dep`
pub fn satisfies(dep: &Dependency, candidate: &Version) -> bool {
    dep.satisfied_by(candidate)
}

/// Parse an `optdepends` entry: `name[<op>version][: description]`.
///
/// The separator is a colon followed by whitespace (or ending the entry), so
/// epochs such as `foo>=1:2.0.0` stay inside the version.
pub fn parse_optdepend(text: &str) -> Option<(Dependency, Option<String>)> {
    let text = text.trim();
    let (spec, description) = match text.find(": ") {
        Some(pos) => (&text[..pos], Some(text[pos + 2..].trim().to_string())),
        None => match text.strip_suffix(':') {
            Some(spec) => (spec, None),
            None => (text, None),
        },
    };

    let description = description.filter(|d| !d.is_empty());
    Dependency::parse(spec).map(|dep| (dep, description))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(s: &str) -> Version {
        Version::parse(s)
    }

    #[test]
    fn test_parse_unconstrained() {
        assert_eq!(parse_dependency("python2"), Some(Dependency::new("python2")));
    }

    #[test]
    fn test_parse_at_least() {
        let dep = parse_dependency("python2-lxml>=3.1.0").unwrap();
        assert_eq!(
            dep,
            Dependency::with_requirement("python2-lxml", Requirement::AtLeast(v("3.1.0")))
        );
        assert_eq!(dep.render(), "python2-lxml>=3.1.0");
    }

    #[test]
    fn test_parse_more_than_and_exact() {
        assert_eq!(
            parse_dependency("foobar>1.2.3"),
            Some(Dependency::with_requirement("foobar", Requirement::MoreThan(v("1.2.3"))))
        );
        assert_eq!(
            parse_dependency("foobar=1.2.3"),
            Some(Dependency::with_requirement("foobar", Requirement::ExactlyEquals(v("1.2.3"))))
        );
        assert_eq!(
            parse_dependency("foobar<=1.2.3").map(|d| d.requirement),
            Some(Requirement::AtMost(v("1.2.3")))
        );
        assert_eq!(
            parse_dependency("foobar<1.2.3").map(|d| d.requirement),
            Some(Requirement::LessThan(v("1.2.3")))
        );
    }

    #[test]
    fn test_parse_opaque_version() {
        let dep = parse_dependency("glibc>=2.38").unwrap();
        assert_eq!(dep.requirement, Requirement::AtLeast(Version::Opaque("2.38".to_string())));
        assert_eq!(dep.render(), "glibc>=2.38");
    }

    #[test]
    fn test_parse_empty_name() {
        assert_eq!(parse_dependency(""), None);
        assert_eq!(parse_dependency(">=1.0.0"), None);
        assert_eq!(parse_dependency("   "), None);
    }

    #[test]
    fn test_satisfies() {
        let dep = parse_dependency("foo>=1.2.0").unwrap();
        assert!(satisfies(&dep, &v("1.2.0")));
        assert!(satisfies(&dep, &v("1.10.0")));
        assert!(!satisfies(&dep, &v("1.1.9")));

        let dep = parse_dependency("foo<2.0.0").unwrap();
        assert!(satisfies(&dep, &v("2.0.0-rc.1")));
        assert!(!satisfies(&dep, &v("2.0.0")));

        let dep = parse_dependency("foo=1.0.0").unwrap();
        assert!(satisfies(&dep, &v("1.0.0+local")));

        // Installed packages carry a release number
        let dep = parse_dependency("firefox>=60.0.2").unwrap();
        assert!(satisfies(&dep, &v("60.0.2-1")));
        assert!(!satisfies(&dep, &v("60.0.1-3")));

        assert!(satisfies(&Dependency::new("foo"), &v("anything")));
    }

    #[test]
    fn test_parse_optdepend() {
        let (dep, desc) = parse_optdepend("python-pyqt5: GUI frontend").unwrap();
        assert_eq!(dep, Dependency::new("python-pyqt5"));
        assert_eq!(desc.as_deref(), Some("GUI frontend"));

        let (dep, desc) = parse_optdepend("foo>=1:2.0: with epoch").unwrap();
        assert_eq!(dep.render(), "foo>=1:2.0");
        assert_eq!(desc.as_deref(), Some("with epoch"));

        let (dep, desc) = parse_optdepend("bar").unwrap();
        assert_eq!(dep.name, "bar");
        assert!(desc.is_none());
    }

    proptest! {
        #[test]
        fn prop_render_round_trips(
            name in "[a-z0-9][a-z0-9@._+-]{0,15}",
            op in prop::sample::select(vec!["", ">=", ">", "=", "<=", "<"]),
            ver in "[0-9]{1,2}(\\.[0-9]{1,2}){0,2}(-[a-z0-9]{1,3})?",
        ) {
            let text = if op.is_empty() { name.clone() } else { format!("{}{}{}", name, op, ver) };
            let dep = parse_dependency(&text).unwrap();
            prop_assert_eq!(dep.render(), text.clone());
            prop_assert_eq!(parse_dependency(&dep.render()), Some(dep));
        }
    }
}
