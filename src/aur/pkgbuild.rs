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

//! PKGBUILD metadata recovered from a parsed recipe.

use std::collections::HashMap;

use crate::deps::{parse_optdepend, DepType, Dependency, Version};

use super::ast::{Recipe, Value};

/// An `optdepends` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalDependency {
    pub dependency: Dependency,
    pub description: Option<String>,
}

/// Parsed PKGBUILD metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pkgbuild {
    pub pkgname: Vec<String>,
    pub pkgbase: String,
    pub pkgver: String,
    pub pkgrel: String,
    pub epoch: Option<u32>,
    pub pkgdesc: String,
    pub arch: Vec<String>,
    pub url: String,
    pub license: Vec<String>,
    pub depends: Vec<Dependency>,
    pub makedepends: Vec<Dependency>,
    pub checkdepends: Vec<Dependency>,
    pub optdepends: Vec<OptionalDependency>,
    pub provides: Vec<Dependency>,
    pub conflicts: Vec<Dependency>,
    pub replaces: Vec<Dependency>,
    pub source: Vec<String>,
    pub validpgpkeys: Vec<String>,
    pub backup: Vec<String>,
    pub options: Vec<String>,
    pub install: Option<String>,
}

impl Pkgbuild {
    /// Collect metadata from the top-level assignments of a recipe.
    ///
    /// Assignments are replayed in order, so later ones override earlier
    /// ones and `+=` appends. Values that contain expansions are kept as
    /// their display text; nothing is evaluated.
    pub fn from_recipe(recipe: &Recipe) -> Self {
        let mut vars: HashMap<&str, Vec<String>> = HashMap::new();
        for assignment in recipe.assignments() {
            let values: Vec<String> = match &assignment.value {
                Value::Scalar(w) => vec![w.literal().unwrap_or_else(|| w.text())],
                Value::Array(ws) => ws.iter().map(|w| w.literal().unwrap_or_else(|| w.text())).collect(),
            };
            let entry = vars.entry(assignment.name.as_str()).or_default();
            if !assignment.append {
                entry.clear();
            }
            entry.extend(values);
        }

        let list = |name: &str| vars.get(name).cloned().unwrap_or_default();
        let scalar = |name: &str| {
            vars.get(name)
                .and_then(|v| v.first())
                .cloned()
                .unwrap_or_default()
        };
        let deps = |name: &str| -> Vec<Dependency> {
            list(name)
                .iter()
                .filter_map(|d| Dependency::parse(d))
                .collect()
        };

        let pkgname = list("pkgname");
        let mut pkgbase = scalar("pkgbase");
        if pkgbase.is_empty() {
            pkgbase = pkgname.first().cloned().unwrap_or_default();
        }

        Self {
            pkgbase,
            pkgname,
            pkgver: scalar("pkgver"),
            pkgrel: scalar("pkgrel"),
            epoch: scalar("epoch").parse().ok(),
            pkgdesc: scalar("pkgdesc"),
            arch: list("arch"),
            url: scalar("url"),
            license: list("license"),
            depends: deps("depends"),
            makedepends: deps("makedepends"),
            checkdepends: deps("checkdepends"),
            optdepends: list("optdepends")
                .iter()
                .filter_map(|entry| parse_optdepend(entry))
                .map(|(dependency, description)| OptionalDependency {
                    dependency,
                    description,
                })
                .collect(),
            provides: deps("provides"),
            conflicts: deps("conflicts"),
            replaces: deps("replaces"),
            source: list("source"),
            validpgpkeys: list("validpgpkeys"),
            backup: list("backup"),
            options: list("options"),
            install: vars.get("install").and_then(|v| v.first()).cloned(),
        }
    }

    /// `[epoch:]pkgver-pkgrel` as written
    pub fn full_version_string(&self) -> String {
        let mut out = String::new();
        if let Some(epoch) = self.epoch.filter(|e| *e > 0) {
            out.push_str(&format!("{}:", epoch));
        }
        out.push_str(&self.pkgver);
        if !self.pkgrel.is_empty() {
            out.push('-');
            out.push_str(&self.pkgrel);
        }
        out
    }

    pub fn full_version(&self) -> Version {
        Version::parse(&self.full_version_string())
    }

    /// Every dependency with its kind, in declaration order per kind
    pub fn all_dependencies(&self) -> impl Iterator<Item = (DepType, &Dependency)> {
        let required = self.depends.iter().map(|d| (DepType::Required, d));
        let make = self.makedepends.iter().map(|d| (DepType::Make, d));
        let check = self.checkdepends.iter().map(|d| (DepType::Check, d));
        let optional = self
            .optdepends
            .iter()
            .map(|o| (DepType::Optional, &o.dependency));
        required.chain(make).chain(check).chain(optional)
    }
}
