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

//! Field extraction from `pacman -Qi` / `pacman -Si` output.

use crate::deps::{Dependency, Version};

/// Lowercase with all whitespace removed, so `Depends On` == `dependson`
fn normalise(field: &str) -> String {
    field
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Value of the first `Field : value` line whose name matches `field`.
///
/// Field names are compared trimmed, lowercased and with internal whitespace
/// removed. Lines without a colon and unknown fields are ignored.
pub fn extract_field<'a>(text: &'a str, field: &str) -> Option<&'a str> {
    let wanted = normalise(field);
    text.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (normalise(key) == wanted).then(|| value.trim())
    })
}

/// [`extract_field`] plus the indented continuation lines pacman prints
/// when a list is wider than the terminal, joined with single spaces
pub fn extract_field_folded(text: &str, field: &str) -> Option<String> {
    let wanted = normalise(field);
    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if normalise(key) != wanted {
            continue;
        }

        let mut folded = value.trim().to_string();
        for next in lines.by_ref() {
            if next.trim().is_empty() || !next.starts_with(char::is_whitespace) {
                break;
            }
            folded.push(' ');
            folded.push_str(next.trim());
        }
        return Some(folded);
    }
    None
}

/// The package version from query output. `None` when the field is absent
/// or empty.
pub fn extract_version(text: &str) -> Option<Version> {
    extract_field(text, "version")
        .filter(|v| !v.is_empty())
        .map(Version::parse)
}

/// The `Depends On` list. pacman prints `None` for no dependencies.
pub fn extract_dependencies(text: &str) -> Vec<Dependency> {
    extract_field_folded(text, "Depends On")
        .map(|value| {
            value
                .split_whitespace()
                .filter(|s| *s != "None")
                .filter_map(Dependency::parse)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::Requirement;

    const QI: &str = "\
Name            : firefox
Version         : 60.0.2-1
Description     : Standalone web browser from mozilla.org
Architecture    : x86_64
URL             : https://www.mozilla.org/firefox/
Depends On      : gtk3  mozilla-common  libxt  nss>=3.36.0  dbus-glib
Optional Deps   : networkmanager: Location detection via available WiFi networks
Build Date      : Wed 06 Jun 2018 12:00:00 PM
";

    #[test]
    fn test_extract_version() {
        let version = extract_version(QI).unwrap();
        assert!(version.is_well_formed());
        assert_eq!(version.major(), Some(60));
        assert_eq!(version.minor(), Some(0));
        assert_eq!(version.patch(), Some(2));
        assert_eq!(version.build(), Some("1"));
        assert!(version.prerelease_segments().is_empty());
        assert_eq!(version.to_string(), "60.0.2-1");
        assert_eq!(version, Version::parse("60.0.2"));
    }

    #[test]
    fn test_extract_version_absent() {
        assert!(extract_version("Name : foo\nArchitecture : any\n").is_none());
        assert!(extract_version("").is_none());
        assert!(extract_version("Version :\n").is_none());
    }

    #[test]
    fn test_field_names_are_normalised() {
        assert_eq!(extract_field(QI, "build date"), Some("Wed 06 Jun 2018 12:00:00 PM"));
        assert_eq!(extract_field(QI, "ARCHITECTURE"), Some("x86_64"));
        assert_eq!(extract_field("  ver sion  :  1.0.0  ", "version"), Some("1.0.0"));
        assert_eq!(extract_field(QI, "url"), Some("https://www.mozilla.org/firefox/"));
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let text = "Installed Size : 1 MiB\nVersion : 2:1.0-3\nName : x\n";
        assert_eq!(extract_version(text), Some(Version::parse("2:1.0-3")));
    }

    #[test]
    fn test_extract_dependencies() {
        let deps = extract_dependencies(QI);
        assert_eq!(deps.len(), 5);
        assert_eq!(deps[3].name, "nss");
        assert_eq!(deps[3].requirement, Requirement::AtLeast(Version::parse("3.36.0")));

        assert!(extract_dependencies("Depends On : None\n").is_empty());
        assert!(extract_dependencies("Name : x\n").is_empty());
    }

    #[test]
    fn test_wrapped_dependency_list() {
        let text = "\
Name            : firefox
Depends On      : gtk3  mozilla-common  libxt
                  nss>=3.36.0  dbus-glib
Optional Deps   : None
";
        let deps = extract_dependencies(text);
        assert_eq!(
            deps.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            vec!["gtk3", "mozilla-common", "libxt", "nss", "dbus-glib"]
        );
        assert_eq!(
            extract_field_folded(text, "depends on").as_deref(),
            Some("gtk3  mozilla-common  libxt nss>=3.36.0  dbus-glib")
        );
        assert_eq!(extract_field_folded(QI, "Name").as_deref(), Some("firefox"));
        assert_eq!(extract_field_folded(QI, "Groups"), None);
    }
}
