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

//! Banned command table.
//!
//! Terms are matched in table order against each invocation; the first one
//! that matches produces the finding.

use regex::Regex;

use crate::aur::Position;
use crate::error::SecuritySeverity;

/// A command as it will run, after wrappers like `env` or `nohup` are
/// looked through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub name: String,
    pub args: Vec<String>,
    /// Reads the output of the previous pipeline stage
    pub piped: bool,
    pub position: Position,
}

impl Invocation {
    /// The name without any leading directory, so `/usr/bin/curl` is `curl`
    pub fn basename(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Arguments before a `--` terminator
    fn option_args(&self) -> impl Iterator<Item = &str> {
        self.args
            .iter()
            .map(String::as_str)
            .take_while(|a| *a != "--")
    }

    /// Whether `flag` was passed. Short flags also count inside clusters,
    /// so `-rf` has both `-r` and `-f`; `--long` also matches `--long=value`.
    pub fn has_flag(&self, flag: &str) -> bool {
        if let Some(long) = flag.strip_prefix("--") {
            return self.option_args().any(|a| {
                a.strip_prefix("--")
                    .is_some_and(|rest| rest == long || rest.starts_with(&format!("{}=", long)))
            });
        }

        let short = flag
            .strip_prefix('-')
            .filter(|s| s.chars().count() == 1)
            .and_then(|s| s.chars().next());
        match short {
            Some(c) => self.option_args().any(|a| {
                a == flag
                    || (a.starts_with('-') && !a.starts_with("--") && a[1..].contains(c))
            }),
            None => self.option_args().any(|a| a == flag),
        }
    }

    pub fn display(&self) -> String {
        std::iter::once(self.name.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Condition on an invocation's arguments
#[derive(Debug, Clone)]
pub enum ArgPredicate {
    /// At least one of the flags is present
    AnyFlag(Vec<String>),
    /// Every flag is present
    AllFlags(Vec<String>),
    /// Some argument matches the regex
    ArgMatches(Regex),
    /// The command reads from a pipe
    PipedInput,
    All(Vec<ArgPredicate>),
    Any(Vec<ArgPredicate>),
}

impl ArgPredicate {
    pub fn any_flag(flags: &[&str]) -> Self {
        ArgPredicate::AnyFlag(flags.iter().map(|f| f.to_string()).collect())
    }

    pub fn all_flags(flags: &[&str]) -> Self {
        ArgPredicate::AllFlags(flags.iter().map(|f| f.to_string()).collect())
    }

    pub fn arg_matches(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(ArgPredicate::ArgMatches)
    }

    pub fn holds(&self, invocation: &Invocation) -> bool {
        match self {
            ArgPredicate::AnyFlag(flags) => flags.iter().any(|f| invocation.has_flag(f)),
            ArgPredicate::AllFlags(flags) => flags.iter().all(|f| invocation.has_flag(f)),
            ArgPredicate::ArgMatches(re) => invocation.args.iter().any(|a| re.is_match(a)),
            ArgPredicate::PipedInput => invocation.piped,
            ArgPredicate::All(preds) => preds.iter().all(|p| p.holds(invocation)),
            ArgPredicate::Any(preds) => preds.iter().any(|p| p.holds(invocation)),
        }
    }
}

/// One banned command pattern
#[derive(Debug, Clone)]
pub struct BannedTerm {
    /// Matched against the whole command name (or its basename)
    pub command: Regex,
    pub args: Option<ArgPredicate>,
    pub reason: String,
    pub category: String,
    pub severity: SecuritySeverity,
}

impl BannedTerm {
    /// `command` is anchored at both ends before compiling
    pub fn new(
        command: &str,
        reason: impl Into<String>,
        category: impl Into<String>,
        severity: SecuritySeverity,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            command: Regex::new(&format!("^(?:{})$", command))?,
            args: None,
            reason: reason.into(),
            category: category.into(),
            severity,
        })
    }

    pub fn with_args(mut self, predicate: ArgPredicate) -> Self {
        self.args = Some(predicate);
        self
    }

    pub fn matches(&self, invocation: &Invocation) -> bool {
        let name_matches =
            self.command.is_match(&invocation.name) || self.command.is_match(invocation.basename());
        name_matches && self.args.as_ref().map_or(true, |p| p.holds(invocation))
    }
}

/// Ordered list of banned terms
#[derive(Debug, Clone, Default)]
pub struct Blocklist {
    terms: Vec<BannedTerm>,
}

impl Blocklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, term: BannedTerm) {
        self.terms.push(term);
    }

    pub fn iter(&self) -> impl Iterator<Item = &BannedTerm> {
        self.terms.iter()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// First term, in table order, that matches the invocation
    pub fn first_match(&self, invocation: &Invocation) -> Option<&BannedTerm> {
        self.terms.iter().find(|t| t.matches(invocation))
    }

    /// The built-in table of commands no PKGBUILD has a legitimate reason
    /// to run, or that deserve a second look
    pub fn standard() -> Self {
        use SecuritySeverity::*;

        let term = |command: &str, reason: &str, category: &str, severity| {
            BannedTerm::new(command, reason, category, severity)
                .expect("built-in command pattern is a valid regex")
        };
        let matches = |pattern: &str| {
            ArgPredicate::arg_matches(pattern).expect("built-in argument pattern is a valid regex")
        };

        let terms = vec![
            // Destructive
            term("rm", "Recursive deletion of a system or home directory", "destructive", Critical)
                .with_args(ArgPredicate::All(vec![
                    ArgPredicate::any_flag(&["-r", "-R", "--recursive"]),
                    matches(r#"^(/|/\*|~/?|\$HOME/?|\$\{HOME\}/?|/(bin|boot|dev|etc|home|lib|lib64|opt|root|sbin|srv|usr|var)/?\*?)$"#),
                ])),
            term(r"mkfs(\..+)?|mke2fs|mkswap|wipefs|fdisk|sfdisk|cfdisk|gdisk|sgdisk|parted", "Formats or repartitions a disk", "destructive", Critical),
            term("dd", "Raw write to a block device", "destructive", Critical).with_args(matches("^of=/dev/")),
            term("shred", "Irrecoverably overwrites files", "destructive", High),
            // Remote code
            term(r"(ba|da|k|z|c|tc|fi)?sh|fish|python[0-9.]*|perl|ruby|node|php", "Runs code piped in from another command", "remote-code", Critical)
                .with_args(ArgPredicate::PipedInput),
            term("eval", "Evaluates dynamically built code", "obfuscation", High),
            term("base64|base32|xxd", "Decodes embedded data", "obfuscation", Medium)
                .with_args(ArgPredicate::Any(vec![
                    ArgPredicate::any_flag(&["-d", "--decode"]),
                    ArgPredicate::any_flag(&["-r", "--revert"]),
                ])),
            // Network
            term("nc|ncat|netcat|socat|telnet", "Raw network socket tool (possible backdoor)", "network", High),
            term("curl|wget|aria2c", "Network download outside the source array", "network", Medium),
            // Privilege and persistence
            term("sudo|doas|su|pkexec|run0", "Privilege escalation during a build", "privilege", High),
            term("chmod", "World-writable or set-id permissions", "privilege", High)
                .with_args(matches(r"^(0?777|a\+rwx|[ugoa]*\+[rwxt]*s[rwxt]*|[2-7][0-7]{3})$")),
            term("crontab|at", "Schedules commands outside the build", "persistence", High),
            term("systemctl", "Alters system services during a build", "persistence", Medium)
                .with_args(matches("^(enable|start|restart|reload|daemon-reload|mask|unmask|link)$")),
            term("history", "Clears shell history", "evasion", Medium).with_args(ArgPredicate::any_flag(&["-c"])),
            // Package managers behind pacman's back
            term(r"pip[0-9.]*|npm|yarn|pnpm|gem|cargo|go", "Installs packages outside pacman", "package-manager", Low)
                .with_args(matches("^(install|get|add)$")),
            term("pacman", "Modifies the system package set from a PKGBUILD", "package-manager", High)
                .with_args(ArgPredicate::any_flag(&["-S", "-U", "-R", "--sync", "--upgrade", "--remove"])),
        ];

        Self { terms }
    }
}

impl FromIterator<BannedTerm> for Blocklist {
    fn from_iter<I: IntoIterator<Item = BannedTerm>>(iter: I) -> Self {
        Self {
            terms: iter.into_iter().collect(),
        }
    }
}

impl Extend<BannedTerm> for Blocklist {
    fn extend<I: IntoIterator<Item = BannedTerm>>(&mut self, iter: I) {
        self.terms.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inv(line: &str) -> Invocation {
        let mut parts = line.split_whitespace().map(str::to_string);
        Invocation {
            name: parts.next().unwrap(),
            args: parts.collect(),
            piped: false,
            position: Position::START,
        }
    }

    #[test]
    fn test_has_flag() {
        let i = inv("rm -rf --no-preserve-root=yes dir -- -x");
        assert!(i.has_flag("-r"));
        assert!(i.has_flag("-f"));
        assert!(i.has_flag("--no-preserve-root"));
        assert!(!i.has_flag("-x"));
        assert!(!i.has_flag("-v"));
        assert!(inv("find . -exec x").has_flag("-exec"));
    }

    #[test]
    fn test_anchored_command() {
        let term = BannedTerm::new("sh", "r", "c", SecuritySeverity::High).unwrap();
        assert!(term.matches(&inv("sh -c x")));
        assert!(term.matches(&inv("/bin/sh")));
        assert!(!term.matches(&inv("bash")));
        assert!(!term.matches(&inv("shasum")));
    }

    #[test]
    fn test_predicates() {
        let all = ArgPredicate::all_flags(&["-r", "-f"]);
        assert!(all.holds(&inv("rm -r -f x")));
        assert!(all.holds(&inv("rm -fr x")));
        assert!(!all.holds(&inv("rm -r x")));

        let piped = ArgPredicate::PipedInput;
        let mut i = inv("sh");
        assert!(!piped.holds(&i));
        i.piped = true;
        assert!(piped.holds(&i));

        let any = ArgPredicate::Any(vec![ArgPredicate::any_flag(&["-d"]), ArgPredicate::PipedInput]);
        assert!(any.holds(&inv("base64 -d")));
        assert!(!any.holds(&inv("base64 file")));
    }

    #[test]
    fn test_standard_table() {
        let list = Blocklist::standard();
        assert!(!list.is_empty());

        let hit = |line: &str| list.first_match(&inv(line)).map(|t| t.severity);
        assert_eq!(hit("rm -rf /"), Some(SecuritySeverity::Critical));
        assert_eq!(hit("rm -r $HOME"), Some(SecuritySeverity::Critical));
        assert_eq!(hit("rm -rf $srcdir/build"), None);
        assert_eq!(hit("rm -f /etc/foo"), None);
        assert_eq!(hit("dd if=/dev/zero of=/dev/sda"), Some(SecuritySeverity::Critical));
        assert_eq!(hit("dd if=a of=b"), None);
        assert_eq!(hit("curl -O https://example.com/x"), Some(SecuritySeverity::Medium));
        assert_eq!(hit("chmod 755 bin"), None);
        assert_eq!(hit("chmod 4755 bin"), Some(SecuritySeverity::High));
        assert_eq!(hit("make install"), None);
        assert_eq!(hit("npm install"), Some(SecuritySeverity::Low));
        assert_eq!(hit("npm run build"), None);
        assert_eq!(hit("sh ./configure"), None);
    }
}
