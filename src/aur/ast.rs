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

//! Syntax tree for parsed PKGBUILDs.
//!
//! Nothing in here is ever evaluated: variable references and command
//! substitutions are kept exactly as written.

use serde::Serialize;
use std::fmt;

/// Location of a token in the original PKGBUILD text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Position {
    /// 1-indexed line
    pub line: usize,
    /// 1-indexed column, in characters
    pub column: usize,
    /// Byte offset from the start of the text
    pub offset: usize,
}

impl Position {
    pub const START: Position = Position {
        line: 1,
        column: 1,
        offset: 0,
    };
}

impl Default for Position {
    fn default() -> Self {
        Self::START
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// A whole parsed PKGBUILD
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Recipe {
    pub statements: Vec<Statement>,
}

impl Recipe {
    /// Top-level function definitions in document order
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Function(f) => Some(f),
            _ => None,
        })
    }

    /// Look up a top-level function. Later definitions win, as in bash.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions().filter(|f| f.name == name).last()
    }

    /// Top-level assignments in document order
    pub fn assignments(&self) -> impl Iterator<Item = &Assignment> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Assignment(a) => Some(a),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assignment(Assignment),
    Function(Function),
    Command(Command),
    Compound(Compound),
}

impl Statement {
    pub fn position(&self) -> Position {
        match self {
            Statement::Assignment(a) => a.position,
            Statement::Function(f) => f.position,
            Statement::Command(c) => c.position,
            Statement::Compound(c) => c.position,
        }
    }
}

/// `name=value`, `name=(a b c)` or the `+=` forms
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    pub append: bool,
    pub value: Value,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Word),
    Array(Vec<Word>),
}

impl Value {
    /// Every word in the value, in order
    pub fn words(&self) -> &[Word] {
        match self {
            Value::Scalar(w) => std::slice::from_ref(w),
            Value::Array(ws) => ws,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub body: Vec<Statement>,
    pub position: Position,
}

/// How a command is joined to the one before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connector {
    /// First in its list, or after `;`, `&` or a newline
    #[default]
    Sequence,
    /// `|` or `|&`: reads the previous command's output
    Pipe,
    /// `&&`
    And,
    /// `||`
    Or,
}

/// A simple command invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: Word,
    pub args: Vec<Word>,
    /// Prefix assignments such as `CFLAGS=-O2 make`
    pub env: Vec<Assignment>,
    pub redirects: Vec<Redirect>,
    pub connector: Connector,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Redirect {
    /// Operator as written, including any fd prefix (`2>&`, `<<-`, ...)
    pub op: String,
    pub target: Word,
    pub heredoc: Option<Heredoc>,
}

/// Here-document body, kept as data
#[derive(Debug, Clone, PartialEq)]
pub struct Heredoc {
    pub body: String,
    /// False when the delimiter was quoted and the body is taken literally
    pub expands: bool,
    /// Command substitutions an expanding body runs, positioned in the file
    pub substitutions: Vec<Substitution>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundKind {
    If,
    For,
    Select,
    While,
    Until,
    Case,
    BraceGroup,
    Subshell,
    Arithmetic,
}

/// Control flow and grouping constructs.
///
/// Conditions and bodies are flattened into `body` in document order;
/// header words (`for x in WORDS`, `case WORD in`, patterns) go in `words`.
#[derive(Debug, Clone, PartialEq)]
pub struct Compound {
    pub kind: CompoundKind,
    pub words: Vec<Word>,
    pub body: Vec<Statement>,
    pub redirects: Vec<Redirect>,
    pub connector: Connector,
    pub position: Position,
}

/// One shell word, split into the pieces it was written with
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub fragments: Vec<Fragment>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// Unquoted literal text, escapes resolved
    Literal(String),
    /// Text from single, double or `$'...'` quotes
    Quoted(String),
    /// `$name`, `${...}` or `$((...))`, exactly as written
    Expansion(String),
    /// `$(...)`, backticks, `<(...)` or `>(...)`
    Substitution(Substitution),
}

/// An opaque command substitution span
#[derive(Debug, Clone, PartialEq)]
pub struct Substitution {
    /// Text between the delimiters
    pub body: String,
    /// Where `body` starts in the original text
    pub position: Position,
    pub style: SubstitutionStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstitutionStyle {
    /// `$(...)`
    Dollar,
    /// `` `...` ``
    Backtick,
    /// `<(...)`
    ProcessInput,
    /// `>(...)`
    ProcessOutput,
}

impl Word {
    pub fn literal_at(text: &str, position: Position) -> Self {
        Self {
            fragments: vec![Fragment::Literal(text.to_string())],
            position,
        }
    }

    /// The word's value if it contains no expansions or substitutions
    pub fn literal(&self) -> Option<String> {
        let mut out = String::new();
        for fragment in &self.fragments {
            match fragment {
                Fragment::Literal(s) | Fragment::Quoted(s) => out.push_str(s),
                _ => return None,
            }
        }
        Some(out)
    }

    /// Whether this is exactly the unquoted word `keyword`
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.fragments.as_slice(), [Fragment::Literal(s)] if s == keyword)
    }

    /// Display text with expansions and substitutions left as written
    pub fn text(&self) -> String {
        self.fragments
            .iter()
            .map(|fragment| match fragment {
                Fragment::Literal(s) | Fragment::Quoted(s) | Fragment::Expansion(s) => s.clone(),
                Fragment::Substitution(sub) => match sub.style {
                    SubstitutionStyle::Dollar => format!("$({})", sub.body),
                    SubstitutionStyle::Backtick => format!("`{}`", sub.body),
                    SubstitutionStyle::ProcessInput => format!("<({})", sub.body),
                    SubstitutionStyle::ProcessOutput => format!(">({})", sub.body),
                },
            })
            .collect()
    }

    pub fn substitutions(&self) -> impl Iterator<Item = &Substitution> {
        self.fragments.iter().filter_map(|f| match f {
            Fragment::Substitution(sub) => Some(sub),
            _ => None,
        })
    }

    /// Split `NAME=value` / `NAME+=value` into an assignment.
    ///
    /// Only an unquoted leading `NAME=` counts, so `"a=b"` stays a word.
    pub fn as_assignment(&self) -> Option<Assignment> {
        let Some(Fragment::Literal(head)) = self.fragments.first() else {
            return None;
        };
        let eq = head.find('=')?;
        let (name, append) = match head[..eq].strip_suffix('+') {
            Some(name) => (name, true),
            None => (&head[..eq], false),
        };
        if !is_assignable_name(name) {
            return None;
        }

        let mut fragments = Vec::with_capacity(self.fragments.len());
        let rest = &head[eq + 1..];
        if !rest.is_empty() {
            fragments.push(Fragment::Literal(rest.to_string()));
        }
        fragments.extend(self.fragments[1..].iter().cloned());

        Some(Assignment {
            name: name.to_string(),
            append,
            value: Value::Scalar(Word {
                fragments,
                position: self.position,
            }),
            position: self.position,
        })
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text())
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*` with an optional `[index]` suffix
pub(crate) fn is_assignable_name(name: &str) -> bool {
    let base = match name.find('[') {
        Some(open) if name.ends_with(']') => &name[..open],
        Some(_) => return false,
        None => name,
    };
    let mut chars = base.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignable_names() {
        assert!(is_assignable_name("pkgname"));
        assert!(is_assignable_name("_pkg2"));
        assert!(is_assignable_name("arr[3]"));
        assert!(!is_assignable_name("2pkg"));
        assert!(!is_assignable_name("foo-bar"));
        assert!(!is_assignable_name(""));
        assert!(!is_assignable_name("arr[3"));
    }

    #[test]
    fn test_word_as_assignment() {
        let word = Word {
            fragments: vec![
                Fragment::Literal("CFLAGS+=".to_string()),
                Fragment::Quoted(" -O2".to_string()),
            ],
            position: Position::START,
        };
        let assign = word.as_assignment().unwrap();
        assert_eq!(assign.name, "CFLAGS");
        assert!(assign.append);
        assert_eq!(assign.value.words()[0].literal().as_deref(), Some(" -O2"));

        let quoted = Word {
            fragments: vec![Fragment::Quoted("a=b".to_string())],
            position: Position::START,
        };
        assert!(quoted.as_assignment().is_none());
    }

    #[test]
    fn test_word_text() {
        let word = Word {
            fragments: vec![
                Fragment::Expansion("$pkgdir".to_string()),
                Fragment::Literal("/usr/".to_string()),
                Fragment::Substitution(Substitution {
                    body: "uname -m".to_string(),
                    position: Position::START,
                    style: SubstitutionStyle::Dollar,
                }),
            ],
            position: Position::START,
        };
        assert_eq!(word.text(), "$pkgdir/usr/$(uname -m)");
        assert!(word.literal().is_none());
        assert_eq!(word.substitutions().count(), 1);
    }
}
