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

//! Recursive-descent parser turning PKGBUILD tokens into a [`Recipe`].
//!
//! Every structural problem is fatal: callers get either a complete tree or
//! a [`ParseError`], never something in between.

use tracing::{debug, trace};

use super::ast::{
    Assignment, Command, Compound, CompoundKind, Connector, Function, Position, Recipe, Redirect,
    Statement, Value, Word,
};
use super::lexer::{Lexer, Token, TokenKind};
use super::MAX_NESTING;
use super::ParseError;

/// Words that close a construct and may not start a command
const CLOSERS: &[&str] = &["}", "fi", "done", "esac", "then", "do", "elif", "else"];

/// What stops a statement list
#[derive(Clone, Copy)]
struct Until<'a> {
    keywords: &'a [&'a str],
    close_paren: bool,
    case_item: bool,
    /// Description and start of the enclosing construct, for EOF errors
    open: Option<(&'a str, Position)>,
}

impl<'a> Until<'a> {
    fn eof() -> Self {
        Self {
            keywords: &[],
            close_paren: false,
            case_item: false,
            open: None,
        }
    }

    fn keywords(keywords: &'a [&'a str], what: &'a str, at: Position) -> Self {
        Self {
            keywords,
            close_paren: false,
            case_item: false,
            open: Some((what, at)),
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    current: usize,
    /// Commands currently open, counting any enclosing document
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, depth: usize) -> Self {
        Self {
            tokens,
            current: 0,
            depth,
        }
    }

    fn peek(&self) -> &Token {
        // The lexer always ends the stream with Eof
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_kind_at(&self, n: usize) -> Option<&TokenKind> {
        self.tokens.get(self.current + n).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.current < self.tokens.len() - 1 {
            self.current += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek_kind(), TokenKind::Word(w) if w.is_keyword(keyword))
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek_kind(), TokenKind::Newline) {
            self.advance();
        }
    }

    fn skip_separators(&mut self) {
        while matches!(
            self.peek_kind(),
            TokenKind::Newline | TokenKind::Semi | TokenKind::Amp
        ) {
            self.advance();
        }
    }

    fn unexpected(&self) -> ParseError {
        let token = self.peek();
        ParseError::new(
            format!("unexpected {}", token.kind.describe()),
            token.position,
        )
    }

    fn unterminated(&self, what: &str, opened: Position) -> ParseError {
        ParseError::new(
            format!("unterminated {} (opened at {})", what, opened),
            self.peek().position,
        )
    }

    fn expect_keyword(&mut self, keyword: &str, what: &str, opened: Position) -> Result<(), ParseError> {
        if self.peek_keyword(keyword) {
            self.advance();
            return Ok(());
        }
        match self.peek_kind() {
            TokenKind::Eof => Err(self.unterminated(what, opened)),
            other => Err(ParseError::new(
                format!("expected `{}` in {}, found {}", keyword, what, other.describe()),
                self.peek().position,
            )),
        }
    }

    fn expect_rparen(&mut self, what: &str, opened: Position) -> Result<(), ParseError> {
        match self.peek_kind() {
            TokenKind::RParen => {
                self.advance();
                Ok(())
            }
            TokenKind::Eof => Err(self.unterminated(what, opened)),
            _ => Err(self.unexpected()),
        }
    }

    fn parse_program(&mut self) -> Result<Vec<Statement>, ParseError> {
        self.parse_list(Until::eof())
    }

    /// Statements up to (not including) the terminator described by `until`
    fn parse_list(&mut self, until: Until<'_>) -> Result<Vec<Statement>, ParseError> {
        let mut statements = Vec::new();

        loop {
            self.skip_separators();
            match self.peek_kind() {
                TokenKind::Eof => {
                    return match until.open {
                        Some((what, at)) => Err(self.unterminated(what, at)),
                        None => Ok(statements),
                    };
                }
                TokenKind::RParen if until.close_paren => return Ok(statements),
                TokenKind::DoubleSemi if until.case_item => return Ok(statements),
                TokenKind::Word(w) if until.keywords.iter().any(|k| w.is_keyword(k)) => {
                    return Ok(statements)
                }
                _ => {}
            }
            self.parse_and_or(&mut statements)?;
        }
    }

    /// A pipeline chain joined by `|`, `&&` and `||`
    fn parse_and_or(&mut self, out: &mut Vec<Statement>) -> Result<(), ParseError> {
        let mut connector = Connector::Sequence;
        loop {
            // `!` negation does not change what runs
            if self.peek_keyword("!") {
                self.advance();
            }
            self.parse_command(connector, out)?;

            connector = match self.peek_kind() {
                TokenKind::Pipe => Connector::Pipe,
                TokenKind::AndIf => Connector::And,
                TokenKind::OrIf => Connector::Or,
                _ => return Ok(()),
            };
            self.advance();
            self.skip_newlines();
        }
    }

    fn parse_command(&mut self, connector: Connector, out: &mut Vec<Statement>) -> Result<(), ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(ParseError::nesting_too_deep(self.peek().position));
        }
        self.depth += 1;
        let result = self.parse_command_at_depth(connector, out);
        self.depth -= 1;
        result
    }

    fn parse_command_at_depth(&mut self, connector: Connector, out: &mut Vec<Statement>) -> Result<(), ParseError> {
        let position = self.peek().position;

        match self.peek_kind().clone() {
            TokenKind::LParen => {
                self.advance();
                let body = self.parse_list(Until {
                    keywords: &[],
                    close_paren: true,
                    case_item: false,
                    open: Some(("subshell", position)),
                })?;
                self.expect_rparen("subshell", position)?;
                out.push(self.compound(CompoundKind::Subshell, Vec::new(), body, connector, position));
            }
            TokenKind::Arith(expr) => {
                self.advance();
                let words = vec![Word::literal_at(&expr, position)];
                out.push(self.compound(CompoundKind::Arithmetic, words, Vec::new(), connector, position));
            }
            TokenKind::Word(word) => {
                let keyword = word.literal().filter(|_| word.fragments.len() == 1);
                match keyword.as_deref() {
                    Some("{") if word.is_keyword("{") => {
                        self.advance();
                        let body = self.parse_list(Until::keywords(&["}"], "brace group", position))?;
                        self.expect_keyword("}", "brace group", position)?;
                        out.push(self.compound(CompoundKind::BraceGroup, Vec::new(), body, connector, position));
                    }
                    Some("if") if word.is_keyword("if") => {
                        let body = self.parse_if(position)?;
                        out.push(self.compound(CompoundKind::If, Vec::new(), body, connector, position));
                    }
                    Some(kw @ ("while" | "until")) if word.is_keyword(kw) => {
                        let kind = if kw == "while" {
                            CompoundKind::While
                        } else {
                            CompoundKind::Until
                        };
                        self.advance();
                        let what = format!("`{}` loop", kw);
                        let mut body = self.parse_list(Until::keywords(&["do"], &what, position))?;
                        self.expect_keyword("do", &what, position)?;
                        body.extend(self.parse_list(Until::keywords(&["done"], &what, position))?);
                        self.expect_keyword("done", &what, position)?;
                        out.push(self.compound(kind, Vec::new(), body, connector, position));
                    }
                    Some(kw @ ("for" | "select")) if word.is_keyword(kw) => {
                        let kind = if kw == "for" {
                            CompoundKind::For
                        } else {
                            CompoundKind::Select
                        };
                        let (words, body) = self.parse_for(kw, position)?;
                        out.push(self.compound(kind, words, body, connector, position));
                    }
                    Some("case") if word.is_keyword("case") => {
                        let (words, body) = self.parse_case(position)?;
                        out.push(self.compound(CompoundKind::Case, words, body, connector, position));
                    }
                    Some("function") if word.is_keyword("function") => {
                        self.advance();
                        let name = match self.advance().kind {
                            TokenKind::Word(w) => w.text(),
                            TokenKind::Eof => return Err(self.unterminated("function definition", position)),
                            other => {
                                return Err(ParseError::new(
                                    format!("expected a function name, found {}", other.describe()),
                                    position,
                                ))
                            }
                        };
                        if matches!(self.peek_kind(), TokenKind::LParen) {
                            self.advance();
                            self.expect_rparen("function definition", position)?;
                        }
                        out.push(self.parse_function_body(name, position)?);
                    }
                    Some("[[") if word.is_keyword("[[") => {
                        let command = self.parse_conditional(connector, position)?;
                        out.push(Statement::Command(command));
                    }
                    Some(closer) if word.is_keyword(closer) && CLOSERS.contains(&closer) => {
                        return Err(self.unexpected());
                    }
                    _ if self.is_function_definition() => {
                        self.advance();
                        self.advance();
                        self.advance();
                        out.push(self.parse_function_body(word.text(), position)?);
                    }
                    _ => self.parse_simple_command(connector, out)?,
                }
            }
            TokenKind::AssignArray { .. } | TokenKind::Redirect(_) => {
                self.parse_simple_command(connector, out)?
            }
            _ => return Err(self.unexpected()),
        }
        Ok(())
    }

    /// `name ( )` at command position
    fn is_function_definition(&self) -> bool {
        matches!(self.peek_kind_at(1), Some(TokenKind::LParen))
            && matches!(self.peek_kind_at(2), Some(TokenKind::RParen))
    }

    fn compound(
        &mut self,
        kind: CompoundKind,
        words: Vec<Word>,
        body: Vec<Statement>,
        connector: Connector,
        position: Position,
    ) -> Statement {
        let redirects = self.parse_trailing_redirects();
        Statement::Compound(Compound {
            kind,
            words,
            body,
            redirects,
            connector,
            position,
        })
    }

    fn parse_trailing_redirects(&mut self) -> Vec<Redirect> {
        let mut redirects = Vec::new();
        while let TokenKind::Redirect(r) = self.peek_kind() {
            redirects.push(r.clone());
            self.advance();
        }
        redirects
    }

    fn parse_function_body(&mut self, name: String, position: Position) -> Result<Statement, ParseError> {
        self.skip_newlines();
        let what = format!("function body `{}`", name);
        let body_start = self.peek().position;

        let body = match self.peek_kind() {
            TokenKind::Word(w) if w.is_keyword("{") => {
                self.advance();
                let body = self.parse_list(Until::keywords(&["}"], &what, body_start))?;
                self.expect_keyword("}", &what, body_start)?;
                body
            }
            TokenKind::LParen => {
                self.advance();
                let body = self.parse_list(Until {
                    keywords: &[],
                    close_paren: true,
                    case_item: false,
                    open: Some((what.as_str(), body_start)),
                })?;
                self.expect_rparen(&what, body_start)?;
                body
            }
            TokenKind::Eof => return Err(self.unterminated(&what, position)),
            other => {
                return Err(ParseError::new(
                    format!("expected `{{` to open {}, found {}", what, other.describe()),
                    body_start,
                ))
            }
        };
        // Redirections on a definition apply on every call; they carry no invocations of their own
        self.parse_trailing_redirects();

        trace!(function = %name, statements = body.len(), "parsed function");
        Ok(Statement::Function(Function {
            name,
            body,
            position,
        }))
    }

    fn parse_if(&mut self, position: Position) -> Result<Vec<Statement>, ParseError> {
        const BRANCH_END: &[&str] = &["elif", "else", "fi"];
        self.advance();

        let mut body = self.parse_list(Until::keywords(&["then"], "`if` statement", position))?;
        self.expect_keyword("then", "`if` statement", position)?;
        body.extend(self.parse_list(Until::keywords(BRANCH_END, "`if` statement", position))?);

        loop {
            if self.peek_keyword("elif") {
                self.advance();
                body.extend(self.parse_list(Until::keywords(&["then"], "`if` statement", position))?);
                self.expect_keyword("then", "`if` statement", position)?;
                body.extend(self.parse_list(Until::keywords(BRANCH_END, "`if` statement", position))?);
            } else if self.peek_keyword("else") {
                self.advance();
                body.extend(self.parse_list(Until::keywords(&["fi"], "`if` statement", position))?);
            } else {
                self.expect_keyword("fi", "`if` statement", position)?;
                return Ok(body);
            }
        }
    }

    fn parse_for(&mut self, keyword: &str, position: Position) -> Result<(Vec<Word>, Vec<Statement>), ParseError> {
        let what = format!("`{}` loop", keyword);
        self.advance();

        let mut words = Vec::new();
        match self.advance().kind {
            TokenKind::Word(name) => {
                words.push(name);
                self.skip_newlines();
                if self.peek_keyword("in") {
                    self.advance();
                    while let TokenKind::Word(w) = self.peek_kind() {
                        words.push(w.clone());
                        self.advance();
                    }
                }
            }
            TokenKind::Arith(expr) => words.push(Word::literal_at(&expr, position)),
            TokenKind::Eof => return Err(self.unterminated(&what, position)),
            other => {
                return Err(ParseError::new(
                    format!("expected a loop variable, found {}", other.describe()),
                    position,
                ))
            }
        }

        self.skip_separators();
        self.expect_keyword("do", &what, position)?;
        let body = self.parse_list(Until::keywords(&["done"], &what, position))?;
        self.expect_keyword("done", &what, position)?;
        Ok((words, body))
    }

    fn parse_case(&mut self, position: Position) -> Result<(Vec<Word>, Vec<Statement>), ParseError> {
        const WHAT: &str = "`case` statement";
        self.advance();

        let mut words = match self.advance().kind {
            TokenKind::Word(subject) => vec![subject],
            TokenKind::Eof => return Err(self.unterminated(WHAT, position)),
            other => {
                return Err(ParseError::new(
                    format!("expected a word after `case`, found {}", other.describe()),
                    position,
                ))
            }
        };
        self.skip_newlines();
        self.expect_keyword("in", WHAT, position)?;

        let mut body = Vec::new();
        loop {
            self.skip_separators();
            if self.peek_keyword("esac") {
                self.advance();
                return Ok((words, body));
            }

            if matches!(self.peek_kind(), TokenKind::LParen) {
                self.advance();
            }
            loop {
                match self.advance().kind {
                    TokenKind::Word(pattern) => words.push(pattern),
                    TokenKind::Eof => return Err(self.unterminated(WHAT, position)),
                    other => {
                        return Err(ParseError::new(
                            format!("expected a case pattern, found {}", other.describe()),
                            position,
                        ))
                    }
                }
                match self.advance().kind {
                    TokenKind::Pipe => continue,
                    TokenKind::RParen => break,
                    TokenKind::Eof => return Err(self.unterminated(WHAT, position)),
                    other => {
                        return Err(ParseError::new(
                            format!("expected `)` after case pattern, found {}", other.describe()),
                            position,
                        ))
                    }
                }
            }

            body.extend(self.parse_list(Until {
                keywords: &["esac"],
                close_paren: false,
                case_item: true,
                open: Some((WHAT, position)),
            })?);
            if matches!(self.peek_kind(), TokenKind::DoubleSemi) {
                self.advance();
            }
        }
    }

    /// `[[ ... ]]`, kept as a command named `[[` whose operators are plain words
    fn parse_conditional(&mut self, connector: Connector, position: Position) -> Result<Command, ParseError> {
        let TokenKind::Word(name) = self.advance().kind else {
            return Err(self.unexpected());
        };

        let mut args = Vec::new();
        // Regex groups after `=~` may hold `|`, `&` and `;`
        let mut groups = 0usize;
        loop {
            let token = self.advance();
            let at = token.position;
            let literal = |text: &str| Word::literal_at(text, at);
            match token.kind {
                TokenKind::Word(w) => {
                    let done = w.is_keyword("]]");
                    args.push(w);
                    if done {
                        break;
                    }
                }
                TokenKind::AndIf => args.push(literal("&&")),
                TokenKind::OrIf => args.push(literal("||")),
                TokenKind::LParen => {
                    groups += 1;
                    args.push(literal("("));
                }
                TokenKind::RParen => {
                    groups = groups.saturating_sub(1);
                    args.push(literal(")"));
                }
                TokenKind::Arith(expr) => args.push(literal(&format!("(({}))", expr))),
                TokenKind::Pipe if groups > 0 => args.push(literal("|")),
                TokenKind::Amp if groups > 0 => args.push(literal("&")),
                TokenKind::Semi if groups > 0 => args.push(literal(";")),
                TokenKind::Redirect(r) => {
                    args.push(literal(&r.op));
                    args.push(r.target);
                }
                TokenKind::Newline => {}
                TokenKind::Eof => return Err(self.unterminated("`[[` conditional", position)),
                other => {
                    return Err(ParseError::new(
                        format!("unexpected {} in `[[` conditional", other.describe()),
                        token.position,
                    ))
                }
            }
        }

        Ok(Command {
            name,
            args,
            env: Vec::new(),
            redirects: self.parse_trailing_redirects(),
            connector,
            position,
        })
    }

    fn parse_array(&mut self, name: String, append: bool, position: Position) -> Result<Assignment, ParseError> {
        let what = format!("array `{}`", name);
        let mut elements = Vec::new();
        loop {
            match self.advance().kind {
                TokenKind::Word(w) => elements.push(w),
                TokenKind::Newline => {}
                TokenKind::RParen => break,
                TokenKind::Eof => return Err(self.unterminated(&what, position)),
                other => {
                    return Err(ParseError::new(
                        format!("unexpected {} in {}", other.describe(), what),
                        position,
                    ))
                }
            }
        }
        Ok(Assignment {
            name,
            append,
            value: Value::Array(elements),
            position,
        })
    }

    fn parse_simple_command(&mut self, connector: Connector, out: &mut Vec<Statement>) -> Result<(), ParseError> {
        let position = self.peek().position;
        let mut env = Vec::new();
        let mut words: Vec<Word> = Vec::new();
        let mut redirects = Vec::new();

        loop {
            let token_position = self.peek().position;
            match self.peek_kind().clone() {
                TokenKind::Word(w) => {
                    self.advance();
                    match w.as_assignment() {
                        Some(assignment) if words.is_empty() => env.push(assignment),
                        _ => words.push(w),
                    }
                }
                TokenKind::AssignArray { name, append } => {
                    self.advance();
                    let assignment = self.parse_array(name, append, token_position)?;
                    if words.is_empty() {
                        env.push(assignment);
                    } else {
                        // `local -a deps=(...)`: keep the elements as words so
                        // substitutions inside them are still visible
                        words.push(Word::literal_at(
                            &format!("{}{}=", assignment.name, if append { "+" } else { "" }),
                            token_position,
                        ));
                        words.extend(assignment.value.words().iter().cloned());
                    }
                }
                TokenKind::Redirect(r) => {
                    self.advance();
                    redirects.push(r);
                }
                _ => break,
            }
        }

        let mut words = words.into_iter();
        match words.next() {
            Some(name) => out.push(Statement::Command(Command {
                name,
                args: words.collect(),
                env,
                redirects,
                connector,
                position,
            })),
            None if !env.is_empty() => {
                out.extend(env.into_iter().map(Statement::Assignment));
            }
            // A bare redirection such as `> file` truncates and runs nothing
            None if !redirects.is_empty() => {}
            None => return Err(self.unexpected()),
        }
        Ok(())
    }
}

/// Parse shell text that begins at `origin` in some larger document.
///
/// Used for command substitution bodies, which keep their original
/// positions.
pub fn parse_fragment(source: &str, origin: Position) -> Result<Vec<Statement>, ParseError> {
    parse_nested_fragment(source, origin, 0)
}

/// [`parse_fragment`] for text already `depth` commands deep, so the
/// nesting limit covers the whole document
pub fn parse_nested_fragment(source: &str, origin: Position, depth: usize) -> Result<Vec<Statement>, ParseError> {
    let tokens = Lexer::with_origin(source, origin).tokenize()?;
    Parser::new(tokens, depth).parse_program()
}

/// Parse a complete PKGBUILD.
///
/// Invalid UTF-8 is reported at the first offending byte.
pub fn parse_recipe(bytes: &[u8]) -> Result<Recipe, ParseError> {
    let source = std::str::from_utf8(bytes).map_err(|e| {
        let valid = &bytes[..e.valid_up_to()];
        // Only the valid prefix is needed to place the error
        let prefix = String::from_utf8_lossy(valid);
        let line = prefix.matches('\n').count() + 1;
        let column = prefix.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
        ParseError::new(
            "invalid UTF-8",
            Position {
                line,
                column,
                offset: e.valid_up_to(),
            },
        )
    })?;

    let statements = parse_fragment(source, Position::START)?;
    debug!(statements = statements.len(), bytes = bytes.len(), "parsed PKGBUILD");
    Ok(Recipe { statements })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aur::ast::Fragment;
    use pretty_assertions::assert_eq;

    fn parse(src: &str) -> Recipe {
        parse_recipe(src.as_bytes()).unwrap()
    }

    fn command_names(statements: &[Statement]) -> Vec<String> {
        let mut names = Vec::new();
        for s in statements {
            match s {
                Statement::Command(c) => names.push(c.name.text()),
                Statement::Function(f) => names.extend(command_names(&f.body)),
                Statement::Compound(c) => names.extend(command_names(&c.body)),
                Statement::Assignment(_) => {}
            }
        }
        names
    }

    #[test]
    fn test_scalar_and_array_assignments() {
        let recipe = parse(
            "pkgname=foo\npkgver=1.2.3\ndepends=('glibc' \"zlib>=1.2\" # comment\n  openssl)\nmakedepends+=(git)\n",
        );
        let assignments: Vec<_> = recipe.assignments().collect();
        assert_eq!(assignments.len(), 4);
        assert_eq!(assignments[0].name, "pkgname");
        assert_eq!(assignments[0].value.words()[0].literal().as_deref(), Some("foo"));

        let deps: Vec<_> = assignments[2]
            .value
            .words()
            .iter()
            .filter_map(Word::literal)
            .collect();
        assert_eq!(deps, vec!["glibc", "zlib>=1.2", "openssl"]);
        assert!(matches!(assignments[2].value, Value::Array(_)));
        assert!(assignments[3].append);
    }

    #[test]
    fn test_function_forms() {
        let recipe = parse(
            "build() {\n  make\n}\nfunction package {\n  make install\n}\nfunction check() { make test; }\n",
        );
        let names: Vec<_> = recipe.functions().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["build", "package", "check"]);
        assert_eq!(recipe.function("package").unwrap().body.len(), 1);
        assert_eq!(recipe.function("package").unwrap().position.line, 4);
    }

    #[test]
    fn test_braces_in_quotes_and_comments_do_not_nest() {
        let recipe = parse(
            "package() {\n  echo \"}\" '{'\n  # }\n  sed -e 's/{/}/' file\n}\nbuild() { :; }\n",
        );
        assert_eq!(recipe.functions().count(), 2);
        assert_eq!(command_names(&recipe.statements), vec!["echo", "sed", ":"]);
    }

    #[test]
    fn test_unterminated_function_body_is_fatal() {
        let err = parse_recipe(b"pkgname=x\nbuild() {\n  make\n").unwrap_err();
        assert!(err.message.contains("unterminated function body `build`"), "{}", err);
        assert_eq!(err.position.line, 4);
    }

    #[test]
    fn test_pipelines_and_lists() {
        let recipe = parse("curl -s url | sh && echo ok || echo fail; true &\n");
        let connectors: Vec<_> = recipe
            .statements
            .iter()
            .map(|s| match s {
                Statement::Command(c) => c.connector,
                _ => panic!("expected command"),
            })
            .collect();
        assert_eq!(
            connectors,
            vec![
                Connector::Sequence,
                Connector::Pipe,
                Connector::And,
                Connector::Or,
                Connector::Sequence,
            ]
        );
    }

    #[test]
    fn test_env_prefix_and_redirects() {
        let recipe = parse("CFLAGS=-O2 LDFLAGS= make -C src > build.log 2>&1\n");
        let Statement::Command(cmd) = &recipe.statements[0] else {
            panic!("expected command");
        };
        assert_eq!(cmd.name.text(), "make");
        assert_eq!(cmd.env.len(), 2);
        assert_eq!(cmd.env[0].name, "CFLAGS");
        assert_eq!(cmd.redirects.len(), 2);
        assert_eq!(cmd.args.iter().map(Word::text).collect::<Vec<_>>(), vec!["-C", "src"]);
    }

    #[test]
    fn test_compound_statements_flatten_in_order() {
        let src = r#"
package() {
  if [[ -d "$srcdir" && -n $x ]]; then
    a
  elif b; then
    c
  else
    d
  fi
  for f in *.so $(ls lib); do e "$f"; done
  while read -r line; do f; done < list
  case "$CARCH" in
    x86_64|aarch64) g ;;
    *) h ;;
  esac
  { i; } > log
  ( j )
  (( n++ ))
}
"#;
        let recipe = parse(src);
        assert_eq!(
            command_names(&recipe.statements),
            vec!["[[", "a", "b", "c", "d", "e", "read", "f", "g", "h", "i", "j"]
        );

        let body = &recipe.function("package").unwrap().body;
        let Statement::Compound(for_loop) = &body[1] else {
            panic!("expected for loop");
        };
        assert_eq!(for_loop.kind, CompoundKind::For);
        assert_eq!(for_loop.words.len(), 3);
        assert!(matches!(for_loop.words[2].fragments[0], Fragment::Substitution(_)));

        let Statement::Compound(case) = &body[3] else {
            panic!("expected case");
        };
        assert_eq!(case.words.iter().map(Word::text).collect::<Vec<_>>(), vec!["$CARCH", "x86_64", "aarch64", "*"]);
    }

    #[test]
    fn test_heredoc_is_not_parsed() {
        let recipe = parse("package() {\n  cat > x <<EOF\nrm -rf / }\nEOF\n  true\n}\n");
        assert_eq!(command_names(&recipe.statements), vec!["cat", "true"]);

        let Statement::Function(f) = &recipe.statements[0] else {
            panic!("expected function");
        };
        let Statement::Command(cat) = &f.body[0] else {
            panic!("expected command");
        };
        let heredoc = cat.redirects.iter().find_map(|r| r.heredoc.as_ref()).unwrap();
        assert_eq!(heredoc.body, "rm -rf / }\n");
        assert!(heredoc.expands);
    }

    #[test]
    fn test_regex_conditional_with_alternation() {
        let recipe = parse("if [[ $CARCH =~ ^(x86_64|i686)$ ]] && [[ $x =~ (a;b|c&d) ]]; then echo ok; fi\n");
        let Statement::Compound(c) = &recipe.statements[0] else {
            panic!("expected if");
        };
        let Statement::Command(test) = &c.body[0] else {
            panic!("expected [[");
        };
        assert_eq!(
            std::iter::once(&test.name)
                .chain(&test.args)
                .map(Word::text)
                .collect::<Vec<_>>(),
            vec!["[[", "$CARCH", "=~", "^", "(", "x86_64", "|", "i686", ")", "$", "]]"]
        );
        assert_eq!(command_names(&c.body), vec!["[[", "[[", "echo"]);

        assert!(parse_recipe(b"[[ a | b ]]\n").is_err());
    }

    #[test]
    fn test_process_substitution_loop() {
        let recipe = parse("while read -r f; do\n  strip \"$f\"\ndone < <(find . -name '*.so')\n");
        let Statement::Compound(c) = &recipe.statements[0] else {
            panic!("expected while");
        };
        assert_eq!(c.redirects[0].op, "<");
        assert_eq!(c.redirects[0].target.text(), "<(find . -name '*.so')");
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}:{}\n", "{ ".repeat(1000), " }".repeat(1000));
        let err = parse_recipe(deep.as_bytes()).unwrap_err();
        assert!(err.is_nesting_limit());

        let shallow = format!("{}:{}\n", "{ ".repeat(40), "; }".repeat(40));
        assert!(parse_recipe(shallow.as_bytes()).is_ok());

        let err = parse_nested_fragment("{ :; }", Position::START, MAX_NESTING - 1).unwrap_err();
        assert!(err.is_nesting_limit());
    }

    #[test]
    fn test_structural_errors() {
        for src in [
            "fi\n",
            "if true; then echo\n",
            "for x in a; do echo\n",
            "case x in a) echo ;;\n",
            "depends=(a b\n",
            "echo )\n",
            "{ echo; \n",
            "x() { echo }\n",
            "[[ -f x \n",
            "&& echo\n",
        ] {
            assert!(parse_recipe(src.as_bytes()).is_err(), "{:?} should fail", src);
        }
    }

    #[test]
    fn test_invalid_utf8() {
        let err = parse_recipe(b"pkgname=x\nab\xff\n").unwrap_err();
        assert_eq!(err.position.line, 2);
        assert_eq!(err.position.column, 3);
        assert_eq!(err.position.offset, 12);
    }

    #[test]
    fn test_parse_fragment_keeps_positions() {
        let origin = Position {
            line: 7,
            column: 10,
            offset: 80,
        };
        let statements = parse_fragment("curl x | sh", origin).unwrap();
        assert_eq!(statements[0].position(), origin);
        assert_eq!(statements[1].position().column, 19);
    }

    #[test]
    fn test_local_array_keeps_elements() {
        let recipe = parse("f() { local -a x=(a $(id)); }\n");
        let Statement::Function(f) = &recipe.statements[0] else {
            panic!("expected function");
        };
        let Statement::Command(cmd) = &f.body[0] else {
            panic!("expected command");
        };
        assert_eq!(cmd.name.text(), "local");
        assert_eq!(cmd.args.len(), 4);
    }
}
