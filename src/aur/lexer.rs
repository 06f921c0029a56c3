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

//! Tokenizer for PKGBUILD shell text.
//!
//! Quoting, escapes, comments and here-document bodies are all resolved
//! here, so the parser only ever sees structure. A brace inside a quoted
//! string or a comment can therefore never open or close a block.

use super::ast::{Fragment, Heredoc, Position, Redirect, Substitution, SubstitutionStyle, Word};
use super::{ParseError, MAX_NESTING};

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Word(Word),
    /// `name=(` or `name+=(`; array elements follow
    AssignArray { name: String, append: bool },
    Newline,
    /// `;`
    Semi,
    /// `;;`, `;&` or `;;&`
    DoubleSemi,
    /// `&`
    Amp,
    /// `&&`
    AndIf,
    /// `||`
    OrIf,
    /// `|` or `|&`
    Pipe,
    LParen,
    RParen,
    Redirect(Redirect),
    /// `(( expr ))` as a command
    Arith(String),
    Eof,
}

impl TokenKind {
    /// Short description for error messages
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Word(w) => format!("`{}`", w.text()),
            TokenKind::AssignArray { name, append } => {
                format!("`{}{}=(`", name, if *append { "+" } else { "" })
            }
            TokenKind::Newline => "newline".to_string(),
            TokenKind::Semi => "`;`".to_string(),
            TokenKind::DoubleSemi => "`;;`".to_string(),
            TokenKind::Amp => "`&`".to_string(),
            TokenKind::AndIf => "`&&`".to_string(),
            TokenKind::OrIf => "`||`".to_string(),
            TokenKind::Pipe => "`|`".to_string(),
            TokenKind::LParen => "`(`".to_string(),
            TokenKind::RParen => "`)`".to_string(),
            TokenKind::Redirect(r) => format!("`{}`", r.op),
            TokenKind::Arith(_) => "`((`".to_string(),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}

/// Here-document waiting for the end of its command line
struct PendingHeredoc {
    token: usize,
    delimiter: String,
    strip_tabs: bool,
    /// Unquoted delimiter
    expands: bool,
    position: Position,
}

/// Accumulates fragments, merging adjacent text of the same kind
#[derive(Default)]
struct WordBuilder {
    fragments: Vec<Fragment>,
}

impl WordBuilder {
    fn literal(&mut self, c: char) {
        match self.fragments.last_mut() {
            Some(Fragment::Literal(s)) => s.push(c),
            _ => self.fragments.push(Fragment::Literal(c.to_string())),
        }
    }

    fn literal_str(&mut self, text: &str) {
        match self.fragments.last_mut() {
            Some(Fragment::Literal(s)) => s.push_str(text),
            _ => self.fragments.push(Fragment::Literal(text.to_string())),
        }
    }

    fn quoted_char(&mut self, c: char) {
        match self.fragments.last_mut() {
            Some(Fragment::Quoted(s)) => s.push(c),
            _ => self.fragments.push(Fragment::Quoted(c.to_string())),
        }
    }

    fn quoted(&mut self, text: String) {
        match self.fragments.last_mut() {
            Some(Fragment::Quoted(s)) => s.push_str(&text),
            _ => self.fragments.push(Fragment::Quoted(text)),
        }
    }

    fn push(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
    }

    /// `name=` / `name+=` written bare, right before a `(`
    fn array_target(&self) -> Option<(String, bool)> {
        let [Fragment::Literal(s)] = self.fragments.as_slice() else {
            return None;
        };
        let head = s.strip_suffix('=')?;
        let (name, append) = match head.strip_suffix('+') {
            Some(name) => (name, true),
            None => (head, false),
        };
        super::ast::is_assignable_name(name).then(|| (name.to_string(), append))
    }

    /// `@(`, `!(`, `+(`, `*(`, `?(` extended glob openers
    fn ends_with_extglob(&self) -> bool {
        matches!(
            self.fragments.last(),
            Some(Fragment::Literal(s)) if s.ends_with(['@', '!', '+', '*', '?'])
        )
    }

    fn finish(self, position: Position) -> Word {
        Word {
            fragments: self.fragments,
            position,
        }
    }
}

/// Follows command boundaries inside a raw `$(...)` span. A `case`
/// pattern ends in a `)` that no `(` opened, so the paren depth of every
/// open `case` is remembered.
struct CaseTracker {
    word: String,
    quoted: bool,
    command_start: bool,
    open: Vec<usize>,
}

impl CaseTracker {
    fn new() -> Self {
        Self {
            word: String::new(),
            quoted: false,
            command_start: true,
            open: Vec::new(),
        }
    }

    fn at_word_start(&self) -> bool {
        self.word.is_empty() && !self.quoted
    }

    fn push(&mut self, c: char) {
        self.word.push(c);
    }

    fn quoted(&mut self) {
        self.quoted = true;
    }

    /// End the current word, read at paren `depth`
    fn end_word(&mut self, depth: usize) {
        if self.at_word_start() {
            return;
        }
        let word = std::mem::take(&mut self.word);
        if std::mem::replace(&mut self.quoted, false) {
            self.command_start = false;
            return;
        }

        if !self.command_start {
            // `case x in` is followed by the first pattern
            self.command_start = word == "in";
            return;
        }
        match word.as_str() {
            "case" => {
                self.open.push(depth);
                self.command_start = false;
            }
            "esac" => {
                self.open.pop();
                self.command_start = false;
            }
            "if" | "then" | "elif" | "else" | "fi" | "while" | "until" | "do" | "done" | "!"
            | "{" | "}" | "time" => {}
            _ => self.command_start = false,
        }
    }

    /// Operator or newline
    fn separator(&mut self, depth: usize) {
        self.end_word(depth);
        self.command_start = true;
    }

    fn closes_pattern(&self, depth: usize) -> bool {
        self.open.last() == Some(&depth)
    }
}

/// Lexer state for one piece of PKGBUILD text
pub struct Lexer {
    chars: Vec<char>,
    current: usize,
    line: usize,
    column: usize,
    offset: usize,
    tokens: Vec<Token>,
    pending_heredocs: Vec<PendingHeredoc>,
    /// Open substitution spans, bounded by `MAX_NESTING`
    nesting: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self::with_origin(source, Position::START)
    }

    /// Lex text that starts at `origin` inside a larger document, so that
    /// reported positions point into the original file
    pub fn with_origin(source: &str, origin: Position) -> Self {
        Self {
            chars: source.chars().collect(),
            current: 0,
            line: origin.line,
            column: origin.column,
            offset: origin.offset,
            tokens: Vec::new(),
            pending_heredocs: Vec::new(),
            nesting: 0,
        }
    }

    /// Tokenize everything. The last token is always `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        loop {
            self.skip_blanks();
            let start = self.position();

            let Some(c) = self.peek() else {
                if let Some(pending) = self.pending_heredocs.first() {
                    return Err(ParseError::new(
                        format!("unterminated here-document (expected `{}`)", pending.delimiter),
                        pending.position,
                    ));
                }
                self.push(TokenKind::Eof, start);
                break;
            };

            match c {
                '\n' => {
                    self.advance();
                    self.push(TokenKind::Newline, start);
                    self.read_heredoc_bodies()?;
                }
                '#' => self.skip_comment(),
                ';' => {
                    self.advance();
                    let kind = if self.match_char(';') {
                        self.match_char('&');
                        TokenKind::DoubleSemi
                    } else if self.match_char('&') {
                        TokenKind::DoubleSemi
                    } else {
                        TokenKind::Semi
                    };
                    self.push(kind, start);
                }
                '&' => {
                    if self.peek_at(1) == Some('>') {
                        self.read_redirect(String::new(), start)?;
                    } else {
                        self.advance();
                        let kind = if self.match_char('&') {
                            TokenKind::AndIf
                        } else {
                            TokenKind::Amp
                        };
                        self.push(kind, start);
                    }
                }
                '|' => {
                    self.advance();
                    let kind = if self.match_char('|') {
                        TokenKind::OrIf
                    } else {
                        self.match_char('&');
                        TokenKind::Pipe
                    };
                    self.push(kind, start);
                }
                '(' if self.peek_at(1) == Some('(') => {
                    self.advance();
                    self.advance();
                    let expr = self.read_arithmetic(start)?;
                    self.push(TokenKind::Arith(expr), start);
                }
                '(' => {
                    self.advance();
                    self.push(TokenKind::LParen, start);
                }
                ')' => {
                    self.advance();
                    self.push(TokenKind::RParen, start);
                }
                '<' | '>' if self.peek_at(1) == Some('(') => {
                    let kind = self.read_word(false)?;
                    self.push(kind, start);
                }
                '<' | '>' => self.read_redirect(String::new(), start)?,
                c if c.is_ascii_digit() && self.fd_redirect_ahead() => {
                    let mut fd = String::new();
                    while let Some(d) = self.peek().filter(char::is_ascii_digit) {
                        self.advance();
                        fd.push(d);
                    }
                    self.read_redirect(fd, start)?;
                }
                _ => {
                    let kind = self.read_word(true)?;
                    self.push(kind, start);
                }
            }
        }

        Ok(self.tokens)
    }

    fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
            offset: self.offset,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.current).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.current + n).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.current += 1;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn push(&mut self, kind: TokenKind, position: Position) {
        self.tokens.push(Token { kind, position });
    }

    /// Spaces, tabs and backslash-newline continuations
    fn skip_blanks(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => {
                    self.advance();
                }
                Some('\\') if self.peek_at(1) == Some('\n') => {
                    self.advance();
                    self.advance();
                }
                _ => break,
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    /// Digits immediately followed by `<` or `>`
    fn fd_redirect_ahead(&self) -> bool {
        let mut i = self.current;
        while self.chars.get(i).is_some_and(char::is_ascii_digit) {
            i += 1;
        }
        matches!(self.chars.get(i), Some('<' | '>'))
    }

    fn read_redirect(&mut self, mut op: String, start: Position) -> Result<(), ParseError> {
        match self.advance() {
            Some('&') => {
                // &> and &>>
                op.push('&');
                op.push('>');
                self.advance();
                if self.match_char('>') {
                    op.push('>');
                }
            }
            Some('<') => {
                op.push('<');
                if self.match_char('<') {
                    op.push('<');
                    if self.match_char('<') {
                        op.push('<');
                    } else if self.match_char('-') {
                        op.push('-');
                    }
                } else if let Some(c @ ('&' | '>')) = self.peek() {
                    self.advance();
                    op.push(c);
                }
            }
            Some(c) => {
                op.push(c);
                if let Some(c @ ('>' | '&' | '|')) = self.peek() {
                    self.advance();
                    op.push(c);
                }
            }
            None => return Err(ParseError::new("expected a redirection operator", start)),
        }

        self.skip_blanks();
        let target_start = self.current;
        let target = match self.read_word(false)? {
            TokenKind::Word(w) if !w.fragments.is_empty() => w,
            _ => {
                return Err(ParseError::new(
                    format!("expected a target after `{}`", op),
                    self.position(),
                ))
            }
        };

        let is_heredoc = op.ends_with("<<") || op.ends_with("<<-");
        if is_heredoc && !op.ends_with("<<<") {
            let delimiter = target.literal().unwrap_or_else(|| target.text());
            let quoted = self.chars[target_start..self.current]
                .iter()
                .any(|c| matches!(c, '\'' | '"' | '\\'));
            self.pending_heredocs.push(PendingHeredoc {
                token: self.tokens.len(),
                delimiter,
                strip_tabs: op.ends_with('-'),
                expands: !quoted,
                position: start,
            });
        }

        self.push(
            TokenKind::Redirect(Redirect {
                op,
                target,
                heredoc: None,
            }),
            start,
        );
        Ok(())
    }

    /// Consume the bodies of every here-document opened on the line just ended
    fn read_heredoc_bodies(&mut self) -> Result<(), ParseError> {
        for pending in std::mem::take(&mut self.pending_heredocs) {
            let mut body = String::new();
            let body_origin = self.position();
            let body_start = self.current;
            let mut body_end;
            loop {
                body_end = self.current;
                if self.peek().is_none() {
                    return Err(ParseError::new(
                        format!("unterminated here-document (expected `{}`)", pending.delimiter),
                        pending.position,
                    ));
                }

                let mut line = String::new();
                while let Some(c) = self.advance() {
                    if c == '\n' {
                        break;
                    }
                    line.push(c);
                }

                let line = if pending.strip_tabs {
                    line.trim_start_matches('\t')
                } else {
                    line.as_str()
                };
                if line.trim_end_matches('\r') == pending.delimiter {
                    break;
                }
                body.push_str(line);
                body.push('\n');
            }

            let substitutions = if pending.expands {
                let raw: String = self.chars[body_start..body_end].iter().collect();
                Lexer::with_origin(&raw, body_origin).heredoc_substitutions()?
            } else {
                Vec::new()
            };

            if let Some(Token {
                kind: TokenKind::Redirect(redirect),
                ..
            }) = self.tokens.get_mut(pending.token)
            {
                redirect.heredoc = Some(Heredoc {
                    body,
                    expands: pending.expands,
                    substitutions,
                });
            }
        }
        Ok(())
    }

    /// Substitutions in an expanding here-document body. Quotes are plain
    /// text there and only a backslash stops `$` or a backtick.
    fn heredoc_substitutions(mut self) -> Result<Vec<Substitution>, ParseError> {
        let mut word = WordBuilder::default();
        while let Some(c) = self.peek() {
            match c {
                '\\' => {
                    self.advance();
                    self.advance();
                }
                '$' if self.peek_at(1) == Some('(') => self.read_dollar(&mut word, true)?,
                '`' => self.read_backtick(&mut word)?,
                _ => {
                    self.advance();
                }
            }
        }

        Ok(word
            .fragments
            .into_iter()
            .filter_map(|fragment| match fragment {
                Fragment::Substitution(sub) => Some(sub),
                _ => None,
            })
            .collect())
    }

    fn read_word(&mut self, allow_array: bool) -> Result<TokenKind, ParseError> {
        let start = self.position();
        let mut word = WordBuilder::default();

        while let Some(c) = self.peek() {
            match c {
                '<' | '>' if self.peek_at(1) == Some('(') => {
                    self.read_process_substitution(&mut word, c)?
                }
                ' ' | '\t' | '\r' | '\n' | ';' | '&' | '|' | '<' | '>' | ')' => break,
                '(' => {
                    if allow_array {
                        if let Some((name, append)) = word.array_target() {
                            self.advance();
                            return Ok(TokenKind::AssignArray { name, append });
                        }
                    }
                    if !word.ends_with_extglob() {
                        break;
                    }
                    self.advance();
                    let pattern = self.read_balanced(start)?;
                    word.literal_str(&format!("({})", pattern));
                }
                '\\' => {
                    self.advance();
                    match self.peek() {
                        Some('\n') => {
                            self.advance();
                        }
                        Some(escaped) => {
                            self.advance();
                            word.literal(escaped);
                        }
                        None => word.literal('\\'),
                    }
                }
                '\'' => {
                    let text = self.read_single_quoted()?;
                    word.quoted(text);
                }
                '"' => self.read_double_quoted(&mut word)?,
                '$' => self.read_dollar(&mut word, false)?,
                '`' => self.read_backtick(&mut word)?,
                _ => {
                    self.advance();
                    word.literal(c);
                }
            }
        }

        Ok(TokenKind::Word(word.finish(start)))
    }

    fn read_single_quoted(&mut self) -> Result<String, ParseError> {
        let start = self.position();
        self.advance();
        let mut text = String::new();
        loop {
            match self.advance() {
                Some('\'') => return Ok(text),
                Some(c) => text.push(c),
                None => return Err(ParseError::new("unterminated single quote", start)),
            }
        }
    }

    fn read_double_quoted(&mut self, word: &mut WordBuilder) -> Result<(), ParseError> {
        let start = self.position();
        self.advance();
        let before = word.fragments.len();

        loop {
            match self.peek() {
                None => return Err(ParseError::new("unterminated double quote", start)),
                Some('"') => {
                    self.advance();
                    if word.fragments.len() == before {
                        // "" is still an (empty) argument
                        word.quoted(String::new());
                    }
                    return Ok(());
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        Some('\n') => {
                            self.advance();
                        }
                        Some(c @ ('$' | '`' | '"' | '\\')) => {
                            self.advance();
                            word.quoted_char(c);
                        }
                        _ => word.quoted_char('\\'),
                    }
                }
                Some('$') => self.read_dollar(word, true)?,
                Some('`') => self.read_backtick(word)?,
                Some(c) => {
                    self.advance();
                    word.quoted_char(c);
                }
            }
        }
    }

    fn read_dollar(&mut self, word: &mut WordBuilder, in_quotes: bool) -> Result<(), ParseError> {
        let start = self.position();
        self.advance();

        match self.peek() {
            Some('\'') if !in_quotes => {
                self.advance();
                let text = self.read_ansi_c(start)?;
                word.quoted(text);
            }
            Some('"') if !in_quotes => self.read_double_quoted(word)?,
            Some('(') => {
                self.advance();
                if self.peek() == Some('(') {
                    let inner = self.read_balanced(start)?;
                    word.push(Fragment::Expansion(format!("$({})", inner)));
                } else {
                    let body_position = self.position();
                    let body = self.read_balanced(start)?;
                    word.push(Fragment::Substitution(Substitution {
                        body,
                        position: body_position,
                        style: SubstitutionStyle::Dollar,
                    }));
                }
            }
            Some('{') => {
                self.advance();
                let inner = self.read_braced(start)?;
                word.push(Fragment::Expansion(format!("${{{}}}", inner)));
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::from("$");
                while let Some(c) = self
                    .peek()
                    .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
                {
                    self.advance();
                    name.push(c);
                }
                word.push(Fragment::Expansion(name));
            }
            Some(c) if c.is_ascii_digit() || "@*#?$!-".contains(c) => {
                self.advance();
                word.push(Fragment::Expansion(format!("${}", c)));
            }
            _ if in_quotes => word.quoted_char('$'),
            _ => word.literal('$'),
        }
        Ok(())
    }

    /// Body of `$'...'` with the common escapes resolved
    fn read_ansi_c(&mut self, start: Position) -> Result<String, ParseError> {
        let mut text = String::new();
        loop {
            match self.advance() {
                None => return Err(ParseError::new("unterminated $'...' string", start)),
                Some('\'') => return Ok(text),
                Some('\\') => match self.advance() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('e' | 'E') => text.push('\u{1b}'),
                    Some(c @ ('\'' | '"' | '\\' | '?')) => text.push(c),
                    Some(c) => {
                        text.push('\\');
                        text.push(c);
                    }
                    None => return Err(ParseError::new("unterminated $'...' string", start)),
                },
                Some(c) => text.push(c),
            }
        }
    }

    fn read_backtick(&mut self, word: &mut WordBuilder) -> Result<(), ParseError> {
        let start = self.position();
        self.advance();
        let body_position = self.position();
        let mut body = String::new();

        loop {
            match self.advance() {
                None => {
                    return Err(ParseError::new(
                        "unterminated backtick substitution",
                        start,
                    ))
                }
                Some('`') => break,
                Some('\\') => match self.peek() {
                    Some(c @ ('`' | '\\' | '$')) => {
                        self.advance();
                        body.push(c);
                    }
                    _ => body.push('\\'),
                },
                Some(c) => body.push(c),
            }
        }

        word.push(Fragment::Substitution(Substitution {
            body,
            position: body_position,
            style: SubstitutionStyle::Backtick,
        }));
        Ok(())
    }

    /// `<(...)` or `>(...)`
    fn read_process_substitution(&mut self, word: &mut WordBuilder, direction: char) -> Result<(), ParseError> {
        let start = self.position();
        self.advance();
        self.advance();
        let body_position = self.position();
        let body = self.read_balanced(start)?;
        word.push(Fragment::Substitution(Substitution {
            body,
            position: body_position,
            style: if direction == '<' {
                SubstitutionStyle::ProcessInput
            } else {
                SubstitutionStyle::ProcessOutput
            },
        }));
        Ok(())
    }

    /// Raw text up to the `)` matching an already consumed `(`
    fn read_balanced(&mut self, open: Position) -> Result<String, ParseError> {
        if self.nesting >= MAX_NESTING {
            return Err(ParseError::nesting_too_deep(open));
        }
        self.nesting += 1;
        let text = self.read_balanced_span(open);
        self.nesting -= 1;
        text
    }

    fn read_balanced_span(&mut self, open: Position) -> Result<String, ParseError> {
        let mut text = String::new();
        let mut depth = 1usize;
        let mut tracker = CaseTracker::new();

        loop {
            let Some(c) = self.advance() else {
                return Err(ParseError::new("unterminated command substitution", open));
            };
            match c {
                '(' => {
                    tracker.separator(depth);
                    depth += 1;
                    if self.nesting + depth > MAX_NESTING + 1 {
                        return Err(ParseError::nesting_too_deep(open));
                    }
                }
                ')' => {
                    tracker.separator(depth);
                    if !tracker.closes_pattern(depth) {
                        depth -= 1;
                        if depth == 0 {
                            return Ok(text);
                        }
                    }
                }
                '\\' => {
                    text.push(c);
                    if let Some(next) = self.advance() {
                        text.push(next);
                    }
                    tracker.quoted();
                    continue;
                }
                '\'' | '"' | '`' => {
                    text.push(c);
                    self.copy_quoted(c, &mut text, open)?;
                    tracker.quoted();
                    continue;
                }
                '#' if tracker.at_word_start() => {
                    text.push(c);
                    while let Some(next) = self.peek().filter(|n| *n != '\n') {
                        self.advance();
                        text.push(next);
                    }
                    continue;
                }
                ';' | '&' | '|' | '\n' => tracker.separator(depth),
                c if c.is_whitespace() => tracker.end_word(depth),
                c => tracker.push(c),
            }
            text.push(c);
        }
    }

    /// Raw text of `${...}` after the opening brace
    fn read_braced(&mut self, open: Position) -> Result<String, ParseError> {
        let mut text = String::new();
        let mut depth = 1usize;

        loop {
            let Some(c) = self.advance() else {
                return Err(ParseError::new("unterminated parameter expansion", open));
            };
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(text);
                    }
                }
                '\\' => {
                    text.push(c);
                    if let Some(next) = self.advance() {
                        text.push(next);
                    }
                    continue;
                }
                '\'' | '"' | '`' => {
                    text.push(c);
                    self.copy_quoted(c, &mut text, open)?;
                    continue;
                }
                '$' if self.peek() == Some('(') => {
                    self.advance();
                    let inner = self.read_balanced(open)?;
                    text.push_str("$(");
                    text.push_str(&inner);
                    text.push(')');
                    continue;
                }
                _ => {}
            }
            text.push(c);
        }
    }

    /// Copy a quoted run verbatim, including its closing quote
    fn copy_quoted(&mut self, quote: char, text: &mut String, open: Position) -> Result<(), ParseError> {
        loop {
            let Some(c) = self.advance() else {
                return Err(ParseError::new("unterminated quote in substitution", open));
            };
            text.push(c);
            match c {
                c if c == quote => return Ok(()),
                '\\' if quote != '\'' => {
                    if let Some(next) = self.advance() {
                        text.push(next);
                    }
                }
                '$' if quote == '"' && self.peek() == Some('(') => {
                    self.advance();
                    let inner = self.read_balanced(open)?;
                    text.push('(');
                    text.push_str(&inner);
                    text.push(')');
                }
                _ => {}
            }
        }
    }

    /// Body of a `((` command up to the matching `))`
    fn read_arithmetic(&mut self, open: Position) -> Result<String, ParseError> {
        let mut text = String::new();
        let mut depth = 0usize;

        loop {
            let Some(c) = self.advance() else {
                return Err(ParseError::new("unterminated arithmetic command", open));
            };
            match c {
                '(' => depth += 1,
                ')' if depth == 0 => {
                    if self.match_char(')') {
                        return Ok(text);
                    }
                    return Err(ParseError::new("unterminated arithmetic command", open));
                }
                ')' => depth -= 1,
                _ => {}
            }
            text.push(c);
        }
    }
}

/// Tokenize a complete document
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    fn words(src: &str) -> Vec<String> {
        tokenize(src)
            .unwrap()
            .into_iter()
            .filter_map(|t| match t.kind {
                TokenKind::Word(w) => Some(w.text()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_simple_command() {
        assert_eq!(words("make -j4 install"), vec!["make", "-j4", "install"]);
        assert_eq!(kinds("").len(), 1);
    }

    #[test]
    fn test_operators() {
        let ks = kinds("a && b || c | d; e & f ;; g |& h");
        let ops: Vec<_> = ks
            .into_iter()
            .filter(|k| !matches!(k, TokenKind::Word(_)))
            .collect();
        assert_eq!(
            ops,
            vec![
                TokenKind::AndIf,
                TokenKind::OrIf,
                TokenKind::Pipe,
                TokenKind::Semi,
                TokenKind::Amp,
                TokenKind::DoubleSemi,
                TokenKind::Pipe,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(words("echo a # } { fi\necho b#c"), vec!["echo", "a", "echo", "b#c"]);
    }

    #[test]
    fn test_quotes_resolve_to_one_word() {
        assert_eq!(words(r#"echo "a b" 'c }' d\ e"#), vec!["echo", "a b", "c }", "d e"]);
    }

    #[test]
    fn test_ansi_c_quote() {
        let toks = tokenize("printf $'a\\tb'").unwrap();
        match &toks[1].kind {
            TokenKind::Word(w) => assert_eq!(w.literal().as_deref(), Some("a\tb")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_expansions_are_opaque() {
        let toks = tokenize(r#"echo ${pkgname%-git} "$srcdir/x" $((1 + 2))"#).unwrap();
        let TokenKind::Word(w) = &toks[1].kind else { panic!() };
        assert_eq!(w.fragments, vec![Fragment::Expansion("${pkgname%-git}".to_string())]);
        let TokenKind::Word(w) = &toks[2].kind else { panic!() };
        assert_eq!(
            w.fragments,
            vec![
                Fragment::Expansion("$srcdir".to_string()),
                Fragment::Quoted("/x".to_string()),
            ]
        );
        let TokenKind::Word(w) = &toks[3].kind else { panic!() };
        assert_eq!(w.fragments, vec![Fragment::Expansion("$((1 + 2))".to_string())]);
    }

    #[test]
    fn test_substitution_position() {
        let toks = tokenize("x\necho $(curl \"a)\" | sh) `id`").unwrap();
        let TokenKind::Word(w) = &toks[3].kind else { panic!() };
        let sub = w.substitutions().next().unwrap();
        assert_eq!(sub.body, "curl \"a)\" | sh");
        assert_eq!(
            sub.position,
            Position {
                line: 2,
                column: 8,
                offset: 9
            }
        );
        let TokenKind::Word(w) = &toks[4].kind else { panic!() };
        let sub = w.substitutions().next().unwrap();
        assert_eq!(sub.style, SubstitutionStyle::Backtick);
        assert_eq!(sub.body, "id");
    }

    #[test]
    fn test_array_assignment_token() {
        let ks = kinds("depends+=('a' b)");
        assert_eq!(
            ks[0],
            TokenKind::AssignArray {
                name: "depends".to_string(),
                append: true
            }
        );
        assert_eq!(ks[3], TokenKind::RParen);
    }

    #[test]
    fn test_line_continuation() {
        assert_eq!(words("./configure \\\n  --prefix=/usr"), vec!["./configure", "--prefix=/usr"]);
    }

    #[test]
    fn test_redirects() {
        let toks = tokenize("cmd 2>&1 >> log &> /dev/null").unwrap();
        let ops: Vec<_> = toks
            .iter()
            .filter_map(|t| match &t.kind {
                TokenKind::Redirect(r) => Some((r.op.clone(), r.target.text())),
                _ => None,
            })
            .collect();
        assert_eq!(
            ops,
            vec![
                ("2>&".to_string(), "1".to_string()),
                (">>".to_string(), "log".to_string()),
                ("&>".to_string(), "/dev/null".to_string()),
            ]
        );
    }

    #[test]
    fn test_heredoc_body_is_data() {
        let src = "cat > f <<-'EOF'\n\techo $(rm -rf /) }\n\tEOF\necho done\n";
        let toks = tokenize(src).unwrap();
        let heredoc = toks
            .iter()
            .find_map(|t| match &t.kind {
                TokenKind::Redirect(r) if r.heredoc.is_some() => r.heredoc.clone(),
                _ => None,
            })
            .unwrap();
        assert_eq!(heredoc.body, "echo $(rm -rf /) }\n");
        assert!(!heredoc.expands);
        assert!(heredoc.substitutions.is_empty());
        assert!(words(src).contains(&"done".to_string()));
    }

    #[test]
    fn test_unquoted_heredoc_substitutions() {
        let src = "cat <<EOF\nline\n  $(curl -s u | sh) `id` \\$(not) \"$HOME\"\nEOF\n";
        let toks = tokenize(src).unwrap();
        let heredoc = toks
            .iter()
            .find_map(|t| match &t.kind {
                TokenKind::Redirect(r) => r.heredoc.clone(),
                _ => None,
            })
            .unwrap();
        assert!(heredoc.expands);
        let bodies: Vec<_> = heredoc.substitutions.iter().map(|s| s.body.as_str()).collect();
        assert_eq!(bodies, vec!["curl -s u | sh", "id"]);
        assert_eq!(
            heredoc.substitutions[0].position,
            Position {
                line: 3,
                column: 5,
                offset: 19
            }
        );
        assert!(tokenize("cat <<EOF\n$(oops\nEOF\n").is_err());
    }

    #[test]
    fn test_process_substitution() {
        let toks = tokenize("done < <(find . -name '*.so')").unwrap();
        let target = toks
            .iter()
            .find_map(|t| match &t.kind {
                TokenKind::Redirect(r) => Some(r.target.clone()),
                _ => None,
            })
            .unwrap();
        let sub = target.substitutions().next().unwrap();
        assert_eq!(sub.style, SubstitutionStyle::ProcessInput);
        assert_eq!(sub.body, "find . -name '*.so'");

        assert_eq!(
            words("diff <(sort a) >(tee log)"),
            vec!["diff", "<(sort a)", ">(tee log)"]
        );
    }

    #[test]
    fn test_case_inside_substitution() {
        assert_eq!(
            words("x=$(case $y in a) echo a;; (b|c) echo b;; esac) z"),
            vec!["x=$(case $y in a) echo a;; (b|c) echo b;; esac)", "z"]
        );
        assert_eq!(
            words("v=$(case \"$1\" in *.tar) echo t ;; esac; case x in y) :;; esac)"),
            vec!["v=$(case \"$1\" in *.tar) echo t ;; esac; case x in y) :;; esac)"]
        );
        // Not at command position, so not a keyword
        assert!(tokenize("x=$(echo case a) b)").is_ok());
        assert_eq!(words("x=$(echo case a) b"), vec!["x=$(echo case a)", "b"]);
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("x={}{}", "$(".repeat(1000), ")".repeat(1000));
        assert!(tokenize(&deep).unwrap_err().is_nesting_limit());

        let quoted = format!("x={}{}", "\"$(".repeat(1000), ")\"".repeat(1000));
        assert!(tokenize(&quoted).unwrap_err().is_nesting_limit());

        let shallow = format!("x={}{}", "$(".repeat(40), ")".repeat(40));
        assert!(tokenize(&shallow).is_ok());
        assert!(!tokenize("echo $(ls").unwrap_err().is_nesting_limit());
    }

    #[test]
    fn test_unterminated_errors() {
        let err = tokenize("echo 'oops").unwrap_err();
        assert_eq!(err.position.line, 1);
        assert_eq!(err.position.column, 6);
        assert!(tokenize("echo \"x").is_err());
        assert!(tokenize("echo $(ls").is_err());
        assert!(tokenize("echo ${x").is_err());
        assert!(tokenize("cat <<EOF\nbody\n").is_err());
        assert!(tokenize("echo `id").is_err());
    }

    #[test]
    fn test_arithmetic_command() {
        assert_eq!(kinds("((i++))")[0], TokenKind::Arith("i++".to_string()));
    }

    #[test]
    fn test_origin_offsets_positions() {
        let origin = Position {
            line: 10,
            column: 5,
            offset: 100,
        };
        let toks = Lexer::with_origin("a\nb", origin).tokenize().unwrap();
        assert_eq!(toks[0].position, origin);
        assert_eq!(
            toks[2].position,
            Position {
                line: 11,
                column: 1,
                offset: 102
            }
        );
    }
}
