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

//! PKGBUILD support module.
//!
//! Provides:
//! - A bash-subset lexer and parser producing a static syntax tree
//! - Metadata extraction (names, versions, dependency arrays)
//!
//! PKGBUILDs are never executed or evaluated here.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod pkgbuild;

use thiserror::Error;

pub use ast::{
    Assignment, Command, Compound, CompoundKind, Connector, Fragment, Function, Heredoc, Position,
    Recipe, Redirect, Statement, Substitution, SubstitutionStyle, Value, Word,
};
pub use parser::{parse_fragment, parse_nested_fragment, parse_recipe};
pub use pkgbuild::{OptionalDependency, Pkgbuild};

/// Deepest nesting of compound commands and substitutions accepted
pub const MAX_NESTING: usize = 64;

const NESTING_TOO_DEEP: &str = "nesting too deep";

/// Fatal PKGBUILD syntax error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at {position} (byte {})", .position.offset)]
pub struct ParseError {
    pub message: String,
    pub position: Position,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: Position) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }

    pub(crate) fn nesting_too_deep(position: Position) -> Self {
        Self::new(NESTING_TOO_DEEP, position)
    }

    /// Whether parsing stopped at [`MAX_NESTING`] rather than on bad syntax
    pub fn is_nesting_limit(&self) -> bool {
        self.message == NESTING_TOO_DEEP
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new(
            "unterminated single quote",
            Position {
                line: 3,
                column: 7,
                offset: 41,
            },
        );
        assert_eq!(
            err.to_string(),
            "unterminated single quote at line 3, column 7 (byte 41)"
        );
    }
}
