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

//! Trust and resolution core for AUR package helpers.
//!
//! - [`deps`]: version ordering and dependency constraints
//! - [`pacman`]: pacman.conf and `pacman -Qi` / `-Si` readers
//! - [`aur`]: PKGBUILD lexer, parser and metadata
//! - [`security`]: blocklist scanning of parsed PKGBUILDs
//!
//! The library works on text and bytes handed in by the caller. It never
//! reads files, runs commands or prompts.

pub mod aur;
pub mod config;
pub mod deps;
pub mod error;
pub mod logging;
pub mod pacman;
pub mod security;

pub use error::{AurguardError, AurguardResult, SecuritySeverity};
