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

//! Readers for pacman's text formats.
//!
//! Provides:
//! - pacman.conf parsing with ordered, repeatable directives
//! - Field extraction from `pacman -Qi` / `-Si` output
//!
//! Both work on text handed in by the caller; nothing here touches the
//! filesystem or runs pacman.

pub mod conf;
pub mod query;

pub use conf::{ConfError, Directives, PacmanConf, Section};
pub use query::{extract_dependencies, extract_field, extract_field_folded, extract_version};
