// Copyright (C) 2024 Quickwit, Inc.
//
// Quickwit is offered under the AGPL v3.0 and as commercial software.
// For commercial licensing, contact us at hello@quickwit.io.
//
// AGPL:
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

#![deny(clippy::disallowed_methods)]

mod checklist;
pub mod poll;
pub mod retry;

use std::fmt::Debug;
use std::str::FromStr;

pub use checklist::{
    run_checklist, CheckFuture, ChecklistError, GREEN_COLOR, RED_COLOR, WHITE_COLOR,
};
use tracing::{error, info};

pub fn get_from_env<T: FromStr + Debug>(key: &str, default_value: T) -> T {
    if let Some(value) = get_from_env_opt(key) {
        return value;
    }
    info!(value=?default_value, "setting `{}` from default", key);
    default_value
}

pub fn get_from_env_opt<T: FromStr + Debug>(key: &str) -> Option<T> {
    let value_str = std::env::var(key).ok()?;
    match T::from_str(&value_str) {
        Ok(value) => {
            info!(value=?value, "setting `{}` from environment", key);
            Some(value)
        }
        Err(_) => {
            error!(value_str=%value_str, "failed to parse `{}` from environment", key);
            None
        }
    }
}

pub fn get_bool_from_env(key: &str, default_value: bool) -> bool {
    if let Ok(value_str) = std::env::var(key) {
        if let Some(value) = parse_bool_lenient(&value_str) {
            info!(value=%value, "setting `{}` from environment", key);
            return value;
        }
        error!(value_str=%value_str, "failed to parse `{}` from environment", key);
    }
    info!(value=%default_value, "setting `{}` from default", key);
    default_value
}

fn parse_bool_lenient(value_str: &str) -> Option<bool> {
    match value_str.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn truncate_str(text: &str, max_len: usize) -> &str {
    if max_len > text.len() {
        return text;
    }
    let mut truncation_index = max_len;
    while !text.is_char_boundary(truncation_index) {
        truncation_index -= 1;
    }
    &text[..truncation_index]
}
