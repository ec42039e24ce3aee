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

use std::pin::Pin;

use colored::{Color, Colorize};
use futures::Future;
use thiserror::Error;

pub type CheckFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// Palette shared by the checklist and the report, tuned for dark and light terminals.
pub const GREEN_COLOR: Color = Color::TrueColor {
    r: 22,
    g: 209,
    b: 142,
};
pub const WHITE_COLOR: Color = Color::TrueColor {
    r: 255,
    g: 255,
    b: 255,
};
pub const RED_COLOR: Color = Color::TrueColor {
    r: 230,
    g: 0,
    b: 34,
};

/// Returned by [`run_checklist`] when at least one check failed.
#[derive(Debug, Error)]
#[error("checklist failed: {}", failed_checks.join(", "))]
pub struct ChecklistError {
    pub failed_checks: Vec<&'static str>,
}

pub fn print_checklist(check_list_results: &[(&'static str, anyhow::Result<()>)]) {
    eprintln!(
        "\n{}\n{}",
        "---------------------------------------------------".color(GREEN_COLOR),
        " Checklist ".color(WHITE_COLOR).on_color(GREEN_COLOR)
    );
    let mut errors = Vec::new();
    for (check_item_name, check_item_result) in check_list_results {
        let outcome_symbol = if check_item_result.is_ok() {
            "✔".color(GREEN_COLOR)
        } else {
            "✖".color(RED_COLOR)
        };
        eprintln!(" {outcome_symbol} {check_item_name}");
        if let Err(check_item_err) = check_item_result {
            errors.push((check_item_name, check_item_err));
        }
    }
    if errors.is_empty() {
        eprintln!();
        return;
    }
    eprintln!(
        "{}\n{}",
        "---------------------------------------------------".color(RED_COLOR),
        " Error Details ".color(WHITE_COLOR).on_color(RED_COLOR)
    );
    for (check_item_name, check_item_err) in errors {
        eprintln!(
            "\n{}\n{:?}",
            format!(" ✖ {check_item_name}").color(RED_COLOR),
            check_item_err
        );
    }
    eprintln!("\n");
}

async fn compute_checklist(
    checks: Vec<(&'static str, CheckFuture<'_>)>,
) -> Vec<(&'static str, anyhow::Result<()>)> {
    let mut check_named_results = Vec::with_capacity(checks.len());
    // Checks run one after the other so their side effects never interleave.
    for (check_item_name, check_item) in checks {
        check_named_results.push((check_item_name, check_item.await));
    }
    check_named_results
}

/// Runs a checklist and prints out its successes and failures on stderr.
///
/// Every check is evaluated, even after a failure, so the report is complete.
pub async fn run_checklist(
    checks: Vec<(&'static str, CheckFuture<'_>)>,
) -> Result<(), ChecklistError> {
    let checklist = compute_checklist(checks).await;
    print_checklist(&checklist);
    let failed_checks: Vec<&'static str> = checklist
        .iter()
        .filter(|(_, check_item_result)| check_item_result.is_err())
        .map(|(check_item_name, _)| *check_item_name)
        .collect();
    if failed_checks.is_empty() {
        Ok(())
    } else {
        Err(ChecklistError { failed_checks })
    }
}
