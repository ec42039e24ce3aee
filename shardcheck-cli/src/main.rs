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

use colored::Colorize;
use shardcheck_cli::cli::{build_cli, CliCommand};
use shardcheck_cli::logger::setup_logging_and_tracing;
use shardcheck_cli::report::EXIT_CODE_ABORT;
use shardcheck_common::RED_COLOR;
use tracing::error;

fn main() {
    // Requests are awaited one after the other, a single thread is enough.
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(error) => {
            eprintln!("failed to start Tokio runtime: {error:?}");
            std::process::exit(EXIT_CODE_ABORT);
        }
    };
    let return_code = rt.block_on(main_impl());
    std::process::exit(return_code)
}

async fn main_impl() -> i32 {
    let app = build_cli().version(env!("CARGO_PKG_VERSION"));
    let matches = app.get_matches();
    let ansi_colors = !matches.get_flag("no-color");
    if !ansi_colors {
        colored::control::set_override(false);
    }

    let command = match CliCommand::parse_cli_args(matches) {
        Ok(command) => command,
        Err(error) => {
            eprintln!("failed to parse command line arguments: {error:?}");
            return EXIT_CODE_ABORT;
        }
    };

    if let Err(error) = setup_logging_and_tracing(command.default_log_level(), ansi_colors) {
        eprintln!("failed to set up logging: {error:?}");
        return EXIT_CODE_ABORT;
    }

    match command.execute().await {
        Ok(verdict) => verdict.exit_code(),
        Err(command_error) => {
            error!(error=%command_error, "command failed");
            eprintln!(
                "{} command failed: {:?}\n",
                "✘".color(RED_COLOR),
                command_error
            );
            EXIT_CODE_ABORT
        }
    }
}
