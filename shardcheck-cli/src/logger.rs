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

use std::{env, fmt};

use anyhow::Context;
use shardcheck_common::get_from_env_opt;
use time::format_description::BorrowedFormatItem;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::field::RecordFields;
use tracing_subscriber::fmt::format::{
    DefaultFields, Format, FormatEvent, FormatFields, Full, Json, JsonFields, Writer,
};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const LOG_FORMAT_ENV_KEY: &str = "SHARDCHECK_LOG_FORMAT";

/// Installs the global tracing subscriber. Logs are written to stderr, stdout is kept for the
/// report.
pub fn setup_logging_and_tracing(level: Level, ansi_colors: bool) -> anyhow::Result<()> {
    let env_filter = env::var("RUST_LOG")
        .map(|_| EnvFilter::from_default_env())
        .or_else(|_| {
            EnvFilter::try_new(format!(
                "shardcheck={level},shardcheck_cli={level},shardcheck_common={level},\
                 shardcheck_rest_client={level}"
            ))
        })
        .context("failed to set up tracing env filter")?;
    let event_format = EventFormat::get_from_env()?;
    let fmt_fields = event_format.format_fields();

    // The ansi flag must be set on the layer, setting it on the event format is not enough.
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(event_format)
                .fmt_fields(fmt_fields)
                .with_ansi(ansi_colors)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .context("failed to register tracing subscriber")?;
    Ok(())
}

enum EventFormat<'a> {
    Full(Format<Full, UtcTime<Vec<BorrowedFormatItem<'a>>>>),
    Json(Format<Json>),
}

impl EventFormat<'_> {
    /// Returns a JSON formatter if `SHARDCHECK_LOG_FORMAT` is set to `json`, a full formatter
    /// with a millisecond UTC timestamp otherwise.
    fn get_from_env() -> anyhow::Result<Self> {
        if is_json_log_format(get_from_env_opt::<String>(LOG_FORMAT_ENV_KEY).as_deref()) {
            let json_format = tracing_subscriber::fmt::format().json();
            return Ok(EventFormat::Json(json_format));
        }
        let timer_format = time::format_description::parse(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z",
        )
        .context("failed to parse log timestamp format")?;
        let full_format = tracing_subscriber::fmt::format()
            .with_target(true)
            .with_timer(UtcTime::new(timer_format));
        Ok(EventFormat::Full(full_format))
    }

    fn format_fields(&self) -> FieldFormat {
        match self {
            EventFormat::Full(_) => FieldFormat::Default(DefaultFields::new()),
            EventFormat::Json(_) => FieldFormat::Json(JsonFields::new()),
        }
    }
}

fn is_json_log_format(log_format_opt: Option<&str>) -> bool {
    log_format_opt
        .map(|log_format| log_format.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

impl<S, N> FormatEvent<S, N> for EventFormat<'_>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        match self {
            EventFormat::Full(format) => format.format_event(ctx, writer, event),
            EventFormat::Json(format) => format.format_event(ctx, writer, event),
        }
    }
}

enum FieldFormat {
    Default(DefaultFields),
    Json(JsonFields),
}

impl FormatFields<'_> for FieldFormat {
    fn format_fields<R: RecordFields>(&self, writer: Writer<'_>, fields: R) -> fmt::Result {
        match self {
            FieldFormat::Default(default_fields) => default_fields.format_fields(writer, fields),
            FieldFormat::Json(json_fields) => json_fields.format_fields(writer, fields),
        }
    }
}
