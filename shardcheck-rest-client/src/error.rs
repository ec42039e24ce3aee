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

use reqwest::StatusCode;
use serde::Deserialize;
use shardcheck_common::retry::Retryable;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Error returned by the search engine.
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    // Error returned by reqwest lib.
    #[error("client error: {0:?}")]
    Client(#[from] reqwest::Error),
    // Internal error returned by the client lib.
    #[error("internal client error: {0}")]
    Internal(String),
    // Error returned by serde_json when (de)serializing a payload.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    // Error returned by url lib when parsing a string.
    #[error("URL parsing error: {0}")]
    UrlParse(String),
}

impl Error {
    pub fn status_code(&self) -> Option<StatusCode> {
        match &self {
            Self::Api(error) => Some(error.code),
            Self::Client(error) => error.status(),
            Self::Internal(_) => Some(StatusCode::INTERNAL_SERVER_ERROR),
            Self::Json(_) => Some(StatusCode::INTERNAL_SERVER_ERROR),
            Self::UrlParse(_) => Some(StatusCode::BAD_REQUEST),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(StatusCode::NOT_FOUND)
    }
}

impl Retryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Api(error) => {
                error.code == StatusCode::TOO_MANY_REQUESTS || error.code.is_server_error()
            }
            Self::Client(error) => error.is_connect() || error.is_timeout(),
            Self::Internal(_) | Self::Json(_) | Self::UrlParse(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub struct ApiError {
    pub message: Option<String>,
    pub code: StatusCode,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if let Some(error) = &self.message {
            write!(f, "(code={}, message={})", self.code, error)
        } else {
            write!(f, "(code={})", self.code)
        }
    }
}

/// Error payload returned by the engine, either `{"error": "reason"}` or
/// `{"error": {"type": "...", "reason": "..."}}`.
#[derive(Deserialize)]
pub(crate) struct ErrorResponsePayload {
    error: ErrorCause,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorCause {
    Reason(String),
    Detailed {
        #[serde(rename = "type")]
        error_type: Option<String>,
        reason: Option<String>,
    },
}

impl ErrorResponsePayload {
    pub(crate) fn into_message(self) -> Option<String> {
        match self.error {
            ErrorCause::Reason(reason) => Some(reason),
            ErrorCause::Detailed {
                error_type: Some(error_type),
                reason: Some(reason),
            } => Some(format!("{error_type}: {reason}")),
            ErrorCause::Detailed {
                error_type,
                reason,
            } => reason.or(error_type),
        }
    }
}
