// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use gatekeeper_types::{InvalidPrefix, ResourceType};
use snafu::Snafu;

/// A resource or role loader failed to talk to its system-of-record.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LoaderError {
    #[snafu(display("inventory request failed: {source}"))]
    Http { source: reqwest::Error },

    #[snafu(display("inventory returned an invalid payload: {source}"))]
    InvalidPayload { source: serde_json::Error },

    #[snafu(display("source unavailable: {message}"))]
    Unavailable { message: String },

    #[snafu(display("circuit open, skipping call to source"))]
    CircuitOpen,
}

impl LoaderError {
    /// Whether a bounded retry makes sense for this error.
    ///
    /// Decoding failures are not retried; the payload will not get better.
    pub fn is_transient(&self) -> bool {
        match self {
            LoaderError::Http { .. } | LoaderError::Unavailable { .. } => true,
            LoaderError::InvalidPayload { .. } | LoaderError::CircuitOpen => false,
        }
    }
}

/// A provider could not produce a resource set.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderError {
    #[snafu(display("no {resource_type} snapshot loaded yet: {source}"))]
    NoSnapshot {
        resource_type: ResourceType,
        source: LoaderError,
    },

    #[snafu(display("roles could not be loaded: {source}"))]
    Roles { source: LoaderError },

    #[snafu(display("invalid prefix entry: {source}"))]
    Prefix { source: InvalidPrefix },
}
