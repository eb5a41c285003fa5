// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("Failed to read data as config: {source}"), context(false))]
    BuildConfig { source: config::ConfigError },

    #[snafu(display("`{input}` is not a valid resource type: {source}"))]
    InvalidResourceType {
        input: String,
        source: gatekeeper_types::InvalidResourceType,
    },

    #[snafu(display(
        "Repository kind `dual` requires both `repository.dual_primary` and `repository.dual_previous`"
    ))]
    IncompleteDualRepository,
}
