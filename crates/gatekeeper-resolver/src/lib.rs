// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Permission resolution: joining a user's roles with the resource
//! inventories into a [`gatekeeper_types::UserPermission`].
//!
//! The single-user path filters every provider with the user's groups. The
//! batch path builds a group->resource index over all providers once and
//! assembles each user from it, so a fleet-wide sync costs
//! O(resources + Σ roles) instead of O(users × resources).

mod index;
mod resolver;

pub use index::AccessControlIndex;
pub use resolver::{BatchResolution, PermissionsResolver, ResolverConfig};

use gatekeeper_providers::ProviderError;
use gatekeeper_types::UserId;
use snafu::Snafu;

/// The resolver could not complete for a user (or a whole batch).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PermissionResolutionError {
    #[snafu(display("failed to resolve permissions for `{user}`: {source}"))]
    Resolution { user: UserId, source: ProviderError },

    #[snafu(display("failed to load roles for `{user}`: {source}"))]
    RoleLookup { user: UserId, source: ProviderError },

    #[snafu(display("failed to batch-load roles: {source}"))]
    BatchRoleLookup { source: ProviderError },

    #[snafu(display("failed to load resources for batch resolve: {source}"))]
    BatchResources { source: ProviderError },
}
