// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Storage of resolved [`UserPermission`] records.
//!
//! All backends implement the same [`PermissionsRepository`] contract:
//! idempotent upserts, bulk upserts with orphan pruning, and reads that
//! merge the shared unrestricted record into every non-unrestricted
//! response. Backends: volatile (in-memory), postgres, redis, and a dual
//! wrapper used while migrating between two of them.

mod cache;
mod dual;
mod postgres;
mod redis_storage;
mod repository;
mod timeout;
mod volatile;

pub use cache::UnrestrictedPermissionCache;
pub use dual::DualRepository;
pub use postgres::PostgresRepository;
pub use redis_storage::RedisRepository;
pub use repository::PermissionsRepository;
pub use timeout::TimeoutContext;
pub use volatile::VolatileRepository;

use gatekeeper_types::UserPermission;
use snafu::Snafu;

/// Result type using [`PermissionRepositoryError`] as a default Error
pub type Result<T, E = PermissionRepositoryError> = std::result::Result<T, E>;

/// Backend failure of a permission repository.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PermissionRepositoryError {
    #[snafu(display("database error: {source}"))]
    Database {
        source: gatekeeper_database::DatabaseError,
    },

    #[snafu(display("{message}: {source}"))]
    Redis {
        message: String,
        source: ::redis::RedisError,
    },

    #[snafu(display("failed to serialize resource body: {source}"))]
    Serialize { source: serde_json::Error },

    #[snafu(display("failed to parse stored resource body: {source}"))]
    Body {
        source: gatekeeper_types::BodyParseError,
    },

    #[snafu(display("stored resource type is invalid: {source}"))]
    StoredType {
        source: gatekeeper_types::InvalidResourceType,
    },

    #[snafu(display("read deadline exceeded"))]
    ReadTimeout,
}

impl PermissionRepositoryError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ReadTimeout)
    }
}

/// Merge the unrestricted record into `permission` unless it *is* the
/// unrestricted record.
pub(crate) fn merged_with_unrestricted(
    mut permission: UserPermission,
    unrestricted: Option<&UserPermission>,
) -> UserPermission {
    if !permission.id.is_unrestricted() {
        if let Some(unrestricted) = unrestricted {
            permission.merge(unrestricted);
        }
    }
    permission
}
