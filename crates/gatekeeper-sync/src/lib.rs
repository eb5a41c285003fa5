// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! The user-roles syncer: a single-instance periodic task that re-resolves
//! every known user and persists the result.
//!
//! Fleet-wide single-instance execution is coordinated through a named
//! distributed lock; a tick that cannot acquire it exits cleanly and the
//! next scheduler fire retries. Within a tick, transient resolution failures
//! are retried on a fixed interval bounded by the tick's wall-clock budget.

mod lock;
mod syncer;

pub use lock::{LocalLockManager, LockError, LockManager, RedisLockManager, SyncLockGuard};
pub use syncer::UserRolesSyncer;

use std::time::Duration;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SyncError {
    #[snafu(display("failed to operate the sync lock: {source}"))]
    Lock { source: LockError },

    #[snafu(display("resolution failed: {source}"))]
    Resolution {
        source: gatekeeper_resolver::PermissionResolutionError,
    },

    #[snafu(display("repository failed: {source}"))]
    Repository {
        source: gatekeeper_permissions::PermissionRepositoryError,
    },

    #[snafu(display("sync tick exceeded its budget of {budget:?}"))]
    TickTimeout { budget: Duration },
}
