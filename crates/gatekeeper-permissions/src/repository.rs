// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::collections::HashMap;

use async_trait::async_trait;
use gatekeeper_types::{GroupName, UserId, UserPermission};

use crate::{Result, TimeoutContext};

/// Stores and retrieves resolved [`UserPermission`] records.
///
/// Contract, independent of backend:
///
/// - [`put`](Self::put) is an idempotent upsert.
/// - [`put_all`](Self::put_all) additionally prunes users absent from the
///   input (except the reserved unrestricted id) and garbage-collects
///   resources no surviving user references.
/// - Reads merge the current unrestricted record into every
///   non-unrestricted response; the unrestricted record itself is returned
///   directly (cache-fronted on remote backends).
/// - [`get_all_by_roles`](Self::get_all_by_roles): `None` means every user,
///   `Some(&[])` only the unrestricted record, otherwise every user whose
///   ROLE-typed resources intersect the given roles, plus the unrestricted
///   record.
#[async_trait]
pub trait PermissionsRepository: Send + Sync {
    async fn put(&self, permission: &UserPermission) -> Result<()>;

    async fn put_all(&self, permissions: HashMap<UserId, UserPermission>) -> Result<()>;

    async fn get(&self, id: &UserId, ctx: &TimeoutContext) -> Result<Option<UserPermission>>;

    async fn get_all_by_id(
        &self,
        ctx: &TimeoutContext,
    ) -> Result<HashMap<UserId, UserPermission>>;

    async fn get_all_by_roles(
        &self,
        roles: Option<&[GroupName]>,
        ctx: &TimeoutContext,
    ) -> Result<HashMap<UserId, UserPermission>>;

    /// Delete the user and their permission rows; shared resources stay
    async fn remove(&self, id: &UserId) -> Result<()>;
}
