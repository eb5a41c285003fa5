// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use gatekeeper_types::{GroupName, UserId, UserPermission};

use crate::{PermissionsRepository, Result, TimeoutContext};

/// Migration aid spanning two repositories.
///
/// Writes go to the primary only; reads prefer the primary and fall back to
/// the previous backend on an empty result (counted, so operators can tell
/// when the migration has drained). Bulk reads union both maps with the
/// primary winning on id collisions. Removals hit both.
pub struct DualRepository {
    primary: Arc<dyn PermissionsRepository>,
    previous: Arc<dyn PermissionsRepository>,
    previous_hits: AtomicU64,
}

impl std::fmt::Debug for DualRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualRepository")
            .field("previous_hits", &self.previous_hits.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl DualRepository {
    pub fn new(
        primary: Arc<dyn PermissionsRepository>,
        previous: Arc<dyn PermissionsRepository>,
    ) -> Self {
        Self {
            primary,
            previous,
            previous_hits: AtomicU64::new(0),
        }
    }

    /// How many reads had to fall back to the previous backend
    pub fn previous_hits(&self) -> u64 {
        self.previous_hits.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PermissionsRepository for DualRepository {
    async fn put(&self, permission: &UserPermission) -> Result<()> {
        self.primary.put(permission).await
    }

    async fn put_all(&self, permissions: HashMap<UserId, UserPermission>) -> Result<()> {
        self.primary.put_all(permissions).await
    }

    async fn get(&self, id: &UserId, ctx: &TimeoutContext) -> Result<Option<UserPermission>> {
        if let Some(permission) = self.primary.get(id, ctx).await? {
            return Ok(Some(permission));
        }

        let fallback = self.previous.get(id, ctx).await?;
        if fallback.is_some() {
            let hits = self.previous_hits.fetch_add(1, Ordering::Relaxed) + 1;
            log::debug!("read for `{id}` served by the previous repository (hit #{hits})");
        }

        Ok(fallback)
    }

    async fn get_all_by_id(
        &self,
        ctx: &TimeoutContext,
    ) -> Result<HashMap<UserId, UserPermission>> {
        let mut result = self.previous.get_all_by_id(ctx).await?;
        result.extend(self.primary.get_all_by_id(ctx).await?);
        Ok(result)
    }

    async fn get_all_by_roles(
        &self,
        roles: Option<&[GroupName]>,
        ctx: &TimeoutContext,
    ) -> Result<HashMap<UserId, UserPermission>> {
        let mut result = self.previous.get_all_by_roles(roles, ctx).await?;
        result.extend(self.primary.get_all_by_roles(roles, ctx).await?);
        Ok(result)
    }

    async fn remove(&self, id: &UserId) -> Result<()> {
        self.primary.remove(id).await?;
        self.previous.remove(id).await
    }
}

#[cfg(test)]
mod tests {
    use gatekeeper_types::{Resource, Role};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::VolatileRepository;

    fn ctx() -> TimeoutContext {
        TimeoutContext::unbounded()
    }

    fn user(id: &str, role: &str) -> UserPermission {
        let mut permission = UserPermission::new(UserId::from(id));
        permission.add_resource(Resource::Role(Role::new(role)));
        permission
    }

    async fn dual_with_previous_user() -> DualRepository {
        let primary = Arc::new(VolatileRepository::new());
        let previous = Arc::new(VolatileRepository::new());
        let dual = DualRepository::new(primary, previous.clone());

        previous.put(&user("legacy", "ops")).await.unwrap();
        dual
    }

    #[tokio::test]
    async fn writes_go_to_the_primary_only() {
        let primary = Arc::new(VolatileRepository::new());
        let previous = Arc::new(VolatileRepository::new());
        let dual = DualRepository::new(primary.clone(), previous.clone());

        dual.put(&user("alice", "ops")).await.unwrap();

        assert!(primary
            .get(&UserId::from("alice"), &ctx())
            .await
            .unwrap()
            .is_some());
        assert!(previous
            .get(&UserId::from("alice"), &ctx())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn reads_fall_back_to_the_previous_backend_and_count() {
        let dual = dual_with_previous_user().await;

        assert_eq!(dual.previous_hits(), 0);

        let fetched = dual.get(&UserId::from("legacy"), &ctx()).await.unwrap();
        assert!(fetched.is_some());
        assert_eq!(dual.previous_hits(), 1);

        // A miss in both does not count as a fallback hit
        assert!(dual
            .get(&UserId::from("nobody"), &ctx())
            .await
            .unwrap()
            .is_none());
        assert_eq!(dual.previous_hits(), 1);
    }

    #[tokio::test]
    async fn bulk_reads_union_with_primary_winning() {
        let primary = Arc::new(VolatileRepository::new());
        let previous = Arc::new(VolatileRepository::new());
        let dual = DualRepository::new(primary.clone(), previous.clone());

        previous.put(&user("shared", "old_role")).await.unwrap();
        previous.put(&user("only_previous", "ops")).await.unwrap();
        primary.put(&user("shared", "new_role")).await.unwrap();

        let all = dual.get_all_by_id(&ctx()).await.unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(
            all[&UserId::from("shared")]
                .roles
                .first()
                .unwrap()
                .name
                .as_str(),
            "new_role"
        );
    }

    #[tokio::test]
    async fn remove_hits_both_backends() {
        let primary = Arc::new(VolatileRepository::new());
        let previous = Arc::new(VolatileRepository::new());
        let dual = DualRepository::new(primary.clone(), previous.clone());

        primary.put(&user("alice", "ops")).await.unwrap();
        previous.put(&user("alice", "ops")).await.unwrap();

        dual.remove(&UserId::from("alice")).await.unwrap();

        assert!(primary
            .get(&UserId::from("alice"), &ctx())
            .await
            .unwrap()
            .is_none());
        assert!(previous
            .get(&UserId::from("alice"), &ctx())
            .await
            .unwrap()
            .is_none());
    }
}
