// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use gatekeeper_types::{GroupName, UserId, UserPermission};
use parking_lot::RwLock;

use self::memory::MemoryPermissionState;
use crate::{PermissionsRepository, Result, TimeoutContext};

/// In-memory [`PermissionsRepository`], used by tests and single-node
/// deployments.
#[derive(Debug, Default)]
pub struct VolatileRepository {
    state: RwLock<MemoryPermissionState>,
}

impl VolatileRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PermissionsRepository for VolatileRepository {
    async fn put(&self, permission: &UserPermission) -> Result<()> {
        self.state.write().put(permission.clone());
        Ok(())
    }

    async fn put_all(&self, permissions: HashMap<UserId, UserPermission>) -> Result<()> {
        self.state.write().replace_all(permissions);
        Ok(())
    }

    async fn get(&self, id: &UserId, ctx: &TimeoutContext) -> Result<Option<UserPermission>> {
        ctx.check()?;
        Ok(self.state.read().get_merged(id))
    }

    async fn get_all_by_id(
        &self,
        ctx: &TimeoutContext,
    ) -> Result<HashMap<UserId, UserPermission>> {
        ctx.check()?;
        Ok(self.state.read().get_all_merged())
    }

    async fn get_all_by_roles(
        &self,
        roles: Option<&[GroupName]>,
        ctx: &TimeoutContext,
    ) -> Result<HashMap<UserId, UserPermission>> {
        ctx.check()?;
        Ok(self.state.read().get_by_roles_merged(roles))
    }

    async fn remove(&self, id: &UserId) -> Result<()> {
        self.state.write().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use gatekeeper_types::{Account, Application, Authorization, Permissions, Resource, Role};
    use pretty_assertions::assert_eq;

    use super::*;

    fn ctx() -> TimeoutContext {
        TimeoutContext::unbounded()
    }

    fn user_with_roles(id: &str, roles: &[&str]) -> UserPermission {
        let mut permission = UserPermission::new(UserId::from(id));
        for role in roles {
            permission.add_resource(Resource::Role(Role::new(*role)));
        }
        permission
    }

    fn unrestricted_with_account(name: &str) -> UserPermission {
        let mut permission = UserPermission::unrestricted();
        permission.add_resource(Resource::Account(Account::new(name)));
        permission
    }

    #[tokio::test]
    async fn put_is_an_idempotent_upsert() {
        let repository = VolatileRepository::new();
        let alice = user_with_roles("alice", &["ops"]);

        repository.put(&alice).await.unwrap();
        repository.put(&alice).await.unwrap();

        let stored = repository
            .get(&UserId::from("alice"), &ctx())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, alice);
        assert_eq!(repository.get_all_by_id(&ctx()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reads_merge_the_unrestricted_record() {
        let repository = VolatileRepository::new();
        repository
            .put(&unrestricted_with_account("shared"))
            .await
            .unwrap();
        repository.put(&user_with_roles("alice", &["ops"])).await.unwrap();

        let merged = repository
            .get(&UserId::from("alice"), &ctx())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(merged.accounts.first().unwrap().name.as_str(), "shared");
        assert_eq!(merged.roles.len(), 1);

        // The unrestricted record itself is returned as stored
        let unrestricted = repository
            .get(&UserId::unrestricted(), &ctx())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unrestricted, unrestricted_with_account("shared"));
    }

    #[tokio::test]
    async fn put_all_prunes_absent_users_but_keeps_the_unrestricted_record() {
        let repository = VolatileRepository::new();
        repository
            .put(&unrestricted_with_account("shared"))
            .await
            .unwrap();
        repository.put(&user_with_roles("alice", &["ops"])).await.unwrap();

        let replacement = HashMap::from([
            (UserId::from("bob"), user_with_roles("bob", &["dev"])),
            (UserId::from("carol"), user_with_roles("carol", &["qa"])),
        ]);
        repository.put_all(replacement).await.unwrap();

        assert!(repository
            .get(&UserId::from("alice"), &ctx())
            .await
            .unwrap()
            .is_none());
        assert!(repository
            .get(&UserId::from("bob"), &ctx())
            .await
            .unwrap()
            .is_some());
        assert!(repository
            .get(&UserId::unrestricted(), &ctx())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn get_all_by_roles_distinguishes_null_empty_and_matching() {
        let repository = VolatileRepository::new();
        repository
            .put(&unrestricted_with_account("shared"))
            .await
            .unwrap();
        for (user, role) in [
            ("u1", "role1"),
            ("u2", "role2"),
            ("u3", "role3"),
            ("u4", "role4"),
            ("u5", "role5"),
        ] {
            repository.put(&user_with_roles(user, &[role])).await.unwrap();
        }

        let all = repository.get_all_by_roles(None, &ctx()).await.unwrap();
        assert_eq!(all.len(), 6);

        let only_unrestricted = repository
            .get_all_by_roles(Some(&[]), &ctx())
            .await
            .unwrap();
        assert_eq!(only_unrestricted.len(), 1);
        assert!(only_unrestricted.contains_key(&UserId::unrestricted()));

        let roles = [GroupName::from("role3"), GroupName::from("role4")];
        let matching = repository
            .get_all_by_roles(Some(&roles), &ctx())
            .await
            .unwrap();
        let mut ids: Vec<_> = matching.keys().map(|id| id.as_str().to_owned()).collect();
        ids.sort();
        assert_eq!(ids, ["__unrestricted_user__", "u3", "u4"]);

        // Matched users come back merged with the unrestricted record
        assert_eq!(
            matching[&UserId::from("u3")]
                .accounts
                .first()
                .unwrap()
                .name
                .as_str(),
            "shared"
        );
    }

    #[tokio::test]
    async fn remove_deletes_a_single_user() {
        let repository = VolatileRepository::new();
        repository.put(&user_with_roles("alice", &["ops"])).await.unwrap();
        repository.put(&user_with_roles("bob", &["dev"])).await.unwrap();

        repository.remove(&UserId::from("alice")).await.unwrap();

        assert!(repository
            .get(&UserId::from("alice"), &ctx())
            .await
            .unwrap()
            .is_none());
        assert!(repository
            .get(&UserId::from("bob"), &ctx())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn round_trip_preserves_every_resource_kind() {
        let repository = VolatileRepository::new();
        let mut permission = UserPermission::new(UserId::from("full"));
        permission.add_resource(Resource::Account(
            Account::new("prod").with_permissions(
                Permissions::builder()
                    .add(Authorization::Read, ["ops"])
                    .build(),
            ),
        ));
        permission.add_resource(Resource::Application(Application::new("unicorn_api")));
        permission.add_resource(Resource::Role(Role::new("ops")));

        repository.put(&permission).await.unwrap();

        let stored = repository
            .get(&UserId::from("full"), &ctx())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, permission);
    }
}
