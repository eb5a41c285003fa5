// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use gatekeeper_providers::{ResourceProvider, UserRolesProvider};
use gatekeeper_types::{
    ExternalUser, GroupName, Resource, ResourceName, ResourceType, Role, RoleSource,
    ServiceAccount, UserId, UserPermission,
};
use snafu::{Report, ResultExt};

use crate::{
    AccessControlIndex, BatchResourcesSnafu, BatchRoleLookupSnafu, PermissionResolutionError,
    ResolutionSnafu, RoleLookupSnafu,
};

/// Policy knobs the resolver applies to every record it produces.
#[derive(Debug, Clone, Default)]
pub struct ResolverConfig {
    /// Membership in any of these makes the user an admin
    pub admin_roles: BTreeSet<GroupName>,

    /// Copied onto every resolved record; evaluated at the view layer
    pub allow_access_to_unknown_applications: bool,
}

/// Resolves users (and the anonymous user) against all resource providers.
pub struct PermissionsResolver {
    resource_providers: Vec<Arc<dyn ResourceProvider>>,
    roles_provider: Arc<dyn UserRolesProvider>,
    config: ResolverConfig,
}

impl std::fmt::Debug for PermissionsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionsResolver")
            .field("providers", &self.resource_providers.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The outcome of a batch resolve.
///
/// Users the identity provider does not know (and which are neither service
/// accounts nor carry external roles) are absent from `permissions`; the
/// syncer's bulk write prunes them. `failures` records users whose
/// resolution failed without failing the whole batch.
#[derive(Debug, Default)]
pub struct BatchResolution {
    pub permissions: HashMap<UserId, UserPermission>,
    pub failures: BTreeMap<UserId, String>,
}

impl PermissionsResolver {
    pub fn new(
        resource_providers: Vec<Arc<dyn ResourceProvider>>,
        roles_provider: Arc<dyn UserRolesProvider>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            resource_providers,
            roles_provider,
            config,
        }
    }

    pub fn providers(&self) -> &[Arc<dyn ResourceProvider>] {
        &self.resource_providers
    }

    fn is_admin(&self, groups: &BTreeSet<GroupName>) -> bool {
        !self.config.admin_roles.is_disjoint(groups)
    }

    /// The service account with the given id, if the inventory has one
    async fn service_account(
        &self,
        id: &UserId,
    ) -> Result<Option<ServiceAccount>, PermissionResolutionError> {
        let Some(provider) = self
            .resource_providers
            .iter()
            .find(|provider| provider.resource_type() == ResourceType::SERVICE_ACCOUNT)
        else {
            return Ok(None);
        };

        let resource = provider
            .get_by_name(&ResourceName::from(id.as_str()))
            .await
            .context(ResolutionSnafu { user: id.clone() })?;

        Ok(match resource {
            Some(Resource::ServiceAccount(service_account)) => Some(service_account),
            _ => None,
        })
    }

    /// Builds the anonymous record: unrestricted entries of every provider,
    /// plus restricted entries matched by the anonymous roles, if any.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_unrestricted(&self) -> Result<UserPermission, PermissionResolutionError> {
        let unrestricted_id = UserId::unrestricted();

        let roles = self
            .roles_provider
            .load_unrestricted_roles()
            .await
            .context(RoleLookupSnafu {
                user: unrestricted_id.clone(),
            })?;

        let mut permission = UserPermission::unrestricted();
        permission.allow_access_to_unknown_applications =
            self.config.allow_access_to_unknown_applications;
        permission.add_resources(roles.into_iter().map(Resource::Role));

        let groups = permission.roles_held();

        for provider in &self.resource_providers {
            let unrestricted =
                provider
                    .all_unrestricted()
                    .await
                    .context(ResolutionSnafu {
                        user: unrestricted_id.clone(),
                    })?;
            permission.add_resources(unrestricted);

            if !groups.is_empty() {
                let restricted =
                    provider
                        .all_restricted(&groups, false)
                        .await
                        .context(ResolutionSnafu {
                            user: unrestricted_id.clone(),
                        })?;
                permission.add_resources(restricted);
            }
        }

        Ok(permission)
    }

    /// Resolve a plain user id with no external roles
    pub async fn resolve(
        &self,
        user_id: UserId,
    ) -> Result<UserPermission, PermissionResolutionError> {
        self.resolve_and_merge(ExternalUser::new(user_id)).await
    }

    /// Resolve a user, merging in the externally supplied roles.
    ///
    /// Service accounts found in the inventory are valid users; their
    /// `member_of` list takes the place of a directory lookup.
    #[tracing::instrument(skip(self), fields(user = %external_user.id))]
    pub async fn resolve_and_merge(
        &self,
        external_user: ExternalUser,
    ) -> Result<UserPermission, PermissionResolutionError> {
        let ExternalUser { id, external_roles } = external_user;

        if id.is_unrestricted() {
            return self.resolve_unrestricted().await;
        }

        let (provider_roles, external_roles) = match self.service_account(&id).await? {
            Some(service_account) => {
                let mut roles: BTreeSet<GroupName> =
                    service_account.member_of.into_iter().collect();
                roles.extend(external_roles);
                (Vec::new(), roles)
            }
            None => {
                let roles = self
                    .roles_provider
                    .load_roles(&id)
                    .await
                    .context(RoleLookupSnafu { user: id.clone() })?;
                (roles, external_roles)
            }
        };

        let roles = collect_roles(provider_roles, &external_roles);
        let groups: BTreeSet<GroupName> = roles.iter().map(Role::group_name).collect();
        let is_admin = self.is_admin(&groups);

        let mut permission = UserPermission::new(id.clone()).with_admin(is_admin);
        permission.allow_access_to_unknown_applications =
            self.config.allow_access_to_unknown_applications;
        permission.add_resources(roles.into_iter().map(Resource::Role));

        for provider in &self.resource_providers {
            let restricted = provider
                .all_restricted(&groups, is_admin)
                .await
                .context(ResolutionSnafu { user: id.clone() })?;
            permission.add_resources(restricted);
        }

        Ok(permission)
    }

    /// Batch path: one `multi_load_roles` call, one access-control index.
    #[tracing::instrument(skip_all, fields(users = users.len()))]
    pub async fn resolve_batch(
        &self,
        users: Vec<ExternalUser>,
    ) -> Result<BatchResolution, PermissionResolutionError> {
        let mut resolution = BatchResolution::default();

        // Service accounts are users too, but their roles come from the
        // inventory, not the directory.
        let service_accounts = self.known_service_accounts().await?;

        let directory_users: Vec<UserId> = users
            .iter()
            .filter(|user| {
                !user.id.is_unrestricted() && !service_accounts.contains_key(&user.id)
            })
            .map(|user| user.id.clone())
            .collect();

        let mut directory_roles = self
            .roles_provider
            .multi_load_roles(&directory_users)
            .await
            .context(BatchRoleLookupSnafu)?;

        let index = self.build_index().await?;

        for ExternalUser { id, external_roles } in users {
            if id.is_unrestricted() {
                match self.resolve_unrestricted().await {
                    Ok(permission) => {
                        let _ = resolution.permissions.insert(id, permission);
                    }
                    Err(error) => {
                        log::warn!(
                            "failed to resolve the unrestricted record during batch: {}",
                            Report::from_error(&error)
                        );
                        let _ = resolution.failures.insert(id, error.to_string());
                    }
                }
                continue;
            }

            let (provider_roles, external_roles) = match service_accounts.get(&id) {
                Some(service_account) => {
                    let mut roles: BTreeSet<GroupName> =
                        service_account.member_of.iter().cloned().collect();
                    roles.extend(external_roles);
                    (Vec::new(), roles)
                }
                None => match directory_roles.remove(&id) {
                    Some(roles) => (roles, external_roles),
                    // Unknown upstream: drop the record unless external
                    // roles keep the user alive
                    None if external_roles.is_empty() => continue,
                    None => (Vec::new(), external_roles),
                },
            };

            let roles = collect_roles(provider_roles, &external_roles);
            let groups: BTreeSet<GroupName> = roles.iter().map(Role::group_name).collect();
            let is_admin = self.is_admin(&groups);

            let mut permission = UserPermission::new(id.clone()).with_admin(is_admin);
            permission.allow_access_to_unknown_applications =
                self.config.allow_access_to_unknown_applications;
            permission.add_resources(roles.into_iter().map(Resource::Role));
            permission.add_resources(index.resources_for(&groups, is_admin));

            let _ = resolution.permissions.insert(id, permission);
        }

        Ok(resolution)
    }

    /// The user ids of every service account in the inventory; the syncer
    /// seeds its working set with these.
    pub async fn service_account_ids(&self) -> Result<Vec<UserId>, PermissionResolutionError> {
        Ok(self.known_service_accounts().await?.into_keys().collect())
    }

    async fn known_service_accounts(
        &self,
    ) -> Result<HashMap<UserId, ServiceAccount>, PermissionResolutionError> {
        let Some(provider) = self
            .resource_providers
            .iter()
            .find(|provider| provider.resource_type() == ResourceType::SERVICE_ACCOUNT)
        else {
            return Ok(HashMap::new());
        };

        let all = provider.all().await.context(BatchResourcesSnafu)?;

        Ok(all
            .iter()
            .filter_map(|resource| match resource {
                Resource::ServiceAccount(service_account) => Some((
                    UserId::from(service_account.name.as_str()),
                    service_account.clone(),
                )),
                _ => None,
            })
            .collect())
    }

    async fn build_index(&self) -> Result<AccessControlIndex, PermissionResolutionError> {
        let mut index = AccessControlIndex::default();
        let no_groups = BTreeSet::new();

        for provider in &self.resource_providers {
            // Resources a provider hands out with no roles at all capture
            // policy knobs like the unknown-application grant.
            let baseline = provider
                .all_restricted(&no_groups, false)
                .await
                .context(BatchResourcesSnafu)?;
            for resource in baseline {
                index.insert_granted_to_all(resource);
            }

            let all = provider.all().await.context(BatchResourcesSnafu)?;
            for resource in all.iter() {
                index.insert(resource.clone());
            }
        }

        Ok(index)
    }
}

/// Directory roles plus external roles, the latter tagged EXTERNAL
fn collect_roles(provider_roles: Vec<Role>, external_roles: &BTreeSet<GroupName>) -> BTreeSet<Role> {
    let mut roles: BTreeSet<Role> = provider_roles.into_iter().collect();
    roles.extend(
        external_roles
            .iter()
            .map(|group| Role::new(group.as_str()).with_source(RoleSource::External)),
    );
    roles
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use gatekeeper_providers::ProviderError;
    use gatekeeper_types::{Account, Application, Authorization, Permissions};
    use pretty_assertions::assert_eq;

    use super::*;

    struct StaticProvider {
        resource_type: ResourceType,
        resources: Arc<Vec<Resource>>,
    }

    impl StaticProvider {
        fn new(resource_type: ResourceType, resources: Vec<Resource>) -> Arc<Self> {
            Arc::new(Self {
                resource_type,
                resources: Arc::new(resources),
            })
        }
    }

    #[async_trait]
    impl ResourceProvider for StaticProvider {
        fn resource_type(&self) -> ResourceType {
            self.resource_type.clone()
        }

        fn is_healthy(&self) -> bool {
            true
        }

        async fn all(&self) -> Result<Arc<Vec<Resource>>, ProviderError> {
            Ok(Arc::clone(&self.resources))
        }
    }

    #[derive(Default)]
    struct StubRolesProvider {
        roles: HashMap<UserId, Vec<Role>>,
        unrestricted: Vec<Role>,
    }

    #[async_trait]
    impl UserRolesProvider for StubRolesProvider {
        async fn load_roles(&self, user: &UserId) -> Result<Vec<Role>, ProviderError> {
            Ok(self.roles.get(user).cloned().unwrap_or_default())
        }

        async fn multi_load_roles(
            &self,
            users: &[UserId],
        ) -> Result<HashMap<UserId, Vec<Role>>, ProviderError> {
            Ok(users
                .iter()
                .filter_map(|user| {
                    self.roles
                        .get(user)
                        .map(|roles| (user.clone(), roles.clone()))
                })
                .collect())
        }

        async fn load_unrestricted_roles(&self) -> Result<Vec<Role>, ProviderError> {
            Ok(self.unrestricted.clone())
        }
    }

    fn ldap_role(name: &str) -> Role {
        Role::new(name).with_source(RoleSource::Ldap)
    }

    fn restricted_account(name: &str, group: &str) -> Resource {
        Resource::Account(
            Account::new(name).with_permissions(
                Permissions::builder()
                    .add(Authorization::Read, [group])
                    .build(),
            ),
        )
    }

    fn fixture_providers() -> Vec<Arc<dyn ResourceProvider>> {
        vec![
            StaticProvider::new(
                ResourceType::ACCOUNT,
                vec![
                    Resource::Account(Account::new("open")),
                    restricted_account("prod", "ops"),
                    restricted_account("audit", "auditors"),
                ],
            ),
            StaticProvider::new(
                ResourceType::APPLICATION,
                vec![Resource::Application(
                    Application::new("unicorn_api").with_permissions(
                        Permissions::builder()
                            .add(Authorization::Write, ["ops"])
                            .build(),
                    ),
                )],
            ),
            StaticProvider::new(
                ResourceType::SERVICE_ACCOUNT,
                vec![Resource::ServiceAccount(
                    ServiceAccount::new("svc-deploy").with_member_of(["deployers"]),
                )],
            ),
        ]
    }

    fn resolver_with_roles(roles: HashMap<UserId, Vec<Role>>) -> PermissionsResolver {
        PermissionsResolver::new(
            fixture_providers(),
            Arc::new(StubRolesProvider {
                roles,
                unrestricted: vec![],
            }),
            ResolverConfig {
                admin_roles: BTreeSet::from([GroupName::from("platform-admins")]),
                allow_access_to_unknown_applications: false,
            },
        )
    }

    #[tokio::test]
    async fn resolve_filters_by_the_users_groups() {
        let resolver = resolver_with_roles(HashMap::from([(
            UserId::from("alice"),
            vec![ldap_role("ops")],
        )]));

        let permission = resolver.resolve(UserId::from("alice")).await.unwrap();

        assert!(!permission.is_admin);
        assert_eq!(permission.accounts.len(), 1);
        assert_eq!(permission.accounts.first().unwrap().name.as_str(), "prod");
        assert_eq!(permission.applications.len(), 1);
        assert_eq!(permission.roles.len(), 1);
    }

    #[tokio::test]
    async fn admin_roles_grant_everything_restricted() {
        let resolver = resolver_with_roles(HashMap::from([(
            UserId::from("root"),
            vec![ldap_role("platform-admins")],
        )]));

        let permission = resolver.resolve(UserId::from("root")).await.unwrap();

        assert!(permission.is_admin);
        // Both restricted accounts, the restricted application, and the
        // service account (guarded by its member_of)
        assert_eq!(permission.accounts.len(), 2);
        assert_eq!(permission.applications.len(), 1);
        assert_eq!(permission.service_accounts.len(), 1);
    }

    #[tokio::test]
    async fn service_accounts_resolve_through_member_of() {
        let resolver = resolver_with_roles(HashMap::new());

        let permission = resolver.resolve(UserId::from("svc-deploy")).await.unwrap();

        let role = permission.roles.first().unwrap();
        assert_eq!(role.name.as_str(), "deployers");
        assert_eq!(role.source, Some(RoleSource::External));
        // It owns itself: its member_of guards the service account resource
        assert_eq!(permission.service_accounts.len(), 1);
    }

    #[tokio::test]
    async fn external_roles_are_merged_and_tagged() {
        let resolver = resolver_with_roles(HashMap::from([(
            UserId::from("bob"),
            vec![ldap_role("auditors")],
        )]));

        let permission = resolver
            .resolve_and_merge(
                ExternalUser::new("bob").with_external_roles(["ops"]),
            )
            .await
            .unwrap();

        assert_eq!(permission.accounts.len(), 2);
        let external = permission.external_roles();
        assert_eq!(external.len(), 1);
        assert_eq!(external[0].name.as_str(), "ops");
    }

    #[tokio::test]
    async fn unrestricted_record_contains_only_open_resources_without_anon_roles() {
        let resolver = resolver_with_roles(HashMap::new());

        let permission = resolver.resolve_unrestricted().await.unwrap();

        assert_eq!(permission.id, UserId::unrestricted());
        assert_eq!(permission.accounts.len(), 1);
        assert_eq!(permission.accounts.first().unwrap().name.as_str(), "open");
        assert!(permission.applications.is_empty());
    }

    #[tokio::test]
    async fn anonymous_roles_extend_the_unrestricted_record() {
        let resolver = PermissionsResolver::new(
            fixture_providers(),
            Arc::new(StubRolesProvider {
                roles: HashMap::new(),
                unrestricted: vec![ldap_role("auditors")],
            }),
            ResolverConfig::default(),
        );

        let permission = resolver.resolve_unrestricted().await.unwrap();

        let names: Vec<_> = permission
            .accounts
            .iter()
            .map(|account| account.name.as_str().to_owned())
            .collect();
        assert_eq!(names, ["audit", "open"]);
    }

    #[tokio::test]
    async fn batch_matches_the_single_user_path() {
        let roles = HashMap::from([
            (UserId::from("alice"), vec![ldap_role("ops")]),
            (UserId::from("bob"), vec![ldap_role("auditors")]),
            (UserId::from("root"), vec![ldap_role("platform-admins")]),
        ]);

        let resolver = resolver_with_roles(roles);

        let batch = resolver
            .resolve_batch(vec![
                ExternalUser::new("alice"),
                ExternalUser::new("bob"),
                ExternalUser::new("root"),
                ExternalUser::new("svc-deploy"),
            ])
            .await
            .unwrap();

        assert!(batch.failures.is_empty());
        assert_eq!(batch.permissions.len(), 4);

        for id in ["alice", "bob", "root", "svc-deploy"] {
            let single = resolver.resolve(UserId::from(id)).await.unwrap();
            assert_eq!(batch.permissions[&UserId::from(id)], single, "user {id}");
        }
    }

    #[tokio::test]
    async fn batch_drops_users_unknown_upstream() {
        let resolver = resolver_with_roles(HashMap::new());

        let batch = resolver
            .resolve_batch(vec![
                ExternalUser::new("ghost"),
                ExternalUser::new("kept").with_external_roles(["ops"]),
            ])
            .await
            .unwrap();

        assert!(!batch.permissions.contains_key(&UserId::from("ghost")));

        let kept = &batch.permissions[&UserId::from("kept")];
        assert_eq!(kept.accounts.len(), 1);
        assert_eq!(kept.external_roles().len(), 1);
    }
}
