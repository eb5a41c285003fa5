// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::{collections::BTreeSet, future::Future, sync::Arc, time::Duration};

use gatekeeper_controller_settings::SyncSettings;
use gatekeeper_permissions::{PermissionsRepository, TimeoutContext};
use gatekeeper_providers::ResourceProvider as _;
use gatekeeper_resolver::{PermissionResolutionError, PermissionsResolver};
use gatekeeper_types::{ExternalUser, Role, UserId};
use snafu::{Report, ResultExt};
use tokio::sync::{broadcast, watch};

use crate::{
    LockManager, LockSnafu, RepositorySnafu, ResolutionSnafu, SyncError, TickTimeoutSnafu,
};

/// Periodically re-resolves the whole user population and persists it.
///
/// One tick: acquire the fleet lock, gate on provider health (cached
/// snapshots still serve when unhealthy), resolve and store the
/// unrestricted record, then batch-resolve every known user (repository
/// users plus service accounts) with their stored EXTERNAL roles carried
/// along, and bulk-write the outcome. `put_all` prunes users that vanished
/// upstream.
pub struct UserRolesSyncer {
    repository: Arc<dyn PermissionsRepository>,
    resolver: Arc<PermissionsResolver>,
    lock: Arc<dyn LockManager>,
    settings: SyncSettings,
    in_service: watch::Receiver<bool>,
}

impl std::fmt::Debug for UserRolesSyncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRolesSyncer")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl UserRolesSyncer {
    pub fn new(
        repository: Arc<dyn PermissionsRepository>,
        resolver: Arc<PermissionsResolver>,
        lock: Arc<dyn LockManager>,
        settings: SyncSettings,
        in_service: watch::Receiver<bool>,
    ) -> Self {
        Self {
            repository,
            resolver,
            lock,
            settings,
            in_service,
        }
    }

    /// Run until `shutdown` fires. Ticks are suppressed while the process
    /// is not marked in service and resume on the status-change event.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        if !self.settings.write_mode_enabled {
            log::info!("write mode disabled, user-roles syncer not running");
            return;
        }

        loop {
            if !*self.in_service.borrow() {
                log::debug!("not in service, user-roles syncer pausing");
                tokio::select! {
                    changed = self.in_service.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        continue;
                    }
                    _ = shutdown.recv() => return,
                }
            }

            let delay = match self.tick().await {
                Ok(()) => self.settings.delay(),
                Err(error) => {
                    log::error!("sync tick failed: {}", Report::from_error(error));
                    self.settings.failure_delay()
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => return,
            }
        }
    }

    /// One sync tick, guarded by the distributed lock.
    ///
    /// Failing to acquire the lock is a clean no-op; another instance is
    /// syncing.
    #[tracing::instrument(skip(self))]
    pub async fn tick(&self) -> Result<(), SyncError> {
        let Some(guard) = self
            .lock
            .acquire(&self.settings.lock_name, self.settings.delay_timeout())
            .await
            .context(LockSnafu)?
        else {
            log::debug!("sync lock held elsewhere, skipping this tick");
            return Ok(());
        };

        let budget = tick_budget(self.settings.delay_timeout());
        let result = match tokio::time::timeout(budget, self.sync_users()).await {
            Ok(result) => result,
            Err(_) => TickTimeoutSnafu { budget }.fail(),
        };

        if let Err(error) = guard.release().await {
            log::warn!(
                "failed to release the sync lock, it will expire on its own: {}",
                Report::from_error(error)
            );
        }

        result
    }

    async fn sync_users(&self) -> Result<(), SyncError> {
        let unhealthy: Vec<_> = self
            .resolver
            .providers()
            .iter()
            .filter(|provider| !provider.is_healthy())
            .map(|provider| provider.resource_type())
            .collect();
        if !unhealthy.is_empty() {
            log::warn!(
                "syncing with stale resource snapshots, unhealthy providers: {unhealthy:?}"
            );
        }

        // The unrestricted record first; every read merges it
        let unrestricted = self
            .with_resolution_retry(|| self.resolver.resolve_unrestricted())
            .await
            .context(ResolutionSnafu)?;
        self.repository
            .put(&unrestricted)
            .await
            .context(RepositorySnafu)?;

        let stored = self
            .repository
            .get_all_by_id(&TimeoutContext::unbounded())
            .await
            .context(RepositorySnafu)?;

        // Working set: stored users plus every service account; the stored
        // EXTERNAL roles ride along so they survive the sync.
        let mut users: Vec<ExternalUser> = stored
            .values()
            .filter(|permission| !permission.id.is_unrestricted())
            .map(|permission| {
                ExternalUser::new(permission.id.clone()).with_external_roles(
                    permission
                        .external_roles()
                        .iter()
                        .map(Role::group_name),
                )
            })
            .collect();

        let known: BTreeSet<UserId> = users.iter().map(|user| user.id.clone()).collect();
        for id in self
            .with_resolution_retry(|| self.resolver.service_account_ids())
            .await
            .context(ResolutionSnafu)?
        {
            if !known.contains(&id) {
                users.push(ExternalUser::new(id));
            }
        }

        let batch = self
            .with_resolution_retry(|| self.resolver.resolve_batch(users.clone()))
            .await
            .context(ResolutionSnafu)?;

        for (user, reason) in &batch.failures {
            log::warn!("user `{user}` could not be resolved this tick: {reason}");
        }

        log::debug!("synced {} user permission records", batch.permissions.len());

        self.repository
            .put_all(batch.permissions)
            .await
            .context(RepositorySnafu)
    }

    /// Fixed-interval retry bounded by `floor(timeout / interval) + 1`
    /// attempts, the within-tick policy for transient resolution failures.
    async fn with_resolution_retry<T, F, Fut>(
        &self,
        operation: F,
    ) -> Result<T, PermissionResolutionError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, PermissionResolutionError>>,
    {
        let interval = self.settings.retry_interval().max(Duration::from_millis(1));
        let max_attempts =
            (self.settings.delay_timeout().as_millis() / interval.as_millis()) as u32 + 1;

        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < max_attempts => {
                    log::warn!(
                        "resolution attempt {attempt}/{max_attempts} failed, retrying in \
                         {interval:?}: {}",
                        Report::from_error(&error)
                    );
                    tokio::time::sleep(interval).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn tick_budget(delay_timeout: Duration) -> Duration {
    let margin = (delay_timeout / 10).max(Duration::from_millis(500));
    delay_timeout.saturating_sub(margin).max(Duration::from_millis(100))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use gatekeeper_permissions::VolatileRepository;
    use gatekeeper_providers::{ProviderError, ResourceProvider, UserRolesProvider};
    use gatekeeper_resolver::ResolverConfig;
    use gatekeeper_types::{
        Account, Permissions, Resource, ResourceType, RoleSource, ServiceAccount, UserPermission,
    };
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::LocalLockManager;

    struct StaticProvider {
        resource_type: ResourceType,
        resources: Arc<Vec<Resource>>,
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

    struct StubRolesProvider {
        roles: HashMap<UserId, Vec<Role>>,
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
    }

    fn syncer_fixture(
        roles: HashMap<UserId, Vec<Role>>,
        repository: Arc<VolatileRepository>,
    ) -> UserRolesSyncer {
        let providers: Vec<Arc<dyn ResourceProvider>> = vec![
            Arc::new(StaticProvider {
                resource_type: ResourceType::ACCOUNT,
                resources: Arc::new(vec![
                    Resource::Account(Account::new("open")),
                    Resource::Account(
                        Account::new("prod").with_permissions(
                            Permissions::builder()
                                .add(gatekeeper_types::Authorization::Read, ["ops"])
                                .build(),
                        ),
                    ),
                ]),
            }),
            Arc::new(StaticProvider {
                resource_type: ResourceType::SERVICE_ACCOUNT,
                resources: Arc::new(vec![Resource::ServiceAccount(
                    ServiceAccount::new("svc-deploy").with_member_of(["deployers"]),
                )]),
            }),
        ];

        let resolver = Arc::new(PermissionsResolver::new(
            providers,
            Arc::new(StubRolesProvider { roles }),
            ResolverConfig::default(),
        ));

        // tick() does not consult the in-service channel, only run() does
        let (_tx, in_service) = watch::channel(true);

        UserRolesSyncer::new(
            repository,
            resolver,
            Arc::new(LocalLockManager::new()),
            SyncSettings::default(),
            in_service,
        )
    }

    fn ldap_role(name: &str) -> Role {
        Role::new(name).with_source(RoleSource::Ldap)
    }

    fn ctx() -> TimeoutContext {
        TimeoutContext::unbounded()
    }

    #[tokio::test]
    async fn a_tick_seeds_the_unrestricted_record_into_an_empty_store() {
        let repository = Arc::new(VolatileRepository::new());
        let syncer = syncer_fixture(HashMap::new(), repository.clone());

        syncer.tick().await.unwrap();

        let unrestricted = repository
            .get(&UserId::unrestricted(), &ctx())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unrestricted.accounts.len(), 1);
        assert_eq!(unrestricted.accounts.first().unwrap().name.as_str(), "open");
    }

    #[tokio::test]
    async fn external_roles_survive_a_sync() {
        let repository = Arc::new(VolatileRepository::new());

        // Stored user with one internal and one external role
        let mut stored = UserPermission::new(UserId::from("u"));
        stored.add_resource(Resource::Role(ldap_role("r_internal")));
        stored.add_resource(Resource::Role(
            Role::new("r_external").with_source(RoleSource::External),
        ));
        repository.put(&stored).await.unwrap();

        // The identity provider only knows the internal role
        let syncer = syncer_fixture(
            HashMap::from([(UserId::from("u"), vec![ldap_role("r_internal")])]),
            repository.clone(),
        );

        syncer.tick().await.unwrap();

        let synced = repository
            .get(&UserId::from("u"), &ctx())
            .await
            .unwrap()
            .unwrap();
        let role_names: Vec<_> = synced
            .roles
            .iter()
            .map(|role| role.name.as_str().to_owned())
            .collect();
        assert_eq!(role_names, ["r_external", "r_internal"]);

        let external = synced.external_roles();
        assert_eq!(external.len(), 1);
        assert_eq!(external[0].name.as_str(), "r_external");
    }

    #[tokio::test]
    async fn users_gone_upstream_are_pruned() {
        let repository = Arc::new(VolatileRepository::new());
        repository
            .put(&UserPermission::new(UserId::from("ghost")))
            .await
            .unwrap();

        let syncer = syncer_fixture(HashMap::new(), repository.clone());

        syncer.tick().await.unwrap();

        assert!(repository
            .get(&UserId::from("ghost"), &ctx())
            .await
            .unwrap()
            .is_none());
        // Service accounts join the working set on their own
        assert!(repository
            .get(&UserId::from("svc-deploy"), &ctx())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn a_held_lock_skips_the_tick_cleanly() {
        let repository = Arc::new(VolatileRepository::new());
        let syncer = syncer_fixture(HashMap::new(), repository.clone());

        let blocker = syncer
            .lock
            .acquire(&syncer.settings.lock_name, Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();

        syncer.tick().await.unwrap();

        // Nothing was written
        assert!(repository
            .get(&UserId::unrestricted(), &ctx())
            .await
            .unwrap()
            .is_none());

        blocker.release().await.unwrap();
    }
}
