// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Construction of the repository, providers and resolver from settings.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use gatekeeper_controller_settings::{RepositoryKind, Settings};
use gatekeeper_database::Db;
use gatekeeper_permissions::{
    DualRepository, PermissionsRepository, PostgresRepository, RedisRepository,
    VolatileRepository,
};
use gatekeeper_providers::{
    clients::{DirectoryClient, InventoryClient},
    AggregatingPermissionSource, ApplicationProvider, CachedResourceProvider, ProviderError,
    ResourceProvider, SnapshotLoader, UserRolesProvider,
};
use gatekeeper_resolver::{PermissionsResolver, ResolverConfig};
use gatekeeper_sync::{LocalLockManager, LockManager, RedisLockManager};
use gatekeeper_types::{ResourceFactoryRegistry, ResourceType, Role, UserId};
use redis::aio::ConnectionManager;

use crate::ControllerError;

pub(crate) struct Wired {
    pub repository: Arc<dyn PermissionsRepository>,
    pub resolver: Arc<PermissionsResolver>,
    pub loaders: Vec<Arc<SnapshotLoader>>,
    pub lock_manager: Arc<dyn LockManager>,
}

/// Directory stand-in for deployments without a configured directory: every
/// user exists and has no roles.
#[derive(Debug)]
struct NoDirectory;

#[async_trait]
impl UserRolesProvider for NoDirectory {
    async fn load_roles(&self, _user: &UserId) -> Result<Vec<Role>, ProviderError> {
        Ok(Vec::new())
    }

    async fn multi_load_roles(
        &self,
        users: &[UserId],
    ) -> Result<HashMap<UserId, Vec<Role>>, ProviderError> {
        Ok(users
            .iter()
            .map(|user| (user.clone(), Vec::new()))
            .collect())
    }
}

async fn connect_redis(settings: &Settings) -> Result<ConnectionManager, ControllerError> {
    let redis = settings
        .redis
        .as_ref()
        .ok_or_else(|| ControllerError::InvalidConfiguration {
            message: "a [redis] section is required by the selected configuration".into(),
        })?;

    let client = redis::Client::open(redis.url.as_str())?;
    Ok(ConnectionManager::new(client).await?)
}

async fn build_repository(
    kind: RepositoryKind,
    settings: &Settings,
    registry: &ResourceFactoryRegistry,
    allow_dual: bool,
) -> Result<Arc<dyn PermissionsRepository>, ControllerError> {
    let cache_ttl = settings.unrestricted_cache.ttl();

    match kind {
        RepositoryKind::InMemory => Ok(Arc::new(VolatileRepository::new())),
        RepositoryKind::Postgres => {
            let database = settings.database.as_ref().ok_or_else(|| {
                ControllerError::InvalidConfiguration {
                    message: "repository kind `postgres` requires a [database] section".into(),
                }
            })?;

            let _ = gatekeeper_db_storage::migrations::migrate_from_url(&database.url).await?;

            let db = Arc::new(Db::connect(database)?);
            Ok(Arc::new(PostgresRepository::new(
                db,
                registry.clone(),
                cache_ttl,
            )))
        }
        RepositoryKind::Redis => {
            let connection = connect_redis(settings).await?;
            let key_prefix = settings
                .redis
                .as_ref()
                .map(|redis| redis.key_prefix.clone())
                .unwrap_or_default();

            Ok(Arc::new(RedisRepository::new(
                connection,
                key_prefix,
                registry.clone(),
                cache_ttl,
            )))
        }
        RepositoryKind::Dual if allow_dual => {
            let (primary_kind, previous_kind) = settings.repository.dual_pair()?;

            let primary =
                Box::pin(build_repository(primary_kind, settings, registry, false)).await?;
            let previous =
                Box::pin(build_repository(previous_kind, settings, registry, false)).await?;

            Ok(Arc::new(DualRepository::new(primary, previous)))
        }
        RepositoryKind::Dual => Err(ControllerError::InvalidConfiguration {
            message: "a dual repository cannot nest another dual repository".into(),
        }),
    }
}

pub(crate) async fn wire(settings: &Settings) -> Result<Wired, ControllerError> {
    let registry = ResourceFactoryRegistry::default();

    let repository =
        build_repository(settings.repository.kind, settings, &registry, true).await?;

    // One snapshot loader per configured inventory; applications get their
    // specialized provider with prefix extraction and the EXECUTE fallback.
    let mut loaders = Vec::new();
    let mut providers: Vec<Arc<dyn ResourceProvider>> = Vec::new();
    let max_staleness = settings.providers.max_staleness();
    let cache_ttl = settings.providers.cache_ttl();

    for source in &settings.resource_sources {
        let resource_type = source.resource_type()?;

        let loader = Arc::new(SnapshotLoader::new(
            Arc::new(InventoryClient::new(
                resource_type.clone(),
                source.base_url.clone(),
                registry.clone(),
            )),
            max_staleness,
        ));
        loaders.push(Arc::clone(&loader));

        let secondary = source.secondary_base_url.as_ref().map(|url| {
            let secondary = Arc::new(SnapshotLoader::new(
                Arc::new(InventoryClient::new(
                    resource_type.clone(),
                    url.clone(),
                    registry.clone(),
                )),
                max_staleness,
            ));
            loaders.push(Arc::clone(&secondary));
            secondary
        });

        let permission_source =
            AggregatingPermissionSource::with_prefix_rules(settings.group_prefix_rules.clone());

        if resource_type == ResourceType::APPLICATION {
            let mut provider = ApplicationProvider::new(
                loader,
                cache_ttl,
                settings.authorization.execute_fallback.as_authorization(),
                settings.authorization.allow_access_to_unknown_applications,
            )
            .with_permission_source(permission_source);
            if let Some(secondary) = secondary {
                provider = provider.with_secondary(secondary);
            }
            providers.push(Arc::new(provider));
        } else {
            let mut provider = CachedResourceProvider::new(loader, cache_ttl)
                .with_permission_source(permission_source);
            if let Some(secondary) = secondary {
                provider = provider.with_secondary(secondary);
            }
            providers.push(Arc::new(provider));
        }
    }

    let roles_provider: Arc<dyn UserRolesProvider> = match &settings.directory {
        Some(directory) => Arc::new(DirectoryClient::new(directory.base_url.clone())),
        None => {
            log::warn!("no [directory] configured, users will resolve without roles");
            Arc::new(NoDirectory)
        }
    };

    let resolver = Arc::new(PermissionsResolver::new(
        providers,
        roles_provider,
        ResolverConfig {
            admin_roles: settings
                .authorization
                .admin_roles
                .iter()
                .map(|role| role.as_str().into())
                .collect(),
            allow_access_to_unknown_applications: settings
                .authorization
                .allow_access_to_unknown_applications,
        },
    ));

    // The sync lock must span the fleet when there is a shared redis
    let lock_manager: Arc<dyn LockManager> = if settings.redis.is_some() {
        Arc::new(RedisLockManager::new(connect_redis(settings).await?))
    } else {
        log::warn!("no [redis] configured, using a process-local sync lock");
        Arc::new(LocalLockManager::new())
    };

    Ok(Wired {
        repository,
        resolver,
        loaders,
        lock_manager,
    })
}
