// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Remote key-value [`PermissionsRepository`] on redis.
//!
//! Layout, under a configurable prefix:
//!
//! - `{prefix}:users`: set of all known user ids
//! - `{prefix}:permissions:admin`: set of admin user ids
//! - `{prefix}:permissions:{user}:{suffix}`: hash from resource name to
//!   body, one per resource type (`accounts`, `applications`, ...)
//! - `{prefix}:roles:{role}`: set of user ids holding the role
//! - `{prefix}:last_modified:__unrestricted_user__`: server time of the
//!   last write to the unrestricted record
//!
//! Writes replace each per-type hash through a staging key and `RENAME`
//! inside one atomic pipeline. Reads check their [`TimeoutContext`] at every
//! helper entry and scan hashes incrementally to bound peak memory.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use gatekeeper_types::{
    GroupName, ResourceFactoryRegistry, ResourceName, ResourceType, UserId, UserPermission,
    UNRESTRICTED_USER_ID,
};
use redis::{aio::ConnectionManager, AsyncCommands};
use redis_args::ToRedisArgs;
use snafu::ResultExt;

use crate::{
    merged_with_unrestricted, BodySnafu, PermissionsRepository, RedisSnafu, Result,
    SerializeSnafu, StoredTypeSnafu, TimeoutContext, UnrestrictedPermissionCache,
};

/// Suffix of the staging keys used for atomic hash replacement
const STAGING_SUFFIX: &str = "staging";

#[derive(ToRedisArgs)]
#[to_redis_args(fmt = "{prefix}:users")]
struct UsersKey {
    prefix: String,
}

#[derive(ToRedisArgs)]
#[to_redis_args(fmt = "{prefix}:permissions:admin")]
struct AdminsKey {
    prefix: String,
}

#[derive(ToRedisArgs)]
#[to_redis_args(fmt = "{prefix}:permissions:{user_id}:{suffix}")]
struct UserResourcesKey {
    prefix: String,
    user_id: String,
    suffix: String,
}

#[derive(ToRedisArgs)]
#[to_redis_args(fmt = "{prefix}:permissions:{user_id}:{suffix}:staging")]
struct UserResourcesStagingKey {
    prefix: String,
    user_id: String,
    suffix: String,
}

#[derive(ToRedisArgs)]
#[to_redis_args(fmt = "{prefix}:roles:{role}")]
struct RoleKey {
    prefix: String,
    role: String,
}

#[derive(ToRedisArgs)]
#[to_redis_args(fmt = "{prefix}:last_modified:__unrestricted_user__")]
struct LastModifiedKey {
    prefix: String,
}

/// [`PermissionsRepository`] backed by a remote redis instance.
pub struct RedisRepository {
    redis: ConnectionManager,
    key_prefix: String,
    registry: ResourceFactoryRegistry,
    cache: UnrestrictedPermissionCache,
}

impl std::fmt::Debug for RedisRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRepository")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisRepository {
    pub fn new(
        redis: ConnectionManager,
        key_prefix: impl Into<String>,
        registry: ResourceFactoryRegistry,
        unrestricted_cache_ttl: Duration,
    ) -> Self {
        Self {
            redis,
            key_prefix: key_prefix.into(),
            registry,
            cache: UnrestrictedPermissionCache::new(unrestricted_cache_ttl),
        }
    }

    fn users_key(&self) -> UsersKey {
        UsersKey {
            prefix: self.key_prefix.clone(),
        }
    }

    fn admins_key(&self) -> AdminsKey {
        AdminsKey {
            prefix: self.key_prefix.clone(),
        }
    }

    fn resources_key(&self, user_id: &str, suffix: &str) -> UserResourcesKey {
        UserResourcesKey {
            prefix: self.key_prefix.clone(),
            user_id: user_id.to_owned(),
            suffix: suffix.to_owned(),
        }
    }

    fn role_key(&self, role: &str) -> RoleKey {
        RoleKey {
            prefix: self.key_prefix.clone(),
            role: role.to_owned(),
        }
    }

    fn last_modified_key(&self) -> LastModifiedKey {
        LastModifiedKey {
            prefix: self.key_prefix.clone(),
        }
    }

    /// The per-type hash suffixes currently stored for a user
    async fn scan_user_suffixes(
        &self,
        user_id: &str,
        ctx: &TimeoutContext,
    ) -> Result<BTreeSet<String>> {
        ctx.check()?;

        let mut conn = self.redis.clone();
        let key_prefix = format!("{}:permissions:{}:", self.key_prefix, user_id);
        let pattern = format!("{key_prefix}*");

        let mut suffixes = BTreeSet::new();
        {
            let mut keys = conn
                .scan_match::<_, String>(pattern)
                .await
                .context(RedisSnafu {
                    message: "Failed to scan user permission keys",
                })?;

            while let Some(key) = keys.next_item().await {
                let Some(suffix) = key.strip_prefix(&key_prefix) else {
                    continue;
                };
                if suffix.ends_with(STAGING_SUFFIX) {
                    continue;
                }
                let _ = suffixes.insert(suffix.to_owned());
            }
        }

        Ok(suffixes)
    }

    /// The role names a user is currently recorded with
    async fn stored_roles(&self, user_id: &str, ctx: &TimeoutContext) -> Result<BTreeSet<String>> {
        ctx.check()?;

        let mut conn = self.redis.clone();
        let roles: Vec<String> = conn
            .hkeys(self.resources_key(user_id, &ResourceType::ROLE.key_suffix()))
            .await
            .context(RedisSnafu {
                message: "Failed to read stored roles",
            })?;

        Ok(roles.into_iter().collect())
    }

    /// Milliseconds of the redis server clock
    async fn server_time_millis(&self) -> Result<i64> {
        let mut conn = self.redis.clone();
        let (secs, micros): (i64, i64) =
            redis::cmd("TIME")
                .query_async(&mut conn)
                .await
                .context(RedisSnafu {
                    message: "Failed to read server time",
                })?;

        Ok(secs * 1000 + micros / 1000)
    }

    /// Read one stored record, without the unrestricted merge
    async fn fetch_record(
        &self,
        user_id: &str,
        ctx: &TimeoutContext,
    ) -> Result<Option<UserPermission>> {
        ctx.check()?;

        let mut conn = self.redis.clone();

        let is_known: bool = conn
            .sismember(self.users_key(), user_id)
            .await
            .context(RedisSnafu {
                message: "Failed to check user set membership",
            })?;
        if !is_known {
            return Ok(None);
        }

        let is_admin: bool = conn
            .sismember(self.admins_key(), user_id)
            .await
            .context(RedisSnafu {
                message: "Failed to check admin set membership",
            })?;

        let mut permission = UserPermission::new(UserId::from(user_id)).with_admin(is_admin);

        for suffix in self.scan_user_suffixes(user_id, ctx).await? {
            ctx.check()?;

            let resource_type = ResourceType::from_str(&suffix).context(StoredTypeSnafu)?;
            let key = self.resources_key(user_id, &suffix);

            // Incremental scan to bound peak memory on large hashes
            let mut entries = Vec::new();
            {
                let mut iter = conn
                    .hscan::<_, (String, String)>(key)
                    .await
                    .context(RedisSnafu {
                        message: "Failed to scan resource hash",
                    })?;
                while let Some((name, body)) = iter.next_item().await {
                    entries.push((name, body));
                }
            }

            for (name, body) in entries {
                let resource = self
                    .registry
                    .parse(&resource_type, &ResourceName::from(name.as_str()), &body)
                    .context(BodySnafu)?;
                permission.add_resource(resource);
            }
        }

        Ok(Some(permission))
    }

    async fn cached_unrestricted(&self) -> Result<Arc<UserPermission>> {
        self.cache
            .get_or_load(
                || async {
                    let mut conn = self.redis.clone();
                    let last_modified: Option<String> = conn
                        .get(self.last_modified_key())
                        .await
                        .context(RedisSnafu {
                            message: "Failed to read the unrestricted last_modified key",
                        })?;

                    Ok(last_modified
                        .and_then(|value| value.parse().ok())
                        .unwrap_or(0))
                },
                || async {
                    Ok(self
                        .fetch_record(UNRESTRICTED_USER_ID, &TimeoutContext::unbounded())
                        .await?
                        .unwrap_or_else(UserPermission::unrestricted))
                },
            )
            .await
    }

    async fn all_user_ids(&self, ctx: &TimeoutContext) -> Result<Vec<String>> {
        ctx.check()?;

        let mut conn = self.redis.clone();
        conn.smembers(self.users_key()).await.context(RedisSnafu {
            message: "Failed to list known users",
        })
    }

    async fn remove_user(&self, user_id: &str) -> Result<()> {
        let ctx = TimeoutContext::unbounded();
        let roles = self.stored_roles(user_id, &ctx).await?;
        let suffixes = self.scan_user_suffixes(user_id, &ctx).await?;

        let mut pipe = redis::pipe();
        let _ = pipe.atomic();
        let _ = pipe.srem(self.users_key(), user_id).ignore();
        let _ = pipe.srem(self.admins_key(), user_id).ignore();
        for role in &roles {
            let _ = pipe.srem(self.role_key(role), user_id).ignore();
        }
        for suffix in &suffixes {
            let _ = pipe.del(self.resources_key(user_id, suffix)).ignore();
        }

        let mut conn = self.redis.clone();
        let _: () = pipe.query_async(&mut conn).await.context(RedisSnafu {
            message: "Failed to remove user",
        })?;

        Ok(())
    }
}

#[async_trait]
impl PermissionsRepository for RedisRepository {
    #[tracing::instrument(skip_all, fields(user = %permission.id))]
    async fn put(&self, permission: &UserPermission) -> Result<()> {
        let user_id = permission.id.as_str();
        let ctx = TimeoutContext::unbounded();

        // Serialize every owned resource, grouped by key suffix
        let mut by_suffix: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
        for resource in permission.iter_resources() {
            let suffix = resource.resource_type().key_suffix();
            let body = resource.to_body().context(SerializeSnafu)?;
            by_suffix
                .entry(suffix)
                .or_default()
                .push((resource.name().as_str().to_owned(), body));
        }

        let previous_roles = self.stored_roles(user_id, &ctx).await?;
        let new_roles: BTreeSet<String> = permission
            .roles_held()
            .iter()
            .map(|group| group.as_str().to_owned())
            .collect();

        let stored_suffixes = self.scan_user_suffixes(user_id, &ctx).await?;
        let server_time = self.server_time_millis().await?;

        let mut pipe = redis::pipe();
        let _ = pipe.atomic();

        if permission.is_admin {
            let _ = pipe.sadd(self.admins_key(), user_id).ignore();
        } else {
            let _ = pipe.srem(self.admins_key(), user_id).ignore();
        }

        for removed in previous_roles.difference(&new_roles) {
            let _ = pipe.srem(self.role_key(removed), user_id).ignore();
        }
        for added in new_roles.difference(&previous_roles) {
            let _ = pipe.sadd(self.role_key(added), user_id).ignore();
        }

        for (suffix, entries) in &by_suffix {
            let staging = UserResourcesStagingKey {
                prefix: self.key_prefix.clone(),
                user_id: user_id.to_owned(),
                suffix: suffix.clone(),
            };
            let _ = pipe.del(&staging).ignore();
            let _ = pipe.hset_multiple(&staging, entries).ignore();
            let _ = pipe
                .cmd("RENAME")
                .arg(&staging)
                .arg(self.resources_key(user_id, suffix))
                .ignore();
        }

        // Hashes of types the user no longer owns
        for stale in stored_suffixes
            .iter()
            .filter(|suffix| !by_suffix.contains_key(*suffix))
        {
            let _ = pipe.del(self.resources_key(user_id, stale)).ignore();
        }

        let _ = pipe.sadd(self.users_key(), user_id).ignore();

        if permission.id.is_unrestricted() {
            let _ = pipe
                .set(self.last_modified_key(), server_time)
                .ignore();
        }

        let mut conn = self.redis.clone();
        let _: () = pipe.query_async(&mut conn).await.context(RedisSnafu {
            message: "Failed to write user permission",
        })?;

        Ok(())
    }

    #[tracing::instrument(skip_all, fields(users = permissions.len()))]
    async fn put_all(&self, permissions: HashMap<UserId, UserPermission>) -> Result<()> {
        for permission in permissions.values() {
            self.put(permission).await?;
        }

        // Orphan pruning: users in the store but absent from the input
        let ctx = TimeoutContext::unbounded();
        for user_id in self.all_user_ids(&ctx).await? {
            let id = UserId::from(user_id.as_str());
            if id.is_unrestricted() || permissions.contains_key(&id) {
                continue;
            }
            self.remove_user(&user_id).await?;
        }

        Ok(())
    }

    #[tracing::instrument(skip_all, fields(user = %id))]
    async fn get(&self, id: &UserId, ctx: &TimeoutContext) -> Result<Option<UserPermission>> {
        ctx.check()?;

        if id.is_unrestricted() {
            return Ok(Some((*self.cached_unrestricted().await?).clone()));
        }

        let Some(permission) = self.fetch_record(id.as_str(), ctx).await? else {
            return Ok(None);
        };

        let unrestricted = self.cached_unrestricted().await?;
        Ok(Some(merged_with_unrestricted(
            permission,
            Some(&unrestricted),
        )))
    }

    #[tracing::instrument(skip_all)]
    async fn get_all_by_id(
        &self,
        ctx: &TimeoutContext,
    ) -> Result<HashMap<UserId, UserPermission>> {
        let mut result = HashMap::new();

        for user_id in self.all_user_ids(ctx).await? {
            if let Some(permission) = self.fetch_record(&user_id, ctx).await? {
                let _ = result.insert(permission.id.clone(), permission);
            }
        }

        let unrestricted = result.get(&UserId::unrestricted()).cloned();
        Ok(result
            .into_iter()
            .map(|(id, permission)| {
                let merged = merged_with_unrestricted(permission, unrestricted.as_ref());
                (id, merged)
            })
            .collect())
    }

    #[tracing::instrument(skip_all)]
    async fn get_all_by_roles(
        &self,
        roles: Option<&[GroupName]>,
        ctx: &TimeoutContext,
    ) -> Result<HashMap<UserId, UserPermission>> {
        ctx.check()?;

        let Some(roles) = roles else {
            return self.get_all_by_id(ctx).await;
        };

        let unrestricted = self
            .fetch_record(UNRESTRICTED_USER_ID, ctx)
            .await?
            .unwrap_or_else(UserPermission::unrestricted);

        if roles.is_empty() {
            return Ok(HashMap::from([(UserId::unrestricted(), unrestricted)]));
        }

        let mut conn = self.redis.clone();
        let role_keys: Vec<RoleKey> = roles
            .iter()
            .map(|role| self.role_key(role.as_str()))
            .collect();
        let holders: Vec<String> = conn.sunion(role_keys).await.context(RedisSnafu {
            message: "Failed to union role member sets",
        })?;

        let mut result = HashMap::new();
        for user_id in holders {
            if let Some(permission) = self.fetch_record(&user_id, ctx).await? {
                let merged = merged_with_unrestricted(permission, Some(&unrestricted));
                let _ = result.insert(merged.id.clone(), merged);
            }
        }
        let _ = result.insert(UserId::unrestricted(), unrestricted);

        Ok(result)
    }

    #[tracing::instrument(skip_all, fields(user = %id))]
    async fn remove(&self, id: &UserId) -> Result<()> {
        self.remove_user(id.as_str()).await
    }
}
