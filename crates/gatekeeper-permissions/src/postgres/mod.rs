// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Relational [`PermissionsRepository`] over the three permission tables.
//!
//! Writes are delta-aware: resource bodies are only rewritten when their
//! SHA-256 changed, permission rows are applied as set differences, and the
//! user row's `updated_at` is bumped last so the unrestricted cache can key
//! off it. Each `put` runs in one transaction and is retried a bounded
//! number of times on transient errors; reads use a longer retry policy and
//! no transactions.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    future::Future,
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use diesel_async::{scoped_futures::ScopedFutureExt, AsyncConnection};
use gatekeeper_database::{DatabaseError, Db};
use gatekeeper_db_storage::{
    body_hash, now_millis, permissions::PermissionRow, resources::ResourceRow, users::UserRow,
};
use gatekeeper_types::{
    GroupName, Resource, ResourceFactoryRegistry, ResourceName, ResourceType, UserId,
    UserPermission,
};
use snafu::ResultExt;

use crate::{
    merged_with_unrestricted, BodySnafu, DatabaseSnafu, PermissionsRepository, Result,
    SerializeSnafu, StoredTypeSnafu, TimeoutContext, UnrestrictedPermissionCache,
};

use async_trait::async_trait;

/// Fixed-interval retry for database operations
#[derive(Debug, Clone, Copy)]
struct FixedRetry {
    attempts: u32,
    delay: Duration,
}

impl FixedRetry {
    async fn run<T, F, Fut>(&self, operation: F) -> std::result::Result<T, DatabaseError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, DatabaseError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < self.attempts => {
                    log::debug!(
                        "database attempt {attempt}/{} failed, retrying in {:?}: {error}",
                        self.attempts,
                        self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Everything a `put` writes, precomputed outside the transaction
struct WritePlan {
    user_id: String,
    admin: bool,
    /// Per resource type: the serialized rows, hash already computed
    resources_by_type: BTreeMap<String, Vec<ResourceRow>>,
    /// The full `(type, name)` ownership set of the user
    pairs: BTreeSet<(String, String)>,
}

/// The permission-row difference between the stored and the incoming set
fn permission_delta(
    existing: &BTreeSet<(String, String)>,
    incoming: &BTreeSet<(String, String)>,
) -> (
    Vec<(String, String)>,
    BTreeMap<String, Vec<String>>,
) {
    let to_insert = incoming.difference(existing).cloned().collect();

    let mut to_delete: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (resource_type, name) in existing.difference(incoming) {
        to_delete
            .entry(resource_type.clone())
            .or_default()
            .push(name.clone());
    }

    (to_insert, to_delete)
}

/// [`PermissionsRepository`] backed by postgres.
pub struct PostgresRepository {
    db: Arc<Db>,
    registry: ResourceFactoryRegistry,
    cache: UnrestrictedPermissionCache,
    write_retry: FixedRetry,
    read_retry: FixedRetry,
}

impl std::fmt::Debug for PostgresRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresRepository").finish_non_exhaustive()
    }
}

impl PostgresRepository {
    pub fn new(
        db: Arc<Db>,
        registry: ResourceFactoryRegistry,
        unrestricted_cache_ttl: Duration,
    ) -> Self {
        Self {
            db,
            registry,
            cache: UnrestrictedPermissionCache::new(unrestricted_cache_ttl),
            write_retry: FixedRetry {
                attempts: 3,
                delay: Duration::from_millis(500),
            },
            read_retry: FixedRetry {
                attempts: 5,
                delay: Duration::from_secs(1),
            },
        }
    }

    fn plan(&self, permission: &UserPermission) -> Result<WritePlan> {
        let now = now_millis();
        let mut resources_by_type: BTreeMap<String, Vec<ResourceRow>> = BTreeMap::new();
        let mut pairs = BTreeSet::new();

        for resource in permission.iter_resources() {
            let resource_type = resource.resource_type().as_str().to_owned();
            let name = resource.name().as_str().to_owned();
            let body = resource.to_body().context(SerializeSnafu)?;
            let hash = body_hash(&body);

            let _ = pairs.insert((resource_type.clone(), name.clone()));
            resources_by_type
                .entry(resource_type.clone())
                .or_default()
                .push(ResourceRow {
                    resource_type,
                    resource_name: name,
                    body,
                    body_hash: Some(hash),
                    updated_at: Some(now),
                });
        }

        Ok(WritePlan {
            user_id: permission.id.as_str().to_owned(),
            admin: permission.is_admin,
            resources_by_type,
            pairs,
        })
    }

    async fn apply(&self, plan: &WritePlan) -> std::result::Result<(), DatabaseError> {
        let mut conn = self.db.get_conn().await?;

        conn.transaction::<_, DatabaseError, _>(|conn| {
            async move {
                // 1. Upsert resource bodies whose hash moved
                for (resource_type, rows) in &plan.resources_by_type {
                    let names: Vec<String> =
                        rows.iter().map(|row| row.resource_name.clone()).collect();
                    let stored: HashMap<String, Option<String>> =
                        ResourceRow::get_hashes_by_type(conn, resource_type, &names)
                            .await?
                            .into_iter()
                            .collect();

                    let changed: Vec<ResourceRow> = rows
                        .iter()
                        .filter(|row| stored.get(&row.resource_name) != Some(&row.body_hash))
                        .cloned()
                        .collect();

                    ResourceRow::upsert_all(conn, &changed).await?;
                }

                // 2. Replace permission rows as a delta
                let existing: BTreeSet<(String, String)> =
                    PermissionRow::get_for_user(conn, &plan.user_id)
                        .await?
                        .into_iter()
                        .collect();
                let (to_insert, to_delete) = permission_delta(&existing, &plan.pairs);

                let insert_rows: Vec<PermissionRow> = to_insert
                    .into_iter()
                    .map(|(resource_type, resource_name)| PermissionRow {
                        user_id: plan.user_id.clone(),
                        resource_type,
                        resource_name,
                    })
                    .collect();
                PermissionRow::insert_all(conn, &insert_rows).await?;

                for (resource_type, names) in &to_delete {
                    PermissionRow::delete_for_user_by_type(
                        conn,
                        &plan.user_id,
                        resource_type,
                        names,
                    )
                    .await?;
                }

                // 3. Bump the user row last; this is what the unrestricted
                // cache keys off
                UserRow {
                    id: plan.user_id.clone(),
                    admin: plan.admin,
                    updated_at: now_millis(),
                }
                .upsert(conn)
                .await?;

                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    fn parse_rows(&self, rows: Vec<ResourceRow>) -> Result<Vec<Resource>> {
        rows.into_iter()
            .map(|row| {
                let resource_type =
                    ResourceType::from_str(&row.resource_type).context(StoredTypeSnafu)?;
                self.registry
                    .parse(
                        &resource_type,
                        &ResourceName::from(row.resource_name.as_str()),
                        &row.body,
                    )
                    .context(BodySnafu)
            })
            .collect()
    }

    async fn fetch_rows(
        &self,
        user_id: &str,
    ) -> std::result::Result<Option<(UserRow, Vec<ResourceRow>)>, DatabaseError> {
        use gatekeeper_database::OptionalExt;

        let mut conn = self.db.get_conn().await?;

        let Some(user) = UserRow::get(&mut conn, user_id).await.optional()? else {
            return Ok(None);
        };
        let resources = ResourceRow::get_for_user(&mut conn, user_id).await?;

        Ok(Some((user, resources)))
    }

    fn assemble(&self, user: UserRow, rows: Vec<ResourceRow>) -> Result<UserPermission> {
        let mut permission =
            UserPermission::new(UserId::from(user.id.as_str())).with_admin(user.admin);
        permission.add_resources(self.parse_rows(rows)?);
        Ok(permission)
    }

    /// The unrestricted record straight from the backend (no cache)
    async fn fetch_unrestricted(&self) -> Result<UserPermission> {
        let fetched = self
            .read_retry
            .run(|| self.fetch_rows(gatekeeper_types::UNRESTRICTED_USER_ID))
            .await
            .context(DatabaseSnafu)?;

        match fetched {
            Some((user, rows)) => self.assemble(user, rows),
            None => Ok(UserPermission::unrestricted()),
        }
    }

    async fn cached_unrestricted(&self) -> Result<Arc<UserPermission>> {
        self.cache
            .get_or_load(
                || async {
                    let updated_at = self
                        .read_retry
                        .run(|| async {
                            let mut conn = self.db.get_conn().await?;
                            UserRow::get_updated_at(
                                &mut conn,
                                gatekeeper_types::UNRESTRICTED_USER_ID,
                            )
                            .await
                        })
                        .await
                        .context(DatabaseSnafu)?;
                    Ok(updated_at.unwrap_or(0))
                },
                || self.fetch_unrestricted(),
            )
            .await
    }

    /// Group permission rows and resource bodies into per-user records
    fn assemble_all(
        &self,
        users: Vec<UserRow>,
        permission_rows: Vec<PermissionRow>,
        resource_rows: Vec<ResourceRow>,
    ) -> Result<HashMap<UserId, UserPermission>> {
        let mut bodies: HashMap<(String, String), Resource> = HashMap::new();
        for row in resource_rows {
            let key = (row.resource_type.clone(), row.resource_name.clone());
            let resource_type =
                ResourceType::from_str(&row.resource_type).context(StoredTypeSnafu)?;
            let resource = self
                .registry
                .parse(
                    &resource_type,
                    &ResourceName::from(row.resource_name.as_str()),
                    &row.body,
                )
                .context(BodySnafu)?;
            let _ = bodies.insert(key, resource);
        }

        let mut ownership: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for row in permission_rows {
            ownership
                .entry(row.user_id)
                .or_default()
                .push((row.resource_type, row.resource_name));
        }

        let mut result = HashMap::new();
        for user in users {
            let mut permission =
                UserPermission::new(UserId::from(user.id.as_str())).with_admin(user.admin);
            for pair in ownership.remove(&user.id).unwrap_or_default() {
                if let Some(resource) = bodies.get(&pair) {
                    permission.add_resource(resource.clone());
                }
            }
            let _ = result.insert(permission.id.clone(), permission);
        }

        // Merge the unrestricted record from the same result set
        let unrestricted = result.get(&UserId::unrestricted()).cloned();
        Ok(result
            .into_iter()
            .map(|(id, permission)| {
                let merged = merged_with_unrestricted(permission, unrestricted.as_ref());
                (id, merged)
            })
            .collect())
    }

    async fn prune_orphans(&self, keep: Vec<String>) -> std::result::Result<(), DatabaseError> {
        let mut conn = self.db.get_conn().await?;

        conn.transaction::<_, DatabaseError, _>(|conn| {
            async move {
                let removed = UserRow::delete_all_except(conn, &keep).await?;
                if !removed.is_empty() {
                    log::info!("pruned {} users no longer known upstream", removed.len());
                }

                let collected = ResourceRow::delete_unreferenced(conn).await?;
                if collected > 0 {
                    log::debug!("garbage-collected {collected} unreferenced resources");
                }

                Ok(())
            }
            .scope_boxed()
        })
        .await
    }
}

#[async_trait]
impl PermissionsRepository for PostgresRepository {
    #[tracing::instrument(skip_all, fields(user = %permission.id))]
    async fn put(&self, permission: &UserPermission) -> Result<()> {
        let plan = self.plan(permission)?;
        self.write_retry
            .run(|| self.apply(&plan))
            .await
            .context(DatabaseSnafu)
    }

    #[tracing::instrument(skip_all, fields(users = permissions.len()))]
    async fn put_all(&self, permissions: HashMap<UserId, UserPermission>) -> Result<()> {
        let mut keep: Vec<String> = permissions
            .keys()
            .map(|id| id.as_str().to_owned())
            .collect();
        keep.push(gatekeeper_types::UNRESTRICTED_USER_ID.to_owned());

        for permission in permissions.values() {
            self.put(permission).await?;
        }

        // Orphan pruning runs only after every per-user upsert succeeded
        self.write_retry
            .run(|| self.prune_orphans(keep.clone()))
            .await
            .context(DatabaseSnafu)
    }

    #[tracing::instrument(skip_all, fields(user = %id))]
    async fn get(&self, id: &UserId, ctx: &TimeoutContext) -> Result<Option<UserPermission>> {
        ctx.check()?;

        if id.is_unrestricted() {
            return Ok(Some((*self.cached_unrestricted().await?).clone()));
        }

        let fetched = self
            .read_retry
            .run(|| self.fetch_rows(id.as_str()))
            .await
            .context(DatabaseSnafu)?;

        let Some((user, rows)) = fetched else {
            return Ok(None);
        };

        let permission = self.assemble(user, rows)?;
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
        ctx.check()?;

        let (users, permission_rows, resource_rows) = self
            .read_retry
            .run(|| async {
                let mut conn = self.db.get_conn().await?;
                let users = UserRow::get_all(&mut conn).await?;
                let ids: Vec<String> = users.iter().map(|user| user.id.clone()).collect();
                let permission_rows = PermissionRow::get_for_users(&mut conn, &ids).await?;
                let resource_rows = ResourceRow::get_for_users(&mut conn, &ids).await?;
                Ok((users, permission_rows, resource_rows))
            })
            .await
            .context(DatabaseSnafu)?;

        self.assemble_all(users, permission_rows, resource_rows)
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

        if roles.is_empty() {
            let unrestricted = self.fetch_unrestricted().await?;
            return Ok(HashMap::from([(UserId::unrestricted(), unrestricted)]));
        }

        let role_names: Vec<String> = roles
            .iter()
            .map(|role| role.as_str().to_owned())
            .collect();

        let (users, permission_rows, resource_rows) = self
            .read_retry
            .run(|| async {
                let mut conn = self.db.get_conn().await?;

                let mut holders = PermissionRow::get_role_holders(&mut conn, &role_names).await?;
                let unrestricted_id = gatekeeper_types::UNRESTRICTED_USER_ID.to_owned();
                if !holders.contains(&unrestricted_id) {
                    holders.push(unrestricted_id);
                }

                let users = UserRow::get_all_by_ids(&mut conn, &holders).await?;
                let permission_rows = PermissionRow::get_for_users(&mut conn, &holders).await?;
                let resource_rows = ResourceRow::get_for_users(&mut conn, &holders).await?;
                Ok((users, permission_rows, resource_rows))
            })
            .await
            .context(DatabaseSnafu)?;

        self.assemble_all(users, permission_rows, resource_rows)
    }

    #[tracing::instrument(skip_all, fields(user = %id))]
    async fn remove(&self, id: &UserId) -> Result<()> {
        let user_id = id.as_str().to_owned();

        self.write_retry
            .run(|| async {
                let mut conn = self.db.get_conn().await?;
                conn.transaction::<_, DatabaseError, _>(|conn| {
                    async {
                        PermissionRow::delete_all_for_user(conn, &user_id).await?;
                        UserRow::delete_by_id(conn, &user_id).await?;
                        Ok(())
                    }
                    .scope_boxed()
                })
                .await
            })
            .await
            .context(DatabaseSnafu)
    }
}
