// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Resource body rows, shared and deduplicated across users

use diesel::{
    dsl::{exists, not},
    upsert::excluded,
    BoolExpressionMethods, ExpressionMethods, JoinOnDsl, QueryDsl, Queryable, Selectable,
    SelectableHelper,
};
use diesel_async::RunQueryDsl;
use gatekeeper_database::{DbConnection, Result};

use super::schema::{permissions, resources};

/// Diesel resource struct
///
/// `body` is the serialized resource; `body_hash` is its base16 SHA-256,
/// used to skip rewriting unchanged bodies.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, diesel::Insertable)]
#[diesel(table_name = resources)]
pub struct ResourceRow {
    pub resource_type: String,
    pub resource_name: String,
    pub body: String,
    pub body_hash: Option<String>,
    pub updated_at: Option<i64>,
}

impl ResourceRow {
    /// The stored `(name, body_hash)` pairs of one resource type
    #[tracing::instrument(err, skip_all, fields(%resource_type))]
    pub async fn get_hashes_by_type(
        conn: &mut DbConnection,
        resource_type: &str,
        names: &[String],
    ) -> Result<Vec<(String, Option<String>)>> {
        let hashes = resources::table
            .filter(
                resources::resource_type
                    .eq(resource_type)
                    .and(resources::resource_name.eq_any(names)),
            )
            .select((resources::resource_name, resources::body_hash))
            .load(conn)
            .await?;

        Ok(hashes)
    }

    /// Insert or rewrite bodies, keyed by `(resource_type, resource_name)`
    #[tracing::instrument(err, skip_all, fields(rows = rows.len()))]
    pub async fn upsert_all(conn: &mut DbConnection, rows: &[ResourceRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let _ = diesel::insert_into(resources::table)
            .values(rows)
            .on_conflict((resources::resource_type, resources::resource_name))
            .do_update()
            .set((
                resources::body.eq(excluded(resources::body)),
                resources::body_hash.eq(excluded(resources::body_hash)),
                resources::updated_at.eq(excluded(resources::updated_at)),
            ))
            .execute(conn)
            .await?;

        Ok(())
    }

    /// All bodies owned by `user_id`, via semi-join through `permissions`
    #[tracing::instrument(err, skip_all, fields(%user_id))]
    pub async fn get_for_user(conn: &mut DbConnection, user_id: &str) -> Result<Vec<Self>> {
        let rows = resources::table
            .inner_join(
                permissions::table.on(permissions::resource_type
                    .eq(resources::resource_type)
                    .and(permissions::resource_name.eq(resources::resource_name))),
            )
            .filter(permissions::user_id.eq(user_id))
            .select(ResourceRow::as_select())
            .load(conn)
            .await?;

        Ok(rows)
    }

    /// The distinct bodies reachable from any permission row of `user_ids`
    #[tracing::instrument(err, skip_all, fields(users = user_ids.len()))]
    pub async fn get_for_users(
        conn: &mut DbConnection,
        user_ids: &[String],
    ) -> Result<Vec<Self>> {
        let rows = resources::table
            .inner_join(
                permissions::table.on(permissions::resource_type
                    .eq(resources::resource_type)
                    .and(permissions::resource_name.eq(resources::resource_name))),
            )
            .filter(permissions::user_id.eq_any(user_ids))
            .select(ResourceRow::as_select())
            .distinct()
            .load(conn)
            .await?;

        Ok(rows)
    }

    /// Garbage-collect bodies no surviving permission row references
    #[tracing::instrument(err, skip_all)]
    pub async fn delete_unreferenced(conn: &mut DbConnection) -> Result<usize> {
        let removed = diesel::delete(
            resources::table.filter(not(exists(
                permissions::table.filter(
                    permissions::resource_type
                        .eq(resources::resource_type)
                        .and(permissions::resource_name.eq(resources::resource_name)),
                ),
            ))),
        )
        .execute(conn)
        .await?;

        Ok(removed)
    }
}
