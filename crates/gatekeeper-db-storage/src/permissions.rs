// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Permission rows: which user owns which resource

use diesel::{BoolExpressionMethods, ExpressionMethods, QueryDsl, Queryable};
use diesel_async::RunQueryDsl;
use gatekeeper_database::{DbConnection, Result};

use super::schema::permissions;

/// Diesel permission struct
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Queryable, diesel::Insertable)]
#[diesel(table_name = permissions)]
pub struct PermissionRow {
    pub user_id: String,
    pub resource_type: String,
    pub resource_name: String,
}

impl PermissionRow {
    /// The `(resource_type, resource_name)` pairs owned by `user_id`
    #[tracing::instrument(err, skip_all, fields(%user_id))]
    pub async fn get_for_user(
        conn: &mut DbConnection,
        user_id: &str,
    ) -> Result<Vec<(String, String)>> {
        let pairs = permissions::table
            .filter(permissions::user_id.eq(user_id))
            .select((permissions::resource_type, permissions::resource_name))
            .load(conn)
            .await?;

        Ok(pairs)
    }

    /// All permission rows of the given users
    #[tracing::instrument(err, skip_all, fields(users = user_ids.len()))]
    pub async fn get_for_users(
        conn: &mut DbConnection,
        user_ids: &[String],
    ) -> Result<Vec<Self>> {
        let rows = permissions::table
            .filter(permissions::user_id.eq_any(user_ids))
            .load(conn)
            .await?;

        Ok(rows)
    }

    /// The distinct ids of users holding any of `roles` as a ROLE resource
    #[tracing::instrument(err, skip_all)]
    pub async fn get_role_holders(
        conn: &mut DbConnection,
        roles: &[String],
    ) -> Result<Vec<String>> {
        let holders = permissions::table
            .filter(
                permissions::resource_type
                    .eq("ROLE")
                    .and(permissions::resource_name.eq_any(roles)),
            )
            .select(permissions::user_id)
            .distinct()
            .load(conn)
            .await?;

        Ok(holders)
    }

    #[tracing::instrument(err, skip_all, fields(rows = rows.len()))]
    pub async fn insert_all(conn: &mut DbConnection, rows: &[PermissionRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let _ = diesel::insert_into(permissions::table)
            .values(rows)
            .on_conflict_do_nothing()
            .execute(conn)
            .await?;

        Ok(())
    }

    /// Delete the given names of one resource type for a user
    #[tracing::instrument(err, skip_all, fields(%user_id, %resource_type))]
    pub async fn delete_for_user_by_type(
        conn: &mut DbConnection,
        user_id: &str,
        resource_type: &str,
        names: &[String],
    ) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }

        let _ = diesel::delete(
            permissions::table.filter(
                permissions::user_id
                    .eq(user_id)
                    .and(permissions::resource_type.eq(resource_type))
                    .and(permissions::resource_name.eq_any(names)),
            ),
        )
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Delete every permission row of a user
    #[tracing::instrument(err, skip_all, fields(%user_id))]
    pub async fn delete_all_for_user(conn: &mut DbConnection, user_id: &str) -> Result<()> {
        let _ = diesel::delete(permissions::table.filter(permissions::user_id.eq(user_id)))
            .execute(conn)
            .await?;

        Ok(())
    }
}
