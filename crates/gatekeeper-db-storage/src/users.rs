// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Contains the user specific database structs and queries

use diesel::{ExpressionMethods, Identifiable, Insertable, QueryDsl, Queryable};
use diesel_async::RunQueryDsl;
use gatekeeper_database::{DbConnection, OptionalExt, Result};

use super::schema::users;

/// Diesel user struct
///
/// One row per synced user; `updated_at` is bumped last within a `put` so
/// the unrestricted-record cache can key off it.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Insertable)]
#[diesel(table_name = users)]
pub struct UserRow {
    pub id: String,
    pub admin: bool,
    pub updated_at: i64,
}

impl UserRow {
    /// Get a user with the given `id`
    ///
    /// If no user exists with `user_id` this returns an Error
    #[tracing::instrument(err, skip_all)]
    pub async fn get(conn: &mut DbConnection, user_id: &str) -> Result<Self> {
        let user = users::table
            .filter(users::id.eq(user_id))
            .get_result(conn)
            .await?;

        Ok(user)
    }

    /// Get all users
    #[tracing::instrument(err, skip_all)]
    pub async fn get_all(conn: &mut DbConnection) -> Result<Vec<Self>> {
        let users = users::table.get_results(conn).await?;

        Ok(users)
    }

    /// Get all users filtered by the given ids
    #[tracing::instrument(err, skip_all)]
    pub async fn get_all_by_ids(conn: &mut DbConnection, ids: &[String]) -> Result<Vec<Self>> {
        let users = users::table
            .filter(users::id.eq_any(ids))
            .load(conn)
            .await?;

        Ok(users)
    }

    /// The `updated_at` value of a user, `None` when the row does not exist
    #[tracing::instrument(err, skip_all)]
    pub async fn get_updated_at(conn: &mut DbConnection, user_id: &str) -> Result<Option<i64>> {
        users::table
            .select(users::updated_at)
            .filter(users::id.eq(user_id))
            .get_result(conn)
            .await
            .map_err(Into::into)
            .optional()
    }

    /// Insert or update the row, keyed by id
    #[tracing::instrument(err, skip_all)]
    pub async fn upsert(self, conn: &mut DbConnection) -> Result<()> {
        let _ = diesel::insert_into(users::table)
            .values(&self)
            .on_conflict(users::id)
            .do_update()
            .set((
                users::admin.eq(self.admin),
                users::updated_at.eq(self.updated_at),
            ))
            .execute(conn)
            .await?;

        Ok(())
    }

    /// Delete a user using the given id
    #[tracing::instrument(err, skip_all)]
    pub async fn delete_by_id(conn: &mut DbConnection, user_id: &str) -> Result<()> {
        let _ = diesel::delete(users::table.filter(users::id.eq(user_id)))
            .execute(conn)
            .await?;

        Ok(())
    }

    /// Delete every user whose id is not in `keep`; returns the removed ids
    #[tracing::instrument(err, skip_all)]
    pub async fn delete_all_except(
        conn: &mut DbConnection,
        keep: &[String],
    ) -> Result<Vec<String>> {
        let removed = diesel::delete(users::table.filter(users::id.ne_all(keep)))
            .returning(users::id)
            .get_results(conn)
            .await?;

        Ok(removed)
    }
}
