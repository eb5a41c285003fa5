// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::time::Duration;

use deadpool_runtime::Runtime;
use diesel_async::{
    pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager},
    AsyncPgConnection,
};
use snafu::Report;

use crate::{DatabaseError, DbConnection};

type DbPool = Pool<AsyncPgConnection>;

/// Db container that uses a connection pool to hand out connections
pub struct Db {
    pool: DbPool,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Db")
    }
}

impl Db {
    /// Creates a new Db instance from the specified database settings.
    #[tracing::instrument(skip(db_settings))]
    pub fn connect(
        db_settings: &gatekeeper_controller_settings::Database,
    ) -> crate::Result<Self> {
        Self::connect_url(&db_settings.url, db_settings.max_connections)
    }

    /// Creates a new Db instance from the specified database url.
    pub fn connect_url(db_url: &str, max_conns: u32) -> crate::Result<Self> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(db_url);

        let pool = Pool::builder(manager)
            .max_size(max_conns as usize)
            .create_timeout(Some(Duration::from_secs(10)))
            .runtime(Runtime::Tokio1)
            .build()?;

        Ok(Self { pool })
    }

    /// Returns an established connection from the connection pool
    #[tracing::instrument(skip_all)]
    pub async fn get_conn(&self) -> crate::Result<DbConnection> {
        match self.pool.get().await {
            Ok(conn) => Ok(conn),
            Err(e) => {
                let state = self.pool.status();
                log::error!(
                    "Unable to get connection from connection pool. Error: {} Pool State: {state:?}",
                    Report::from_error(&e)
                );
                Err(DatabaseError::DeadpoolError { source: e })
            }
        }
    }
}
