// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Database connector, interface and connection handling for the gatekeeper
//! relational permission store.

use diesel_async::{
    pooled_connection::deadpool::{BuildError, Object, PoolError},
    AsyncPgConnection,
};
use snafu::Snafu;

mod db;

pub use db::Db;

/// Pooled connection alias
pub type DbConnection = Object<AsyncPgConnection>;

/// Result type using [`DatabaseError`] as a default Error
pub type Result<T, E = DatabaseError> = std::result::Result<T, E>;

/// Error types for the database abstraction
#[derive(Debug, Snafu)]
pub enum DatabaseError {
    #[snafu(display("Diesel Error: `{source}`"))]
    DieselError { source: diesel::result::Error },

    #[snafu(display("A requested resource could not be found"))]
    NotFound,

    #[snafu(display("Deadpool build error: `{source}`"), context(false))]
    DeadpoolBuildError { source: BuildError },

    #[snafu(display("Deadpool error: `{source}`"))]
    DeadpoolError { source: PoolError },

    #[snafu(context(false))]
    UrlParseError { source: url::ParseError },
}

impl DatabaseError {
    /// Returns `true` if the database error is [`NotFound`].
    ///
    /// [`NotFound`]: DatabaseError::NotFound
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Returns `true` for errors that a bounded retry may recover from
    /// (broken connections, pool exhaustion, serialization failures).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::DieselError {
                source: diesel::result::Error::DatabaseError(kind, _),
            } => matches!(
                kind,
                diesel::result::DatabaseErrorKind::ClosedConnection
                    | diesel::result::DatabaseErrorKind::SerializationFailure
            ),
            Self::DieselError {
                source: diesel::result::Error::BrokenTransactionManager,
            } => true,
            Self::DeadpoolError { .. } => true,
            _ => false,
        }
    }
}

impl From<diesel::result::Error> for DatabaseError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => Self::NotFound,
            source => Self::DieselError { source },
        }
    }
}

pub trait OptionalExt<T, E> {
    fn optional(self) -> Result<Option<T>, E>;
}

impl<T> OptionalExt<T, DatabaseError> for Result<T, DatabaseError> {
    fn optional(self) -> Result<Option<T>, DatabaseError> {
        match self {
            Ok(t) => Ok(Some(t)),
            Err(DatabaseError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
