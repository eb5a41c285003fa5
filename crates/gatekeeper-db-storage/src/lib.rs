// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Contains the database structs and queries of the permission store.
//!
//! The store keeps three tables: `users` (one row per synced user),
//! `resources` (deduplicated JSON bodies shared across users) and
//! `permissions` (which user owns which resource). The repository logic on
//! top lives in `gatekeeper-permissions`.

pub mod migrations;
pub mod permissions;
pub mod resources;
pub mod schema;
pub mod users;

/// Epoch milliseconds of the database server's wall clock as seen from this
/// process; used for every `updated_at` column.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Base16 SHA-256 of a resource body, the value of `resources.body_hash`.
pub fn body_hash(body: &str) -> String {
    use sha2::{Digest, Sha256};

    hex::encode(Sha256::digest(body.as_bytes()))
}
