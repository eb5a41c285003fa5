// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use serde::{Deserialize, Serialize};

/// The reserved id of the anonymous/unrestricted user record.
///
/// Its permissions are the minimum granted to any authenticated session. The
/// record is materialized like a regular user but is never removed by bulk
/// operations.
pub const UNRESTRICTED_USER_ID: &str = "__unrestricted_user__";

/// A user id as used by the identity provider and the repositories.
///
/// Ids compare case-insensitively and are stored lower-cased and trimmed.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(from = "String")]
pub struct UserId(String);

impl UserId {
    /// The id of the anonymous/unrestricted user
    pub fn unrestricted() -> Self {
        Self(UNRESTRICTED_USER_ID.to_owned())
    }

    pub fn is_unrestricted(&self) -> bool {
        self.0 == UNRESTRICTED_USER_ID
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value.trim().to_lowercase())
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::from(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn ids_are_case_insensitive() {
        assert_eq!(UserId::from("Alice@example.com "), UserId::from("alice@example.com"));
    }

    #[test]
    fn recognizes_the_reserved_id() {
        assert!(UserId::unrestricted().is_unrestricted());
        assert!(UserId::from("__UNRESTRICTED_USER__").is_unrestricted());
        assert!(!UserId::from("alice").is_unrestricted());
    }
}
