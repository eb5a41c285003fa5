// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use serde::{Deserialize, Serialize};

/// A single action a user may be granted on a resource.
///
/// This is a closed enumeration; external systems deliver these as strings in
/// any casing, see the [`std::str::FromStr`] implementation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Authorization {
    Read,
    Write,
    Execute,
    Create,
    Delete,
}

impl Authorization {
    /// All known authorizations, the result of
    /// [`Permissions::authorizations_for`](crate::Permissions::authorizations_for)
    /// on an unrestricted permission map.
    pub const ALL: [Authorization; 5] = [
        Authorization::Read,
        Authorization::Write,
        Authorization::Execute,
        Authorization::Create,
        Authorization::Delete,
    ];
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(Authorization::from_str("READ"), Ok(Authorization::Read));
        assert_eq!(Authorization::from_str("write"), Ok(Authorization::Write));
        assert_eq!(
            Authorization::from_str("Execute"),
            Ok(Authorization::Execute)
        );
        assert!(Authorization::from_str("OWN").is_err());
    }

    #[test]
    fn serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&Authorization::Create).unwrap(),
            "\"CREATE\""
        );
        assert_eq!(
            serde_json::from_str::<Authorization>("\"DELETE\"").unwrap(),
            Authorization::Delete
        );
    }
}
