// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use serde::{Deserialize, Serialize};

use super::ResourceName;
use crate::GroupName;

/// Where a role membership was learned from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleSource {
    /// Supplied by a caller rather than the identity provider; survives syncs
    External,
    Directory,
    TeamService,
    Ldap,
    #[serde(untagged)]
    Other(String),
}

/// A group membership, stored as a resource so that role-filtered bulk reads
/// can be answered by the repository alone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub name: ResourceName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<RoleSource>,
}

impl Role {
    pub fn new(name: impl Into<ResourceName>) -> Self {
        Self {
            name: name.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: RoleSource) -> Self {
        self.source = Some(source);
        self
    }

    /// `true` when the role was supplied from outside the identity provider
    pub fn is_external(&self) -> bool {
        self.source == Some(RoleSource::External)
    }

    /// The group this role membership stands for
    pub fn group_name(&self) -> GroupName {
        GroupName::from(self.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn source_round_trips() {
        let role = Role::new("deployers").with_source(RoleSource::External);
        let json = serde_json::to_string(&role).unwrap();
        assert_eq!(json, r#"{"name":"deployers","source":"EXTERNAL"}"#);
        assert_eq!(serde_json::from_str::<Role>(&json).unwrap(), role);

        let custom: Role =
            serde_json::from_str(r#"{"name":"auditors","source":"scim"}"#).unwrap();
        assert_eq!(custom.source, Some(RoleSource::Other("scim".to_owned())));
    }
}
