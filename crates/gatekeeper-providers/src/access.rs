// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Permission sources: where a resource's effective access rules come from.
//!
//! The declared rules on the resource itself are the primary source;
//! deployments may configure additional name-prefix rules which are unioned
//! in. Sources only see access-controlled resources.

use gatekeeper_controller_settings::GroupPrefixRule;
use gatekeeper_types::{Permissions, Resource};

/// Computes a contribution to a resource's effective [`Permissions`].
pub trait ResourcePermissionSource: Send + Sync {
    /// The rules this source contributes for `resource`, if any
    fn permissions_for(&self, resource: &Resource) -> Option<Permissions>;
}

/// The rules the resource itself declares in the inventory.
#[derive(Debug, Default)]
pub struct DeclaredPermissionSource;

impl ResourcePermissionSource for DeclaredPermissionSource {
    fn permissions_for(&self, resource: &Resource) -> Option<Permissions> {
        resource.permissions().cloned()
    }
}

/// Configured rules granting groups an authorization on every resource whose
/// name starts with a prefix.
#[derive(Debug)]
pub struct GroupPrefixPermissionSource {
    rules: Vec<GroupPrefixRule>,
}

impl GroupPrefixPermissionSource {
    pub fn new(rules: Vec<GroupPrefixRule>) -> Self {
        Self { rules }
    }
}

impl ResourcePermissionSource for GroupPrefixPermissionSource {
    fn permissions_for(&self, resource: &Resource) -> Option<Permissions> {
        let matching = self
            .rules
            .iter()
            .filter(|rule| resource.name().as_str().starts_with(&rule.prefix))
            .fold(Permissions::builder(), |builder, rule| {
                builder.add(rule.authorization, rule.groups.iter().map(String::as_str))
            })
            .build();

        matching.is_restricted().then_some(matching)
    }
}

/// Unions all configured sources into a resource's effective rules.
pub struct AggregatingPermissionSource {
    sources: Vec<Box<dyn ResourcePermissionSource>>,
}

impl std::fmt::Debug for AggregatingPermissionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatingPermissionSource")
            .field("sources", &self.sources.len())
            .finish()
    }
}

impl Default for AggregatingPermissionSource {
    fn default() -> Self {
        Self {
            sources: vec![Box::new(DeclaredPermissionSource)],
        }
    }
}

impl AggregatingPermissionSource {
    pub fn new(sources: Vec<Box<dyn ResourcePermissionSource>>) -> Self {
        Self { sources }
    }

    /// Declared rules plus the configured prefix rules
    pub fn with_prefix_rules(rules: Vec<GroupPrefixRule>) -> Self {
        Self {
            sources: vec![
                Box::new(DeclaredPermissionSource),
                Box::new(GroupPrefixPermissionSource::new(rules)),
            ],
        }
    }

    /// Rewrite each access-controlled resource with the union of all source
    /// contributions; other resources pass through unchanged.
    pub fn apply(&self, resources: Vec<Resource>) -> Vec<Resource> {
        resources
            .into_iter()
            .map(|resource| {
                if !resource.is_access_controlled() {
                    return resource;
                }

                let effective = self
                    .sources
                    .iter()
                    .filter_map(|source| source.permissions_for(&resource))
                    .fold(Permissions::unrestricted(), |acc, contribution| {
                        acc.merged_with(&contribution)
                    });

                resource.with_permissions(effective)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use gatekeeper_types::{Account, Authorization, GroupName, Role};
    use pretty_assertions::assert_eq;

    use super::*;

    fn prefix_rule(prefix: &str, authorization: Authorization, groups: &[&str]) -> GroupPrefixRule {
        GroupPrefixRule {
            prefix: prefix.to_owned(),
            authorization,
            groups: groups.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    #[test]
    fn prefix_rules_union_with_declared_rules() {
        let source = AggregatingPermissionSource::with_prefix_rules(vec![prefix_rule(
            "prod",
            Authorization::Read,
            &["sre"],
        )]);

        let resources = source.apply(vec![Resource::Account(
            Account::new("prod-eu").with_permissions(
                Permissions::builder()
                    .add(Authorization::Write, ["ops"])
                    .build(),
            ),
        )]);

        let permissions = resources[0].permissions().unwrap();
        assert_eq!(
            permissions.get(Authorization::Read),
            &std::collections::BTreeSet::from([GroupName::from("sre")])
        );
        assert_eq!(
            permissions.get(Authorization::Write),
            &std::collections::BTreeSet::from([GroupName::from("ops")])
        );
    }

    #[test]
    fn non_matching_resources_stay_unrestricted() {
        let source = AggregatingPermissionSource::with_prefix_rules(vec![prefix_rule(
            "prod",
            Authorization::Read,
            &["sre"],
        )]);

        let resources = source.apply(vec![Resource::Account(Account::new("sandbox"))]);

        assert!(!resources[0].permissions().unwrap().is_restricted());
    }

    #[test]
    fn roles_pass_through_untouched() {
        let source = AggregatingPermissionSource::with_prefix_rules(vec![prefix_rule(
            "",
            Authorization::Read,
            &["everyone"],
        )]);

        let role = Resource::Role(Role::new("ops"));
        let resources = source.apply(vec![role.clone()]);

        assert_eq!(resources[0], role);
    }
}
