// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::collections::{BTreeSet, HashMap};

use gatekeeper_types::{GroupName, Resource};

/// Group->resource multimap over every restricted resource of every provider.
///
/// Built once per batch resolve and thrown away afterwards. Resources with
/// no group guards (the unrestricted ones) are not indexed; they enter
/// records through the repository's unrestricted-record merge instead.
#[derive(Debug, Default)]
pub struct AccessControlIndex {
    by_group: HashMap<GroupName, Vec<Resource>>,
    /// Every indexed resource, what an admin gets
    restricted: Vec<Resource>,
    /// Resources granted regardless of roles (unknown-application policy)
    granted_to_all: Vec<Resource>,
}

impl AccessControlIndex {
    /// Index `resource` under each group that grants access to it
    pub fn insert(&mut self, resource: Resource) {
        let Some(groups) = resource.required_groups() else {
            return;
        };

        for group in &groups {
            self.by_group
                .entry(group.clone())
                .or_default()
                .push(resource.clone());
        }
        self.restricted.push(resource);
    }

    /// Record a resource every user receives independent of their roles
    pub fn insert_granted_to_all(&mut self, resource: Resource) {
        self.granted_to_all.push(resource);
    }

    /// The resources a member of `groups` may access
    pub fn resources_for(&self, groups: &BTreeSet<GroupName>, is_admin: bool) -> Vec<Resource> {
        let mut resources = self.granted_to_all.clone();

        if is_admin {
            resources.extend(self.restricted.iter().cloned());
        } else {
            resources.extend(
                groups
                    .iter()
                    .filter_map(|group| self.by_group.get(group))
                    .flatten()
                    .cloned(),
            );
        }

        resources
    }
}

#[cfg(test)]
mod tests {
    use gatekeeper_types::{Account, Application, Authorization, Permissions};
    use pretty_assertions::assert_eq;

    use super::*;

    fn groups(names: &[&str]) -> BTreeSet<GroupName> {
        names.iter().copied().map(GroupName::from).collect()
    }

    #[test]
    fn indexes_by_every_guarding_group() {
        let mut index = AccessControlIndex::default();
        index.insert(Resource::Account(
            Account::new("prod").with_permissions(
                Permissions::builder()
                    .add(Authorization::Read, ["group1"])
                    .add(Authorization::Write, ["group2"])
                    .build(),
            ),
        ));
        index.insert(Resource::Account(Account::new("open")));

        assert_eq!(index.resources_for(&groups(&["group1"]), false).len(), 1);
        assert_eq!(index.resources_for(&groups(&["group2"]), false).len(), 1);
        assert!(index.resources_for(&groups(&["other"]), false).is_empty());
        // Unrestricted resources are not indexed
        assert!(index.resources_for(&groups(&[]), false).is_empty());
    }

    #[test]
    fn admins_get_every_restricted_resource() {
        let mut index = AccessControlIndex::default();
        index.insert(Resource::Account(
            Account::new("a").with_permissions(
                Permissions::builder()
                    .add(Authorization::Read, ["group1"])
                    .build(),
            ),
        ));
        index.insert(Resource::Account(
            Account::new("b").with_permissions(
                Permissions::builder()
                    .add(Authorization::Read, ["group2"])
                    .build(),
            ),
        ));

        assert_eq!(index.resources_for(&groups(&[]), true).len(), 2);
    }

    #[test]
    fn granted_to_all_reaches_everyone() {
        let mut index = AccessControlIndex::default();
        index.insert_granted_to_all(Resource::Application(Application::new("anything")));

        assert_eq!(index.resources_for(&groups(&[]), false).len(), 1);
    }
}
