// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{Authorization, GroupName};

static NO_GROUPS: BTreeSet<GroupName> = BTreeSet::new();

/// The group-based access rules of a single resource.
///
/// Maps each [`Authorization`] to the set of groups whose members hold it.
/// Instances are immutable once built; use [`Permissions::builder`] to
/// construct one. A permission map without any group entry is *unrestricted*:
/// everyone holds every authorization on the resource.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Authorization, BTreeSet<GroupName>>")]
pub struct Permissions {
    #[serde(flatten)]
    grants: BTreeMap<Authorization, BTreeSet<GroupName>>,
}

impl Permissions {
    /// An unrestricted permission map
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn builder() -> PermissionsBuilder {
        PermissionsBuilder::default()
    }

    /// The groups holding `authorization`, empty when nobody is required
    pub fn get(&self, authorization: Authorization) -> &BTreeSet<GroupName> {
        self.grants.get(&authorization).unwrap_or(&NO_GROUPS)
    }

    /// `true` iff any authorization names at least one group
    pub fn is_restricted(&self) -> bool {
        !self.grants.is_empty()
    }

    /// The union of all group sets across all authorizations
    pub fn all_groups(&self) -> BTreeSet<GroupName> {
        self.grants.values().flatten().cloned().collect()
    }

    /// The authorizations a member of `groups` holds on the resource.
    ///
    /// For an unrestricted map this is the full [`Authorization::ALL`] set.
    pub fn authorizations_for(&self, groups: &BTreeSet<GroupName>) -> BTreeSet<Authorization> {
        if !self.is_restricted() {
            return Authorization::ALL.into();
        }

        self.grants
            .iter()
            .filter(|(_, granted_to)| !granted_to.is_disjoint(groups))
            .map(|(authorization, _)| *authorization)
            .collect()
    }

    /// Per-authorization union of `self` and `other`
    pub fn merged_with(&self, other: &Permissions) -> Permissions {
        let mut builder = PermissionsBuilder {
            grants: self.grants.clone(),
        };
        for (authorization, groups) in &other.grants {
            builder = builder.add(*authorization, groups.iter().cloned());
        }
        builder.build()
    }

    /// Keep only the entries for `allowed` authorizations
    pub fn restricted_to(&self, allowed: &[Authorization]) -> Permissions {
        Permissions {
            grants: self
                .grants
                .iter()
                .filter(|(authorization, _)| allowed.contains(authorization))
                .map(|(authorization, groups)| (*authorization, groups.clone()))
                .collect(),
        }
    }

    /// Copy the group set of `from` into `to`, replacing whatever was there
    pub fn with_copied_grant(&self, from: Authorization, to: Authorization) -> Permissions {
        let mut grants = self.grants.clone();
        let source = self.get(from).clone();
        if source.is_empty() {
            let _ = grants.remove(&to);
        } else {
            let _ = grants.insert(to, source);
        }
        Permissions { grants }
    }
}

impl From<BTreeMap<Authorization, BTreeSet<GroupName>>> for Permissions {
    fn from(grants: BTreeMap<Authorization, BTreeSet<GroupName>>) -> Self {
        // Drop empty group sets so that equality and `is_restricted` agree
        // regardless of how the map was spelled on the wire.
        Self {
            grants: grants
                .into_iter()
                .filter(|(_, groups)| !groups.is_empty())
                .collect(),
        }
    }
}

/// Builder for [`Permissions`]
#[derive(Debug, Default)]
pub struct PermissionsBuilder {
    grants: BTreeMap<Authorization, BTreeSet<GroupName>>,
}

impl PermissionsBuilder {
    /// Add `groups` to the set holding `authorization`
    pub fn add<G>(mut self, authorization: Authorization, groups: impl IntoIterator<Item = G>) -> Self
    where
        G: Into<GroupName>,
    {
        self.grants
            .entry(authorization)
            .or_default()
            .extend(groups.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> Permissions {
        Permissions::from(self.grants)
    }
}
