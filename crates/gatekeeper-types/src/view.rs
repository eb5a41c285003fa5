// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Authorization, GroupName, Resource, ResourceName, UserId, UserPermission};

/// The externally visible shape of a single resource: its name and the
/// authorizations the user holds on it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceView {
    pub name: ResourceName,
    pub authorizations: BTreeSet<Authorization>,
}

/// The projection of a [`UserPermission`] consumed by the edge filter.
///
/// Authorizations are precomputed by intersecting the user's group
/// memberships with each resource's declared rules; admins hold the full set
/// everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPermissionView {
    pub id: UserId,
    pub admin: bool,
    pub accounts: BTreeSet<ResourceView>,
    pub applications: BTreeSet<ResourceView>,
    pub build_services: BTreeSet<ResourceView>,
    pub roles: BTreeSet<ResourceView>,
    pub service_accounts: BTreeSet<ResourceView>,
    pub extensions: BTreeSet<ResourceView>,
}

fn view_of(resource: &Resource, groups: &BTreeSet<GroupName>, is_admin: bool) -> ResourceView {
    let authorizations = if is_admin {
        Authorization::ALL.into()
    } else {
        match resource.permissions() {
            Some(permissions) => permissions.authorizations_for(groups),
            // Kinds without declared rules behave like unrestricted resources
            None => Authorization::ALL.into(),
        }
    };

    ResourceView {
        name: resource.name().clone(),
        authorizations,
    }
}

impl From<&UserPermission> for UserPermissionView {
    fn from(permission: &UserPermission) -> Self {
        let groups = permission.roles_held();
        let is_admin = permission.is_admin;

        let views = |resources: &mut dyn Iterator<Item = Resource>| -> BTreeSet<ResourceView> {
            resources
                .map(|resource| view_of(&resource, &groups, is_admin))
                .collect()
        };

        Self {
            id: permission.id.clone(),
            admin: is_admin,
            accounts: views(&mut permission.accounts.iter().cloned().map(Resource::Account)),
            applications: views(
                &mut permission
                    .applications
                    .iter()
                    .cloned()
                    .map(Resource::Application),
            ),
            build_services: views(
                &mut permission
                    .build_services
                    .iter()
                    .cloned()
                    .map(Resource::BuildService),
            ),
            roles: views(&mut permission.roles.iter().cloned().map(Resource::Role)),
            service_accounts: views(
                &mut permission
                    .service_accounts
                    .iter()
                    .cloned()
                    .map(Resource::ServiceAccount),
            ),
            extensions: views(
                &mut permission
                    .extensions
                    .iter()
                    .cloned()
                    .map(Resource::Extension),
            ),
        }
    }
}
