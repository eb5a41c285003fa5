// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::collections::BTreeSet;

use crate::{
    Account, Application, BuildService, ExtensionResource, GroupName, Resource, Role,
    ServiceAccount, UserId,
};

/// The effective permission set of a single user.
///
/// Produced by the resolver, persisted by the repositories, and projected
/// into a [`UserPermissionView`](crate::UserPermissionView) at the HTTP
/// boundary. Resources are held in typed sets per kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPermission {
    pub id: UserId,
    pub is_admin: bool,
    /// When set, the view layer grants access to applications the inventory
    /// does not know instead of denying them.
    pub allow_access_to_unknown_applications: bool,
    pub accounts: BTreeSet<Account>,
    pub applications: BTreeSet<Application>,
    pub build_services: BTreeSet<BuildService>,
    pub roles: BTreeSet<Role>,
    pub service_accounts: BTreeSet<ServiceAccount>,
    pub extensions: BTreeSet<ExtensionResource>,
}

impl UserPermission {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            is_admin: false,
            allow_access_to_unknown_applications: false,
            accounts: BTreeSet::new(),
            applications: BTreeSet::new(),
            build_services: BTreeSet::new(),
            roles: BTreeSet::new(),
            service_accounts: BTreeSet::new(),
            extensions: BTreeSet::new(),
        }
    }

    /// The unrestricted record under its reserved id
    pub fn unrestricted() -> Self {
        Self::new(UserId::unrestricted())
    }

    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }

    /// File `resource` into the set of its kind
    pub fn add_resource(&mut self, resource: Resource) {
        match resource {
            Resource::Account(account) => {
                let _ = self.accounts.insert(account);
            }
            Resource::Application(application) => {
                let _ = self.applications.insert(application);
            }
            Resource::BuildService(build_service) => {
                let _ = self.build_services.insert(build_service);
            }
            Resource::Role(role) => {
                let _ = self.roles.insert(role);
            }
            Resource::ServiceAccount(service_account) => {
                let _ = self.service_accounts.insert(service_account);
            }
            Resource::Extension(extension) => {
                let _ = self.extensions.insert(extension);
            }
        }
    }

    pub fn add_resources(&mut self, resources: impl IntoIterator<Item = Resource>) {
        for resource in resources {
            self.add_resource(resource);
        }
    }

    /// All owned resources, re-tagged as [`Resource`]s.
    ///
    /// Clones; meant for the repository write paths which serialize every
    /// resource anyway.
    pub fn iter_resources(&self) -> impl Iterator<Item = Resource> + '_ {
        let accounts = self.accounts.iter().cloned().map(Resource::Account);
        let applications = self.applications.iter().cloned().map(Resource::Application);
        let build_services = self
            .build_services
            .iter()
            .cloned()
            .map(Resource::BuildService);
        let roles = self.roles.iter().cloned().map(Resource::Role);
        let service_accounts = self
            .service_accounts
            .iter()
            .cloned()
            .map(Resource::ServiceAccount);
        let extensions = self.extensions.iter().cloned().map(Resource::Extension);

        accounts
            .chain(applications)
            .chain(build_services)
            .chain(roles)
            .chain(service_accounts)
            .chain(extensions)
    }

    /// Union `other` into this record; the admin and unknown-application
    /// flags are OR-ed, the id stays.
    pub fn merge(&mut self, other: &UserPermission) {
        self.is_admin |= other.is_admin;
        self.allow_access_to_unknown_applications |= other.allow_access_to_unknown_applications;
        self.accounts.extend(other.accounts.iter().cloned());
        self.applications.extend(other.applications.iter().cloned());
        self.build_services
            .extend(other.build_services.iter().cloned());
        self.roles.extend(other.roles.iter().cloned());
        self.service_accounts
            .extend(other.service_accounts.iter().cloned());
        self.extensions.extend(other.extensions.iter().cloned());
    }

    pub fn merged(mut self, other: &UserPermission) -> Self {
        self.merge(other);
        self
    }

    /// The groups this user belongs to, as witnessed by the owned roles
    pub fn roles_held(&self) -> BTreeSet<GroupName> {
        self.roles.iter().map(Role::group_name).collect()
    }

    /// The owned roles that were supplied from outside the identity provider
    pub fn external_roles(&self) -> Vec<Role> {
        self.roles
            .iter()
            .filter(|role| role.is_external())
            .cloned()
            .collect()
    }

    /// `true` when the record grants nothing at all
    pub fn is_empty(&self) -> bool {
        !self.is_admin
            && self.accounts.is_empty()
            && self.applications.is_empty()
            && self.build_services.is_empty()
            && self.roles.is_empty()
            && self.service_accounts.is_empty()
            && self.extensions.is_empty()
    }
}
