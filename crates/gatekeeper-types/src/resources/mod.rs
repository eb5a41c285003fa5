// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! The resource variants pulled from the platform's systems-of-record.
//!
//! Resources form a closed sum; systems with additional resource kinds
//! participate through [`ExtensionResource`] and the
//! [`ResourceFactoryRegistry`](crate::ResourceFactoryRegistry).

use serde::{Deserialize, Serialize};

use crate::{Permissions, ResourceType};

mod account;
mod application;
mod build_service;
mod extension;
mod role;
mod service_account;

pub use account::Account;
pub use application::{Application, InvalidPrefix};
pub use build_service::BuildService;
pub use extension::ExtensionResource;
pub use role::{Role, RoleSource};
pub use service_account::ServiceAccount;

/// The name of a resource, its case-insensitive identity within a type.
///
/// Stored lower-cased and trimmed. Application prefix entries keep their
/// trailing `*` in the name; see [`Application::prefix_stem`].
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
pub struct ResourceName(String);

impl ResourceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ResourceName {
    fn from(value: String) -> Self {
        Self(value.trim().to_lowercase())
    }
}

impl From<&str> for ResourceName {
    fn from(value: &str) -> Self {
        Self::from(value.to_owned())
    }
}

/// A resource of the delivery platform, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Resource {
    Account(Account),
    Application(Application),
    BuildService(BuildService),
    Role(Role),
    ServiceAccount(ServiceAccount),
    Extension(ExtensionResource),
}

impl Resource {
    pub fn name(&self) -> &ResourceName {
        match self {
            Resource::Account(account) => &account.name,
            Resource::Application(application) => &application.name,
            Resource::BuildService(build_service) => &build_service.name,
            Resource::Role(role) => &role.name,
            Resource::ServiceAccount(service_account) => &service_account.name,
            Resource::Extension(extension) => &extension.name,
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        match self {
            Resource::Account(_) => ResourceType::ACCOUNT,
            Resource::Application(_) => ResourceType::APPLICATION,
            Resource::BuildService(_) => ResourceType::BUILD_SERVICE,
            Resource::Role(_) => ResourceType::ROLE,
            Resource::ServiceAccount(_) => ResourceType::SERVICE_ACCOUNT,
            Resource::Extension(extension) => extension.resource_type.clone(),
        }
    }

    /// The declared access rules of an access-controlled resource.
    ///
    /// `None` for resource kinds that do not carry [`Permissions`] at all
    /// (roles and service accounts).
    pub fn permissions(&self) -> Option<&Permissions> {
        match self {
            Resource::Account(account) => Some(&account.permissions),
            Resource::Application(application) => Some(&application.permissions),
            Resource::BuildService(build_service) => Some(&build_service.permissions),
            Resource::Extension(extension) => Some(&extension.permissions),
            Resource::Role(_) | Resource::ServiceAccount(_) => None,
        }
    }

    pub fn is_access_controlled(&self) -> bool {
        self.permissions().is_some()
    }

    /// The groups a non-admin must intersect to access this resource.
    ///
    /// `None` means the resource is unrestricted. Access-controlled kinds
    /// restrict through their declared [`Permissions`]; service accounts
    /// restrict through `member_of`.
    pub fn required_groups(&self) -> Option<std::collections::BTreeSet<crate::GroupName>> {
        match self {
            Resource::ServiceAccount(service_account) => {
                if service_account.member_of.is_empty() {
                    None
                } else {
                    Some(service_account.member_of.iter().cloned().collect())
                }
            }
            Resource::Role(_) => None,
            _ => {
                let permissions = self.permissions()?;
                permissions
                    .is_restricted()
                    .then(|| permissions.all_groups())
            }
        }
    }

    /// Replace the access rules of an access-controlled resource.
    ///
    /// Kinds without [`Permissions`] are returned unchanged; interceptors use
    /// this without having to know the concrete kind.
    pub fn with_permissions(self, permissions: Permissions) -> Self {
        match self {
            Resource::Account(account) => Resource::Account(Account {
                permissions,
                ..account
            }),
            Resource::Application(application) => Resource::Application(Application {
                permissions,
                ..application
            }),
            Resource::BuildService(build_service) => Resource::BuildService(BuildService {
                permissions,
                ..build_service
            }),
            Resource::Extension(extension) => Resource::Extension(ExtensionResource {
                permissions,
                ..extension
            }),
            other @ (Resource::Role(_) | Resource::ServiceAccount(_)) => other,
        }
    }

    /// The JSON body persisted for this resource.
    ///
    /// Bodies round-trip through the
    /// [`ResourceFactoryRegistry`](crate::ResourceFactoryRegistry); extension
    /// resources keep their original body verbatim.
    pub fn to_body(&self) -> serde_json::Result<String> {
        match self {
            Resource::Account(account) => serde_json::to_string(account),
            Resource::Application(application) => serde_json::to_string(application),
            Resource::BuildService(build_service) => serde_json::to_string(build_service),
            Resource::Role(role) => serde_json::to_string(role),
            Resource::ServiceAccount(service_account) => serde_json::to_string(service_account),
            Resource::Extension(extension) => Ok(extension.body.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::Authorization;

    #[test]
    fn with_permissions_only_touches_access_controlled_kinds() {
        let restricted = Permissions::builder()
            .add(Authorization::Read, ["ops"])
            .build();

        let account = Resource::Account(Account::new("prod"));
        let rewritten = account.with_permissions(restricted.clone());
        assert_eq!(rewritten.permissions(), Some(&restricted));

        let role = Resource::Role(Role::new("ops"));
        let untouched = role.clone().with_permissions(restricted);
        assert_eq!(untouched, role);
    }

    #[test]
    fn names_are_case_insensitive() {
        assert_eq!(ResourceName::from("Unicorn_API"), ResourceName::from("unicorn_api"));
    }
}
