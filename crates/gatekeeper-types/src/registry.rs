// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::{collections::BTreeMap, sync::Arc};

use serde::Deserialize;
use snafu::{ResultExt, Snafu};

use crate::{ExtensionResource, Permissions, Resource, ResourceName, ResourceType};

/// A persisted resource body could not be turned back into a [`Resource`].
#[derive(Debug, Snafu)]
#[snafu(display("failed to parse body of {resource_type} `{name}`: {source}"))]
pub struct BodyParseError {
    pub resource_type: ResourceType,
    pub name: ResourceName,
    pub source: serde_json::Error,
}

/// Builds a [`Resource`] from its persisted JSON body.
pub type ResourceFactory =
    Arc<dyn Fn(&ResourceName, &str) -> Result<Resource, BodyParseError> + Send + Sync>;

/// Registry of per-type body parsers.
///
/// Both the relational and the key-value backend parse stored bodies through
/// this registry. The default registration covers the well-known resource
/// types; extension types register their factory at start-up. Types without a
/// registration fall back to a generic parser that keeps the body verbatim in
/// an [`ExtensionResource`].
#[derive(Clone)]
pub struct ResourceFactoryRegistry {
    factories: BTreeMap<ResourceType, ResourceFactory>,
}

impl std::fmt::Debug for ResourceFactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceFactoryRegistry")
            .field("types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn known<T>(resource_type: ResourceType, wrap: fn(T) -> Resource) -> ResourceFactory
where
    T: for<'de> Deserialize<'de> + 'static,
{
    Arc::new(move |name, body| {
        serde_json::from_str::<T>(body)
            .map(wrap)
            .context(BodyParseSnafu {
                resource_type: resource_type.clone(),
                name: name.clone(),
            })
    })
}

impl Default for ResourceFactoryRegistry {
    fn default() -> Self {
        let mut registry = Self {
            factories: BTreeMap::new(),
        };
        registry.register(ResourceType::ACCOUNT, known(ResourceType::ACCOUNT, Resource::Account));
        registry.register(
            ResourceType::APPLICATION,
            known(ResourceType::APPLICATION, Resource::Application),
        );
        registry.register(
            ResourceType::BUILD_SERVICE,
            known(ResourceType::BUILD_SERVICE, Resource::BuildService),
        );
        registry.register(ResourceType::ROLE, known(ResourceType::ROLE, Resource::Role));
        registry.register(
            ResourceType::SERVICE_ACCOUNT,
            known(ResourceType::SERVICE_ACCOUNT, Resource::ServiceAccount),
        );
        registry
    }
}

impl ResourceFactoryRegistry {
    /// Register (or replace) the factory for `resource_type`
    pub fn register(&mut self, resource_type: ResourceType, factory: ResourceFactory) {
        let _ = self.factories.insert(resource_type, factory);
    }

    /// Parse a persisted body back into a [`Resource`].
    ///
    /// `name` is the stored identity and wins over whatever the body claims
    /// for unregistered extension types.
    pub fn parse(
        &self,
        resource_type: &ResourceType,
        name: &ResourceName,
        body: &str,
    ) -> Result<Resource, BodyParseError> {
        match self.factories.get(resource_type) {
            Some(factory) => factory(name, body),
            None => parse_extension(resource_type, name, body),
        }
    }
}

#[derive(Deserialize)]
struct ExtensionEnvelope {
    #[serde(default)]
    permissions: Permissions,
}

fn parse_extension(
    resource_type: &ResourceType,
    name: &ResourceName,
    body: &str,
) -> Result<Resource, BodyParseError> {
    let envelope: ExtensionEnvelope = serde_json::from_str(body).context(BodyParseSnafu {
        resource_type: resource_type.clone(),
        name: name.clone(),
    })?;

    Ok(Resource::Extension(ExtensionResource::new(
        resource_type.clone(),
        name.clone(),
        envelope.permissions,
        body,
    )))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::Authorization;

    #[test]
    fn parses_known_types_through_their_factories() {
        let registry = ResourceFactoryRegistry::default();

        let resource = registry
            .parse(
                &ResourceType::ACCOUNT,
                &ResourceName::from("prod"),
                r#"{"name":"prod","permissions":{"READ":["ops"]}}"#,
            )
            .unwrap();

        let Resource::Account(account) = resource else {
            panic!("expected an account");
        };
        assert_eq!(account.name.as_str(), "prod");
        assert!(account.permissions.is_restricted());
    }

    #[test]
    fn unregistered_types_round_trip_verbatim() {
        let registry = ResourceFactoryRegistry::default();
        let body = r#"{"name":"canary-config","permissions":{"WRITE":["sre"]},"rolloutSteps":[10,50,100]}"#;
        let resource_type: ResourceType = "canary_config".parse().unwrap();

        let resource = registry
            .parse(&resource_type, &ResourceName::from("canary-config"), body)
            .unwrap();

        assert_eq!(resource.resource_type(), resource_type);
        assert_eq!(
            resource.permissions().unwrap().get(Authorization::Write),
            &std::collections::BTreeSet::from([crate::GroupName::from("sre")])
        );
        assert_eq!(resource.to_body().unwrap(), body);
    }

    #[test]
    fn registered_extension_factory_wins() {
        let mut registry = ResourceFactoryRegistry::default();
        let resource_type: ResourceType = "pipeline_template".parse().unwrap();
        let registered = resource_type.clone();
        registry.register(
            resource_type.clone(),
            Arc::new(move |name, body| {
                Ok(Resource::Extension(ExtensionResource::new(
                    registered.clone(),
                    name.clone(),
                    Permissions::unrestricted(),
                    body,
                )))
            }),
        );

        let resource = registry
            .parse(&resource_type, &ResourceName::from("deploy"), "{\"steps\":[]}")
            .unwrap();

        assert_eq!(resource.name().as_str(), "deploy");
        assert!(!resource.permissions().unwrap().is_restricted());
    }
}
