// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Application-specific provider post-processing.
//!
//! The application inventory mixes real entries with prefix entries (names
//! ending in `*`). Prefix entries donate their permissions to every entry
//! they cover and are dropped from the final set. Afterwards, restricted
//! entries without an `EXECUTE` group set inherit it from the configured
//! fallback authorization.

use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;
use gatekeeper_types::{
    Application, Authorization, GroupName, Permissions, Resource, ResourceName, ResourceType,
};
use snafu::ResultExt;

use crate::{
    error::PrefixSnafu, AggregatingPermissionSource, CachedResourceProvider, ProviderError,
    ResourceInterceptor, ResourceProvider, SnapshotLoader,
};

/// Fold prefix-entry permissions into the entries they cover and drop the
/// prefix entries from the set.
pub fn extract_prefix_permissions(
    resources: Vec<Resource>,
) -> Result<Vec<Resource>, ProviderError> {
    let (prefix_entries, entries): (Vec<_>, Vec<_>) =
        resources.into_iter().partition(|resource| match resource {
            Resource::Application(application) => application.is_prefix_entry(),
            _ => false,
        });

    let mut prefixes: Vec<(String, Permissions)> = Vec::with_capacity(prefix_entries.len());
    for resource in &prefix_entries {
        let Resource::Application(application) = resource else {
            unreachable!("partition only selects applications");
        };
        let stem = application.prefix_stem().context(PrefixSnafu)?;
        prefixes.push((stem.to_owned(), application.permissions.clone()));
    }

    Ok(entries
        .into_iter()
        .map(|resource| match resource {
            Resource::Application(application) => {
                let permissions = prefixes
                    .iter()
                    .filter(|(stem, _)| application.name.as_str().starts_with(stem.as_str()))
                    .fold(application.permissions.clone(), |acc, (_, donated)| {
                        acc.merged_with(donated)
                    });
                Resource::Application(Application {
                    permissions,
                    ..application
                })
            }
            other => other,
        })
        .collect())
}

/// Copy the `fallback` group set into `EXECUTE` for restricted entries whose
/// `EXECUTE` set is empty; unrestricted entries stay untouched.
pub fn seed_execute_fallback(resources: Vec<Resource>, fallback: Authorization) -> Vec<Resource> {
    resources
        .into_iter()
        .map(|resource| match resource {
            Resource::Application(application)
                if application.permissions.is_restricted()
                    && application.permissions.get(Authorization::Execute).is_empty() =>
            {
                let permissions = application
                    .permissions
                    .with_copied_grant(fallback, Authorization::Execute);
                Resource::Application(Application {
                    permissions,
                    ..application
                })
            }
            other => other,
        })
        .collect()
}

/// [`ResourceProvider`] for applications.
///
/// Runs prefix extraction and the `EXECUTE` fallback behind the shared
/// provider surface, and implements the `allow_access_to_unknown_applications`
/// policy knob: with the knob set, restriction filtering is skipped here and
/// performed at the view layer instead.
pub struct ApplicationProvider {
    inner: CachedResourceProvider,
    allow_unknown: bool,
}

impl std::fmt::Debug for ApplicationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationProvider")
            .field("allow_unknown", &self.allow_unknown)
            .finish_non_exhaustive()
    }
}

impl ApplicationProvider {
    pub fn new(
        loader: Arc<SnapshotLoader>,
        cache_ttl: std::time::Duration,
        execute_fallback: Authorization,
        allow_unknown: bool,
    ) -> Self {
        Self {
            inner: CachedResourceProvider::new(loader, cache_ttl).with_post_process(
                move |resources| {
                    Ok(seed_execute_fallback(
                        extract_prefix_permissions(resources)?,
                        execute_fallback,
                    ))
                },
            ),
            allow_unknown,
        }
    }

    pub fn with_secondary(mut self, secondary: Arc<SnapshotLoader>) -> Self {
        self.inner = self.inner.with_secondary(secondary);
        self
    }

    pub fn with_permission_source(mut self, source: AggregatingPermissionSource) -> Self {
        self.inner = self.inner.with_permission_source(source);
        self
    }

    pub fn with_interceptors(mut self, interceptors: Vec<Arc<dyn ResourceInterceptor>>) -> Self {
        self.inner = self.inner.with_interceptors(interceptors);
        self
    }
}

#[async_trait]
impl ResourceProvider for ApplicationProvider {
    fn resource_type(&self) -> ResourceType {
        ResourceType::APPLICATION
    }

    fn is_healthy(&self) -> bool {
        self.inner.is_healthy()
    }

    async fn all(&self) -> Result<Arc<Vec<Resource>>, ProviderError> {
        self.inner.all().await
    }

    async fn all_restricted(
        &self,
        roles: &BTreeSet<GroupName>,
        is_admin: bool,
    ) -> Result<Vec<Resource>, ProviderError> {
        if self.allow_unknown {
            // Every entry, with its declared permissions; the view layer
            // computes what the user actually holds.
            return Ok((*self.all().await?).clone());
        }

        self.inner.all_restricted(roles, is_admin).await
    }

    async fn all_unrestricted(&self) -> Result<Vec<Resource>, ProviderError> {
        self.inner.all_unrestricted().await
    }

    async fn get_by_name(&self, name: &ResourceName) -> Result<Option<Resource>, ProviderError> {
        self.inner.get_by_name(name).await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn application(name: &str, permissions: Permissions) -> Resource {
        Resource::Application(Application::new(name).with_permissions(permissions))
    }

    fn groups(names: &[&str]) -> BTreeSet<GroupName> {
        names.iter().copied().map(GroupName::from).collect()
    }

    #[test]
    fn prefix_and_execute_fallback_pipeline() {
        let resources = vec![
            application("unicorn_api", Permissions::unrestricted()),
            application(
                "new_app_with_permissions",
                Permissions::builder()
                    .add(Authorization::Execute, ["new_team"])
                    .add(Authorization::Read, ["new_team"])
                    .build(),
            ),
            application(
                "*",
                Permissions::builder()
                    .add(Authorization::Create, ["power_group"])
                    .add(Authorization::Delete, ["power_group"])
                    .add(Authorization::Write, ["power_group"])
                    .add(Authorization::Execute, ["power_group"])
                    .build(),
            ),
            application(
                "unicorn*",
                Permissions::builder()
                    .add(Authorization::Write, ["unicorn_team"])
                    .add(Authorization::Execute, ["unicorn_team"])
                    .build(),
            ),
        ];

        let result = seed_execute_fallback(
            extract_prefix_permissions(resources).unwrap(),
            Authorization::Read,
        );

        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|resource| match resource {
            Resource::Application(application) => !application.is_prefix_entry(),
            _ => false,
        }));

        let unicorn = result
            .iter()
            .find(|r| r.name().as_str() == "unicorn_api")
            .unwrap()
            .permissions()
            .unwrap();
        assert_eq!(
            unicorn.get(Authorization::Write),
            &groups(&["power_group", "unicorn_team"])
        );
        assert_eq!(
            unicorn.get(Authorization::Execute),
            &groups(&["power_group", "unicorn_team"])
        );

        let new_app = result
            .iter()
            .find(|r| r.name().as_str() == "new_app_with_permissions")
            .unwrap()
            .permissions()
            .unwrap();
        assert_eq!(
            new_app.get(Authorization::Execute),
            &groups(&["power_group", "new_team"])
        );
    }

    #[test]
    fn execute_fallback_copies_the_configured_source() {
        let resources = vec![
            application(
                "restricted_no_execute",
                Permissions::builder()
                    .add(Authorization::Read, ["readers"])
                    .build(),
            ),
            application("open", Permissions::unrestricted()),
        ];

        let result = seed_execute_fallback(resources, Authorization::Read);

        let seeded = result[0].permissions().unwrap();
        assert_eq!(seeded.get(Authorization::Execute), &groups(&["readers"]));

        // Pure-unrestricted entries are not touched
        assert!(!result[1].permissions().unwrap().is_restricted());
    }

    #[test]
    fn malformed_prefix_expressions_are_rejected() {
        let resources = vec![application("uni*corn*", Permissions::unrestricted())];

        assert!(matches!(
            extract_prefix_permissions(resources),
            Err(ProviderError::Prefix { .. })
        ));
    }
}
