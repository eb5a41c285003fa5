// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use gatekeeper_types::{Authorization, Resource, ResourceType};

/// A hook rewriting a provider's post-processed resource set.
///
/// Interceptors run as an ordered chain; each one is asked via
/// [`supports`](Self::supports) whether it wants to see the set of a given
/// resource type and is skipped silently otherwise.
pub trait ResourceInterceptor: Send + Sync {
    fn supports(&self, resource_type: &ResourceType) -> bool;

    fn intercept(&self, resources: Vec<Resource>) -> Vec<Resource>;
}

/// Clamps every supported resource to read-only access.
///
/// Used by deployments that serve a disaster-recovery copy of the platform:
/// the inventory still lists everything, but nobody may mutate through it.
#[derive(Debug)]
pub struct ReadOnlyInterceptor {
    resource_types: Vec<ResourceType>,
}

impl ReadOnlyInterceptor {
    pub fn new(resource_types: impl IntoIterator<Item = ResourceType>) -> Self {
        Self {
            resource_types: resource_types.into_iter().collect(),
        }
    }
}

impl ResourceInterceptor for ReadOnlyInterceptor {
    fn supports(&self, resource_type: &ResourceType) -> bool {
        self.resource_types.contains(resource_type)
    }

    fn intercept(&self, resources: Vec<Resource>) -> Vec<Resource> {
        resources
            .into_iter()
            .map(|resource| match resource.permissions() {
                Some(permissions) if permissions.is_restricted() => {
                    let read_only = permissions.restricted_to(&[Authorization::Read]);
                    resource.with_permissions(read_only)
                }
                _ => resource,
            })
            .collect()
    }
}
