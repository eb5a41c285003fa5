// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::{
    collections::BTreeSet,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use gatekeeper_types::{GroupName, Resource, ResourceName, ResourceType};
use parking_lot::Mutex;
use snafu::IntoError;

use crate::{
    error::NoSnapshotSnafu, AggregatingPermissionSource, LoaderError, ProviderError,
    ResourceInterceptor, SnapshotLoader,
};

/// Serves the post-processed resource set of one resource type.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    fn resource_type(&self) -> ResourceType;

    /// Whether the backing loader(s) currently hold a fresh snapshot
    fn is_healthy(&self) -> bool;

    /// The full post-processed set
    async fn all(&self) -> Result<Arc<Vec<Resource>>, ProviderError>;

    /// Entries a member of `roles` may access; admins see every restricted
    /// entry
    async fn all_restricted(
        &self,
        roles: &BTreeSet<GroupName>,
        is_admin: bool,
    ) -> Result<Vec<Resource>, ProviderError> {
        Ok(restricted(&self.all().await?, roles, is_admin))
    }

    /// Entries without any access rules
    async fn all_unrestricted(&self) -> Result<Vec<Resource>, ProviderError> {
        Ok(unrestricted(&self.all().await?))
    }

    async fn get_by_name(&self, name: &ResourceName) -> Result<Option<Resource>, ProviderError> {
        Ok(self
            .all()
            .await?
            .iter()
            .find(|resource| resource.name() == name)
            .cloned())
    }
}

/// Restriction filter: entries with access rules the caller satisfies
pub fn restricted(
    resources: &[Resource],
    roles: &BTreeSet<GroupName>,
    is_admin: bool,
) -> Vec<Resource> {
    resources
        .iter()
        .filter(|resource| match resource.required_groups() {
            Some(required) => is_admin || !required.is_disjoint(roles),
            None => false,
        })
        .cloned()
        .collect()
}

/// Restriction filter: entries without access rules
pub fn unrestricted(resources: &[Resource]) -> Vec<Resource> {
    resources
        .iter()
        .filter(|resource| resource.required_groups().is_none())
        .cloned()
        .collect()
}

type PostProcessFn = Box<dyn Fn(Vec<Resource>) -> Result<Vec<Resource>, ProviderError> + Send + Sync>;

struct CachedSet {
    /// (primary generation, secondary generation)
    key: (u64, u64),
    built_at: Instant,
    resources: Arc<Vec<Resource>>,
}

/// [`ResourceProvider`] over one or two [`SnapshotLoader`]s.
///
/// The post-processing pipeline runs on cache miss: union of the secondary
/// source into the primary (primary wins on name collision), permission
/// sources, the type-specific post-processing step, then the interceptor
/// chain. The result is cached per snapshot generation with a short TTL.
pub struct CachedResourceProvider {
    loader: Arc<SnapshotLoader>,
    secondary: Option<Arc<SnapshotLoader>>,
    permission_source: AggregatingPermissionSource,
    post_process: Option<PostProcessFn>,
    interceptors: Vec<Arc<dyn ResourceInterceptor>>,
    cache_ttl: Duration,
    cache: Mutex<Option<CachedSet>>,
}

impl std::fmt::Debug for CachedResourceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedResourceProvider")
            .field("resource_type", &self.loader.resource_type())
            .finish_non_exhaustive()
    }
}

impl CachedResourceProvider {
    pub fn new(loader: Arc<SnapshotLoader>, cache_ttl: Duration) -> Self {
        Self {
            loader,
            secondary: None,
            permission_source: AggregatingPermissionSource::default(),
            post_process: None,
            interceptors: Vec::new(),
            cache_ttl,
            cache: Mutex::new(None),
        }
    }

    /// Union a second inventory into the primary one
    pub fn with_secondary(mut self, secondary: Arc<SnapshotLoader>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn with_permission_source(mut self, source: AggregatingPermissionSource) -> Self {
        self.permission_source = source;
        self
    }

    pub(crate) fn with_post_process(
        mut self,
        post_process: impl Fn(Vec<Resource>) -> Result<Vec<Resource>, ProviderError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.post_process = Some(Box::new(post_process));
        self
    }

    pub fn with_interceptors(mut self, interceptors: Vec<Arc<dyn ResourceInterceptor>>) -> Self {
        self.interceptors = interceptors;
        self
    }

    fn build(&self) -> Result<Arc<Vec<Resource>>, ProviderError> {
        let resource_type = self.loader.resource_type();

        let primary = self
            .loader
            .snapshot()
            .ok_or_else(|| LoaderError::Unavailable {
                message: "never loaded successfully".to_owned(),
            })
            .map_err(|source| {
                NoSnapshotSnafu {
                    resource_type: resource_type.clone(),
                }
                .into_error(source)
            })?;

        let secondary = self.secondary.as_ref().and_then(|loader| loader.snapshot());
        let key = (
            primary.generation,
            secondary.as_ref().map(|s| s.generation).unwrap_or(0),
        );

        if let Some(cached) = self.cache.lock().as_ref() {
            if cached.key == key && cached.built_at.elapsed() < self.cache_ttl {
                return Ok(Arc::clone(&cached.resources));
            }
        }

        let mut resources: Vec<Resource> = (*primary.resources).clone();
        if let Some(secondary) = secondary {
            let known: BTreeSet<ResourceName> =
                resources.iter().map(|r| r.name().clone()).collect();
            resources.extend(
                secondary
                    .resources
                    .iter()
                    .filter(|r| !known.contains(r.name()))
                    .cloned(),
            );
        }

        let mut resources = self.permission_source.apply(resources);

        if let Some(post_process) = &self.post_process {
            resources = post_process(resources)?;
        }

        for interceptor in &self.interceptors {
            if interceptor.supports(&resource_type) {
                resources = interceptor.intercept(resources);
            }
        }

        let resources = Arc::new(resources);
        *self.cache.lock() = Some(CachedSet {
            key,
            built_at: Instant::now(),
            resources: Arc::clone(&resources),
        });

        Ok(resources)
    }
}

#[async_trait]
impl ResourceProvider for CachedResourceProvider {
    fn resource_type(&self) -> ResourceType {
        self.loader.resource_type()
    }

    fn is_healthy(&self) -> bool {
        let primary = self.loader.health().is_healthy();
        match &self.secondary {
            Some(secondary) => primary && secondary.health().is_healthy(),
            None => primary,
        }
    }

    async fn all(&self) -> Result<Arc<Vec<Resource>>, ProviderError> {
        self.build()
    }
}
