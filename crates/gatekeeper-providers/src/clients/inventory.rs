// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use async_trait::async_trait;
use gatekeeper_types::{Resource, ResourceFactoryRegistry, ResourceName, ResourceType};
use serde::Deserialize;
use snafu::ResultExt;
use url::Url;

use crate::{
    error::{HttpSnafu, InvalidPayloadSnafu},
    LoaderError, ResourceLoader,
};

/// [`ResourceLoader`] against the conventional inventory HTTP surface.
///
/// The source serves a JSON array of resource bodies under
/// `{base_url}/{key_suffix}` (e.g. `…/applications`). Bodies are decoded
/// through the [`ResourceFactoryRegistry`], so extension types work without
/// the client knowing their fields.
pub struct InventoryClient {
    resource_type: ResourceType,
    base_url: Url,
    client: reqwest::Client,
    registry: ResourceFactoryRegistry,
}

impl std::fmt::Debug for InventoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryClient")
            .field("resource_type", &self.resource_type)
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

/// The only field the client itself needs from a body
#[derive(Debug, Deserialize)]
struct NamedBody {
    name: ResourceName,
}

impl InventoryClient {
    pub fn new(
        resource_type: ResourceType,
        base_url: Url,
        registry: ResourceFactoryRegistry,
    ) -> Self {
        Self {
            resource_type,
            base_url,
            client: reqwest::Client::new(),
            registry,
        }
    }

    fn inventory_url(&self) -> Result<Url, LoaderError> {
        self.base_url
            .join(&self.resource_type.key_suffix())
            .map_err(|_| LoaderError::Unavailable {
                message: format!("cannot build inventory url from {}", self.base_url),
            })
    }
}

#[async_trait]
impl ResourceLoader for InventoryClient {
    fn resource_type(&self) -> ResourceType {
        self.resource_type.clone()
    }

    #[tracing::instrument(skip(self), fields(resource_type = %self.resource_type))]
    async fn load(&self) -> Result<Vec<Resource>, LoaderError> {
        let url = self.inventory_url()?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .context(HttpSnafu)?;

        let bodies: Vec<serde_json::Value> = response.json().await.context(HttpSnafu)?;

        let mut resources = Vec::with_capacity(bodies.len());
        for body in bodies {
            let named: NamedBody =
                serde_json::from_value(body.clone()).context(InvalidPayloadSnafu)?;
            let body = serde_json::to_string(&body).context(InvalidPayloadSnafu)?;

            let resource = self
                .registry
                .parse(&self.resource_type, &named.name, &body)
                .map_err(|e| LoaderError::InvalidPayload { source: e.source })?;
            resources.push(resource);
        }

        Ok(resources)
    }
}
