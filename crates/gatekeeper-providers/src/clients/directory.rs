// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::collections::HashMap;

use async_trait::async_trait;
use gatekeeper_types::{Role, UserId};
use serde::Serialize;
use snafu::ResultExt;
use url::Url;

use crate::{
    error::{HttpSnafu, RolesSnafu},
    ProviderError, UserRolesProvider,
};

/// [`UserRolesProvider`] against the platform directory.
///
/// Single lookups use `GET {base_url}/users/{id}/roles`; batch lookups POST
/// the id list to `{base_url}/users/roles`. Users unknown to the directory
/// are absent keys in the batch response.
pub struct DirectoryClient {
    base_url: Url,
    client: reqwest::Client,
}

impl std::fmt::Debug for DirectoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct BatchQuery<'a> {
    users: &'a [UserId],
}

impl DirectoryClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| ProviderError::Roles {
                source: crate::LoaderError::Unavailable {
                    message: format!("directory base url {} cannot be a base", self.base_url),
                },
            })?;
            let _ = path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }
}

#[async_trait]
impl UserRolesProvider for DirectoryClient {
    #[tracing::instrument(skip(self), fields(user = %user))]
    async fn load_roles(&self, user: &UserId) -> Result<Vec<Role>, ProviderError> {
        let url = self.url(&["users", user.as_str(), "roles"])?;

        let roles: Vec<Role> = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .context(HttpSnafu)
            .context(RolesSnafu)?
            .json()
            .await
            .context(HttpSnafu)
            .context(RolesSnafu)?;

        Ok(roles)
    }

    #[tracing::instrument(skip_all, fields(users = users.len()))]
    async fn multi_load_roles(
        &self,
        users: &[UserId],
    ) -> Result<HashMap<UserId, Vec<Role>>, ProviderError> {
        let url = self.url(&["users", "roles"])?;

        let roles: HashMap<UserId, Vec<Role>> = self
            .client
            .post(url)
            .json(&BatchQuery { users })
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .context(HttpSnafu)
            .context(RolesSnafu)?
            .json()
            .await
            .context(HttpSnafu)
            .context(RolesSnafu)?;

        Ok(roles)
    }
}
