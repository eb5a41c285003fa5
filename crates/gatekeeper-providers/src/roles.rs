// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::collections::HashMap;

use async_trait::async_trait;
use gatekeeper_types::{Role, UserId};

use crate::ProviderError;

/// Serves user->group memberships as named by the identity provider.
///
/// Role names are lower-cased before they leave a provider. An empty list
/// means "not a member of anything"; a user the identity provider does not
/// know at all is an absent key in [`multi_load_roles`](Self::multi_load_roles).
#[async_trait]
pub trait UserRolesProvider: Send + Sync {
    async fn load_roles(&self, user: &UserId) -> Result<Vec<Role>, ProviderError>;

    async fn multi_load_roles(
        &self,
        users: &[UserId],
    ) -> Result<HashMap<UserId, Vec<Role>>, ProviderError>;

    /// The memberships granted to every session, even anonymous ones
    async fn load_unrestricted_roles(&self) -> Result<Vec<Role>, ProviderError> {
        Ok(Vec::new())
    }
}
