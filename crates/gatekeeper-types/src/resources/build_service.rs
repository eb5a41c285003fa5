// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use serde::{Deserialize, Serialize};

use super::ResourceName;
use crate::Permissions;

/// A build system (CI master) registered in the build-system registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildService {
    pub name: ResourceName,
    #[serde(default)]
    pub permissions: Permissions,
}

impl BuildService {
    pub fn new(name: impl Into<ResourceName>) -> Self {
        Self {
            name: name.into(),
            permissions: Permissions::unrestricted(),
        }
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }
}
