// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use serde::{Deserialize, Serialize};

use super::ResourceName;
use crate::GroupName;

/// An automation identity from the service-account inventory.
///
/// Service accounts double as users: when resolved, `member_of` acts as the
/// account's externally supplied role list instead of a directory lookup.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccount {
    pub name: ResourceName,
    #[serde(default)]
    pub member_of: Vec<GroupName>,
}

impl ServiceAccount {
    pub fn new(name: impl Into<ResourceName>) -> Self {
        Self {
            name: name.into(),
            member_of: Vec::new(),
        }
    }

    pub fn with_member_of<G>(mut self, member_of: impl IntoIterator<Item = G>) -> Self
    where
        G: Into<GroupName>,
    {
        self.member_of = member_of.into_iter().map(Into::into).collect();
        self
    }
}
