// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use serde::{Deserialize, Serialize};
use snafu::{ensure, Snafu};

use super::ResourceName;
use crate::Permissions;

/// A prefix expression did not end with its single `*`.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(display("`{name}` is not a valid prefix expression, the `*` must be the final character"))]
pub struct InvalidPrefix {
    pub name: String,
}

/// An application registered in the application inventory.
///
/// Two flavors share this shape: regular entries, and *prefix entries* whose
/// name ends with a trailing `*`. Prefix entries contribute their permissions
/// to every matching entry during provider post-processing and never appear
/// in a final resource set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub name: ResourceName,
    #[serde(default)]
    pub permissions: Permissions,
}

impl Application {
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

    /// `true` for prefix entries, i.e. names containing a `*`
    pub fn is_prefix_entry(&self) -> bool {
        self.name.as_str().contains('*')
    }

    /// The stem of a prefix entry, e.g. `unicorn` for `unicorn*`.
    ///
    /// Fails for malformed expressions where the `*` is not the final
    /// character or occurs more than once.
    pub fn prefix_stem(&self) -> Result<&str, InvalidPrefix> {
        let name = self.name.as_str();
        let stem = name.strip_suffix('*').ok_or_else(|| InvalidPrefix {
            name: name.to_owned(),
        })?;
        ensure!(
            !stem.contains('*'),
            InvalidPrefixSnafu {
                name: name.to_owned()
            }
        );
        Ok(stem)
    }
}
