// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use serde::{Deserialize, Serialize};

/// The name of a group as delivered by the identity provider.
///
/// Group names compare case-insensitively; the stored form is lower-cased and
/// trimmed, which happens on construction.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(from = "String")]
pub struct GroupName(String);

impl GroupName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for GroupName {
    fn from(value: String) -> Self {
        Self(value.trim().to_lowercase())
    }
}

impl From<&str> for GroupName {
    fn from(value: &str) -> Self {
        Self::from(value.to_owned())
    }
}
