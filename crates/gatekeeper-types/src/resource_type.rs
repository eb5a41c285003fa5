// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::{borrow::Cow, str::FromStr};

use serde::{Deserialize, Serialize};
use snafu::{ensure, Snafu};

/// The input could not be interpreted as a resource type.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(display("`{input}` is not a valid resource type"))]
pub struct InvalidResourceType {
    pub input: String,
}

/// The type tag of a [`Resource`](crate::Resource).
///
/// Resource types compare case-insensitively; the canonical form is
/// `UPPER_SNAKE`. Besides the well-known set ([`ResourceType::ACCOUNT`] and
/// friends) extension types may be registered with the
/// [`ResourceFactoryRegistry`](crate::ResourceFactoryRegistry).
///
/// Parsing accepts a bare type name, a plural form, or a colon-separated
/// composite whose final segment is the type (`"spec:applications"` parses to
/// `APPLICATION`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceType(Cow<'static, str>);

impl ResourceType {
    pub const ACCOUNT: ResourceType = ResourceType(Cow::Borrowed("ACCOUNT"));
    pub const APPLICATION: ResourceType = ResourceType(Cow::Borrowed("APPLICATION"));
    pub const BUILD_SERVICE: ResourceType = ResourceType(Cow::Borrowed("BUILD_SERVICE"));
    pub const ROLE: ResourceType = ResourceType(Cow::Borrowed("ROLE"));
    pub const SERVICE_ACCOUNT: ResourceType = ResourceType(Cow::Borrowed("SERVICE_ACCOUNT"));

    const WELL_KNOWN: [&'static str; 5] = [
        "ACCOUNT",
        "APPLICATION",
        "BUILD_SERVICE",
        "ROLE",
        "SERVICE_ACCOUNT",
    ];

    /// The canonical upper-snake name of this type
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The lower-case plural form used as key suffix in the key-value layout
    pub fn key_suffix(&self) -> String {
        let mut suffix = self.0.to_ascii_lowercase();
        if !suffix.ends_with('s') {
            suffix.push('s');
        }
        suffix
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourceType {
    type Err = InvalidResourceType;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let segment = input
            .rsplit(':')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_uppercase();

        ensure!(
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_'),
            InvalidResourceTypeSnafu { input }
        );

        if Self::WELL_KNOWN.contains(&segment.as_str()) {
            return Ok(Self(Cow::Owned(segment)));
        }

        // Accept plural spellings of the well-known set
        if let Some(stem) = segment.strip_suffix('S') {
            if Self::WELL_KNOWN.contains(&stem) {
                return Ok(Self(Cow::Owned(stem.to_owned())));
            }
        }

        Ok(Self(Cow::Owned(segment)))
    }
}

impl TryFrom<String> for ResourceType {
    type Error = InvalidResourceType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceType> for String {
    fn from(value: ResourceType) -> Self {
        value.0.into_owned()
    }
}
