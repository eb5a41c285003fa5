// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! The HTTP surface of the controller.

pub mod response;
pub mod v1;

use std::sync::Arc;

use gatekeeper_controller_settings::Settings;
use gatekeeper_permissions::PermissionsRepository;
use gatekeeper_resolver::PermissionsResolver;

/// Shared state handed to every request handler.
pub struct ApiContext {
    pub repository: Arc<dyn PermissionsRepository>,
    pub resolver: Arc<PermissionsResolver>,
    pub settings: Arc<Settings>,
}

impl std::fmt::Debug for ApiContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiContext").finish_non_exhaustive()
    }
}
