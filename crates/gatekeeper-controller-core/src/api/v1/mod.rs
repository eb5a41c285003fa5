// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Version 1 endpoints: precomputed permission views and role updates.

mod authorize;
mod health;
mod roles;

use actix_web::web::ServiceConfig;

/// Register every v1 endpoint
pub fn services(config: &mut ServiceConfig) {
    let _ = config
        .service(authorize::get_all)
        .service(authorize::get_one)
        .service(authorize::get_accounts)
        .service(authorize::get_account_by_name)
        .service(authorize::get_applications)
        .service(authorize::get_application_by_name)
        .service(authorize::get_service_accounts)
        .service(authorize::get_service_account_by_name)
        .service(roles::post_roles)
        .service(roles::put_roles)
        .service(roles::delete_roles)
        .service(health::live)
        .service(health::ready);
}
