// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Domain types of the gatekeeper authorization service.
//!
//! This crate defines the vocabulary the rest of the service is written in:
//! [`Authorization`]s, [`ResourceType`]s, [`Permissions`] maps, the
//! [`Resource`] variants pulled from the platform inventories, and the
//! [`UserPermission`] records that the repositories persist and the HTTP
//! surface projects into [`UserPermissionView`]s.

#![deny(
    bad_style,
    missing_debug_implementations,
    overflowing_literals,
    patterns_in_fns_without_body,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications
)]

mod authorization;
mod external_user;
mod group_name;
mod permissions;
mod registry;
mod resource_type;
mod resources;
mod user_id;
mod user_permission;
mod view;

pub use authorization::Authorization;
pub use external_user::ExternalUser;
pub use group_name::GroupName;
pub use permissions::{Permissions, PermissionsBuilder};
pub use registry::{BodyParseError, ResourceFactory, ResourceFactoryRegistry};
pub use resource_type::{InvalidResourceType, ResourceType};
pub use resources::{
    Account, Application, BuildService, ExtensionResource, InvalidPrefix, Resource, ResourceName,
    Role, RoleSource, ServiceAccount,
};
pub use user_id::{UserId, UNRESTRICTED_USER_ID};
pub use user_permission::UserPermission;
pub use view::{ResourceView, UserPermissionView};
