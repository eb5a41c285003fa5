// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Write side: per-user sync and removal triggered by platform tooling.

use actix_web::{
    delete, post, put,
    web::{Data, Json, Path},
    HttpResponse,
};
use gatekeeper_permissions::PermissionsRepository as _;
use gatekeeper_types::{ExternalUser, UserId};

use crate::{api::response::ApiError, api::ApiContext};

fn validated_user_id(raw: &str) -> Result<UserId, ApiError> {
    let id = UserId::from(raw);
    if id.is_empty() {
        return Err(ApiError::BadRequest {
            message: "user id must not be empty".into(),
        });
    }
    Ok(id)
}

/// Resolve and persist one user with no external roles
#[post("/roles/{id}")]
pub async fn post_roles(
    context: Data<ApiContext>,
    path: Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = validated_user_id(&path.into_inner())?;

    let permission = context.resolver.resolve(id).await?;
    context.repository.put(&permission).await?;

    Ok(HttpResponse::NoContent().finish())
}

/// Resolve and persist one user with the supplied external roles
#[put("/roles/{id}")]
pub async fn put_roles(
    context: Data<ApiContext>,
    path: Path<String>,
    external_roles: Json<Vec<String>>,
) -> Result<HttpResponse, ApiError> {
    let id = validated_user_id(&path.into_inner())?;

    let external_user = ExternalUser::new(id)
        .with_external_roles(external_roles.into_inner().iter().map(String::as_str));

    let permission = context.resolver.resolve_and_merge(external_user).await?;
    context.repository.put(&permission).await?;

    Ok(HttpResponse::NoContent().finish())
}

/// Remove one user from the repository
#[delete("/roles/{id}")]
pub async fn delete_roles(
    context: Data<ApiContext>,
    path: Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = validated_user_id(&path.into_inner())?;

    context.repository.remove(&id).await?;

    Ok(HttpResponse::NoContent().finish())
}
