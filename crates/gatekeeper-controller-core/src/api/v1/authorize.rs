// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Read side: the precomputed permission views consumed by the edge filter.

use std::collections::BTreeSet;

use actix_web::{
    get,
    web::{Data, Json, Path},
};
use gatekeeper_permissions::{PermissionsRepository as _, TimeoutContext};
use gatekeeper_types::{ResourceName, ResourceView, UserId, UserPermissionView};

use crate::{api::response::ApiError, api::ApiContext, request_read_timeout};

fn validated_user_id(raw: &str) -> Result<UserId, ApiError> {
    let id = UserId::from(raw);
    if id.is_empty() {
        return Err(ApiError::BadRequest {
            message: "user id must not be empty".into(),
        });
    }
    Ok(id)
}

async fn load_view(context: &ApiContext, raw_id: &str) -> Result<UserPermissionView, ApiError> {
    let id = validated_user_id(raw_id)?;
    let ctx = TimeoutContext::with_timeout(request_read_timeout());

    let permission = context
        .repository
        .get(&id, &ctx)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(UserPermissionView::from(&permission))
}

fn named_view(
    views: BTreeSet<ResourceView>,
    name: &str,
) -> Result<Json<ResourceView>, ApiError> {
    let wanted = ResourceName::from(name);
    views
        .into_iter()
        .find(|view| view.name == wanted)
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// All user views; only served when explicitly enabled in the settings
#[get("/authorize")]
pub async fn get_all(context: Data<ApiContext>) -> Result<Json<Vec<UserPermissionView>>, ApiError> {
    if !context.settings.api.expose_get_all {
        return Err(ApiError::NotFound);
    }

    let ctx = TimeoutContext::with_timeout(request_read_timeout());
    let permissions = context.repository.get_all_by_id(&ctx).await?;

    Ok(Json(
        permissions.values().map(UserPermissionView::from).collect(),
    ))
}

#[get("/authorize/{id}")]
pub async fn get_one(
    context: Data<ApiContext>,
    path: Path<String>,
) -> Result<Json<UserPermissionView>, ApiError> {
    Ok(Json(load_view(&context, &path.into_inner()).await?))
}

#[get("/authorize/{id}/accounts")]
pub async fn get_accounts(
    context: Data<ApiContext>,
    path: Path<String>,
) -> Result<Json<BTreeSet<ResourceView>>, ApiError> {
    Ok(Json(load_view(&context, &path.into_inner()).await?.accounts))
}

#[get("/authorize/{id}/accounts/{name}")]
pub async fn get_account_by_name(
    context: Data<ApiContext>,
    path: Path<(String, String)>,
) -> Result<Json<ResourceView>, ApiError> {
    let (id, name) = path.into_inner();
    named_view(load_view(&context, &id).await?.accounts, &name)
}

#[get("/authorize/{id}/applications")]
pub async fn get_applications(
    context: Data<ApiContext>,
    path: Path<String>,
) -> Result<Json<BTreeSet<ResourceView>>, ApiError> {
    Ok(Json(
        load_view(&context, &path.into_inner()).await?.applications,
    ))
}

#[get("/authorize/{id}/applications/{name}")]
pub async fn get_application_by_name(
    context: Data<ApiContext>,
    path: Path<(String, String)>,
) -> Result<Json<ResourceView>, ApiError> {
    let (id, name) = path.into_inner();
    named_view(load_view(&context, &id).await?.applications, &name)
}

#[get("/authorize/{id}/serviceAccounts")]
pub async fn get_service_accounts(
    context: Data<ApiContext>,
    path: Path<String>,
) -> Result<Json<BTreeSet<ResourceView>>, ApiError> {
    Ok(Json(
        load_view(&context, &path.into_inner())
            .await?
            .service_accounts,
    ))
}

#[get("/authorize/{id}/serviceAccounts/{name}")]
pub async fn get_service_account_by_name(
    context: Data<ApiContext>,
    path: Path<(String, String)>,
) -> Result<Json<ResourceView>, ApiError> {
    let (id, name) = path.into_inner();
    named_view(load_view(&context, &id).await?.service_accounts, &name)
}
