// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Endpoint tests against the in-memory repository.

use std::{collections::HashMap, sync::Arc};

use actix_web::{http::StatusCode, test, web::Data, App};
use async_trait::async_trait;
use gatekeeper_controller_core::{api, ApiContext};
use gatekeeper_controller_settings::Settings;
use gatekeeper_permissions::{PermissionsRepository, TimeoutContext, VolatileRepository};
use gatekeeper_providers::{ProviderError, ResourceProvider, UserRolesProvider};
use gatekeeper_resolver::{PermissionsResolver, ResolverConfig};
use gatekeeper_types::{
    Account, Authorization, Permissions, Resource, ResourceType, Role, UserId,
    UserPermission, UserPermissionView,
};
use pretty_assertions::assert_eq;

struct StaticProvider {
    resources: Arc<Vec<Resource>>,
}

#[async_trait]
impl ResourceProvider for StaticProvider {
    fn resource_type(&self) -> ResourceType {
        ResourceType::ACCOUNT
    }

    fn is_healthy(&self) -> bool {
        true
    }

    async fn all(&self) -> Result<Arc<Vec<Resource>>, ProviderError> {
        Ok(Arc::clone(&self.resources))
    }
}

struct StubRolesProvider {
    roles: HashMap<UserId, Vec<Role>>,
}

#[async_trait]
impl UserRolesProvider for StubRolesProvider {
    async fn load_roles(&self, user: &UserId) -> Result<Vec<Role>, ProviderError> {
        Ok(self.roles.get(user).cloned().unwrap_or_default())
    }

    async fn multi_load_roles(
        &self,
        users: &[UserId],
    ) -> Result<HashMap<UserId, Vec<Role>>, ProviderError> {
        Ok(users
            .iter()
            .filter_map(|user| {
                self.roles
                    .get(user)
                    .map(|roles| (user.clone(), roles.clone()))
            })
            .collect())
    }
}

async fn context() -> Data<ApiContext> {
    let repository = Arc::new(VolatileRepository::new());

    let mut alice = UserPermission::new(UserId::from("alice"));
    alice.add_resource(Resource::Role(Role::new("ops")));
    alice.add_resource(Resource::Account(
        Account::new("prod").with_permissions(
            Permissions::builder()
                .add(Authorization::Read, ["ops"])
                .build(),
        ),
    ));
    repository.put(&alice).await.unwrap();

    let providers: Vec<Arc<dyn ResourceProvider>> = vec![Arc::new(StaticProvider {
        resources: Arc::new(vec![Resource::Account(
            Account::new("prod").with_permissions(
                Permissions::builder()
                    .add(Authorization::Read, ["ops"])
                    .build(),
            ),
        )]),
    })];

    let resolver = Arc::new(PermissionsResolver::new(
        providers,
        Arc::new(StubRolesProvider {
            roles: HashMap::from([(
                UserId::from("bob"),
                vec![Role::new("ops").with_source(gatekeeper_types::RoleSource::Ldap)],
            )]),
        }),
        ResolverConfig::default(),
    ));

    Data::new(ApiContext {
        repository,
        resolver,
        settings: Arc::new(Settings::default()),
    })
}

macro_rules! service {
    ($context:expr) => {
        test::init_service(
            App::new()
                .app_data($context.clone())
                .configure(api::v1::services),
        )
        .await
    };
}

#[actix_rt::test]
async fn authorize_returns_the_stored_view() {
    let context = context().await;
    let app = service!(context);

    let request = test::TestRequest::get()
        .uri("/authorize/alice")
        .to_request();
    let view: UserPermissionView = test::call_and_read_body_json(&app, request).await;

    assert_eq!(view.id, UserId::from("alice"));
    assert_eq!(view.accounts.len(), 1);
    let account = view.accounts.first().unwrap();
    assert_eq!(account.name.as_str(), "prod");
    assert!(account.authorizations.contains(&Authorization::Read));
}

#[actix_rt::test]
async fn unknown_users_are_a_404() {
    let context = context().await;
    let app = service!(context);

    let request = test::TestRequest::get()
        .uri("/authorize/nobody")
        .to_request();
    let response = test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn the_get_all_endpoint_is_opt_in() {
    let context = context().await;
    let app = service!(context);

    let request = test::TestRequest::get().uri("/authorize").to_request();
    let response = test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn post_roles_syncs_a_user() {
    let context = context().await;
    let app = service!(context);

    let request = test::TestRequest::post().uri("/roles/bob").to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let stored = context
        .repository
        .get(&UserId::from("bob"), &TimeoutContext::unbounded())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.accounts.len(), 1);
}

#[actix_rt::test]
async fn put_roles_carries_external_roles() {
    let context = context().await;
    let app = service!(context);

    let request = test::TestRequest::put()
        .uri("/roles/carol")
        .set_json(vec!["ops".to_owned()])
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let stored = context
        .repository
        .get(&UserId::from("carol"), &TimeoutContext::unbounded())
        .await
        .unwrap()
        .unwrap();
    let external = stored.external_roles();
    assert_eq!(external.len(), 1);
    assert_eq!(external[0].name.as_str(), "ops");
    // The external role grants the restricted account
    assert_eq!(stored.accounts.len(), 1);
}

#[actix_rt::test]
async fn delete_roles_removes_the_user() {
    let context = context().await;
    let app = service!(context);

    let request = test::TestRequest::delete().uri("/roles/alice").to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let request = test::TestRequest::get()
        .uri("/authorize/alice")
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
