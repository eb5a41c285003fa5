// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Liveness and readiness probes.

use actix_web::{get, web::Data, HttpResponse};
use gatekeeper_providers::ResourceProvider as _;
use serde::Serialize;

use crate::api::ApiContext;

#[derive(Serialize)]
struct ReadinessBody {
    status: &'static str,
    unhealthy: Vec<String>,
}

#[get("/health/live")]
pub async fn live() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

/// Ready once every resource provider holds a fresh snapshot
#[get("/health/ready")]
pub async fn ready(context: Data<ApiContext>) -> HttpResponse {
    let unhealthy: Vec<String> = context
        .resolver
        .providers()
        .iter()
        .filter(|provider| !provider.is_healthy())
        .map(|provider| provider.resource_type().to_string())
        .collect();

    if unhealthy.is_empty() {
        HttpResponse::Ok().json(ReadinessBody {
            status: "ready",
            unhealthy,
        })
    } else {
        HttpResponse::ServiceUnavailable().json(ReadinessBody {
            status: "degraded",
            unhealthy,
        })
    }
}
