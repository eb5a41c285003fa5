// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use gatekeeper_controller_core::{Controller, ControllerError};

#[actix_web::main]
async fn main() {
    gatekeeper_controller_core::try_or_exit(run()).await;
}

async fn run() -> Result<(), ControllerError> {
    let controller = Controller::create("Gatekeeper Authorization Service").await?;
    controller.run().await
}
