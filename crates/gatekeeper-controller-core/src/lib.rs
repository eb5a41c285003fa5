// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! The gatekeeper controller: service wiring and the HTTP surface.
//!
//! [`Controller::create`] loads the settings, selects and connects the
//! permission repository, builds the resource providers from the configured
//! inventory sources, and assembles the resolver. [`Controller::run`] spawns
//! the loader refresh tasks and the user-roles syncer, then serves the
//! authorize/roles API until ctrl-c.

pub mod api;
mod wiring;

use std::{future::Future, sync::Arc, time::Duration};

use actix_web::{web::Data, App, HttpServer};
use clap::Parser;
use gatekeeper_controller_settings::{Settings, SettingsError};
use gatekeeper_providers::SnapshotLoader;
use gatekeeper_sync::UserRolesSyncer;
use snafu::{Report, ResultExt, Snafu};
use tokio::sync::{broadcast, watch};

pub use api::ApiContext;

#[derive(Debug, Snafu)]
pub enum ControllerError {
    #[snafu(display("failed to load settings: {source}"), context(false))]
    Settings { source: SettingsError },

    #[snafu(display("failed to connect to the database: {source}"), context(false))]
    Database {
        source: gatekeeper_database::DatabaseError,
    },

    #[snafu(display("failed to migrate the database: {source}"), context(false))]
    Migration {
        source: gatekeeper_db_storage::migrations::Error,
    },

    #[snafu(display("failed to connect to redis: {source}"), context(false))]
    Redis { source: redis::RedisError },

    #[snafu(display("invalid configuration: {message}"))]
    InvalidConfiguration { message: String },

    #[snafu(display("failed to bind the http listener: {source}"))]
    Bind { source: std::io::Error },

    #[snafu(display("http server failed: {source}"))]
    Serve { source: std::io::Error },
}

/// Await `future` and exit the process with a rendered error on failure.
pub async fn try_or_exit<T, F>(future: F) -> T
where
    F: Future<Output = Result<T, ControllerError>>,
{
    match future.await {
        Ok(value) => value,
        Err(error) => {
            log::error!("{}", Report::from_error(&error));
            eprintln!("crashed: {}", Report::from_error(&error));
            std::process::exit(1);
        }
    }
}

#[derive(Debug, Parser)]
#[command(about = "Authorization service of the delivery platform")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

/// The assembled but not yet running service.
pub struct Controller {
    settings: Arc<Settings>,
    context: Data<ApiContext>,
    loaders: Vec<Arc<SnapshotLoader>>,
    syncer: Option<UserRolesSyncer>,
    shutdown: broadcast::Sender<()>,
    in_service: watch::Sender<bool>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").finish_non_exhaustive()
    }
}

impl Controller {
    /// Parse arguments, load settings and wire up every component.
    pub async fn create(program_name: &str) -> Result<Controller, ControllerError> {
        let args = Args::parse();
        let settings = Arc::new(Settings::load(&args.config)?);

        init_logging(&settings);
        log::info!("starting {program_name}");

        Self::with_settings(settings).await
    }

    /// Wire up every component from already loaded settings.
    pub async fn with_settings(settings: Arc<Settings>) -> Result<Controller, ControllerError> {
        let (shutdown, _) = broadcast::channel(4);
        let (in_service, in_service_rx) = watch::channel(false);

        let wired = wiring::wire(&settings).await?;

        let syncer = if settings.sync.write_mode_enabled {
            Some(UserRolesSyncer::new(
                Arc::clone(&wired.repository),
                Arc::clone(&wired.resolver),
                wired.lock_manager,
                settings.sync.clone(),
                in_service_rx,
            ))
        } else {
            None
        };

        let context = Data::new(ApiContext {
            repository: wired.repository,
            resolver: wired.resolver,
            settings: Arc::clone(&settings),
        });

        Ok(Controller {
            settings,
            context,
            loaders: wired.loaders,
            syncer,
            shutdown,
            in_service,
        })
    }

    /// The repository/resolver context served to the request handlers
    pub fn context(&self) -> Data<ApiContext> {
        self.context.clone()
    }

    /// Spawn the background tasks and serve the API until ctrl-c.
    pub async fn run(self) -> Result<(), ControllerError> {
        let refresh_interval = self.settings.providers.refresh_interval();
        for loader in &self.loaders {
            let _ = Arc::clone(loader).spawn_refresh_task(refresh_interval, self.shutdown.subscribe());
        }

        if let Some(syncer) = self.syncer {
            let shutdown = self.shutdown.subscribe();
            let _ = tokio::spawn(syncer.run(shutdown));
        }

        let context = self.context.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(context.clone())
                .configure(api::v1::services)
        })
        .bind((self.settings.http.addr.as_str(), self.settings.http.port))
        .context(BindSnafu)?
        .disable_signals()
        .run();

        let handle = server.handle();
        let shutdown = self.shutdown.clone();
        let _ = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("received ctrl-c, shutting down");
                let _ = shutdown.send(());
                handle.stop(true).await;
            }
        });

        // The syncer stays dormant until the process is marked in service
        let _ = self.in_service.send(true);
        log::info!(
            "listening on {}:{}",
            self.settings.http.addr,
            self.settings.http.port
        );

        server.await.context(ServeSnafu)?;

        let _ = self.in_service.send(false);
        let _ = self.shutdown.send(());

        Ok(())
    }
}

fn init_logging(settings: &Settings) {
    let mut builder = env_logger::Builder::new();
    if let Some(directives) = &settings.logging.default_directives {
        let _ = builder.parse_filters(directives);
    } else {
        let _ = builder.filter_level(log::LevelFilter::Info);
    }
    let _ = builder.parse_default_env().try_init();
}

/// A timeout for repository reads triggered by a request
pub(crate) fn request_read_timeout() -> Duration {
    Duration::from_secs(10)
}
