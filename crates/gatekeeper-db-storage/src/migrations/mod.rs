// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use refinery::{embed_migrations, Report};
use refinery_core::tokio_postgres::{Config, NoTls};
use snafu::Snafu;
use tokio::sync::oneshot;
use tracing::Instrument;

embed_migrations!("src/migrations");

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Unable to connect to database: {}", source), context(false))]
    DatabaseConnect {
        source: refinery_core::tokio_postgres::Error,
    },

    #[snafu(display("Migration failed: {}", source), context(false))]
    MigrationFailed { source: refinery::Error },

    #[snafu(context(false))]
    SenderDropped {
        source: tokio::sync::oneshot::error::RecvError,
    },
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[tracing::instrument(skip(config))]
async fn migrate(config: Config) -> Result<Report> {
    log::debug!("config: {:?}", config);

    let (mut client, conn) = config.connect(NoTls).await?;

    let (tx, rx) = oneshot::channel();

    tokio::spawn(
        async move {
            if let Err(e) = conn.await {
                log::error!("connection error: {}", snafu::Report::from_error(e))
            }

            tx.send(()).expect("Channel unexpectedly dropped");
        }
        .instrument(tracing::Span::current()),
    );

    let report = migrations::runner().run_async(&mut client).await?;

    if !report.applied_migrations().is_empty() {
        let applied_migration_names = report
            .applied_migrations()
            .iter()
            .map(|m| m.name().to_string())
            .collect::<Vec<_>>()
            .join(", ");

        log::info!("Applied migration(s): {}", applied_migration_names);
    }

    drop(client);

    // wait for the connection to close
    rx.await?;

    Ok(report)
}

pub async fn migrate_from_url(url: &str) -> Result<Report> {
    let config = url.parse::<Config>()?;
    migrate(config).await
}
