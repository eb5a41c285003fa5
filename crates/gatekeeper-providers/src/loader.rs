// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use gatekeeper_types::{Resource, ResourceType};
use snafu::Report;
use tokio::{sync::broadcast, task::JoinHandle, time::interval};

use crate::{CircuitBreaker, HealthTracker, LoaderError, RetryPolicy};

/// Pulls the full resource list of one remote system-of-record.
#[async_trait]
pub trait ResourceLoader: Send + Sync + 'static {
    fn resource_type(&self) -> ResourceType;

    /// One full pull of the source; the caller owns retry and fallback
    async fn load(&self) -> Result<Vec<Resource>, LoaderError>;
}

/// The immutable resource list observed at the last successful load.
///
/// `generation` increases with every replacement; the provider cache is
/// keyed by it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub resources: Arc<Vec<Resource>>,
    pub generation: u64,
}

/// Owns a [`ResourceLoader`] and its last good [`Snapshot`].
///
/// [`refresh`](Self::refresh) runs the external call behind a circuit
/// breaker and a bounded retry. Success replaces the snapshot atomically and
/// advances the [`HealthTracker`]; failure keeps the previous snapshot and
/// leaves the health timestamp untouched.
pub struct SnapshotLoader {
    loader: Arc<dyn ResourceLoader>,
    snapshot: ArcSwapOption<Snapshot>,
    generation: AtomicU64,
    health: Arc<HealthTracker>,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
}

impl std::fmt::Debug for SnapshotLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotLoader")
            .field("resource_type", &self.loader.resource_type())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SnapshotLoader {
    pub fn new(loader: Arc<dyn ResourceLoader>, max_staleness: Duration) -> Self {
        Self {
            loader,
            snapshot: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
            health: Arc::new(HealthTracker::new(max_staleness)),
            breaker: CircuitBreaker::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn resource_type(&self) -> ResourceType {
        self.loader.resource_type()
    }

    pub fn health(&self) -> Arc<HealthTracker> {
        Arc::clone(&self.health)
    }

    /// The last good snapshot, if any load ever succeeded
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.snapshot.load_full().map(|snapshot| (*snapshot).clone())
    }

    /// Pull the source once and replace the snapshot on success.
    ///
    /// On failure the previous snapshot stays in place; the error is
    /// returned for logging but readers are unaffected.
    #[tracing::instrument(skip(self), fields(resource_type = %self.resource_type()))]
    pub async fn refresh(&self) -> Result<(), LoaderError> {
        if !self.breaker.allow_request() {
            return Err(LoaderError::CircuitOpen);
        }

        let loader = Arc::clone(&self.loader);
        match self.retry.run(|| loader.load()).await {
            Ok(resources) => {
                let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
                self.snapshot.store(Some(Arc::new(Snapshot {
                    resources: Arc::new(resources),
                    generation,
                })));
                self.health.record_success();
                self.breaker.record_success();
                Ok(())
            }
            Err(error) => {
                self.breaker.record_failure();
                Err(error)
            }
        }
    }

    /// Periodically [`refresh`](Self::refresh) until `shutdown` fires.
    ///
    /// The first refresh happens immediately so the service becomes ready
    /// without waiting a full interval.
    pub fn spawn_refresh_task(
        self: Arc<Self>,
        refresh_interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(refresh_interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.refresh().await {
                            log::warn!(
                                "failed to refresh {} inventory, serving previous snapshot: {}",
                                self.resource_type(),
                                Report::from_error(e)
                            );
                        }
                    }
                    _ = shutdown.recv() => {
                        log::debug!("{} loader task shutting down", self.resource_type());
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;

    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    use super::*;

    /// Loader stub fed from a queue of canned results
    pub(crate) struct ScriptedLoader {
        resource_type: ResourceType,
        results: Mutex<VecDeque<Result<Vec<Resource>, LoaderError>>>,
    }

    impl ScriptedLoader {
        pub(crate) fn new(
            resource_type: ResourceType,
            results: impl IntoIterator<Item = Result<Vec<Resource>, LoaderError>>,
        ) -> Self {
            Self {
                resource_type,
                results: Mutex::new(results.into_iter().collect()),
            }
        }
    }

    #[async_trait]
    impl ResourceLoader for ScriptedLoader {
        fn resource_type(&self) -> ResourceType {
            self.resource_type.clone()
        }

        async fn load(&self) -> Result<Vec<Resource>, LoaderError> {
            self.results
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(vec![]))
        }
    }

    fn account(name: &str) -> Resource {
        Resource::Account(gatekeeper_types::Account::new(name))
    }

    #[tokio::test]
    async fn success_replaces_the_snapshot_and_flips_health() {
        let loader = SnapshotLoader::new(
            Arc::new(ScriptedLoader::new(
                ResourceType::ACCOUNT,
                [Ok(vec![account("prod")])],
            )),
            Duration::from_secs(60),
        );

        assert!(loader.snapshot().is_none());
        assert!(!loader.health().is_healthy());

        loader.refresh().await.unwrap();

        let snapshot = loader.snapshot().unwrap();
        assert_eq!(snapshot.generation, 1);
        assert_eq!(snapshot.resources.len(), 1);
        assert!(loader.health().is_healthy());
    }

    #[tokio::test]
    async fn failure_keeps_the_previous_snapshot() {
        let loader = SnapshotLoader::new(
            Arc::new(ScriptedLoader::new(
                ResourceType::ACCOUNT,
                [
                    Ok(vec![account("prod")]),
                    Err(LoaderError::Unavailable {
                        message: "registry down".into(),
                    }),
                ],
            )),
            Duration::from_secs(60),
        )
        .with_retry(RetryPolicy::new(1, Duration::ZERO, 1));

        loader.refresh().await.unwrap();
        let before = loader.snapshot().unwrap();

        assert!(loader.refresh().await.is_err());
        let after = loader.snapshot().unwrap();

        assert_eq!(after.generation, before.generation);
        assert_eq!(after.resources, before.resources);
    }

    #[tokio::test]
    async fn open_circuit_short_circuits_the_source() {
        let loader = SnapshotLoader::new(
            Arc::new(ScriptedLoader::new(
                ResourceType::ACCOUNT,
                [Err(LoaderError::Unavailable {
                    message: "down".into(),
                })],
            )),
            Duration::from_secs(60),
        )
        .with_retry(RetryPolicy::new(1, Duration::ZERO, 1))
        .with_breaker(CircuitBreaker::new(1, Duration::from_secs(3600)));

        assert!(loader.refresh().await.is_err());

        // Tripped now; the scripted loader would return Ok(vec![]) but the
        // breaker never lets the call through.
        assert!(matches!(
            loader.refresh().await,
            Err(LoaderError::CircuitOpen)
        ));
        assert!(loader.snapshot().is_none());
    }
}
