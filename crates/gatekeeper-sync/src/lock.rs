// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum LockError {
    #[snafu(display("redlock error: {source}"), context(false))]
    Redlock { source: gatekeeper_redlock::Error },
}

/// A held sync lock; dropped or released when the tick ends.
#[async_trait]
pub trait SyncLockGuard: Send {
    /// Release the lock early; expiry would release it eventually anyway
    async fn release(self: Box<Self>) -> Result<(), LockError>;
}

/// Acquires the fleet-wide sync lock.
///
/// `acquire` returns `Ok(None)` when another instance holds the lock; that
/// is the normal outcome on all but one instance per tick.
#[async_trait]
pub trait LockManager: Send + Sync {
    async fn acquire(
        &self,
        name: &str,
        max_duration: Duration,
    ) -> Result<Option<Box<dyn SyncLockGuard>>, LockError>;
}

/// [`LockManager`] on the shared redis instance, for fleet deployments.
pub struct RedisLockManager {
    redis: ConnectionManager,
}

impl std::fmt::Debug for RedisLockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisLockManager").finish_non_exhaustive()
    }
}

impl RedisLockManager {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

struct RedisLockGuard {
    redis: ConnectionManager,
    guard: gatekeeper_redlock::MutexGuard<String>,
}

#[async_trait]
impl SyncLockGuard for RedisLockGuard {
    async fn release(self: Box<Self>) -> Result<(), LockError> {
        let mut redis = self.redis.clone();
        self.guard.unlock(&mut redis).await?;
        Ok(())
    }
}

#[async_trait]
impl LockManager for RedisLockManager {
    async fn acquire(
        &self,
        name: &str,
        max_duration: Duration,
    ) -> Result<Option<Box<dyn SyncLockGuard>>, LockError> {
        let mutex = gatekeeper_redlock::Mutex::new(name.to_owned())
            .with_lock_time(max_duration)
            .with_retries(0);

        let mut redis = self.redis.clone();
        match mutex.lock(&mut redis).await {
            Ok(guard) => Ok(Some(Box::new(RedisLockGuard {
                redis: self.redis.clone(),
                guard,
            }))),
            Err(gatekeeper_redlock::Error::CouldNotAcquireLock) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }
}

/// [`LockManager`] for single-node deployments and tests: a process-local
/// mutex with try-lock semantics.
#[derive(Debug, Default)]
pub struct LocalLockManager {
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl LocalLockManager {
    pub fn new() -> Self {
        Self::default()
    }
}

struct LocalLockGuard {
    _guard: tokio::sync::OwnedMutexGuard<()>,
}

#[async_trait]
impl SyncLockGuard for LocalLockGuard {
    async fn release(self: Box<Self>) -> Result<(), LockError> {
        Ok(())
    }
}

#[async_trait]
impl LockManager for LocalLockManager {
    async fn acquire(
        &self,
        _name: &str,
        _max_duration: Duration,
    ) -> Result<Option<Box<dyn SyncLockGuard>>, LockError> {
        match Arc::clone(&self.lock).try_lock_owned() {
            Ok(guard) => Ok(Some(Box::new(LocalLockGuard { _guard: guard }))),
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn the_local_lock_is_exclusive() {
        let manager = LocalLockManager::new();

        let first = manager
            .acquire("sync", Duration::from_secs(30))
            .await
            .unwrap();
        assert!(first.is_some());

        let second = manager
            .acquire("sync", Duration::from_secs(30))
            .await
            .unwrap();
        assert!(second.is_none());

        first.unwrap().release().await.unwrap();

        let third = manager
            .acquire("sync", Duration::from_secs(30))
            .await
            .unwrap();
        assert!(third.is_some());
    }
}
