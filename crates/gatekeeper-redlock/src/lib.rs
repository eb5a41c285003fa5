// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Implementation of a redlock mutex for a single redis instance.
//!
//! The user-roles syncer holds one of these under a fleet-wide name while it
//! runs a sync tick, so at most one instance syncs at a time. The hold time
//! is configurable because the tick budget comes from the settings.

use std::{
    ops::Range,
    time::{Duration, Instant},
};

use rand::{thread_rng, Rng};
use redis::{aio::ConnectionLike, RedisError, Script, ToRedisArgs, Value};
use snafu::Snafu;
use tokio::time::sleep;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("Failed to unlock because redis returned no success"))]
    FailedToUnlock,
    #[snafu(display("Failed to unlock because the lock already expired in redis"))]
    AlreadyExpired,
    #[snafu(display("Failed to acquire the lock"))]
    CouldNotAcquireLock,
    #[snafu(display("Redis error: {source}"), context(false))]
    Redis { source: RedisError },
}

/// Default maximum time a lock is held before redis expires it
pub const DEFAULT_LOCK_TIME: Duration = Duration::from_secs(30);

const UNLOCK_SCRIPT: &str = r"
if redis.call('get',KEYS[1]) == ARGV[1] then
    return redis.call('del',KEYS[1])
else
    return 0
end";

/// Represents a redlock mutex over a resource inside a single redis instance
///
/// The lock can be acquired using [`lock()`](Mutex::lock()).
pub struct Mutex<K> {
    key: K,

    lock_time: Duration,
    wait_time: Range<Duration>,
    tries: usize,
}

impl<K> std::fmt::Debug for Mutex<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutex")
            .field("lock_time", &self.lock_time)
            .field("tries", &self.tries)
            .finish_non_exhaustive()
    }
}

/// Represents a locked redlock mutex
///
/// As these locks can expire in redis, this carries an [`Instant`]; call
/// [`is_locked()`](MutexGuard::is_locked()) before relying on the lock still
/// being held. During unlock, it is checked whether the canary is still
/// present as the lock key's value.
pub struct MutexGuard<K> {
    key: K,
    canary: Vec<u8>,
    created: Instant,
    lock_time: Duration,
    locked: bool,
}

impl<K> std::fmt::Debug for MutexGuard<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutexGuard")
            .field("created", &self.created)
            .field("lock_time", &self.lock_time)
            .field("locked", &self.locked)
            .finish_non_exhaustive()
    }
}

impl<K> MutexGuard<K> {
    /// Returns true when the locked redlock mutex is still valid
    ///
    /// If the lock expired in redis, this returns false.
    pub fn is_locked(&self) -> bool {
        self.locked && !self.is_expired()
    }

    /// The time left until redis expires the lock
    pub fn remaining(&self) -> Duration {
        self.lock_time.saturating_sub(self.created.elapsed())
    }

    fn is_expired(&self) -> bool {
        self.created.elapsed() > self.lock_time
    }
}

impl<K> MutexGuard<K>
where
    K: ToRedisArgs,
{
    /// Unlocks this locked redlock mutex
    ///
    /// If redis fails to unlock this lock, or this lock is already unlocked,
    /// this method returns an [`Error`]
    pub async fn unlock<C>(mut self, redis: &mut C) -> Result<()>
    where
        C: ConnectionLike,
    {
        self.locked = false;
        if self.is_expired() {
            return AlreadyExpiredSnafu.fail();
        }

        let script = Script::new(UNLOCK_SCRIPT);
        let result: i32 = script
            .key(ToRedisArgsRef(&self.key))
            .arg(&self.canary[..])
            .invoke_async(redis)
            .await?;

        if result == 1 {
            Ok(())
        } else {
            FailedToUnlockSnafu.fail()
        }
    }
}

impl<K> Drop for MutexGuard<K> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert!(!self.is_locked(), "MutexGuard must be unlocked before drop");
        }
    }
}

impl<K> Mutex<K>
where
    K: ToRedisArgs,
{
    /// Creates a new [`Mutex`]
    ///
    /// Takes a key which represents the resource used as a lock
    pub fn new(key: K) -> Self {
        Self {
            key,
            lock_time: DEFAULT_LOCK_TIME,
            wait_time: Duration::from_millis(10)..Duration::from_millis(50),
            tries: 10,
        }
    }

    /// Set the maximum hold time after which redis expires the lock
    pub fn with_lock_time(mut self, lock_time: Duration) -> Self {
        self.lock_time = lock_time;
        self
    }

    /// Set a duration range to randomly wait between retries
    pub fn with_wait_time(mut self, range: Range<Duration>) -> Self {
        self.wait_time = range;
        self
    }

    /// Set the amount of locking retries
    pub fn with_retries(mut self, retries: usize) -> Self {
        self.tries = retries.saturating_add(1);
        self
    }

    /// Locks the [`Mutex`] and returns a [`MutexGuard`]
    pub async fn lock<C>(self, redis: &mut C) -> Result<MutexGuard<K>>
    where
        C: ConnectionLike,
    {
        let canary = thread_rng()
            .sample_iter(rand::distributions::Alphanumeric)
            .take(20)
            .collect::<Vec<u8>>();

        for _ in 0..self.tries {
            let created = Instant::now();

            // SET key canary NX PX <lock_time>: create the lock only if it
            // does not exist, with a redis-side expiry
            let res: Value = redis::cmd("SET")
                .arg(ToRedisArgsRef(&self.key))
                .arg(&canary[..])
                .arg("NX")
                .arg("PX")
                .arg(self.lock_time.as_millis() as u64)
                .query_async(redis)
                .await?;

            if let Value::Okay = res {
                let guard = MutexGuard {
                    key: self.key,
                    canary,
                    created,
                    lock_time: self.lock_time,
                    locked: true,
                };
                return Ok(guard);
            } else {
                let wait = thread_rng().gen_range(self.wait_time.clone());
                sleep(wait).await;
            }
        }

        CouldNotAcquireLockSnafu.fail()
    }
}

/// Workaround for the missing impl ToRedisArgs for &ToRedisArgs, to avoid
/// clones and copies
struct ToRedisArgsRef<'k, K>(&'k K);

impl<K> ToRedisArgs for ToRedisArgsRef<'_, K>
where
    K: ToRedisArgs,
{
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + redis::RedisWrite,
    {
        self.0.write_redis_args(out)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn guard(lock_time: Duration, age: Duration) -> MutexGuard<&'static str> {
        MutexGuard {
            key: "test-lock",
            canary: b"canary".to_vec(),
            created: Instant::now() - age,
            lock_time,
            locked: true,
        }
    }

    #[test]
    fn guard_expires_with_its_lock_time() {
        let mut fresh = guard(Duration::from_secs(30), Duration::ZERO);
        assert!(fresh.is_locked());
        assert!(fresh.remaining() > Duration::from_secs(29));

        let mut expired = guard(Duration::from_secs(1), Duration::from_secs(2));
        assert!(!expired.is_locked());
        assert_eq!(expired.remaining(), Duration::ZERO);

        // drop checks
        fresh.locked = false;
        expired.locked = false;
    }
}
