// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use arc_swap::ArcSwapOption;
use gatekeeper_types::UserPermission;
use snafu::Report;

use crate::Result;

/// The key value used when the backend has no `updated_at` for the
/// unrestricted record (missing row or zero column). Entries under this key
/// are served but never promoted to the fallback pointer.
const SENTINEL_KEY: i64 = 0;

struct CacheEntry {
    /// The unrestricted record's `updated_at` at load time
    key: i64,
    loaded_at: Instant,
    value: Arc<UserPermission>,
}

/// Single-entry cache for the unrestricted permission record.
///
/// Every repository read merges the unrestricted record into its response;
/// this cache keeps the backend off that hot path. The entry is keyed by the
/// record's `updated_at` and served without backend contact while younger
/// than the TTL. A fallback pointer is updated on every successful load: if
/// a later load fails, readers get the last good record and a warning
/// instead of an error.
pub struct UnrestrictedPermissionCache {
    ttl: Duration,
    entry: ArcSwapOption<CacheEntry>,
    fallback: ArcSwapOption<UserPermission>,
}

impl std::fmt::Debug for UnrestrictedPermissionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnrestrictedPermissionCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl UnrestrictedPermissionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: ArcSwapOption::empty(),
            fallback: ArcSwapOption::empty(),
        }
    }

    /// The current unrestricted record.
    ///
    /// `load_key` reads the record's `updated_at` (0 when absent);
    /// `load_value` reads the record itself. Neither is called while the
    /// cached entry is younger than the TTL, and `load_value` is only called
    /// when the key moved.
    pub async fn get_or_load<KFut, VFut>(
        &self,
        load_key: impl FnOnce() -> KFut,
        load_value: impl FnOnce() -> VFut,
    ) -> Result<Arc<UserPermission>>
    where
        KFut: Future<Output = Result<i64>>,
        VFut: Future<Output = Result<UserPermission>>,
    {
        if let Some(entry) = self.entry.load_full() {
            if entry.loaded_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&entry.value));
            }
        }

        let key = match load_key().await {
            Ok(key) => key,
            Err(error) => return self.fallback_or(error),
        };

        if let Some(entry) = self.entry.load_full() {
            if entry.key == key && key != SENTINEL_KEY {
                // Key unchanged, only refresh the TTL clock
                let value = Arc::clone(&entry.value);
                self.entry.store(Some(Arc::new(CacheEntry {
                    key,
                    loaded_at: Instant::now(),
                    value: Arc::clone(&value),
                })));
                return Ok(value);
            }
        }

        match load_value().await {
            Ok(permission) => Ok(self.store(key, permission)),
            Err(error) => self.fallback_or(error),
        }
    }

    fn store(&self, key: i64, permission: UserPermission) -> Arc<UserPermission> {
        let value = Arc::new(permission);

        self.entry.store(Some(Arc::new(CacheEntry {
            key,
            loaded_at: Instant::now(),
            value: Arc::clone(&value),
        })));

        if key != SENTINEL_KEY {
            self.fallback.store(Some(Arc::clone(&value)));
        }

        value
    }

    fn fallback_or(
        &self,
        error: crate::PermissionRepositoryError,
    ) -> Result<Arc<UserPermission>> {
        match self.fallback.load_full() {
            Some(fallback) => {
                log::warn!(
                    "failed to load the unrestricted permission record, serving the last \
                     good one: {}",
                    Report::from_error(&error)
                );
                Ok(fallback)
            }
            None => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use gatekeeper_types::{Account, Resource, UserId};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::PermissionRepositoryError;

    fn record_with_account(name: &str) -> UserPermission {
        let mut permission = UserPermission::unrestricted();
        permission.add_resource(Resource::Account(Account::new(name)));
        permission
    }

    fn backend_error() -> PermissionRepositoryError {
        PermissionRepositoryError::ReadTimeout
    }

    #[tokio::test]
    async fn serves_the_fallback_while_the_backend_is_down() {
        let cache = UnrestrictedPermissionCache::new(Duration::ZERO);

        // t1: populate cache and fallback
        let loaded = cache
            .get_or_load(|| async { Ok(1) }, || async { Ok(record_with_account("t1")) })
            .await
            .unwrap();
        assert_eq!(loaded.accounts.first().unwrap().name.as_str(), "t1");

        // Backend dies: key load fails, the t1 entry is served
        let fallback = cache
            .get_or_load(
                || async { Err(backend_error()) },
                || async { unreachable!("value must not be loaded") },
            )
            .await
            .unwrap();
        assert_eq!(fallback.accounts.first().unwrap().name.as_str(), "t1");

        // Recovery with a new key moves the entry and the fallback to t2
        let recovered = cache
            .get_or_load(|| async { Ok(2) }, || async { Ok(record_with_account("t2")) })
            .await
            .unwrap();
        assert_eq!(recovered.accounts.first().unwrap().name.as_str(), "t2");

        let fallback = cache
            .get_or_load(
                || async { Err(backend_error()) },
                || async { unreachable!("value must not be loaded") },
            )
            .await
            .unwrap();
        assert_eq!(fallback.accounts.first().unwrap().name.as_str(), "t2");
    }

    #[tokio::test]
    async fn an_unchanged_key_skips_the_value_load() {
        let cache = UnrestrictedPermissionCache::new(Duration::ZERO);
        let value_loads = AtomicU32::new(0);

        for _ in 0..3 {
            let _ = cache
                .get_or_load(
                    || async { Ok(7) },
                    || async {
                        let _ = value_loads.fetch_add(1, Ordering::Relaxed);
                        Ok(record_with_account("stable"))
                    },
                )
                .await
                .unwrap();
        }

        assert_eq!(value_loads.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn within_ttl_no_backend_contact_happens() {
        let cache = UnrestrictedPermissionCache::new(Duration::from_secs(60));

        let _ = cache
            .get_or_load(|| async { Ok(1) }, || async { Ok(record_with_account("t1")) })
            .await
            .unwrap();

        let hit = cache
            .get_or_load(
                || async { unreachable!("key must not be loaded within the ttl") },
                || async { unreachable!("value must not be loaded within the ttl") },
            )
            .await
            .unwrap();

        assert_eq!(hit.accounts.first().unwrap().name.as_str(), "t1");
    }

    #[tokio::test]
    async fn the_sentinel_key_serves_but_never_becomes_the_fallback() {
        let cache = UnrestrictedPermissionCache::new(Duration::ZERO);

        let served = cache
            .get_or_load(|| async { Ok(0) }, || async { Ok(record_with_account("zero")) })
            .await
            .unwrap();
        assert_eq!(served.accounts.first().unwrap().name.as_str(), "zero");
        assert_eq!(served.id, UserId::unrestricted());

        // No fallback was recorded, so a failing load surfaces the error
        let result = cache
            .get_or_load(
                || async { Err(backend_error()) },
                || async { unreachable!() },
            )
            .await;
        assert!(result.is_err());
    }
}
