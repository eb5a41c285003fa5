// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::{Duration, Instant},
};

use parking_lot::Mutex;

const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Circuit breaker in front of an external system-of-record.
///
/// After the configured number of consecutive failures the circuit trips for
/// the cooldown period. While tripped, [`allow_request()`](Self::allow_request)
/// returns `false` so the loader can fall back to its snapshot without
/// hitting the upstream. Once the cooldown elapsed a single probe request is
/// let through (half-open).
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    consecutive_failures: AtomicU32,
    /// `None` = circuit closed (healthy), `Some` = tripped at this instant
    tripped_at: Mutex<Option<Instant>>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN)
    }
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            consecutive_failures: AtomicU32::new(0),
            tripped_at: Mutex::new(None),
        }
    }

    /// `true` while the circuit is closed, or half-open after the cooldown
    pub fn allow_request(&self) -> bool {
        let mut tripped_at = self.tripped_at.lock();
        match *tripped_at {
            Some(tripped) if tripped.elapsed() < self.cooldown => false,
            Some(_) => {
                // Cooldown elapsed, reset to half-open and allow one probe
                *tripped_at = None;
                self.consecutive_failures.store(0, Ordering::Relaxed);
                log::info!("circuit breaker cooldown elapsed, probing the source again");
                true
            }
            None => true,
        }
    }

    pub fn record_success(&self) {
        let previous = self.consecutive_failures.swap(0, Ordering::Relaxed);
        if previous > 0 {
            *self.tripped_at.lock() = None;
            log::info!("circuit breaker closed after {previous} failures");
        }
    }

    pub fn record_failure(&self) {
        let count = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if count >= self.failure_threshold {
            let mut tripped_at = self.tripped_at.lock();
            if tripped_at.is_none() {
                *tripped_at = Some(Instant::now());
                log::warn!(
                    "circuit breaker tripped after {count} consecutive failures, \
                     blocking calls for {:?}",
                    self.cooldown
                );
            }
        }
    }
}
