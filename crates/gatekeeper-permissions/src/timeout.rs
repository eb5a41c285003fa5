// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::time::{Duration, Instant};

use crate::{PermissionRepositoryError, Result};

/// Deadline carried through a repository read.
///
/// Every read helper checks the context at its entry point and refuses to
/// proceed once the deadline passed, so a slow backend produces a typed
/// timeout instead of an unbounded wait.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutContext {
    deadline: Instant,
}

impl TimeoutContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
        }
    }

    /// A context that never expires, for callers without a latency budget
    pub fn unbounded() -> Self {
        Self {
            deadline: Instant::now() + Duration::from_secs(60 * 60 * 24),
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// `Err(ReadTimeout)` once the deadline passed
    pub fn check(&self) -> Result<()> {
        if self.remaining().is_zero() {
            Err(PermissionRepositoryError::ReadTimeout)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_after_its_deadline() {
        let ctx = TimeoutContext::with_timeout(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        assert!(ctx.check().unwrap_err().is_timeout());

        let ctx = TimeoutContext::with_timeout(Duration::from_secs(60));
        assert!(ctx.check().is_ok());
    }
}
