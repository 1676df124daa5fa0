//! Process-wide ceiling on concurrent requests.

use std::sync::Arc;

use esdump_core::{Error, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default number of concurrent connections.
pub const DEFAULT_MAX_SOCKETS: usize = 10;

/// Shared limit on in-flight requests across every transport of a process.
///
/// Cloning shares the same semaphore.
#[derive(Debug, Clone)]
pub struct ConnectionLimiter {
    semaphore: Arc<Semaphore>,
    max: usize,
}

impl ConnectionLimiter {
    /// Creates a limiter allowing `max` concurrent requests (at least one).
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Waits for a permit. The permit is released on drop.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::internal().with_message("connection limiter closed").with_source(e))
    }

    /// Returns the configured ceiling.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Returns the number of permits currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Default for ConnectionLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SOCKETS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_permits_are_shared_between_clones() {
        let limiter = ConnectionLimiter::new(2);
        let clone = limiter.clone();

        let first = limiter.acquire().await.unwrap();
        let _second = clone.acquire().await.unwrap();
        assert_eq!(limiter.available(), 0);

        drop(first);
        assert_eq!(clone.available(), 1);
    }

    #[test]
    fn test_zero_is_raised_to_one() {
        assert_eq!(ConnectionLimiter::new(0).max(), 1);
        assert_eq!(ConnectionLimiter::default().max(), DEFAULT_MAX_SOCKETS);
    }
}
