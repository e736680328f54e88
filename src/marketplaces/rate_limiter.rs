//! Pacing between consecutive batch calls to one marketplace API
//!
//! The price-list endpoints throttle aggressively, so chunked fetches wait a
//! fixed minimum interval between requests.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Enforces a minimum interval between batch requests
#[derive(Debug)]
pub struct BatchPacer {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl BatchPacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Reserve the next slot.
    /// Returns Ok(()) if allowed to proceed now, Err(wait_time) otherwise.
    pub fn try_reserve(&self) -> Result<(), Duration> {
        let mut last = self.last_request.lock();

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                return Err(self.min_interval - elapsed);
            }
        }

        *last = Some(Instant::now());
        Ok(())
    }

    /// Wait until the next request may be sent
    pub async fn wait_turn(&self) {
        while let Err(wait) = self.try_reserve() {
            tracing::debug!("Batch pacing, waiting {}ms", wait.as_millis());
            tokio::time::sleep(wait).await;
        }
    }
}

impl Default for BatchPacer {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}
