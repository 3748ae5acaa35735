use std::num::NonZeroU32;

use governor::{Quota, RateLimiter};
use tokio::sync::Semaphore;

use crate::errors::ProviderErrorKind;

/// Token-bucket admission control for one backend.
///
/// The semaphore bounds how many calls may wait for a bucket token at
/// once; anything past that depth fails fast with `RateLimited` instead of
/// piling up behind a throttled backend.
pub struct RateGate {
    limiter: governor::DefaultDirectRateLimiter,
    admission: Semaphore,
}

impl RateGate {
    pub fn new(max_calls_per_minute: u32, queue_depth: usize) -> Self {
        let rpm = NonZeroU32::new(max_calls_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(Quota::per_minute(rpm)),
            admission: Semaphore::new(queue_depth.max(1)),
        }
    }

    /// Waits for a rate-limit token, or fails fast when the wait queue is
    /// already full.
    pub async fn admit(&self) -> Result<(), ProviderErrorKind> {
        let _permit = self
            .admission
            .try_acquire()
            .map_err(|_| ProviderErrorKind::RateLimited)?;
        self.limiter.until_ready().await;
        Ok(())
    }
}
