use std::time::Duration;

/// Fixed pause between consecutive calls to a rate-limited provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Throttle {
    delay: Duration,
}

impl Throttle {
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::fixed(Duration::from_millis(ms))
    }

    /// Zero-delay policy; `pause` returns immediately.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}
