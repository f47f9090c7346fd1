use core::future::pending;
use core::time::Duration;

use tokio::time::{sleep_until, Instant};

/// Holds forged responses back until the attack is due to start.
///
/// Responses are delayed, never dropped, so each session still answers its
/// frames in order once the gate opens.
#[derive(Clone, Copy, Debug)]
pub struct AttackGate {
    /// `None` when the delay does not fit in an `Instant`; the gate never opens.
    opens_at: Option<Instant>,
}

impl AttackGate {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            opens_at: Instant::now().checked_add(delay),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.opens_at.is_some_and(|at| Instant::now() >= at)
    }

    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.opens_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub async fn wait(&self) {
        match self.opens_at {
            Some(at) => sleep_until(at).await,
            None => pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::advance;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_is_open_immediately() {
        let gate = AttackGate::new(Duration::ZERO);

        assert!(gate.is_open());
        assert_eq!(gate.remaining(), Some(Duration::ZERO));
        gate.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_opens_after_delay() {
        let gate = AttackGate::new(Duration::from_secs(10));
        assert!(!gate.is_open());

        advance(Duration::from_secs(4)).await;
        assert!(!gate.is_open());
        assert_eq!(gate.remaining(), Some(Duration::from_secs(6)));

        let started = Instant::now();
        gate.wait().await;

        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(6));
        assert!(waited < Duration::from_secs(7));
        assert!(gate.is_open());
    }
}
