//! The escalating timeout ladder used while probing.

use std::future::Future;
use std::time::Duration;

/// Ordered timeout steps plus a floor that remembers the cheapest step that
/// has worked so far.
///
/// Each climb starts at the floor and moves up one step per timeout. A
/// success at step `k` raises the floor to `k`; the floor never drops. A slow
/// first probe (interpreter start-up) therefore pays for the ladder once, and
/// later probes start from the shortest step that is known to survive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutLadder {
    steps: Vec<Duration>,
    floor: usize,
}

/// Every step from the floor upward timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted {
    /// Sum of the timeouts tried in the failed climb.
    pub waited: Duration,
}

impl TimeoutLadder {
    /// Build a ladder from steps sorted shortest first.
    pub fn new(steps: Vec<Duration>) -> Self {
        debug_assert!(steps.windows(2).all(|w| w[0] <= w[1]));
        Self { steps, floor: 0 }
    }

    pub fn steps(&self) -> &[Duration] {
        &self.steps
    }

    /// Index of the step the next climb starts at.
    pub fn floor(&self) -> usize {
        self.floor
    }

    /// Run `attempt` with successive timeouts until it returns `Some`.
    ///
    /// `attempt` returns `Ok(None)` for a timeout. Errors end the climb
    /// immediately and leave the floor untouched.
    pub async fn climb<T, E, F, Fut>(&mut self, mut attempt: F) -> Result<Result<T, Exhausted>, E>
    where
        F: FnMut(Duration) -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let mut waited = Duration::ZERO;
        for (index, &timeout) in self.steps.iter().enumerate().skip(self.floor) {
            if let Some(value) = attempt(timeout).await? {
                self.floor = index;
                return Ok(Ok(value));
            }
            waited += timeout;
            tracing::debug!(
                timeout_ms = timeout.as_millis() as u64,
                step = index,
                "attempt timed out, escalating"
            );
        }
        Ok(Err(Exhausted { waited }))
    }
}
