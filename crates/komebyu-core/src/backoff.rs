use std::time::Duration;

/// Doubling delay schedule with a cap. `next_delay` yields the current
/// delay and doubles for the following call; `reset` rewinds to the
/// initial delay after a successful round.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    cap: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, cap: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        Self {
            initial,
            cap: cap.max(initial),
            current: initial,
        }
    }

    /// Signaling and view reconnects: 1 s doubling to 16 s.
    pub fn reconnect() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(16))
    }

    /// View 422 recovery: 500 ms doubling to 2 s.
    pub fn cursor_rebuild() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(2))
    }

    /// Segment stream restarts: 1 s doubling to 30 s.
    pub fn segment() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.cap);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::Backoff;

    #[test]
    fn doubles_until_the_cap() {
        let mut backoff = Backoff::reconnect();
        let delays: Vec<_> = (0..6).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 16]);
    }

    #[test]
    fn reset_rewinds_to_the_initial_delay() {
        let mut backoff = Backoff::cursor_rebuild();
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn cursor_rebuild_stays_within_two_seconds() {
        let mut backoff = Backoff::cursor_rebuild();
        let max = (0..8).map(|_| backoff.next_delay()).max().unwrap();
        assert!(max <= Duration::from_secs(2));
    }

    #[test]
    fn segment_schedule_caps_at_thirty_seconds() {
        let mut backoff = Backoff::segment();
        let max = (0..10).map(|_| backoff.next_delay()).max().unwrap();
        assert_eq!(max, Duration::from_secs(30));
    }
}
