use std::time::Duration;

pub const DEFAULT_RECONNECT_FLOOR: Duration = Duration::from_millis(5_000);
pub const DEFAULT_RECONNECT_CEILING: Duration = Duration::from_millis(60_000);

/// Reconnect delay for the event stream. Each failure hands out the current
/// delay and doubles it up to the ceiling. It only drops back to the floor
/// through [`Backoff::reset`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Backoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            ceiling,
            current: floor,
        }
    }

    /// Delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        delay
    }

    pub fn peek(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_FLOOR, DEFAULT_RECONNECT_CEILING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_from_floor() {
        let mut backoff = Backoff::default();
        assert_eq!(backoff.next_delay(), Duration::from_millis(5_000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(10_000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(20_000));
    }

    #[test]
    fn caps_at_ceiling() {
        let mut backoff = Backoff::default();
        let delays: Vec<u128> = (0..7).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![5_000, 10_000, 20_000, 40_000, 60_000, 60_000, 60_000]);
    }

    #[test]
    fn reset_returns_to_floor() {
        let mut backoff = Backoff::new(Duration::from_millis(200), Duration::from_millis(1_000));
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.peek(), Duration::from_millis(800));
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
    }

    #[test]
    fn ceiling_below_floor_is_raised() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }
}
