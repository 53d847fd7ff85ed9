use std::time::Duration;

use tokio::time::Instant;

/// Roughly 30 years.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    Debounce,
    AckTimeout,
    Reconnect,
    DiscoveryWarning,
    SimulationTick,
}

impl TimerKind {
    const COUNT: usize = 5;

    const ALL: [TimerKind; Self::COUNT] = [
        TimerKind::Debounce,
        TimerKind::AckTimeout,
        TimerKind::Reconnect,
        TimerKind::DiscoveryWarning,
        TimerKind::SimulationTick,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// One deadline slot per timer kind. Arming a kind replaces its previous
/// deadline, so there is never more than one live timer of each kind.
#[derive(Debug, Default)]
pub(crate) struct Timers {
    deadlines: [Option<Instant>; TimerKind::COUNT],
}

impl Timers {
    /// Delays too large to represent are treated as "far in the future".
    pub fn arm(&mut self, kind: TimerKind, after: Duration) {
        let now = Instant::now();
        let at = now
            .checked_add(after)
            .unwrap_or_else(|| now + FAR_FUTURE);
        self.arm_at(kind, at);
    }

    pub fn arm_at(&mut self, kind: TimerKind, at: Instant) {
        self.deadlines[kind.index()] = Some(at);
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.deadlines[kind.index()] = None;
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.deadline(kind).is_some()
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Instant> {
        self.deadlines[kind.index()]
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.iter().flatten().min().copied()
    }

    /// Disarm and return every kind whose deadline is at or before `now`,
    /// earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due: Vec<(Instant, TimerKind)> = TimerKind::ALL
            .into_iter()
            .filter_map(|kind| match self.deadlines[kind.index()] {
                Some(at) if at <= now => Some((at, kind)),
                _ => None,
            })
            .collect();
        due.sort_by_key(|(at, _)| *at);
        for (_, kind) in &due {
            self.cancel(*kind);
        }
        due.into_iter().map(|(_, kind)| kind).collect()
    }

    pub fn clear(&mut self) {
        self.deadlines = [None; TimerKind::COUNT];
    }
}
