use std::time::{Duration, Instant};

/// Most ticks a single `poll` reports; past that the schedule re-anchors on `now`.
const MAX_CATCH_UP: u32 = 1_000;

/// A recurring task owned by whoever needs it.
///
/// Nothing runs in the background: the owner polls with the current time and
/// performs one unit of work per returned tick. Dropping the owner drops the
/// schedule, and `cancel` stops it early.
#[derive(Clone, Debug)]
pub struct Interval {
    period: Duration,
    next_due: Option<Instant>,
}

impl Interval {
    /// Starts the schedule; the first tick is due one period after `start`.
    pub fn start(period: Duration, start: Instant) -> Self {
        Self {
            period,
            next_due: Some(start + period),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_active(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn cancel(&mut self) {
        self.next_due = None;
    }

    /// Number of ticks that fell due up to and including `now`.
    pub fn poll(&mut self, now: Instant) -> u32 {
        let Some(mut due) = self.next_due else {
            return 0;
        };
        let mut ticks = 0;
        while due <= now {
            ticks += 1;
            due += self.period;
            if ticks == MAX_CATCH_UP {
                due = now + self.period;
                break;
            }
        }
        self.next_due = Some(due);
        ticks
    }
}
