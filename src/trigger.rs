use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::remote::ConnectivitySignal;

/// Why a reconciliation pass became due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// First observation after start found us online.
    Startup,
    /// Offline-to-online transition, after the settling delay.
    CameOnline,
    /// Fixed cadence while online.
    Periodic,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Startup => "startup",
            Trigger::CameOnline => "came_online",
            Trigger::Periodic => "periodic",
        }
    }
}

/// Decides *when* reconciliation runs, from a stream of `(now, online)`
/// observations. Pure state machine: the wall clock and the connectivity
/// probe stay outside, so tests can drive it with synthetic time.
///
/// The settling delay absorbs flapping connectivity: a transition to online
/// only fires after the link has stayed up for the whole delay.
#[derive(Debug)]
pub struct TriggerSchedule {
    settle_delay: Duration,
    interval: Duration,
    started: bool,
    was_online: bool,
    online_since: Option<Instant>,
    last_fired: Option<Instant>,
}

impl TriggerSchedule {
    pub fn new(settle_delay: Duration, interval: Duration) -> Self {
        Self {
            settle_delay,
            interval,
            started: false,
            was_online: false,
            online_since: None,
            last_fired: None,
        }
    }

    pub fn observe(&mut self, now: Instant, online: bool) -> Option<Trigger> {
        if !online {
            self.started = true;
            self.was_online = false;
            self.online_since = None;
            return None;
        }

        if !self.started {
            self.started = true;
            self.was_online = true;
            self.last_fired = Some(now);
            return Some(Trigger::Startup);
        }

        if !self.was_online {
            self.was_online = true;
            self.online_since = Some(now);
            return None;
        }

        if let Some(since) = self.online_since {
            if now.duration_since(since) >= self.settle_delay {
                self.online_since = None;
                self.last_fired = Some(now);
                return Some(Trigger::CameOnline);
            }
            return None;
        }

        match self.last_fired {
            Some(last) if now.duration_since(last) < self.interval => None,
            _ => {
                self.last_fired = Some(now);
                Some(Trigger::Periodic)
            }
        }
    }
}

/// Owns the wall-clock side of the schedule: polls the connectivity signal
/// and invokes the callback when a pass is due. Mutual exclusion between
/// passes belongs to the sync gate, not here; this only avoids scheduling
/// overlapping timers by being a single loop.
pub struct TriggerController<S: ConnectivitySignal> {
    schedule: TriggerSchedule,
    signal: S,
    poll_interval: Duration,
}

impl<S: ConnectivitySignal> TriggerController<S> {
    pub fn new(signal: S, settle_delay: Duration, interval: Duration, poll_interval: Duration) -> Self {
        Self {
            schedule: TriggerSchedule::new(settle_delay, interval),
            signal,
            poll_interval,
        }
    }

    /// Polls until `on_due` returns `false`. The first observation happens
    /// immediately, so an online start fires a pass without waiting a tick.
    pub fn run(mut self, mut on_due: impl FnMut(Trigger) -> bool) {
        loop {
            let online = self.signal.is_online();
            if let Some(trigger) = self.schedule.observe(Instant::now(), online) {
                debug!(trigger = trigger.as_str(), "reconciliation due");
                if !on_due(trigger) {
                    return;
                }
            }
            thread::sleep(self.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{Trigger, TriggerSchedule};

    const SETTLE: Duration = Duration::from_secs(1);
    const INTERVAL: Duration = Duration::from_secs(30);

    fn schedule() -> TriggerSchedule {
        TriggerSchedule::new(SETTLE, INTERVAL)
    }

    #[test]
    fn fires_on_start_when_online() {
        let mut sched = schedule();
        let t0 = Instant::now();
        assert_eq!(sched.observe(t0, true), Some(Trigger::Startup));
    }

    #[test]
    fn stays_quiet_on_start_when_offline() {
        let mut sched = schedule();
        let t0 = Instant::now();
        assert_eq!(sched.observe(t0, false), None);
        // Coming online later is a transition, not a startup.
        assert_eq!(sched.observe(t0 + Duration::from_secs(5), true), None);
        assert_eq!(
            sched.observe(t0 + Duration::from_secs(5) + SETTLE, true),
            Some(Trigger::CameOnline)
        );
    }

    #[test]
    fn settling_delay_absorbs_flapping() {
        let mut sched = schedule();
        let t0 = Instant::now();
        sched.observe(t0, true);

        // Drop offline, pop online briefly, drop again: nothing fires.
        assert_eq!(sched.observe(t0 + Duration::from_secs(40), false), None);
        assert_eq!(sched.observe(t0 + Duration::from_millis(40_200), true), None);
        assert_eq!(sched.observe(t0 + Duration::from_millis(40_400), false), None);

        // A stable return fires only after the full settle window.
        assert_eq!(sched.observe(t0 + Duration::from_secs(41), true), None);
        assert_eq!(
            sched.observe(t0 + Duration::from_millis(41_500), true),
            None
        );
        assert_eq!(
            sched.observe(t0 + Duration::from_secs(41) + SETTLE, true),
            Some(Trigger::CameOnline)
        );
    }

    #[test]
    fn fires_periodically_while_online() {
        let mut sched = schedule();
        let t0 = Instant::now();
        assert_eq!(sched.observe(t0, true), Some(Trigger::Startup));
        assert_eq!(sched.observe(t0 + Duration::from_secs(10), true), None);
        assert_eq!(
            sched.observe(t0 + INTERVAL, true),
            Some(Trigger::Periodic)
        );
        assert_eq!(
            sched.observe(t0 + INTERVAL + Duration::from_secs(1), true),
            None
        );
        assert_eq!(
            sched.observe(t0 + INTERVAL + INTERVAL, true),
            Some(Trigger::Periodic)
        );
    }

    #[test]
    fn periodic_timer_pauses_while_offline() {
        let mut sched = schedule();
        let t0 = Instant::now();
        sched.observe(t0, true);
        sched.observe(t0 + Duration::from_secs(5), false);
        // Long offline stretch: no periodic firings accumulate.
        assert_eq!(sched.observe(t0 + Duration::from_secs(600), false), None);
    }

    #[test]
    fn transition_firing_resets_the_periodic_clock() {
        let mut sched = schedule();
        let t0 = Instant::now();
        sched.observe(t0, true);
        sched.observe(t0 + Duration::from_secs(5), false);
        sched.observe(t0 + Duration::from_secs(6), true);
        let fired_at = t0 + Duration::from_secs(6) + SETTLE;
        assert_eq!(sched.observe(fired_at, true), Some(Trigger::CameOnline));
        // The next periodic pass counts from the transition firing.
        assert_eq!(sched.observe(fired_at + INTERVAL - Duration::from_secs(1), true), None);
        assert_eq!(
            sched.observe(fired_at + INTERVAL, true),
            Some(Trigger::Periodic)
        );
    }
}
