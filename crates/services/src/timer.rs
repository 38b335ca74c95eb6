//! Countdown bookkeeping and the periodic ticker that drives it.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

//
// ─── COUNTDOWN ─────────────────────────────────────────────────────────────────
//

/// Outcome of a single countdown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownTick {
    /// The tick fell inside the post-resume grace window; time was not consumed.
    Held { grace_left: u32 },
    /// One second was consumed.
    Counted { remaining_secs: u32 },
    /// Remaining time is zero.
    Expired,
}

/// Remaining attempt time in whole seconds, never increasing and floored at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    remaining_secs: u32,
    grace_ticks: u32,
}

impl Countdown {
    #[must_use]
    pub fn new(remaining_secs: u32) -> Self {
        Self {
            remaining_secs,
            grace_ticks: 0,
        }
    }

    /// Countdown whose first `grace_ticks` ticks do not consume time.
    #[must_use]
    pub fn with_grace(remaining_secs: u32, grace_ticks: u32) -> Self {
        Self {
            remaining_secs,
            grace_ticks,
        }
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    #[must_use]
    pub fn grace_ticks(&self) -> u32 {
        self.grace_ticks
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining_secs == 0
    }

    pub fn tick(&mut self) -> CountdownTick {
        if self.grace_ticks > 0 {
            self.grace_ticks -= 1;
            return CountdownTick::Held {
                grace_left: self.grace_ticks,
            };
        }
        if self.remaining_secs == 0 {
            return CountdownTick::Expired;
        }
        self.remaining_secs -= 1;
        if self.remaining_secs == 0 {
            CountdownTick::Expired
        } else {
            CountdownTick::Counted {
                remaining_secs: self.remaining_secs,
            }
        }
    }
}

//
// ─── TIMER SERVICE ─────────────────────────────────────────────────────────────
//

/// Periodic ticker owned by a single subscriber.
///
/// `start` spawns an interval task that feeds a bounded channel; `next_tick`
/// waits for the next tick and pends forever while the timer is stopped, so it
/// can sit in a `tokio::select!` next to other event sources.
#[derive(Debug)]
pub struct TimerService {
    period: Duration,
    task: Option<JoinHandle<()>>,
    ticks: Option<mpsc::Receiver<()>>,
}

impl TimerService {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            task: None,
            ticks: None,
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Start ticking. Restarting a running timer replaces the previous task.
    pub fn start(&mut self) {
        self.stop();
        let (tx, rx) = mpsc::channel(1);
        let period = self.period;
        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tx.send(()).await.is_err() {
                    break;
                }
            }
        });
        self.task = Some(task);
        self.ticks = Some(rx);
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.ticks = None;
    }

    /// Wait for the next tick. Cancel safe.
    pub async fn next_tick(&mut self) {
        let closed = match self.ticks.as_mut() {
            Some(rx) => rx.recv().await.is_none(),
            None => true,
        };
        if closed {
            self.stop();
            std::future::pending::<()>().await;
        }
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_decrements_and_expires_once_at_zero() {
        let mut countdown = Countdown::new(3);
        assert_eq!(countdown.tick(), CountdownTick::Counted { remaining_secs: 2 });
        assert_eq!(countdown.tick(), CountdownTick::Counted { remaining_secs: 1 });
        assert_eq!(countdown.tick(), CountdownTick::Expired);
        assert_eq!(countdown.remaining_secs(), 0);
        assert_eq!(countdown.tick(), CountdownTick::Expired);
        assert_eq!(countdown.remaining_secs(), 0);
    }

    #[test]
    fn grace_ticks_hold_the_countdown() {
        let mut countdown = Countdown::with_grace(10, 3);
        assert_eq!(countdown.tick(), CountdownTick::Held { grace_left: 2 });
        assert_eq!(countdown.tick(), CountdownTick::Held { grace_left: 1 });
        assert_eq!(countdown.tick(), CountdownTick::Held { grace_left: 0 });
        assert_eq!(countdown.remaining_secs(), 10);
        assert_eq!(countdown.tick(), CountdownTick::Counted { remaining_secs: 9 });
    }

    #[test]
    fn zero_countdown_expires_on_first_counted_tick() {
        let mut countdown = Countdown::with_grace(0, 1);
        assert_eq!(countdown.tick(), CountdownTick::Held { grace_left: 0 });
        assert_eq!(countdown.tick(), CountdownTick::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_delivers_ticks_until_stopped() {
        let mut timer = TimerService::new(Duration::from_secs(1));
        timer.start();
        assert!(timer.is_running());

        timer.next_tick().await;
        timer.next_tick().await;

        timer.stop();
        assert!(!timer.is_running());
        let waited = tokio::time::timeout(Duration::from_secs(5), timer.next_tick()).await;
        assert!(waited.is_err());
    }
}
