use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};

use crate::concurrency::shutdown::ShutdownRx;

/// Bounded retry-until-converged policy: a fixed cadence and a total budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Verdict of a single check.
#[derive(Debug)]
pub enum Tick<T, S, E> {
    /// The awaited condition holds.
    Done(T),
    /// Not there yet, `S` is what this check observed.
    Pending(S),
    /// Stop polling with an error.
    Abort(E),
}

/// Terminal result of [`poll_until`].
#[derive(Debug)]
pub enum PollOutcome<T, S, E> {
    Converged {
        value: T,
        elapsed: Duration,
        ticks: u32,
    },
    TimedOut {
        last: Option<S>,
        elapsed: Duration,
        ticks: u32,
        /// Set when the shutdown signal ended polling before the deadline.
        cancelled: bool,
    },
    Aborted {
        error: E,
        elapsed: Duration,
        ticks: u32,
    },
}

/// Runs `check` on every tick of `policy.interval`, starting at
/// `started_at`, until it returns [`Tick::Done`] or [`Tick::Abort`], the
/// deadline `started_at + policy.timeout` passes, or shutdown is signaled.
///
/// The deadline is evaluated before each check, so reaching it exactly on a
/// tick times out without checking again. A check still running when the
/// deadline or the shutdown signal fires is dropped. `check` receives what
/// the previous pending check observed.
pub async fn poll_until<T, S, E, F, Fut>(
    policy: PollPolicy,
    started_at: Instant,
    shutdown_rx: &mut ShutdownRx,
    mut check: F,
) -> PollOutcome<T, S, E>
where
    S: Clone,
    F: FnMut(Option<S>) -> Fut,
    Fut: Future<Output = Tick<T, S, E>>,
{
    let deadline = started_at + policy.timeout;
    let mut interval = interval_at(started_at, policy.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last: Option<S> = None;
    let mut ticks = 0;

    let timed_out = |last: Option<S>, ticks: u32, cancelled: bool| PollOutcome::TimedOut {
        last,
        elapsed: started_at.elapsed(),
        ticks,
        cancelled,
    };

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.wait() => return timed_out(last, ticks, true),
            _ = interval.tick() => {}
            _ = sleep_until(deadline) => {}
        }

        if Instant::now() >= deadline {
            return timed_out(last, ticks, false);
        }

        ticks += 1;
        let tick = tokio::select! {
            biased;

            _ = shutdown_rx.wait() => return timed_out(last, ticks, true),
            _ = sleep_until(deadline) => return timed_out(last, ticks, false),
            tick = check(last.clone()) => tick,
        };

        match tick {
            Tick::Done(value) => {
                return PollOutcome::Converged {
                    value,
                    elapsed: started_at.elapsed(),
                    ticks,
                };
            }
            Tick::Pending(observed) => last = Some(observed),
            Tick::Abort(error) => {
                return PollOutcome::Aborted {
                    error,
                    elapsed: started_at.elapsed(),
                    ticks,
                };
            }
        }
    }
}
