//! Per-signal debounce state machines.
//!
//! Each debounced signal source gets its own small timer state machine
//! instead of a shared utility, so every site documents which edge is
//! authoritative:
//!
//! - **Leading**: the first signal fires immediately; repeats inside the
//!   quiet window are absorbed (run.txt appearing, script-change fan-out).
//! - **Trailing**: only the settled state matters; the fire happens one
//!   quiet window after the last signal (bounds persistence, surface
//!   reload after a prompt error).
//!
//! The machine is driven by the event loop: `signal` on each raw event,
//! `poll` on every loop tick.

use std::time::{Duration, Instant};

/// Which edge of the quiet window is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Leading,
    Trailing,
}

/// Timer phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No signal in flight.
    Idle,
    /// Trailing: a fire is scheduled for the deadline.
    Pending,
    /// Leading: fired; further signals are absorbed until the deadline.
    Fired,
}

#[derive(Debug)]
pub struct Debouncer {
    edge: Edge,
    quiet: Duration,
    phase: Phase,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(edge: Edge, quiet: Duration) -> Self {
        Debouncer {
            edge,
            quiet,
            phase: Phase::Idle,
            deadline: None,
        }
    }

    pub fn leading(quiet_ms: u64) -> Self {
        Self::new(Edge::Leading, Duration::from_millis(quiet_ms))
    }

    pub fn trailing(quiet_ms: u64) -> Self {
        Self::new(Edge::Trailing, Duration::from_millis(quiet_ms))
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Record a raw signal. Returns `true` when the caller should act now
    /// (leading edge only).
    pub fn signal(&mut self, now: Instant) -> bool {
        match self.edge {
            Edge::Leading => match self.phase {
                Phase::Idle => {
                    self.phase = Phase::Fired;
                    self.deadline = Some(now + self.quiet);
                    true
                }
                Phase::Fired | Phase::Pending => {
                    // Absorbed; the quiet window restarts from this signal.
                    self.deadline = Some(now + self.quiet);
                    false
                }
            },
            Edge::Trailing => {
                self.phase = Phase::Pending;
                self.deadline = Some(now + self.quiet);
                false
            }
        }
    }

    /// Advance the timer. Returns `true` when the caller should act now
    /// (trailing edge only: the quiet window elapsed after the last
    /// signal).
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(deadline) = self.deadline else {
            return false;
        };
        if now < deadline {
            return false;
        }
        self.deadline = None;
        match (self.edge, self.phase) {
            (Edge::Trailing, Phase::Pending) => {
                self.phase = Phase::Idle;
                true
            }
            _ => {
                self.phase = Phase::Idle;
                false
            }
        }
    }

    /// Forget any in-flight signal.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_leading_fires_immediately_once() {
        let mut d = Debouncer::leading(500);
        let t0 = Instant::now();

        assert!(d.signal(t0));
        // Two more signals inside the quiet window are absorbed.
        assert!(!d.signal(t0 + ms(100)));
        assert!(!d.signal(t0 + ms(200)));
        assert!(!d.poll(t0 + ms(300)));
    }

    #[test]
    fn test_leading_rearms_after_quiet_window() {
        let mut d = Debouncer::leading(500);
        let t0 = Instant::now();

        assert!(d.signal(t0));
        assert!(!d.poll(t0 + ms(600))); // window expires, no trailing fire
        assert_eq!(d.phase(), Phase::Idle);
        assert!(d.signal(t0 + ms(700))); // next signal fires again
    }

    #[test]
    fn test_leading_absorbed_signal_extends_window() {
        let mut d = Debouncer::leading(500);
        let t0 = Instant::now();

        assert!(d.signal(t0));
        assert!(!d.signal(t0 + ms(400))); // extends deadline to t0+900
        assert!(!d.poll(t0 + ms(600))); // still inside extended window
        assert_eq!(d.phase(), Phase::Fired);
        assert!(!d.signal(t0 + ms(800))); // still absorbed
    }

    #[test]
    fn test_trailing_fires_after_settle() {
        let mut d = Debouncer::trailing(500);
        let t0 = Instant::now();

        assert!(!d.signal(t0));
        assert!(!d.poll(t0 + ms(300)));
        assert!(!d.signal(t0 + ms(400))); // restart window
        assert!(!d.poll(t0 + ms(800))); // only 400ms since last signal
        assert!(d.poll(t0 + ms(950))); // settled
        assert_eq!(d.phase(), Phase::Idle);
    }

    #[test]
    fn test_trailing_two_bursts_fire_twice() {
        let mut d = Debouncer::trailing(200);
        let t0 = Instant::now();

        d.signal(t0);
        assert!(d.poll(t0 + ms(250)));

        d.signal(t0 + ms(1000));
        assert!(d.poll(t0 + ms(1250)));
    }

    #[test]
    fn test_reset_forgets_pending() {
        let mut d = Debouncer::trailing(200);
        let t0 = Instant::now();

        d.signal(t0);
        d.reset();
        assert!(!d.poll(t0 + ms(500)));
    }

    #[test]
    fn test_poll_without_signal_is_noop() {
        let mut d = Debouncer::leading(200);
        assert!(!d.poll(Instant::now()));
        assert_eq!(d.phase(), Phase::Idle);
    }
}
