//! Round state machine.
//!
//! ```text
//!   Idle ──arm(n), n playable──▶ Armed(n)
//!   Armed(n) ──disarm()──▶ Idle (number kept)
//!   any ──reset()──▶ Idle (number and timer cleared)
//! ```
//!
//! Reserved (playoff) and unset round numbers never arm; the state is left
//! as it was.

use std::time::{Duration, Instant};

use crate::types::{RoundId, RoundSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundPhase {
    Idle,
    Armed(RoundId),
}

#[derive(Debug, Clone, Default)]
pub struct RoundState {
    ready: bool,
    number: RoundId,
    /// Monotonic instant of the last arm, base for answer latency.
    reference_time: Option<Instant>,
    /// Last countdown value received from the host.
    timer: Option<i64>,
}

impl RoundState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `number` for submissions. Returns `false` (state untouched) when
    /// the number is unset or in the reserved class.
    pub fn arm(&mut self, number: RoundId) -> bool {
        self.arm_at(number, Instant::now())
    }

    pub fn arm_at(&mut self, number: RoundId, now: Instant) -> bool {
        if !number.is_playable() {
            return false;
        }
        self.ready = true;
        self.number = number;
        self.reference_time = Some(now);
        true
    }

    /// Close submissions. The round number stays so late answers can be
    /// recognised as belonging to a closed round.
    pub fn disarm(&mut self) {
        self.ready = false;
    }

    /// Full reset to `Idle`: round number and timer cleared.
    pub fn reset(&mut self) {
        self.ready = false;
        self.number = RoundId::unset();
        self.timer = None;
    }

    pub fn set_timer(&mut self, value: i64) {
        self.timer = Some(value);
    }

    /// Adopt a snapshot pushed by the other side. Resets the latency
    /// reference to now.
    pub fn apply_snapshot(&mut self, snapshot: RoundSnapshot) {
        self.ready = snapshot.ready;
        self.number = snapshot.number;
        self.reference_time = Some(Instant::now());
    }

    pub fn is_accepting_for(&self, number: &RoundId) -> bool {
        self.ready && !self.number.is_unset() && &self.number == number
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn number(&self) -> &RoundId {
        &self.number
    }

    pub fn timer(&self) -> Option<i64> {
        self.timer
    }

    pub fn phase(&self) -> RoundPhase {
        if self.ready {
            RoundPhase::Armed(self.number.clone())
        } else {
            RoundPhase::Idle
        }
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            ready: self.ready,
            number: self.number.clone(),
        }
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.reference_time.map(|t| t.elapsed())
    }

    /// Nanoseconds since the reference time, saturating; 0 if never armed.
    pub fn elapsed_nanos(&self) -> u64 {
        self.elapsed()
            .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let state = RoundState::new();
        assert_eq!(state.phase(), RoundPhase::Idle);
        assert!(!state.is_accepting_for(&RoundId::from(0)));
        assert_eq!(state.elapsed_nanos(), 0);
    }

    #[test]
    fn arm_opens_exactly_that_round() {
        let mut state = RoundState::new();
        assert!(state.arm(RoundId::from(5)));
        assert_eq!(state.phase(), RoundPhase::Armed(RoundId::from(5)));
        assert!(state.is_accepting_for(&RoundId::from(5)));
        assert!(!state.is_accepting_for(&RoundId::from(4)));
    }

    #[test]
    fn reserved_round_never_arms() {
        let mut state = RoundState::new();
        assert!(!state.arm(RoundId::new("playoff 1")));
        assert_eq!(state.phase(), RoundPhase::Idle);

        state.arm(RoundId::from(2));
        assert!(!state.arm(RoundId::new("playoff 3")));
        assert_eq!(state.phase(), RoundPhase::Armed(RoundId::from(2)));
    }

    #[test]
    fn unset_round_never_arms() {
        let mut state = RoundState::new();
        assert!(!state.arm(RoundId::from(0)));
        assert!(!state.arm(RoundId::unset()));
        assert!(!state.is_ready());
    }

    #[test]
    fn disarm_keeps_number() {
        let mut state = RoundState::new();
        state.arm(RoundId::from(5));
        state.disarm();
        assert_eq!(state.phase(), RoundPhase::Idle);
        assert_eq!(state.number(), &RoundId::from(5));
        assert!(!state.is_accepting_for(&RoundId::from(5)));
    }

    #[test]
    fn reset_clears_number_and_timer() {
        let mut state = RoundState::new();
        state.arm(RoundId::from(5));
        state.set_timer(42);
        state.reset();
        assert_eq!(state.number(), &RoundId::unset());
        assert_eq!(state.timer(), None);
        assert_eq!(state.snapshot(), RoundSnapshot::default());
    }

    #[test]
    fn timer_does_not_change_phase() {
        let mut state = RoundState::new();
        state.set_timer(60);
        assert_eq!(state.timer(), Some(60));
        assert_eq!(state.phase(), RoundPhase::Idle);
    }

    #[test]
    fn apply_snapshot_adopts_remote_state() {
        let mut state = RoundState::new();
        state.apply_snapshot(RoundSnapshot {
            ready: true,
            number: RoundId::from(9),
        });
        assert!(state.is_accepting_for(&RoundId::from(9)));
        assert!(state.elapsed().is_some());
    }

    #[test]
    fn elapsed_measured_from_arm() {
        let mut state = RoundState::new();
        let earlier = Instant::now() - Duration::from_millis(50);
        state.arm_at(RoundId::from(1), earlier);
        assert!(state.elapsed_nanos() >= 50_000_000);
    }
}
