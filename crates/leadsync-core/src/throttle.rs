//! Write pacing for the reconciliation job.
//!
//! Whether to pause is a pure function of how many appointments have been
//! processed ([`ThrottlePolicy::pause_after`]); actually waiting is left to
//! a [`Pacer`].

use std::sync::Mutex;
use std::time::Duration;

/// Pauses inserted between writes to avoid overwhelming the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    pub group_size: usize,
    pub group_pause: Duration,
    pub milestone_size: usize,
    pub milestone_pause: Duration,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            group_size: 10,
            group_pause: Duration::from_millis(500),
            milestone_size: 100,
            milestone_pause: Duration::from_secs(3),
        }
    }
}

impl ThrottlePolicy {
    /// A policy that never pauses.
    #[must_use]
    pub const fn unthrottled() -> Self {
        Self {
            group_size: 0,
            group_pause: Duration::ZERO,
            milestone_size: 0,
            milestone_pause: Duration::ZERO,
        }
    }

    /// Pause owed after `processed` appointments, if any.
    ///
    /// A milestone boundary takes the milestone pause in place of the group
    /// pause. Sizes of zero disable that tier, as do zero durations.
    #[must_use]
    pub fn pause_after(&self, processed: usize) -> Option<Duration> {
        if processed == 0 {
            return None;
        }
        let hit = |size: usize| size > 0 && processed % size == 0;
        let pause = if hit(self.milestone_size) {
            self.milestone_pause
        } else if hit(self.group_size) {
            self.group_pause
        } else {
            return None;
        };
        (!pause.is_zero()).then_some(pause)
    }
}

/// Something that can wait.
pub trait Pacer {
    fn pause(&self, duration: Duration);
}

/// Blocks the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPacer;

impl Pacer for NoPacer {
    fn pause(&self, _duration: Duration) {}
}

/// Remembers requested pauses without waiting.
#[derive(Debug, Default)]
pub struct RecordingPacer {
    pauses: Mutex<Vec<Duration>>,
}

impl RecordingPacer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pauses requested so far, in order.
    #[must_use]
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Pacer for RecordingPacer {
    fn pause(&self, duration: Duration) {
        self.pauses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_boundaries_pause_briefly() {
        let policy = ThrottlePolicy::default();
        assert_eq!(policy.pause_after(0), None);
        assert_eq!(policy.pause_after(9), None);
        assert_eq!(policy.pause_after(10), Some(Duration::from_millis(500)));
        assert_eq!(policy.pause_after(20), Some(Duration::from_millis(500)));
    }

    #[test]
    fn milestone_replaces_group_pause() {
        let policy = ThrottlePolicy::default();
        assert_eq!(policy.pause_after(100), Some(Duration::from_secs(3)));
        assert_eq!(policy.pause_after(200), Some(Duration::from_secs(3)));
    }

    #[test]
    fn unthrottled_never_pauses() {
        let policy = ThrottlePolicy::unthrottled();
        assert!((0..500).all(|n| policy.pause_after(n).is_none()));
    }

    #[test]
    fn recording_pacer_keeps_order() {
        let pacer = RecordingPacer::new();
        pacer.pause(Duration::from_millis(1));
        pacer.pause(Duration::from_millis(2));
        assert_eq!(
            pacer.pauses(),
            vec![Duration::from_millis(1), Duration::from_millis(2)]
        );
    }
}
