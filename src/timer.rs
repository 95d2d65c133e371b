//! Countdown timers.
//!
//! Both machine timers count down toward zero, one step per tick, and
//! never wrap below it. With the `atomic` feature the counter is an
//! `AtomicU8`, for hosts that tick timers from a 60 Hz interrupt while
//! the chip runs in the main loop.

#[cfg(feature = "atomic")]
use core::sync::atomic::{AtomicU8, Ordering};

/// Observed result of a single countdown step.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimerState {
    /// Timer was already at zero
    Idle,
    /// Timer is still counting down
    Active,
    /// Timer just reached zero on this step
    Expired,
}

#[cfg(not(feature = "atomic"))]
#[derive(Debug)]
pub struct Timer(u8);

#[cfg(not(feature = "atomic"))]
impl Timer {
    pub fn new() -> Self {
        Self(0)
    }

    #[inline]
    pub fn set(&mut self, value: u8) {
        self.0 = value;
    }

    #[inline]
    pub fn get(&self) -> u8 {
        self.0
    }

    #[inline]
    pub fn tick(&mut self) -> TimerState {
        match self.0 {
            0 => TimerState::Idle,
            1 => {
                self.0 = 0;
                TimerState::Expired
            }
            _ => {
                self.0 -= 1;
                TimerState::Active
            }
        }
    }
}

#[cfg(feature = "atomic")]
#[derive(Debug)]
pub struct Timer(AtomicU8);

#[cfg(feature = "atomic")]
impl Timer {
    pub fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    #[inline]
    pub fn set(&mut self, value: u8) {
        self.0.store(value, Ordering::Release);
    }

    #[inline]
    pub fn get(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn tick(&mut self) -> TimerState {
        self.0
            .fetch_update(Ordering::Release, Ordering::Relaxed, |value| {
                Some(value.saturating_sub(1))
            })
            .map(|value| match value {
                0 => TimerState::Idle,
                1 => TimerState::Expired,
                _ => TimerState::Active,
            })
            .unwrap_or(TimerState::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_down_to_zero_and_stays() {
        let mut timer = Timer::new();
        timer.set(3);
        assert_eq!(timer.tick(), TimerState::Active);
        assert_eq!(timer.get(), 2);
        assert_eq!(timer.tick(), TimerState::Active);
        assert_eq!(timer.tick(), TimerState::Expired);
        assert_eq!(timer.get(), 0);
        assert_eq!(timer.tick(), TimerState::Idle);
        assert_eq!(timer.get(), 0);
    }

    #[test]
    fn expires_immediately_from_one() {
        let mut timer = Timer::new();
        timer.set(1);
        assert_eq!(timer.tick(), TimerState::Expired);
        assert_eq!(timer.get(), 0);
    }

    #[test]
    fn idle_when_never_set() {
        let mut timer = Timer::new();
        assert_eq!(timer.tick(), TimerState::Idle);
    }
}
