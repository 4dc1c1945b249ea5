//! Clock and random implementations.

use crate::infrastructure::ports::{ClockPort, RandomPort};
use chrono::{DateTime, Utc};

/// System clock - uses real time.
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// System random - uses real randomness.
pub struct SystemRandom;

impl SystemRandom {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomPort for SystemRandom {
    fn gen_suffix(&self) -> u32 {
        use rand::Rng;
        rand::thread_rng().gen()
    }
}

/// Fixed clock for testing.
#[cfg(test)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl ClockPort for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Clock that advances one second per reading, so successive local writes
/// get distinct, increasing timestamps.
#[cfg(test)]
pub struct SteppingClock {
    next: std::sync::atomic::AtomicI64,
}

#[cfg(test)]
impl SteppingClock {
    pub fn starting_at(secs: i64) -> Self {
        Self {
            next: std::sync::atomic::AtomicI64::new(secs),
        }
    }
}

#[cfg(test)]
impl ClockPort for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let secs = self
            .next
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        DateTime::from_timestamp(secs, 0).unwrap_or_default()
    }
}

/// Sequential suffixes for testing.
#[cfg(test)]
pub struct SequenceRandom(pub std::sync::atomic::AtomicU32);

#[cfg(test)]
impl SequenceRandom {
    pub fn new() -> Self {
        Self(std::sync::atomic::AtomicU32::new(1))
    }
}

#[cfg(test)]
impl RandomPort for SequenceRandom {
    fn gen_suffix(&self) -> u32 {
        self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }
}
