//! Simulated time and determinism support types.
//!
//! Time is supplied by an external driver: every `Engine::advance(now)` call
//! is one tick at simulated time `now`. The engine never reads a wall clock,
//! so identical call sequences replay identically.

use crate::fixed::Fixed64;

/// Simulated time, in driver-defined units (tests use 1 per tick or 1000 per
/// second). Task intervals and fire times share this unit.
pub type SimTime = u64;

// ---------------------------------------------------------------------------
// Simulation state
// ---------------------------------------------------------------------------

/// Mutable tick-loop state tracked by the engine.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SimState {
    /// Number of completed ticks.
    pub tick: u64,
    /// Simulated time of the last completed tick. `None` before the first.
    pub now: Option<SimTime>,
}

impl SimState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Span covered by a tick at `now`: the time since the previous tick,
    /// or since the epoch (0) for the first one.
    pub fn dt_to(&self, now: SimTime) -> SimTime {
        now.saturating_sub(self.now.unwrap_or(0))
    }
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// A simple deterministic hash of engine state for replay verification.
///
/// Uses FNV-1a (64-bit) for speed and simplicity. Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    /// Start a new hash.
    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    /// Feed bytes into the hash.
    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    /// Feed a u64 into the hash.
    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    /// Feed a u32 into the hash.
    pub fn write_u32(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    /// Feed a Fixed64 into the hash.
    pub fn write_fixed64(&mut self, v: Fixed64) {
        self.write(&v.to_bits().to_le_bytes());
    }

    /// Finalize and return the hash value.
    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}
