//! The resource ledger: authoritative per-resource-type state.
//!
//! One [`ResourceState`] per [`ResourceType`] holds the current amount and
//! capacity plus the derived instantaneous rates. The invariant
//! `0 <= current <= capacity` holds at every observable instant: an addition
//! that would overflow is clamped to capacity and reported (the engine turns
//! the report into a `STATUS_CHANGED` event), an addition that would go
//! negative is rejected with `OutOfRange` and leaves the ledger untouched.

use serde::{Deserialize, Serialize};

use crate::error::FlowError;
use crate::fixed::{ticks_to_fixed64, Fixed64};
use crate::resource::{PerResource, ResourceType};
use crate::sim::SimTime;

// ---------------------------------------------------------------------------
// Per-type state
// ---------------------------------------------------------------------------

/// Ledger state for one resource type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Amount currently held. Always within `[0, capacity]`.
    pub current: Fixed64,
    /// Upper bound for `current`.
    pub capacity: Fixed64,
    /// Amount added last tick divided by the tick's `dt`. Derived, not
    /// authoritative.
    pub production_rate: Fixed64,
    /// Amount removed last tick divided by the tick's `dt`. Derived.
    pub consumption_rate: Fixed64,
}

// ---------------------------------------------------------------------------
// Mutation outcomes
// ---------------------------------------------------------------------------

/// What an `add` actually did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AddOutcome {
    /// The delta applied after clamping.
    pub applied: Fixed64,
    /// Overflow discarded by the capacity clamp, if any.
    pub clamped: Option<Fixed64>,
}

/// What a `consume_up_to` actually took.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsumeOutcome {
    /// Amount removed from the ledger.
    pub taken: Fixed64,
    /// Requested amount that was not available.
    pub shortfall: Fixed64,
}

impl ConsumeOutcome {
    /// Whether the full requested amount was served.
    pub fn satisfied(&self) -> bool {
        self.shortfall == Fixed64::ZERO
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Authoritative per-resource-type store.
///
/// All mutation is synchronous; the engine serializes calls within a tick so
/// ledger mutations are total-ordered relative to each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    states: PerResource<ResourceState>,
    /// Gross amount added this tick, reset by `end_tick`.
    produced_this_tick: PerResource<Fixed64>,
    /// Gross amount removed this tick, reset by `end_tick`.
    consumed_this_tick: PerResource<Fixed64>,
}

impl Ledger {
    /// Create a ledger with the given per-type capacities and zero amounts.
    pub fn new(capacities: PerResource<Fixed64>) -> Self {
        Self {
            states: PerResource::from_fn(|r| ResourceState {
                capacity: capacities[r],
                ..ResourceState::default()
            }),
            produced_this_tick: PerResource::default(),
            consumed_this_tick: PerResource::default(),
        }
    }

    /// Current amount for a resource type.
    #[inline]
    pub fn amount(&self, resource: ResourceType) -> Fixed64 {
        self.states[resource].current
    }

    /// Capacity for a resource type.
    #[inline]
    pub fn capacity(&self, resource: ResourceType) -> Fixed64 {
        self.states[resource].capacity
    }

    /// Free headroom for a resource type.
    #[inline]
    pub fn free(&self, resource: ResourceType) -> Fixed64 {
        let s = &self.states[resource];
        s.capacity - s.current
    }

    /// Full state for a resource type.
    pub fn state(&self, resource: ResourceType) -> &ResourceState {
        &self.states[resource]
    }

    /// `current / capacity`, or zero when capacity is zero.
    pub fn utilization(&self, resource: ResourceType) -> Fixed64 {
        let s = &self.states[resource];
        if s.capacity == Fixed64::ZERO {
            Fixed64::ZERO
        } else {
            s.current / s.capacity
        }
    }

    /// Utilization for every resource type, in canonical order.
    pub fn utilization_table(&self) -> PerResource<Fixed64> {
        PerResource::from_fn(|r| self.utilization(r))
    }

    /// Amount produced so far in the current tick (reset by `end_tick`).
    pub fn produced_this_tick(&self, resource: ResourceType) -> Fixed64 {
        self.produced_this_tick[resource]
    }

    /// Amount consumed so far in the current tick (reset by `end_tick`).
    pub fn consumed_this_tick(&self, resource: ResourceType) -> Fixed64 {
        self.consumed_this_tick[resource]
    }

    /// Apply a signed delta to one resource.
    ///
    /// A result above capacity is clamped and the discarded overflow is
    /// reported in the outcome. A result below zero is rejected with
    /// [`FlowError::OutOfRange`] without mutating anything.
    pub fn add(&mut self, resource: ResourceType, delta: Fixed64) -> Result<AddOutcome, FlowError> {
        let state = &mut self.states[resource];
        let attempted = state.current + delta;
        if attempted < Fixed64::ZERO {
            return Err(FlowError::OutOfRange {
                resource,
                attempted,
            });
        }

        let (new_current, clamped) = if attempted > state.capacity {
            (state.capacity, Some(attempted - state.capacity))
        } else {
            (attempted, None)
        };

        let applied = new_current - state.current;
        state.current = new_current;

        if applied > Fixed64::ZERO {
            self.produced_this_tick[resource] += applied;
        } else {
            self.consumed_this_tick[resource] -= applied;
        }

        Ok(AddOutcome { applied, clamped })
    }

    /// Remove up to `want` of a resource, taking what is available.
    ///
    /// Never fails: a shortfall is reported in the outcome so the caller can
    /// decide whether it matters (required consumption publishes a shortage
    /// event, optional consumption shrugs).
    pub fn consume_up_to(&mut self, resource: ResourceType, want: Fixed64) -> ConsumeOutcome {
        let available = self.states[resource].current;
        let taken = want.min(available);
        self.states[resource].current -= taken;
        self.consumed_this_tick[resource] += taken;
        ConsumeOutcome {
            taken,
            shortfall: want - taken,
        }
    }

    /// Set a resource's capacity. Clamps `current` down when the new
    /// capacity is below it and returns the discarded amount.
    pub fn set_capacity(
        &mut self,
        resource: ResourceType,
        capacity: Fixed64,
    ) -> Result<Option<Fixed64>, FlowError> {
        if capacity < Fixed64::ZERO {
            return Err(FlowError::Configuration(format!(
                "capacity for {resource} must be non-negative, got {capacity}"
            )));
        }
        let state = &mut self.states[resource];
        state.capacity = capacity;
        if state.current > capacity {
            let discarded = state.current - capacity;
            state.current = capacity;
            Ok(Some(discarded))
        } else {
            Ok(None)
        }
    }

    /// Fold this tick's gross flows into the derived rates and reset the
    /// accumulators. Called once per tick by the engine.
    pub fn end_tick(&mut self, dt: SimTime) {
        let dt_fixed = ticks_to_fixed64(dt);
        for r in ResourceType::ALL {
            let state = &mut self.states[r];
            if dt == 0 {
                state.production_rate = Fixed64::ZERO;
                state.consumption_rate = Fixed64::ZERO;
            } else {
                state.production_rate = self.produced_this_tick[r] / dt_fixed;
                state.consumption_rate = self.consumed_this_tick[r] / dt_fixed;
            }
            self.produced_this_tick[r] = Fixed64::ZERO;
            self.consumed_this_tick[r] = Fixed64::ZERO;
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::f64_to_fixed64 as fx;

    fn ledger_with_capacity(cap: f64) -> Ledger {
        Ledger::new(PerResource::splat(fx(cap)))
    }

    // -----------------------------------------------------------------------
    // Test 1: add_within_bounds
    // -----------------------------------------------------------------------
    #[test]
    fn add_within_bounds() {
        let mut ledger = ledger_with_capacity(100.0);
        let outcome = ledger.add(ResourceType::Minerals, fx(30.0)).unwrap();
        assert_eq!(outcome.applied, fx(30.0));
        assert!(outcome.clamped.is_none());
        assert_eq!(ledger.amount(ResourceType::Minerals), fx(30.0));
    }

    // -----------------------------------------------------------------------
    // Test 2: add_clamps_on_overflow
    // -----------------------------------------------------------------------
    #[test]
    fn add_clamps_on_overflow() {
        let mut ledger = ledger_with_capacity(100.0);
        ledger.add(ResourceType::Gas, fx(90.0)).unwrap();
        let outcome = ledger.add(ResourceType::Gas, fx(25.0)).unwrap();
        assert_eq!(outcome.applied, fx(10.0));
        assert_eq!(outcome.clamped, Some(fx(15.0)));
        assert_eq!(ledger.amount(ResourceType::Gas), fx(100.0));
    }

    // -----------------------------------------------------------------------
    // Test 3: add_rejects_negative_result
    // -----------------------------------------------------------------------
    #[test]
    fn add_rejects_negative_result() {
        let mut ledger = ledger_with_capacity(100.0);
        ledger.add(ResourceType::Energy, fx(5.0)).unwrap();
        let err = ledger.add(ResourceType::Energy, fx(-8.0)).unwrap_err();
        assert!(matches!(
            err,
            FlowError::OutOfRange {
                resource: ResourceType::Energy,
                ..
            }
        ));
        // Rejected mutation leaves the amount untouched.
        assert_eq!(ledger.amount(ResourceType::Energy), fx(5.0));
    }

    // -----------------------------------------------------------------------
    // Test 4: consume_up_to_reports_shortfall
    // -----------------------------------------------------------------------
    #[test]
    fn consume_up_to_reports_shortfall() {
        let mut ledger = ledger_with_capacity(100.0);
        ledger.add(ResourceType::Minerals, fx(3.0)).unwrap();
        let outcome = ledger.consume_up_to(ResourceType::Minerals, fx(5.0));
        assert_eq!(outcome.taken, fx(3.0));
        assert_eq!(outcome.shortfall, fx(2.0));
        assert!(!outcome.satisfied());
        assert_eq!(ledger.amount(ResourceType::Minerals), fx(0.0));
    }

    // -----------------------------------------------------------------------
    // Test 5: consume_up_to_exact
    // -----------------------------------------------------------------------
    #[test]
    fn consume_up_to_exact() {
        let mut ledger = ledger_with_capacity(100.0);
        ledger.add(ResourceType::Minerals, fx(10.0)).unwrap();
        let outcome = ledger.consume_up_to(ResourceType::Minerals, fx(10.0));
        assert_eq!(outcome.taken, fx(10.0));
        assert!(outcome.satisfied());
    }

    // -----------------------------------------------------------------------
    // Test 6: set_capacity_clamps_current
    // -----------------------------------------------------------------------
    #[test]
    fn set_capacity_clamps_current() {
        let mut ledger = ledger_with_capacity(100.0);
        ledger.add(ResourceType::Gas, fx(80.0)).unwrap();
        let discarded = ledger.set_capacity(ResourceType::Gas, fx(50.0)).unwrap();
        assert_eq!(discarded, Some(fx(30.0)));
        assert_eq!(ledger.amount(ResourceType::Gas), fx(50.0));
        assert_eq!(ledger.capacity(ResourceType::Gas), fx(50.0));
    }

    // -----------------------------------------------------------------------
    // Test 7: set_capacity_rejects_negative
    // -----------------------------------------------------------------------
    #[test]
    fn set_capacity_rejects_negative() {
        let mut ledger = ledger_with_capacity(100.0);
        let err = ledger
            .set_capacity(ResourceType::Gas, fx(-1.0))
            .unwrap_err();
        assert!(matches!(err, FlowError::Configuration(_)));
    }

    // -----------------------------------------------------------------------
    // Test 8: utilization
    // -----------------------------------------------------------------------
    #[test]
    fn utilization() {
        let mut ledger = ledger_with_capacity(200.0);
        ledger.add(ResourceType::Energy, fx(50.0)).unwrap();
        assert_eq!(ledger.utilization(ResourceType::Energy), fx(0.25));
        assert_eq!(ledger.utilization(ResourceType::Minerals), fx(0.0));
    }

    // -----------------------------------------------------------------------
    // Test 9: utilization_zero_capacity
    // -----------------------------------------------------------------------
    #[test]
    fn utilization_zero_capacity() {
        let ledger = ledger_with_capacity(0.0);
        assert_eq!(ledger.utilization(ResourceType::Minerals), fx(0.0));
    }

    // -----------------------------------------------------------------------
    // Test 10: derived_rates
    // -----------------------------------------------------------------------
    #[test]
    fn derived_rates() {
        let mut ledger = ledger_with_capacity(100.0);
        ledger.add(ResourceType::Minerals, fx(20.0)).unwrap();
        ledger.consume_up_to(ResourceType::Minerals, fx(5.0));
        ledger.end_tick(2);
        let state = ledger.state(ResourceType::Minerals);
        assert_eq!(state.production_rate, fx(10.0));
        assert_eq!(state.consumption_rate, fx(2.5));

        // Accumulators reset: a quiet tick zeroes the rates.
        ledger.end_tick(2);
        let state = ledger.state(ResourceType::Minerals);
        assert_eq!(state.production_rate, fx(0.0));
        assert_eq!(state.consumption_rate, fx(0.0));
    }

    // -----------------------------------------------------------------------
    // Test 11: zero_dt_zeroes_rates
    // -----------------------------------------------------------------------
    #[test]
    fn zero_dt_zeroes_rates() {
        let mut ledger = ledger_with_capacity(100.0);
        ledger.add(ResourceType::Gas, fx(20.0)).unwrap();
        ledger.end_tick(0);
        assert_eq!(ledger.state(ResourceType::Gas).production_rate, fx(0.0));
    }
}
