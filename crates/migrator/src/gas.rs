//! Adaptive per-call gas-limit state.
//!
//! The state is an explicit immutable value: each failed attempt derives
//! the next one from the failure kind, so no mutable limit is threaded
//! through retry closures.

use attmig_client::FailureKind;

/// Floor for the first escalation, in gas units. Must be strictly positive
/// and unit-consistent with the limit itself (not a price).
pub const GAS_LIMIT_FLOOR: u64 = 100_000;

/// Safety margin applied under a remote-imposed ceiling: 95%.
const CEILING_MARGIN_NUM: u128 = 95;
const CEILING_MARGIN_DEN: u128 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasLimitState {
    limit: Option<u64>,
}

impl GasLimitState {
    /// No override: the remote estimates the cost.
    pub const fn unset() -> Self {
        Self { limit: None }
    }

    pub const fn forced(limit: u64) -> Self {
        Self { limit: Some(limit) }
    }

    pub const fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// 50% escalation over the current override (or the floor, whichever is
    /// higher). Strictly increasing across successive escalations.
    pub fn escalated(self) -> Self {
        let base = u128::from(self.limit.unwrap_or(0).max(GAS_LIMIT_FLOOR));
        let next = base * 3 / 2;
        Self::forced(u64::try_from(next).unwrap_or(u64::MAX))
    }

    /// Largest limit safely under a remote-imposed ceiling, always strictly
    /// less than the ceiling itself.
    pub fn bounded_to_ceiling(ceiling: u64) -> Self {
        let bounded = u128::from(ceiling) * CEILING_MARGIN_NUM / CEILING_MARGIN_DEN;
        Self::forced(u64::try_from(bounded).unwrap_or(u64::MAX))
    }

    /// Next state after a failed attempt. Anything the tuner does not
    /// recognize abandons the override and goes back to remote estimation.
    pub fn next_for_failure(self, kind: FailureKind) -> Self {
        match kind {
            FailureKind::UnderestimatedLimit => self.escalated(),
            FailureKind::ExceedsCeiling { ceiling, .. } => Self::bounded_to_ceiling(ceiling),
            FailureKind::Transient => Self::unset(),
        }
    }
}
