//! Error types for the motion core.

/// Errors returned by [`Planner::append`](crate::planner::Planner::append).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt-support", derive(defmt::Format))]
pub enum PlanError {
    /// The block ring is full. Transient: retry once the executor has
    /// discarded a block. Callers must not drop the move.
    BufferFull,
    /// The move rounds to zero steps on every axis (or carried non-finite
    /// input). Permanent: acknowledge the line and discard it.
    EmptyBlock,
    /// The planner position is stale after an alarm. Call
    /// [`sync_position`](crate::planner::Planner::sync_position) first.
    PositionUnsynced,
}

impl core::fmt::Display for PlanError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PlanError::BufferFull => f.write_str("planner buffer full"),
            PlanError::EmptyBlock => f.write_str("zero-length move"),
            PlanError::PositionUnsynced => f.write_str("planner position not synchronized"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PlanError {}
