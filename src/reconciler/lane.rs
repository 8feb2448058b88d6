//! Lane model.
//!
//! A lane is one bit of a 31-bit set. Lower bits are more urgent, so the
//! lowest set bit of a lane set is its highest priority lane.

use std::cell::Cell;

use bitflags::bitflags;

use crate::scheduler::PriorityLevel;

/// Number of lanes.
pub const TOTAL_LANES: usize = 31;

/// Timestamp used for lanes that have no recorded event.
pub const NO_TIMESTAMP: i64 = -1;

bitflags! {
    /// A set of lanes. A single-bit set is a [`Lane`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Lanes: u32 {
        const SYNC                        = 0b0000000000000000000000000000001;
        const INPUT_CONTINUOUS_HYDRATION  = 0b0000000000000000000000000000010;
        const INPUT_CONTINUOUS            = 0b0000000000000000000000000000100;
        const DEFAULT_HYDRATION           = 0b0000000000000000000000000001000;
        const DEFAULT                     = 0b0000000000000000000000000010000;
        const TRANSITION_HYDRATION        = 0b0000000000000000000000000100000;
        const TRANSITION_1                = 0b0000000000000000000000001000000;
        const TRANSITIONS                 = 0b0000000001111111111111111000000;
        const RETRY_1                     = 0b0000000010000000000000000000000;
        const RETRIES                     = 0b0000111110000000000000000000000;
        const SELECTIVE_HYDRATION         = 0b0001000000000000000000000000000;
        const NON_IDLE                    = 0b0001111111111111111111111111111;
        const IDLE_HYDRATION              = 0b0010000000000000000000000000000;
        const IDLE                        = 0b0100000000000000000000000000000;
        const OFFSCREEN                   = 0b1000000000000000000000000000000;

        /// Lanes that always render before anything else.
        const SYNC_UPDATES = Self::SYNC.bits() | Self::INPUT_CONTINUOUS.bits() | Self::DEFAULT.bits();
    }
}

/// A single lane.
pub type Lane = Lanes;

/// No lanes.
pub const NO_LANES: Lanes = Lanes::empty();
/// No lane.
pub const NO_LANE: Lane = Lanes::empty();

impl Lanes {
    /// Lowest set bit.
    #[inline]
    pub fn highest_priority_lane(self) -> Lane {
        let bits = self.bits();
        Lanes::from_bits_retain(bits & bits.wrapping_neg())
    }

    /// Index of a single lane in a per-lane table.
    #[inline]
    pub fn index(self) -> usize {
        31usize.saturating_sub(self.bits().leading_zeros() as usize)
    }

    /// Union.
    #[inline]
    pub fn merge(
        self,
        other: Lanes,
    ) -> Lanes {
        self | other
    }

    /// `self` without the lanes of `subset`.
    #[inline]
    pub fn without(
        self,
        subset: Lanes,
    ) -> Lanes {
        self.difference(subset)
    }

    /// Whether the two sets overlap.
    #[inline]
    pub fn includes_some(
        self,
        other: Lanes,
    ) -> bool {
        self.intersects(other)
    }

    /// Whether `subset` is fully contained.
    #[inline]
    pub fn is_subset(
        self,
        subset: Lanes,
    ) -> bool {
        self.contains(subset)
    }

    /// Whether any non-idle lane is set.
    #[inline]
    pub fn includes_non_idle_work(self) -> bool {
        self.intersects(Lanes::NON_IDLE)
    }

    /// Whether the lane belongs to the transition block.
    #[inline]
    pub fn is_transition(self) -> bool {
        self.intersects(Lanes::TRANSITIONS)
    }

    /// Whether none of Sync, InputContinuous or Default is set.
    #[inline]
    pub fn includes_only_non_urgent(self) -> bool {
        !self.intersects(Lanes::SYNC_UPDATES)
    }

    /// Whether the set must render without yielding.
    #[inline]
    pub fn includes_sync(self) -> bool {
        self.intersects(Lanes::SYNC)
    }
}

/// Lanes to work on first out of `lanes`.
///
/// Sync-class lanes win together; a transition or retry lane pulls in the
/// rest of its block.
pub fn get_highest_priority_lanes(lanes: Lanes) -> Lanes {
    let pending_sync = lanes & Lanes::SYNC_UPDATES;
    if !pending_sync.is_empty() {
        return pending_sync;
    }
    let highest = lanes.highest_priority_lane();
    if highest.intersects(Lanes::TRANSITIONS) {
        lanes & Lanes::TRANSITIONS
    } else if highest.intersects(Lanes::RETRIES) {
        lanes & Lanes::RETRIES
    } else if highest.is_empty() {
        lanes
    } else {
        highest
    }
}

/// Pick the lanes for the next render pass.
///
/// An in-progress lane set is kept unless the new work is strictly more
/// urgent; Default work never gets absorbed into a transition render.
pub fn get_next_lanes(
    pending_lanes: Lanes,
    wip_lanes: Lanes,
) -> Lanes {
    if pending_lanes.is_empty() {
        return NO_LANES;
    }
    let next_lanes = get_highest_priority_lanes(pending_lanes);
    if next_lanes.is_empty() {
        return NO_LANES;
    }

    if !wip_lanes.is_empty() && wip_lanes != next_lanes {
        let next_lane = next_lanes.highest_priority_lane();
        let wip_lane = wip_lanes.highest_priority_lane();
        if next_lane.bits() >= wip_lane.bits()
            || (next_lane == Lanes::DEFAULT && wip_lane.intersects(Lanes::TRANSITIONS))
        {
            return wip_lanes;
        }
    }
    next_lanes
}

/// Round-robin allocator for transition lanes.
#[derive(Debug)]
pub struct TransitionLaneCursor {
    next: Cell<Lane>,
}

impl TransitionLaneCursor {
    /// Cursor positioned at the first transition lane.
    pub fn new() -> Self {
        Self {
            next: Cell::new(Lanes::TRANSITION_1),
        }
    }

    /// Hand out the next transition lane, wrapping when the block runs out.
    pub fn claim_next(&self) -> Lane {
        let lane = self.next.get();
        let shifted = Lanes::from_bits_retain(lane.bits() << 1);
        if shifted.intersects(Lanes::TRANSITIONS) {
            self.next.set(shifted);
        } else {
            self.next.set(Lanes::TRANSITION_1);
        }
        lane
    }
}

impl Default for TransitionLaneCursor {
    fn default() -> Self {
        Self::new()
    }
}

/// Scheduler priority used to run work for `lanes`.
pub fn lanes_to_scheduler_priority(lanes: Lanes) -> PriorityLevel {
    let lane = get_highest_priority_lanes(lanes).highest_priority_lane();
    if lane.is_empty() {
        PriorityLevel::NoPriority
    } else if lane == Lanes::SYNC {
        PriorityLevel::Immediate
    } else if lane.bits() <= Lanes::INPUT_CONTINUOUS.bits() {
        PriorityLevel::UserBlocking
    } else if lane.includes_non_idle_work() {
        PriorityLevel::Normal
    } else {
        PriorityLevel::Idle
    }
}
