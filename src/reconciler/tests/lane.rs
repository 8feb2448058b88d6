//! Lane 模型测试

use crate::reconciler::lane::{
    get_highest_priority_lanes, get_next_lanes, lanes_to_scheduler_priority, Lanes, TransitionLaneCursor,
    NO_LANES,
};
use crate::scheduler::PriorityLevel;

#[cfg(test)]
mod selection_tests {
    use super::*;

    #[test]
    fn test_highest_priority_lane_is_lowest_bit() {
        let lanes = Lanes::DEFAULT | Lanes::IDLE | Lanes::INPUT_CONTINUOUS;
        assert_eq!(lanes.highest_priority_lane(), Lanes::INPUT_CONTINUOUS);
        assert_eq!(NO_LANES.highest_priority_lane(), NO_LANES);
    }

    #[test]
    fn test_sync_class_lanes_are_batched() {
        let lanes = Lanes::SYNC | Lanes::DEFAULT | Lanes::TRANSITION_1;
        assert_eq!(get_highest_priority_lanes(lanes), Lanes::SYNC | Lanes::DEFAULT);
    }

    #[test]
    fn test_transition_lanes_are_batched() {
        let second = Lanes::from_bits_retain(Lanes::TRANSITION_1.bits() << 1);
        let lanes = Lanes::TRANSITION_1 | second | Lanes::IDLE;
        assert_eq!(get_highest_priority_lanes(lanes), Lanes::TRANSITION_1 | second);
    }

    #[test]
    fn test_next_lanes_keeps_in_progress_work() {
        let pending = Lanes::TRANSITION_1 | Lanes::IDLE;
        assert_eq!(get_next_lanes(pending, Lanes::TRANSITION_1), Lanes::TRANSITION_1);
        assert_eq!(get_next_lanes(Lanes::IDLE, Lanes::TRANSITION_1), Lanes::TRANSITION_1);
    }

    #[test]
    fn test_next_lanes_interrupts_for_urgent_work() {
        let pending = Lanes::SYNC | Lanes::TRANSITION_1;
        assert_eq!(get_next_lanes(pending, Lanes::TRANSITION_1), Lanes::SYNC);
    }

    #[test]
    fn test_default_does_not_interrupt_transition() {
        let pending = Lanes::DEFAULT | Lanes::TRANSITION_1;
        assert_eq!(get_next_lanes(pending, Lanes::TRANSITION_1), Lanes::TRANSITION_1);
    }

    #[test]
    fn test_nothing_pending() {
        assert_eq!(get_next_lanes(NO_LANES, Lanes::DEFAULT), NO_LANES);
    }
}

#[cfg(test)]
mod mapping_tests {
    use super::*;

    #[test]
    fn test_lanes_to_scheduler_priority() {
        assert_eq!(lanes_to_scheduler_priority(Lanes::SYNC), PriorityLevel::Immediate);
        assert_eq!(lanes_to_scheduler_priority(Lanes::INPUT_CONTINUOUS), PriorityLevel::UserBlocking);
        assert_eq!(lanes_to_scheduler_priority(Lanes::DEFAULT), PriorityLevel::Normal);
        assert_eq!(lanes_to_scheduler_priority(Lanes::TRANSITION_1), PriorityLevel::Normal);
        assert_eq!(lanes_to_scheduler_priority(Lanes::IDLE), PriorityLevel::Idle);
        assert_eq!(lanes_to_scheduler_priority(NO_LANES), PriorityLevel::NoPriority);
    }

    #[test]
    fn test_lane_predicates() {
        assert!(Lanes::TRANSITION_1.includes_only_non_urgent());
        assert!(!(Lanes::DEFAULT | Lanes::TRANSITION_1).includes_only_non_urgent());
        assert!((Lanes::SYNC | Lanes::IDLE).includes_sync());
        assert_eq!(Lanes::SYNC.index(), 0);
        assert_eq!(Lanes::IDLE.index(), 29);
    }

    #[test]
    fn test_transition_cursor_wraps() {
        let cursor = TransitionLaneCursor::new();
        let first = cursor.claim_next();
        assert_eq!(first, Lanes::TRANSITION_1);
        let mut claimed = vec![first];
        loop {
            let lane = cursor.claim_next();
            if lane == first {
                break;
            }
            assert!(lane.is_transition());
            claimed.push(lane);
        }
        assert_eq!(claimed.len(), 16);
    }
}
