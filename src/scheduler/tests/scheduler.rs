//! Scheduler 单元测试
//!
//! 测试任务调度顺序、延迟任务、时间切片和错误传播

use crate::scheduler::{
    BoxError, Clock, Continuation, PriorityLevel, ScheduleOptions, Scheduler, SchedulerConfig,
    SchedulerError, TaskId, VirtualClock,
};
use std::cell::RefCell;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<String>>>;

fn setup() -> (Scheduler, VirtualClock, Log) {
    let clock = VirtualClock::new();
    let scheduler = Scheduler::new(clock.clone());
    (scheduler, clock, Rc::new(RefCell::new(Vec::new())))
}

fn record(
    log: &Log,
    name: &'static str,
) -> impl FnOnce(bool) -> Result<Continuation, BoxError> + 'static {
    let log = log.clone();
    move |_| {
        log.borrow_mut().push(name.to_string());
        Ok(Continuation::Done)
    }
}

fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

#[cfg(test)]
mod ordering_tests {
    use super::*;

    #[test]
    fn test_same_priority_runs_fifo() {
        let (scheduler, _clock, log) = setup();
        scheduler.schedule_callback(PriorityLevel::Normal, record(&log, "a"));
        scheduler.schedule_callback(PriorityLevel::Normal, record(&log, "b"));
        scheduler.flush().unwrap();
        assert_eq!(entries(&log), vec!["a", "b"]);
    }

    #[test]
    fn test_higher_priority_preempts_queue_order() {
        let (scheduler, _clock, log) = setup();
        scheduler.schedule_callback(PriorityLevel::Normal, record(&log, "A"));
        scheduler.schedule_callback(PriorityLevel::UserBlocking, record(&log, "B"));
        scheduler.schedule_callback(PriorityLevel::Immediate, record(&log, "C"));
        scheduler.flush().unwrap();
        assert_eq!(entries(&log), vec!["C", "B", "A"]);
    }

    #[test]
    fn test_idle_runs_last() {
        let (scheduler, _clock, log) = setup();
        scheduler.schedule_callback(PriorityLevel::Idle, record(&log, "idle"));
        scheduler.schedule_callback(PriorityLevel::Low, record(&log, "low"));
        scheduler.schedule_callback(PriorityLevel::Normal, record(&log, "normal"));
        scheduler.flush().unwrap();
        assert_eq!(entries(&log), vec!["normal", "low", "idle"]);
    }

    #[test]
    fn test_first_schedule_requests_host_callback() {
        let (scheduler, _clock, log) = setup();
        assert!(!scheduler.has_host_callback());
        scheduler.schedule_callback(PriorityLevel::Normal, record(&log, "a"));
        assert!(scheduler.has_host_callback());
        assert_eq!(scheduler.ready_len(), 1);
        assert!(!scheduler.perform_work_until_deadline().unwrap());
        assert!(!scheduler.has_host_callback());
        assert_eq!(scheduler.ready_len(), 0);
    }

    #[test]
    fn test_task_ids_are_monotonic() {
        let (scheduler, _clock, log) = setup();
        let a = scheduler.schedule_callback(PriorityLevel::Normal, record(&log, "a"));
        let b = scheduler.schedule_callback(PriorityLevel::Low, record(&log, "b"));
        assert!(a.id() < b.id());
        assert_eq!(a.id(), TaskId(1));
    }
}

#[cfg(test)]
mod cancel_tests {
    use super::*;

    #[test]
    fn test_cancelled_task_is_skipped() {
        let (scheduler, _clock, log) = setup();
        let a = scheduler.schedule_callback(PriorityLevel::Normal, record(&log, "a"));
        scheduler.schedule_callback(PriorityLevel::Normal, record(&log, "b"));
        scheduler.cancel_callback(&a);
        assert!(a.is_cancelled());
        // still queued until it reaches the top
        assert_eq!(scheduler.ready_len(), 2);
        scheduler.flush().unwrap();
        assert_eq!(entries(&log), vec!["b"]);
        assert_eq!(scheduler.ready_len(), 0);
    }

    #[test]
    fn test_cancelled_delayed_task_never_runs() {
        let (scheduler, clock, log) = setup();
        let handle = scheduler.schedule_callback_with(
            PriorityLevel::Normal,
            record(&log, "late"),
            ScheduleOptions::delayed(10),
        );
        scheduler.cancel_callback(&handle);
        clock.advance(20);
        scheduler.run_until_idle().unwrap();
        assert!(entries(&log).is_empty());
        assert_eq!(scheduler.delayed_len(), 0);
    }
}

#[cfg(test)]
mod delayed_tests {
    use super::*;

    #[test]
    fn test_delayed_task_waits_for_start_time() {
        let (scheduler, clock, log) = setup();
        scheduler.schedule_callback_with(
            PriorityLevel::Normal,
            record(&log, "delayed"),
            ScheduleOptions::delayed(50),
        );
        assert_eq!(scheduler.ready_len(), 0);
        assert_eq!(scheduler.delayed_len(), 1);
        assert_eq!(scheduler.host_timeout_deadline(), Some(50));
        assert!(!scheduler.has_host_callback());

        scheduler.flush().unwrap();
        assert!(entries(&log).is_empty());

        clock.advance(49);
        assert!(!scheduler.fire_host_timeout());
        assert!(entries(&log).is_empty());

        clock.advance(1);
        assert!(scheduler.fire_host_timeout());
        assert_eq!(scheduler.ready_len(), 1);
        assert_eq!(scheduler.delayed_len(), 0);
        assert!(scheduler.has_host_callback());

        scheduler.flush().unwrap();
        assert_eq!(entries(&log), vec!["delayed"]);
    }

    #[test]
    fn test_run_until_idle_advances_virtual_time() {
        let (scheduler, clock, log) = setup();
        scheduler.schedule_callback_with(
            PriorityLevel::Normal,
            record(&log, "second"),
            ScheduleOptions::delayed(100),
        );
        scheduler.schedule_callback_with(
            PriorityLevel::Normal,
            record(&log, "first"),
            ScheduleOptions::delayed(40),
        );
        scheduler.schedule_callback(PriorityLevel::Low, record(&log, "now"));
        scheduler.run_until_idle().unwrap();
        assert_eq!(entries(&log), vec!["now", "first", "second"]);
        assert_eq!(clock.now(), 100);
        assert!(!scheduler.has_pending_work());
    }

    #[test]
    fn test_promoted_task_keyed_by_expiration() {
        let (scheduler, clock, log) = setup();
        scheduler.schedule_callback(PriorityLevel::Low, record(&log, "low"));
        scheduler.schedule_callback_with(
            PriorityLevel::UserBlocking,
            record(&log, "blocking"),
            ScheduleOptions::delayed(5),
        );
        clock.advance(5);
        scheduler.flush().unwrap();
        // low expires at 10000, the promoted task at 5 + 250
        assert_eq!(entries(&log), vec!["blocking", "low"]);
    }
}

#[cfg(test)]
mod time_slice_tests {
    use super::*;

    fn slow(
        log: &Log,
        clock: &VirtualClock,
        name: &'static str,
        cost: i64,
    ) -> impl FnOnce(bool) -> Result<Continuation, BoxError> + 'static {
        let log = log.clone();
        let clock = clock.clone();
        move |_| {
            log.borrow_mut().push(name.to_string());
            clock.advance(cost);
            Ok(Continuation::Done)
        }
    }

    #[test]
    fn test_yields_after_frame_interval() {
        let (scheduler, clock, log) = setup();
        scheduler.schedule_callback(PriorityLevel::Normal, slow(&log, &clock, "a", 3));
        scheduler.schedule_callback(PriorityLevel::Normal, slow(&log, &clock, "b", 3));
        scheduler.schedule_callback(PriorityLevel::Normal, slow(&log, &clock, "c", 3));

        assert!(scheduler.perform_work_until_deadline().unwrap());
        assert_eq!(entries(&log), vec!["a", "b"]);
        assert!(scheduler.has_host_callback());

        assert!(!scheduler.perform_work_until_deadline().unwrap());
        assert_eq!(entries(&log), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_expired_tasks_do_not_yield() {
        let (scheduler, clock, log) = setup();
        scheduler.schedule_callback(PriorityLevel::Immediate, slow(&log, &clock, "a", 10));
        scheduler.schedule_callback(PriorityLevel::Immediate, slow(&log, &clock, "b", 10));
        assert!(!scheduler.perform_work_until_deadline().unwrap());
        assert_eq!(entries(&log), vec!["a", "b"]);
    }

    #[test]
    fn test_custom_frame_interval() {
        let clock = VirtualClock::new();
        let config = SchedulerConfig {
            frame_interval_ms: 20,
            ..SchedulerConfig::default()
        };
        let scheduler = Scheduler::with_config(clock.clone(), config);
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        for name in ["a", "b", "c"] {
            scheduler.schedule_callback(PriorityLevel::Normal, slow(&log, &clock, name, 5));
        }
        assert!(!scheduler.perform_work_until_deadline().unwrap());
        assert_eq!(entries(&log).len(), 3);
    }

    #[test]
    fn test_should_yield_tracks_slice_start() {
        let (scheduler, clock, _log) = setup();
        let probe = scheduler.clone();
        let probe_clock = clock.clone();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        scheduler.schedule_callback(PriorityLevel::Normal, move |_| {
            sink.borrow_mut().push(probe.should_yield());
            probe_clock.advance(5);
            sink.borrow_mut().push(probe.should_yield());
            Ok(Continuation::Done)
        });
        scheduler.flush().unwrap();
        assert_eq!(*seen.borrow(), vec![false, true]);
    }
}

#[cfg(test)]
mod continuation_tests {
    use super::*;

    #[test]
    fn test_continuation_keeps_task_slot() {
        let (scheduler, _clock, log) = setup();
        let first = log.clone();
        let handle = scheduler.schedule_callback(PriorityLevel::Normal, move |_| {
            first.borrow_mut().push("step 1".to_string());
            let second = first.clone();
            Ok(Continuation::then(move |_| {
                second.borrow_mut().push("step 2".to_string());
                Ok(Continuation::Done)
            }))
        });
        scheduler.schedule_callback(PriorityLevel::Normal, record(&log, "other"));

        // a continuation ends the slice
        assert!(scheduler.perform_work_until_deadline().unwrap());
        assert_eq!(entries(&log), vec!["step 1"]);
        assert!(!handle.is_cancelled());

        scheduler.flush().unwrap();
        assert_eq!(entries(&log), vec!["step 1", "step 2", "other"]);
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_callbacks_can_schedule_more_work() {
        let (scheduler, _clock, log) = setup();
        let inner_scheduler = scheduler.clone();
        let inner_log = log.clone();
        scheduler.schedule_callback(PriorityLevel::Normal, move |_| {
            inner_log.borrow_mut().push("outer".to_string());
            inner_scheduler.schedule_callback(PriorityLevel::Immediate, record(&inner_log, "inner"));
            Ok(Continuation::Done)
        });
        scheduler.schedule_callback(PriorityLevel::Normal, record(&log, "sibling"));
        scheduler.flush().unwrap();
        assert_eq!(entries(&log), vec!["outer", "inner", "sibling"]);
    }

    #[test]
    fn test_current_priority_visible_inside_callback() {
        let (scheduler, _clock, _log) = setup();
        let probe = scheduler.clone();
        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        scheduler.schedule_callback(PriorityLevel::UserBlocking, move |_| {
            *sink.borrow_mut() = Some(probe.current_priority_level());
            Ok(Continuation::Done)
        });
        scheduler.flush().unwrap();
        assert_eq!(*seen.borrow(), Some(PriorityLevel::UserBlocking));
        assert_eq!(scheduler.current_priority_level(), PriorityLevel::Normal);
    }

    #[test]
    fn test_run_with_priority_restores_previous_level() {
        let (scheduler, _clock, _log) = setup();
        let inner = scheduler.clone();
        let seen = scheduler.run_with_priority(PriorityLevel::Low, || {
            let nested = inner.run_with_priority(PriorityLevel::Immediate, || inner.current_priority_level());
            (inner.current_priority_level(), nested)
        });
        assert_eq!(seen, (PriorityLevel::Low, PriorityLevel::Immediate));
        assert_eq!(scheduler.current_priority_level(), PriorityLevel::Normal);
    }

    #[test]
    fn test_did_timeout_flag() {
        let (scheduler, clock, _log) = setup();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for priority in [PriorityLevel::Immediate, PriorityLevel::Normal] {
            let sink = seen.clone();
            scheduler.schedule_callback(priority, move |did_timeout| {
                sink.borrow_mut().push(did_timeout);
                Ok(Continuation::Done)
            });
        }
        scheduler.flush().unwrap();
        assert_eq!(*seen.borrow(), vec![true, false]);

        let sink = seen.clone();
        scheduler.schedule_callback(PriorityLevel::UserBlocking, move |did_timeout| {
            sink.borrow_mut().push(did_timeout);
            Ok(Continuation::Done)
        });
        clock.advance(300);
        scheduler.flush().unwrap();
        assert_eq!(seen.borrow().last(), Some(&true));
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_error_propagates_without_retry() {
        let (scheduler, _clock, log) = setup();
        let attempts = Rc::new(RefCell::new(0));
        let counter = attempts.clone();
        scheduler.schedule_callback(PriorityLevel::UserBlocking, move |_| {
            *counter.borrow_mut() += 1;
            Err("boom".into())
        });
        scheduler.schedule_callback(PriorityLevel::Normal, record(&log, "after"));

        let err = scheduler.perform_work_until_deadline().unwrap_err();
        match &err {
            SchedulerError::TaskFailed { task, source } => {
                assert_eq!(*task, TaskId(1));
                assert_eq!(source.to_string(), "boom");
            }
        }
        assert!(err.to_string().contains("Task(1)"));
        assert!(!scheduler.is_performing_work());
        assert_eq!(scheduler.current_priority_level(), PriorityLevel::Normal);
        assert!(scheduler.has_host_callback());

        scheduler.flush().unwrap();
        assert_eq!(*attempts.borrow(), 1);
        assert_eq!(entries(&log), vec!["after"]);
    }
}
