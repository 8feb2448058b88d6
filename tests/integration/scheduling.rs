use std::cell::RefCell;
use std::rc::Rc;

use fiberloom::scheduler::{Clock, Continuation, PriorityLevel, ScheduleOptions, Scheduler, VirtualClock};

fn logging(
    log: &Rc<RefCell<Vec<String>>>,
    name: &'static str,
) -> impl FnOnce(bool) -> Result<Continuation, fiberloom::scheduler::BoxError> + 'static {
    let log = log.clone();
    move |_| {
        log.borrow_mut().push(name.to_string());
        Ok(Continuation::Done)
    }
}

#[test]
fn test_tasks_run_by_priority() {
    let scheduler = Scheduler::new(VirtualClock::new());
    let log = Rc::new(RefCell::new(Vec::new()));
    scheduler.schedule_callback(PriorityLevel::Idle, logging(&log, "idle"));
    scheduler.schedule_callback(PriorityLevel::Normal, logging(&log, "normal"));
    scheduler.schedule_callback(PriorityLevel::Immediate, logging(&log, "immediate"));
    scheduler.schedule_callback(PriorityLevel::UserBlocking, logging(&log, "user-blocking"));
    scheduler.schedule_callback(PriorityLevel::Low, logging(&log, "low"));

    scheduler.run_until_idle().unwrap();
    assert_eq!(*log.borrow(), vec!["immediate", "user-blocking", "normal", "low", "idle"]);
}

#[test]
fn test_host_loop_waits_for_timers() {
    let clock = VirtualClock::new();
    let scheduler = Scheduler::new(clock.clone());
    let log = Rc::new(RefCell::new(Vec::new()));
    scheduler.schedule_callback_with(PriorityLevel::Normal, logging(&log, "late"), ScheduleOptions::delayed(100));
    scheduler.schedule_callback(PriorityLevel::Normal, logging(&log, "now"));

    scheduler.run_until_idle().unwrap();
    assert_eq!(*log.borrow(), vec!["now", "late"]);
    assert!(clock.now() >= 100);
    assert!(!scheduler.has_pending_work());
}

#[test]
fn test_cancelled_task_never_runs() {
    let scheduler = Scheduler::new(VirtualClock::new());
    let log = Rc::new(RefCell::new(Vec::new()));
    let handle = scheduler.schedule_callback(PriorityLevel::Normal, logging(&log, "cancelled"));
    scheduler.schedule_callback(PriorityLevel::Normal, logging(&log, "kept"));
    scheduler.cancel_callback(&handle);

    scheduler.run_until_idle().unwrap();
    assert_eq!(*log.borrow(), vec!["kept"]);
}
