use fiberloom::host::HostOp;
use fiberloom::scheduler::SchedulerConfig;
use fiberloom::{run_counter, run_list};

#[test]
fn test_counter_demo() {
    let report = run_counter(SchedulerConfig::default(), 4).unwrap();
    assert_eq!(report.markup, "<div><span>4</span><button>+1</button></div>");
    assert_eq!(report.commits, 5);
    // span text, plus the button whose listener changed
    assert_eq!(report.last_commit.updates, 2);
}

#[test]
fn test_list_demo_reports_reorder_ops() {
    let keys = |s: &str| s.split(',').map(str::to_string).collect::<Vec<_>>();
    let report = run_list(SchedulerConfig::default(), &keys("a,b,c"), &keys("c,a,b")).unwrap();
    assert_eq!(report.markup, "<ul><li>c</li><li>a</li><li>b</li></ul>");
    assert_eq!(report.last_commit.placements, 2);
    assert!(report.ops.iter().all(|op| !matches!(op, HostOp::CreateInstance { .. })));
    assert_eq!(report.commits, 2);
}
