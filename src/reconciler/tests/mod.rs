//! Reconciler 单元测试

mod context;
mod hooks;
mod lane;
mod work_loop;

use std::cell::RefCell;
use std::rc::Rc;

use crate::host::{HostNode, HostOp, MemoryHost};
use crate::reconciler::{Element, Node, Reconciler, ReconcilerError, Root, Value};
use crate::scheduler::{Scheduler, SchedulerError, VirtualClock};

/// One root on a virtual clock and an in-memory host.
pub(super) struct Harness {
    pub clock: VirtualClock,
    pub scheduler: Scheduler,
    pub host: Rc<MemoryHost>,
    pub reconciler: Reconciler,
    pub root: Root,
}

impl Harness {
    pub fn new() -> Self {
        let clock = VirtualClock::new();
        let scheduler = Scheduler::new(clock.clone());
        let host = Rc::new(MemoryHost::new());
        let reconciler = Reconciler::new(scheduler.clone(), host.clone());
        let root = reconciler.create_container(host.container());
        Self {
            clock,
            scheduler,
            host,
            reconciler,
            root,
        }
    }

    /// Render `node` and run all resulting work.
    pub fn render(
        &self,
        node: impl Into<Node>,
    ) {
        self.reconciler.update_container(node, &self.root).unwrap();
        self.flush();
    }

    pub fn flush(&self) {
        self.scheduler.flush().unwrap();
    }

    /// Run all work and return the reconciler error it ended with.
    pub fn flush_err(&self) -> ReconcilerError {
        match self.scheduler.flush() {
            Err(SchedulerError::TaskFailed { source, .. }) => match source.downcast::<ReconcilerError>() {
                Ok(error) => *error,
                Err(other) => panic!("unexpected error: {other}"),
            },
            Ok(()) => panic!("expected the render to fail"),
        }
    }

    pub fn markup(&self) -> String {
        self.host.to_markup()
    }

    pub fn take_ops(&self) -> Vec<HostOp> {
        self.host.take_ops()
    }

    /// First element with tag `tag`.
    pub fn query(
        &self,
        tag: &str,
    ) -> HostNode {
        self.host
            .query(tag)
            .unwrap_or_else(|| panic!("no <{tag}> in {}", self.markup()))
    }

    pub fn click(
        &self,
        target: HostNode,
    ) -> usize {
        let clicked = self
            .reconciler
            .dispatch_event(&self.root, target, "click", &Value::Null)
            .unwrap();
        self.flush();
        clicked
    }
}

type Log = Rc<RefCell<Vec<String>>>;

fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

/// `<li key=k>k</li>` for each key, inside a `<ul>`.
fn keyed_list(keys: &[&str]) -> Node {
    Element::host("ul")
        .children(
            keys.iter()
                .map(|k| Element::host("li").key(k).child(*k).into()),
        )
        .into()
}

fn count_ops(
    ops: &[HostOp],
    pred: impl Fn(&HostOp) -> bool,
) -> usize {
    ops.iter().filter(|op| pred(op)).count()
}
