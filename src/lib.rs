//! fiberloom
//!
//! A cooperative priority scheduler and an incremental fiber reconciler.
//!
//! The [`scheduler`] runs prioritised tasks in short time slices and yields to
//! its host between them. The [`reconciler`] turns element trees into host
//! operations: render work is split into units that run inside scheduler
//! tasks, and finished trees are committed to a [`host::HostConfig`] in one
//! synchronous pass.
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use fiberloom::host::MemoryHost;
//! use fiberloom::reconciler::{Element, Reconciler};
//! use fiberloom::scheduler::{Scheduler, VirtualClock};
//!
//! let scheduler = Scheduler::new(VirtualClock::new());
//! let host = Rc::new(MemoryHost::new());
//! let reconciler = Reconciler::new(scheduler.clone(), host.clone());
//! let root = reconciler.create_container(host.container());
//!
//! reconciler
//!     .update_container(Element::host("p").child("hello"), &root)
//!     .unwrap();
//! scheduler.run_until_idle().unwrap();
//! assert_eq!(host.to_markup(), "<p>hello</p>");
//! ```

#![doc(html_root_url = "https://docs.rs/fiberloom")]
#![warn(rust_2018_idioms)]

pub mod host;
pub mod reconciler;
pub mod scheduler;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};

use std::rc::Rc;

use serde::Serialize;
use tracing::debug;

use crate::host::{HostOp, MemoryHost};
use crate::reconciler::{CommitStats, Component, Element, Node, Reconciler, Root, Value};
use crate::scheduler::{Scheduler, SchedulerConfig, VirtualClock};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "fiberloom";

/// Outcome of a demo run.
#[derive(Debug, Clone, Serialize)]
pub struct DemoReport {
    /// Committed markup.
    pub markup: String,
    /// Committed tree as JSON.
    pub tree: serde_json::Value,
    /// Host operations of the last step.
    pub ops: Vec<HostOp>,
    /// Number of commits.
    pub commits: u64,
    /// Statistics of the last commit.
    pub last_commit: CommitStats,
}

struct Demo {
    scheduler: Scheduler,
    host: Rc<MemoryHost>,
    reconciler: Reconciler,
    root: Root,
}

impl Demo {
    fn new(config: SchedulerConfig) -> Self {
        let scheduler = Scheduler::with_config(VirtualClock::new(), config);
        let host = Rc::new(MemoryHost::new());
        let reconciler = Reconciler::new(scheduler.clone(), host.clone());
        let root = reconciler.create_container(host.container());
        Self {
            scheduler,
            host,
            reconciler,
            root,
        }
    }

    fn render(
        &self,
        node: impl Into<Node>,
    ) -> Result<()> {
        self.reconciler.update_container(node, &self.root)?;
        self.scheduler.run_until_idle()?;
        Ok(())
    }

    fn report(&self) -> DemoReport {
        DemoReport {
            markup: self.host.to_markup(),
            tree: self.host.to_json(),
            ops: self.host.take_ops(),
            commits: self.root.commit_count(),
            last_commit: self.root.last_commit(),
        }
    }
}

/// Mount a counter and click its button `clicks` times.
pub fn run_counter(
    config: SchedulerConfig,
    clicks: usize,
) -> Result<DemoReport> {
    let demo = Demo::new(config);
    let counter = Component::new("Counter", |hooks, _| {
        let (count, set) = hooks.use_state(0i64);
        Element::host("div")
            .child(Element::host("span").child(Node::text(&count)))
            .child(
                Element::host("button")
                    .on("click", move |_| {
                        set.set_with(|n| n + 1);
                    })
                    .child("+1"),
            )
            .into()
    });
    demo.render(counter.element())?;

    let button = demo
        .host
        .query("button")
        .context("counter rendered no button")?;
    demo.host.take_ops();
    for _ in 0..clicks {
        demo.reconciler
            .dispatch_event(&demo.root, button, "click", &Value::Null)?;
        demo.scheduler.run_until_idle()?;
    }
    debug!("counter clicked {} times", clicks);
    Ok(demo.report())
}

/// Render a keyed list of `from`, then reorder it to `to`.
///
/// The report carries the host operations of the reorder only.
pub fn run_list(
    config: SchedulerConfig,
    from: &[String],
    to: &[String],
) -> Result<DemoReport> {
    let demo = Demo::new(config);
    let list = |keys: &[String]| -> Node {
        Element::host("ul")
            .children(
                keys.iter()
                    .map(|key| Element::host("li").key(key).child(key.as_str()).into()),
            )
            .into()
    };
    demo.render(list(from))?;
    demo.host.take_ops();
    demo.render(list(to))?;
    debug!("list reordered from {:?} to {:?}", from, to);
    Ok(demo.report())
}
