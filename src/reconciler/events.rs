//! Event priorities and listener dispatch.
//!
//! Listeners are stored as `on<Event>` props. Dispatching an event walks from
//! the target host node up through its host ancestors and calls each
//! listener under the lane of the event's priority, so updates they raise
//! land in that lane.

use std::fmt;

use super::element::{Listener, Value};
use super::fiber::WorkTag;
use super::lane::{Lane, Lanes};
use super::root::Root;
use super::{Reconciler, ReconcilerError};
use crate::host::HostNode;

/// Priority class of a host event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EventPriority {
    /// Clicks, key presses and other discrete input.
    Discrete,
    /// Pointer moves, scrolls and other continuous input.
    Continuous,
    #[default]
    Default,
    Idle,
}

impl EventPriority {
    /// Lane updates raised under this priority go to.
    pub fn lane(self) -> Lane {
        match self {
            EventPriority::Discrete => Lanes::SYNC,
            EventPriority::Continuous => Lanes::INPUT_CONTINUOUS,
            EventPriority::Default => Lanes::DEFAULT,
            EventPriority::Idle => Lanes::IDLE,
        }
    }

    /// Event priority matching the highest priority lane of `lanes`.
    pub fn from_lanes(lanes: Lanes) -> Self {
        let lane = lanes.highest_priority_lane();
        if lane == Lanes::SYNC {
            EventPriority::Discrete
        } else if !lane.is_empty() && lane.bits() <= Lanes::INPUT_CONTINUOUS.bits() {
            EventPriority::Continuous
        } else if lane.is_empty() || lane.includes_non_idle_work() {
            EventPriority::Default
        } else {
            EventPriority::Idle
        }
    }
}

impl fmt::Display for EventPriority {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            EventPriority::Discrete => "discrete",
            EventPriority::Continuous => "continuous",
            EventPriority::Default => "default",
            EventPriority::Idle => "idle",
        };
        f.write_str(name)
    }
}

const DISCRETE_EVENTS: &[&str] = &[
    "auxclick",
    "beforeinput",
    "blur",
    "cancel",
    "change",
    "click",
    "close",
    "contextmenu",
    "copy",
    "cut",
    "dblclick",
    "focus",
    "focusin",
    "focusout",
    "input",
    "invalid",
    "keydown",
    "keypress",
    "keyup",
    "mousedown",
    "mouseup",
    "paste",
    "pause",
    "play",
    "pointercancel",
    "pointerdown",
    "pointerup",
    "reset",
    "select",
    "submit",
    "touchcancel",
    "touchend",
    "touchstart",
];

const CONTINUOUS_EVENTS: &[&str] = &[
    "drag",
    "dragenter",
    "dragexit",
    "dragleave",
    "dragover",
    "mouseenter",
    "mouseleave",
    "mousemove",
    "mouseout",
    "mouseover",
    "pointerenter",
    "pointerleave",
    "pointermove",
    "pointerout",
    "pointerover",
    "scroll",
    "toggle",
    "touchmove",
    "wheel",
];

/// Priority class of a named event. Unknown events get `Default`.
pub fn event_priority(event: &str) -> EventPriority {
    if DISCRETE_EVENTS.contains(&event) {
        EventPriority::Discrete
    } else if CONTINUOUS_EVENTS.contains(&event) {
        EventPriority::Continuous
    } else {
        EventPriority::Default
    }
}

/// Prop name a listener for `event` is stored under: `click` -> `onClick`.
pub fn event_prop_name(event: &str) -> String {
    let mut chars = event.chars();
    match chars.next() {
        Some(first) => {
            let mut name = String::with_capacity(event.len() + 2);
            name.push_str("on");
            name.extend(first.to_uppercase());
            name.push_str(chars.as_str());
            name
        }
        None => "on".to_string(),
    }
}

/// Listeners for `event` from `target` up to the root, innermost first.
fn collect_listeners(
    root: &Root,
    target: HostNode,
    prop: &str,
) -> Result<Vec<Listener>, ReconcilerError> {
    let instance = root.instance(target).ok_or(ReconcilerError::MissingFiber)?;
    let tree = root.tree();
    let mut listeners = Vec::new();
    let mut fiber = Some(instance.fiber);
    while let Some(id) = fiber {
        let Some(node) = tree.get(id) else {
            break;
        };
        if node.tag == WorkTag::HostComponent {
            let props = node
                .state_node
                .host()
                .and_then(|host| root.instance(host))
                .and_then(|i| i.props);
            match props.as_ref().and_then(|p| p.get(prop)) {
                None | Some(Value::Null) => {}
                Some(Value::Listener(listener)) => listeners.push(listener.clone()),
                Some(other) => {
                    return Err(ReconcilerError::ListenerNotCallable {
                        prop: prop.to_string(),
                        value: other.to_string(),
                    })
                }
            }
        }
        fiber = node.return_fiber;
    }
    Ok(listeners)
}

/// Deliver `event` at `target`. Returns how many listeners ran.
pub(crate) fn dispatch_event(
    reconciler: &Reconciler,
    root: &Root,
    target: HostNode,
    event: &str,
    payload: &Value,
) -> Result<usize, ReconcilerError> {
    let prop = event_prop_name(event);
    let listeners = collect_listeners(root, target, &prop)?;
    let lane = event_priority(event).lane();
    reconciler.with_update_priority(lane, || {
        for listener in &listeners {
            listener.call(payload);
        }
    });
    tracing::trace!("dispatched {} to {} listeners", event, listeners.len());
    Ok(listeners.len())
}
