//! Host binding contract.
//!
//! The reconciler never touches the target tree directly. Every native node
//! is created and mutated through a [`HostConfig`], identified by an opaque
//! [`HostNode`] handle.

pub mod memory;

pub use memory::{HostOp, MemoryHost};

use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use thiserror::Error;

use crate::reconciler::element::{Props, Value};
use crate::reconciler::events::EventPriority;

/// Handle of a native node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct HostNode(pub u64);

impl fmt::Display for HostNode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Host binding failures.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("unknown host node {0}")]
    UnknownNode(HostNode),
    #[error("{child} is not a child of {parent}")]
    NotAChild { parent: HostNode, child: HostNode },
    #[error("text node {0} cannot have children")]
    TextParent(HostNode),
    #[error("cannot insert {0} into itself or its descendant")]
    Cycle(HostNode),
}

/// Result type of host operations.
pub type HostResult<T> = Result<T, HostError>;

/// One property change computed during completion and applied at commit.
#[derive(Debug, Clone)]
pub enum PropUpdate {
    Set(Rc<str>, Value),
    Remove(Rc<str>),
    TextContent(Rc<str>),
}

/// Operations the reconciler needs from a host environment.
///
/// Listener props are never forwarded to the host; they are resolved by
/// [`Reconciler::dispatch_event`](crate::reconciler::Reconciler::dispatch_event).
pub trait HostConfig {
    /// Create an element node. Attributes are applied separately.
    fn create_instance(
        &self,
        ty: &str,
        props: &Props,
    ) -> HostResult<HostNode>;

    fn create_text_instance(
        &self,
        text: &str,
    ) -> HostResult<HostNode>;

    fn set_property(
        &self,
        node: HostNode,
        name: &str,
        value: &Value,
    ) -> HostResult<()>;

    fn remove_property(
        &self,
        node: HostNode,
        name: &str,
    ) -> HostResult<()>;

    /// Replace all content of an element with `text`.
    fn set_text_content(
        &self,
        node: HostNode,
        text: &str,
    ) -> HostResult<()>;

    /// Change the text of a text node.
    fn commit_text_update(
        &self,
        node: HostNode,
        text: &str,
    ) -> HostResult<()>;

    /// Append `child`, moving it if it is already attached.
    fn append_child(
        &self,
        parent: HostNode,
        child: HostNode,
    ) -> HostResult<()>;

    /// Insert `child` before `before`, moving it if it is already attached.
    fn insert_before(
        &self,
        parent: HostNode,
        child: HostNode,
        before: HostNode,
    ) -> HostResult<()>;

    fn remove_child(
        &self,
        parent: HostNode,
        child: HostNode,
    ) -> HostResult<()>;

    /// Whether the element's children are rendered as its own text content
    /// instead of child nodes.
    fn should_set_text_content(
        &self,
        _ty: &str,
        props: &Props,
    ) -> bool {
        props.children().as_text().is_some()
    }

    /// Priority of the event the host is currently dispatching.
    fn current_event_priority(&self) -> EventPriority {
        EventPriority::Default
    }
}

/// Apply one computed property change.
pub(crate) fn apply_prop_update(
    host: &dyn HostConfig,
    node: HostNode,
    update: &PropUpdate,
) -> HostResult<()> {
    match update {
        PropUpdate::Set(name, value) => host.set_property(node, name, value),
        PropUpdate::Remove(name) => host.remove_property(node, name),
        PropUpdate::TextContent(text) => host.set_text_content(node, text),
    }
}
