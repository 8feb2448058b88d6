//! Fiber arena.
//!
//! Fibers live in a [`SlotMap`] and refer to each other by [`FiberId`]. The
//! committed tree and the work-in-progress tree share the arena; a fiber and
//! its `alternate` are the two buffers of one tree position. Stale ids are
//! harmless: lookups on a freed slot return `None`.

use std::cell::RefCell;
use std::ops::{Index, IndexMut};
use std::rc::Rc;

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use super::class::{ClassInstance, ClassQueue};
use super::context::Context;
use super::element::{Element, ElementType, Key, Node, Props};
use super::flags::Flags;
use super::hooks::{Effect, Hook};
use super::lane::{Lanes, NO_LANES};
use crate::host::{HostNode, PropUpdate};

new_key_type! {
    /// Arena index of a fiber.
    pub struct FiberId;
}

/// Kind of tree position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkTag {
    HostRoot,
    HostComponent,
    HostText,
    FunctionComponent,
    ClassComponent,
    Fragment,
    ContextProvider,
    ContextConsumer,
    Memo,
}

impl WorkTag {
    /// Whether fibers of this tag own a host node.
    #[inline]
    pub fn is_host(self) -> bool {
        matches!(self, WorkTag::HostComponent | WorkTag::HostText)
    }

    /// Whether fibers of this tag can be a host parent.
    #[inline]
    pub fn is_host_parent(self) -> bool {
        matches!(self, WorkTag::HostComponent | WorkTag::HostRoot)
    }
}

/// Backing instance of a fiber.
#[derive(Clone, Default)]
pub enum StateNode {
    #[default]
    None,
    Host(HostNode),
    Class(Rc<RefCell<ClassInstance>>),
}

impl StateNode {
    #[inline]
    pub fn host(&self) -> Option<HostNode> {
        match self {
            StateNode::Host(node) => Some(*node),
            _ => None,
        }
    }
}

/// Props as seen by a fiber.
#[derive(Clone, Default)]
pub enum FiberProps {
    #[default]
    None,
    Text(Rc<str>),
    Element(Rc<Props>),
    /// Children of a fragment.
    Children(Node),
}

impl FiberProps {
    /// Identity comparison used for bail-out.
    pub fn same(
        &self,
        other: &FiberProps,
    ) -> bool {
        match (self, other) {
            (FiberProps::None, FiberProps::None) => true,
            (FiberProps::Text(a), FiberProps::Text(b)) => Rc::ptr_eq(a, b),
            (FiberProps::Element(a), FiberProps::Element(b)) => Rc::ptr_eq(a, b),
            (FiberProps::Children(a), FiberProps::Children(b)) => a.same(b),
            _ => false,
        }
    }

    #[inline]
    pub fn element(&self) -> Option<&Rc<Props>> {
        match self {
            FiberProps::Element(props) => Some(props),
            _ => None,
        }
    }

    #[inline]
    pub fn text(&self) -> Option<&Rc<str>> {
        match self {
            FiberProps::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Per-tag pending work.
#[derive(Clone, Default)]
pub enum UpdateQueue {
    #[default]
    None,
    /// Effects created by the last render of a function component.
    Effects(Vec<Rc<Effect>>),
    Class(Rc<ClassQueue>),
    /// Property changes computed in complete, applied at commit.
    Host(Vec<PropUpdate>),
}

/// One tree position in one buffer.
#[derive(Clone)]
pub struct Fiber {
    pub tag: WorkTag,
    pub key: Option<Key>,
    pub element_type: Option<ElementType>,
    pub state_node: StateNode,

    pub return_fiber: Option<FiberId>,
    pub child: Option<FiberId>,
    pub sibling: Option<FiberId>,
    pub index: usize,

    pub pending_props: FiberProps,
    pub memoized_props: FiberProps,
    pub memoized_state: Vec<Hook>,
    pub update_queue: UpdateQueue,
    pub dependencies: SmallVec<[Context; 2]>,

    pub flags: Flags,
    pub subtree_flags: Flags,
    pub deletions: Vec<FiberId>,

    pub lanes: Lanes,
    pub child_lanes: Lanes,
    pub alternate: Option<FiberId>,
}

impl Fiber {
    pub fn new(
        tag: WorkTag,
        pending_props: FiberProps,
        key: Option<Key>,
    ) -> Self {
        Self {
            tag,
            key,
            element_type: None,
            state_node: StateNode::None,
            return_fiber: None,
            child: None,
            sibling: None,
            index: 0,
            pending_props,
            memoized_props: FiberProps::None,
            memoized_state: Vec::new(),
            update_queue: UpdateQueue::None,
            dependencies: SmallVec::new(),
            flags: Flags::empty(),
            subtree_flags: Flags::empty(),
            deletions: Vec::new(),
            lanes: NO_LANES,
            child_lanes: NO_LANES,
            alternate: None,
        }
    }

    /// Host type name for host components.
    pub fn host_type(&self) -> Option<&str> {
        match &self.element_type {
            Some(ElementType::Host(tag)) => Some(tag),
            _ => None,
        }
    }

    /// Name for logs.
    pub fn name(&self) -> String {
        match (&self.element_type, self.tag) {
            (Some(ty), _) => ty.name(),
            (None, WorkTag::HostText) => "#text".to_string(),
            (None, WorkTag::HostRoot) => "#root".to_string(),
            (None, tag) => format!("{tag:?}"),
        }
    }
}

impl std::fmt::Debug for Fiber {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Fiber")
            .field("tag", &self.tag)
            .field("name", &self.name())
            .field("key", &self.key)
            .field("index", &self.index)
            .field("flags", &self.flags)
            .field("lanes", &self.lanes)
            .finish()
    }
}

fn tag_for(ty: &ElementType) -> WorkTag {
    match ty {
        ElementType::Host(_) => WorkTag::HostComponent,
        ElementType::Function(_) => WorkTag::FunctionComponent,
        ElementType::Class(_) => WorkTag::ClassComponent,
        ElementType::Fragment => WorkTag::Fragment,
        ElementType::Provider(_) => WorkTag::ContextProvider,
        ElementType::Consumer(_) => WorkTag::ContextConsumer,
        ElementType::Memo(_) => WorkTag::Memo,
    }
}

/// Props a fiber of `element` receives.
pub(crate) fn element_props(element: &Element) -> FiberProps {
    match element.ty {
        ElementType::Fragment => FiberProps::Children(element.props.children().clone()),
        _ => FiberProps::Element(element.props.clone()),
    }
}

/// Both buffers of every tree position of one root.
pub struct FiberTree {
    fibers: SlotMap<FiberId, Fiber>,
    current: FiberId,
}

impl FiberTree {
    /// Tree with a single committed host root.
    pub fn new() -> Self {
        let mut fibers = SlotMap::with_key();
        let current = fibers.insert(Fiber::new(WorkTag::HostRoot, FiberProps::None, None));
        Self { fibers, current }
    }

    /// Committed host root.
    #[inline]
    pub fn current(&self) -> FiberId {
        self.current
    }

    #[inline]
    pub(crate) fn set_current(
        &mut self,
        root: FiberId,
    ) {
        self.current = root;
    }

    #[inline]
    pub fn get(
        &self,
        id: FiberId,
    ) -> Option<&Fiber> {
        self.fibers.get(id)
    }

    #[inline]
    pub fn get_mut(
        &mut self,
        id: FiberId,
    ) -> Option<&mut Fiber> {
        self.fibers.get_mut(id)
    }

    #[inline]
    pub fn contains(
        &self,
        id: FiberId,
    ) -> bool {
        self.fibers.contains_key(id)
    }

    /// Number of live fibers across both buffers.
    #[inline]
    pub fn len(&self) -> usize {
        self.fibers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fibers.is_empty()
    }

    pub(crate) fn insert(
        &mut self,
        fiber: Fiber,
    ) -> FiberId {
        self.fibers.insert(fiber)
    }

    pub(crate) fn remove(
        &mut self,
        id: FiberId,
    ) -> Option<Fiber> {
        self.fibers.remove(id)
    }

    /// Children of `id` in sibling order.
    pub fn children(
        &self,
        id: FiberId,
    ) -> Vec<FiberId> {
        let mut out = Vec::new();
        let mut child = self.get(id).and_then(|f| f.child);
        while let Some(c) = child {
            out.push(c);
            child = self.get(c).and_then(|f| f.sibling);
        }
        out
    }

    pub(crate) fn create_fiber_from_element(
        &mut self,
        element: &Element,
        lanes: Lanes,
    ) -> FiberId {
        let mut fiber = Fiber::new(tag_for(&element.ty), element_props(element), element.key.clone());
        fiber.element_type = Some(element.ty.clone());
        fiber.lanes = lanes;
        self.insert(fiber)
    }

    pub(crate) fn create_fiber_from_text(
        &mut self,
        text: Rc<str>,
        lanes: Lanes,
    ) -> FiberId {
        let mut fiber = Fiber::new(WorkTag::HostText, FiberProps::Text(text), None);
        fiber.lanes = lanes;
        self.insert(fiber)
    }

    pub(crate) fn create_fiber_from_fragment(
        &mut self,
        children: Node,
        key: Option<Key>,
        lanes: Lanes,
    ) -> FiberId {
        let mut fiber = Fiber::new(WorkTag::Fragment, FiberProps::Children(children), key);
        fiber.lanes = lanes;
        self.insert(fiber)
    }

    /// The other buffer of `current`, reset for a new render.
    ///
    /// Reuses the alternate when there is one, so each tree position owns at
    /// most two fibers.
    pub(crate) fn create_work_in_progress(
        &mut self,
        current: FiberId,
        pending_props: FiberProps,
    ) -> FiberId {
        let source = self.fibers[current].clone();
        let reusable = source.alternate.filter(|alt| self.fibers.contains_key(*alt));

        let wip = match reusable {
            Some(alt) => {
                let fiber = &mut self.fibers[alt];
                fiber.pending_props = pending_props;
                fiber.element_type = source.element_type.clone();
                fiber.flags = Flags::empty();
                fiber.subtree_flags = Flags::empty();
                fiber.deletions.clear();
                alt
            }
            None => {
                let mut fiber = Fiber::new(source.tag, pending_props, source.key.clone());
                fiber.element_type = source.element_type.clone();
                fiber.state_node = source.state_node.clone();
                fiber.alternate = Some(current);
                let alt = self.fibers.insert(fiber);
                self.fibers[current].alternate = Some(alt);
                alt
            }
        };

        let fiber = &mut self.fibers[wip];
        fiber.lanes = source.lanes;
        fiber.child_lanes = source.child_lanes;
        fiber.child = source.child;
        fiber.memoized_props = source.memoized_props;
        fiber.memoized_state = source.memoized_state;
        fiber.update_queue = source.update_queue;
        fiber.dependencies = source.dependencies;
        fiber.sibling = source.sibling;
        fiber.index = source.index;
        fiber.state_node = source.state_node;
        wip
    }

    /// Record `lane` on `fiber` and its alternate, and in `child_lanes` of
    /// every ancestor up to the root. Returns `false` for a stale id.
    pub(crate) fn mark_update_lane_from_fiber_to_root(
        &mut self,
        fiber: FiberId,
        lane: Lanes,
    ) -> bool {
        let Some(source) = self.fibers.get_mut(fiber) else {
            return false;
        };
        source.lanes |= lane;
        let alternate = source.alternate;
        let mut parent = source.return_fiber;
        if let Some(alt) = alternate.and_then(|alt| self.fibers.get_mut(alt)) {
            alt.lanes |= lane;
        }
        while let Some(id) = parent {
            let Some(node) = self.fibers.get_mut(id) else {
                break;
            };
            node.child_lanes |= lane;
            parent = node.return_fiber;
            let alternate = node.alternate;
            if let Some(alt) = alternate.and_then(|alt| self.fibers.get_mut(alt)) {
                alt.child_lanes |= lane;
            }
        }
        true
    }

    /// Nearest ancestor that owns a host parent node (host component or root).
    pub(crate) fn host_parent_fiber(
        &self,
        fiber: FiberId,
    ) -> Option<FiberId> {
        let mut parent = self.get(fiber)?.return_fiber;
        while let Some(id) = parent {
            let node = self.get(id)?;
            if node.tag.is_host_parent() {
                return Some(id);
            }
            parent = node.return_fiber;
        }
        None
    }

    /// Free every fiber reachable from neither the committed tree nor its
    /// alternates. Returns how many were released.
    pub(crate) fn collect_garbage(&mut self) -> usize {
        let mut live = hashbrown::HashSet::with_capacity(self.fibers.len());
        let mut stack = vec![self.current];
        while let Some(id) = stack.pop() {
            let Some(fiber) = self.fibers.get(id) else {
                continue;
            };
            if !live.insert(id) {
                continue;
            }
            if let Some(alt) = fiber.alternate {
                live.insert(alt);
            }
            stack.extend(fiber.child);
            stack.extend(fiber.sibling);
        }
        let before = self.fibers.len();
        self.fibers.retain(|id, _| live.contains(&id));
        before - self.fibers.len()
    }
}

impl Default for FiberTree {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<FiberId> for FiberTree {
    type Output = Fiber;

    fn index(
        &self,
        id: FiberId,
    ) -> &Fiber {
        &self.fibers[id]
    }
}

impl IndexMut<FiberId> for FiberTree {
    fn index_mut(
        &mut self,
        id: FiberId,
    ) -> &mut Fiber {
        &mut self.fibers[id]
    }
}

impl std::fmt::Debug for FiberTree {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("FiberTree")
            .field("current", &self.current)
            .field("fibers", &self.fibers.len())
            .finish()
    }
}
