//! In-memory host.
//!
//! Keeps a plain node tree, logs every operation it receives and renders the
//! tree as markup or JSON. Used by tests, benches and the CLI.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

use hashbrown::HashMap;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::json;

use super::{HostConfig, HostError, HostNode, HostResult};
use crate::reconciler::element::{Props, Value};

/// A recorded host operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HostOp {
    CreateInstance { node: HostNode, ty: String },
    CreateText { node: HostNode, text: String },
    SetProperty { node: HostNode, name: String, value: String },
    RemoveProperty { node: HostNode, name: String },
    SetTextContent { node: HostNode, text: String },
    CommitTextUpdate { node: HostNode, text: String },
    AppendChild { parent: HostNode, child: HostNode },
    InsertBefore { parent: HostNode, child: HostNode, before: HostNode },
    RemoveChild { parent: HostNode, child: HostNode },
}

#[derive(Debug)]
enum NodeKind {
    Container,
    Element {
        tag: Rc<str>,
        attrs: IndexMap<Rc<str>, Value>,
        text: Option<Rc<str>>,
    },
    Text(Rc<str>),
}

#[derive(Debug)]
struct MemoryNode {
    kind: NodeKind,
    parent: Option<HostNode>,
    children: Vec<HostNode>,
}

#[derive(Debug)]
struct MemoryTree {
    nodes: HashMap<HostNode, MemoryNode>,
    next_id: u64,
    ops: Vec<HostOp>,
}

impl MemoryTree {
    fn alloc(
        &mut self,
        kind: NodeKind,
    ) -> HostNode {
        let node = HostNode(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            node,
            MemoryNode {
                kind,
                parent: None,
                children: Vec::new(),
            },
        );
        node
    }

    fn node(
        &self,
        node: HostNode,
    ) -> HostResult<&MemoryNode> {
        self.nodes.get(&node).ok_or(HostError::UnknownNode(node))
    }

    fn node_mut(
        &mut self,
        node: HostNode,
    ) -> HostResult<&mut MemoryNode> {
        self.nodes.get_mut(&node).ok_or(HostError::UnknownNode(node))
    }

    fn detach(
        &mut self,
        child: HostNode,
    ) -> HostResult<()> {
        if let Some(parent) = self.node(child)?.parent {
            self.node_mut(parent)?.children.retain(|c| *c != child);
            self.node_mut(child)?.parent = None;
        }
        Ok(())
    }

    fn check_insert(
        &self,
        parent: HostNode,
        child: HostNode,
    ) -> HostResult<()> {
        if matches!(self.node(parent)?.kind, NodeKind::Text(_)) {
            return Err(HostError::TextParent(parent));
        }
        self.node(child)?;
        let mut cursor = Some(parent);
        while let Some(node) = cursor {
            if node == child {
                return Err(HostError::Cycle(child));
            }
            cursor = self.node(node)?.parent;
        }
        Ok(())
    }
}

/// Host that builds an in-memory tree.
#[derive(Debug)]
pub struct MemoryHost {
    tree: RefCell<MemoryTree>,
    container: HostNode,
}

impl MemoryHost {
    /// Empty host with one container node.
    pub fn new() -> Self {
        let mut tree = MemoryTree {
            nodes: HashMap::new(),
            next_id: 1,
            ops: Vec::new(),
        };
        let container = tree.alloc(NodeKind::Container);
        Self {
            tree: RefCell::new(tree),
            container,
        }
    }

    /// The root container node.
    #[inline]
    pub fn container(&self) -> HostNode {
        self.container
    }

    /// Operations recorded so far.
    pub fn ops(&self) -> Vec<HostOp> {
        self.tree.borrow().ops.clone()
    }

    /// Drain the operation log.
    pub fn take_ops(&self) -> Vec<HostOp> {
        std::mem::take(&mut self.tree.borrow_mut().ops)
    }

    /// Number of live nodes, the container included.
    pub fn node_count(&self) -> usize {
        self.tree.borrow().nodes.len()
    }

    /// Child nodes of `node`.
    pub fn children(
        &self,
        node: HostNode,
    ) -> Vec<HostNode> {
        self.tree
            .borrow()
            .nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Attribute of an element.
    pub fn attribute(
        &self,
        node: HostNode,
        name: &str,
    ) -> Option<Value> {
        match &self.tree.borrow().nodes.get(&node)?.kind {
            NodeKind::Element { attrs, .. } => attrs.get(name).cloned(),
            _ => None,
        }
    }

    /// Concatenated text of `node` and its descendants.
    pub fn text_content(
        &self,
        node: HostNode,
    ) -> String {
        let tree = self.tree.borrow();
        let mut out = String::new();
        collect_text(&tree, node, &mut out);
        out
    }

    /// First element with tag `tag` in document order.
    pub fn query(
        &self,
        tag: &str,
    ) -> Option<HostNode> {
        let tree = self.tree.borrow();
        let mut stack = vec![self.container];
        while let Some(node) = stack.pop() {
            let entry = tree.nodes.get(&node)?;
            if let NodeKind::Element { tag: t, .. } = &entry.kind {
                if &**t == tag {
                    return Some(node);
                }
            }
            stack.extend(entry.children.iter().rev().copied());
        }
        None
    }

    /// Markup of the container's children.
    pub fn to_markup(&self) -> String {
        self.markup_of(self.container)
    }

    /// Markup of `node`. For the container only its children are printed.
    pub fn markup_of(
        &self,
        node: HostNode,
    ) -> String {
        let tree = self.tree.borrow();
        let mut out = String::new();
        write_markup(&tree, node, &mut out);
        out
    }

    /// JSON form of the container's subtree.
    pub fn to_json(&self) -> serde_json::Value {
        let tree = self.tree.borrow();
        node_json(&tree, self.container)
    }

    fn record(
        &self,
        op: HostOp,
    ) {
        self.tree.borrow_mut().ops.push(op);
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_text(
    tree: &MemoryTree,
    node: HostNode,
    out: &mut String,
) {
    let Some(entry) = tree.nodes.get(&node) else {
        return;
    };
    match &entry.kind {
        NodeKind::Text(text) => out.push_str(text),
        NodeKind::Element { text: Some(text), .. } => out.push_str(text),
        _ => {}
    }
    for child in &entry.children {
        collect_text(tree, *child, out);
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn write_markup(
    tree: &MemoryTree,
    node: HostNode,
    out: &mut String,
) {
    let Some(entry) = tree.nodes.get(&node) else {
        return;
    };
    match &entry.kind {
        NodeKind::Container => {
            for child in &entry.children {
                write_markup(tree, *child, out);
            }
        }
        NodeKind::Text(text) => out.push_str(&escape(text)),
        NodeKind::Element { tag, attrs, text } => {
            let _ = write!(out, "<{tag}");
            for (name, value) in attrs {
                let _ = write!(out, " {}=\"{}\"", name, escape(&value.to_string()));
            }
            out.push('>');
            if let Some(text) = text {
                out.push_str(&escape(text));
            }
            for child in &entry.children {
                write_markup(tree, *child, out);
            }
            let _ = write!(out, "</{tag}>");
        }
    }
}

fn value_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(v) => json!(v),
        Value::Int(v) => json!(v),
        Value::Float(v) => json!(v),
        Value::Str(v) => json!(&**v),
        other => json!(other.to_string()),
    }
}

fn node_json(
    tree: &MemoryTree,
    node: HostNode,
) -> serde_json::Value {
    let Some(entry) = tree.nodes.get(&node) else {
        return serde_json::Value::Null;
    };
    let children: Vec<_> = entry.children.iter().map(|c| node_json(tree, *c)).collect();
    match &entry.kind {
        NodeKind::Container => json!({ "id": node, "children": children }),
        NodeKind::Text(text) => json!({ "id": node, "text": &**text }),
        NodeKind::Element { tag, attrs, text } => {
            let attrs: serde_json::Map<String, serde_json::Value> = attrs
                .iter()
                .map(|(name, value)| (name.to_string(), value_json(value)))
                .collect();
            json!({
                "id": node,
                "type": &**tag,
                "attrs": attrs,
                "text": text.as_deref(),
                "children": children,
            })
        }
    }
}

impl HostConfig for MemoryHost {
    fn create_instance(
        &self,
        ty: &str,
        _props: &Props,
    ) -> HostResult<HostNode> {
        let node = self.tree.borrow_mut().alloc(NodeKind::Element {
            tag: ty.into(),
            attrs: IndexMap::new(),
            text: None,
        });
        self.record(HostOp::CreateInstance {
            node,
            ty: ty.to_string(),
        });
        Ok(node)
    }

    fn create_text_instance(
        &self,
        text: &str,
    ) -> HostResult<HostNode> {
        let node = self.tree.borrow_mut().alloc(NodeKind::Text(text.into()));
        self.record(HostOp::CreateText {
            node,
            text: text.to_string(),
        });
        Ok(node)
    }

    fn set_property(
        &self,
        node: HostNode,
        name: &str,
        value: &Value,
    ) -> HostResult<()> {
        {
            let mut tree = self.tree.borrow_mut();
            if let NodeKind::Element { attrs, .. } = &mut tree.node_mut(node)?.kind {
                attrs.insert(name.into(), value.clone());
            }
        }
        self.record(HostOp::SetProperty {
            node,
            name: name.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn remove_property(
        &self,
        node: HostNode,
        name: &str,
    ) -> HostResult<()> {
        {
            let mut tree = self.tree.borrow_mut();
            if let NodeKind::Element { attrs, .. } = &mut tree.node_mut(node)?.kind {
                attrs.shift_remove(name);
            }
        }
        self.record(HostOp::RemoveProperty {
            node,
            name: name.to_string(),
        });
        Ok(())
    }

    fn set_text_content(
        &self,
        node: HostNode,
        text: &str,
    ) -> HostResult<()> {
        {
            let mut tree = self.tree.borrow_mut();
            let children = std::mem::take(&mut tree.node_mut(node)?.children);
            for child in children {
                tree.node_mut(child)?.parent = None;
            }
            match &mut tree.node_mut(node)?.kind {
                NodeKind::Element { text: content, .. } => {
                    *content = (!text.is_empty()).then(|| text.into());
                }
                NodeKind::Text(content) => *content = text.into(),
                NodeKind::Container => {}
            }
        }
        self.record(HostOp::SetTextContent {
            node,
            text: text.to_string(),
        });
        Ok(())
    }

    fn commit_text_update(
        &self,
        node: HostNode,
        text: &str,
    ) -> HostResult<()> {
        {
            let mut tree = self.tree.borrow_mut();
            if let NodeKind::Text(content) = &mut tree.node_mut(node)?.kind {
                *content = text.into();
            }
        }
        self.record(HostOp::CommitTextUpdate {
            node,
            text: text.to_string(),
        });
        Ok(())
    }

    fn append_child(
        &self,
        parent: HostNode,
        child: HostNode,
    ) -> HostResult<()> {
        {
            let mut tree = self.tree.borrow_mut();
            tree.check_insert(parent, child)?;
            tree.detach(child)?;
            tree.node_mut(parent)?.children.push(child);
            tree.node_mut(child)?.parent = Some(parent);
        }
        self.record(HostOp::AppendChild { parent, child });
        Ok(())
    }

    fn insert_before(
        &self,
        parent: HostNode,
        child: HostNode,
        before: HostNode,
    ) -> HostResult<()> {
        {
            let mut tree = self.tree.borrow_mut();
            tree.check_insert(parent, child)?;
            tree.detach(child)?;
            let siblings = &mut tree.node_mut(parent)?.children;
            let position = siblings
                .iter()
                .position(|c| *c == before)
                .ok_or(HostError::NotAChild {
                    parent,
                    child: before,
                })?;
            siblings.insert(position, child);
            tree.node_mut(child)?.parent = Some(parent);
        }
        self.record(HostOp::InsertBefore {
            parent,
            child,
            before,
        });
        Ok(())
    }

    fn remove_child(
        &self,
        parent: HostNode,
        child: HostNode,
    ) -> HostResult<()> {
        {
            let mut tree = self.tree.borrow_mut();
            if tree.node(child)?.parent != Some(parent) {
                return Err(HostError::NotAChild { parent, child });
            }
            tree.detach(child)?;
            release_subtree(&mut tree, child);
        }
        self.record(HostOp::RemoveChild { parent, child });
        Ok(())
    }
}

fn release_subtree(
    tree: &mut MemoryTree,
    node: HostNode,
) {
    if let Some(entry) = tree.nodes.remove(&node) {
        for child in entry.children {
            release_subtree(tree, child);
        }
    }
}
