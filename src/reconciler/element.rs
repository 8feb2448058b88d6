//! Tree descriptions: elements, props and values.
//!
//! A [`Node`] is what components return. Elements carry an [`ElementType`]
//! whose identity decides whether a fiber can be reused across renders.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::class::ClassType;
use super::context::Context;
use super::events::event_prop_name;
use super::hooks::Hooks;

/// Sibling-uniqueness key.
pub type Key = Rc<str>;

/// Event listener stored in props.
#[derive(Clone)]
pub struct Listener(Rc<dyn Fn(&Value)>);

impl Listener {
    /// Wrap a closure.
    pub fn new(f: impl Fn(&Value) + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Invoke with an event payload.
    #[inline]
    pub fn call(
        &self,
        payload: &Value,
    ) {
        (self.0)(payload)
    }

    /// Identity comparison.
    #[inline]
    pub fn same(
        &self,
        other: &Listener,
    ) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Listener {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str("Listener(..)")
    }
}

/// A prop, context or hook dependency value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Listener(Listener),
    /// Opaque shared object compared by identity.
    Object(Rc<dyn Any>),
}

impl Value {
    /// Identity comparison with `Object.is` semantics: primitives by value,
    /// NaN equal to itself, `0.0` distinct from `-0.0`, objects by pointer.
    pub fn is_same(
        &self,
        other: &Value,
    ) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => {
                (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Listener(a), Value::Listener(b)) => a.same(b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Whether this is `Null`.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer payload.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean payload.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// String payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Listener payload.
    pub fn as_listener(&self) -> Option<&Listener> {
        match self {
            Value::Listener(l) => Some(l),
            _ => None,
        }
    }

    /// Downcast an `Object` payload.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            Value::Object(obj) => obj.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Wrap any value as a shared object.
    pub fn object<T: 'static>(value: T) -> Self {
        Value::Object(Rc::new(value))
    }
}

impl fmt::Debug for Value {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(v) => write!(f, "Bool({v})"),
            Value::Int(v) => write!(f, "Int({v})"),
            Value::Float(v) => write!(f, "Float({v})"),
            Value::Str(v) => write!(f, "Str({v:?})"),
            Value::Listener(_) => f.write_str("Listener(..)"),
            Value::Object(_) => f.write_str("Object(..)"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => f.write_str(v),
            Value::Listener(_) => f.write_str("[listener]"),
            Value::Object(_) => f.write_str("[object]"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v.into())
    }
}

impl From<Rc<str>> for Value {
    fn from(v: Rc<str>) -> Self {
        Value::Str(v)
    }
}

impl From<Listener> for Value {
    fn from(v: Listener) -> Self {
        Value::Listener(v)
    }
}

/// Children-as-a-function used by context consumers.
pub type RenderProp = Rc<dyn Fn(&Value) -> Node>;

/// Element props. `children` is kept apart from the attribute map.
#[derive(Clone, Default)]
pub struct Props {
    attrs: IndexMap<Rc<str>, Value>,
    children: Node,
    render: Option<RenderProp>,
}

impl Props {
    /// Empty props.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute by name.
    #[inline]
    pub fn get(
        &self,
        name: &str,
    ) -> Option<&Value> {
        self.attrs.get(name)
    }

    /// Attributes in insertion order.
    pub fn attrs(&self) -> impl Iterator<Item = (&Rc<str>, &Value)> {
        self.attrs.iter()
    }

    /// Number of attributes.
    #[inline]
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Whether there are no attributes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// The `children` prop.
    #[inline]
    pub fn children(&self) -> &Node {
        &self.children
    }

    /// Render function for consumers.
    #[inline]
    pub fn render_prop(&self) -> Option<&RenderProp> {
        self.render.as_ref()
    }

    /// Key-by-key identity comparison, children included.
    pub fn shallow_equal(
        &self,
        other: &Props,
    ) -> bool {
        if self.attrs.len() != other.attrs.len() {
            return false;
        }
        let attrs_equal = self
            .attrs
            .iter()
            .all(|(key, value)| other.attrs.get(key).is_some_and(|o| value.is_same(o)));
        let render_equal = match (&self.render, &other.render) {
            (None, None) => true,
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        };
        attrs_equal && render_equal && self.children.same(&other.children)
    }

    pub(crate) fn insert(
        &mut self,
        name: Rc<str>,
        value: Value,
    ) {
        self.attrs.insert(name, value);
    }
}

impl fmt::Debug for Props {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Props")
            .field("attrs", &self.attrs)
            .field("children", &self.children)
            .finish()
    }
}

/// Function component.
#[derive(Clone)]
pub struct Component {
    inner: Rc<ComponentInner>,
}

struct ComponentInner {
    name: Rc<str>,
    render: Box<dyn Fn(&mut Hooks<'_>, &Props) -> Node>,
}

impl Component {
    /// Define a function component.
    pub fn new<F>(
        name: &str,
        render: F,
    ) -> Self
    where
        F: Fn(&mut Hooks<'_>, &Props) -> Node + 'static,
    {
        Self {
            inner: Rc::new(ComponentInner {
                name: name.into(),
                render: Box::new(render),
            }),
        }
    }

    /// Component name, for diagnostics.
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Start an element of this component.
    pub fn element(&self) -> ElementBuilder {
        ElementBuilder::new(ElementType::Function(self.clone()))
    }

    /// Wrap in a memo that skips re-rendering when props are shallowly equal.
    pub fn memo(&self) -> MemoComponent {
        MemoComponent {
            inner: Rc::new(MemoInner {
                component: self.clone(),
                compare: None,
            }),
        }
    }

    /// Memo with a custom "props are equal" test.
    pub fn memo_with(
        &self,
        compare: impl Fn(&Props, &Props) -> bool + 'static,
    ) -> MemoComponent {
        MemoComponent {
            inner: Rc::new(MemoInner {
                component: self.clone(),
                compare: Some(Box::new(compare)),
            }),
        }
    }

    pub(crate) fn render(
        &self,
        hooks: &mut Hooks<'_>,
        props: &Props,
    ) -> Node {
        (self.inner.render)(hooks, props)
    }

    /// Identity comparison.
    #[inline]
    pub fn same(
        &self,
        other: &Component,
    ) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Component {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Component({})", self.inner.name)
    }
}

/// Memoized function component.
#[derive(Clone)]
pub struct MemoComponent {
    inner: Rc<MemoInner>,
}

struct MemoInner {
    component: Component,
    compare: Option<Box<dyn Fn(&Props, &Props) -> bool>>,
}

impl MemoComponent {
    /// Wrapped component.
    #[inline]
    pub fn component(&self) -> &Component {
        &self.inner.component
    }

    /// Whether `prev` and `next` count as equal for bail-out.
    pub fn props_equal(
        &self,
        prev: &Props,
        next: &Props,
    ) -> bool {
        match &self.inner.compare {
            Some(compare) => compare(prev, next),
            None => prev.shallow_equal(next),
        }
    }

    /// Start an element of this memo.
    pub fn element(&self) -> ElementBuilder {
        ElementBuilder::new(ElementType::Memo(self.clone()))
    }

    /// Identity comparison.
    #[inline]
    pub fn same(
        &self,
        other: &MemoComponent,
    ) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for MemoComponent {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Memo({})", self.inner.component.name())
    }
}

/// What an element renders as.
#[derive(Clone, Debug)]
pub enum ElementType {
    /// Host element such as `div`.
    Host(Rc<str>),
    Function(Component),
    Class(ClassType),
    Fragment,
    Provider(Context),
    Consumer(Context),
    Memo(MemoComponent),
}

impl ElementType {
    /// Identity comparison used for fiber reuse.
    pub fn same(
        &self,
        other: &ElementType,
    ) -> bool {
        match (self, other) {
            (ElementType::Host(a), ElementType::Host(b)) => a == b,
            (ElementType::Function(a), ElementType::Function(b)) => a.same(b),
            (ElementType::Class(a), ElementType::Class(b)) => a.same(b),
            (ElementType::Fragment, ElementType::Fragment) => true,
            (ElementType::Provider(a), ElementType::Provider(b)) => a.same(b),
            (ElementType::Consumer(a), ElementType::Consumer(b)) => a.same(b),
            (ElementType::Memo(a), ElementType::Memo(b)) => a.same(b),
            _ => false,
        }
    }

    /// Name for logs and errors.
    pub fn name(&self) -> String {
        match self {
            ElementType::Host(tag) => tag.to_string(),
            ElementType::Function(c) => c.name().to_string(),
            ElementType::Class(c) => c.name().to_string(),
            ElementType::Fragment => "Fragment".to_string(),
            ElementType::Provider(c) => format!("{}.Provider", c.name()),
            ElementType::Consumer(c) => format!("{}.Consumer", c.name()),
            ElementType::Memo(m) => format!("Memo({})", m.component().name()),
        }
    }
}

/// An element: type, key and props.
#[derive(Clone, Debug)]
pub struct Element {
    pub ty: ElementType,
    pub key: Option<Key>,
    pub props: Rc<Props>,
}

impl Element {
    /// Start a host element.
    pub fn host(tag: &str) -> ElementBuilder {
        ElementBuilder::new(ElementType::Host(tag.into()))
    }

    /// Start a fragment.
    pub fn fragment() -> ElementBuilder {
        ElementBuilder::new(ElementType::Fragment)
    }
}

/// What a component renders: nothing, text, an element or a list.
#[derive(Clone, Default)]
pub enum Node {
    #[default]
    Empty,
    Text(Rc<str>),
    Element(Rc<Element>),
    List(Rc<[Node]>),
}

impl Node {
    /// Text node from anything printable.
    pub fn text(text: impl fmt::Display) -> Self {
        Node::Text(text.to_string().into())
    }

    /// List node.
    pub fn list(children: impl IntoIterator<Item = Node>) -> Self {
        Node::List(children.into_iter().collect::<Vec<_>>().into())
    }

    /// Non-empty text content. Empty strings render nothing.
    pub fn as_text(&self) -> Option<&Rc<str>> {
        match self {
            Node::Text(text) if !text.is_empty() => Some(text),
            _ => None,
        }
    }

    /// Whether this renders nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Node::Empty => true,
            Node::Text(text) => text.is_empty(),
            _ => false,
        }
    }

    /// Identity comparison: text by value, elements and lists by pointer.
    pub fn same(
        &self,
        other: &Node,
    ) -> bool {
        match (self, other) {
            (Node::Empty, Node::Empty) => true,
            (Node::Text(a), Node::Text(b)) => a == b,
            (Node::Element(a), Node::Element(b)) => Rc::ptr_eq(a, b),
            (Node::List(a), Node::List(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Node::Empty => f.write_str("Empty"),
            Node::Text(text) => write!(f, "Text({text:?})"),
            Node::Element(el) => {
                let mut dbg = f.debug_struct("Element");
                dbg.field("type", &el.ty.name());
                if let Some(key) = &el.key {
                    dbg.field("key", key);
                }
                dbg.finish()
            }
            Node::List(items) => f.debug_list().entries(items.iter()).finish(),
        }
    }
}

impl From<Element> for Node {
    fn from(el: Element) -> Self {
        Node::Element(Rc::new(el))
    }
}

impl From<ElementBuilder> for Node {
    fn from(builder: ElementBuilder) -> Self {
        builder.build()
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Node::Text(text.into())
    }
}

impl From<String> for Node {
    fn from(text: String) -> Self {
        Node::Text(text.into())
    }
}

impl From<Vec<Node>> for Node {
    fn from(children: Vec<Node>) -> Self {
        Node::List(children.into())
    }
}

/// Builder for [`Element`].
pub struct ElementBuilder {
    ty: ElementType,
    key: Option<Key>,
    props: Props,
    children: Vec<Node>,
    explicit_list: bool,
}

impl ElementBuilder {
    /// Builder for an element of `ty`.
    pub fn new(ty: ElementType) -> Self {
        Self {
            ty,
            key: None,
            props: Props::default(),
            children: Vec::new(),
            explicit_list: false,
        }
    }

    /// Set the key.
    pub fn key(
        mut self,
        key: impl fmt::Display,
    ) -> Self {
        self.key = Some(key.to_string().into());
        self
    }

    /// Set an attribute.
    pub fn prop(
        mut self,
        name: &str,
        value: impl Into<Value>,
    ) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    /// Attach a listener for `event`, stored as the `on<Event>` prop.
    pub fn on(
        self,
        event: &str,
        listener: impl Fn(&Value) + 'static,
    ) -> Self {
        let name = event_prop_name(event);
        self.prop(&name, Listener::new(listener))
    }

    /// Append one child.
    pub fn child(
        mut self,
        child: impl Into<Node>,
    ) -> Self {
        self.children.push(child.into());
        self
    }

    /// Set the children to a list, even if it has a single entry.
    pub fn children(
        mut self,
        children: impl IntoIterator<Item = Node>,
    ) -> Self {
        self.children.extend(children);
        self.explicit_list = true;
        self
    }

    /// Set the render function (context consumers).
    pub fn render(
        mut self,
        render: impl Fn(&Value) -> Node + 'static,
    ) -> Self {
        self.props.render = Some(Rc::new(render));
        self
    }

    /// Finish as a [`Node`].
    pub fn build(mut self) -> Node {
        self.props.children = if self.explicit_list {
            Node::List(self.children.into())
        } else {
            match self.children.len() {
                0 => Node::Empty,
                1 => self.children.pop().unwrap_or_default(),
                _ => Node::List(self.children.into()),
            }
        };
        Node::Element(Rc::new(Element {
            ty: self.ty,
            key: self.key,
            props: Rc::new(self.props),
        }))
    }
}
