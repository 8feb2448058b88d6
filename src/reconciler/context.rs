//! Context values and the provider stack.
//!
//! A provider writes its value straight onto the [`Context`] object, so a
//! read is a single borrow. The previous value is saved on the
//! [`ContextStack`] and written back when the provider completes.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::element::{ElementBuilder, ElementType, Node, Value};

/// A context object shared by providers and consumers.
#[derive(Clone)]
pub struct Context {
    inner: Rc<ContextInner>,
}

struct ContextInner {
    name: Rc<str>,
    default_value: Value,
    current: RefCell<Value>,
}

impl Context {
    /// New context whose value outside any provider is `default_value`.
    pub fn new(
        name: &str,
        default_value: impl Into<Value>,
    ) -> Self {
        let default_value = default_value.into();
        Self {
            inner: Rc::new(ContextInner {
                name: name.into(),
                current: RefCell::new(default_value.clone()),
                default_value,
            }),
        }
    }

    /// Context name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Value used when no provider is open.
    #[inline]
    pub fn default_value(&self) -> &Value {
        &self.inner.default_value
    }

    /// Value visible at the current point of the tree walk.
    #[inline]
    pub fn current(&self) -> Value {
        self.inner.current.borrow().clone()
    }

    /// Identity comparison.
    #[inline]
    pub fn same(
        &self,
        other: &Context,
    ) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Start a provider element for `value`.
    pub fn provider(
        &self,
        value: impl Into<Value>,
    ) -> ElementBuilder {
        ElementBuilder::new(ElementType::Provider(self.clone())).prop("value", value)
    }

    /// Start a consumer element that renders `render(value)`.
    pub fn consumer(
        &self,
        render: impl Fn(&Value) -> Node + 'static,
    ) -> ElementBuilder {
        ElementBuilder::new(ElementType::Consumer(self.clone())).render(render)
    }

    fn replace(
        &self,
        value: Value,
    ) -> Value {
        self.inner.current.replace(value)
    }
}

impl fmt::Debug for Context {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.inner.name)
            .field("current", &*self.inner.current.borrow())
            .finish()
    }
}

/// Saved values of open providers, innermost last.
#[derive(Debug, Default)]
pub struct ContextStack {
    saved: Vec<(Context, Value)>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a provider: save the current value and install `next_value`.
    pub fn push_provider(
        &mut self,
        context: &Context,
        next_value: Value,
    ) {
        let previous = context.replace(next_value);
        self.saved.push((context.clone(), previous));
    }

    /// Close the innermost provider of `context`.
    pub fn pop_provider(
        &mut self,
        context: &Context,
    ) {
        match self.saved.pop() {
            Some((saved, previous)) => {
                debug_assert!(saved.same(context), "unbalanced context pop");
                saved.replace(previous);
            }
            None => debug_assert!(false, "context stack underflow for {}", context.name()),
        }
    }

    /// Number of open providers.
    #[inline]
    pub fn depth(&self) -> usize {
        self.saved.len()
    }

    /// Close providers until `depth` remain, restoring their saved values.
    pub fn unwind_to(
        &mut self,
        depth: usize,
    ) {
        while self.saved.len() > depth {
            if let Some((context, previous)) = self.saved.pop() {
                context.replace(previous);
            }
        }
    }
}

/// Read a context's current value.
#[inline]
pub fn read_context(context: &Context) -> Value {
    context.current()
}
