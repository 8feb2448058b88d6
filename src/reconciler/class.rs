//! Class components.
//!
//! A class component is a Rust type that owns its state. Its instance lives
//! on the fiber (shared by both buffers) and is updated through a
//! [`ClassUpdater`], which queues closures that run against the instance at
//! the start of the next render of that fiber.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use super::context::Context;
use super::element::{ElementBuilder, ElementType, Node, Props, Value};
use super::fiber::FiberId;
use super::root::{Root, RootInner};

/// A stateful component.
pub trait ClassComponent: Sized + 'static {
    /// Build the instance on mount.
    fn construct(
        props: &Props,
        updater: ClassUpdater<Self>,
    ) -> Self;

    /// Render with the current props and, if the type reads one, the
    /// context value.
    fn render(
        &self,
        props: &Props,
        context: &Value,
    ) -> Node;
}

trait ErasedClass {
    fn render(
        &self,
        props: &Props,
        context: &Value,
    ) -> Node;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<C: ClassComponent> ErasedClass for C {
    fn render(
        &self,
        props: &Props,
        context: &Value,
    ) -> Node {
        ClassComponent::render(self, props, context)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A mounted class instance plus the context value it last read.
pub struct ClassInstance {
    component: Box<dyn ErasedClass>,
    context: Value,
}

impl ClassInstance {
    /// Context value seen by the last render.
    #[inline]
    pub fn context(&self) -> &Value {
        &self.context
    }

    /// Borrow the instance as its concrete type.
    pub fn downcast_ref<C: ClassComponent>(&self) -> Option<&C> {
        self.component.as_any().downcast_ref::<C>()
    }

    pub(crate) fn set_context(
        &mut self,
        value: Value,
    ) {
        self.context = value;
    }

    pub(crate) fn render(
        &self,
        props: &Props,
    ) -> Node {
        self.component.render(props, &self.context)
    }
}

impl fmt::Debug for ClassInstance {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ClassInstance")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

type Constructor = Box<dyn Fn(&Props, Weak<ClassQueue>) -> Box<dyn ErasedClass>>;

/// Element type of a class component.
#[derive(Clone)]
pub struct ClassType {
    inner: Rc<ClassTypeInner>,
}

struct ClassTypeInner {
    name: Rc<str>,
    context_type: Option<Context>,
    construct: Constructor,
}

impl ClassType {
    /// Register `C` as a class component.
    pub fn new<C: ClassComponent>(name: &str) -> Self {
        Self::build::<C>(name, None)
    }

    /// Register `C`, reading `context` before every render.
    pub fn with_context<C: ClassComponent>(
        name: &str,
        context: Context,
    ) -> Self {
        Self::build::<C>(name, Some(context))
    }

    fn build<C: ClassComponent>(
        name: &str,
        context_type: Option<Context>,
    ) -> Self {
        let construct: Constructor = Box::new(|props, queue| {
            let updater = ClassUpdater {
                queue,
                _marker: PhantomData,
            };
            Box::new(C::construct(props, updater))
        });
        Self {
            inner: Rc::new(ClassTypeInner {
                name: name.into(),
                context_type,
                construct,
            }),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[inline]
    pub fn context_type(&self) -> Option<&Context> {
        self.inner.context_type.as_ref()
    }

    /// Start an element of this class.
    pub fn element(&self) -> ElementBuilder {
        ElementBuilder::new(ElementType::Class(self.clone()))
    }

    /// Identity comparison.
    #[inline]
    pub fn same(
        &self,
        other: &ClassType,
    ) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn construct(
        &self,
        props: &Props,
        queue: &Rc<ClassQueue>,
    ) -> ClassInstance {
        ClassInstance {
            component: (self.inner.construct)(props, Rc::downgrade(queue)),
            context: Value::Null,
        }
    }
}

impl fmt::Debug for ClassType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "ClassType({})", self.inner.name)
    }
}

type ClassUpdate = Box<dyn FnOnce(&mut dyn Any)>;

/// Pending updates of one class fiber. Dropped when the fiber unmounts.
pub struct ClassQueue {
    fiber: FiberId,
    root: Weak<RootInner>,
    pending: RefCell<Vec<ClassUpdate>>,
}

impl ClassQueue {
    pub(crate) fn new(
        fiber: FiberId,
        root: Weak<RootInner>,
    ) -> Self {
        Self {
            fiber,
            root,
            pending: RefCell::new(Vec::new()),
        }
    }

    /// Number of queued updates.
    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Apply every queued update to `instance`. Updates queued while this
    /// runs wait for the next render.
    pub(crate) fn process(
        &self,
        instance: &mut ClassInstance,
    ) -> usize {
        let updates = std::mem::take(&mut *self.pending.borrow_mut());
        let count = updates.len();
        for update in updates {
            update(instance.component.as_any_mut());
        }
        count
    }
}

impl fmt::Debug for ClassQueue {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ClassQueue")
            .field("fiber", &self.fiber)
            .field("pending", &self.len())
            .finish()
    }
}

/// Handle a class instance uses to update itself.
pub struct ClassUpdater<C> {
    queue: Weak<ClassQueue>,
    _marker: PhantomData<fn(&mut C)>,
}

impl<C> Clone for ClassUpdater<C> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            _marker: PhantomData,
        }
    }
}

impl<C: ClassComponent> ClassUpdater<C> {
    /// Queue `update` and schedule a render of the owning fiber.
    ///
    /// Returns `None` without doing anything once the fiber has unmounted.
    pub fn enqueue_update(
        &self,
        update: impl FnOnce(&mut C) + 'static,
    ) -> Option<Root> {
        let queue = self.queue.upgrade()?;
        let root = Root::from_weak(&queue.root)?;
        queue.pending.borrow_mut().push(Box::new(move |instance| {
            if let Some(this) = instance.downcast_mut::<C>() {
                update(this);
            }
        }));
        let reconciler = root.reconciler();
        let lane = reconciler.request_update_lane();
        reconciler.schedule_update_on_fiber(&root, queue.fiber, lane);
        Some(root)
    }

    /// Whether the owning fiber is still mounted.
    pub fn is_mounted(&self) -> bool {
        self.queue.strong_count() > 0
    }
}
