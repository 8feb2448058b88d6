//! Hook engine for function components.
//!
//! A component receives a [`Hooks`] cursor for the duration of one render.
//! Each hook call takes the next slot: on update the slot is seeded from the
//! committed fiber's hook list, on mount a fresh one is created. The new list
//! replaces the old one when the render finishes.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::context::{read_context, Context};
use super::element::Value;
use super::fiber::FiberId;
use super::flags::{Flags, HookFlags};
use super::lane::{Lanes, TransitionLaneCursor, NO_LANES};
use super::root::{Root, RootInner};
use super::ReconcilerError;

/// Cleanup returned by an effect.
pub type Cleanup = Box<dyn FnOnce()>;

type EffectCreate = Box<dyn FnOnce() -> Option<Cleanup>>;

type PendingUpdate = Box<dyn FnOnce(&Rc<dyn Any>) -> Rc<dyn Any>>;

type ErasedReducer<A> = Rc<dyn Fn(&Rc<dyn Any>, A) -> Rc<dyn Any>>;

/// State of a `use_state` / `use_reducer` slot, shared by both buffers.
pub struct StateCell {
    state: RefCell<Rc<dyn Any>>,
    queue: RefCell<Vec<PendingUpdate>>,
}

impl StateCell {
    fn new(state: Rc<dyn Any>) -> Self {
        Self {
            state: RefCell::new(state),
            queue: RefCell::new(Vec::new()),
        }
    }

    /// Number of queued updates.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Apply queued updates in order and return the new state.
    fn process(&self) -> Rc<dyn Any> {
        let updates = std::mem::take(&mut *self.queue.borrow_mut());
        let mut state = self.state.borrow().clone();
        for update in updates {
            state = update(&state);
        }
        *self.state.borrow_mut() = state.clone();
        state
    }
}

/// Cleanup slot shared by every render's copy of one effect hook.
#[derive(Default)]
pub struct EffectInstance {
    destroy: RefCell<Option<Cleanup>>,
}

/// An effect registered by one render.
pub struct Effect {
    tag: HookFlags,
    create: RefCell<Option<EffectCreate>>,
    deps: Option<Rc<[Value]>>,
    inst: Rc<EffectInstance>,
}

impl Effect {
    #[inline]
    pub fn tag(&self) -> HookFlags {
        self.tag
    }

    /// Whether this effect fires in the coming commit.
    #[inline]
    pub fn has_effect(&self) -> bool {
        self.tag.contains(HookFlags::HAS_EFFECT)
    }

    #[inline]
    pub fn is_layout(&self) -> bool {
        self.tag.contains(HookFlags::LAYOUT)
    }

    #[inline]
    pub fn is_passive(&self) -> bool {
        self.tag.contains(HookFlags::PASSIVE)
    }

    /// Run the previous cleanup, if any.
    pub(crate) fn destroy(&self) {
        let destroy = self.inst.destroy.borrow_mut().take();
        if let Some(destroy) = destroy {
            destroy();
        }
    }

    /// Take the cleanup without running it.
    pub(crate) fn take_destroy(&self) -> Option<Cleanup> {
        self.inst.destroy.borrow_mut().take()
    }

    /// Run the effect body and keep its cleanup.
    pub(crate) fn create(&self) {
        let create = self.create.borrow_mut().take();
        if let Some(create) = create {
            let destroy = create();
            *self.inst.destroy.borrow_mut() = destroy;
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Effect")
            .field("tag", &self.tag)
            .field("deps", &self.deps)
            .finish()
    }
}

/// One hook slot.
#[derive(Clone)]
pub enum Hook {
    State(Rc<StateCell>),
    Memo {
        value: Rc<dyn Any>,
        deps: Rc<[Value]>,
    },
    Ref(Rc<dyn Any>),
    Effect(Rc<Effect>),
    Deferred(Value),
}

impl Hook {
    fn kind(&self) -> &'static str {
        match self {
            Hook::State(_) => "state",
            Hook::Memo { .. } => "memo",
            Hook::Ref(_) => "ref",
            Hook::Effect(_) => "effect",
            Hook::Deferred(_) => "deferred value",
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Hook({})", self.kind())
    }
}

/// Element-wise `Object.is` comparison. Missing deps always count as changed.
pub fn are_hook_inputs_equal(
    next: Option<&[Value]>,
    prev: Option<&[Value]>,
) -> bool {
    match (next, prev) {
        (Some(next), Some(prev)) => {
            next.len() == prev.len() && next.iter().zip(prev).all(|(a, b)| a.is_same(b))
        }
        _ => false,
    }
}

/// Callback returned by `use_state` and `use_reducer`.
pub struct Dispatch<A> {
    fiber: FiberId,
    cell: Weak<StateCell>,
    reducer: Option<ErasedReducer<A>>,
    root: Weak<RootInner>,
}

impl<A> Clone for Dispatch<A> {
    fn clone(&self) -> Self {
        Self {
            fiber: self.fiber,
            cell: self.cell.clone(),
            reducer: self.reducer.clone(),
            root: self.root.clone(),
        }
    }
}

impl<A> fmt::Debug for Dispatch<A> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("fiber", &self.fiber)
            .field("mounted", &(self.cell.strong_count() > 0))
            .finish()
    }
}

impl<A: 'static> Dispatch<A> {
    /// Queue `action` and schedule a render.
    ///
    /// Without a reducer the action replaces the state. Returns `false` when
    /// the component has unmounted or its root is gone.
    pub fn dispatch(
        &self,
        action: A,
    ) -> bool {
        let reducer = self.reducer.clone();
        self.enqueue(Box::new(move |state: &Rc<dyn Any>| -> Rc<dyn Any> {
            match reducer {
                Some(reducer) => reducer(state, action),
                None => Rc::new(action),
            }
        }))
    }

    /// Replace a `use_state` value with `f(previous)`.
    pub fn set_with(
        &self,
        f: impl FnOnce(&A) -> A + 'static,
    ) -> bool {
        self.enqueue(Box::new(move |state: &Rc<dyn Any>| -> Rc<dyn Any> {
            match (**state).downcast_ref::<A>() {
                Some(previous) => Rc::new(f(previous)),
                None => state.clone(),
            }
        }))
    }

    fn enqueue(
        &self,
        update: PendingUpdate,
    ) -> bool {
        let Some(cell) = self.cell.upgrade() else {
            return false;
        };
        let Some(root) = Root::from_weak(&self.root) else {
            return false;
        };
        cell.queue.borrow_mut().push(update);
        let reconciler = root.reconciler();
        let lane = reconciler.request_update_lane();
        reconciler.schedule_update_on_fiber(&root, self.fiber, lane);
        true
    }
}

/// What a finished render leaves on its fiber.
pub(crate) struct RenderedHooks {
    pub hooks: Vec<Hook>,
    pub effects: Vec<Rc<Effect>>,
    pub flags: Flags,
    pub lanes: Lanes,
    pub dependencies: SmallVec<[Context; 2]>,
}

/// Hook cursor for one render of one function component.
pub struct Hooks<'a> {
    fiber: FiberId,
    root: &'a Weak<RootInner>,
    transitions: &'a TransitionLaneCursor,
    render_lanes: Lanes,
    is_mount: bool,
    previous: Vec<Hook>,
    cursor: usize,
    hooks: Vec<Hook>,
    effects: Vec<Rc<Effect>>,
    flags: Flags,
    lanes: Lanes,
    dependencies: SmallVec<[Context; 2]>,
    error: Option<ReconcilerError>,
}

impl<'a> Hooks<'a> {
    pub(crate) fn new(
        fiber: FiberId,
        root: &'a Weak<RootInner>,
        transitions: &'a TransitionLaneCursor,
        render_lanes: Lanes,
        previous: Option<Vec<Hook>>,
    ) -> Self {
        Self {
            fiber,
            root,
            transitions,
            render_lanes,
            is_mount: previous.is_none(),
            previous: previous.unwrap_or_default(),
            cursor: 0,
            hooks: Vec::new(),
            effects: Vec::new(),
            flags: Flags::empty(),
            lanes: NO_LANES,
            dependencies: SmallVec::new(),
            error: None,
        }
    }

    /// Fiber being rendered.
    #[inline]
    pub fn fiber(&self) -> FiberId {
        self.fiber
    }

    /// Whether this is the first render of the component.
    #[inline]
    pub fn is_mount(&self) -> bool {
        self.is_mount
    }

    /// Lanes of the render in progress.
    #[inline]
    pub fn render_lanes(&self) -> Lanes {
        self.render_lanes
    }

    /// Local state replaced by the dispatched value.
    pub fn use_state<S: 'static>(
        &mut self,
        initial: S,
    ) -> (Rc<S>, Dispatch<S>) {
        self.state_hook(move || initial, None)
    }

    /// Local state driven by a reducer.
    pub fn use_reducer<S, A, R>(
        &mut self,
        reducer: R,
        initial: S,
    ) -> (Rc<S>, Dispatch<A>)
    where
        S: 'static,
        A: 'static,
        R: Fn(&S, A) -> S + 'static,
    {
        self.use_reducer_with_init(reducer, initial, |arg| arg)
    }

    /// Like [`use_reducer`](Self::use_reducer), seeding the state with
    /// `init(initial_arg)` on mount.
    pub fn use_reducer_with_init<S, A, I, R>(
        &mut self,
        reducer: R,
        initial_arg: I,
        init: impl FnOnce(I) -> S,
    ) -> (Rc<S>, Dispatch<A>)
    where
        S: 'static,
        A: 'static,
        R: Fn(&S, A) -> S + 'static,
    {
        let erased: ErasedReducer<A> = Rc::new(move |state: &Rc<dyn Any>, action: A| -> Rc<dyn Any> {
            match (**state).downcast_ref::<S>() {
                Some(current) => Rc::new(reducer(current, action)),
                None => state.clone(),
            }
        });
        self.state_hook(move || init(initial_arg), Some(erased))
    }

    fn state_hook<S: 'static, A>(
        &mut self,
        init: impl FnOnce() -> S,
        reducer: Option<ErasedReducer<A>>,
    ) -> (Rc<S>, Dispatch<A>) {
        let existing = match self.next_previous() {
            Some(Hook::State(cell)) => Some(cell),
            Some(other) => {
                self.mismatch(other.kind());
                None
            }
            None => None,
        };
        let reused = match existing {
            Some(cell) => match cell.process().downcast::<S>() {
                Ok(value) => Some((cell, value)),
                Err(_) => {
                    self.mismatch("state of another type");
                    None
                }
            },
            None => None,
        };
        let (cell, value) = reused.unwrap_or_else(|| {
            let value = Rc::new(init());
            let cell = Rc::new(StateCell::new(value.clone()));
            (cell, value)
        });
        let dispatch = Dispatch {
            fiber: self.fiber,
            cell: Rc::downgrade(&cell),
            reducer,
            root: self.root.clone(),
        };
        self.hooks.push(Hook::State(cell));
        (value, dispatch)
    }

    /// Cached value, recomputed when `deps` change.
    pub fn use_memo<T: 'static>(
        &mut self,
        compute: impl FnOnce() -> T,
        deps: &[Value],
    ) -> Rc<T> {
        let deps: Rc<[Value]> = deps.into();
        match self.next_previous() {
            Some(Hook::Memo {
                value,
                deps: prev_deps,
            }) => {
                if are_hook_inputs_equal(Some(&*deps), Some(&*prev_deps)) {
                    if let Ok(cached) = value.clone().downcast::<T>() {
                        self.hooks.push(Hook::Memo {
                            value,
                            deps: prev_deps,
                        });
                        return cached;
                    }
                }
            }
            Some(other) => self.mismatch(other.kind()),
            None => {}
        }
        let value = Rc::new(compute());
        self.hooks.push(Hook::Memo {
            value: value.clone(),
            deps,
        });
        value
    }

    /// Stable callback, replaced when `deps` change.
    pub fn use_callback<F: 'static>(
        &mut self,
        callback: F,
        deps: &[Value],
    ) -> Rc<F> {
        self.use_memo(move || callback, deps)
    }

    /// Mutable box allocated once on mount.
    pub fn use_ref<T: 'static>(
        &mut self,
        initial: T,
    ) -> Rc<RefCell<T>> {
        match self.next_previous() {
            Some(Hook::Ref(slot)) => match slot.clone().downcast::<RefCell<T>>() {
                Ok(cell) => {
                    self.hooks.push(Hook::Ref(slot));
                    return cell;
                }
                Err(_) => self.mismatch("ref of another type"),
            },
            Some(other) => self.mismatch(other.kind()),
            None => {}
        }
        let cell = Rc::new(RefCell::new(initial));
        self.hooks.push(Hook::Ref(cell.clone()));
        cell
    }

    /// Effect run in a scheduled task after commit.
    pub fn use_effect(
        &mut self,
        create: impl FnOnce() -> Option<Cleanup> + 'static,
        deps: Option<&[Value]>,
    ) {
        self.effect_hook(Flags::PASSIVE, HookFlags::PASSIVE, Box::new(create), deps);
    }

    /// Effect run synchronously during commit.
    pub fn use_layout_effect(
        &mut self,
        create: impl FnOnce() -> Option<Cleanup> + 'static,
        deps: Option<&[Value]>,
    ) {
        self.effect_hook(Flags::UPDATE, HookFlags::LAYOUT, Box::new(create), deps);
    }

    fn effect_hook(
        &mut self,
        fiber_flags: Flags,
        hook_flags: HookFlags,
        create: EffectCreate,
        deps: Option<&[Value]>,
    ) {
        let deps: Option<Rc<[Value]>> = deps.map(Rc::from);
        let previous = match self.next_previous() {
            Some(Hook::Effect(effect)) => Some(effect),
            Some(other) => {
                self.mismatch(other.kind());
                None
            }
            None => None,
        };
        let effect = match previous {
            Some(prev) if are_hook_inputs_equal(deps.as_deref(), prev.deps.as_deref()) => Effect {
                tag: hook_flags,
                create: RefCell::new(None),
                deps,
                inst: prev.inst.clone(),
            },
            previous => {
                self.flags |= fiber_flags;
                Effect {
                    tag: HookFlags::HAS_EFFECT | hook_flags,
                    create: RefCell::new(Some(create)),
                    deps,
                    inst: previous.map(|prev| prev.inst.clone()).unwrap_or_default(),
                }
            }
        };
        let effect = Rc::new(effect);
        self.effects.push(effect.clone());
        self.hooks.push(Hook::Effect(effect));
    }

    /// Current value of `context`. Takes no hook slot.
    pub fn use_context(
        &mut self,
        context: &Context,
    ) -> Value {
        if !self.dependencies.iter().any(|dep| dep.same(context)) {
            self.dependencies.push(context.clone());
        }
        read_context(context)
    }

    /// Lag behind `value` during urgent renders.
    ///
    /// An urgent render that sees a new value keeps returning the previous
    /// one and schedules a transition render that adopts it.
    pub fn use_deferred_value(
        &mut self,
        value: impl Into<Value>,
    ) -> Value {
        let value = value.into();
        let previous = match self.next_previous() {
            Some(Hook::Deferred(prev)) => Some(prev),
            Some(other) => {
                self.mismatch(other.kind());
                None
            }
            None => None,
        };
        let result = match previous {
            None => value,
            Some(prev) if prev.is_same(&value) => value,
            Some(prev) => {
                if self.render_lanes.includes_only_non_urgent() {
                    value
                } else {
                    self.lanes |= self.transitions.claim_next();
                    prev
                }
            }
        };
        self.hooks.push(Hook::Deferred(result.clone()));
        result
    }

    fn next_previous(&mut self) -> Option<Hook> {
        if self.is_mount {
            return None;
        }
        let hook = self.previous.get(self.cursor).cloned();
        self.cursor += 1;
        if hook.is_none() {
            self.mismatch("more hooks than the previous render");
        }
        hook
    }

    fn mismatch(
        &mut self,
        found: &'static str,
    ) {
        if self.error.is_none() {
            self.error = Some(ReconcilerError::HookOrderMismatch {
                index: self.hooks.len(),
                found,
            });
        }
    }

    pub(crate) fn finish(self) -> Result<RenderedHooks, ReconcilerError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if !self.is_mount && self.cursor < self.previous.len() {
            return Err(ReconcilerError::HookOrderMismatch {
                index: self.cursor,
                found: "fewer hooks than the previous render",
            });
        }
        Ok(RenderedHooks {
            hooks: self.hooks,
            effects: self.effects,
            flags: self.flags,
            lanes: self.lanes,
            dependencies: self.dependencies,
        })
    }
}
