//! Request-isolated contextual state
//!
//! A [`Scope`] is the mutable bundle of metadata (user, tags, breadcrumbs,
//! trace ids) attached to captured events. One base scope exists
//! process-wide; [`run_isolated`] gives a logical flow (e.g. one inbound
//! request) its own stack of scopes, carried through every `.await` by a
//! tokio task-local. Mutations inside one isolated run are never visible to
//! concurrent sibling runs or to the base scope after the run ends.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;

use crate::types::{Breadcrumb, User};

/// Environment/release/service defaults merged into every event.
#[derive(Debug, Clone, Default)]
pub struct BaseContext {
    pub environment: Option<String>,
    pub release: Option<String>,
    pub service: Option<String>,
}

/// Distributed-trace identifiers carried by the current flow.
#[derive(Debug, Clone, Default)]
pub struct PropagationContext {
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub sampled: Option<bool>,
}

/// The current mutable bundle of contextual metadata.
///
/// Every frame on the stack is an independent deep copy: mutating a pushed
/// scope never affects its parent.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub user: Option<User>,
    pub tags: HashMap<String, String>,
    pub extra: serde_json::Map<String, serde_json::Value>,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub base_context: BaseContext,
    pub propagation: PropagationContext,
}

/// Overrides applied to the fresh scope created by [`run_isolated`].
///
/// Tags, extra, and propagation fields merge into the base scope's values;
/// the user, when present, replaces it.
#[derive(Debug, Default)]
pub struct ScopeSeed {
    pub user: Option<User>,
    pub tags: HashMap<String, String>,
    pub extra: serde_json::Map<String, serde_json::Value>,
    pub context: BaseContext,
    pub propagation: PropagationContext,
}

impl Scope {
    fn apply_seed(&mut self, seed: ScopeSeed) {
        if seed.user.is_some() {
            self.user = seed.user;
        }
        self.tags.extend(seed.tags);
        self.extra.extend(seed.extra);
        merge_base_context(&mut self.base_context, seed.context);
        merge_propagation(&mut self.propagation, seed.propagation);
    }
}

fn merge_base_context(target: &mut BaseContext, update: BaseContext) {
    if update.environment.is_some() {
        target.environment = update.environment;
    }
    if update.release.is_some() {
        target.release = update.release;
    }
    if update.service.is_some() {
        target.service = update.service;
    }
}

fn merge_propagation(target: &mut PropagationContext, update: PropagationContext) {
    if update.trace_id.is_some() {
        target.trace_id = update.trace_id;
    }
    if update.span_id.is_some() {
        target.span_id = update.span_id;
    }
    if update.sampled.is_some() {
        target.sampled = update.sampled;
    }
}

tokio::task_local! {
    static SCOPE_STACK: RefCell<Vec<Scope>>;
}

static BASE_SCOPE: Lazy<Mutex<Scope>> = Lazy::new(|| Mutex::new(Scope::default()));

fn base_scope() -> MutexGuard<'static, Scope> {
    BASE_SCOPE.lock().unwrap_or_else(|e| e.into_inner())
}

/// Runs `fut` with a fresh scope stack seeded from the base scope.
///
/// The new scope is a deep copy of the base scope with `seed` merged in; it
/// stays ambient for `fut` and everything it awaits, including tasks that
/// inherit the call through nested `run_isolated` calls of their own.
/// Concurrent isolated runs never observe each other's mutations.
pub async fn run_isolated<F>(seed: ScopeSeed, fut: F) -> F::Output
where
    F: Future,
{
    let mut scope = base_scope().clone();
    scope.apply_seed(seed);
    SCOPE_STACK.scope(RefCell::new(vec![scope]), fut).await
}

/// Snapshot of the current scope: the top of the ambient stack, or the base
/// scope when no isolated run is active.
pub fn current_scope() -> Scope {
    SCOPE_STACK
        .try_with(|stack| {
            stack
                .borrow()
                .last()
                .cloned()
                .expect("scope stack is never empty")
        })
        .unwrap_or_else(|_| base_scope().clone())
}

/// Runs `f` against the current mutable scope frame.
///
/// Outside an isolated run this falls through to the base scope.
fn with_current_scope<T>(f: impl FnOnce(&mut Scope) -> T) -> T {
    let inside_run = SCOPE_STACK.try_with(|_| ()).is_ok();
    if inside_run {
        SCOPE_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let top = stack.last_mut().expect("scope stack is never empty");
            f(top)
        })
    } else {
        f(&mut base_scope())
    }
}

/// Pushes a clone of the current scope as a new nested frame.
///
/// Only meaningful inside [`run_isolated`]; outside a run this is a no-op
/// (there is no ambient stack to grow) and mutators keep writing to the
/// base scope.
pub fn push_scope() {
    let _ = SCOPE_STACK.try_with(|stack| {
        let mut stack = stack.borrow_mut();
        let clone = stack.last().cloned().unwrap_or_default();
        stack.push(clone);
    });
}

/// Pops the top scope frame.
///
/// A pop on a single-frame stack is a no-op: the stack never empties.
pub fn pop_scope() {
    let _ = SCOPE_STACK.try_with(|stack| {
        let mut stack = stack.borrow_mut();
        if stack.len() > 1 {
            stack.pop();
        }
    });
}

/// Runs `fut` inside a pushed scope, popping on every exit path: normal
/// completion, panic, or the future being dropped mid-run.
pub async fn with_scope<F>(fut: F) -> F::Output
where
    F: Future,
{
    struct PopOnDrop;

    impl Drop for PopOnDrop {
        fn drop(&mut self) {
            pop_scope();
        }
    }

    push_scope();
    let _guard = PopOnDrop;
    fut.await
}

/// Sets or clears the user on the current scope.
pub fn set_user(user: Option<User>) {
    with_current_scope(|scope| scope.user = user);
}

/// Sets a tag on the current scope.
pub fn set_tag(key: impl Into<String>, value: impl Into<String>) {
    let (key, value) = (key.into(), value.into());
    with_current_scope(|scope| {
        scope.tags.insert(key, value);
    });
}

/// Sets an extra value on the current scope.
pub fn set_extra(key: impl Into<String>, value: serde_json::Value) {
    let key = key.into();
    with_current_scope(|scope| {
        scope.extra.insert(key, value);
    });
}

/// Appends a breadcrumb to the current scope.
pub fn add_breadcrumb(breadcrumb: Breadcrumb) {
    with_current_scope(|scope| scope.breadcrumbs.push(breadcrumb));
}

/// Merges trace identifiers into the current scope.
pub fn set_propagation_context(context: PropagationContext) {
    with_current_scope(|scope| merge_propagation(&mut scope.propagation, context));
}

/// Merges environment/release/service defaults into the process-wide base
/// scope. Isolated runs started afterwards inherit them.
pub fn set_base_context(context: BaseContext) {
    merge_base_context(&mut base_scope().base_context, context);
}
