//! Process-wide cancellation (spec.md §5).
//!
//! A single [`InterruptState`] is shared by the whole process; scanners
//! and operator workers carry a cheap, clonable [`InterruptContext`] handle
//! that they poll. Many contexts may be active (e.g. nested sub-scans),
//! all backed by the same flag unless explicitly scoped with
//! [`InterruptContext::child`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The process-wide cancellation flag. Typically installed once from a
/// signal handler (`ctrl_c` / SIGINT) and shared via [`InterruptContext`].
#[derive(Default)]
pub struct InterruptState {
    flag: AtomicBool,
}

impl InterruptState {
    pub fn new() -> Arc<Self> {
        Arc::new(InterruptState::default())
    }

    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// A one-shot-cancellable handle scanners and operator workers poll.
/// Cloning is cheap (an `Arc` clone); a cancelled context stays cancelled.
#[derive(Clone)]
pub struct InterruptContext {
    state: Arc<InterruptState>,
    /// An additional, locally-scoped cancellation independent of the
    /// process-wide flag: lets an operator stop its own sibling shards
    /// early (e.g. once a short-circuiting condition is met) without
    /// affecting unrelated queries sharing the same process-wide state.
    local: Option<Arc<AtomicBool>>,
}

impl InterruptContext {
    pub fn new(state: Arc<InterruptState>) -> Self {
        InterruptContext { state, local: None }
    }

    /// A context with no process-wide interrupt wired up, for tests and
    /// small in-memory tables that never need cancellation.
    pub fn background() -> Self {
        InterruptContext {
            state: InterruptState::new(),
            local: None,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.state.is_interrupted() || self.local.as_ref().is_some_and(|l| l.load(Ordering::SeqCst))
    }

    /// A child context that is independently cancellable, but still
    /// observes the parent's process-wide interrupt.
    pub fn child(&self) -> (InterruptContext, Arc<AtomicBool>) {
        let local = Arc::new(AtomicBool::new(false));
        (
            InterruptContext {
                state: self.state.clone(),
                local: Some(local.clone()),
            },
            local,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupting_the_shared_state_is_visible_everywhere() {
        let state = InterruptState::new();
        let ctx1 = InterruptContext::new(state.clone());
        let ctx2 = InterruptContext::new(state.clone());
        assert!(!ctx1.is_interrupted());
        state.interrupt();
        assert!(ctx1.is_interrupted());
        assert!(ctx2.is_interrupted());
    }

    #[test]
    fn child_local_cancel_does_not_affect_parent() {
        let state = InterruptState::new();
        let parent = InterruptContext::new(state.clone());
        let (child, local_flag) = parent.child();
        local_flag.store(true, Ordering::SeqCst);
        assert!(child.is_interrupted());
        assert!(!parent.is_interrupted());
    }
}
