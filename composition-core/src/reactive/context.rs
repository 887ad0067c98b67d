//! Active Effect Context
//!
//! The effect context tracks which effect is currently running. This is what
//! makes dependency tracking automatic: when a ref is read, the tracker asks
//! the context for the innermost running effect and registers it.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Running an effect pushes a frame,
//! and the returned guard pops it when dropped, so the previously active
//! effect is restored on every exit path, panics included. Nested effects
//! therefore re-attribute reads to the outer effect once the inner one
//! returns.
//!
//! A frame can also be a barrier: reads made under a barrier are not tracked
//! by anything, even if an effect is running further down the stack.

use std::cell::RefCell;
use std::sync::Weak;

use super::ids::EffectId;
use super::runtime::Reactive;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the effect context stack.
#[derive(Clone)]
enum Frame {
    /// An effect is running; reads register it.
    Tracking {
        effect_id: EffectId,
        effect: Weak<dyn Reactive>,
    },
    /// Reads made here track nothing.
    Untracked,
}

/// The effect that reads should currently be attributed to.
#[derive(Clone)]
pub struct ActiveEffect {
    pub id: EffectId,
    pub effect: Weak<dyn Reactive>,
}

/// Guard that pops the context when dropped.
pub struct EffectContext {
    depth: usize,
}

impl EffectContext {
    /// Enter a tracking frame for the given effect.
    ///
    /// While the returned guard is alive, tracked reads register `effect`.
    pub fn enter(effect_id: EffectId, effect: Weak<dyn Reactive>) -> Self {
        Self::push(Frame::Tracking { effect_id, effect })
    }

    /// Enter a barrier frame: reads made while the guard lives are untracked.
    pub fn untracked() -> Self {
        Self::push(Frame::Untracked)
    }

    fn push(frame: Frame) -> Self {
        let depth = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(frame);
            stack.len()
        });
        Self { depth }
    }

    /// Check whether reads are currently being tracked.
    pub fn is_active() -> bool {
        Self::current().is_some()
    }

    /// The innermost running effect, unless a barrier hides it.
    pub fn current() -> Option<ActiveEffect> {
        CONTEXT_STACK.with(|stack| match stack.borrow().last() {
            Some(Frame::Tracking { effect_id, effect }) => Some(ActiveEffect {
                id: *effect_id,
                effect: effect.clone(),
            }),
            Some(Frame::Untracked) | None => None,
        })
    }

    /// Number of frames on this thread's stack.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for EffectContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(
                stack.len(),
                self.depth,
                "EffectContext dropped out of order"
            );
            stack.pop();
        });
    }
}

/// Run `f` without tracking any of the reactive reads it performs.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _barrier = EffectContext::untracked();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Noop(EffectId);

    impl Reactive for Noop {
        fn effect_id(&self) -> EffectId {
            self.0
        }

        fn run(&self) {}
    }

    fn noop() -> (EffectId, Arc<dyn Reactive>) {
        let id = EffectId::new();
        (id, Arc::new(Noop(id)))
    }

    #[test]
    fn context_tracks_effect() {
        let (id, effect) = noop();

        assert!(!EffectContext::is_active());
        assert!(EffectContext::current().is_none());

        {
            let _ctx = EffectContext::enter(id, Arc::downgrade(&effect));

            assert!(EffectContext::is_active());
            assert_eq!(EffectContext::current().map(|a| a.id), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!EffectContext::is_active());
        assert!(EffectContext::current().is_none());
    }

    #[test]
    fn nested_contexts_restore_outer() {
        let (id1, effect1) = noop();
        let (id2, effect2) = noop();

        {
            let _ctx1 = EffectContext::enter(id1, Arc::downgrade(&effect1));
            assert_eq!(EffectContext::current().map(|a| a.id), Some(id1));

            {
                let _ctx2 = EffectContext::enter(id2, Arc::downgrade(&effect2));
                assert_eq!(EffectContext::current().map(|a| a.id), Some(id2));
            }

            // After inner context drops, outer should be current
            assert_eq!(EffectContext::current().map(|a| a.id), Some(id1));
        }

        assert!(EffectContext::current().is_none());
    }

    #[test]
    fn untrack_hides_running_effect() {
        let (id, effect) = noop();
        let _ctx = EffectContext::enter(id, Arc::downgrade(&effect));

        let seen = untrack(|| EffectContext::current().map(|a| a.id));
        assert_eq!(seen, None);
        assert_eq!(EffectContext::current().map(|a| a.id), Some(id));
    }

    #[test]
    fn context_pops_on_panic() {
        let (id, effect) = noop();
        let depth = EffectContext::depth();

        let weak = Arc::downgrade(&effect);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ctx = EffectContext::enter(id, weak.clone());
            panic!("effect body failed");
        }));

        assert!(result.is_err());
        assert_eq!(EffectContext::depth(), depth);
    }
}
