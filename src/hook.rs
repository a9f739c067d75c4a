//! The instrumentation hook slot
//!
//! One hook is active per thread, i.e. per logical call stack. Instrumented code
//! reports its raw events (call, line, exception, return) through `dispatch`;
//! when no hook is installed, the events go nowhere.
//!
//! Installing a hook is a scoped resource: `with_hook` saves the previous hook,
//! installs the new one, and restores the previous one on every exit path,
//! panics included. Nesting two tracers around overlapping calls is not
//! supported.

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::domain::ErrorInfo;
use crate::frame_resolver::RawCallSite;

/// What the hook wants done with a frame entering the call stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Report the frame's events and the ones of its sub-calls
    Trace,
    /// Report nothing for the frame and its whole sub-call tree
    Skip,
}

/// Receiver of the raw events of the instrumented code
pub trait TraceHook {
    /// A frame is entered
    fn on_call(&mut self, site: &RawCallSite) -> Disposition;

    /// The current frame moves to another line
    fn on_line(&mut self, line: u32);

    /// An error becomes active in the current frame
    fn on_exception(&mut self, error: ErrorInfo, line: u32);

    /// The current frame exits, with a rendered value if any
    fn on_return(&mut self, line: u32, value: Option<String>);

    /// The current frame is left by a panic unwinding from `line`
    ///
    /// The panic goes through the frame like an error raised at that line.
    fn on_unwind(&mut self, line: u32) {
        self.on_exception(ErrorInfo::panic(), line);
        self.on_return(line, None);
    }
}

pub type SharedHook = Rc<RefCell<dyn TraceHook>>;

thread_local! {
    static ACTIVE_HOOK: RefCell<Option<SharedHook>> = const { RefCell::new(None) };
    /// Number of skipped frames currently on the stack
    static SUSPENDED: Cell<usize> = const { Cell::new(0) };
}

/// The hook currently installed on this thread
pub fn current() -> Option<SharedHook> {
    ACTIVE_HOOK.with(|slot| slot.borrow().clone())
}

/// Replace the hook of this thread, returning the previous one
pub fn install(hook: Option<SharedHook>) -> Option<SharedHook> {
    ACTIVE_HOOK.with(|slot| std::mem::replace(&mut *slot.borrow_mut(), hook))
}

/// Run `func` with `hook` installed, then restore the previous hook
///
/// The previous hook is restored before a panic of `func` is resumed.
pub fn with_hook<R>(hook: SharedHook, func: impl FnOnce() -> R) -> R {
    let previous_hook = install(Some(hook));
    let previous_suspended = SUSPENDED.with(|suspended| suspended.replace(0));
    tracing::trace!("trace hook installed");

    let outcome = panic::catch_unwind(AssertUnwindSafe(func));

    install(previous_hook);
    SUSPENDED.with(|suspended| suspended.set(previous_suspended));
    tracing::trace!("trace hook restored");

    match outcome {
        Ok(value) => value,
        Err(payload) => panic::resume_unwind(payload),
    }
}

/// Whether events are currently muted by a skipped frame
pub fn is_suspended() -> bool {
    SUSPENDED.with(|suspended| suspended.get() > 0)
}

pub(crate) fn suspend() {
    SUSPENDED.with(|suspended| suspended.set(suspended.get() + 1));
}

pub(crate) fn resume() {
    SUSPENDED.with(|suspended| suspended.set(suspended.get().saturating_sub(1)));
}

/// Forward an event to the installed hook
///
/// Returns `None` when there is no hook, when events are muted, or when the hook
/// is already busy handling an event (re-entrant call from sink code).
pub fn dispatch<R>(event: impl FnOnce(&mut dyn TraceHook) -> R) -> Option<R> {
    if is_suspended() {
        return None;
    }
    let hook = current()?;
    let mut hook = match hook.try_borrow_mut() {
        Ok(hook) => hook,
        Err(_) => {
            tracing::trace!("re-entrant trace event ignored");
            return None;
        }
    };

    Some(event(&mut *hook))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingHook {
        calls: usize,
        lines: Vec<u32>,
    }

    impl TraceHook for CountingHook {
        fn on_call(&mut self, _site: &RawCallSite) -> Disposition {
            self.calls += 1;
            Disposition::Trace
        }

        fn on_line(&mut self, line: u32) {
            self.lines.push(line);
        }

        fn on_exception(&mut self, _error: ErrorInfo, _line: u32) {}

        fn on_return(&mut self, _line: u32, _value: Option<String>) {}
    }

    #[test]
    fn test_no_hook_installed_by_default() {
        assert!(current().is_none());
        assert!(dispatch(|hook| hook.on_line(1)).is_none());
    }

    #[test]
    fn test_with_hook_installs_and_restores() {
        let hook = Rc::new(RefCell::new(CountingHook::default()));
        with_hook(hook.clone(), || {
            assert!(current().is_some());
            dispatch(|hook| hook.on_line(4));
        });

        assert!(current().is_none());
        assert_eq!(hook.borrow().lines, vec![4]);
    }

    #[test]
    fn test_with_hook_restores_previous_hook() {
        let outer: SharedHook = Rc::new(RefCell::new(CountingHook::default()));
        let inner: SharedHook = Rc::new(RefCell::new(CountingHook::default()));
        install(Some(outer.clone()));

        with_hook(inner.clone(), || {
            assert!(Rc::ptr_eq(&current().unwrap(), &inner));
        });

        assert!(Rc::ptr_eq(&current().unwrap(), &outer));
        install(None);
    }

    #[test]
    fn test_with_hook_restores_on_panic() {
        let hook = Rc::new(RefCell::new(CountingHook::default()));
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            with_hook(hook.clone(), || panic!("traced code failed"));
        }));

        assert!(result.is_err());
        assert!(current().is_none());
        assert!(!is_suspended());
    }

    #[test]
    fn test_suspension_mutes_dispatch() {
        let hook = Rc::new(RefCell::new(CountingHook::default()));
        with_hook(hook.clone(), || {
            suspend();
            assert!(dispatch(|hook| hook.on_line(1)).is_none());
            resume();
            assert!(dispatch(|hook| hook.on_line(2)).is_some());
        });

        assert_eq!(hook.borrow().lines, vec![2]);
    }

    #[test]
    fn test_reentrant_dispatch_is_ignored() {
        let hook = Rc::new(RefCell::new(CountingHook::default()));
        with_hook(hook.clone(), || {
            let _busy = hook.borrow_mut();
            assert!(dispatch(|hook| hook.on_line(1)).is_none());
        });
    }
}
