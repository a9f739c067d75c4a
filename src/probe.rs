//! Instrumentation API for the traced program
//!
//! ```
//! use doctrace::probe;
//!
//! fn factorial(value: u64) -> u64 {
//!     probe::call(doctrace::call_site!(), |frame| {
//!         if value <= 1 {
//!             return value;
//!         }
//!         value * frame.at(line!()).invoke(|| factorial(value - 1))
//!     })
//! }
//!
//! assert_eq!(factorial(5), 120);
//! ```
//!
//! Without an installed hook the probes cost a thread-local lookup and nothing
//! is recorded.

use std::cell::Cell;
use std::fmt::Debug;

use crate::domain::ErrorInfo;
use crate::frame_resolver::RawCallSite;
use crate::hook::{self, Disposition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameStatus {
    /// No hook saw this frame
    Untraced,
    /// The hook traces this frame
    Traced,
    /// The hook skipped this frame, which mutes its sub-calls
    Skipped,
}

/// Guard of one invocation of an instrumented function
#[derive(Debug)]
pub struct Frame {
    status: FrameStatus,
    line: Cell<u32>,
    unwinding: Cell<bool>,
    exited: Cell<bool>,
}

impl Frame {
    /// Report the call-enter event of a new frame
    pub fn enter(site: RawCallSite) -> Self {
        let status = match hook::dispatch(|hook| hook.on_call(&site)) {
            Some(Disposition::Trace) => FrameStatus::Traced,
            Some(Disposition::Skip) => {
                hook::suspend();
                FrameStatus::Skipped
            }
            None => FrameStatus::Untraced,
        };

        Self {
            status,
            line: Cell::new(site.line),
            unwinding: Cell::new(false),
            exited: Cell::new(false),
        }
    }

    pub fn is_traced(&self) -> bool {
        self.status == FrameStatus::Traced
    }

    /// Current line of the frame
    pub fn line(&self) -> u32 {
        self.line.get()
    }

    /// Whether an error is active in the frame at its current line
    pub fn is_unwinding(&self) -> bool {
        self.unwinding.get()
    }

    /// Move the frame to another line
    pub fn at(&self, line: u32) -> &Self {
        self.line.set(line);
        self.unwinding.set(false);
        if self.is_traced() {
            hook::dispatch(|hook| hook.on_line(line));
        }
        self
    }

    /// Run a sub-call from the current line
    ///
    /// Only marks the call site in the instrumented code: the line was already
    /// reported by `at`, and the sub-call reports its own events.
    pub fn invoke<R>(&self, sub_call: impl FnOnce() -> R) -> R {
        sub_call()
    }

    /// Report that `error` becomes active in the frame, and hand it back
    pub fn raise<E: std::error::Error + 'static>(&self, error: E) -> E {
        self.report_exception(&error);
        error
    }

    /// Report the error of a failed result, which is handed back untouched
    pub fn check<T, E: std::error::Error + 'static>(&self, result: Result<T, E>) -> Result<T, E> {
        if let Err(error) = &result {
            self.report_exception(error);
        }
        result
    }

    fn report_exception<E: std::error::Error + 'static>(&self, error: &E) {
        self.unwinding.set(true);
        if self.is_traced() {
            let line = self.line.get();
            hook::dispatch(|hook| hook.on_exception(ErrorInfo::from_error(error), line));
        }
    }

    /// Report the frame exit at the current line
    pub fn exit(self, value: Option<String>) {
        self.finish(value);
    }

    fn finish(&self, value: Option<String>) {
        if self.exited.replace(true) {
            return;
        }
        match self.status {
            FrameStatus::Traced => {
                let line = self.line.get();
                hook::dispatch(|hook| hook.on_return(line, value));
            }
            FrameStatus::Skipped => hook::resume(),
            FrameStatus::Untraced => {}
        }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if self.exited.get() {
            return;
        }
        if std::thread::panicking() {
            self.exited.set(true);
            match self.status {
                FrameStatus::Traced => {
                    let line = self.line.get();
                    hook::dispatch(|hook| hook.on_unwind(line));
                }
                FrameStatus::Skipped => hook::resume(),
                FrameStatus::Untraced => {}
            }
            return;
        }
        self.finish(None);
    }
}

/// Render a returned value; the unit value renders as no value
pub fn render_value<T: Debug>(value: &T) -> Option<String> {
    let rendered = format!("{:?}", value);
    if rendered == "()" {
        None
    } else {
        Some(rendered)
    }
}

/// Trace an infallible function body
pub fn call<T: Debug>(site: RawCallSite, body: impl FnOnce(&Frame) -> T) -> T {
    let frame = Frame::enter(site);
    let value = body(&frame);
    if frame.is_traced() {
        frame.exit(render_value(&value));
    } else {
        frame.exit(None);
    }
    value
}

/// Trace a fallible function body
///
/// An `Err` leaving the body is reported as an error active at the current line
/// (unless already reported), followed by an exit at that same line: the
/// error propagates to the caller.
pub fn scope<T, E>(site: RawCallSite, body: impl FnOnce(&Frame) -> Result<T, E>) -> Result<T, E>
where
    T: Debug,
    E: std::error::Error + 'static,
{
    let frame = Frame::enter(site);
    let outcome = body(&frame);
    match &outcome {
        Ok(value) if frame.is_traced() => frame.exit(render_value(value)),
        Ok(_) => frame.exit(None),
        Err(error) => {
            if !frame.is_unwinding() {
                frame.report_exception(error);
            }
            frame.exit(None);
        }
    }
    outcome
}
