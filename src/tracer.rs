//! Execution tracing: turns raw frame events into diagram events
//!
//! The tracer receives the raw call/line/exception/return events of the
//! instrumented code and reports well-formed call, return, error propagation
//! and unhandled error events to a `DiagramSink`.
//!
//! An error entering a frame is flagged along with its line. When the frame
//! later exits:
//! - at the same line, the error went through the frame untouched: it
//!   propagates to the caller (or escapes the traced execution);
//! - at another line, the frame handled it and returns normally.
//!
//! A frame handling an error and exiting on the very line the error entered
//! is reported as a propagation: the line numbers are the only information
//! available to tell both cases apart.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::sync::Arc;

use crate::domain::{CallEnd, ErrorInfo, TracedError};
use crate::error::ExportError;
use crate::filter::CallFilter;
use crate::frame_resolver::{FrameResolver, RawCallSite, SymbolPathResolver};
use crate::hook::{self, Disposition, SharedHook, TraceHook};
use crate::sink::DiagramSink;

/// Conceptual state of the tracer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracerState {
    /// No call in progress
    Idle,
    /// Calls in progress, no error flagged
    InCall,
    /// An error unwinds through the frame at the top of the stack
    ErrorPendingInCall,
    /// An error is flagged while no frame is left to resolve it
    ///
    /// Transient: the frame exit resolving an error pops the frame and clears
    /// the flag in the same event, so `state()` never reports it.
    ErrorPendingAboveCall,
}

/// A call in progress
#[derive(Debug, Clone)]
struct ActiveCall {
    /// Snapshot taken when the call started
    call: CallEnd,
    /// Line the frame is currently executing
    current_line: u32,
}

impl ActiveCall {
    fn snapshot(&self) -> CallEnd {
        self.call.at_line(self.current_line)
    }
}

struct TracerCore<S> {
    sink: S,
    call_filter: Arc<CallFilter>,
    resolver: Box<dyn FrameResolver>,
    callers_stack: Vec<ActiveCall>,
    error_to_handle_with_line: Option<TracedError>,
    sink_error: Option<io::Error>,
}

impl<S: DiagramSink> TracerCore<S> {
    /// Forward an event to the sink, unless a previous event failed
    fn emit(&mut self, event: impl FnOnce(&mut S) -> io::Result<()>) {
        if self.sink_error.is_some() {
            return;
        }
        if let Err(e) = event(&mut self.sink) {
            tracing::warn!("diagram sink failed, stopping the export: {}", e);
            self.sink_error = Some(e);
        }
    }

    fn on_return_or_exit(&mut self, called: CallEnd, value: Option<String>) {
        match self.callers_stack.last().map(ActiveCall::snapshot) {
            // the call stack is empty: end of the tracing
            None => self.emit(|sink| sink.on_tracing_end(&called, value.as_deref())),
            Some(caller) => self.emit(|sink| sink.on_return(&called, &caller, value.as_deref())),
        }
    }

    fn state(&self) -> TracerState {
        match (self.callers_stack.is_empty(), &self.error_to_handle_with_line) {
            (true, None) => TracerState::Idle,
            (false, None) => TracerState::InCall,
            (false, Some(_)) => TracerState::ErrorPendingInCall,
            (true, Some(_)) => TracerState::ErrorPendingAboveCall,
        }
    }
}

impl<S: DiagramSink> TraceHook for TracerCore<S> {
    fn on_call(&mut self, site: &RawCallSite) -> Disposition {
        let frame = self.resolver.resolve(site);
        let call_depth = self.callers_stack.len();

        if !self
            .call_filter
            .should_trace_call(&frame.module_path, &frame.function_name, call_depth)
        {
            tracing::trace!(
                "call to {}.{} filtered out at depth {}",
                frame.dotted_module(),
                frame.function_name,
                call_depth
            );
            return Disposition::Skip;
        }

        let call = CallEnd::new(frame.module_path, frame.function_name, site.line);

        // an error flagged by a sibling call and never resolved must not leak
        self.error_to_handle_with_line = None;

        match self.callers_stack.last().map(ActiveCall::snapshot) {
            None => self.emit(|sink| sink.on_tracing_start(&call)),
            Some(caller) => self.emit(|sink| sink.on_start_call(&caller, &call)),
        }

        self.callers_stack.push(ActiveCall {
            current_line: call.line_index,
            call,
        });

        Disposition::Trace
    }

    fn on_line(&mut self, line: u32) {
        if let Some(active) = self.callers_stack.last_mut() {
            active.current_line = line;
        }
    }

    fn on_exception(&mut self, error: ErrorInfo, line: u32) {
        tracing::trace!("{} entered the frame at line {}", error.class_name, line);
        if let Some(active) = self.callers_stack.last_mut() {
            active.current_line = line;
        }
        // a later error (re-raised, wrapped or replaced) overrides the flagged one
        self.error_to_handle_with_line = Some(TracedError {
            error,
            line_index: line,
        });
    }

    fn on_return(&mut self, line: u32, value: Option<String>) {
        let Some(active) = self.callers_stack.pop() else {
            tracing::warn!("frame exit at line {} without a traced call", line);
            return;
        };
        let called = active.call.at_line(line);

        match self.error_to_handle_with_line.take() {
            // the error exits the frame where it entered: propagation
            Some(TracedError { error, line_index }) if line_index == line => {
                match self.callers_stack.last().map(ActiveCall::snapshot) {
                    None => self.emit(|sink| sink.on_unhandled_error_end(&called, &error)),
                    Some(caller) => self.emit(|sink| sink.on_error_propagation(&called, &caller, &error)),
                }
            }
            // no error, or an error handled by the frame before returning normally
            _ => self.on_return_or_exit(called, value),
        }
    }
}

/// Traces the execution of a callable and pushes events to its sink
pub struct ExecutionTracer<S: DiagramSink + 'static> {
    core: Rc<RefCell<TracerCore<S>>>,
}

impl<S: DiagramSink + 'static> ExecutionTracer<S> {
    /// Create a tracer resolving call sites from their symbol path
    pub fn new(sink: S, call_filter: Arc<CallFilter>) -> Self {
        Self::with_resolver(sink, call_filter, SymbolPathResolver)
    }

    pub fn with_resolver(sink: S, call_filter: Arc<CallFilter>, resolver: impl FrameResolver + 'static) -> Self {
        Self {
            core: Rc::new(RefCell::new(TracerCore {
                sink,
                call_filter,
                resolver: Box::new(resolver),
                callers_stack: Vec::new(),
                error_to_handle_with_line: None,
                sink_error: None,
            })),
        }
    }

    /// Run `func` with this tracer installed as the hook of the current thread
    ///
    /// The previous hook is restored whatever the outcome. The outcome of `func`
    /// (including a returned `Err` or a panic) reaches the caller untouched.
    pub fn runfunc<R>(&self, func: impl FnOnce() -> R) -> R {
        {
            let mut core = self.core.borrow_mut();
            core.callers_stack.clear();
            core.error_to_handle_with_line = None;
        }
        tracing::debug!("tracing started");

        let shared_hook: SharedHook = self.core.clone();
        let outcome = hook::with_hook(shared_hook, func);

        tracing::debug!(
            "tracing ended with call depth {}",
            self.core.borrow().callers_stack.len()
        );
        outcome
    }

    /// Number of calls in progress
    pub fn call_depth(&self) -> usize {
        self.core.borrow().callers_stack.len()
    }

    pub fn state(&self) -> TracerState {
        self.core.borrow().state()
    }

    /// First sink failure that stopped the event stream, if any
    pub fn take_sink_error(&self) -> Option<io::Error> {
        self.core.borrow_mut().sink_error.take()
    }

    /// Access the sink outside of tracing (header and footer events)
    pub fn with_sink<T>(&self, action: impl FnOnce(&mut S) -> T) -> T {
        action(&mut self.core.borrow_mut().sink)
    }

    /// Give the sink back once tracing is over
    pub fn into_sink(self) -> Result<S, ExportError> {
        match Rc::try_unwrap(self.core) {
            Ok(core) => Ok(core.into_inner().sink),
            Err(_) => Err(ExportError::SinkInUse),
        }
    }
}
