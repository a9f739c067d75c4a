//! Consumers of the tracing events
//!
//! A `DiagramSink` receives exactly one header and one footer per export, and
//! the tracing events in chronological order in between. Every event can be
//! recorded as a `SinkEvent` and replayed later, which reproduces the output of
//! any sink byte for byte.

use std::io;

use serde::{Deserialize, Serialize};

use crate::domain::{CallEnd, ErrorInfo};

/// Consumer of the high-level tracing events
pub trait DiagramSink {
    fn on_header(&mut self, start_module: &str, start_function: &str) -> io::Result<()>;

    /// The outermost traced call starts
    fn on_tracing_start(&mut self, called: &CallEnd) -> io::Result<()>;

    fn on_start_call(&mut self, caller: &CallEnd, called: &CallEnd) -> io::Result<()>;

    /// An error leaves `error_called` unhandled and enters `error_caller`
    fn on_error_propagation(
        &mut self,
        error_called: &CallEnd,
        error_caller: &CallEnd,
        error: &ErrorInfo,
    ) -> io::Result<()>;

    fn on_return(&mut self, called: &CallEnd, caller: &CallEnd, value: Option<&str>) -> io::Result<()>;

    /// The outermost traced call returns
    fn on_tracing_end(&mut self, called: &CallEnd, value: Option<&str>) -> io::Result<()>;

    /// An error escapes the outermost traced call
    fn on_unhandled_error_end(&mut self, called: &CallEnd, error: &ErrorInfo) -> io::Result<()>;

    fn on_footer(&mut self) -> io::Result<()>;
}

macro_rules! forward_sink {
    ($($target:ty),*) => {$(
        impl<S: DiagramSink + ?Sized> DiagramSink for $target {
            fn on_header(&mut self, start_module: &str, start_function: &str) -> io::Result<()> {
                (**self).on_header(start_module, start_function)
            }
            fn on_tracing_start(&mut self, called: &CallEnd) -> io::Result<()> {
                (**self).on_tracing_start(called)
            }
            fn on_start_call(&mut self, caller: &CallEnd, called: &CallEnd) -> io::Result<()> {
                (**self).on_start_call(caller, called)
            }
            fn on_error_propagation(
                &mut self,
                error_called: &CallEnd,
                error_caller: &CallEnd,
                error: &ErrorInfo,
            ) -> io::Result<()> {
                (**self).on_error_propagation(error_called, error_caller, error)
            }
            fn on_return(&mut self, called: &CallEnd, caller: &CallEnd, value: Option<&str>) -> io::Result<()> {
                (**self).on_return(called, caller, value)
            }
            fn on_tracing_end(&mut self, called: &CallEnd, value: Option<&str>) -> io::Result<()> {
                (**self).on_tracing_end(called, value)
            }
            fn on_unhandled_error_end(&mut self, called: &CallEnd, error: &ErrorInfo) -> io::Result<()> {
                (**self).on_unhandled_error_end(called, error)
            }
            fn on_footer(&mut self) -> io::Result<()> {
                (**self).on_footer()
            }
        }
    )*};
}

forward_sink!(Box<S>, &mut S);

/// One sink call, as stored in event logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SinkEvent {
    Header {
        start_module: String,
        start_function: String,
    },
    TracingStart {
        called: CallEnd,
    },
    StartCall {
        caller: CallEnd,
        called: CallEnd,
    },
    ErrorPropagation {
        error_called: CallEnd,
        error_caller: CallEnd,
        error: ErrorInfo,
    },
    Return {
        called: CallEnd,
        caller: CallEnd,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    TracingEnd {
        called: CallEnd,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    UnhandledErrorEnd {
        called: CallEnd,
        error: ErrorInfo,
    },
    Footer,
}

impl SinkEvent {
    /// Drive `sink` with this event
    pub fn replay<S: DiagramSink + ?Sized>(&self, sink: &mut S) -> io::Result<()> {
        match self {
            SinkEvent::Header {
                start_module,
                start_function,
            } => sink.on_header(start_module, start_function),
            SinkEvent::TracingStart { called } => sink.on_tracing_start(called),
            SinkEvent::StartCall { caller, called } => sink.on_start_call(caller, called),
            SinkEvent::ErrorPropagation {
                error_called,
                error_caller,
                error,
            } => sink.on_error_propagation(error_called, error_caller, error),
            SinkEvent::Return { called, caller, value } => sink.on_return(called, caller, value.as_deref()),
            SinkEvent::TracingEnd { called, value } => sink.on_tracing_end(called, value.as_deref()),
            SinkEvent::UnhandledErrorEnd { called, error } => sink.on_unhandled_error_end(called, error),
            SinkEvent::Footer => sink.on_footer(),
        }
    }

    /// Name of the event, as used in logs and event files
    pub fn kind(&self) -> &'static str {
        match self {
            SinkEvent::Header { .. } => "header",
            SinkEvent::TracingStart { .. } => "tracing_start",
            SinkEvent::StartCall { .. } => "start_call",
            SinkEvent::ErrorPropagation { .. } => "error_propagation",
            SinkEvent::Return { .. } => "return",
            SinkEvent::TracingEnd { .. } => "tracing_end",
            SinkEvent::UnhandledErrorEnd { .. } => "unhandled_error_end",
            SinkEvent::Footer => "footer",
        }
    }
}

/// Replay a whole event log into `sink`, stopping at the first failure
pub fn replay<'a, S, I>(events: I, sink: &mut S) -> io::Result<()>
where
    S: DiagramSink + ?Sized,
    I: IntoIterator<Item = &'a SinkEvent>,
{
    for event in events {
        event.replay(sink)?;
    }
    Ok(())
}

/// Sink keeping every event in memory
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Vec<SinkEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[SinkEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<SinkEvent> {
        self.events
    }

    /// Number of recorded events of the given kind
    pub fn count(&self, kind: &str) -> usize {
        self.events.iter().filter(|event| event.kind() == kind).count()
    }

    fn record(&mut self, event: SinkEvent) -> io::Result<()> {
        self.events.push(event);
        Ok(())
    }
}

impl DiagramSink for RecordingSink {
    fn on_header(&mut self, start_module: &str, start_function: &str) -> io::Result<()> {
        self.record(SinkEvent::Header {
            start_module: start_module.to_string(),
            start_function: start_function.to_string(),
        })
    }

    fn on_tracing_start(&mut self, called: &CallEnd) -> io::Result<()> {
        self.record(SinkEvent::TracingStart { called: called.clone() })
    }

    fn on_start_call(&mut self, caller: &CallEnd, called: &CallEnd) -> io::Result<()> {
        self.record(SinkEvent::StartCall {
            caller: caller.clone(),
            called: called.clone(),
        })
    }

    fn on_error_propagation(
        &mut self,
        error_called: &CallEnd,
        error_caller: &CallEnd,
        error: &ErrorInfo,
    ) -> io::Result<()> {
        self.record(SinkEvent::ErrorPropagation {
            error_called: error_called.clone(),
            error_caller: error_caller.clone(),
            error: error.clone(),
        })
    }

    fn on_return(&mut self, called: &CallEnd, caller: &CallEnd, value: Option<&str>) -> io::Result<()> {
        self.record(SinkEvent::Return {
            called: called.clone(),
            caller: caller.clone(),
            value: value.map(String::from),
        })
    }

    fn on_tracing_end(&mut self, called: &CallEnd, value: Option<&str>) -> io::Result<()> {
        self.record(SinkEvent::TracingEnd {
            called: called.clone(),
            value: value.map(String::from),
        })
    }

    fn on_unhandled_error_end(&mut self, called: &CallEnd, error: &ErrorInfo) -> io::Result<()> {
        self.record(SinkEvent::UnhandledErrorEnd {
            called: called.clone(),
            error: error.clone(),
        })
    }

    fn on_footer(&mut self) -> io::Result<()> {
        self.record(SinkEvent::Footer)
    }
}
