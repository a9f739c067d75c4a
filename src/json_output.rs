//! JSON event log of a traced execution
//!
//! `--format json` stores the raw tracing events instead of a diagram. The log
//! can be replayed later into any diagram renderer (`--replay`).

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

use crate::domain::{CallEnd, ErrorInfo};
use crate::error::ExportError;
use crate::sink::{DiagramSink, RecordingSink, SinkEvent};

pub const FORMAT_NAME: &str = "doctrace-events-v1";

/// Summary of a traced execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonSummary {
    /// Number of tracing events, header and footer excluded
    pub total_events: usize,
    /// Number of calls, the traced call included
    pub calls: usize,
    /// Class of the error escaping the traced call, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unhandled_error: Option<String>,
}

/// Document written by `JsonEventLog`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonEventLogDocument {
    /// Version of the writing crate
    pub version: String,
    /// Format name
    pub format: String,
    pub start_module: String,
    pub start_function: String,
    /// All the sink events, header and footer included
    pub events: Vec<SinkEvent>,
    pub summary: JsonSummary,
}

impl JsonEventLogDocument {
    fn from_events(events: Vec<SinkEvent>) -> Self {
        let (start_module, start_function) = events
            .iter()
            .find_map(|event| match event {
                SinkEvent::Header {
                    start_module,
                    start_function,
                } => Some((start_module.clone(), start_function.clone())),
                _ => None,
            })
            .unwrap_or_default();

        let mut summary = JsonSummary::default();
        for event in &events {
            match event {
                SinkEvent::Header { .. } | SinkEvent::Footer => continue,
                SinkEvent::TracingStart { .. } | SinkEvent::StartCall { .. } => summary.calls += 1,
                SinkEvent::UnhandledErrorEnd { error, .. } => {
                    summary.unhandled_error = Some(error.class_name.clone());
                }
                _ => {}
            }
            summary.total_events += 1;
        }

        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: FORMAT_NAME.to_string(),
            start_module,
            start_function,
            events,
            summary,
        }
    }
}

/// Sink buffering the events and writing them as one JSON document at footer
#[derive(Debug)]
pub struct JsonEventLog<W: Write> {
    writer: W,
    recording: RecordingSink,
}

impl<W: Write> JsonEventLog<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            recording: RecordingSink::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> DiagramSink for JsonEventLog<W> {
    fn on_header(&mut self, start_module: &str, start_function: &str) -> io::Result<()> {
        self.recording.on_header(start_module, start_function)
    }

    fn on_tracing_start(&mut self, called: &CallEnd) -> io::Result<()> {
        self.recording.on_tracing_start(called)
    }

    fn on_start_call(&mut self, caller: &CallEnd, called: &CallEnd) -> io::Result<()> {
        self.recording.on_start_call(caller, called)
    }

    fn on_error_propagation(
        &mut self,
        error_called: &CallEnd,
        error_caller: &CallEnd,
        error: &ErrorInfo,
    ) -> io::Result<()> {
        self.recording.on_error_propagation(error_called, error_caller, error)
    }

    fn on_return(&mut self, called: &CallEnd, caller: &CallEnd, value: Option<&str>) -> io::Result<()> {
        self.recording.on_return(called, caller, value)
    }

    fn on_tracing_end(&mut self, called: &CallEnd, value: Option<&str>) -> io::Result<()> {
        self.recording.on_tracing_end(called, value)
    }

    fn on_unhandled_error_end(&mut self, called: &CallEnd, error: &ErrorInfo) -> io::Result<()> {
        self.recording.on_unhandled_error_end(called, error)
    }

    fn on_footer(&mut self) -> io::Result<()> {
        self.recording.on_footer()?;
        let events = std::mem::take(&mut self.recording).into_events();
        let document = JsonEventLogDocument::from_events(events);

        serde_json::to_writer_pretty(&mut self.writer, &document)?;
        writeln!(self.writer)?;
        self.writer.flush()
    }
}

/// Load an event log written by `JsonEventLog`
pub fn read_event_log<R: Read>(reader: R) -> Result<JsonEventLogDocument, ExportError> {
    let document: JsonEventLogDocument = serde_json::from_reader(reader)?;
    if document.format != FORMAT_NAME {
        tracing::warn!(
            "event log format is '{}', expected '{}'",
            document.format,
            FORMAT_NAME
        );
    }
    Ok(document)
}
