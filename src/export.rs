//! Export sessions: wiring a traced function to a diagram file
//!
//! A session writes the diagram header, runs the traced function under an
//! `ExecutionTracer`, and writes the footer whatever the outcome of the traced
//! function, panics included.
//!
//! Export file paths are templates supporting these placeholders:
//! - `${function_name}` and `${function_module}`: the traced function identity
//! - `${datetime_millis}`: the moment the traced function is called, e.g.
//!   `1963-08-28_11.37.24_042`
//!
//! Unknown placeholders are left untouched.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ExportError;
use crate::filter::{call_filter_factory, presets, CallFilter, Preset};
use crate::frame_resolver::function_identity;
use crate::json_output::{JsonEventLog, JsonEventLogDocument};
use crate::plantuml::{ComponentAggregator, SequenceRenderer};
use crate::sink::{self, DiagramSink};
use crate::tracer::ExecutionTracer;

pub const FUNCTION_NAME_TAG: &str = "${function_name}";
pub const FUNCTION_MODULE_TAG: &str = "${function_module}";
pub const DATETIME_MILLIS_TAG: &str = "${datetime_millis}";

/// Output formats of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramFormat {
    /// PlantUML sequence diagram
    #[default]
    Sequence,
    /// PlantUML component diagram
    Component,
    /// JSON event log, replayable into a diagram
    Json,
}

impl DiagramFormat {
    pub fn default_path_template(&self) -> &'static str {
        match self {
            DiagramFormat::Sequence => "${function_name}-sequence.puml",
            DiagramFormat::Component => "${function_name}-component.puml",
            DiagramFormat::Json => "${function_name}-events.json",
        }
    }

    /// A sink writing this format to `writer`
    pub fn sink<W: io::Write + 'static>(&self, writer: W) -> Box<dyn DiagramSink> {
        match self {
            DiagramFormat::Sequence => Box::new(SequenceRenderer::new(writer)),
            DiagramFormat::Component => Box::new(ComponentAggregator::new(writer)),
            DiagramFormat::Json => Box::new(JsonEventLog::new(writer)),
        }
    }
}

/// Replace the placeholders known when the export is set up
pub fn template_static_tags(path_template: &str, function_name: &str, function_module: &str) -> String {
    path_template
        .replace(FUNCTION_NAME_TAG, function_name)
        .replace(FUNCTION_MODULE_TAG, function_module)
}

/// Replace the placeholders only known when the traced function is called
pub fn template_dynamic_tags(path_template: &str, moment: NaiveDateTime) -> String {
    if !path_template.contains(DATETIME_MILLIS_TAG) {
        return path_template.to_string();
    }
    let datetime_millis = moment.format("%Y-%m-%d_%H.%M.%S_%3f").to_string();
    path_template.replace(DATETIME_MILLIS_TAG, &datetime_millis)
}

/// The call filter of an export: the default presets when none are given
pub fn export_call_filter(presets: Option<Vec<Preset>>) -> Arc<CallFilter> {
    call_filter_factory(Some(presets.unwrap_or_else(presets::default_presets)))
}

/// Everything needed to export the trace of a function into a file
#[derive(Debug, Clone)]
pub struct ExportContext {
    pub format: DiagramFormat,
    /// Export file path, with its dynamic placeholders still to be replaced
    pub export_file_path: String,
    pub start_module: String,
    pub start_function: String,
    pub call_filter: Arc<CallFilter>,
}

impl ExportContext {
    pub fn new(
        format: DiagramFormat,
        path_template: &str,
        start_module: impl Into<String>,
        start_function: impl Into<String>,
        call_filter: Arc<CallFilter>,
    ) -> Self {
        let start_module = start_module.into();
        let start_function = start_function.into();
        Self {
            format,
            export_file_path: template_static_tags(path_template, &start_function, &start_module),
            start_module,
            start_function,
            call_filter,
        }
    }

    /// Context of a function item, identified by its symbol path
    pub fn for_function<F>(
        function: &F,
        format: DiagramFormat,
        path_template: Option<&str>,
        presets: Option<Vec<Preset>>,
    ) -> Self {
        let (start_module, start_function) = function_identity(function);
        Self::new(
            format,
            path_template.unwrap_or(format.default_path_template()),
            start_module,
            start_function,
            export_call_filter(presets),
        )
    }
}

/// What a tracing session hands back
#[derive(Debug)]
pub struct TracedRun<R, T> {
    /// Outcome of the traced function, untouched
    pub outcome: R,
    /// The sink, or what it was written to
    pub output: T,
    /// First failure of the diagram export, if any
    pub export_error: Option<ExportError>,
}

impl<R, T> TracedRun<R, T> {
    fn map_output<U>(self, output: impl FnOnce(T) -> U) -> TracedRun<R, U> {
        TracedRun {
            outcome: self.outcome,
            output: output(self.output),
            export_error: self.export_error,
        }
    }
}

/// Trace `func` into `sink`, bracketed by the header and footer events
///
/// The footer is written even when `func` panics; the panic is then resumed.
pub fn tracing_session<S, R>(
    sink: S,
    start_module: &str,
    start_function: &str,
    call_filter: Arc<CallFilter>,
    func: impl FnOnce() -> R,
) -> Result<TracedRun<R, S>, ExportError>
where
    S: DiagramSink + 'static,
{
    let tracer = ExecutionTracer::new(sink, call_filter);
    let mut export_error: Option<ExportError> = tracer
        .with_sink(|sink| sink.on_header(start_module, start_function))
        .err()
        .map(ExportError::from);

    tracing::debug!("tracing {}.{}", start_module, start_function);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| tracer.runfunc(func)));

    if let Some(sink_error) = tracer.take_sink_error() {
        export_error.get_or_insert(ExportError::Io(sink_error));
    }
    if let Err(footer_error) = tracer.with_sink(|sink| sink.on_footer()) {
        export_error.get_or_insert(ExportError::Io(footer_error));
    }

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(payload) => {
            tracing::debug!("traced function panicked, diagram footer written");
            panic::resume_unwind(payload)
        }
    };

    if let Some(error) = &export_error {
        tracing::warn!("diagram export of {}.{} failed: {}", start_module, start_function, error);
    }

    Ok(TracedRun {
        outcome,
        output: tracer.into_sink()?,
        export_error,
    })
}

/// Open the export file, creating its parent directories
fn create_export_file(path: &Path) -> Result<BufWriter<File>, ExportError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(BufWriter::new(File::create(path)?))
}

/// Trace `func` into the file described by `context`
///
/// Fails before running `func` when the export file cannot be created.
pub fn trace_to_file<R>(context: &ExportContext, func: impl FnOnce() -> R) -> Result<TracedRun<R, PathBuf>, ExportError> {
    let export_file_path = PathBuf::from(template_dynamic_tags(
        &context.export_file_path,
        Utc::now().naive_utc(),
    ));
    let writer = create_export_file(&export_file_path)?;
    tracing::debug!("exporting {:?} diagram to {}", context.format, export_file_path.display());

    let run = tracing_session(
        context.format.sink(writer),
        &context.start_module,
        &context.start_function,
        Arc::clone(&context.call_filter),
        func,
    )?;

    Ok(run.map_output(|_| export_file_path))
}

/// Render a recorded event log into a file of the given format
pub fn replay_to_file(
    document: &JsonEventLogDocument,
    format: DiagramFormat,
    path_template: &str,
) -> Result<PathBuf, ExportError> {
    let export_file_path = PathBuf::from(template_dynamic_tags(
        &template_static_tags(path_template, &document.start_function, &document.start_module),
        Utc::now().naive_utc(),
    ));
    let mut renderer = format.sink(create_export_file(&export_file_path)?);
    sink::replay(&document.events, &mut *renderer)?;
    tracing::debug!(
        "replayed {} events into {}",
        document.events.len(),
        export_file_path.display()
    );
    Ok(export_file_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::trace_all;
    use crate::probe;
    use crate::sink::{RecordingSink, SinkEvent};
    use std::cell::RefCell;
    use std::io::Write;
    use std::rc::Rc;

    fn moment(text: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.3f").unwrap()
    }

    fn depth_1() -> u32 {
        probe::call(crate::call_site!(), |_| 1)
    }

    #[test]
    fn test_template_static_tags() {
        assert_eq!(
            template_static_tags("without_template_tag.puml", "depth_1", "app.calldepth"),
            "without_template_tag.puml"
        );
        assert_eq!(
            template_static_tags("${function_name}.puml", "depth_1", "app.calldepth"),
            "depth_1.puml"
        );
        assert_eq!(
            template_static_tags("${function_module}.${function_name}.puml", "depth_1", "app.calldepth"),
            "app.calldepth.depth_1.puml"
        );
        assert_eq!(
            template_static_tags("${function_name}-${datetime_millis}.puml", "depth_1", "app"),
            "depth_1-${datetime_millis}.puml"
        );
    }

    #[test]
    fn test_template_dynamic_tags() {
        let moment = moment("1963-08-28T11:37:24.042");
        assert_eq!(template_dynamic_tags("depth_1.puml", moment), "depth_1.puml");
        assert_eq!(
            template_dynamic_tags("depth_1-${datetime_millis}.puml", moment),
            "depth_1-1963-08-28_11.37.24_042.puml"
        );
        assert_eq!(template_dynamic_tags("${unknown}.puml", moment), "${unknown}.puml");
    }

    #[test]
    fn test_default_path_templates() {
        assert_eq!(
            DiagramFormat::Sequence.default_path_template(),
            "${function_name}-sequence.puml"
        );
        assert_eq!(
            DiagramFormat::Component.default_path_template(),
            "${function_name}-component.puml"
        );
    }

    #[test]
    fn test_export_call_filter_defaults() {
        let default_filter = export_call_filter(None);
        assert_eq!(default_filter.presets().len(), 2);
        assert!(!default_filter.should_trace_call(&["std".to_string()], "read", 0));

        let no_filter = export_call_filter(Some(Vec::new()));
        assert!(Arc::ptr_eq(&no_filter, &trace_all()));
    }

    #[test]
    fn test_context_for_function() {
        let context = ExportContext::for_function(&depth_1, DiagramFormat::Component, None, None);
        assert_eq!(context.start_function, "depth_1");
        assert!(context.start_module.starts_with("doctrace.export"));
        assert_eq!(context.export_file_path, "depth_1-component.puml");
    }

    #[test]
    fn test_tracing_session_brackets_events() {
        let run = tracing_session(RecordingSink::new(), "app", "depth_1", trace_all(), depth_1).unwrap();

        assert_eq!(run.outcome, 1);
        assert!(run.export_error.is_none());
        let events = run.output.events();
        assert!(matches!(events.first(), Some(SinkEvent::Header { .. })));
        assert!(matches!(events.last(), Some(SinkEvent::Footer)));
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn test_tracing_session_keeps_traced_error() {
        let run = tracing_session(RecordingSink::new(), "app", "parse", trace_all(), || {
            "x".parse::<u8>()
        })
        .unwrap();
        assert!(run.outcome.is_err());
    }

    /// Writer whose buffer outlives a panicking session
    #[derive(Clone, Default)]
    struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn explode() -> u32 {
        probe::call(crate::call_site!(), |frame| {
            frame.at(line!());
            panic!("traced code failed")
        })
    }

    #[test]
    fn test_tracing_session_writes_footer_when_traced_code_panics() {
        let buffer = SharedBuffer::default();
        let renderer = SequenceRenderer::new(buffer.clone());

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            tracing_session(renderer, "doctrace.export", "explode", trace_all(), explode)
        }));

        let payload = outcome.err().unwrap();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"traced code failed"));
        assert!(crate::hook::current().is_none());

        let diagram = String::from_utf8(buffer.0.borrow().clone()).unwrap();
        assert!(diagram.starts_with("@startuml doctrace.export.explode-sequence\n"));
        assert!(diagram.contains("panic"));
        assert!(diagram.ends_with("@enduml\n"));
    }

    #[test]
    fn test_trace_to_file_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("nested/${function_name}.puml");
        let context = ExportContext::new(
            DiagramFormat::Sequence,
            template.to_str().unwrap(),
            "doctrace.export",
            "depth_1",
            trace_all(),
        );

        let run = trace_to_file(&context, depth_1).unwrap();
        assert_eq!(run.outcome, 1);
        assert_eq!(run.output, dir.path().join("nested/depth_1.puml"));

        let contents = fs::read_to_string(&run.output).unwrap();
        assert!(contents.starts_with("@startuml doctrace.export.depth_1-sequence\n"));
        assert!(contents.ends_with("@enduml\n"));
    }

    #[test]
    fn test_replay_to_file_renders_recorded_events() {
        let dir = tempfile::tempdir().unwrap();
        let context = ExportContext::new(
            DiagramFormat::Json,
            dir.path().join("${function_name}.json").to_str().unwrap(),
            "doctrace.export",
            "depth_1",
            trace_all(),
        );
        let run = trace_to_file(&context, depth_1).unwrap();
        let document = crate::json_output::read_event_log(File::open(&run.output).unwrap()).unwrap();

        let template = dir.path().join("${function_module}-${function_name}.puml");
        let path = replay_to_file(&document, DiagramFormat::Sequence, template.to_str().unwrap()).unwrap();
        assert_eq!(path, dir.path().join("doctrace.export-depth_1.puml"));

        let contents = fs::read_to_string(path).unwrap();
        assert!(contents.starts_with("@startuml doctrace.export.depth_1-sequence\n"));
        assert!(contents.contains("[o-> \"doctrace.export"));
        assert!(contents.contains("\\ndepth_1\"\nnote right"));
        assert!(contents.ends_with("@enduml\n"));
    }
}
