//! Call filtering: decides, per call, whether it gets traced
//!
//! A filter is an ordered list of presets. Each preset pairs an exclusion rule
//! with an optional inclusion rule that can rescue calls the exclusion rule
//! caught. A call is traced unless at least one preset excludes it; presets
//! never override each other.

pub mod presets;

use std::fmt;
use std::sync::{Arc, OnceLock};

/// A rule evaluated against a candidate call:
/// (module path segments, function name, call depth) -> bool
pub type Rule = Arc<dyn Fn(&[String], &str, usize) -> bool + Send + Sync>;

/// A pair of exclusion/inclusion rules
///
/// `include_call` is only consulted when `exclude_call` holds, and returns true
/// to trace the call anyway.
#[derive(Clone)]
pub struct Preset {
    name: String,
    exclude_call: Rule,
    include_call: Option<Rule>,
}

impl Preset {
    /// Create a preset from an exclusion rule
    pub fn new<F>(name: impl Into<String>, exclude_call: F) -> Self
    where
        F: Fn(&[String], &str, usize) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            exclude_call: Arc::new(exclude_call),
            include_call: None,
        }
    }

    /// Add an inclusion rule offering exceptions to the exclusion rule
    pub fn with_include<F>(mut self, include_call: F) -> Self
    where
        F: Fn(&[String], &str, usize) -> bool + Send + Sync + 'static,
    {
        self.include_call = Some(Arc::new(include_call));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this preset, net of its own inclusion rule, excludes the call
    pub fn excludes(&self, module_parts: &[String], function_name: &str, call_depth: usize) -> bool {
        (self.exclude_call)(module_parts, function_name, call_depth)
            && match &self.include_call {
                None => true,
                Some(include_call) => !include_call(module_parts, function_name, call_depth),
            }
    }
}

impl fmt::Debug for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preset")
            .field("name", &self.name)
            .field("has_include", &self.include_call.is_some())
            .finish()
    }
}

#[derive(Debug)]
enum FilterKind {
    TraceAll,
    TraceNone,
    Presets(Vec<Preset>),
}

/// Filter that determines which calls to trace
#[derive(Debug)]
pub struct CallFilter {
    kind: FilterKind,
}

static TRACE_ALL: OnceLock<Arc<CallFilter>> = OnceLock::new();
static TRACE_NONE: OnceLock<Arc<CallFilter>> = OnceLock::new();

/// The filter tracing every call (shared singleton)
pub fn trace_all() -> Arc<CallFilter> {
    TRACE_ALL
        .get_or_init(|| Arc::new(CallFilter { kind: FilterKind::TraceAll }))
        .clone()
}

/// The filter tracing no call at all (shared singleton)
pub fn trace_none() -> Arc<CallFilter> {
    TRACE_NONE
        .get_or_init(|| Arc::new(CallFilter { kind: FilterKind::TraceNone }))
        .clone()
}

/// Build a filter from presets; no preset at all yields the `trace_all()` singleton
pub fn call_filter_factory(presets: Option<Vec<Preset>>) -> Arc<CallFilter> {
    match presets {
        Some(presets) if !presets.is_empty() => Arc::new(CallFilter::new(presets)),
        _ => trace_all(),
    }
}

impl CallFilter {
    /// Create a filter evaluating the given presets
    pub fn new(presets: Vec<Preset>) -> Self {
        Self {
            kind: FilterKind::Presets(presets),
        }
    }

    /// Presets evaluated by this filter (empty for the singletons)
    pub fn presets(&self) -> &[Preset] {
        match &self.kind {
            FilterKind::Presets(presets) => presets,
            FilterKind::TraceAll | FilterKind::TraceNone => &[],
        }
    }

    /// Check if a call should be traced
    pub fn should_trace_call(&self, module_parts: &[String], function_name: &str, call_depth: usize) -> bool {
        match &self.kind {
            FilterKind::TraceAll => true,
            FilterKind::TraceNone => false,
            FilterKind::Presets(presets) => !presets
                .iter()
                .any(|preset| preset.excludes(module_parts, function_name, call_depth)),
        }
    }
}
