//! doctrace - execution tracer rendering calls, returns and propagating errors
//! as PlantUML diagrams
//!
//! Instrumented functions report their calls through `probe` frames. While an
//! `ExecutionTracer` runs a function, these reports are turned into diagram
//! events, filtered by presets, and rendered by a `DiagramSink`: a PlantUML
//! sequence diagram, a component diagram or a replayable JSON event log.

pub mod cli;
pub mod config;
pub mod demos;
pub mod diagram;
pub mod domain;
pub mod error;
pub mod export;
pub mod filter;
pub mod frame_resolver;
pub mod hook;
pub mod json_output;
pub mod plantuml;
pub mod probe;
pub mod sink;
pub mod tracer;
