//! CLI argument parsing for doctrace

use std::path::PathBuf;

use clap::Parser;

use crate::config::DoctraceConfig;
use crate::demos::Demo;
use crate::error::ConfigError;
use crate::export::DiagramFormat;
use crate::filter::Preset;

#[derive(Parser, Debug)]
#[command(name = "doctrace")]
#[command(version)]
#[command(about = "Trace an instrumented program into a PlantUML sequence or component diagram", long_about = None)]
pub struct Cli {
    /// Sample program to trace
    #[arg(value_enum, default_value = "factorial")]
    pub demo: Demo,

    /// Argument of the sample program (defaults to 6, 5 for fibonacci)
    #[arg(short = 'a', long = "arg", value_name = "ARG", allow_hyphen_values = true)]
    pub arg: Option<String>,

    /// Diagram format (overrides the configuration file; default: sequence)
    #[arg(long = "format", value_enum)]
    pub format: Option<DiagramFormat>,

    /// Export file path template, supporting ${function_name}, ${function_module}
    /// and ${datetime_millis}
    #[arg(short = 'o', long = "output", value_name = "TEMPLATE")]
    pub output: Option<String>,

    /// Filter traced calls (e.g., -e depth=3, -e modules=serde,regex, -e pattern=/^app::noise/)
    #[arg(short = 'e', long = "expr", value_name = "EXPR")]
    pub expressions: Vec<String>,

    /// TOML configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Trace the std and test harness modules too
    #[arg(long = "no-default-filters")]
    pub no_default_filters: bool,

    /// Render a JSON event log into a diagram instead of tracing a demo
    #[arg(long = "replay", value_name = "EVENTS_JSON")]
    pub replay: Option<PathBuf>,

    /// Enable debug tracing output to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

impl Cli {
    /// The configuration file, or the default configuration without one
    pub fn load_config(&self) -> Result<DoctraceConfig, ConfigError> {
        match &self.config {
            Some(path) => DoctraceConfig::load(path),
            None => Ok(DoctraceConfig::default()),
        }
    }

    pub fn demo_arg(&self) -> &str {
        self.arg.as_deref().unwrap_or_else(|| self.demo.default_arg())
    }

    pub fn format(&self, config: &DoctraceConfig) -> DiagramFormat {
        self.format.unwrap_or(config.output.format)
    }

    pub fn path_template(&self, config: &DoctraceConfig, format: DiagramFormat) -> String {
        self.output
            .clone()
            .or_else(|| config.output.path.clone())
            .unwrap_or_else(|| format.default_path_template().to_string())
    }

    /// Presets of the configuration followed by the `-e` expressions
    pub fn presets(&self, config: &DoctraceConfig) -> Result<Vec<Preset>, ConfigError> {
        let mut filter = config.filter.clone();
        if self.no_default_filters {
            filter.default_presets = false;
        }

        let mut presets = filter.presets()?;
        for expression in &self.expressions {
            presets.push(Preset::from_expr(expression)?);
        }
        Ok(presets)
    }
}
