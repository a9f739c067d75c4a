// Configuration file of the doctrace command
//
// Command line options override the values of the file.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, FilterError};
use crate::export::DiagramFormat;
use crate::filter::{call_filter_factory, presets, CallFilter, Preset};

/// Where and how the diagram is written
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub format: DiagramFormat,
    /// Export file path template; the format's default template when missing
    pub path: Option<String>,
}

/// Which calls are traced
///
/// # Example
/// ```
/// use doctrace::config::DoctraceConfig;
///
/// let config = DoctraceConfig::from_toml_str("[filter]\nmax_depth = 3\n").unwrap();
/// assert_eq!(config.presets().unwrap().len(), 3); // std, tests and depth
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Exclude the std and test harness modules
    ///
    /// Default: true
    pub default_presets: bool,

    /// Top-level modules whose calls are not traced
    pub exclude_modules: Vec<String>,

    /// Calls deeper than this depth are not traced (the traced call has depth 0)
    ///
    /// Kept loosely typed so that a float or a string is reported as
    /// "depth threshold must be an integer".
    pub max_depth: Option<toml::Value>,

    /// Regex excluding modules by their `::`-joined path
    pub exclude_pattern: Option<String>,

    /// Regex of function names kept despite `exclude_pattern`
    pub include_pattern: Option<String>,

    /// Preset expressions, as accepted by `--expr`
    pub expressions: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            default_presets: true,
            exclude_modules: Vec::new(),
            max_depth: None,
            exclude_pattern: None,
            include_pattern: None,
            expressions: Vec::new(),
        }
    }
}

impl FilterConfig {
    /// Presets described by this configuration, in a stable order
    pub fn presets(&self) -> Result<Vec<Preset>, FilterError> {
        let mut presets = if self.default_presets {
            presets::default_presets()
        } else {
            Vec::new()
        };

        if !self.exclude_modules.is_empty() {
            presets.push(presets::exclude_modules("modules", self.exclude_modules.iter().cloned()));
        }

        if let Some(max_depth) = &self.max_depth {
            presets.push(presets::exclude_call_depth_from_value(Some(max_depth))?);
        }

        match (&self.exclude_pattern, &self.include_pattern) {
            (Some(exclude), None) => presets.push(presets::exclude_module_pattern(exclude)?),
            (Some(exclude), Some(include)) => {
                presets.push(presets::exclude_module_pattern_except(exclude, include)?)
            }
            (None, Some(include)) => {
                return Err(FilterError::InvalidExpression(format!(
                    "include_pattern '{}' without exclude_pattern",
                    include
                )))
            }
            (None, None) => {}
        }

        for expression in &self.expressions {
            presets.push(Preset::from_expr(expression)?);
        }

        Ok(presets)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DoctraceConfig {
    pub output: OutputConfig,
    pub filter: FilterConfig,
}

impl DoctraceConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        // fail fast on invalid filters, before any tracing starts
        config.filter.presets()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        tracing::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn presets(&self) -> Result<Vec<Preset>, ConfigError> {
        Ok(self.filter.presets()?)
    }

    /// The call filter of this configuration; no preset at all traces every call
    pub fn call_filter(&self) -> Result<Arc<CallFilter>, ConfigError> {
        Ok(call_filter_factory(Some(self.presets()?)))
    }
}
