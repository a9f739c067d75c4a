//! Ready-made presets and the textual preset expressions used by the CLI
//!
//! Expressions:
//! - `std`, `builtins`, `tests`: exclude the corresponding top-level modules
//! - `modules=serde,regex`: exclude arbitrary top-level modules
//! - `depth=5`: exclude calls deeper than the threshold
//! - `pattern=/^app::noise/`: exclude modules matching a regex
//! - `pattern=/^app::noise/!/keep_me/`: same, but keep functions matching the 2nd regex

use std::collections::HashSet;

use regex::Regex;

use super::Preset;
use crate::error::FilterError;

/// Top-level modules of the language core
pub const BUILTIN_MODULE_NAMES: &[&str] = &["core", "alloc"];

/// Top-level modules of the standard distribution
pub const STD_MODULE_NAMES: &[&str] = &["std", "core", "alloc", "proc_macro", "test"];

/// Top-level modules of test harnesses
pub const TEST_MODULE_NAMES: &[&str] = &["tests", "test", "proptest", "criterion"];

/// Exclude the calls to functions of the given top-level modules
pub fn exclude_modules<I, S>(name: &str, module_names: I) -> Preset
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let module_names: HashSet<String> = module_names.into_iter().map(Into::into).collect();
    Preset::new(name, move |module_parts, _, _| {
        module_parts
            .first()
            .is_some_and(|top_module| module_names.contains(top_module))
    })
}

pub fn exclude_builtins() -> Preset {
    exclude_modules("builtins", BUILTIN_MODULE_NAMES.iter().copied())
}

pub fn exclude_std() -> Preset {
    exclude_modules("std", STD_MODULE_NAMES.iter().copied())
}

pub fn exclude_tests() -> Preset {
    exclude_modules("tests", TEST_MODULE_NAMES.iter().copied())
}

/// Presets applied when the user does not provide any
pub fn default_presets() -> Vec<Preset> {
    vec![exclude_std(), exclude_tests()]
}

/// Exclude the calls whose depth in the call stack is above the threshold
pub fn exclude_call_depth(depth_threshold: i64) -> Result<Preset, FilterError> {
    if depth_threshold < 0 {
        return Err(FilterError::NegativeDepth(depth_threshold));
    }
    let depth_threshold = depth_threshold as usize;

    Ok(Preset::new(
        format!("depth>{}", depth_threshold),
        move |_, _, call_depth| call_depth > depth_threshold,
    ))
}

/// Depth preset from a loosely-typed configuration value
pub fn exclude_call_depth_from_value(value: Option<&toml::Value>) -> Result<Preset, FilterError> {
    match value {
        Some(toml::Value::Integer(depth_threshold)) => exclude_call_depth(*depth_threshold),
        _ => Err(FilterError::NotAnInteger),
    }
}

/// Parse a textual depth threshold (`None` when the threshold is missing)
pub fn parse_depth_threshold(raw: Option<&str>) -> Result<i64, FilterError> {
    let raw = raw.map(str::trim).ok_or(FilterError::NotAnInteger)?;
    let depth_threshold = raw.parse::<i64>().map_err(|_| FilterError::NotAnInteger)?;
    if depth_threshold < 0 {
        return Err(FilterError::NegativeDepth(depth_threshold));
    }

    Ok(depth_threshold)
}

pub fn exclude_depth_below_5() -> Preset {
    Preset::new("depth>5", |_, _, call_depth| call_depth > 5)
}

fn compile(pattern: &str) -> Result<Regex, FilterError> {
    Regex::new(pattern).map_err(|e| FilterError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Exclude modules whose `::`-joined path matches the regex
pub fn exclude_module_pattern(pattern: &str) -> Result<Preset, FilterError> {
    let regex = compile(pattern)?;
    Ok(Preset::new(format!("pattern=/{}/", pattern), move |module_parts, _, _| {
        regex.is_match(&module_parts.join("::"))
    }))
}

/// Same as `exclude_module_pattern`, keeping the functions whose name matches `include`
pub fn exclude_module_pattern_except(pattern: &str, include: &str) -> Result<Preset, FilterError> {
    let include = compile(include)?;
    Ok(exclude_module_pattern(pattern)?
        .with_include(move |_, function_name, _| include.is_match(function_name)))
}

impl Preset {
    /// Parse a preset expression like "std", "depth=5" or "pattern=/^app::noise/"
    pub fn from_expr(expr: &str) -> Result<Self, FilterError> {
        let expr = expr.trim();
        let (key, value) = match expr.split_once('=') {
            Some((key, value)) => (key.trim(), Some(value.trim())),
            None => (expr, None),
        };

        match (key, value) {
            ("std", None) => Ok(exclude_std()),
            ("builtins", None) => Ok(exclude_builtins()),
            ("tests", None) => Ok(exclude_tests()),
            ("depth", raw) => exclude_call_depth(parse_depth_threshold(raw)?),
            ("modules", Some(names)) => {
                let names: Vec<&str> = names
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .collect();
                if names.is_empty() {
                    return Err(FilterError::InvalidExpression(expr.to_string()));
                }
                Ok(exclude_modules(expr, names))
            }
            ("pattern", Some(patterns)) => Self::from_pattern_text(expr, patterns),
            _ => Err(FilterError::InvalidExpression(expr.to_string())),
        }
    }

    /// `/exclude/` or `/exclude/!/include/`
    fn from_pattern_text(expr: &str, patterns: &str) -> Result<Self, FilterError> {
        let invalid = || FilterError::InvalidExpression(expr.to_string());
        let (exclude, include) = match patterns.split_once("/!/") {
            Some((exclude, include)) => (exclude, Some(include)),
            None => (patterns, None),
        };

        let exclude = exclude.strip_prefix('/').ok_or_else(invalid)?;
        match include {
            None => {
                let exclude = exclude.strip_suffix('/').ok_or_else(invalid)?;
                exclude_module_pattern(exclude)
            }
            Some(include) => {
                let include = include.strip_suffix('/').ok_or_else(invalid)?;
                exclude_module_pattern_except(exclude, include)
            }
        }
    }
}
