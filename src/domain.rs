//! Execution domain models shared by the tracer and the diagram sinks
//!
//! Values are immutable snapshots: each event carries freshly built `CallEnd`s,
//! so sinks never observe a line index changing under their feet.

use serde::{Deserialize, Serialize};

/// One end of a call relationship: a function in a module, at a given line
///
/// The same logical call produces several snapshots over its lifetime, which
/// only differ by `line_index`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallEnd {
    /// Dotted module path, e.g. `math_cli.controller`
    pub fq_module_text: String,
    /// Module path segments, e.g. `["math_cli", "controller"]`
    pub fq_module_path: Vec<String>,
    pub function_name: String,
    pub line_index: u32,
}

impl CallEnd {
    /// Create a call end, deriving the dotted module text from the path
    pub fn new(fq_module_path: Vec<String>, function_name: impl Into<String>, line_index: u32) -> Self {
        Self {
            fq_module_text: fq_module_path.join("."),
            fq_module_path,
            function_name: function_name.into(),
            line_index,
        }
    }

    /// Snapshot of this call end at another line
    pub fn at_line(&self, line_index: u32) -> Self {
        Self {
            line_index,
            ..self.clone()
        }
    }
}

/// An error raised in the traced program, denormalized for display purposes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub class_name: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            message: message.into(),
        }
    }

    /// Record of a panic unwinding through traced frames
    pub fn panic() -> Self {
        Self::new("panic", "unwinding")
    }

    /// Build the display record of a Rust error value
    ///
    /// The class name is the last path segment of the error type. The message is
    /// the `Display` text, or the `Debug` rendering when `Display` is empty.
    pub fn from_error<E: std::error::Error + 'static>(error: &E) -> Self {
        let message = error.to_string();
        let message = if message.is_empty() {
            format!("{:?}", error)
        } else {
            message
        };

        Self {
            class_name: short_type_name(std::any::type_name::<E>()),
            message,
        }
    }
}

/// An error unwinding through the current frame, not yet resolved as
/// propagated or handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracedError {
    pub error: ErrorInfo,
    /// Line at which the error entered the frame
    pub line_index: u32,
}

/// `alloc::boxed::Box<my_crate::Error>` -> `Box`, `my_crate::errors::ParseError` -> `ParseError`
fn short_type_name(type_name: &str) -> String {
    let without_generics = type_name.split('<').next().unwrap_or(type_name);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct ValueError(String);

    impl fmt::Display for ValueError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for ValueError {}

    #[derive(Debug)]
    struct NotImplementedError;

    impl fmt::Display for NotImplementedError {
        fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
            Ok(())
        }
    }

    impl std::error::Error for NotImplementedError {}

    #[test]
    fn test_call_end_derives_module_text() {
        let call = CallEnd::new(vec!["math_cli".into(), "controller".into()], "factorial", 25);
        assert_eq!(call.fq_module_text, "math_cli.controller");
        assert_eq!(call.function_name, "factorial");
        assert_eq!(call.line_index, 25);
    }

    #[test]
    fn test_call_end_snapshot_keeps_original() {
        let call = CallEnd::new(vec!["app".into()], "main", 3);
        let snapshot = call.at_line(12);
        assert_eq!(snapshot.line_index, 12);
        assert_eq!(call.line_index, 3);
        assert_eq!(snapshot.fq_module_path, call.fq_module_path);
    }

    #[test]
    fn test_error_info_from_error_with_message() {
        let error = ErrorInfo::from_error(&ValueError("value must be positive".into()));
        assert_eq!(error, ErrorInfo::new("ValueError", "value must be positive"));
    }

    #[test]
    fn test_error_info_from_error_without_message() {
        let error = ErrorInfo::from_error(&NotImplementedError);
        assert_eq!(error, ErrorInfo::new("NotImplementedError", "NotImplementedError"));
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("my_crate::errors::ParseError"), "ParseError");
        assert_eq!(short_type_name("alloc::boxed::Box<my_crate::Error>"), "Box");
        assert_eq!(short_type_name("Plain"), "Plain");
    }
}
