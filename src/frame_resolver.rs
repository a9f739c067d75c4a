//! Resolution of raw call sites into (module path, function name) identities
//!
//! An instrumented function declares a marker fn item; the compiler-provided
//! type path of that item (`std::any::type_name`) is the call site's symbol,
//! e.g. `my_app::math::factorial::__call_site`. Resolution never fails: sites
//! that cannot be identified degrade to `<unknown-module>.<unknown-function>`.

use std::path::Path;

pub const UNKNOWN_MODULE: &str = "<unknown-module>";
pub const UNKNOWN_FUNCTION: &str = "<unknown-function>";

/// Name of the marker fn item declared by `call_site!()`
pub const MARKER_SEGMENT: &str = "__call_site";

/// Static metadata of an instrumented function, captured where its body starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawCallSite {
    pub symbol: &'static str,
    pub file: &'static str,
    pub line: u32,
}

impl RawCallSite {
    pub const fn new(symbol: &'static str, file: &'static str, line: u32) -> Self {
        Self { symbol, file, line }
    }
}

/// Type path of a value's type; used on fn items to get their symbol
pub fn symbol_of<T>(_: &T) -> &'static str {
    std::any::type_name::<T>()
}

/// Capture the call site of the enclosing function
#[macro_export]
macro_rules! call_site {
    () => {{
        fn __call_site() {}
        $crate::frame_resolver::RawCallSite::new(
            $crate::frame_resolver::symbol_of(&__call_site),
            file!(),
            line!(),
        )
    }};
}

/// A resolved call site identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedFrame {
    pub module_path: Vec<String>,
    pub function_name: String,
}

impl ResolvedFrame {
    pub fn unknown() -> Self {
        Self {
            module_path: vec![UNKNOWN_MODULE.to_string()],
            function_name: UNKNOWN_FUNCTION.to_string(),
        }
    }

    pub fn dotted_module(&self) -> String {
        self.module_path.join(".")
    }
}

/// Maps a raw call site to a stable identity
///
/// Implementations must be deterministic for a given site within one process run.
pub trait FrameResolver {
    fn resolve(&self, site: &RawCallSite) -> ResolvedFrame;
}

/// Resolves call sites from their symbol path
#[derive(Debug, Default, Clone, Copy)]
pub struct SymbolPathResolver;

impl FrameResolver for SymbolPathResolver {
    fn resolve(&self, site: &RawCallSite) -> ResolvedFrame {
        let mut segments: Vec<String> = split_symbol(site.symbol)
            .into_iter()
            .filter(|segment| !segment.is_empty() && *segment != "{{closure}}")
            .map(normalize_segment)
            .filter(|segment| !segment.is_empty())
            .collect();

        if segments.last().map(String::as_str) == Some(MARKER_SEGMENT) {
            segments.pop();
        }

        match segments.len() {
            0 => fallback_from_file(site.file),
            1 => ResolvedFrame {
                module_path: vec![UNKNOWN_MODULE.to_string()],
                function_name: segments.remove(0),
            },
            _ => {
                let function_name = segments.pop().unwrap_or_else(|| UNKNOWN_FUNCTION.to_string());
                ResolvedFrame {
                    module_path: segments,
                    function_name,
                }
            }
        }
    }
}

/// Dotted module and name of a function item, for diagram headers
pub fn function_identity<F>(function: &F) -> (String, String) {
    let frame = SymbolPathResolver.resolve(&RawCallSite::new(symbol_of(function), "", 0));
    (frame.dotted_module(), frame.function_name)
}

fn fallback_from_file(file: &str) -> ResolvedFrame {
    let module = Path::new(file)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or(UNKNOWN_MODULE);

    ResolvedFrame {
        module_path: vec![module.to_string()],
        function_name: UNKNOWN_FUNCTION.to_string(),
    }
}

/// Split on `::` outside of angle brackets
fn split_symbol(symbol: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let bytes = symbol.as_bytes();
    let mut index = 0;

    while index < bytes.len() {
        match bytes[index] {
            b'<' => depth += 1,
            b'>' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes.get(index + 1) == Some(&b':') => {
                segments.push(&symbol[start..index]);
                index += 2;
                start = index;
                continue;
            }
            _ => {}
        }
        index += 1;
    }
    segments.push(&symbol[start..]);

    segments
}

/// `<app::Stack as core::fmt::Debug>` -> `Stack`, `<impl app::Stack>` -> `Stack`, `Vec<T>` -> `Vec`
fn normalize_segment(segment: &str) -> String {
    let segment = match segment.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
        Some(qualified) => {
            let self_type = qualified.strip_prefix("impl ").unwrap_or(qualified);
            let self_type = match self_type.split_once(" as ") {
                Some((self_type, _)) => self_type,
                None => self_type,
            };
            let self_type = self_type.split('<').next().unwrap_or(self_type);
            self_type.rsplit("::").next().unwrap_or(self_type)
        }
        None => segment.split('<').next().unwrap_or(segment),
    };

    segment.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(symbol: &'static str) -> ResolvedFrame {
        SymbolPathResolver.resolve(&RawCallSite::new(symbol, "src/math.rs", 1))
    }

    #[test]
    fn test_resolve_plain_function() {
        let frame = resolve("math_cli::controller::factorial::__call_site");
        assert_eq!(frame.module_path, vec!["math_cli", "controller"]);
        assert_eq!(frame.function_name, "factorial");
        assert_eq!(frame.dotted_module(), "math_cli.controller");
    }

    #[test]
    fn test_resolve_skips_closures() {
        let frame = resolve("app::run::{{closure}}::{{closure}}::__call_site");
        assert_eq!(frame.module_path, vec!["app"]);
        assert_eq!(frame.function_name, "run");
    }

    #[test]
    fn test_resolve_method_in_trait_impl() {
        let frame = resolve("<app::shapes::Circle as app::shapes::Shape>::area::__call_site");
        assert_eq!(frame.module_path, vec!["Circle"]);
        assert_eq!(frame.function_name, "area");
    }

    #[test]
    fn test_resolve_inherent_method() {
        let frame = resolve("app::shapes::Circle::new::__call_site");
        assert_eq!(frame.module_path, vec!["app", "shapes", "Circle"]);
        assert_eq!(frame.function_name, "new");
    }

    #[test]
    fn test_resolve_generic_segment() {
        let frame = resolve("app::Stack<T>::push::__call_site");
        assert_eq!(frame.module_path, vec!["app", "Stack"]);
        assert_eq!(frame.function_name, "push");
    }

    #[test]
    fn test_resolve_single_segment() {
        let frame = resolve("main");
        assert_eq!(frame.module_path, vec![UNKNOWN_MODULE]);
        assert_eq!(frame.function_name, "main");
    }

    #[test]
    fn test_resolve_empty_symbol_falls_back_to_file_stem() {
        let frame = SymbolPathResolver.resolve(&RawCallSite::new("", "scripts/report.rs", 7));
        assert_eq!(frame.module_path, vec!["report"]);
        assert_eq!(frame.function_name, UNKNOWN_FUNCTION);
    }

    #[test]
    fn test_resolve_nothing_known() {
        let frame = SymbolPathResolver.resolve(&RawCallSite::new("", "", 0));
        assert_eq!(frame, ResolvedFrame::unknown());
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let site = RawCallSite::new("app::a::b::__call_site", "src/a.rs", 3);
        assert_eq!(SymbolPathResolver.resolve(&site), SymbolPathResolver.resolve(&site));
    }

    #[test]
    fn test_call_site_macro_captures_enclosing_function() {
        fn instrumented() -> RawCallSite {
            crate::call_site!()
        }

        let site = instrumented();
        let frame = SymbolPathResolver.resolve(&site);
        assert_eq!(frame.function_name, "instrumented");
        assert!(site.file.ends_with("frame_resolver.rs"));
        assert!(site.line > 0);
    }

    #[test]
    fn test_function_identity() {
        fn helper() {}
        let (module, name) = function_identity(&helper);
        assert_eq!(name, "helper");
        assert!(module.starts_with("doctrace.frame_resolver"));
    }
}
