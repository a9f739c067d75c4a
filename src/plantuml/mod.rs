//! PlantUML output formats
//!
//! Some characters of module and function names have a meaning in the PlantUML
//! syntax and must be escaped:
//! - `__` starts an underlined text (Creole syntax); it is escaped with `~`
//! - `@` breaks the sequence diagram syntax; it is replaced by its unicode entity

pub mod component;
pub mod sequence;

pub use component::{rank_label, ComponentAggregator, ModuleStructureVisitor};
pub use sequence::SequenceRenderer;

pub const FOOTER: &str = "\n@enduml\n";

pub const UNICODE_AROBASE: &str = "<U+0040>";

/// Escape each `__` occurrence with a tilde: `__main__` -> `~__main~__`
pub fn escape_dunder(text: &str) -> String {
    text.replace("__", "~__")
}

/// Replace each `@` by its unicode entity
pub fn replace_arobase(text: &str) -> String {
    text.replace('@', UNICODE_AROBASE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_dunder() {
        assert_eq!(escape_dunder(""), "");
        assert_eq!(escape_dunder("text"), "text");
        assert_eq!(escape_dunder("____"), "~__~__");
        assert_eq!(escape_dunder("__main__"), "~__main~__");
        assert_eq!(
            escape_dunder("package.__dundermodule__.module.__init__"),
            "package.~__dundermodule~__.module.~__init~__"
        );
    }

    #[test]
    fn test_replace_arobase() {
        assert_eq!(replace_arobase("@"), "<U+0040>");
        assert_eq!(
            replace_arobase("__main__.@decorate(@decorator)"),
            "__main__.<U+0040>decorate(<U+0040>decorator)"
        );
        assert_eq!(replace_arobase("no mail"), "no mail");
    }
}
