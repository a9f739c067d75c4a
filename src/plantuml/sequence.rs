//! Streaming export of sequence diagrams in the PlantUML syntax
//!
//! The sequence diagram follows the execution order, so each event is written
//! as soon as it is received.

use std::io::{self, Write};

use super::{escape_dunder, replace_arobase, FOOTER};
use crate::domain::{CallEnd, ErrorInfo};
use crate::sink::DiagramSink;

const HEADER: &str = "skinparam BoxPadding 10
skinparam ParticipantPadding 5
skinparam NoteBackgroundColor Cornsilk
skinparam NoteBorderColor Sienna
hide footbox
";

/// Writes a PlantUML sequence diagram as the tracing goes
#[derive(Debug)]
pub struct SequenceRenderer<W: Write> {
    writer: W,
}

impl<W: Write> SequenceRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }
}

/// Text with `@` replaced and dunders escaped
fn escaped(text: &str) -> String {
    escape_dunder(&replace_arobase(text))
}

/// Participant name: `"module\nfunction"`, with a literal `\n`
fn participant(call_end: &CallEnd) -> String {
    format!(
        "\"{}\\n{}\"",
        escaped(&call_end.fq_module_text),
        escaped(&call_end.function_name)
    )
}

fn error_label(error: &ErrorInfo) -> String {
    format!(
        "\"\"{}\"\"\\n{}",
        replace_arobase(&error.class_name),
        replace_arobase(&error.message)
    )
}

fn value_text(value: Option<&str>) -> String {
    value.map(escaped).unwrap_or_default()
}

impl<W: Write> DiagramSink for SequenceRenderer<W> {
    fn on_header(&mut self, start_module: &str, start_function: &str) -> io::Result<()> {
        writeln!(
            self.writer,
            "@startuml {}",
            replace_arobase(&format!("{}.{}-sequence", start_module, start_function))
        )?;
        self.writer.write_all(HEADER.as_bytes())
    }

    fn on_tracing_start(&mut self, called: &CallEnd) -> io::Result<()> {
        write!(
            self.writer,
            "\n[o-> {}\nnote right: line {}\n",
            participant(called),
            called.line_index
        )
    }

    fn on_start_call(&mut self, caller: &CallEnd, called: &CallEnd) -> io::Result<()> {
        write!(
            self.writer,
            "\n{} -> {} ++\nnote left: line {}\nnote right: line {}\n",
            participant(caller),
            participant(called),
            caller.line_index,
            called.line_index
        )
    }

    fn on_error_propagation(
        &mut self,
        error_called: &CallEnd,
        error_caller: &CallEnd,
        error: &ErrorInfo,
    ) -> io::Result<()> {
        let called = participant(error_called);
        write!(
            self.writer,
            "\n{} o<--x {}: {}\ndeactivate {}\nnote right: line {}\nnote left: line {}\n",
            participant(error_caller),
            called,
            error_label(error),
            called,
            error_called.line_index,
            error_caller.line_index
        )
    }

    fn on_return(&mut self, called: &CallEnd, _caller: &CallEnd, value: Option<&str>) -> io::Result<()> {
        write!(
            self.writer,
            "\nreturn {}\nnote right: line {}\n|||\n",
            value_text(value),
            called.line_index
        )
    }

    fn on_tracing_end(&mut self, called: &CallEnd, value: Option<&str>) -> io::Result<()> {
        write!(
            self.writer,
            "\n[<-- {}: {}\nnote right: line {}\n",
            participant(called),
            value_text(value),
            called.line_index
        )
    }

    fn on_unhandled_error_end(&mut self, called: &CallEnd, error: &ErrorInfo) -> io::Result<()> {
        write!(
            self.writer,
            "\n[<-->x {}: {}\nnote right: line {}\n",
            participant(called),
            error_label(error),
            called.line_index
        )
    }

    fn on_footer(&mut self) -> io::Result<()> {
        self.writer.write_all(FOOTER.as_bytes())?;
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_end(module: &str, function: &str, line: u32) -> CallEnd {
        CallEnd::new(module.split('.').map(String::from).collect(), function, line)
    }

    fn rendered(action: impl FnOnce(&mut SequenceRenderer<Vec<u8>>) -> io::Result<()>) -> String {
        let mut renderer = SequenceRenderer::new(Vec::new());
        action(&mut renderer).unwrap();
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn test_header() {
        let text = rendered(|r| r.on_header("math_cli.__main__", "factorial"));
        assert!(text.starts_with("@startuml math_cli.__main__.factorial-sequence\n"));
        assert!(text.ends_with("hide footbox\n"));
    }

    #[test]
    fn test_tracing_start_escapes_dunders() {
        let text = rendered(|r| r.on_tracing_start(&call_end("app.__main__", "main", 3)));
        assert_eq!(text, "\n[o-> \"app.~__main~__\\nmain\"\nnote right: line 3\n");
    }

    #[test]
    fn test_start_call() {
        let text = rendered(|r| {
            r.on_start_call(&call_end("app.cli", "main", 12), &call_end("app.compute", "factorial", 4))
        });
        assert_eq!(
            text,
            "\n\"app.cli\\nmain\" -> \"app.compute\\nfactorial\" ++\nnote left: line 12\nnote right: line 4\n"
        );
    }

    #[test]
    fn test_return_without_value() {
        let text = rendered(|r| r.on_return(&call_end("app", "log", 9), &call_end("app", "main", 2), None));
        assert_eq!(text, "\nreturn \nnote right: line 9\n|||\n");
    }

    #[test]
    fn test_error_propagation() {
        let error = ErrorInfo::new("ValueError", "mail@example is invalid");
        let text = rendered(|r| r.on_error_propagation(&call_end("app", "check", 7), &call_end("app", "main", 3), &error));
        assert_eq!(
            text,
            "\n\"app\\nmain\" o<--x \"app\\ncheck\": \"\"ValueError\"\"\\nmail<U+0040>example is invalid\n\
             deactivate \"app\\ncheck\"\nnote right: line 7\nnote left: line 3\n"
        );
    }

    #[test]
    fn test_tracing_end_and_footer() {
        let text = rendered(|r| {
            r.on_tracing_end(&call_end("app", "main", 5), Some("720"))?;
            r.on_footer()
        });
        assert_eq!(text, "\n[<-- \"app\\nmain\": 720\nnote right: line 5\n\n@enduml\n");
    }

    #[test]
    fn test_unhandled_error_end() {
        let error = ErrorInfo::new("FactorialError", "cannot compute");
        let text = rendered(|r| r.on_unhandled_error_end(&call_end("app", "main", 5), &error));
        assert_eq!(
            text,
            "\n[<-->x \"app\\nmain\": \"\"FactorialError\"\"\\ncannot compute\nnote right: line 5\n"
        );
    }
}
