//! Export of component diagrams in the PlantUML syntax
//!
//! PlantUML expects the components structure to be declared before the arrows
//! representing the calls. The aggregator thus stores all the traced
//! interactions and writes the whole diagram when the footer event comes.

use std::io::{self, Write};
use std::rc::Rc;

use indexmap::IndexMap;

use super::{escape_dunder, FOOTER};
use crate::diagram::{build_components_structure, Call, Function, Interactions, Module, Raised, Response, Return};
use crate::domain::{CallEnd, ErrorInfo};
use crate::sink::DiagramSink;

const HEADER: &str = "skinparam BoxPadding 10
skinparam componentStyle rectangle
set separator .
!pragma useIntermediatePackages false

";

const INDENT: &str = "  ";

/// Stereotype flagging the traced function
const TRACED_STEREOTYPE: &str = " << @trace_to_component_puml >>";

/// Arrow label listing the ranks; long lists keep the first and last 3 ranks
pub fn rank_label<T: ToString>(ranks: &[T]) -> String {
    if ranks.len() > 7 {
        format!(
            "{} ... {}",
            rank_label(&ranks[..3]),
            rank_label(&ranks[ranks.len() - 3..])
        )
    } else {
        ranks.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    }
}

/// Produces the components structure by visiting the module hierarchy
#[derive(Debug)]
pub struct ModuleStructureVisitor<'a> {
    traced_function: Option<&'a Function>,
    unhandled_error_class_name: Option<&'a str>,
}

impl<'a> ModuleStructureVisitor<'a> {
    pub fn new(traced_function: Option<&'a Function>, unhandled_error_class_name: Option<&'a str>) -> Self {
        Self {
            traced_function,
            unhandled_error_class_name,
        }
    }

    /// Lines of a module, its functions and its sub-modules
    pub fn visit_module(&self, module: &Module, parent_module_path: &[String], indentation_level: usize) -> Vec<String> {
        let mut lines = Vec::new();
        self.write_module(&mut lines, module, parent_module_path, indentation_level);
        lines
    }

    fn write_module(
        &self,
        lines: &mut Vec<String>,
        module: &Module,
        parent_module_path: &[String],
        indentation_level: usize,
    ) {
        let indentation = INDENT.repeat(indentation_level);

        if !module.has_functions() {
            // a module without function is merged in the name of its sub-modules;
            // the unnamed root module is skipped
            let mut sub_module_parent_path = parent_module_path.to_vec();
            if let Some(name) = &module.name {
                sub_module_parent_path.push(name.clone());
            }
            for sub_module in module.sub_modules.values() {
                self.write_module(lines, sub_module, &sub_module_parent_path, indentation_level);
            }
        } else if !parent_module_path.is_empty() {
            lines.push(format!(
                "{}package {} {{\n",
                indentation,
                escape_dunder(&parent_module_path.join("."))
            ));
            self.write_module(lines, module, &[], indentation_level + 1);
            lines.push(format!("{}}}\n", indentation));
        } else {
            lines.push(format!(
                "{}frame {} {{\n",
                indentation,
                escape_dunder(module.name.as_deref().unwrap_or_default())
            ));
            lines.extend(self.visit_functions(module.functions.values(), indentation_level + 1));
            for sub_module in module.sub_modules.values() {
                self.write_module(lines, sub_module, &[], indentation_level + 1);
            }
            lines.push(format!("{}}}\n", indentation));
        }
    }

    /// Lines declaring the functions of a module as components
    pub fn visit_functions<'f, I>(&self, functions: I, indentation_level: usize) -> Vec<String>
    where
        I: IntoIterator<Item = &'f Rc<Function>>,
    {
        let indentation = INDENT.repeat(indentation_level);
        let mut lines = Vec::new();

        for function in functions {
            let is_traced_function = self.traced_function == Some(&**function);

            // placeholder of the unhandled error bubbling out of the traced function
            if is_traced_function {
                if let Some(error_class_name) = self.unhandled_error_class_name {
                    lines.push(format!(
                        "{}label {} as \" \"\n",
                        indentation,
                        fq_error_class_name(function, error_class_name)
                    ));
                }
            }

            lines.push(format!(
                "{}[{}] as \"{}\"{}\n",
                indentation,
                escape_dunder(&function.fqn()),
                escape_dunder(&function.name),
                if is_traced_function { TRACED_STEREOTYPE } else { "" }
            ));
        }

        lines
    }
}

/// The unhandled error arbitrarily takes the module path of the traced function
fn fq_error_class_name(traced_function: &Function, error_class_name: &str) -> String {
    let mut parts = traced_function.module_path.clone();
    parts.push(error_class_name.to_string());
    parts.join(".")
}

/// Aggregates the tracing events and writes a PlantUML component diagram
#[derive(Debug)]
pub struct ComponentAggregator<W: Write> {
    writer: W,
    functions: IndexMap<(Vec<String>, String), Rc<Function>>,
    interactions_by_call: IndexMap<(Rc<Function>, Rc<Function>), Interactions>,
    last_rank: u64,
    traced_function: Option<Rc<Function>>,
    unhandled_error_class_name: Option<String>,
}

impl<W: Write> ComponentAggregator<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            functions: IndexMap::new(),
            interactions_by_call: IndexMap::new(),
            last_rank: 0,
            traced_function: None,
            unhandled_error_class_name: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Next interaction rank, starting at 1 and shared by all the interactions
    pub fn next_interaction_rank(&mut self) -> u64 {
        self.last_rank += 1;
        self.last_rank
    }

    /// The cached function of a call end, created on first use
    pub fn function_from_call(&mut self, call_end: &CallEnd) -> Rc<Function> {
        let key = (call_end.fq_module_path.clone(), call_end.function_name.clone());
        Rc::clone(self.functions.entry(key).or_insert_with(|| {
            Rc::new(Function::new(
                call_end.function_name.clone(),
                call_end.fq_module_path.clone(),
            ))
        }))
    }

    pub fn functions(&self) -> impl Iterator<Item = &Rc<Function>> {
        self.functions.values()
    }

    pub fn traced_function(&self) -> Option<&Function> {
        self.traced_function.as_deref()
    }

    pub fn interactions(&self, caller: &Function, called: &Function) -> Option<&Interactions> {
        self.interactions_by_call
            .iter()
            .find(|((interaction_caller, interaction_called), _)| {
                **interaction_caller == *caller && **interaction_called == *called
            })
            .map(|(_, interactions)| interactions)
    }

    pub fn interaction_count(&self) -> usize {
        self.interactions_by_call.len()
    }

    fn interactions_entry(&mut self, caller: Rc<Function>, called: Rc<Function>) -> &mut Interactions {
        self.interactions_by_call.entry((caller, called)).or_default()
    }

    /// Write the arrows between the traced function and its unhandled error label
    fn write_unhandled_error_exit_interaction(&mut self) -> io::Result<()> {
        let (Some(traced_function), Some(error_class_name)) =
            (&self.traced_function, &self.unhandled_error_class_name)
        else {
            return Ok(());
        };

        writeln!(
            self.writer,
            "[{}] .up.> {} #line:darkred;text:darkred : {}",
            escape_dunder(&traced_function.fqn()),
            fq_error_class_name(traced_function, error_class_name),
            escape_dunder(error_class_name)
        )
    }

    /// Write the arrows of calls, returns and raised errors between functions
    fn write_components_interactions(&mut self) -> io::Result<()> {
        for ((caller_function, called_function), interactions) in &self.interactions_by_call {
            let is_recursive_call = caller_function == called_function;
            let are_in_same_module = caller_function.shares_module_with(called_function);
            let caller = escape_dunder(&caller_function.fqn());
            let called = escape_dunder(&called_function.fqn());

            // same-module calls point downwards, the other ones sideways
            let call_arrow = if is_recursive_call || !are_in_same_module { "->" } else { "-->" };
            let call_ranks: Vec<u64> = interactions.calls.iter().map(|call| call.rank).collect();
            writeln!(
                self.writer,
                "[{}] {} [{}] : {}",
                caller,
                call_arrow,
                called,
                rank_label(&call_ranks)
            )?;

            // returns of recursive calls are not drawn
            if !is_recursive_call {
                let return_ranks: Vec<u64> = interactions.returns().map(|exit_return| exit_return.rank).collect();
                if !return_ranks.is_empty() {
                    let return_arrow = if are_in_same_module { "<.." } else { "<." };
                    writeln!(
                        self.writer,
                        "[{}] {} [{}] : {}",
                        caller,
                        return_arrow,
                        called,
                        rank_label(&return_ranks)
                    )?;
                }
            }

            let raised_ranks: Vec<String> = interactions
                .raiseds()
                .map(|exit_raised| format!("{}:{}", exit_raised.rank, exit_raised.error))
                .collect();
            if !raised_ranks.is_empty() {
                let raised_arrow = if are_in_same_module { "<..[thickness=2]" } else { "<.[thickness=2]" };
                writeln!(
                    self.writer,
                    "[{}] {} [{}] #line:darkred;text:darkred : {}",
                    caller,
                    raised_arrow,
                    called,
                    rank_label(&raised_ranks)
                )?;
            }
        }

        Ok(())
    }
}

impl<W: Write> DiagramSink for ComponentAggregator<W> {
    fn on_header(&mut self, start_module: &str, start_function: &str) -> io::Result<()> {
        writeln!(self.writer, "@startuml {}.{}-component", start_module, start_function)?;
        self.writer.write_all(HEADER.as_bytes())
    }

    fn on_tracing_start(&mut self, called: &CallEnd) -> io::Result<()> {
        self.traced_function = Some(self.function_from_call(called));
        Ok(())
    }

    fn on_start_call(&mut self, caller: &CallEnd, called: &CallEnd) -> io::Result<()> {
        let caller = self.function_from_call(caller);
        let called = self.function_from_call(called);
        let rank = self.next_interaction_rank();
        self.interactions_entry(caller, called).calls.push(Call { rank });
        Ok(())
    }

    fn on_error_propagation(
        &mut self,
        error_called: &CallEnd,
        error_caller: &CallEnd,
        error: &ErrorInfo,
    ) -> io::Result<()> {
        let called = self.function_from_call(error_called);
        let caller = self.function_from_call(error_caller);
        let rank = self.next_interaction_rank();
        self.interactions_entry(caller, called).responses.push(Response::Raised(Raised {
            rank,
            error: error.class_name.clone(),
        }));
        Ok(())
    }

    fn on_return(&mut self, called: &CallEnd, caller: &CallEnd, _value: Option<&str>) -> io::Result<()> {
        let called = self.function_from_call(called);
        let caller = self.function_from_call(caller);
        let rank = self.next_interaction_rank();
        self.interactions_entry(caller, called)
            .responses
            .push(Response::Return(Return { rank }));
        Ok(())
    }

    fn on_tracing_end(&mut self, _called: &CallEnd, _value: Option<&str>) -> io::Result<()> {
        Ok(())
    }

    fn on_unhandled_error_end(&mut self, _called: &CallEnd, error: &ErrorInfo) -> io::Result<()> {
        self.unhandled_error_class_name = Some(error.class_name.clone());
        Ok(())
    }

    fn on_footer(&mut self) -> io::Result<()> {
        let root_module = build_components_structure(self.functions.values());
        let visitor = ModuleStructureVisitor::new(
            self.traced_function.as_deref(),
            self.unhandled_error_class_name.as_deref(),
        );
        for line in visitor.visit_module(&root_module, &[], 0) {
            self.writer.write_all(line.as_bytes())?;
        }

        self.write_unhandled_error_exit_interaction()?;
        self.write_components_interactions()?;

        self.writer.write_all(FOOTER.as_bytes())?;
        self.writer.flush()
    }
}
