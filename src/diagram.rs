//! Diagram domain models, built from the execution events while exporting
//! component diagrams

use std::rc::Rc;

use indexmap::IndexMap;

/// A function calling or being called, hosted in a module
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Function {
    pub name: String,
    pub module_path: Vec<String>,
}

impl Function {
    pub fn new(name: impl Into<String>, module_path: Vec<String>) -> Self {
        Self {
            name: name.into(),
            module_path,
        }
    }

    /// Fully qualified name: the module path and the name, dot-joined
    pub fn fqn(&self) -> String {
        let mut parts: Vec<&str> = self.module_path.iter().map(String::as_str).collect();
        parts.push(&self.name);
        parts.join(".")
    }

    pub fn shares_module_with(&self, other: &Function) -> bool {
        self.module_path == other.module_path
    }
}

/// Rank at which the execution left a function to call another one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call {
    pub rank: u64,
}

/// Rank at which a called function exited normally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Return {
    pub rank: u64,
}

/// Rank at which a called function exited with an unhandled error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raised {
    pub rank: u64,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Return(Return),
    Raised(Raised),
}

/// Everything that happened between a caller and a called function, in
/// chronological order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interactions {
    pub calls: Vec<Call>,
    pub responses: Vec<Response>,
}

impl Interactions {
    pub fn returns(&self) -> impl Iterator<Item = &Return> {
        self.responses.iter().filter_map(|response| match response {
            Response::Return(exit_return) => Some(exit_return),
            Response::Raised(_) => None,
        })
    }

    pub fn raiseds(&self) -> impl Iterator<Item = &Raised> {
        self.responses.iter().filter_map(|response| match response {
            Response::Raised(exit_raised) => Some(exit_raised),
            Response::Return(_) => None,
        })
    }
}

/// A node of the module hierarchy; the root module has no name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    pub name: Option<String>,
    pub sub_modules: IndexMap<String, Module>,
    pub functions: IndexMap<String, Rc<Function>>,
}

impl Module {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn has_functions(&self) -> bool {
        !self.functions.is_empty()
    }
}

/// Build the module hierarchy holding the given functions
///
/// Intermediate modules are created on demand, in first-seen order.
pub fn build_components_structure<'a, I>(functions: I) -> Module
where
    I: IntoIterator<Item = &'a Rc<Function>>,
{
    let mut root_module = Module::root();

    for function in functions {
        let mut parent_module = &mut root_module;
        for module_name in &function.module_path {
            parent_module = parent_module
                .sub_modules
                .entry(module_name.clone())
                .or_insert_with(|| Module::named(module_name.clone()));
        }
        parent_module
            .functions
            .insert(function.name.clone(), Rc::clone(function));
    }

    root_module
}
