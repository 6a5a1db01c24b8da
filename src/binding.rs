//! Instance-binding tracking within one test body
//!
//! Walks statements in source order and records, per local identifier,
//! whether it currently refers to an instance of the module under test.
//! Handles:
//! - Construction: `T a = new T();` / `a = T()`
//! - Declared types: `T a = factory();`
//! - Aliasing: `T b = a;` / `b = a;`
//! - Reassignment, which overwrites the previous state
//!
//! Branches are not distinguished; the last write in source order wins.

use crate::ast::{Expr, Stmt};
use std::collections::HashMap;

/// What a local identifier refers to at a point in the body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BindingState {
    #[default]
    Unbound,
    BoundToModule,
    BoundToOther,
}

/// Matches type references against the configured module identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleTypes {
    identifier: String,
    simple_name: String,
}

impl ModuleTypes {
    /// Build from a simple or fully qualified identifier
    /// (`ReturnCountCheck` or `com.example.checks.ReturnCountCheck`)
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        let simple_name = simple_type_name(&identifier).to_string();
        ModuleTypes {
            identifier,
            simple_name,
        }
    }

    /// The identifier as configured
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    #[must_use]
    pub fn simple_name(&self) -> &str {
        &self.simple_name
    }

    /// Whether a type reference denotes the module under test
    #[must_use]
    pub fn matches(&self, type_ref: &str) -> bool {
        !self.simple_name.is_empty() && simple_type_name(type_ref) == self.simple_name
    }
}

/// Strip qualifiers, generic arguments and array brackets from a type reference
#[must_use]
pub fn simple_type_name(type_ref: &str) -> &str {
    let base = type_ref.split('<').next().unwrap_or(type_ref);
    let base = base.trim_end_matches("[]").trim();
    base.rsplit('.').next().unwrap_or(base).trim()
}

/// Binding state of every identifier seen so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    states: HashMap<String, BindingState>,
}

impl Bindings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// State of `name`; identifiers never written are [`BindingState::Unbound`]
    #[must_use]
    pub fn state(&self, name: &str) -> BindingState {
        self.states.get(name).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn is_module(&self, name: &str) -> bool {
        self.state(name) == BindingState::BoundToModule
    }

    /// Whether `expr` is a bare identifier bound to a module instance
    #[must_use]
    pub fn refers_to_module(&self, expr: &Expr) -> bool {
        expr.as_name().is_some_and(|name| self.is_module(name))
    }

    pub fn set(&mut self, name: &str, state: BindingState) {
        self.states.insert(name.to_string(), state);
    }

    /// Identifiers currently bound to a module instance
    #[must_use]
    pub fn module_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .states
            .iter()
            .filter(|(_, state)| **state == BindingState::BoundToModule)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

/// Compute the binding map seen by each statement.
///
/// Entry `i` holds the effects of every statement before `i` plus the binding
/// effect of statement `i` itself, which is what extraction at `i` must see.
/// State starts empty on every call.
#[must_use]
pub fn track(statements: &[&Stmt], module: &ModuleTypes) -> Vec<Bindings> {
    let mut current = Bindings::new();
    let mut snapshots = Vec::with_capacity(statements.len());

    for stmt in statements {
        apply(stmt, module, &mut current);
        snapshots.push(current.clone());
    }

    snapshots
}

fn apply(stmt: &Stmt, module: &ModuleTypes, bindings: &mut Bindings) {
    match stmt {
        Stmt::LocalDecl {
            name,
            declared_type,
            init,
        } => {
            let state = match init {
                None => BindingState::Unbound,
                Some(Expr::New { type_name, .. }) => module_state(module.matches(type_name)),
                Some(init) => module_state(
                    declared_type.as_deref().is_some_and(|ty| module.matches(ty))
                        || bindings.refers_to_module(init),
                ),
            };
            bindings.set(name, state);
        }
        Stmt::Assign {
            target: Expr::Name(name),
            value,
        } => {
            let state = module_state(is_module_value(value, module, bindings));
            bindings.set(name, state);
        }
        _ => {}
    }
}

fn is_module_value(value: &Expr, module: &ModuleTypes, bindings: &Bindings) -> bool {
    match value {
        Expr::New { type_name, .. } => module.matches(type_name),
        other => bindings.refers_to_module(other),
    }
}

fn module_state(is_module: bool) -> BindingState {
    if is_module {
        BindingState::BoundToModule
    } else {
        BindingState::BoundToOther
    }
}
