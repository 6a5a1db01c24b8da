//! Property extraction from setter calls and field assignments
//!
//! Given a flattened test body and the binding map at each statement, finds
//! the two shapes that configure a module instance:
//! - `check.setMax(1)` -> `max = 1` (name derived by a [`PropertyNaming`] rule)
//! - `check.max = 1` -> `max = 1`
//!
//! Extraction is pure: it depends only on its inputs.

use crate::ast::{Expr, Stmt};
use crate::binding::Bindings;
use crate::canonical::{canonicalize, join_values};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A configuration property exercised by a test case
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
}

impl Property {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Property {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Maps a method name called on a module instance to the property it sets
pub trait PropertyNaming: Send + Sync {
    /// Property name for `method`, or `None` if the call is not a setter
    fn property_name(&self, method: &str) -> Option<String>;
}

/// Default rule: case-insensitive prefix (`set`), optional `_` separator,
/// first letter of the remainder lower-cased.
///
/// `setMaxForVoid` -> `maxForVoid`, `set_max` -> `max`, `set` -> not a setter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetterPrefix {
    prefix: String,
}

impl SetterPrefix {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        SetterPrefix {
            prefix: prefix.into(),
        }
    }
}

impl Default for SetterPrefix {
    fn default() -> Self {
        Self::new("set")
    }
}

impl PropertyNaming for SetterPrefix {
    fn property_name(&self, method: &str) -> Option<String> {
        let split = self.prefix.len();
        if method.len() <= split || !method.is_char_boundary(split) {
            return None;
        }
        let (head, rest) = method.split_at(split);
        if !head.eq_ignore_ascii_case(&self.prefix) {
            return None;
        }
        let rest = rest.strip_prefix('_').unwrap_or(rest);

        let mut chars = rest.chars();
        let first = chars.next()?;
        Some(first.to_lowercase().chain(chars).collect())
    }
}

/// Extract the properties set on module-bound receivers.
///
/// `bindings[i]` is the binding map for `statements[i]` (see
/// [`crate::binding::track`]). Duplicate name/value pairs collapse.
#[must_use]
pub fn extract(
    statements: &[&Stmt],
    bindings: &[Bindings],
    naming: &dyn PropertyNaming,
) -> BTreeSet<Property> {
    let mut properties = BTreeSet::new();

    for (stmt, bindings) in statements.iter().zip(bindings) {
        if let Some(property) = property_from_stmt(stmt, bindings, naming) {
            tracing::debug!("extracted property {}", property);
            properties.insert(property);
        }
    }

    properties
}

fn property_from_stmt(
    stmt: &Stmt,
    bindings: &Bindings,
    naming: &dyn PropertyNaming,
) -> Option<Property> {
    match stmt {
        Stmt::Expr(Expr::Call {
            receiver: Some(receiver),
            method,
            args,
        }) if bindings.refers_to_module(receiver) => {
            let name = naming.property_name(method)?;
            let value = match args.as_slice() {
                // no value: an action, not a property
                [] => return None,
                [single] => canonicalize(single),
                // varargs read as an implicit array
                many => join_values(many),
            };
            Some(Property { name, value })
        }
        Stmt::Assign {
            target: Expr::Field { receiver, name },
            value,
        } if bindings.refers_to_module(receiver) => Some(Property {
            name: name.clone(),
            value: canonicalize(value),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindingState;

    fn module_bindings(names: &[&str]) -> Bindings {
        let mut bindings = Bindings::new();
        for name in names {
            bindings.set(name, BindingState::BoundToModule);
        }
        bindings
    }

    fn setter(receiver: &str, method: &str, args: Vec<Expr>) -> Stmt {
        Stmt::Expr(Expr::method_call(Expr::name(receiver), method, args))
    }

    fn run(stmts: &[Stmt], bindings: &Bindings) -> BTreeSet<Property> {
        let refs: Vec<&Stmt> = stmts.iter().collect();
        let per_stmt = vec![bindings.clone(); refs.len()];
        extract(&refs, &per_stmt, &SetterPrefix::default())
    }

    #[test]
    fn setter_prefix_derives_property_names() {
        let rule = SetterPrefix::default();
        assert_eq!(rule.property_name("setMax").as_deref(), Some("max"));
        assert_eq!(rule.property_name("setMaxForVoid").as_deref(), Some("maxForVoid"));
        assert_eq!(rule.property_name("SETformat").as_deref(), Some("format"));
        assert_eq!(rule.property_name("set_max").as_deref(), Some("max"));
        assert_eq!(rule.property_name("set"), None);
        assert_eq!(rule.property_name("set_"), None);
        assert_eq!(rule.property_name("getMax"), None);
        assert_eq!(rule.property_name("visitToken"), None);
    }

    #[test]
    fn setter_call_on_module_yields_property() {
        let stmts = [setter("check", "setMax", vec![Expr::number("1")])];
        let props = run(&stmts, &module_bindings(&["check"]));
        assert_eq!(props, BTreeSet::from([Property::new("max", "1")]));
    }

    #[test]
    fn setter_on_non_module_receiver_is_ignored() {
        let stmts = [
            setter("config", "setMax", vec![Expr::number("1")]),
            setter("other", "setFormat", vec![Expr::string("x")]),
        ];
        let mut bindings = module_bindings(&["check"]);
        bindings.set("other", BindingState::BoundToOther);
        assert!(run(&stmts, &bindings).is_empty());
    }

    #[test]
    fn zero_argument_setter_is_skipped() {
        let stmts = [setter("check", "setUp", vec![])];
        assert!(run(&stmts, &module_bindings(&["check"])).is_empty());
    }

    #[test]
    fn field_assignment_yields_property() {
        let stmts = [Stmt::assign(
            Expr::field(Expr::name("check"), "format"),
            Expr::string("^$"),
        )];
        let props = run(&stmts, &module_bindings(&["check"]));
        assert_eq!(props, BTreeSet::from([Property::new("format", "^$")]));
    }

    #[test]
    fn multiple_properties_accumulate_and_duplicates_collapse() {
        let stmts = [
            setter("check", "setMax", vec![Expr::number("2")]),
            setter("check", "setMaxForVoid", vec![Expr::number("0")]),
            setter("check", "setMax", vec![Expr::number("2")]),
        ];
        let props = run(&stmts, &module_bindings(&["check"]));
        assert_eq!(
            props,
            BTreeSet::from([Property::new("max", "2"), Property::new("maxForVoid", "0")])
        );
    }

    #[test]
    fn same_name_different_values_are_distinct() {
        let stmts = [
            setter("check", "setMax", vec![Expr::number("1")]),
            setter("check", "setMax", vec![Expr::number("2")]),
        ];
        assert_eq!(run(&stmts, &module_bindings(&["check"])).len(), 2);
    }

    #[test]
    fn array_and_varargs_values_join() {
        let stmts = [
            setter(
                "check",
                "setTokens",
                vec![Expr::Array(vec![Expr::name("LAMBDA"), Expr::name("METHOD_DEF")])],
            ),
            setter(
                "check",
                "setIgnore",
                vec![Expr::string("a"), Expr::string("b")],
            ),
        ];
        let props = run(&stmts, &module_bindings(&["check"]));
        assert!(props.contains(&Property::new("tokens", "LAMBDA,METHOD_DEF")));
        assert!(props.contains(&Property::new("ignore", "a,b")));
    }

    #[test]
    fn uses_bindings_of_each_statement() {
        let stmts = [
            setter("check", "setMax", vec![Expr::number("1")]),
            setter("check", "setMax", vec![Expr::number("5")]),
        ];
        let refs: Vec<&Stmt> = stmts.iter().collect();
        let per_stmt = vec![Bindings::new(), module_bindings(&["check"])];
        let props = extract(&refs, &per_stmt, &SetterPrefix::default());
        assert_eq!(props, BTreeSet::from([Property::new("max", "5")]));
    }

    #[test]
    fn display_renders_name_and_value() {
        assert_eq!(Property::new("max", "1").to_string(), "max=1");
    }
}
