//! Python front-end built on rustpython-parser
//!
//! Test functions come from module level (pytest style) and class bodies
//! (unittest style). Since Python has no `new`, calls to capitalized names
//! (`MaxCheck()`) are treated as construction.

use super::{last_segment, Frontend};
use crate::ast::{Expr, Literal, LiteralKind, MethodDef, SourceFile, Stmt};
use crate::error::{PropcovError, Result};
use rustpython_parser::ast::{self, Ranged};
use rustpython_parser::Parse;

/// Python front-end.
pub struct PythonFrontend;

impl Frontend for PythonFrontend {
    fn parse(&self, source: &str, file_name: &str) -> Result<SourceFile> {
        let suite = ast::Suite::parse(source, file_name)
            .map_err(|err| PropcovError::MalformedInput(format!("{file_name}: {err}")))?;

        let lowering = Lowering { source };
        let mut file = SourceFile::new(file_name);
        lowering.collect_methods(&suite, &mut file.methods);
        Ok(file)
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py"]
    }
}

struct Lowering<'a> {
    source: &'a str,
}

impl Lowering<'_> {
    fn collect_methods(&self, suite: &[ast::Stmt], methods: &mut Vec<MethodDef>) {
        for stmt in suite {
            match stmt {
                ast::Stmt::FunctionDef(func_def) => methods.push(self.lower_function(
                    func_def.name.as_str(),
                    &func_def.decorator_list,
                    &func_def.body,
                    usize::from(func_def.range().start()),
                )),
                ast::Stmt::AsyncFunctionDef(func_def) => methods.push(self.lower_function(
                    func_def.name.as_str(),
                    &func_def.decorator_list,
                    &func_def.body,
                    usize::from(func_def.range().start()),
                )),
                ast::Stmt::ClassDef(class_def) => self.collect_methods(&class_def.body, methods),
                _ => {}
            }
        }
    }

    fn lower_function(
        &self,
        name: &str,
        decorators: &[ast::Expr],
        body: &[ast::Stmt],
        offset: usize,
    ) -> MethodDef {
        MethodDef {
            name: name.to_string(),
            markers: decorators.iter().filter_map(decorator_name).collect(),
            body: self.lower_suite(body),
            line: self.line_of(offset),
        }
    }

    fn line_of(&self, offset: usize) -> usize {
        let end = offset.min(self.source.len());
        self.source.as_bytes()[..end]
            .iter()
            .filter(|byte| **byte == b'\n')
            .count()
            + 1
    }

    fn text<T: Ranged>(&self, node: &T) -> String {
        let range = node.range();
        self.source
            .get(usize::from(range.start())..usize::from(range.end()))
            .unwrap_or_default()
            .to_string()
    }

    fn lower_suite(&self, suite: &[ast::Stmt]) -> Vec<Stmt> {
        let mut stmts = Vec::with_capacity(suite.len());
        for stmt in suite {
            self.lower_stmt_into(stmt, &mut stmts);
        }
        stmts
    }

    fn block(&self, suites: &[&[ast::Stmt]]) -> Stmt {
        Stmt::Block(
            suites
                .iter()
                .flat_map(|suite| self.lower_suite(suite))
                .collect(),
        )
    }

    // `with X() as v:` binds `v` to the context expression before the body runs.
    fn with_block(&self, items: &[ast::WithItem], body: &[ast::Stmt]) -> Stmt {
        let mut stmts: Vec<Stmt> = items
            .iter()
            .filter_map(|item| match item.optional_vars.as_deref() {
                Some(target @ ast::Expr::Name(_)) => Some(Stmt::Assign {
                    target: self.lower_expr(target),
                    value: self.lower_expr(&item.context_expr),
                }),
                _ => None,
            })
            .collect();
        stmts.extend(self.lower_suite(body));
        Stmt::Block(stmts)
    }

    fn lower_stmt_into(&self, stmt: &ast::Stmt, out: &mut Vec<Stmt>) {
        match stmt {
            ast::Stmt::Assign(assign) => {
                let value = self.lower_expr(&assign.value);
                for target in &assign.targets {
                    match target {
                        ast::Expr::Name(_) | ast::Expr::Attribute(_) => out.push(Stmt::Assign {
                            target: self.lower_expr(target),
                            value: value.clone(),
                        }),
                        _ => out.push(Stmt::Other),
                    }
                }
            }
            ast::Stmt::AnnAssign(assign) => match assign.target.as_ref() {
                ast::Expr::Name(name) => out.push(Stmt::LocalDecl {
                    name: name.id.as_str().to_string(),
                    declared_type: annotation_name(&assign.annotation),
                    init: assign.value.as_deref().map(|value| self.lower_expr(value)),
                }),
                target @ ast::Expr::Attribute(_) => match assign.value.as_deref() {
                    Some(value) => out.push(Stmt::Assign {
                        target: self.lower_expr(target),
                        value: self.lower_expr(value),
                    }),
                    None => out.push(Stmt::Other),
                },
                _ => out.push(Stmt::Other),
            },
            ast::Stmt::Expr(expr_stmt) => {
                out.push(Stmt::Expr(self.lower_expr(&expr_stmt.value)));
            }
            ast::Stmt::If(if_stmt) => {
                out.push(self.block(&[if_stmt.body.as_slice(), if_stmt.orelse.as_slice()]));
            }
            ast::Stmt::For(for_stmt) => {
                out.push(self.block(&[for_stmt.body.as_slice(), for_stmt.orelse.as_slice()]));
            }
            ast::Stmt::AsyncFor(for_stmt) => {
                out.push(self.block(&[for_stmt.body.as_slice(), for_stmt.orelse.as_slice()]));
            }
            ast::Stmt::While(while_stmt) => {
                out.push(self.block(&[
                    while_stmt.body.as_slice(),
                    while_stmt.orelse.as_slice(),
                ]));
            }
            ast::Stmt::With(with_stmt) => {
                out.push(self.with_block(&with_stmt.items, &with_stmt.body));
            }
            ast::Stmt::AsyncWith(with_stmt) => {
                out.push(self.with_block(&with_stmt.items, &with_stmt.body));
            }
            ast::Stmt::Try(try_stmt) => {
                let mut suites: Vec<&[ast::Stmt]> = vec![try_stmt.body.as_slice()];
                for handler in &try_stmt.handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    suites.push(handler.body.as_slice());
                }
                suites.push(try_stmt.orelse.as_slice());
                suites.push(try_stmt.finalbody.as_slice());
                out.push(self.block(&suites));
            }
            _ => out.push(Stmt::Other),
        }
    }

    fn lower_expr(&self, expr: &ast::Expr) -> Expr {
        match expr {
            ast::Expr::Name(name) => Expr::Name(name.id.as_str().to_string()),
            ast::Expr::Attribute(attr) => Expr::Field {
                receiver: Box::new(self.lower_expr(&attr.value)),
                name: attr.attr.as_str().to_string(),
            },
            ast::Expr::Call(call) => {
                // Keyword values stand in for positional ones: `set_max(value=3)`.
                let args = if call.args.is_empty() {
                    call.keywords
                        .iter()
                        .filter(|keyword| keyword.arg.is_some())
                        .map(|keyword| self.lower_expr(&keyword.value))
                        .collect()
                } else {
                    call.args.iter().map(|arg| self.lower_expr(arg)).collect()
                };
                match call.func.as_ref() {
                    ast::Expr::Attribute(attr) if is_class_name(attr.attr.as_str()) => Expr::New {
                        type_name: self.text(call.func.as_ref()),
                        args,
                    },
                    ast::Expr::Attribute(attr) => Expr::Call {
                        receiver: Some(Box::new(self.lower_expr(&attr.value))),
                        method: attr.attr.as_str().to_string(),
                        args,
                    },
                    ast::Expr::Name(name) if is_class_name(name.id.as_str()) => Expr::New {
                        type_name: name.id.as_str().to_string(),
                        args,
                    },
                    ast::Expr::Name(name) => Expr::Call {
                        receiver: None,
                        method: name.id.as_str().to_string(),
                        args,
                    },
                    _ => Expr::Other(self.text(expr)),
                }
            }
            ast::Expr::Constant(constant) => self.lower_constant(constant),
            ast::Expr::List(list) => {
                Expr::Array(list.elts.iter().map(|e| self.lower_expr(e)).collect())
            }
            ast::Expr::Tuple(tuple) => {
                Expr::Array(tuple.elts.iter().map(|e| self.lower_expr(e)).collect())
            }
            ast::Expr::Set(set) => {
                Expr::Array(set.elts.iter().map(|e| self.lower_expr(e)).collect())
            }
            other => Expr::Other(self.text(other)),
        }
    }

    fn lower_constant(&self, constant: &ast::ExprConstant) -> Expr {
        let (kind, text) = match &constant.value {
            ast::Constant::Str(value) => (LiteralKind::Text, value.clone()),
            ast::Constant::Bool(value) => (
                LiteralKind::Bool,
                if *value { "True" } else { "False" }.to_string(),
            ),
            ast::Constant::None => (LiteralKind::Null, "None".to_string()),
            ast::Constant::Int(_) | ast::Constant::Float(_) | ast::Constant::Complex { .. } => {
                (LiteralKind::Number, self.text(constant))
            }
            _ => return Expr::Other(self.text(constant)),
        };
        Expr::Literal(Literal { kind, text })
    }
}

// PEP 8 class names start with an upper-case letter; constants are all caps.
fn is_class_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(char::is_uppercase) && chars.any(char::is_lowercase)
}

/// Extract decorator name from an expression
fn decorator_name(expr: &ast::Expr) -> Option<String> {
    match expr {
        ast::Expr::Name(name_expr) => Some(name_expr.id.as_str().to_string()),
        ast::Expr::Attribute(attr) => Some(attr.attr.as_str().to_string()),
        ast::Expr::Call(call) => decorator_name(&call.func),
        _ => None,
    }
}

fn annotation_name(expr: &ast::Expr) -> Option<String> {
    match expr {
        ast::Expr::Name(name) => Some(name.id.as_str().to_string()),
        ast::Expr::Attribute(attr) => Some(attr.attr.as_str().to_string()),
        ast::Expr::Subscript(subscript) => annotation_name(&subscript.value),
        ast::Expr::Constant(constant) => match &constant.value {
            ast::Constant::Str(value) => Some(last_segment(value).to_string()),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> SourceFile {
        PythonFrontend.parse(source, "test_sample.py").unwrap()
    }

    #[test]
    fn collects_module_and_class_functions() {
        let file = parse(
            r#"
import pytest

def helper():
    pass

@pytest.mark.slow
def test_module_level():
    pass

class TestCheck(unittest.TestCase):
    def test_method(self):
        pass
"#,
        );

        let names: Vec<&str> = file.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["helper", "test_module_level", "test_method"]);
        assert_eq!(file.methods[1].markers, vec!["slow"]);
        assert_eq!(file.methods[0].line, 4);
    }

    #[test]
    fn lowers_construction_setters_and_attributes() {
        let file = parse(
            r#"
def test_it():
    check = MaxCheck()
    alias: MaxCheck = check
    alias.set_max(1)
    check.format = "^$"
    check.set_tokens([TokenTypes.LAMBDA, "METHOD_DEF"])
    values = helper()
"#,
        );

        let body = &file.methods[0].body;
        assert_eq!(
            body[0],
            Stmt::assign(Expr::name("check"), Expr::new_instance("MaxCheck", vec![]))
        );
        assert_eq!(
            body[1],
            Stmt::local("alias", Some("MaxCheck"), Some(Expr::name("check")))
        );
        assert_eq!(
            body[2],
            Stmt::Expr(Expr::method_call(
                Expr::name("alias"),
                "set_max",
                vec![Expr::number("1")]
            ))
        );
        assert_eq!(
            body[3],
            Stmt::assign(Expr::field(Expr::name("check"), "format"), Expr::text("^$"))
        );
        assert_eq!(
            body[4],
            Stmt::Expr(Expr::method_call(
                Expr::name("check"),
                "set_tokens",
                vec![Expr::Array(vec![
                    Expr::field(Expr::name("TokenTypes"), "LAMBDA"),
                    Expr::text("METHOD_DEF"),
                ])]
            ))
        );
        assert!(matches!(
            &body[5],
            Stmt::Assign { value: Expr::Call { receiver: None, .. }, .. }
        ));
    }

    #[test]
    fn qualified_class_call_is_construction() {
        let file = parse("def test_q():\n    check = checks.MaxCheck()\n");
        assert_eq!(
            file.methods[0].body[0],
            Stmt::assign(
                Expr::name("check"),
                Expr::new_instance("checks.MaxCheck", vec![])
            )
        );
    }

    #[test]
    fn compound_statements_become_blocks() {
        let file = parse(
            r#"
def test_branches(flag):
    if flag:
        check.set_max(1)
    else:
        check.set_max(2)
    try:
        check.set_format("x")
    except ValueError:
        check.set_format("y")
    with ctx():
        check.set_limit(3)
"#,
        );

        let flat = crate::ast::flatten(&file.methods[0].body);
        assert_eq!(flat.len(), 5);
    }

    #[test]
    fn with_targets_are_bound_before_the_body() {
        let file = parse(
            r#"
def test_ctx():
    with MaxCheck() as check, open("f") as (a, b):
        check.set_max(1)
"#,
        );

        let flat = crate::ast::flatten(&file.methods[0].body);
        assert_eq!(flat.len(), 2);
        assert_eq!(
            flat[0],
            &Stmt::assign(Expr::name("check"), Expr::new_instance("MaxCheck", vec![]))
        );

        let results = crate::analysis::process(&file, "MaxCheck").unwrap();
        assert_eq!(
            results.get("test_ctx").map(|set| set.iter().cloned().collect::<Vec<_>>()),
            Some(vec![crate::extract::Property::new("max", "1")])
        );
    }

    #[test]
    fn keyword_arguments_stand_in_for_positional_ones() {
        let file = parse(
            r#"
def test_kw():
    check = MaxCheck()
    check.set_max(value=3)
    check.set_format("a", flags=2)
"#,
        );

        let body = &file.methods[0].body;
        assert_eq!(
            body[1],
            Stmt::Expr(Expr::method_call(
                Expr::name("check"),
                "set_max",
                vec![Expr::number("3")]
            ))
        );
        assert_eq!(
            body[2],
            Stmt::Expr(Expr::method_call(
                Expr::name("check"),
                "set_format",
                vec![Expr::text("a")]
            ))
        );
    }

    #[test]
    fn string_values_keep_embedded_quotes() {
        let file = parse("def test_q():\n    check = MaxCheck()\n    check.set_format('\"\"x\"\"')\n");

        let results = crate::analysis::process(&file, "MaxCheck").unwrap();
        assert_eq!(
            results.get("test_q").map(|set| set.iter().cloned().collect::<Vec<_>>()),
            Some(vec![crate::extract::Property::new("format", "\"\"x\"\"")])
        );
    }

    #[test]
    fn all_caps_calls_are_not_construction() {
        assert!(is_class_name("MaxCheck"));
        assert!(!is_class_name("LAMBDA"));
        assert!(!is_class_name("helper"));
    }

    #[test]
    fn syntax_errors_are_malformed_input() {
        let err = PythonFrontend
            .parse("def test_x(:\n    pass\n", "bad.py")
            .unwrap_err();
        assert!(matches!(err, PropcovError::MalformedInput(_)));
    }
}
