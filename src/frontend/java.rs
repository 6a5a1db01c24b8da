//! Java front-end built on tree-sitter-java.
//!
//! Lowers JUnit-style test classes into the generic tree:
//! - Methods of classes, enums, interfaces and records (nested types included)
//! - Annotations as markers (`@Test`, `@org.junit.Test`)
//! - Local declarations, assignments, expression statements
//! - Compound statements (if/loops/try/switch/synchronized) as nested blocks

use super::{last_segment, Frontend};
use crate::ast::{Expr, Literal, LiteralKind, MethodDef, SourceFile, Stmt};
use crate::error::{PropcovError, Result};
use tree_sitter::{Node, Parser};

/// Java front-end.
pub struct JavaFrontend;

const TYPE_BODIES: &[&str] = &[
    "class_body",
    "interface_body",
    "enum_body",
    "enum_body_declarations",
];

const TYPE_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
];

const COMPOUND_STATEMENTS: &[&str] = &[
    "if_statement",
    "while_statement",
    "for_statement",
    "enhanced_for_statement",
    "do_statement",
    "try_statement",
    "try_with_resources_statement",
    "synchronized_statement",
    "labeled_statement",
    "switch_expression",
];

// Nodes between a compound statement and the statements it owns.
const STATEMENT_CONTAINERS: &[&str] = &[
    "catch_clause",
    "finally_clause",
    "switch_block",
    "switch_block_statement_group",
    "switch_rule",
];

const INTEGER_LITERALS: &[&str] = &[
    "decimal_integer_literal",
    "hex_integer_literal",
    "octal_integer_literal",
    "binary_integer_literal",
    "decimal_floating_point_literal",
    "hex_floating_point_literal",
];

impl JavaFrontend {
    fn parser() -> Result<Parser> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_java::LANGUAGE.into())
            .map_err(|e| PropcovError::MalformedInput(format!("tree-sitter: {e}")))?;
        Ok(parser)
    }
}

impl Frontend for JavaFrontend {
    fn parse(&self, source: &str, file_name: &str) -> Result<SourceFile> {
        let mut parser = Self::parser()?;
        let tree = parser.parse(source, None).ok_or_else(|| {
            PropcovError::MalformedInput(format!("{file_name}: parser produced no tree"))
        })?;

        let root = tree.root_node();
        if root.has_error() {
            return Err(PropcovError::MalformedInput(format!(
                "{file_name}: syntax error near line {}",
                first_error_line(root)
            )));
        }

        let lowering = Lowering {
            source: source.as_bytes(),
        };
        let mut file = SourceFile::new(file_name);
        lowering.collect_methods(root, &mut file.methods);
        Ok(file)
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["java"]
    }
}

fn first_error_line(node: Node) -> usize {
    if node.is_error() || node.is_missing() {
        return node.start_position().row + 1;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() {
            return first_error_line(child);
        }
    }
    node.start_position().row + 1
}

struct Lowering<'a> {
    source: &'a [u8],
}

impl<'a> Lowering<'a> {
    fn text(&self, node: Node) -> &'a str {
        node.utf8_text(self.source).unwrap_or("")
    }

    fn collect_methods(&self, node: Node, methods: &mut Vec<MethodDef>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            let kind = child.kind();
            if kind == "method_declaration" {
                if let Some(method) = self.lower_method(child) {
                    methods.push(method);
                }
            } else if TYPE_DECLARATIONS.contains(&kind) {
                if let Some(body) = child.child_by_field_name("body") {
                    self.collect_methods(body, methods);
                }
            } else if TYPE_BODIES.contains(&kind) {
                self.collect_methods(child, methods);
            }
        }
    }

    fn lower_method(&self, node: Node) -> Option<MethodDef> {
        let name_node = node.child_by_field_name("name")?;
        let name = self.text(name_node).to_string();
        let body = node
            .child_by_field_name("body")
            .map(|block| self.lower_block(block))
            .unwrap_or_default();

        Some(MethodDef {
            name,
            markers: self.annotations(node),
            body,
            line: name_node.start_position().row + 1,
        })
    }

    fn annotations(&self, method: Node) -> Vec<String> {
        let mut markers = Vec::new();
        let mut cursor = method.walk();
        for child in method.children(&mut cursor) {
            if child.kind() != "modifiers" {
                continue;
            }
            let mut inner = child.walk();
            for modifier in child.named_children(&mut inner) {
                if matches!(modifier.kind(), "marker_annotation" | "annotation") {
                    if let Some(name) = modifier.child_by_field_name("name") {
                        markers.push(last_segment(self.text(name)).to_string());
                    }
                }
            }
        }
        markers
    }

    fn lower_block(&self, block: Node) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        let mut cursor = block.walk();
        for child in block.named_children(&mut cursor) {
            self.lower_stmt_into(child, &mut stmts);
        }
        stmts
    }

    fn lower_stmt_into(&self, node: Node, out: &mut Vec<Stmt>) {
        match node.kind() {
            "local_variable_declaration" => out.extend(self.lower_local(node)),
            "expression_statement" => {
                if let Some(expr) = node.named_child(0) {
                    out.push(self.lower_expr_stmt(expr));
                }
            }
            "block" => out.push(Stmt::Block(self.lower_block(node))),
            kind if COMPOUND_STATEMENTS.contains(&kind) => {
                let mut nested = Vec::new();
                self.collect_nested(node, &mut nested);
                out.push(Stmt::Block(nested));
            }
            "line_comment" | "block_comment" => {}
            _ => out.push(Stmt::Other),
        }
    }

    // Statements owned by a compound statement, skipping conditions and headers
    // except `for` initializers and try-with-resources, which are declarations.
    fn collect_nested(&self, node: Node, out: &mut Vec<Stmt>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            let kind = child.kind();
            if kind == "block"
                || kind == "local_variable_declaration"
                || kind == "expression_statement"
                || COMPOUND_STATEMENTS.contains(&kind)
            {
                self.lower_stmt_into(child, out);
            } else if kind == "resource_specification" {
                out.extend(self.lower_resources(child));
            } else if STATEMENT_CONTAINERS.contains(&kind) {
                self.collect_nested(child, out);
            }
        }
    }

    // `try (T name = value; other)`: declared resources only; references to
    // existing variables bind nothing new.
    fn lower_resources(&self, spec: Node) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        let mut cursor = spec.walk();
        for resource in spec.named_children(&mut cursor) {
            if resource.kind() != "resource" {
                continue;
            }
            let (Some(name), Some(value)) = (
                resource.child_by_field_name("name"),
                resource.child_by_field_name("value"),
            ) else {
                continue;
            };
            stmts.push(Stmt::LocalDecl {
                name: self.text(name).to_string(),
                declared_type: resource
                    .child_by_field_name("type")
                    .map(|ty| self.text(ty).to_string()),
                init: Some(self.lower_expr(value)),
            });
        }
        stmts
    }

    fn lower_local(&self, node: Node) -> Vec<Stmt> {
        let declared_type = node
            .child_by_field_name("type")
            .map(|ty| self.text(ty).to_string());

        let mut stmts = Vec::new();
        let mut cursor = node.walk();
        for declarator in node.children_by_field_name("declarator", &mut cursor) {
            let Some(name) = declarator.child_by_field_name("name") else {
                continue;
            };
            stmts.push(Stmt::LocalDecl {
                name: self.text(name).to_string(),
                declared_type: declared_type.clone(),
                init: declarator
                    .child_by_field_name("value")
                    .map(|value| self.lower_expr(value)),
            });
        }
        stmts
    }

    fn lower_expr_stmt(&self, expr: Node) -> Stmt {
        if expr.kind() == "assignment_expression" {
            let operator = expr
                .child_by_field_name("operator")
                .map(|op| self.text(op))
                .unwrap_or("=");
            if operator == "=" {
                if let (Some(left), Some(right)) = (
                    expr.child_by_field_name("left"),
                    expr.child_by_field_name("right"),
                ) {
                    return Stmt::Assign {
                        target: self.lower_expr(left),
                        value: self.lower_expr(right),
                    };
                }
            }
            return Stmt::Other;
        }
        Stmt::Expr(self.lower_expr(expr))
    }

    fn lower_expr(&self, node: Node) -> Expr {
        let kind = node.kind();
        match kind {
            "identifier" => Expr::Name(self.text(node).to_string()),
            "parenthesized_expression" => node
                .named_child(0)
                .map_or_else(|| self.other(node), |inner| self.lower_expr(inner)),
            "object_creation_expression" => match node.child_by_field_name("type") {
                Some(ty) => Expr::New {
                    type_name: self.text(ty).to_string(),
                    args: self.arguments(node),
                },
                None => self.other(node),
            },
            "method_invocation" => match node.child_by_field_name("name") {
                Some(name) => Expr::Call {
                    receiver: node
                        .child_by_field_name("object")
                        .map(|object| Box::new(self.lower_expr(object))),
                    method: self.text(name).to_string(),
                    args: self.arguments(node),
                },
                None => self.other(node),
            },
            "field_access" => match (
                node.child_by_field_name("object"),
                node.child_by_field_name("field"),
            ) {
                (Some(object), Some(field)) => Expr::Field {
                    receiver: Box::new(self.lower_expr(object)),
                    name: self.text(field).to_string(),
                },
                _ => self.other(node),
            },
            "array_initializer" => Expr::Array(self.named_exprs(node)),
            "array_creation_expression" => match node.child_by_field_name("value") {
                Some(init) => Expr::Array(self.named_exprs(init)),
                None => self.other(node),
            },
            "string_literal" => self.literal(LiteralKind::Str, node),
            "character_literal" => self.literal(LiteralKind::Char, node),
            "true" | "false" => self.literal(LiteralKind::Bool, node),
            "null_literal" => self.literal(LiteralKind::Null, node),
            kind if INTEGER_LITERALS.contains(&kind) => self.literal(LiteralKind::Number, node),
            _ => self.other(node),
        }
    }

    fn arguments(&self, node: Node) -> Vec<Expr> {
        node.child_by_field_name("arguments")
            .map(|args| self.named_exprs(args))
            .unwrap_or_default()
    }

    fn named_exprs(&self, node: Node) -> Vec<Expr> {
        let mut cursor = node.walk();
        node.named_children(&mut cursor)
            .filter(|child| !matches!(child.kind(), "line_comment" | "block_comment"))
            .map(|child| self.lower_expr(child))
            .collect()
    }

    fn literal(&self, kind: LiteralKind, node: Node) -> Expr {
        Expr::Literal(Literal {
            kind,
            text: self.text(node).to_string(),
        })
    }

    fn other(&self, node: Node) -> Expr {
        Expr::Other(self.text(node).to_string())
    }
}
