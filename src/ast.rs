//! Language-neutral syntax tree consumed by the property analysis
//!
//! Front-ends lower a concrete parse tree into this shape. Only the statement
//! and expression forms the analysis cares about are modelled; everything else
//! is kept as [`Stmt::Other`] or [`Expr::Other`] so the walk can skip it.

/// One parsed test source file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFile {
    /// File name used in diagnostics
    pub name: String,
    /// Every method of every class in the file, in source order
    pub methods: Vec<MethodDef>,
}

impl SourceFile {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        SourceFile {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Append a method, returning `self` for chaining in fixtures
    #[must_use]
    pub fn with_method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }
}

/// A method or function definition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodDef {
    pub name: String,
    /// Simple names of annotations or decorators (`@Test` -> `Test`)
    pub markers: Vec<String>,
    pub body: Vec<Stmt>,
    /// 1-indexed line of the definition, 0 when unknown
    pub line: usize,
}

impl MethodDef {
    #[must_use]
    pub fn new(name: impl Into<String>, body: Vec<Stmt>) -> Self {
        MethodDef {
            name: name.into(),
            markers: Vec::new(),
            body,
            line: 0,
        }
    }

    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.markers.push(marker.into());
        self
    }
}

/// Statement forms recognized by the analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    /// `T name = init;` or `name: T = init`
    LocalDecl {
        name: String,
        declared_type: Option<String>,
        init: Option<Expr>,
    },
    /// Plain `target = value`
    Assign { target: Expr, value: Expr },
    /// Expression evaluated for its effect
    Expr(Expr),
    /// Statements nested in a compound statement (branches, loops, try, ...)
    Block(Vec<Stmt>),
    Other,
}

impl Stmt {
    #[must_use]
    pub fn local(name: impl Into<String>, declared_type: Option<&str>, init: Option<Expr>) -> Self {
        Stmt::LocalDecl {
            name: name.into(),
            declared_type: declared_type.map(str::to_string),
            init,
        }
    }

    #[must_use]
    pub fn assign(target: Expr, value: Expr) -> Self {
        Stmt::Assign { target, value }
    }
}

/// Literal categories, kept so quotes can be stripped by kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralKind {
    /// String in source spelling, quotes included
    Str,
    /// String value already decoded by the parser, no quotes
    Text,
    Char,
    Number,
    Bool,
    Null,
}

/// A literal with its source spelling (quotes included for `Str`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    pub kind: LiteralKind,
    pub text: String,
}

/// Expression forms recognized by the analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Name(String),
    /// Object construction: `new T(args)` or `T(args)`
    New { type_name: String, args: Vec<Expr> },
    Call {
        receiver: Option<Box<Expr>>,
        method: String,
        args: Vec<Expr>,
    },
    /// `receiver.name`, also used for qualified constants like `TokenTypes.LAMBDA`
    Field { receiver: Box<Expr>, name: String },
    Literal(Literal),
    /// Array or collection literal
    Array(Vec<Expr>),
    /// Any other expression, as source text
    Other(String),
}

impl Expr {
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Expr::Name(name.into())
    }

    #[must_use]
    pub fn new_instance(type_name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::New {
            type_name: type_name.into(),
            args,
        }
    }

    /// Method call on a receiver: `receiver.method(args)`
    #[must_use]
    pub fn method_call(receiver: Expr, method: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            receiver: Some(Box::new(receiver)),
            method: method.into(),
            args,
        }
    }

    #[must_use]
    pub fn field(receiver: Expr, name: impl Into<String>) -> Self {
        Expr::Field {
            receiver: Box::new(receiver),
            name: name.into(),
        }
    }

    /// String literal; `text` is the unquoted content
    #[must_use]
    pub fn string(text: &str) -> Self {
        Expr::Literal(Literal {
            kind: LiteralKind::Str,
            text: format!("\"{text}\""),
        })
    }

    /// String literal holding an already decoded value
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Expr::Literal(Literal {
            kind: LiteralKind::Text,
            text: value.into(),
        })
    }

    #[must_use]
    pub fn number(text: impl Into<String>) -> Self {
        Expr::Literal(Literal {
            kind: LiteralKind::Number,
            text: text.into(),
        })
    }

    /// Identifier this expression names, if it is a bare name
    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Expr::Name(name) => Some(name),
            _ => None,
        }
    }
}

/// Flatten nested blocks into one statement sequence in source order.
///
/// The analysis does not distinguish branches, so a setter inside an `if`
/// counts the same as one at the top of the body.
#[must_use]
pub fn flatten(body: &[Stmt]) -> Vec<&Stmt> {
    let mut out = Vec::with_capacity(body.len());
    flatten_into(body, &mut out);
    out
}

fn flatten_into<'a>(body: &'a [Stmt], out: &mut Vec<&'a Stmt>) {
    for stmt in body {
        match stmt {
            Stmt::Block(inner) => flatten_into(inner, out),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_keeps_source_order_across_nesting() {
        let body = vec![
            Stmt::local("a", None, Some(Expr::number("1"))),
            Stmt::Block(vec![
                Stmt::Expr(Expr::name("x")),
                Stmt::Block(vec![Stmt::Other]),
            ]),
            Stmt::Expr(Expr::name("y")),
        ];

        let flat = flatten(&body);
        assert_eq!(flat.len(), 4);
        assert!(matches!(flat[0], Stmt::LocalDecl { .. }));
        assert_eq!(flat[1], &Stmt::Expr(Expr::name("x")));
        assert_eq!(flat[2], &Stmt::Other);
        assert_eq!(flat[3], &Stmt::Expr(Expr::name("y")));
    }

    #[test]
    fn string_helper_quotes_content() {
        let Expr::Literal(lit) = Expr::string("^$") else {
            panic!("expected literal");
        };
        assert_eq!(lit.kind, LiteralKind::Str);
        assert_eq!(lit.text, "\"^$\"");

        let Expr::Literal(decoded) = Expr::text("\"\"x\"\"") else {
            panic!("expected literal");
        };
        assert_eq!(decoded.kind, LiteralKind::Text);
        assert_eq!(decoded.text, "\"\"x\"\"");
    }
}
