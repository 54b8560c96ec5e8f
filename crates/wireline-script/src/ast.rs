use serde::{Deserialize, Serialize};

/// A parsed builder unit: one parenthesised function.
///
/// The function name is informational only; arity and the declared contract
/// kind are authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// `var name = expr;` — `init` is `None` for a bare declaration.
    Var { name: String, init: Option<Expr> },
    /// `target = expr;`
    Assign { target: LValue, value: Expr },
    /// `if (cond) body else body` — else-if chains nest in `otherwise`.
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
    /// `for (var key in subject) body` — iterates map keys in insertion order.
    ForIn {
        var: String,
        subject: Expr,
        body: Vec<Stmt>,
    },
    Return(Expr),
    /// Bare expression statement, e.g. `logging.log(...)` or `list.push(...)`.
    Expr(Expr),
}

/// Assignment target: a plain variable or an indexed slot (`map[key]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LValue {
    Ident(String),
    Index { object: Box<Expr>, index: Box<Expr> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Str(String),
    Bool(bool),
    /// The `undefined` literal; equal only to an unset value.
    Undefined,
    Ident(String),
    /// Empty map literal `{}`.
    MapLit,
    /// List literal `[a, b, ...]`.
    ListLit(Vec<Expr>),
    /// `object[index]`
    Index { object: Box<Expr>, index: Box<Expr> },
    /// `object.field` — capability constants and method names.
    Member { object: Box<Expr>, field: String },
    /// `callee(args)` — `callee` is an `Ident` or `Member`.
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    And,
    Or,
    /// String concatenation (`+`).
    Concat,
}
