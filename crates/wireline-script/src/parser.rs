use winnow::ascii::multispace0;
use winnow::combinator::opt;
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::token::{literal, take_while};
use winnow::{ModalResult, Parser};

use wireline_types::WirelineError;

use crate::ast::*;

fn make_cut_error(desc: &'static str) -> ErrMode<ContextError<StrContext>> {
    let mut e = ContextError::new();
    e.push(StrContext::Expected(StrContextValue::Description(desc)));
    ErrMode::Cut(e)
}

/// Strip `//` line comments and `/* */` block comments from the input.
///
/// Newlines inside block comments are kept so later error positions still
/// point at the right source line. String literals pass through verbatim,
/// so comment markers inside them are never stripped.
pub(crate) fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'/') => {
                chars.next();
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    if c == '\n' {
                        out.push('\n');
                    }
                    prev = c;
                }
            }
            '"' => {
                out.push('"');
                while let Some(c) = chars.next() {
                    out.push(c);
                    match c {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                out.push(escaped);
                            }
                        }
                        '"' => break,
                        _ => {}
                    }
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Check that `()`, `[]`, and `{}` are balanced, skipping string literals.
///
/// Runs before the grammar so a bracket typo (the classic
/// `attr[[connectionHelper.attributePort]`) is reported with the exact
/// position of the unmatched delimiter instead of a generic parse failure.
pub(crate) fn scan_delimiters(input: &str) -> Result<(), WirelineError> {
    let mut stack: Vec<(char, usize, usize)> = Vec::new();
    let mut line = 1usize;
    let mut col = 1usize;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\n' => {
                line += 1;
                col = 1;
                continue;
            }
            '"' => {
                // skip string literal, escapes included
                col += 1;
                while let Some(&next) = chars.peek() {
                    chars.next();
                    col += 1;
                    match next {
                        '\\' => {
                            if chars.next().is_some() {
                                col += 1;
                            }
                        }
                        '"' => break,
                        '\n' => {
                            line += 1;
                            col = 1;
                        }
                        _ => {}
                    }
                }
                continue;
            }
            '(' | '[' | '{' => stack.push((c, line, col)),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match stack.pop() {
                    Some((open, ..)) if open == expected => {}
                    Some((open, open_line, open_col)) => {
                        // Blame the unclosed opener, not the close that exposed it.
                        return Err(WirelineError::ScriptSyntax {
                            line: open_line,
                            col: open_col,
                            message: format!(
                                "unclosed '{open}'; found mismatched '{c}' at line {line}, col {col}"
                            ),
                        });
                    }
                    None => {
                        return Err(WirelineError::ScriptSyntax {
                            line,
                            col,
                            message: format!("unmatched '{c}'"),
                        });
                    }
                }
            }
            _ => {}
        }
        col += 1;
    }

    if let Some((open, open_line, open_col)) = stack.pop() {
        return Err(WirelineError::ScriptSyntax {
            line: open_line,
            col: open_col,
            message: format!("unclosed '{open}'"),
        });
    }
    Ok(())
}

/// Whitespace consumer (including newlines).
fn ws<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    multispace0.parse_next(input)
}

const KEYWORDS: &[&str] = &[
    "var", "if", "else", "for", "in", "return", "function", "true", "false", "undefined",
];

/// Parse an identifier: [A-Za-z_][A-Za-z0-9_]*
fn identifier<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        take_while(1, |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

/// Parse an identifier that is not a reserved keyword.
fn name_identifier<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    let checkpoint = *input;
    let id = identifier.parse_next(input)?;
    if KEYWORDS.contains(&id) {
        *input = checkpoint;
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    Ok(id)
}

/// Parse a reserved word with a word boundary after it.
fn keyword(word: &'static str, input: &mut &str) -> ModalResult<()> {
    let checkpoint = *input;
    let _ = literal(word).parse_next(input)?;
    if input
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        *input = checkpoint;
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    Ok(())
}

fn peek_keyword(word: &'static str, input: &str) -> bool {
    input.starts_with(word)
        && !input[word.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse a double-quoted string with escape support.
fn quoted_string(input: &mut &str) -> ModalResult<String> {
    let _ = '"'.parse_next(input)?;
    let mut s = String::new();
    loop {
        let c = winnow::token::any.parse_next(input)?;
        match c {
            '"' => break,
            '\\' => {
                let esc = winnow::token::any.parse_next(input)?;
                match esc {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    '\\' => s.push('\\'),
                    '"' => s.push('"'),
                    other => {
                        s.push('\\');
                        s.push(other);
                    }
                }
            }
            other => s.push(other),
        }
    }
    Ok(s)
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

fn primary(input: &mut &str) -> ModalResult<Expr> {
    let _ = ws.parse_next(input)?;

    if input.starts_with('"') {
        return quoted_string.parse_next(input).map(Expr::Str);
    }
    if peek_keyword("true", input) {
        keyword("true", input)?;
        return Ok(Expr::Bool(true));
    }
    if peek_keyword("false", input) {
        keyword("false", input)?;
        return Ok(Expr::Bool(false));
    }
    if peek_keyword("undefined", input) {
        keyword("undefined", input)?;
        return Ok(Expr::Undefined);
    }
    if input.starts_with('{') {
        let _ = '{'.parse_next(input)?;
        let _ = ws.parse_next(input)?;
        let _ = '}'
            .context(StrContext::Expected(StrContextValue::Description(
                "'}' (only empty map literals are supported)",
            )))
            .parse_next(input)?;
        return Ok(Expr::MapLit);
    }
    if input.starts_with('[') {
        let _ = '['.parse_next(input)?;
        let mut elements = Vec::new();
        let _ = ws.parse_next(input)?;
        if !input.starts_with(']') {
            loop {
                let element = expr.parse_next(input)?;
                elements.push(element);
                let _ = ws.parse_next(input)?;
                if opt(',').parse_next(input)?.is_none() {
                    break;
                }
            }
        }
        let _ = ws.parse_next(input)?;
        let _ = ']'.parse_next(input)?;
        return Ok(Expr::ListLit(elements));
    }
    if input.starts_with('(') {
        let _ = '('.parse_next(input)?;
        let inner = expr.parse_next(input)?;
        let _ = ws.parse_next(input)?;
        let _ = ')'.parse_next(input)?;
        return Ok(inner);
    }

    name_identifier
        .context(StrContext::Expected(StrContextValue::Description(
            "expression",
        )))
        .parse_next(input)
        .map(|id| Expr::Ident(id.to_string()))
}

/// Postfix chain: index `[expr]`, member `.ident`, call `(args)`.
fn postfix(input: &mut &str) -> ModalResult<Expr> {
    let mut current = primary.parse_next(input)?;
    loop {
        // No whitespace skip before '[': a newline between an expression and
        // '[' starts a new statement, same as the corpus scripts assume.
        if input.starts_with('[') {
            let _ = '['.parse_next(input)?;
            let index = expr.parse_next(input)?;
            let _ = ws.parse_next(input)?;
            let _ = ']'
                .context(StrContext::Expected(StrContextValue::Description(
                    "closing ']'",
                )))
                .parse_next(input)?;
            current = Expr::Index {
                object: Box::new(current),
                index: Box::new(index),
            };
        } else if input.starts_with('.') {
            let _ = '.'.parse_next(input)?;
            let field = name_identifier
                .context(StrContext::Expected(StrContextValue::Description(
                    "member name after '.'",
                )))
                .parse_next(input)?;
            current = Expr::Member {
                object: Box::new(current),
                field: field.to_string(),
            };
        } else if input.starts_with('(') {
            let _ = '('.parse_next(input)?;
            let mut args = Vec::new();
            let _ = ws.parse_next(input)?;
            if !input.starts_with(')') {
                loop {
                    let arg = expr.parse_next(input)?;
                    args.push(arg);
                    let _ = ws.parse_next(input)?;
                    if opt(',').parse_next(input)?.is_none() {
                        break;
                    }
                }
            }
            let _ = ws.parse_next(input)?;
            let _ = ')'.parse_next(input)?;
            current = Expr::Call {
                callee: Box::new(current),
                args,
            };
        } else {
            break;
        }
    }
    Ok(current)
}

fn unary(input: &mut &str) -> ModalResult<Expr> {
    let _ = ws.parse_next(input)?;
    // '!' but not '!=' / '!=='
    if input.starts_with('!') && !input.starts_with("!=") {
        let _ = '!'.parse_next(input)?;
        let operand = unary.parse_next(input)?;
        return Ok(Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(operand),
        });
    }
    postfix.parse_next(input)
}

fn concat_expr(input: &mut &str) -> ModalResult<Expr> {
    let mut left = unary.parse_next(input)?;
    loop {
        let _ = ws.parse_next(input)?;
        if opt('+').parse_next(input)?.is_none() {
            break;
        }
        let right = unary.parse_next(input)?;
        left = Expr::Binary {
            op: BinaryOp::Concat,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    Ok(left)
}

/// Equality operator, loose and strict spellings both accepted.
fn equality_op(input: &mut &str) -> ModalResult<BinaryOp> {
    if input.starts_with("===") {
        let _ = literal("===").parse_next(input)?;
        Ok(BinaryOp::Eq)
    } else if input.starts_with("==") {
        let _ = literal("==").parse_next(input)?;
        Ok(BinaryOp::Eq)
    } else if input.starts_with("!==") {
        let _ = literal("!==").parse_next(input)?;
        Ok(BinaryOp::NotEq)
    } else if input.starts_with("!=") {
        let _ = literal("!=").parse_next(input)?;
        Ok(BinaryOp::NotEq)
    } else {
        Err(ErrMode::Backtrack(ContextError::new()))
    }
}

fn equality_expr(input: &mut &str) -> ModalResult<Expr> {
    let mut left = concat_expr.parse_next(input)?;
    loop {
        let _ = ws.parse_next(input)?;
        let op = match opt(equality_op).parse_next(input)? {
            Some(op) => op,
            None => break,
        };
        let right = concat_expr.parse_next(input)?;
        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn and_expr(input: &mut &str) -> ModalResult<Expr> {
    let mut left = equality_expr.parse_next(input)?;
    loop {
        let _ = ws.parse_next(input)?;
        if opt(literal("&&")).parse_next(input)?.is_none() {
            break;
        }
        let right = equality_expr.parse_next(input)?;
        left = Expr::Binary {
            op: BinaryOp::And,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn expr(input: &mut &str) -> ModalResult<Expr> {
    let mut left = and_expr.parse_next(input)?;
    loop {
        let _ = ws.parse_next(input)?;
        if opt(literal("||")).parse_next(input)?.is_none() {
            break;
        }
        let right = and_expr.parse_next(input)?;
        left = Expr::Binary {
            op: BinaryOp::Or,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    Ok(left)
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

fn var_stmt(input: &mut &str) -> ModalResult<Stmt> {
    keyword("var", input)?;
    let _ = ws.parse_next(input)?;
    let name = name_identifier
        .context(StrContext::Expected(StrContextValue::Description(
            "variable name after 'var'",
        )))
        .parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let init = if opt('=').parse_next(input)?.is_some() {
        Some(expr.parse_next(input)?)
    } else {
        None
    };
    let _ = ws.parse_next(input)?;
    let _ = opt(';').parse_next(input)?;
    Ok(Stmt::Var {
        name: name.to_string(),
        init,
    })
}

fn if_stmt(input: &mut &str) -> ModalResult<Stmt> {
    keyword("if", input)?;
    let _ = ws.parse_next(input)?;
    let _ = '('
        .context(StrContext::Expected(StrContextValue::Description(
            "'(' after 'if'",
        )))
        .parse_next(input)?;
    let cond = expr.parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let _ = ')'.parse_next(input)?;
    let then = body.parse_next(input)?;

    let _ = ws.parse_next(input)?;
    let otherwise = if peek_keyword("else", input) {
        keyword("else", input)?;
        let _ = ws.parse_next(input)?;
        if peek_keyword("if", input) {
            // else-if chain nests as a single-statement else branch
            vec![if_stmt.parse_next(input)?]
        } else {
            body.parse_next(input)?
        }
    } else {
        Vec::new()
    };

    Ok(Stmt::If {
        cond,
        then,
        otherwise,
    })
}

fn for_stmt(input: &mut &str) -> ModalResult<Stmt> {
    keyword("for", input)?;
    let _ = ws.parse_next(input)?;
    let _ = '('
        .context(StrContext::Expected(StrContextValue::Description(
            "'(' after 'for'",
        )))
        .parse_next(input)?;
    let _ = ws.parse_next(input)?;
    if peek_keyword("var", input) {
        keyword("var", input)?;
        let _ = ws.parse_next(input)?;
    }
    let var = name_identifier.parse_next(input)?;
    let _ = ws.parse_next(input)?;
    keyword("in", input).map_err(|_| make_cut_error("'in' in for loop"))?;
    let subject = expr.parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let _ = ')'.parse_next(input)?;
    let body_stmts = body.parse_next(input)?;
    Ok(Stmt::ForIn {
        var: var.to_string(),
        subject,
        body: body_stmts,
    })
}

fn return_stmt(input: &mut &str) -> ModalResult<Stmt> {
    keyword("return", input)?;
    let value = expr.parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let _ = opt(';').parse_next(input)?;
    Ok(Stmt::Return(value))
}

/// Expression statement or assignment, disambiguated after the fact:
/// a trailing bare `=` turns an `Ident`/`Index` expression into a target.
fn expr_or_assign_stmt(input: &mut &str) -> ModalResult<Stmt> {
    let first = expr.parse_next(input)?;
    let _ = ws.parse_next(input)?;

    if input.starts_with('=') && !input.starts_with("==") {
        let target = match first {
            Expr::Ident(name) => LValue::Ident(name),
            Expr::Index { object, index } => LValue::Index { object, index },
            _ => return Err(make_cut_error("assignable target before '='")),
        };
        let _ = '='.parse_next(input)?;
        let value = expr.parse_next(input)?;
        let _ = ws.parse_next(input)?;
        let _ = opt(';').parse_next(input)?;
        return Ok(Stmt::Assign { target, value });
    }

    let _ = opt(';').parse_next(input)?;
    Ok(Stmt::Expr(first))
}

fn statement(input: &mut &str) -> ModalResult<Stmt> {
    let _ = ws.parse_next(input)?;
    if peek_keyword("var", input) {
        var_stmt.parse_next(input)
    } else if peek_keyword("if", input) {
        if_stmt.parse_next(input)
    } else if peek_keyword("for", input) {
        for_stmt.parse_next(input)
    } else if peek_keyword("return", input) {
        return_stmt.parse_next(input)
    } else {
        expr_or_assign_stmt.parse_next(input)
    }
}

fn statements(input: &mut &str) -> ModalResult<Vec<Stmt>> {
    let mut stmts = Vec::new();
    loop {
        let _ = ws.parse_next(input)?;
        if input.is_empty() || input.starts_with('}') {
            break;
        }
        let stmt = statement.parse_next(input)?;
        stmts.push(stmt);
    }
    Ok(stmts)
}

/// A body is either a brace-delimited block or a single statement.
fn body(input: &mut &str) -> ModalResult<Vec<Stmt>> {
    let _ = ws.parse_next(input)?;
    if input.starts_with('{') {
        let _ = '{'.parse_next(input)?;
        let stmts = statements.parse_next(input)?;
        let _ = ws.parse_next(input)?;
        let _ = '}'.parse_next(input)?;
        Ok(stmts)
    } else {
        Ok(vec![statement.parse_next(input)?])
    }
}

/// Top-level unit: `( function name ( params ) { statements } )`.
fn script(input: &mut &str) -> ModalResult<Script> {
    let _ = ws.parse_next(input)?;
    let _ = '('
        .context(StrContext::Expected(StrContextValue::Description(
            "'(' opening the function expression",
        )))
        .parse_next(input)?;
    let _ = ws.parse_next(input)?;
    keyword("function", input).map_err(|_| make_cut_error("'function' keyword"))?;
    let _ = ws.parse_next(input)?;
    let name = name_identifier
        .context(StrContext::Expected(StrContextValue::Description(
            "function name",
        )))
        .parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let _ = '('.parse_next(input)?;

    let mut params = Vec::new();
    let _ = ws.parse_next(input)?;
    if !input.starts_with(')') {
        loop {
            let _ = ws.parse_next(input)?;
            let p = name_identifier.parse_next(input)?;
            params.push(p.to_string());
            let _ = ws.parse_next(input)?;
            if opt(',').parse_next(input)?.is_none() {
                break;
            }
        }
    }
    let _ = ws.parse_next(input)?;
    let _ = ')'.parse_next(input)?;

    let stmts = body.parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let _ = ')'
        .context(StrContext::Expected(StrContextValue::Description(
            "')' closing the function expression",
        )))
        .parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let _ = opt(';').parse_next(input)?;
    let _ = ws.parse_next(input)?;

    if !input.is_empty() {
        return Err(make_cut_error("end of input after the function expression"));
    }

    Ok(Script {
        name: name.to_string(),
        params,
        body: stmts,
    })
}

/// Compute (line, col) from byte offset in the stripped text.
fn offset_to_line_col(stripped: &str, remaining_len: usize) -> (usize, usize) {
    let consumed = stripped.len() - remaining_len;
    let prefix = &stripped[..consumed.min(stripped.len())];
    let line = prefix.matches('\n').count() + 1;
    let col = match prefix.rfind('\n') {
        Some(pos) => consumed - pos,
        None => consumed + 1,
    };
    (line, col)
}

/// Public entry point.
///
/// Comments are stripped first (newlines preserved, so line numbers hold),
/// then the delimiter scan runs, then the grammar.
pub fn parse(input: &str) -> Result<Script, WirelineError> {
    let stripped = strip_comments(input);
    scan_delimiters(&stripped)?;

    let mut remaining = stripped.as_str();
    script.parse_next(&mut remaining).map_err(|e| {
        let (line, col) = offset_to_line_col(&stripped, remaining.len());
        WirelineError::ScriptSyntax {
            line,
            col,
            message: format!("{e}"),
        }
    })
}
