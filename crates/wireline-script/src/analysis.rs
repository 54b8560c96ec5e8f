//! Static analysis over the script AST.
//!
//! Currently one pass: free-variable detection. The corpus contains builder
//! units that read identifiers never bound anywhere (`product`, `serverUser`
//! style authoring defects); those must be caught, not reproduced.

use std::collections::BTreeSet;

use crate::ast::{Expr, LValue, Script, Stmt};

/// The ambient capability roots every script may reference without binding
/// them. These are injected by the executor, not looked up globally.
pub const CAPABILITY_ROOTS: &[&str] = &["connectionHelper", "driverLocator", "logging"];

/// Identifiers read by the script that are neither parameters, local `var`
/// bindings, `for..in` loop variables, nor capability roots.
///
/// Binding is flow-insensitive within a scope: a `var` anywhere in a block
/// covers the whole block (the corpus relies on hoisting). Results are
/// sorted and de-duplicated.
pub fn free_variables(script: &Script) -> Vec<String> {
    let mut bound: BTreeSet<String> = script.params.iter().cloned().collect();
    for root in CAPABILITY_ROOTS {
        bound.insert((*root).to_string());
    }

    let mut free = BTreeSet::new();
    walk_block(&script.body, &bound, &mut free);
    free.into_iter().collect()
}

fn collect_bindings(stmts: &[Stmt], bound: &mut BTreeSet<String>) {
    for stmt in stmts {
        if let Stmt::Var { name, .. } = stmt {
            bound.insert(name.clone());
        }
    }
}

fn walk_block(stmts: &[Stmt], outer: &BTreeSet<String>, free: &mut BTreeSet<String>) {
    let mut bound = outer.clone();
    collect_bindings(stmts, &mut bound);

    for stmt in stmts {
        match stmt {
            Stmt::Var { init, .. } => {
                if let Some(init) = init {
                    walk_expr(init, &bound, free);
                }
            }
            Stmt::Assign { target, value } => {
                match target {
                    LValue::Ident(name) => {
                        // Assigning to an unbound name is still a defect; the
                        // corpus never introduces variables by bare assignment.
                        if !bound.contains(name) {
                            free.insert(name.clone());
                        }
                    }
                    LValue::Index { object, index } => {
                        walk_expr(object, &bound, free);
                        walk_expr(index, &bound, free);
                    }
                }
                walk_expr(value, &bound, free);
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                walk_expr(cond, &bound, free);
                walk_block(then, &bound, free);
                walk_block(otherwise, &bound, free);
            }
            Stmt::ForIn { var, subject, body } => {
                walk_expr(subject, &bound, free);
                let mut inner = bound.clone();
                inner.insert(var.clone());
                walk_block(body, &inner, free);
            }
            Stmt::Return(value) => walk_expr(value, &bound, free),
            Stmt::Expr(value) => walk_expr(value, &bound, free),
        }
    }
}

fn walk_expr(expr: &Expr, bound: &BTreeSet<String>, free: &mut BTreeSet<String>) {
    match expr {
        Expr::Str(_) | Expr::Bool(_) | Expr::Undefined | Expr::MapLit => {}
        Expr::Ident(name) => {
            if !bound.contains(name) {
                free.insert(name.clone());
            }
        }
        Expr::ListLit(elements) => {
            for e in elements {
                walk_expr(e, bound, free);
            }
        }
        Expr::Index { object, index } => {
            walk_expr(object, bound, free);
            walk_expr(index, bound, free);
        }
        Expr::Member { object, .. } => walk_expr(object, bound, free),
        Expr::Call { callee, args } => {
            walk_expr(callee, bound, free);
            for arg in args {
                walk_expr(arg, bound, free);
            }
        }
        Expr::Unary { operand, .. } => walk_expr(operand, bound, free),
        Expr::Binary { left, right, .. } => {
            walk_expr(left, bound, free);
            walk_expr(right, bound, free);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    #[test]
    fn params_and_vars_are_bound() {
        let script = parse(
            r#"(function f(attr) {
                var params = {};
                params["SERVER"] = attr[connectionHelper.attributeServer];
                return params;
            })"#,
        )
        .unwrap();
        assert!(free_variables(&script).is_empty());
    }

    #[test]
    fn unbound_read_is_free() {
        // `product` is read but never declared — the corpus authoring defect.
        let script = parse(
            r#"(function f(attr) {
                if (product == "v-cloud") {
                    return ["sql.example.cloud"];
                }
                return [attr[connectionHelper.attributeServer]];
            })"#,
        )
        .unwrap();
        assert_eq!(free_variables(&script), vec!["product".to_string()]);
    }

    #[test]
    fn var_hoisting_covers_whole_block() {
        let script = parse(
            r#"(function f(attr) {
                x = "early";
                var x;
                return x;
            })"#,
        )
        .unwrap();
        assert!(free_variables(&script).is_empty());
    }

    #[test]
    fn loop_variable_is_bound_in_body() {
        let script = parse(
            r#"(function f(attr) {
                var out = [];
                for (var key in attr) {
                    out.push(key);
                }
                return out;
            })"#,
        )
        .unwrap();
        assert!(free_variables(&script).is_empty());
    }

    #[test]
    fn capability_roots_are_not_free() {
        let script = parse(
            r#"(function f(attr) {
                logging.log("hi");
                return [driverLocator.locateDriver(attr)];
            })"#,
        )
        .unwrap();
        assert!(free_variables(&script).is_empty());
    }

    #[test]
    fn assignment_to_unbound_name_is_free() {
        let script = parse(
            r#"(function f(attr) {
                serverUser = attr["username"];
                return [];
            })"#,
        )
        .unwrap();
        assert_eq!(free_variables(&script), vec!["serverUser".to_string()]);
    }
}
