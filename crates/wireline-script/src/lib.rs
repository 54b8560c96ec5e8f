//! Parser for the connection-builder script language.
//!
//! Builder units are single parenthesised functions in a small JS-like
//! language: `( function name ( attr ) { ... } )`. Parsing strips comments,
//! checks delimiter balance, then produces a typed AST: [`Script`], [`Stmt`],
//! [`Expr`].
//!
//! # Example
//! ```
//! let src = r#"(function dsbuilder(attr) { return []; })"#;
//! let script = wireline_script::parse(src).unwrap();
//! assert_eq!(script.name, "dsbuilder");
//! assert_eq!(script.params, vec!["attr"]);
//! ```

pub mod analysis;
pub mod ast;
mod parser;

pub use analysis::{free_variables, CAPABILITY_ROOTS};
pub use ast::*;
pub use parser::parse;

use wireline_types::{BuilderKind, WirelineError};

/// Check the parsed unit's parameter count against its declared contract
/// kind (1 for builder/properties/required, 2 for matcher).
pub fn check_arity(script: &Script, kind: BuilderKind) -> Result<(), WirelineError> {
    let expected = kind.arity();
    if script.params.len() != expected {
        return Err(WirelineError::Validation(format!(
            "{kind} unit '{}' declares {} parameter(s), expected {expected}",
            script.name,
            script.params.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Expr, LValue, Stmt};

    #[test]
    fn parse_minimal_builder() {
        let script = parse("(function dsbuilder(attr) { return []; })").unwrap();
        assert_eq!(script.name, "dsbuilder");
        assert_eq!(script.params, vec!["attr"]);
        assert_eq!(script.body.len(), 1);
        assert!(matches!(script.body[0], Stmt::Return(Expr::ListLit(_))));
    }

    #[test]
    fn parse_matcher_arity_two() {
        let script = parse(
            r#"(function matcher(attr1, attr2) {
                return connectionHelper.MatchesConnectionAttributes(attr1, attr2);
            })"#,
        )
        .unwrap();
        assert_eq!(script.params, vec!["attr1", "attr2"]);
        assert!(check_arity(&script, BuilderKind::ConnectionMatcher).is_ok());
        assert!(check_arity(&script, BuilderKind::ConnectionBuilder).is_err());
    }

    #[test]
    fn parse_map_assignment_and_for_in() {
        let script = parse(
            r#"(function dsbuilder(attr)
            {
                var params = {};
                params["SERVER"] = attr[connectionHelper.attributeServer];
                params["PORT"] = attr[connectionHelper.attributePort];

                var formattedParams = [];
                for (var key in params)
                {
                    formattedParams.push(connectionHelper.formatKeyValuePair(key, params[key]));
                }
                return formattedParams;
            })"#,
        )
        .unwrap();
        assert_eq!(script.body.len(), 6);
        match &script.body[1] {
            Stmt::Assign {
                target: LValue::Index { index, .. },
                ..
            } => assert_eq!(**index, Expr::Str("SERVER".into())),
            other => panic!("expected indexed assignment, got {other:?}"),
        }
        assert!(matches!(script.body[4], Stmt::ForIn { .. }));
    }

    #[test]
    fn parse_if_else_chain_and_braceless_body() {
        let script = parse(
            r#"(function matcher(attr1, attr2)
            {
                if (attr1["class"] != attr2["class"])
                    return false;

                if (attr1["authentication"] == "oauth") {
                    return true;
                } else if (attr1["authentication"] == undefined) {
                    return false;
                } else {
                    return connectionHelper.MatchesConnectionAttributes(attr1, attr2);
                }
            })"#,
        )
        .unwrap();
        assert_eq!(script.body.len(), 2);
        match &script.body[1] {
            Stmt::If { otherwise, .. } => {
                assert_eq!(otherwise.len(), 1);
                assert!(matches!(otherwise[0], Stmt::If { .. }));
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn parse_concat_and_logical_operators() {
        let script = parse(
            r#"(function dsbuilder(attr) {
                var url = "jdbc:postgresql://" + attr["server"] + ":" + attr["port"];
                if (attr["sslmode"] !== "" && attr["sslmode"] != undefined) {
                    url = url + "?ssl=true";
                }
                return [url];
            })"#,
        )
        .unwrap();
        match &script.body[0] {
            Stmt::Var {
                init: Some(Expr::Binary { op, .. }),
                ..
            } => assert_eq!(*op, BinaryOp::Concat),
            other => panic!("expected var with concat init, got {other:?}"),
        }
    }

    #[test]
    fn parse_comments_are_stripped() {
        let script = parse(
            r#"(function dsbuilder(attr) {
                // fixed defaults first
                var params = {}; /* then
                overrides */
                return [];
            })"#,
        )
        .unwrap();
        assert_eq!(script.body.len(), 2);
    }

    #[test]
    fn unbalanced_bracket_is_syntax_error_with_position() {
        let src = r#"(function dsbuilder(attr)
{
    var params = {};
    params["PORT"] = attr[[connectionHelper.attributePort];
    return [];
})"#;
        let err = parse(src).unwrap_err();
        match err {
            WirelineError::ScriptSyntax { line, .. } => assert_eq!(line, 4),
            other => panic!("expected ScriptSyntax, got {other:?}"),
        }
    }

    #[test]
    fn missing_function_keyword_is_syntax_error() {
        let err = parse("(dsbuilder(attr) { return []; })").unwrap_err();
        assert!(matches!(err, WirelineError::ScriptSyntax { .. }));
    }

    #[test]
    fn trailing_garbage_is_syntax_error() {
        let err = parse("(function f(a) { return []; }) extra").unwrap_err();
        assert!(matches!(err, WirelineError::ScriptSyntax { .. }));
    }

    #[test]
    fn logging_call_statement() {
        let script = parse(
            r#"(function dsbuilder(attr) {
                logging.log("building connection string");
                return [];
            })"#,
        )
        .unwrap();
        match &script.body[0] {
            Stmt::Expr(Expr::Call { callee, args }) => {
                assert_eq!(args.len(), 1);
                assert!(matches!(**callee, Expr::Member { .. }));
            }
            other => panic!("expected call statement, got {other:?}"),
        }
    }
}
