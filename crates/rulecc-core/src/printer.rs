//! AST → source text serializer.
//!
//! ARCHITECTURE: emits the minimal parenthesization needed to round-trip
//! precedence, not a parenthesis on every nested binary node. Strings are
//! always single-quoted (see `ast::escape_single_quoted`); there is no
//! trailing semicolon and no statement-level formatting since the grammar
//! has no statements.

use crate::ast::{Expr, ExprKind, Literal};

pub fn print_expr(expr: &Expr) -> String {
    print_with_parent_precedence(expr, 0)
}

fn expr_precedence(expr: &Expr) -> u8 {
    match &expr.kind {
        ExprKind::Sequence(_) => 1,
        ExprKind::Conditional { .. } => 2,
        ExprKind::Logical { op, .. } => op.precedence(),
        ExprKind::Binary { op, .. } => op.precedence(),
        ExprKind::Unary { .. } => 15,
        ExprKind::Call { .. } | ExprKind::Member { .. } => 18,
        ExprKind::Literal(_) | ExprKind::Identifier(_) => 20,
    }
}

fn print_with_parent_precedence(expr: &Expr, parent_precedence: u8) -> String {
    let own_precedence = expr_precedence(expr);
    let text = print_kind(expr);
    if own_precedence < parent_precedence {
        format!("({})", text)
    } else {
        text
    }
}

fn print_kind(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Literal(lit) => print_literal(lit),
        ExprKind::Identifier(name) => name.clone(),
        ExprKind::Member {
            object,
            property,
            computed,
        } => {
            let obj = print_with_parent_precedence(object, expr_precedence(expr));
            if *computed {
                format!("{}[{}]", obj, print_with_parent_precedence(property, 0))
            } else {
                match &property.kind {
                    ExprKind::Identifier(name) => format!("{}.{}", obj, name),
                    _ => format!("{}.{}", obj, print_with_parent_precedence(property, 0)),
                }
            }
        }
        ExprKind::Call { callee, args } => {
            let callee_text = print_with_parent_precedence(callee, expr_precedence(expr));
            let args_text = args
                .iter()
                .map(|a| print_with_parent_precedence(a, 3))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{}({})", callee_text, args_text)
        }
        ExprKind::Unary { op, argument } => {
            let arg = print_with_parent_precedence(argument, expr_precedence(expr));
            format!("{}{}", op.as_str(), arg)
        }
        ExprKind::Binary { op, left, right } => {
            let prec = op.precedence();
            let lhs = print_with_parent_precedence(left, prec);
            let rhs = print_with_parent_precedence(right, prec + 1);
            format!("{} {} {}", lhs, op.as_str(), rhs)
        }
        ExprKind::Logical { op, left, right } => {
            let prec = op.precedence();
            let lhs = print_with_parent_precedence(left, prec);
            let rhs = print_with_parent_precedence(right, prec + 1);
            format!("{} {} {}", lhs, op.as_str(), rhs)
        }
        ExprKind::Conditional {
            test,
            consequent,
            alternate,
        } => {
            let prec = expr_precedence(expr);
            let test_text = print_with_parent_precedence(test, prec + 1);
            let consequent_text = print_with_parent_precedence(consequent, prec);
            let alternate_text = print_with_parent_precedence(alternate, prec);
            format!("{} ? {} : {}", test_text, consequent_text, alternate_text)
        }
        ExprKind::Sequence(items) => items
            .iter()
            .map(|i| print_with_parent_precedence(i, 2))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn print_literal(lit: &Literal) -> String {
    match lit {
        Literal::Bool(_) | Literal::Number(_) | Literal::Str(_) => lit.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;

    fn roundtrip(source: &str) -> String {
        print_expr(&parse_expression(source).unwrap())
    }

    #[test]
    fn test_print_range_check() {
        assert_eq!(roundtrip("next>=0&&next<=100"), "next >= 0 && next <= 100");
    }

    #[test]
    fn test_print_preserves_necessary_parens() {
        assert_eq!(roundtrip("(1 + 2) * 3"), "(1 + 2) * 3");
    }

    #[test]
    fn test_print_drops_unnecessary_parens() {
        assert_eq!(roundtrip("(1 * 2) + 3"), "1 * 2 + 3");
    }

    #[test]
    fn test_print_string_literal_single_quoted() {
        assert_eq!(roundtrip("oneOf('a', 'b')"), "oneOf('a', 'b')");
    }

    #[test]
    fn test_print_member_and_call_chain() {
        assert_eq!(
            roundtrip("newData.child('foo').exists()"),
            "newData.child('foo').exists()"
        );
    }

    #[test]
    fn test_print_conditional() {
        assert_eq!(roundtrip("a?b:c"), "a ? b : c");
    }

    #[test]
    fn test_print_nested_conditional_in_consequent() {
        assert_eq!(roundtrip("a ? (b ? c : d) : e"), "a ? b ? c : d : e");
    }
}
