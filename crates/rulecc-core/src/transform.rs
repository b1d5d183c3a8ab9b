//! Fixed-point AST transformer (one pre-order + post-order traversal per
//! invocation; callers re-invoke until quiescent).
//!
//! ARCHITECTURE: a single recursive walk applies the enter rules on the way
//! down and the leave rules on the way back up, tracking the syntactic
//! `Role` a node plays relative to its immediate parent (object vs. property
//! vs. callee) since several rules (member lift, snapshot coercion, the
//! function-call-sugar rule) are defined in terms of that role rather than
//! the node's own shape alone. Each helper returns a possibly-rewritten node;
//! `transform_node` detects whether anything actually changed by comparing
//! the node before and after, rather than every rule hand-flagging `changed`
//! itself, so a rule that fires but produces an identical tree (the common
//! steady state once fixed point is reached) never spuriously extends the
//! loop.

use std::collections::HashMap;

use crate::ast::{BinaryOp, Expr, ExprKind, Literal, LogicalOp};
use crate::error::{CompileError, Result};
use crate::functions::FunctionTable;

/// Caps the fixed-point loop as a backstop; the function-table cycle
/// pre-pass (see `functions.rs`) is what actually guarantees termination.
const MAX_FIXED_POINT_ITERATIONS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotBase {
    Data,
    NewData,
}

impl SnapshotBase {
    fn identifier(self) -> &'static str {
        match self {
            SnapshotBase::Data => "data",
            SnapshotBase::NewData => "newData",
        }
    }
}

pub struct TransformContext<'a> {
    pub locals: &'a [String],
    pub refs: &'a HashMap<String, usize>,
    pub level: usize,
    pub base: SnapshotBase,
    pub functions: &'a FunctionTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    None,
    MemberObject { computed: bool },
    MemberPropertyDotted,
    MemberPropertyComputed,
    CallCallee,
    Generic,
}

/// Drives a single expression to its fixed point.
pub fn transform_fixed_point(mut expr: Expr, ctx: &TransformContext) -> Result<Expr> {
    for _ in 0..MAX_FIXED_POINT_ITERATIONS {
        let before = expr.clone();
        expr = transform_node(expr, ctx, Role::None)?;
        if expr == before {
            return Ok(expr);
        }
    }
    Err(CompileError::DepthExceeded {
        message: "expression transformer did not reach a fixed point".to_string(),
    })
}

fn transform_node(expr: Expr, ctx: &TransformContext, role: Role) -> Result<Expr> {
    let expr = apply_enter(expr, ctx, role)?;
    let expr = descend(expr, ctx)?;
    apply_leave(expr, ctx, role)
}

fn descend(expr: Expr, ctx: &TransformContext) -> Result<Expr> {
    let snapshot_typed = expr.snapshot_typed;
    let kind = match expr.kind {
        ExprKind::Literal(_) | ExprKind::Identifier(_) => expr.kind,
        ExprKind::Member {
            object,
            property,
            computed,
        } => {
            let object = transform_node(*object, ctx, Role::MemberObject { computed })?;
            let property_role = if computed {
                Role::MemberPropertyComputed
            } else {
                Role::MemberPropertyDotted
            };
            let property = transform_node(*property, ctx, property_role)?;
            ExprKind::Member {
                object: Box::new(object),
                property: Box::new(property),
                computed,
            }
        }
        ExprKind::Call { callee, args } => {
            let callee = transform_node(*callee, ctx, Role::CallCallee)?;
            let mut new_args = Vec::with_capacity(args.len());
            for arg in args {
                new_args.push(transform_node(arg, ctx, Role::Generic)?);
            }
            ExprKind::Call {
                callee: Box::new(callee),
                args: new_args,
            }
        }
        ExprKind::Unary { op, argument } => {
            let argument = transform_node(*argument, ctx, Role::Generic)?;
            ExprKind::Unary {
                op,
                argument: Box::new(argument),
            }
        }
        ExprKind::Binary { op, left, right } => {
            let left = transform_node(*left, ctx, Role::Generic)?;
            let right = transform_node(*right, ctx, Role::Generic)?;
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            }
        }
        ExprKind::Logical { op, left, right } => {
            let left = transform_node(*left, ctx, Role::Generic)?;
            let right = transform_node(*right, ctx, Role::Generic)?;
            ExprKind::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            }
        }
        ExprKind::Conditional {
            test,
            consequent,
            alternate,
        } => {
            let test = transform_node(*test, ctx, Role::Generic)?;
            let consequent = transform_node(*consequent, ctx, Role::Generic)?;
            let alternate = transform_node(*alternate, ctx, Role::Generic)?;
            ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            }
        }
        ExprKind::Sequence(items) => {
            let mut new_items = Vec::with_capacity(items.len());
            for item in items {
                new_items.push(transform_node(item, ctx, Role::Generic)?);
            }
            ExprKind::Sequence(new_items)
        }
    };
    Ok(Expr { kind, snapshot_typed })
}

fn apply_enter(expr: Expr, ctx: &TransformContext, role: Role) -> Result<Expr> {
    match &expr.kind {
        ExprKind::Identifier(name) if role != Role::MemberPropertyDotted => {
            enter_identifier(name, ctx, role)
        }
        ExprKind::Call { callee, .. } if is_child_or_parent_call(callee) => {
            Ok(expr.with_snapshot(true))
        }
        _ => Ok(expr),
    }
}

fn is_child_or_parent_call(callee: &Expr) -> bool {
    match &callee.kind {
        ExprKind::Identifier(name) => name == "child" || name == "parent",
        ExprKind::Member {
            property, computed, ..
        } if !computed => matches!(&property.kind, ExprKind::Identifier(name) if name == "child" || name == "parent"),
        _ => false,
    }
}

/// Wildcard captures (`$name`) resolve to a snapshot-typed pseudo-value (so
/// `data.foo[$bar]` coerces the index to `$bar.val()`); function parameters
/// are plain placeholders until substitution brings in the caller's actual,
/// already-typed argument.
fn is_wildcard_local(name: &str) -> bool {
    name.starts_with('$')
}

fn enter_identifier(name: &str, ctx: &TransformContext, role: Role) -> Result<Expr> {
    match name {
        "auth" | "now" | "query" => Ok(Expr::ident(name)),
        "root" => Ok(Expr::ident(name).with_snapshot(true)),
        "next" => Ok(Expr::ident("newData").with_snapshot(true)),
        "prev" => Ok(Expr::ident("data").with_snapshot(true)),
        "newData" | "data" => Ok(Expr::ident(name).with_snapshot(true)),
        "oneOf" | "env" => Ok(Expr::ident(name)),
        _ if ctx.locals.iter().any(|l| l == name) => {
            Ok(Expr::ident(name).with_snapshot(is_wildcard_local(name)))
        }
        _ if ctx.refs.contains_key(name) => {
            let ref_level = ctx.refs.get(name).copied().unwrap_or(ctx.level);
            let hops = ctx.level.saturating_sub(ref_level);
            let mut base = Expr::ident(ctx.base.identifier()).with_snapshot(true);
            for _ in 0..hops {
                base = Expr::call(Expr::dotted(base, "parent"), Vec::new()).with_snapshot(true);
            }
            Ok(base)
        }
        _ if ctx.functions.contains(name) => {
            if role == Role::CallCallee || matches!(role, Role::MemberObject { computed: false }) {
                Ok(Expr::ident(name))
            } else {
                Ok(Expr::call(Expr::ident(name), Vec::new()))
            }
        }
        _ => Err(CompileError::unknown_reference(
            "unknown reference",
            name.to_string(),
        )),
    }
}

fn apply_leave(expr: Expr, ctx: &TransformContext, role: Role) -> Result<Expr> {
    let expr = expand_env(expr)?;
    let expr = lift_snapshot_member(expr, role)?;
    let expr = expand_one_of(expr)?;
    let expr = inline_function_call(expr, ctx)?;
    coerce_snapshot_value(expr, role)
}

fn expand_env(expr: Expr) -> Result<Expr> {
    let ExprKind::Member {
        object,
        property,
        computed,
    } = &expr.kind
    else {
        return Ok(expr);
    };
    if !matches!(&object.kind, ExprKind::Identifier(name) if name == "env") {
        return Ok(expr);
    }
    let key = if *computed {
        match &property.kind {
            ExprKind::Literal(Literal::Str(s)) => s.clone(),
            _ => {
                return Err(CompileError::NonLiteralEnvKey {
                    expression: "env[...]".to_string(),
                })
            }
        }
    } else {
        match &property.kind {
            ExprKind::Identifier(name) => name.clone(),
            _ => {
                return Err(CompileError::NonLiteralEnvKey {
                    expression: "env.?".to_string(),
                })
            }
        }
    };
    let value = std::env::var(&key).unwrap_or_default();
    Ok(Expr::string(value))
}

fn lift_snapshot_member(expr: Expr, role: Role) -> Result<Expr> {
    let ExprKind::Member {
        object,
        property,
        computed,
    } = &expr.kind
    else {
        return Ok(expr);
    };
    if !object.snapshot_typed || role == Role::CallCallee {
        return Ok(expr);
    }
    let key = if *computed {
        (**property).clone()
    } else {
        match &property.kind {
            ExprKind::Identifier(name) => Expr::string(name.clone()),
            _ => (**property).clone(),
        }
    };
    Ok(Expr::call(Expr::dotted((**object).clone(), "child"), vec![key]).with_snapshot(true))
}

fn coerce_snapshot_value(expr: Expr, role: Role) -> Result<Expr> {
    if !expr.snapshot_typed || matches!(role, Role::MemberObject { .. }) {
        return Ok(expr);
    }
    Ok(Expr::call(Expr::dotted(expr, "val"), Vec::new()))
}

fn expand_one_of(expr: Expr) -> Result<Expr> {
    let ExprKind::Call { callee, args } = &expr.kind else {
        return Ok(expr);
    };
    if !matches!(&callee.kind, ExprKind::Identifier(name) if name == "oneOf") {
        return Ok(expr);
    }
    let Some((first, rest)) = args.split_first() else {
        return Ok(expr);
    };
    let newdata_val = Expr::call(Expr::dotted(Expr::ident("newData"), "val"), Vec::new());
    let mut acc = Expr::new(ExprKind::Binary {
        op: BinaryOp::Eq,
        left: Box::new(newdata_val.clone()),
        right: Box::new(first.clone()),
    });
    for arg in rest {
        let eq = Expr::new(ExprKind::Binary {
            op: BinaryOp::Eq,
            left: Box::new(newdata_val.clone()),
            right: Box::new(arg.clone()),
        });
        acc = Expr::new(ExprKind::Logical {
            op: LogicalOp::Or,
            left: Box::new(acc),
            right: Box::new(eq),
        });
    }
    Ok(acc)
}

fn inline_function_call(expr: Expr, ctx: &TransformContext) -> Result<Expr> {
    let ExprKind::Call { callee, args } = &expr.kind else {
        return Ok(expr);
    };
    let ExprKind::Identifier(name) = &callee.kind else {
        return Ok(expr);
    };
    if ctx.locals.iter().any(|l| l == name) {
        return Ok(expr);
    }
    let Some(function) = ctx.functions.get(name) else {
        return Ok(expr);
    };
    if function.params.len() != args.len() {
        return Err(CompileError::Arity {
            name: name.clone(),
            expected: function.params.len(),
            got: args.len(),
            expression: name.clone(),
        });
    }
    let mut bindings: HashMap<&str, &Expr> = HashMap::new();
    for (param, arg) in function.params.iter().zip(args.iter()) {
        bindings.insert(param.as_str(), arg);
    }
    Ok(substitute(&function.body, &bindings))
}

/// Deep-clones `expr`, replacing every free occurrence of a bound parameter
/// identifier with its argument subtree so callsites never alias AST nodes.
fn substitute(expr: &Expr, bindings: &HashMap<&str, &Expr>) -> Expr {
    match &expr.kind {
        ExprKind::Identifier(name) => match bindings.get(name.as_str()) {
            Some(replacement) => (*replacement).clone(),
            None => expr.clone(),
        },
        ExprKind::Literal(_) => expr.clone(),
        ExprKind::Member {
            object,
            property,
            computed,
        } => Expr {
            kind: ExprKind::Member {
                object: Box::new(substitute(object, bindings)),
                property: Box::new(if *computed {
                    substitute(property, bindings)
                } else {
                    (**property).clone()
                }),
                computed: *computed,
            },
            snapshot_typed: expr.snapshot_typed,
        },
        ExprKind::Call { callee, args } => Expr {
            kind: ExprKind::Call {
                callee: Box::new(substitute(callee, bindings)),
                args: args.iter().map(|a| substitute(a, bindings)).collect(),
            },
            snapshot_typed: expr.snapshot_typed,
        },
        ExprKind::Unary { op, argument } => Expr {
            kind: ExprKind::Unary {
                op: *op,
                argument: Box::new(substitute(argument, bindings)),
            },
            snapshot_typed: expr.snapshot_typed,
        },
        ExprKind::Binary { op, left, right } => Expr {
            kind: ExprKind::Binary {
                op: *op,
                left: Box::new(substitute(left, bindings)),
                right: Box::new(substitute(right, bindings)),
            },
            snapshot_typed: expr.snapshot_typed,
        },
        ExprKind::Logical { op, left, right } => Expr {
            kind: ExprKind::Logical {
                op: *op,
                left: Box::new(substitute(left, bindings)),
                right: Box::new(substitute(right, bindings)),
            },
            snapshot_typed: expr.snapshot_typed,
        },
        ExprKind::Conditional {
            test,
            consequent,
            alternate,
        } => Expr {
            kind: ExprKind::Conditional {
                test: Box::new(substitute(test, bindings)),
                consequent: Box::new(substitute(consequent, bindings)),
                alternate: Box::new(substitute(alternate, bindings)),
            },
            snapshot_typed: expr.snapshot_typed,
        },
        ExprKind::Sequence(items) => Expr {
            kind: ExprKind::Sequence(items.iter().map(|i| substitute(i, bindings)).collect()),
            snapshot_typed: expr.snapshot_typed,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::build_function_table;
    use crate::parser::parse_expression;
    use crate::printer::print_expr;

    fn ctx_with<'a>(
        locals: &'a [String],
        refs: &'a HashMap<String, usize>,
        functions: &'a FunctionTable,
        base: SnapshotBase,
    ) -> TransformContext<'a> {
        TransformContext {
            locals,
            refs,
            level: 0,
            base,
            functions,
        }
    }

    #[test]
    fn test_next_becomes_newdata_and_coerces() {
        let functions = build_function_table(&[]).unwrap();
        let locals = vec![];
        let refs = HashMap::new();
        let ctx = ctx_with(&locals, &refs, &functions, SnapshotBase::NewData);
        let expr = parse_expression("next >= 0 && next <= 100").unwrap();
        let transformed = transform_fixed_point(expr, &ctx).unwrap();
        assert_eq!(
            print_expr(&transformed),
            "newData.val() >= 0 && newData.val() <= 100"
        );
    }

    #[test]
    fn test_member_lift_on_snapshot() {
        let functions = build_function_table(&[]).unwrap();
        let refs = HashMap::new();
        let locals = vec!["$bar".to_string()];
        let ctx = ctx_with(&locals, &refs, &functions, SnapshotBase::NewData);
        let expr = parse_expression("data.foo[$bar]").unwrap();
        let transformed = transform_fixed_point(expr, &ctx).unwrap();
        assert_eq!(
            print_expr(&transformed),
            "data.child('foo').child($bar.val()).val()"
        );
    }

    #[test]
    fn test_one_of_expansion() {
        let functions = build_function_table(&[]).unwrap();
        let locals = vec![];
        let refs = HashMap::new();
        let ctx = ctx_with(&locals, &refs, &functions, SnapshotBase::NewData);
        let expr = parse_expression("oneOf('a','b')").unwrap();
        let transformed = transform_fixed_point(expr, &ctx).unwrap();
        assert_eq!(
            print_expr(&transformed),
            "newData.val() == 'a' || newData.val() == 'b'"
        );
    }

    #[test]
    fn test_function_inlining() {
        let entries = vec![(
            "percentage".to_string(),
            "number && next >= 0 && next <= 100".to_string(),
        )];
        let functions = build_function_table(&entries).unwrap();
        let locals = vec![];
        let refs = HashMap::new();
        let ctx = ctx_with(&locals, &refs, &functions, SnapshotBase::NewData);
        let expr = parse_expression("percentage").unwrap();
        let transformed = transform_fixed_point(expr, &ctx).unwrap();
        assert_eq!(
            print_expr(&transformed),
            "newData.isNumber() && newData.val() >= 0 && newData.val() <= 100"
        );
    }

    #[test]
    fn test_unknown_identifier_fails() {
        let functions = build_function_table(&[]).unwrap();
        let locals = vec![];
        let refs = HashMap::new();
        let ctx = ctx_with(&locals, &refs, &functions, SnapshotBase::NewData);
        let expr = parse_expression("bogus").unwrap();
        assert!(transform_fixed_point(expr, &ctx).is_err());
    }

    #[test]
    fn test_ref_expansion_depth() {
        let functions = build_function_table(&[]).unwrap();
        let locals = vec![];
        let mut refs = HashMap::new();
        refs.insert("parentUid".to_string(), 1usize);
        let ctx = TransformContext {
            locals: &locals,
            refs: &refs,
            level: 3,
            base: SnapshotBase::Data,
            functions: &functions,
        };
        let expr = parse_expression("parentUid").unwrap();
        let transformed = transform_fixed_point(expr, &ctx).unwrap();
        assert_eq!(print_expr(&transformed), "data.parent().parent().val()");
    }

    #[test]
    fn test_arity_mismatch_fails() {
        let entries = vec![("double(x)".to_string(), "x".to_string())];
        let functions = build_function_table(&entries).unwrap();
        let locals = vec![];
        let refs = HashMap::new();
        let ctx = ctx_with(&locals, &refs, &functions, SnapshotBase::NewData);
        let expr = parse_expression("double(1, 2)").unwrap();
        assert!(transform_fixed_point(expr, &ctx).is_err());
    }
}
