//! Function-table construction and recursion detection.
//!
//! ARCHITECTURE: the document's `functions` sequence plus the fixed built-in
//! value-type functions are parsed into a single table up front, then each
//! body is driven to its own fixed point before the tree transformer ever
//! runs, so every call site in the rule tree can inline a function body in
//! one pass (spec §4.2/§4.3). Ordering uses `indexmap::IndexMap` so
//! iteration order matches declaration order, the same reason
//! `apollo-compiler` keeps its definition tables in an `IndexMap`.

use indexmap::IndexMap;
use regex::Regex;

use std::collections::HashMap;

use crate::ast::Expr;
use crate::error::{CompileError, Result};
use crate::lexer::{Lexer, Token};
use crate::parser::parse_expression;
use crate::transform::{transform_fixed_point, SnapshotBase, TransformContext};

/// Identifiers with fixed, non-overridable meaning inside an expression.
/// Used to reject `.ref` names that would collide with something already
/// meaningful in scope.
pub const BUILTIN_IDENTIFIERS: &[&str] = &[
    "auth", "now", "root", "next", "newData", "prev", "data", "env", "query", "oneOf",
];

/// The narrower set checked against function parameter names (spec §3):
/// `oneOf` is a call-site expansion macro, not a value identifier, so a
/// parameter named `oneOf` does not shadow anything a function body could
/// reference as a value.
const SHADOWABLE_BUILTIN_IDENTIFIERS: &[&str] = &[
    "auth", "now", "root", "next", "newData", "prev", "data", "env", "query",
];

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: Expr,
}

pub struct FunctionTable {
    functions: IndexMap<String, Function>,
}

impl FunctionTable {
    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

fn signature_regex() -> Regex {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^\s*(\w+)\s*(?:\((.*?)\))?\s*$").unwrap()
}

fn parse_signature(signature: &str) -> Result<(String, Vec<String>)> {
    let re = signature_regex();
    let caps = re
        .captures(signature)
        .ok_or_else(|| CompileError::InvalidSignature(signature.to_string()))?;
    #[allow(clippy::unwrap_used)]
    let name = caps.get(1).unwrap().as_str().to_string();
    let params = caps
        .get(2)
        .map(|m| m.as_str())
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    Ok((name, params))
}

/// Parses the document's `functions` entries plus the built-ins into a
/// table, then transforms every body to its own fixed point.
pub fn build_function_table(entries: &[(String, String)]) -> Result<FunctionTable> {
    let mut raw: IndexMap<String, (Vec<String>, String)> = IndexMap::new();

    for (signature, body_source) in entries {
        let (name, params) = parse_signature(signature)?;
        if raw.contains_key(&name) {
            return Err(CompileError::structure(
                format!("duplicate function definition: {}", name),
                name.clone(),
            ));
        }
        for param in &params {
            if SHADOWABLE_BUILTIN_IDENTIFIERS.contains(&param.as_str()) {
                return Err(CompileError::structure(
                    format!("parameter {:?} shadows builtin", param),
                    name.clone(),
                ));
            }
        }
        raw.insert(name, (params, body_source.clone()));
    }

    for (name, params, body) in [
        ("boolean", Vec::<&str>::new(), "next.isBoolean()"),
        ("string", Vec::<&str>::new(), "next.isString()"),
        ("number", Vec::<&str>::new(), "next.isNumber()"),
        ("any", Vec::<&str>::new(), "true"),
    ] {
        if !raw.contains_key(name) {
            raw.insert(
                name.to_string(),
                (
                    params.into_iter().map(str::to_string).collect(),
                    body.to_string(),
                ),
            );
        }
    }

    detect_recursion(&raw)?;

    let mut parsed: IndexMap<String, Function> = IndexMap::new();
    for (name, (params, body_source)) in &raw {
        let body = parse_expression(body_source)?;
        parsed.insert(
            name.clone(),
            Function {
                name: name.clone(),
                params: params.clone(),
                body,
            },
        );
    }

    let names: Vec<String> = parsed.keys().cloned().collect();
    for name in names {
        let locals = parsed
            .get(&name)
            .map(|f| f.params.clone())
            .unwrap_or_default();
        let refs = HashMap::new();
        let table_snapshot = FunctionTable {
            functions: parsed.clone(),
        };
        let body = parsed
            .get(&name)
            .map(|f| f.body.clone())
            .unwrap_or_else(|| Expr::boolean(true));
        let ctx = TransformContext {
            locals: &locals,
            refs: &refs,
            level: 0,
            base: SnapshotBase::NewData,
            functions: &table_snapshot,
        };
        let transformed = transform_fixed_point(body, &ctx)?;
        if let Some(func) = parsed.get_mut(&name) {
            func.body = transformed;
        }
    }

    Ok(FunctionTable { functions: parsed })
}

/// Scans each raw (pre-parse) function body for references to other
/// function names and runs cycle detection (including self-loops) on the
/// resulting call graph, before any body is even parsed into an `Expr`.
///
/// Callees are read from the lexer's `Ident` tokens rather than a regex over
/// the raw source text, so an identifier-shaped substring inside a string
/// literal (e.g. `"foo == 'bar'"` where `bar` also names a function) is never
/// mistaken for a call to that function.
fn detect_recursion(raw: &IndexMap<String, (Vec<String>, String)>) -> Result<()> {
    let mut graph: IndexMap<String, Vec<String>> = IndexMap::new();
    for (name, (_, body)) in raw {
        // A body that fails to tokenize here surfaces no callees; the later
        // `parse_expression` pass reports the real syntax error.
        let callees: Vec<String> = Lexer::new(body)
            .tokenize()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tok| match tok {
                Token::Ident(ident) => Some(ident),
                _ => None,
            })
            .filter(|ident| ident != name && raw.contains_key(ident))
            .collect();
        graph.insert(name.clone(), callees);
    }

    #[derive(PartialEq, Clone, Copy)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let mut marks: IndexMap<String, Mark> = graph.keys().map(|n| (n.clone(), Mark::Unvisited)).collect();

    fn visit(
        node: &str,
        graph: &IndexMap<String, Vec<String>>,
        marks: &mut IndexMap<String, Mark>,
    ) -> Result<()> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                return Err(CompileError::Recursion(node.to_string()));
            }
            _ => {}
        }
        marks.insert(node.to_string(), Mark::InProgress);
        if let Some(callees) = graph.get(node) {
            for callee in callees.clone() {
                visit(&callee, graph, marks)?;
            }
        }
        marks.insert(node.to_string(), Mark::Done);
        Ok(())
    }

    let nodes: Vec<String> = graph.keys().cloned().collect();
    for node in nodes {
        visit(&node, &graph, &mut marks)?;
    }
    Ok(())
}
