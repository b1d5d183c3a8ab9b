//! Rulecc Core - compiles a YAML security-rules DSL into realtime-database
//! JSON rules
//!
//! # Overview
//!
//! `rulecc-core` is a pure library for compiling an ordered YAML document
//! (a `functions` table plus a `root` rule tree) into the canonical JSON
//! rules shape a realtime database expects, plus an optional isomorphic
//! "firecrypt" tree describing which fields are encrypted.
//!
//! # Architecture
//!
//! **IMPORTANT: This is a LIBRARY with NO I/O.**
//! - Accepts an already-parsed `serde_yaml::Value` (or a YAML `&str` via
//!   [`compile`]), not file paths.
//! - Returns `Result<CompileOutput>`, not stdout writes.
//! - Pure transformation: a compile call is a function of the input
//!   document and the process environment snapshot observed at `env.X`
//!   expansion time.
//!
//! The CLI binary (`rulecc-cli`) handles file I/O separately.
//!
//! # Example
//!
//! ```no_run
//! use rulecc_core::compile;
//!
//! let document = "
//! root:
//!   users:
//!     $uid:
//!       \".read/write\": \"auth.uid == $uid\"
//! ";
//! let output = compile(document)?;
//! # Ok::<(), rulecc_core::CompileError>(())
//! ```
//!
//! # Design Principles
//!
//! 1. **Result types everywhere** - no panics (enforced by clippy lints in
//!    this crate's `Cargo.toml`).
//! 2. **Single pass per expression, fixed point per function body** - see
//!    `transform.rs`.
//! 3. **No global state** - every compile call is independent.

pub use error::{CompileError, Result};

mod ast;
mod encrypt;
mod error;
mod functions;
mod lexer;
mod parser;
mod printer;
mod transform;
mod tree;

use std::collections::HashMap;

use serde_json::{Map as JsonMap, Value as JsonValue};
use serde_yaml::Value as YamlValue;

use functions::build_function_table;
use tree::transform_branch;

/// Result of a successful compile: the canonical rules tree plus an optional
/// parallel tree of encryption annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOutput {
    pub rules: JsonValue,
    pub firecrypt: Option<JsonValue>,
}

/// Parses `document` as YAML and compiles it.
///
/// This is the PRIMARY entry point for the common case of an unparsed YAML
/// source string. Callers who already hold a decoded `serde_yaml::Value`
/// (e.g. after resolving YAML anchors across multiple included files) should
/// use [`compile_value`] instead.
pub fn compile(document: &str) -> Result<CompileOutput> {
    let parsed: YamlValue = serde_yaml::from_str(document)
        .map_err(|err| CompileError::syntax(err.to_string(), "<document>"))?;
    compile_value(&parsed)
}

/// Compiles an already-decoded document.
///
/// Orchestrates function-table construction (§4.2), the tree transform from
/// `root` (§4.4), and encryption extraction (§4.5). Any invariant violation
/// surfaces as a single failure carrying the offending path or expression.
pub fn compile_value(document: &YamlValue) -> Result<CompileOutput> {
    let function_entries = extract_function_entries(document)?;
    let function_table = build_function_table(&function_entries)?;

    let root = document
        .get("root")
        .ok_or_else(|| CompileError::structure("document is missing a `root` key", "<document>"))?;

    let mut locals = Vec::new();
    let mut refs = HashMap::new();
    let mut rules = transform_branch(root, &mut locals, &mut refs, "root", 0, false, &function_table)?;

    if rules.contains_key(".indexChildrenOn") {
        return Err(CompileError::structure(
            "deep index (`indexed` on a nested key) must be nested under a wildcard ancestor",
            "root".to_string(),
        ));
    }

    let firecrypt = encrypt::extract_encryption(&mut rules);

    Ok(CompileOutput {
        rules: JsonValue::Object(rules),
        firecrypt,
    })
}

/// Reads the top-level `functions` sequence, each entry a single-key mapping
/// from signature string to body-expression string. Absent `functions` is
/// not an error: the document may rely solely on the built-ins.
fn extract_function_entries(document: &YamlValue) -> Result<Vec<(String, String)>> {
    let Some(functions) = document.get("functions") else {
        return Ok(Vec::new());
    };
    let YamlValue::Sequence(items) = functions else {
        return Err(CompileError::structure(
            "`functions` must be a sequence",
            "<document>",
        ));
    };

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let YamlValue::Mapping(entry) = item else {
            return Err(CompileError::structure(
                "each `functions` entry must be a single-entry mapping",
                "<document>",
            ));
        };
        if entry.len() != 1 {
            return Err(CompileError::structure(
                "each `functions` entry must have exactly one signature key",
                "<document>",
            ));
        }
        let Some((signature, body)) = entry.iter().next() else {
            return Err(CompileError::structure(
                "each `functions` entry must have exactly one signature key",
                "<document>",
            ));
        };
        let Some(signature) = signature.as_str() else {
            return Err(CompileError::structure(
                "function signature key must be a string",
                "<document>",
            ));
        };
        let Some(body) = body.as_str() else {
            return Err(CompileError::structure(
                "function body must be a string",
                signature.to_string(),
            ));
        };
        entries.push((signature.to_string(), body.to_string()));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_minimal_document() {
        let output = compile("root:\n  foo: string\n").unwrap();
        let foo = output.rules.get("foo").unwrap().as_object().unwrap();
        assert_eq!(
            foo.get(".validate").unwrap().as_str().unwrap(),
            "newData.isString()"
        );
        assert!(output.firecrypt.is_none());
    }

    #[test]
    fn test_compile_missing_root_fails() {
        assert!(compile("functions: []\n").is_err());
    }

    #[test]
    fn test_compile_with_functions() {
        let doc = "
functions:
  - percentage: \"number && next >= 0 && next <= 100\"
root:
  score:
    \".value\": percentage
";
        let output = compile(doc).unwrap();
        let score = output.rules.get("score").unwrap().as_object().unwrap();
        assert_eq!(
            score.get(".validate").unwrap().as_str().unwrap(),
            "newData.isNumber() && newData.val() >= 0 && newData.val() <= 100"
        );
    }

    #[test]
    fn test_compile_extracts_firecrypt() {
        let doc = "
root:
  users:
    $uid:
      ssn:
        \".value\": \"encrypted[#-#-.] string\"
";
        let output = compile(doc).unwrap();
        let firecrypt = output.firecrypt.unwrap();
        assert!(firecrypt.get("users").is_some());
        let ssn = output
            .rules
            .get("users")
            .unwrap()
            .get("$uid")
            .unwrap()
            .get("ssn")
            .unwrap();
        assert!(ssn.get(".encrypt").is_none());
    }

    #[test]
    fn test_compile_dangling_deep_index_fails() {
        let doc = "
root:
  foo: \"indexed string\"
";
        assert!(compile(doc).is_err());
    }
}
