//! Tree transformer: recursive descent over the YAML rule hierarchy into
//! the canonical JSON rules shape.
//!
//! ARCHITECTURE: grounded on the same "walk a decoded document, emit a
//! sibling document" shape as the reference's `transform/yaml.rs` and
//! `transform/json.rs`, but where those walk `serde_yaml`/`serde_json`
//! values to print a compact skeleton, this walk builds a *new*
//! `serde_json::Value` tree carrying validation/index/encryption metadata.
//! Output uses `serde_json::Map`'s `preserve_order` feature so
//! `required`/`indexed` arrays come out in the order children were visited,
//! matching the input mapping's own insertion order end to end.

use std::collections::HashMap;

use regex::Regex;
use serde_json::{Map as JsonMap, Value as JsonValue};
use serde_yaml::Value as YamlValue;

use crate::error::{CompileError, Result};
use crate::functions::{FunctionTable, BUILTIN_IDENTIFIERS};
use crate::parser::parse_expression;
use crate::printer::print_expr;
use crate::transform::{transform_fixed_point, SnapshotBase, TransformContext};

const MAX_TREE_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Required,
    Indexed,
}

#[derive(Debug, Clone)]
enum ValuePrefixKeyword {
    Plain(Keyword),
    Encrypted(Option<String>),
}

#[derive(Default)]
struct Encrypt {
    key: Option<String>,
    value: Option<String>,
    few: bool,
}

impl Encrypt {
    fn is_empty(&self) -> bool {
        self.key.is_none() && self.value.is_none() && !self.few
    }

    fn into_json(self) -> JsonValue {
        let mut map = JsonMap::new();
        if let Some(key) = self.key {
            map.insert("key".to_string(), JsonValue::String(key));
        }
        if let Some(value) = self.value {
            map.insert("value".to_string(), JsonValue::String(value));
        }
        if self.few {
            map.insert("few".to_string(), JsonValue::Bool(true));
        }
        JsonValue::Object(map)
    }
}

/// Entry point: compiles the `root` subtree. `locals` starts empty and
/// `refs` starts empty; the top-level caller is responsible for rejecting a
/// non-empty `.indexChildrenOn` escaping this call (a dangling deep index).
pub fn transform_branch(
    node: &YamlValue,
    locals: &mut Vec<String>,
    refs: &mut HashMap<String, usize>,
    path: &str,
    level: usize,
    is_wildcard_self: bool,
    functions: &FunctionTable,
) -> Result<JsonMap<String, JsonValue>> {
    if level > MAX_TREE_DEPTH {
        return Err(CompileError::DepthExceeded {
            message: format!("rule tree nesting exceeds {} levels (at {})", MAX_TREE_DEPTH, path),
        });
    }

    let mapping = as_mapping(node, path)?;

    let mut ref_name: Option<String> = None;
    if let Some(raw) = mapping.get(&key(".ref")) {
        let name = raw.as_str().ok_or_else(|| {
            CompileError::structure("`.ref` must be a string", path.to_string())
        })?;
        if name.starts_with('$')
            || BUILTIN_IDENTIFIERS.contains(&name)
            || locals.iter().any(|l| l == name)
            || refs.contains_key(name)
        {
            return Err(CompileError::structure(
                format!("ref name {:?} is invalid or already in scope", name),
                path.to_string(),
            ));
        }
        refs.insert(name.to_string(), level);
        ref_name = Some(name.to_string());
    }

    let result = transform_branch_body(&mapping, locals, refs, path, level, is_wildcard_self, functions);

    if let Some(name) = ref_name {
        refs.remove(&name);
    }

    result
}

fn transform_branch_body(
    mapping: &serde_yaml::Mapping,
    locals: &mut Vec<String>,
    refs: &mut HashMap<String, usize>,
    path: &str,
    level: usize,
    is_wildcard_self: bool,
    functions: &FunctionTable,
) -> Result<JsonMap<String, JsonValue>> {
    let mut value_raw: Option<String> = None;
    let mut write_raw: Option<String> = None;
    let mut read_raw: Option<String> = None;
    let mut read_write_raw: Option<String> = None;
    let mut more_flag: Option<bool> = None;

    let mut required_children: Vec<String> = Vec::new();
    let mut indexed_children: Vec<String> = Vec::new();
    let mut indexed_grandchildren: Vec<String> = Vec::new();
    let mut has_wildcard = false;

    let mut output = JsonMap::new();

    for (raw_key, raw_value) in mapping {
        let Some(key_str) = raw_key.as_str() else {
            continue;
        };
        match key_str {
            ".ref" => continue,
            ".value" => {
                value_raw = Some(expect_string(raw_value, ".value", path)?);
                continue;
            }
            ".write" => {
                write_raw = Some(expect_string(raw_value, ".write", path)?);
                continue;
            }
            ".read" => {
                read_raw = Some(expect_string(raw_value, ".read", path)?);
                continue;
            }
            ".read/write" => {
                read_write_raw = Some(expect_string(raw_value, ".read/write", path)?);
                continue;
            }
            ".more" => {
                more_flag = raw_value.as_bool();
                continue;
            }
            _ => {}
        }

        let (base_key, suffix_encrypted, suffix_few) = extract_key_suffix(key_str);

        if base_key.starts_with('.') {
            return Err(CompileError::structure(
                format!("unknown control key {:?}", base_key),
                path.to_string(),
            ));
        }

        let is_wildcard = base_key.starts_with('$');
        if suffix_few && !is_wildcard {
            return Err(CompileError::structure(
                "`/few` is only legal on a wildcard key",
                path.to_string(),
            ));
        }
        if is_wildcard {
            if has_wildcard {
                return Err(CompileError::structure(
                    "at most one wildcard child is allowed per node",
                    path.to_string(),
                ));
            }
            has_wildcard = true;
        }

        let mut encrypt = Encrypt {
            key: suffix_encrypted,
            few: suffix_few,
            value: None,
        };

        if let Some(peeked) = peek_child_value_string(raw_value) {
            let (keywords, _) = extract_keyword_prefix(&peeked);
            check_duplicate_keywords(&keywords, path)?;
            for kw in &keywords {
                match kw {
                    ValuePrefixKeyword::Plain(Keyword::Required) => {
                        if is_wildcard {
                            return Err(CompileError::structure(
                                "`required` is not allowed on a wildcard key",
                                path.to_string(),
                            ));
                        }
                        required_children.push(base_key.clone());
                    }
                    ValuePrefixKeyword::Plain(Keyword::Indexed) => {
                        if is_wildcard {
                            indexed_children.push(".value".to_string());
                        } else {
                            indexed_grandchildren.push(base_key.clone());
                        }
                    }
                    ValuePrefixKeyword::Encrypted(pattern) => {
                        encrypt.value = Some(pattern.clone().unwrap_or_else(|| "#".to_string()));
                    }
                }
            }
        }

        let child_path = format!("{}/{}", path, base_key);
        if is_wildcard {
            locals.push(base_key.clone());
        }
        let child_result = transform_branch(
            raw_value,
            locals,
            refs,
            &child_path,
            level + 1,
            is_wildcard,
            functions,
        );
        if is_wildcard {
            locals.pop();
        }
        let mut child_json = child_result?;

        if !encrypt.is_empty() {
            child_json.insert(".encrypt".to_string(), encrypt.into_json());
        }

        if let Some(JsonValue::Array(entries)) = child_json.remove(".indexChildrenOn") {
            let prefixed: Vec<String> = entries
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .map(|n| format!("{}/{}", base_key, n))
                .collect();
            if is_wildcard_self {
                indexed_children.extend(prefixed);
            } else {
                indexed_grandchildren.extend(prefixed);
            }
        }

        output.insert(base_key, JsonValue::Object(child_json));
    }

    if read_write_raw.is_some() && (read_raw.is_some() || write_raw.is_some()) {
        return Err(CompileError::structure(
            "`.read/write` conflicts with separate `.read`/`.write`",
            path.to_string(),
        ));
    }

    if let Some(raw) = read_write_raw {
        let read_ctx = make_context(locals, refs, level, SnapshotBase::Data, functions);
        let write_ctx = make_context(locals, refs, level, SnapshotBase::NewData, functions);
        output.insert(
            ".read".to_string(),
            JsonValue::String(compile_expression(&raw, &read_ctx)?),
        );
        output.insert(
            ".write".to_string(),
            JsonValue::String(compile_expression(&raw, &write_ctx)?),
        );
    } else {
        if let Some(raw) = read_raw {
            let ctx = make_context(locals, refs, level, SnapshotBase::Data, functions);
            output.insert(".read".to_string(), JsonValue::String(compile_expression(&raw, &ctx)?));
        }
        if let Some(raw) = write_raw {
            let ctx = make_context(locals, refs, level, SnapshotBase::NewData, functions);
            output.insert(".write".to_string(), JsonValue::String(compile_expression(&raw, &ctx)?));
        }
    }

    let mut more_allowed = more_flag.unwrap_or(false);
    let mut validate_parts: Vec<String> = Vec::new();
    if let Some(raw) = value_raw {
        let (keywords, remainder) = extract_keyword_prefix(&raw);
        check_duplicate_keywords(&keywords, path)?;
        if remainder == "any" {
            more_allowed = true;
        } else {
            let ctx = make_context(locals, refs, level, SnapshotBase::NewData, functions);
            validate_parts.push(compile_expression(&remainder, &ctx)?);
        }
    }
    if !required_children.is_empty() {
        let quoted = required_children
            .iter()
            .map(|k| format!("'{}'", k))
            .collect::<Vec<_>>()
            .join(", ");
        validate_parts.push(format!("newData.hasChildren([{}])", quoted));
    }
    if !validate_parts.is_empty() {
        output.insert(
            ".validate".to_string(),
            JsonValue::String(validate_parts.join(" && ")),
        );
    }

    if !indexed_children.is_empty() {
        output.insert(
            ".indexOn".to_string(),
            JsonValue::Array(indexed_children.into_iter().map(JsonValue::String).collect()),
        );
    }
    if !indexed_grandchildren.is_empty() {
        output.insert(
            ".indexChildrenOn".to_string(),
            JsonValue::Array(indexed_grandchildren.into_iter().map(JsonValue::String).collect()),
        );
    }

    if !more_allowed && !has_wildcard {
        let mut other = JsonMap::new();
        other.insert(".validate".to_string(), JsonValue::Bool(false));
        output.insert("$other".to_string(), JsonValue::Object(other));
    }

    Ok(output)
}

fn make_context<'a>(
    locals: &'a [String],
    refs: &'a HashMap<String, usize>,
    level: usize,
    base: SnapshotBase,
    functions: &'a FunctionTable,
) -> TransformContext<'a> {
    TransformContext {
        locals,
        refs,
        level,
        base,
        functions,
    }
}

fn compile_expression(source: &str, ctx: &TransformContext) -> Result<String> {
    let expr = parse_expression(source)?;
    let transformed = transform_fixed_point(expr, ctx)?;
    Ok(print_expr(&transformed))
}

fn as_mapping<'a>(node: &'a YamlValue, path: &str) -> Result<std::borrow::Cow<'a, serde_yaml::Mapping>> {
    match node {
        YamlValue::Mapping(m) => Ok(std::borrow::Cow::Borrowed(m)),
        YamlValue::String(s) => {
            let mut m = serde_yaml::Mapping::new();
            m.insert(key(".value"), YamlValue::String(s.clone()));
            Ok(std::borrow::Cow::Owned(m))
        }
        _ => Err(CompileError::structure(
            "expected a rule node to be a string or mapping",
            path.to_string(),
        )),
    }
}

fn key(name: &str) -> YamlValue {
    YamlValue::String(name.to_string())
}

fn expect_string(value: &YamlValue, control_key: &str, path: &str) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| CompileError::structure(format!("{} must be a string", control_key), path.to_string()))
}

fn peek_child_value_string(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Mapping(m) => m
            .get(&key(".value"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        _ => None,
    }
}

fn check_duplicate_keywords(keywords: &[ValuePrefixKeyword], path: &str) -> Result<()> {
    let mut seen_required = false;
    let mut seen_indexed = false;
    let mut seen_encrypted = false;
    for kw in keywords {
        match kw {
            ValuePrefixKeyword::Plain(Keyword::Required) => {
                if seen_required {
                    return Err(CompileError::structure("duplicated `required` keyword", path.to_string()));
                }
                seen_required = true;
            }
            ValuePrefixKeyword::Plain(Keyword::Indexed) => {
                if seen_indexed {
                    return Err(CompileError::structure("duplicated `indexed` keyword", path.to_string()));
                }
                seen_indexed = true;
            }
            ValuePrefixKeyword::Encrypted(_) => {
                if seen_encrypted {
                    return Err(CompileError::structure("duplicated `encrypted` keyword", path.to_string()));
                }
                seen_encrypted = true;
            }
        }
    }
    Ok(())
}

fn keyword_prefix_regex() -> Regex {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^\s*(required|indexed|encrypted(?:\[([^\]]*)\])?)\s*").unwrap()
}

/// Repeatedly strips one leading keyword token at a time from `s`, returning
/// the keywords found (in order) and the remaining body trimmed of
/// whitespace. Always operates against a fresh slice of `s`; never reuses
/// match state from a previous call (see the design note on cross-key regex
/// interference).
fn extract_keyword_prefix(s: &str) -> (Vec<ValuePrefixKeyword>, String) {
    let re = keyword_prefix_regex();
    let mut rest = s;
    let mut keywords = Vec::new();
    loop {
        let Some(caps) = re.captures(rest) else {
            break;
        };
        let Some(whole) = caps.get(0) else { break };
        let Some(token) = caps.get(1) else { break };
        let kw = if token.as_str().starts_with("encrypted") {
            ValuePrefixKeyword::Encrypted(caps.get(2).map(|m| m.as_str().to_string()))
        } else if token.as_str() == "required" {
            ValuePrefixKeyword::Plain(Keyword::Required)
        } else {
            ValuePrefixKeyword::Plain(Keyword::Indexed)
        };
        keywords.push(kw);
        rest = &rest[whole.end()..];
    }
    (keywords, rest.trim().to_string())
}

fn key_suffix_regex() -> Regex {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^(.*)/(encrypted(?:\[([^\]]*)\])?|few)$").unwrap()
}

/// Splits a raw mapping key into its base key plus any `/encrypted[...]` or
/// `/few` suffix annotation, evaluated fresh against this key's own text.
fn extract_key_suffix(raw_key: &str) -> (String, Option<String>, bool) {
    let re = key_suffix_regex();
    let Some(caps) = re.captures(raw_key) else {
        return (raw_key.to_string(), None, false);
    };
    let Some(base) = caps.get(1) else {
        return (raw_key.to_string(), None, false);
    };
    let Some(suffix) = caps.get(2) else {
        return (raw_key.to_string(), None, false);
    };
    if suffix.as_str() == "few" {
        (base.as_str().to_string(), None, true)
    } else {
        let pattern = caps.get(3).map(|m| m.as_str().to_string());
        (base.as_str().to_string(), Some(pattern.unwrap_or_else(|| "#".to_string())), false)
    }
}
