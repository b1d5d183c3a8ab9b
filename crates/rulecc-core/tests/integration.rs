//! Integration tests against the public `compile` API.
//!
//! The seven scenarios below are reproduced from the language-independent
//! specification this compiler implements, plus a handful of realistic
//! documents exercising features the scenarios don't individually cover
//! (deep index bubbling, refs, conflicting `.read/write`).

use rulecc_core::compile;

#[test]
fn scenario_1_string_shorthand_closes_with_other() {
    let output = compile("root:\n  foo: \"string\"\n").unwrap();
    let foo = &output.rules["foo"];
    assert_eq!(foo[".validate"], "newData.isString()");
    assert_eq!(foo["$other"][".validate"], false);
    assert_eq!(output.rules["$other"][".validate"], false);
}

#[test]
fn scenario_2_required_function_synthesizes_has_children() {
    let document = "
functions:
  - percentage: \"number && next >= 0 && next <= 100\"
root:
  v: \"required percentage\"
";
    let output = compile(document).unwrap();
    assert_eq!(
        output.rules["v"][".validate"],
        "newData.isNumber() && newData.val() >= 0 && newData.val() <= 100"
    );
    assert_eq!(output.rules[".validate"], "newData.hasChildren(['v'])");
}

#[test]
fn scenario_3_wildcard_read_write_combined_has_no_other() {
    let document = "root:\n  \"$uid\":\n    \".read/write\": \"auth.uid == $uid\"\n";
    let output = compile(document).unwrap();
    let uid = &output.rules["$uid"];
    assert_eq!(uid[".read"], "auth.uid == $uid");
    assert_eq!(uid[".write"], "auth.uid == $uid");
    assert!(uid.get("$other").is_none());
}

#[test]
fn scenario_4_snapshot_member_lift_and_value_coercion() {
    let document = "
root:
  \"$bar\":
    x:
      \".value\": \"data.foo[$bar]\"
";
    let output = compile(document).unwrap();
    assert_eq!(
        output.rules["$bar"]["x"][".validate"],
        "data.child('foo').child($bar.val()).val()"
    );
}

#[test]
fn scenario_5_one_of_expands_to_disjunction() {
    let output = compile("root:\n  x: \"oneOf('a','b')\"\n").unwrap();
    assert_eq!(
        output.rules["x"][".validate"],
        "newData.val() == 'a' || newData.val() == 'b'"
    );
}

#[test]
fn scenario_6_encryption_keyword_and_suffix_extracted() {
    let document = "
root:
  a:
    \".value\": \"encrypted[#-#-.] string\"
  \"b/encrypted\": \"string\"
";
    let output = compile(document).unwrap();
    let firecrypt = output.firecrypt.unwrap();
    assert_eq!(firecrypt["a"][".encrypt"]["value"], "#-#-.");
    assert_eq!(firecrypt["b"][".encrypt"]["key"], "#");
    assert!(output.rules["a"].get(".encrypt").is_none());
    assert!(output.rules["b"].get(".encrypt").is_none());
}

#[test]
fn scenario_7_mutual_recursion_fails_without_hanging() {
    let document = "
functions:
  - a: \"b()\"
  - b: \"a()\"
root:
  foo: \"string\"
";
    assert!(compile(document).is_err());
}

#[test]
fn deep_index_bubbles_to_nearest_wildcard_ancestor() {
    let document = "
root:
  \"$uid\":
    profile:
      age: \"indexed number\"
";
    let output = compile(document).unwrap();
    let uid = &output.rules["$uid"];
    let index_on = uid[".indexOn"].as_array().unwrap();
    assert_eq!(index_on.len(), 1);
    assert_eq!(index_on[0], "profile/age");
    assert!(uid.get(".indexChildrenOn").is_none());
}

#[test]
fn ref_binding_expands_to_parent_chain() {
    // root(0) -> posts(1) -> $postId(2, .ref=post) -> comments(3) -> authorId(4)
    // hops = level(4) - ref.level(2) = 2
    // `.value` always compiles against the newData-base snapshot, so the
    // resolved ref chain walks up from `newData`, not `data`.
    let document = "
root:
  posts:
    \"$postId\":
      \".ref\": post
      comments:
        authorId:
          \".value\": \"post\"
";
    let output = compile(document).unwrap();
    let author_id = &output.rules["posts"]["$postId"]["comments"]["authorId"];
    assert_eq!(
        author_id[".validate"],
        "newData.parent().parent().val()"
    );
}

#[test]
fn indexed_on_wildcard_own_value_emits_dot_value() {
    let document = "
root:
  \"$uid\": \"indexed string\"
";
    let output = compile(document).unwrap();
    let uid = &output.rules["$uid"];
    let index_on = uid[".indexOn"].as_array().unwrap();
    assert_eq!(index_on, &[serde_json::json!(".value")]);
}

#[test]
fn conflicting_read_write_declarations_fail() {
    let document = "
root:
  foo:
    \".read/write\": \"true\"
    \".read\": \"true\"
";
    assert!(compile(document).is_err());
}

#[test]
fn required_on_wildcard_fails() {
    let document = "root:\n  \"$uid\": \"required string\"\n";
    assert!(compile(document).is_err());
}

#[test]
fn unknown_identifier_fails() {
    let document = "root:\n  foo: \"bogus\"\n";
    assert!(compile(document).is_err());
}

#[test]
fn more_flag_suppresses_closed_world_default() {
    let document = "
root:
  foo:
    \".more\": true
";
    let output = compile(document).unwrap();
    assert!(output.rules["foo"].get("$other").is_none());
}

#[test]
fn determinism_across_repeated_compiles() {
    let document = "
functions:
  - percentage: \"number && next >= 0 && next <= 100\"
root:
  v: \"required percentage\"
  \"$uid\":
    \".read/write\": \"auth.uid == $uid\"
";
    let first = compile(document).unwrap();
    let second = compile(document).unwrap();
    assert_eq!(first.rules, second.rules);
    assert_eq!(first.firecrypt, second.firecrypt);
}
